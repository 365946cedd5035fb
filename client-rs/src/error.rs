//! Error types for the realtime channel

use thiserror::Error;

/// Errors that can occur on the realtime channel
#[derive(Error, Debug)]
pub enum ChannelError {
    /// Connection to the server failed
    #[error("Connection error: {0}")]
    Connection(String),

    /// WebSocket error on an established connection
    #[error("Transport error: {0}")]
    Transport(String),

    /// Failed to serialize/deserialize an envelope
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Envelope data did not match the schema of its topic
    #[error("Invalid payload for {topic}: {source}")]
    InvalidPayload {
        topic: String,
        #[source]
        source: serde_json::Error,
    },

    /// Envelope carried a type that is not a recognized topic
    #[error("Unknown topic: {0}")]
    UnknownTopic(String),
}

/// Result type for channel operations
pub type Result<T> = std::result::Result<T, ChannelError>;
