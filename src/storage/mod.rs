//! Durable storage for the session token
//!
//! - File: one file named `token` under the data directory
//! - Memory: process-local store for tests and embedding

mod file;
mod memory;

pub use file::{default_data_dir, FileTokenStore, DATA_DIR_ENV, TOKEN_KEY};
pub use memory::MemoryTokenStore;

pub use async_trait::async_trait;
use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no data directory available; set {}", DATA_DIR_ENV)]
    NoDataDir,
}

/// Trait for token storage
///
/// Absence of a token means "unauthenticated at startup".
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Read the stored token, if any
    async fn load(&self) -> Result<Option<String>, StorageError>;

    /// Replace the stored token
    async fn save(&self, token: &str) -> Result<(), StorageError>;

    /// Remove the stored token; succeeds if there was none
    async fn clear(&self) -> Result<(), StorageError>;
}
