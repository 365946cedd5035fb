//! Harvest realtime client
//!
//! A WebSocket channel for the farm operations dashboard: one persistent
//! connection to the push endpoint, typed updates per topic, and automatic
//! reconnection with linear backoff.
//!
//! # Example
//!
//! ```no_run
//! use harvest_client::{ChannelConfig, Deployment, RealtimeChannel};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let channel = RealtimeChannel::new(ChannelConfig::for_deployment(Deployment::Development));
//!
//!     // Receive drone telemetry
//!     let sub = channel.on_drone_update(|drone| {
//!         println!("{} battery at {}%", drone.name, drone.battery);
//!     });
//!
//!     channel.connect();
//!
//!     // Dropped with a warning unless connected
//!     channel.send("drone_command", &serde_json::json!({"droneId": "DH-001", "command": "return_home"}))?;
//!
//!     sub.cancel();
//!     channel.disconnect().await;
//!     Ok(())
//! }
//! ```

mod client;
mod config;
mod error;
mod messages;

pub use client::{
    ConnectionState, CredentialSource, RealtimeChannel, StaticCredential, Subscription,
    UpdateHandler,
};
pub use config::{ChannelConfig, Deployment, ReconnectPolicy, DEVELOPMENT_WS_URL, PRODUCTION_WS_URL};
pub use error::{ChannelError, Result};
pub use messages::{
    AlertCategory, AlertLevel, BoundingBox, DetectionStatus, DroneState, DroneStatus, Envelope,
    LeafDetection, Location, Priority, SecurityAlert, SecurityAlertKind, SecurityAlertStatus,
    SensorKind, SensorReading, SystemAlert, Topic, Update, AUTH_TOPIC,
};
