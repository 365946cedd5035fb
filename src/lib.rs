//! Harvest - client core for the farm operations dashboard
//!
//! Keeps track of who is logged in (with an offline fallback when the auth
//! backend is unreachable) and wires that identity into the realtime channel
//! provided by [`harvest_client`]. A development server stands in for the
//! production backend.

pub mod auth;
pub mod config;
pub mod server;
pub mod session;
pub mod storage;

pub use auth::{AuthClient, AuthError, AuthMode, HttpAuthClient};
pub use config::HarvestConfig;
pub use server::{DevServer, DevServerConfig};
pub use session::{Role, Session, SessionStore, User, UserUpdate};
pub use storage::{FileTokenStore, MemoryTokenStore, StorageError, TokenStore};

pub use harvest_client as realtime;
