//! Development server
//!
//! Stands in for the production backend: HTTP auth endpoints under `/api`
//! backed by an in-memory account directory, and a WebSocket push endpoint
//! fed by simulated telemetry.

mod accounts;
mod api;
mod feed;
mod websocket;

pub use accounts::{AccountDirectory, AccountError, DEMO_PASSWORD};
pub use feed::{run_feed, FeedGenerator};
pub use websocket::{AUTH_ERROR, AUTH_OK};

use axum::{
    routing::{get, post},
    Router,
};
use harvest_client::Envelope;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::info;

/// Capacity of the per-server update bus
const FEED_CAPACITY: usize = 256;

/// Configuration for the development server
#[derive(Debug, Clone)]
pub struct DevServerConfig {
    pub bind_addr: SocketAddr,
    /// Secret for signing and verifying `dev-` tokens
    pub token_secret: Vec<u8>,
    /// Interval of the simulated feed; zero disables it
    pub tick: Duration,
}

impl Default for DevServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3001)),
            token_secret: b"harvest-dev-secret".to_vec(),
            tick: Duration::from_secs(2),
        }
    }
}

/// Shared state for HTTP and WebSocket handlers
#[derive(Clone)]
pub struct AppState {
    pub accounts: Arc<AccountDirectory>,
    pub feed: broadcast::Sender<Envelope>,
    pub token_secret: Arc<[u8]>,
}

pub struct DevServer {
    config: DevServerConfig,
    state: AppState,
}

impl DevServer {
    pub fn new(config: DevServerConfig) -> Self {
        let (feed, _) = broadcast::channel(FEED_CAPACITY);
        let state = AppState {
            accounts: Arc::new(AccountDirectory::seeded()),
            feed,
            token_secret: Arc::from(config.token_secret.as_slice()),
        };
        Self { config, state }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Sender side of the update bus; envelopes sent here reach every client
    pub fn publisher(&self) -> broadcast::Sender<Envelope> {
        self.state.feed.clone()
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/api/auth/login", post(api::login))
            .route("/api/auth/register", post(api::register))
            .route("/api/auth/logout", post(api::logout))
            .route("/api/auth/refresh", post(api::refresh))
            .route("/ws", get(websocket::ws_handler))
            .route("/health", get(health_handler))
            .with_state(self.state.clone())
    }

    /// Bind the configured address and serve until the future is dropped
    pub async fn run(self) -> anyhow::Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener
    pub async fn serve(self, listener: TcpListener) -> anyhow::Result<()> {
        let addr = listener.local_addr()?;

        let feed_task = (!self.config.tick.is_zero())
            .then(|| tokio::spawn(run_feed(self.publisher(), self.config.tick)));

        info!(addr = %addr, tick = ?self.config.tick, "Development server listening");
        let result = axum::serve(listener, self.router()).await;

        if let Some(task) = feed_task {
            task.abort();
        }
        result?;
        Ok(())
    }
}

async fn health_handler() -> &'static str {
    "ok"
}
