//! Configuration for the realtime channel

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Realtime endpoint used by production builds
pub const PRODUCTION_WS_URL: &str = "wss://api.tobacco-harvest.com/ws";

/// Realtime endpoint used during local development
pub const DEVELOPMENT_WS_URL: &str = "ws://localhost:3001/ws";

/// Deployment mode, which selects the fixed endpoints the client talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Deployment {
    Production,
    #[default]
    Development,
}

impl Deployment {
    /// Realtime WebSocket endpoint for this deployment
    pub fn ws_url(&self) -> &'static str {
        match self {
            Deployment::Production => PRODUCTION_WS_URL,
            Deployment::Development => DEVELOPMENT_WS_URL,
        }
    }

    /// Base URL of the REST API (auth endpoints live under it)
    pub fn api_base_url(&self) -> &'static str {
        match self {
            Deployment::Production => "https://api.tobacco-harvest.com",
            Deployment::Development => "http://localhost:3001/api",
        }
    }
}

impl fmt::Display for Deployment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Deployment::Production => write!(f, "production"),
            Deployment::Development => write!(f, "development"),
        }
    }
}

impl FromStr for Deployment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "production" | "prod" => Ok(Deployment::Production),
            "development" | "dev" => Ok(Deployment::Development),
            other => Err(format!(
                "Invalid deployment: '{}'. Must be: production or development",
                other
            )),
        }
    }
}

/// Linear reconnection backoff: attempt N waits `N × base`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay unit; the first retry waits exactly this long
    pub base_interval: Duration,

    /// Number of retries before the channel gives up
    pub max_attempts: u32,
}

impl ReconnectPolicy {
    pub fn new(base_interval: Duration, max_attempts: u32) -> Self {
        Self {
            base_interval,
            max_attempts,
        }
    }

    /// Delay before the given (1-indexed) attempt, or `None` once the
    /// budget is exhausted
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_attempts {
            return None;
        }
        Some(self.base_interval * attempt)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), 5)
    }
}

/// Configuration for a realtime channel
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// WebSocket URL (e.g., "ws://localhost:3001/ws")
    pub url: String,

    /// Whether to reconnect after the connection drops
    pub auto_reconnect: bool,

    /// Backoff applied between reconnection attempts
    pub reconnect: ReconnectPolicy,
}

impl ChannelConfig {
    /// Create a new configuration for the given URL
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            auto_reconnect: true,
            reconnect: ReconnectPolicy::default(),
        }
    }

    /// Configuration pointing at the fixed endpoint of a deployment
    pub fn for_deployment(deployment: Deployment) -> Self {
        Self::new(deployment.ws_url())
    }

    /// Disable automatic reconnection
    pub fn no_reconnect(mut self) -> Self {
        self.auto_reconnect = false;
        self
    }

    /// Set the reconnection backoff
    pub fn reconnect(mut self, base_interval: Duration, max_attempts: u32) -> Self {
        self.reconnect = ReconnectPolicy::new(base_interval, max_attempts);
        self
    }
}
