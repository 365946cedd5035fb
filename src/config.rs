//! Top-level configuration for the dashboard client

use crate::auth::AuthMode;
use harvest_client::{ChannelConfig, Deployment};
use std::path::PathBuf;

/// Endpoints, auth behaviour and storage location
#[derive(Debug, Clone)]
pub struct HarvestConfig {
    pub deployment: Deployment,
    /// Base URL for `/auth/*`
    pub api_base_url: String,
    pub ws_url: String,
    pub auth_mode: AuthMode,
    /// Token directory; `None` means [`crate::storage::default_data_dir`]
    pub data_dir: Option<PathBuf>,
}

impl HarvestConfig {
    /// Endpoints of the given deployment, demo auth, default data directory
    pub fn new(deployment: Deployment) -> Self {
        Self {
            deployment,
            api_base_url: deployment.api_base_url().to_string(),
            ws_url: deployment.ws_url().to_string(),
            auth_mode: AuthMode::default(),
            data_dir: None,
        }
    }

    pub fn api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }

    pub fn ws_url(mut self, url: impl Into<String>) -> Self {
        self.ws_url = url.into();
        self
    }

    pub fn auth_mode(mut self, mode: AuthMode) -> Self {
        self.auth_mode = mode;
        self
    }

    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    /// Channel settings with the default reconnect policy
    pub fn channel_config(&self) -> ChannelConfig {
        ChannelConfig::new(&self.ws_url)
    }
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self::new(Deployment::default())
    }
}
