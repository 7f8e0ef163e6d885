//! Configuration for the tail client

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::ConnectionOptions;
use crate::config::ReconnectConfig;

/// Tail client configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TailConfig {
    /// Hub base URL
    #[serde(default = "default_api_url")]
    pub api_url: String,

    pub api_token: Option<String>,

    /// Seconds between heartbeat pings, 0 disables them
    #[serde(default = "default_heartbeat")]
    pub heartbeat_secs: u64,

    #[serde(default)]
    pub reconnect: ReconnectConfig,
}

fn default_api_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_heartbeat() -> u64 {
    30
}

impl TailConfig {
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".config/energy-monitoring/tail.toml"))
    }

    /// Load configuration from file, or use defaults if no file exists
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = path
            .map(|p| p.to_path_buf())
            .or_else(|| Self::default_path().filter(|p| p.exists()));

        let Some(path) = config_path else {
            return Ok(Self::default());
        };

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("Invalid config file: {}", path.display()))?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.api_url.trim().is_empty() {
            bail!("api_url must not be empty");
        }
        self.reconnect.validate()
    }

    pub fn connection_options(&self) -> ConnectionOptions {
        ConnectionOptions {
            heartbeat_interval: (self.heartbeat_secs > 0)
                .then(|| Duration::from_secs(self.heartbeat_secs)),
            ..ConnectionOptions::from(&self.reconnect)
        }
    }
}

impl Default for TailConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            api_token: None,
            heartbeat_secs: default_heartbeat(),
            reconnect: ReconnectConfig::default(),
        }
    }
}
