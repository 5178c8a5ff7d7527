//! Client configuration.
//!
//! Configuration can be loaded from:
//! - Environment variables (MURMUR_*)
//! - TOML configuration file

use anyhow::{bail, Context, Result};
use murmur_core::{HistoryLimits, ReconnectPolicy};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Chat endpoint, without the token query.
    #[serde(default = "default_server_url")]
    pub server_url: String,

    /// Reconnection policy.
    #[serde(default)]
    pub reconnect: ReconnectConfig,

    /// History retention.
    #[serde(default)]
    pub history: HistoryConfig,

    /// Durable credential storage.
    #[serde(default)]
    pub credentials: CredentialsConfig,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Reconnection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectConfig {
    /// Delay between attempts in milliseconds.
    #[serde(default = "default_reconnect_delay")]
    pub delay_ms: u64,

    /// Attempts before giving up.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

/// History retention configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    #[serde(default = "default_public_cap")]
    pub public_cap: usize,

    #[serde(default = "default_public_keep")]
    pub public_keep: usize,

    #[serde(default = "default_private_cap")]
    pub private_cap: usize,

    #[serde(default = "default_private_keep")]
    pub private_keep: usize,
}

/// Credential storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialsConfig {
    /// Path of the JSON credential file. `~` is expanded.
    #[serde(default = "default_credentials_path")]
    pub path: String,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable metrics export.
    #[serde(default)]
    pub enabled: bool,

    /// Metrics port.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

// Default value functions
fn default_server_url() -> String {
    std::env::var("MURMUR_SERVER_URL")
        .unwrap_or_else(|_| "ws://localhost:8080/ws/chat".to_string())
}

fn default_reconnect_delay() -> u64 {
    3_000 // 3 seconds
}

fn default_max_attempts() -> u32 {
    5
}

fn default_public_cap() -> usize {
    HistoryLimits::default().public_cap
}

fn default_public_keep() -> usize {
    HistoryLimits::default().public_keep
}

fn default_private_cap() -> usize {
    HistoryLimits::default().private_cap
}

fn default_private_keep() -> usize {
    HistoryLimits::default().private_keep
}

fn default_credentials_path() -> String {
    std::env::var("MURMUR_CREDENTIALS")
        .unwrap_or_else(|_| "~/.config/murmur/credentials.json".to_string())
}

fn default_metrics_port() -> u16 {
    9091
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            reconnect: ReconnectConfig::default(),
            history: HistoryConfig::default(),
            credentials: CredentialsConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            delay_ms: default_reconnect_delay(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            public_cap: default_public_cap(),
            public_keep: default_public_keep(),
            private_cap: default_private_cap(),
            private_keep: default_private_keep(),
        }
    }
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            path: default_credentials_path(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from file or defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed or
    /// fails validation.
    pub fn load() -> Result<Self> {
        let config_paths = ["murmur.toml", "~/.config/murmur/murmur.toml"];

        for path in &config_paths {
            let expanded = shellexpand::tilde(path);
            if Path::new(expanded.as_ref()).exists() {
                return Self::from_file(expanded.as_ref());
            }
        }

        // Fall back to defaults with environment overrides
        let config = Self::default();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file.
    ///
    /// Environment variables take precedence over values in the file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let mut config: ClientConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.apply_env();
        config
            .validate()
            .with_context(|| format!("Invalid config file: {}", path.display()))?;

        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("MURMUR_SERVER_URL") {
            self.server_url = url;
        }
        if let Ok(path) = std::env::var("MURMUR_CREDENTIALS") {
            self.credentials.path = path;
        }
    }

    /// Check internal consistency.
    ///
    /// # Errors
    ///
    /// Returns an error describing the first inconsistent value.
    pub fn validate(&self) -> Result<()> {
        if !self.server_url.starts_with("ws://") && !self.server_url.starts_with("wss://") {
            bail!("server_url must be a ws:// or wss:// URL: {}", self.server_url);
        }
        let h = &self.history;
        if h.public_keep == 0 || h.public_keep >= h.public_cap {
            bail!(
                "history.public_keep ({}) must be between 1 and public_cap ({})",
                h.public_keep,
                h.public_cap
            );
        }
        if h.private_keep == 0 || h.private_keep >= h.private_cap {
            bail!(
                "history.private_keep ({}) must be between 1 and private_cap ({})",
                h.private_keep,
                h.private_cap
            );
        }
        Ok(())
    }

    /// Reconnection policy for the connection manager.
    #[must_use]
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            delay: Duration::from_millis(self.reconnect.delay_ms),
            max_attempts: self.reconnect.max_attempts,
        }
    }

    /// History limits for the conversation store.
    #[must_use]
    pub fn history_limits(&self) -> HistoryLimits {
        HistoryLimits {
            public_cap: self.history.public_cap,
            public_keep: self.history.public_keep,
            private_cap: self.history.private_cap,
            private_keep: self.history.private_keep,
        }
    }

    /// Credential file path with `~` expanded.
    #[must_use]
    pub fn credentials_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.credentials.path).as_ref())
    }
}
