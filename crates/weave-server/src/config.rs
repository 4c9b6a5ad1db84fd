//! Server configuration.
//!
//! Configuration can be loaded from:
//! - Environment variables (WEAVE_*)
//! - TOML configuration file

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use weave_core::{ChannelId, UserId};

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Presence backend configuration.
    #[serde(default)]
    pub presence: PresenceConfig,

    /// Directory seed for the standalone binary.
    #[serde(default)]
    pub directory: DirectoryConfig,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Presence backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceBackend {
    /// Durable Redis store with TTL expiry.
    Redis,
    /// Process-local fallback without expiry.
    Memory,
}

/// Presence configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceConfig {
    /// Which backend to use.
    #[serde(default = "default_presence_backend")]
    pub backend: PresenceBackend,

    /// Redis connection URL.
    #[serde(default = "default_redis_url")]
    pub redis_url: String,
}

/// Channel membership seeded into the standalone binary's directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelSeed {
    /// Channel identifier.
    pub id: ChannelId,
    /// Persisted member user IDs.
    pub members: Vec<UserId>,
}

/// Directory seed configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DirectoryConfig {
    /// Channels with their member lists.
    #[serde(default)]
    pub channels: Vec<ChannelSeed>,

    /// Users allowed to connect without channel membership.
    #[serde(default)]
    pub users: Vec<UserId>,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable metrics export.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics port.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

// Default value functions
fn default_host() -> String {
    std::env::var("WEAVE_HOST").unwrap_or_else(|_| "127.0.0.1".to_string())
}

fn default_port() -> u16 {
    std::env::var("WEAVE_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080)
}

fn default_presence_backend() -> PresenceBackend {
    match std::env::var("WEAVE_PRESENCE").as_deref() {
        Ok("memory") => PresenceBackend::Memory,
        Ok("redis") | Err(_) => PresenceBackend::Redis,
        Ok(other) => {
            tracing::warn!("Unknown WEAVE_PRESENCE value {other:?}, defaulting to redis");
            PresenceBackend::Redis
        }
    }
}

fn default_redis_url() -> String {
    std::env::var("WEAVE_REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string())
}

fn default_true() -> bool {
    true
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            presence: PresenceConfig::default(),
            directory: DirectoryConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            backend: default_presence_backend(),
            redis_url: default_redis_url(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_metrics_port(),
        }
    }
}

impl Config {
    /// Load configuration from file or defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed.
    pub fn load() -> Result<Self> {
        let config_paths = [
            "weave.toml",
            "/etc/weave/weave.toml",
            "~/.config/weave/weave.toml",
        ];

        for path in &config_paths {
            let expanded = shellexpand::tilde(path);
            if Path::new(expanded.as_ref()).exists() {
                return Self::from_file(expanded.as_ref());
            }
        }

        // Fall back to defaults with environment overrides
        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Get the socket address to bind to.
    ///
    /// # Errors
    ///
    /// Returns an error if host and port do not form a valid address.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid bind address {}:{}", self.host, self.port))
    }
}
