#![deny(unsafe_code)]

//! Configuration loading and validation for Soloist.
//!
//! Loads TOML configuration files and validates them against expected
//! schemas. Provides the [`AppConfig`] type as the central configuration
//! structure shared by the core runtime and the CLI.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Errors that can occur during configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    Validation(String),
}

/// Top-level application configuration.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Instance coordination configuration.
    #[serde(default)]
    pub instance: InstanceConfig,

    /// Duplicate-side hand-off configuration.
    #[serde(default)]
    pub handoff: HandoffConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Configuration for the coordination endpoint and instance role.
///
/// The presence of `listen_port` selects a TCP endpoint on `listen_addr`;
/// otherwise the Unix socket at `socket_path` is used.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceConfig {
    /// Unix socket path used as the lock when no TCP port is configured.
    #[serde(default = "default_socket_path")]
    pub socket_path: String,

    /// Address for the TCP endpoint (loopback by default).
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// TCP port; setting it switches the endpoint from Unix to TCP.
    #[serde(default)]
    pub listen_port: Option<u16>,

    /// Whether the singleton serves hand-off connections. When false a
    /// duplicate exits without contacting the singleton.
    #[serde(default)]
    pub listen: bool,
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            listen_addr: default_listen_addr(),
            listen_port: None,
            listen: false,
        }
    }
}

fn default_socket_path() -> String {
    "/tmp/soloist.sock".to_string()
}

fn default_listen_addr() -> String {
    "127.0.0.1".to_string()
}

/// Bounds on how long a duplicate waits for the singleton.
///
/// Zero means wait forever.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandoffConfig {
    /// Connect-attempt bound in milliseconds.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Status-line read bound in milliseconds.
    #[serde(default = "default_response_timeout_ms")]
    pub response_timeout_ms: u64,
}

impl Default for HandoffConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
            response_timeout_ms: default_response_timeout_ms(),
        }
    }
}

fn default_connect_timeout_ms() -> u64 {
    5_000
}

fn default_response_timeout_ms() -> u64 {
    10_000
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g. "info", "debug", "trace").
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from a TOML file at the given path using async I/O.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = tokio::fs::read_to_string(path).await?;
        let config: AppConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.instance.listen_port {
            Some(0) => {
                return Err(ConfigError::Validation(
                    "instance.listen_port must be non-zero when set".to_string(),
                ));
            }
            Some(_) => {
                if self.instance.listen_addr.is_empty() {
                    return Err(ConfigError::Validation(
                        "instance.listen_addr must not be empty when listen_port is set"
                            .to_string(),
                    ));
                }
            }
            None => {
                if self.instance.socket_path.is_empty() {
                    return Err(ConfigError::Validation(
                        "instance.socket_path must not be empty".to_string(),
                    ));
                }
            }
        }

        Ok(())
    }
}
