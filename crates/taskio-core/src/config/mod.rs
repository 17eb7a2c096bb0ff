//! Configuration management for taskio

pub mod serde_utils;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use self::serde_utils::duration_secs;
use crate::error::ConfigError;
use crate::escape::parse_escape_keys;

/// Session defaults read from `config.toml`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskIoConfig {
    /// Interval between input heartbeats
    #[serde(with = "duration_secs")]
    pub heartbeat_interval: Duration,

    /// Detach keys, e.g. `ctrl-p,ctrl-q`
    pub escape_sequence: String,

    /// Upper bound for the exit status query
    #[serde(with = "duration_secs")]
    pub wait_timeout: Duration,

    /// TERM value exported to TTY exec sessions
    pub term: String,
}

impl Default for TaskIoConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(30),
            escape_sequence: "ctrl-p,ctrl-q".to_string(),
            wait_timeout: Duration::from_secs(30),
            term: "xterm".to_string(),
        }
    }
}

impl TaskIoConfig {
    /// Escape sequence as raw bytes
    pub fn escape_keys(&self) -> Result<Vec<u8>, ConfigError> {
        parse_escape_keys(&self.escape_sequence)
    }

    /// Check values that serde cannot
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.heartbeat_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "heartbeat_interval must be at least 1 second".to_string(),
            ));
        }
        if self.term.is_empty() {
            return Err(ConfigError::Invalid("term must not be empty".to_string()));
        }
        self.escape_keys()?;
        Ok(())
    }
}

/// Get the default configuration directory
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("taskio")
}

/// Get the default configuration file path
pub fn default_config_path() -> PathBuf {
    default_config_dir().join("config.toml")
}

/// Load and validate configuration from a file
pub fn load_config(path: &Path) -> Result<TaskIoConfig, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Invalid(format!("Failed to read config: {}", e)))?;

    let config: TaskIoConfig = toml::from_str(&content)?;
    config.validate()?;
    Ok(config)
}
