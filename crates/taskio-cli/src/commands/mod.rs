//! CLI command implementations

mod attach;
mod exec;

pub use attach::attach_command;
pub use exec::{exec_command, ExecFlags};

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use taskio_core::config::{self, TaskIoConfig};
use taskio_core::escape::parse_escape_keys;
use taskio_core::{ConfigError, HttpSender, TaskIoOptions};

/// Connection and session settings shared by all commands
#[derive(Debug, Clone)]
pub struct SessionArgs {
    /// Agent base URL
    pub agent: String,
    /// ACS token for the agent
    pub token: Option<String>,
    /// Override for the configured detach keys
    pub detach_keys: Option<String>,
}

/// Load the session config; a missing default file yields the defaults
pub fn load_session_config(path: Option<&Path>) -> Result<TaskIoConfig> {
    match path {
        Some(path) => config::load_config(path)
            .with_context(|| format!("Failed to load config from {:?}", path)),
        None => {
            let default_path = config::default_config_path();
            match config::load_config(&default_path) {
                Ok(config) => Ok(config),
                Err(ConfigError::NotFound(_)) => Ok(TaskIoConfig::default()),
                Err(e) => Err(e)
                    .with_context(|| format!("Failed to load config from {:?}", default_path)),
            }
        }
    }
}

/// Build session options talking to the agent named in `args`
pub fn session_options(args: &SessionArgs, config: &TaskIoConfig) -> Result<TaskIoOptions> {
    let sender = HttpSender::new(&args.agent)
        .context("Failed to create HTTP client")?
        .with_token(args.token.clone());
    tracing::debug!(endpoint = sender.endpoint(), "Using agent");

    let mut options = TaskIoOptions::new(Arc::new(sender)).with_config(config)?;
    if let Some(keys) = &args.detach_keys {
        options = options.with_escape_sequence(parse_escape_keys(keys)?);
    }
    Ok(options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_explicit_missing_config_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_session_config(Some(dir.path().join("nope.toml").as_path())).is_err());
    }

    #[test]
    fn test_explicit_config_is_loaded() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "term = \"screen\"").unwrap();

        let config = load_session_config(Some(file.path())).unwrap();
        assert_eq!(config.term, "screen");
    }

    #[test]
    fn test_session_options_rejects_bad_detach_keys() {
        let args = SessionArgs {
            agent: "http://127.0.0.1:5051".to_string(),
            token: None,
            detach_keys: Some("ctrl-".to_string()),
        };
        assert!(session_options(&args, &TaskIoConfig::default()).is_err());
    }
}
