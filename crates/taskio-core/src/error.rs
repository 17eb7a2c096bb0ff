//! Core error types for taskio

use std::path::PathBuf;
use std::time::Duration;
use taskio_protocol::ProtocolError;
use thiserror::Error;

/// Top-level error type for a task I/O session
#[derive(Error, Debug)]
pub enum TaskIoError {
    /// Protocol error (framing or decoding)
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Local terminal error
    #[error("Terminal error: {0}")]
    Terminal(#[from] TerminalError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Local I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A local sink accepted fewer bytes than it was given
    #[error("Short write to local output")]
    ShortWrite,

    /// Agent answered with a non-success status
    #[error("Agent returned {status}: {body}")]
    Agent { status: u16, body: String },

    /// Transport-level failure talking to the agent
    #[error("Transport error: {0}")]
    Transport(String),

    /// Exit status query did not complete in time
    #[error("Timed out after {0:?} waiting for container exit status")]
    WaitTimeout(Duration),

    /// Agent answered with a response this call cannot use
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    /// A session unit panicked
    #[error("Session task failed: {0}")]
    UnitPanicked(String),
}

impl From<reqwest::Error> for TaskIoError {
    fn from(e: reqwest::Error) -> Self {
        TaskIoError::Transport(e.to_string())
    }
}

/// Local terminal errors
#[derive(Error, Debug)]
pub enum TerminalError {
    /// The process has no controlling terminal
    #[error("No controlling terminal")]
    NoControllingTerminal,

    /// Input is not a terminal
    #[error("Input is not a terminal")]
    NotATerminal,

    /// Entering raw mode failed
    #[error("Failed to enter raw mode: {0}")]
    RawMode(#[source] std::io::Error),

    /// Window size query failed
    #[error("Failed to query window size: {0}")]
    Size(#[source] std::io::Error),

    /// Restoring the previous terminal mode failed
    #[error("Failed to restore terminal mode: {0}")]
    Restore(#[source] std::io::Error),
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// Escape sequence notation that cannot be parsed
    #[error("Invalid escape sequence {sequence:?}: {reason}")]
    InvalidEscapeSequence { sequence: String, reason: String },
}
