//! Protocol error types

use thiserror::Error;

/// Errors that can occur while encoding, framing or decoding agent messages
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// RecordIO length prefix is not a decimal number
    #[error("Invalid RecordIO header: {0:?}")]
    InvalidRecordHeader(String),

    /// Record exceeds maximum size
    #[error("Record too large: {size} bytes exceeds maximum of {max} bytes")]
    RecordTooLarge { size: usize, max: usize },

    /// Stream ended in the middle of a record
    #[error("Incomplete record: expected {expected} bytes, got {actual}")]
    IncompleteRecord { expected: usize, actual: usize },

    /// Message carried a type tag without the matching body
    #[error("Malformed {kind} message: missing '{field}'")]
    MissingField {
        kind: &'static str,
        field: &'static str,
    },

    /// Message type tag this client cannot represent
    #[error("Unsupported {kind} type")]
    UnsupportedType { kind: &'static str },

    /// Container ID text with an empty segment
    #[error("Invalid container ID: {0:?}")]
    InvalidContainerId(String),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
