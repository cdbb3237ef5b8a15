//! Error types and handling for rowstream
//!
//! Runtime stream failures are carried by [`StreamError`]; configuration
//! mistakes are caught at build time and reported as [`ConfigError`] before
//! any I/O happens. End-of-stream is never an error in this crate; streams
//! signal it by returning `None`.

use std::fmt;

/// Main error type for stream, query and responder operations
#[derive(Debug, Clone, PartialEq)]
pub enum StreamError {
    /// Error returned by the database execution handle
    Database(String),
    /// A row could not be decoded into a typed item
    Decode(String),
    /// An item could not be serialized for the response
    Encode(String),
    /// Writing to the response failed
    Write(String),
    /// The supplied cancellation context was triggered
    Cancelled,
    /// Custom error with message
    Custom(String),
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamError::Database(msg) => write!(f, "database error: {}", msg),
            StreamError::Decode(msg) => write!(f, "row decode error: {}", msg),
            StreamError::Encode(msg) => write!(f, "serialize error: {}", msg),
            StreamError::Write(msg) => write!(f, "response write error: {}", msg),
            StreamError::Cancelled => write!(f, "operation cancelled"),
            StreamError::Custom(msg) => write!(f, "stream error: {}", msg),
        }
    }
}

impl std::error::Error for StreamError {}

impl From<std::io::Error> for StreamError {
    fn from(err: std::io::Error) -> Self {
        StreamError::Write(err.to_string())
    }
}

impl From<serde_json::Error> for StreamError {
    fn from(err: serde_json::Error) -> Self {
        StreamError::Encode(err.to_string())
    }
}

/// Result type for rowstream operations
pub type StreamResult<T> = Result<T, StreamError>;

/// Build-time configuration error.
///
/// Returned by the `Query` and `Responder` builders when a mandatory option
/// is missing or an option value is out of range. No database or network
/// resources are ever allocated before validation passes.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required option: {0}")]
    MissingField(&'static str),
    #[error("fetch batch size must be at least 1, got {0}")]
    InvalidFetchSize(usize),
}
