//! Error types for the Floodgate rate limiter.

use thiserror::Error;

/// Main error type for Floodgate operations.
#[derive(Error, Debug)]
pub enum FloodgateError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// A policy with a zero limit or an empty window
    #[error("Malformed policy: {0}")]
    MalformedPolicy(String),

    /// The counter store could not be reached, timed out, or rejected a command
    #[error("Counter store unavailable: {0}")]
    StoreUnavailable(String),

    /// Identifiers must be non-empty strings
    #[error("Identifier must not be empty")]
    InvalidIdentifier,

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<redis::RedisError> for FloodgateError {
    fn from(err: redis::RedisError) -> Self {
        FloodgateError::StoreUnavailable(err.to_string())
    }
}

/// Result type alias for Floodgate operations.
pub type Result<T> = std::result::Result<T, FloodgateError>;
