//! Error types for the Gatehouse service.

use thiserror::Error;

/// Main error type for Gatehouse operations.
#[derive(Error, Debug)]
pub enum GatehouseError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Counter store errors
    #[error("Counter store error: {0}")]
    Store(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<redis::RedisError> for GatehouseError {
    fn from(e: redis::RedisError) -> Self {
        GatehouseError::Store(e.to_string())
    }
}

/// Result type alias for Gatehouse operations.
pub type Result<T> = std::result::Result<T, GatehouseError>;
