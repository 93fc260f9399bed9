//! Error types for the cache
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the cache.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// Key is empty, too long or contains a forbidden character
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Value cannot be cached (for example it serializes to null)
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    /// The cache has been shut down
    #[error("Cache has been disposed")]
    Disposed,

    /// Value could not be sized for storage
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A sweep or pressure check failed
    #[error("Background task error: {0}")]
    BackgroundTask(String),

    /// The caller cancelled the request
    #[error("Operation cancelled")]
    Cancelled,
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for CacheError {
    fn from(err: std::io::Error) -> Self {
        CacheError::BackgroundTask(err.to_string())
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache.
pub type Result<T> = std::result::Result<T, CacheError>;
