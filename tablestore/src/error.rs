//! Storage error types.

use std::io;
use thiserror::Error;

/// Storage operation errors.
///
/// Back-ends translate a missing backing file, object or key set into an
/// empty table set, so `NotFound`-style conditions never reach callers of
/// `read()`. Everything else is passed through unchanged.
#[derive(Error, Debug)]
pub enum StorageError {
    /// I/O error during storage operation
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Stored content could not be decoded, or a table set could not be encoded
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Redis client or server error
    #[cfg(feature = "redis")]
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Object store error
    #[cfg(feature = "s3")]
    #[error("Object store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Write attempted on storage opened read-only
    #[error("Cannot write to read-only storage: {0}")]
    ReadOnly(String),

    /// No row id left to assign in a table
    #[error("Row ids exhausted in table: {0}")]
    IdsExhausted(String),

    /// Operation on a back-end after `close()`
    #[error("Storage is closed: {0}")]
    Closed(&'static str),
}

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

impl StorageError {
    /// Check if this is a "not found" error.
    pub fn is_not_found(&self) -> bool {
        match self {
            StorageError::Io(e) => e.kind() == io::ErrorKind::NotFound,
            #[cfg(feature = "s3")]
            StorageError::ObjectStore(object_store::Error::NotFound { .. }) => true,
            _ => false,
        }
    }

    /// Check if this is a configuration error.
    pub fn is_config(&self) -> bool {
        matches!(self, StorageError::Config(_))
    }
}
