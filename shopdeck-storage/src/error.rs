//! Error types for the storage layer.

use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur in storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// IO error from the underlying file system.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Key contains characters the store cannot represent.
    #[error("invalid storage key: {0:?}")]
    InvalidKey(String),
}
