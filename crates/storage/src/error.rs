//! Blob store error types.

use thiserror::Error;

/// Errors from the on-disk blob store.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result type for blob store operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;
