//! Repository error types.

use thiserror::Error;

/// Job repository errors. `NotFound` stays distinct from `Database` so the
/// HTTP layer can map missing rows to 404 without string matching.
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type for repository operations.
pub type MetadataResult<T> = std::result::Result<T, MetadataError>;
