//! Core error types.

use thiserror::Error;

/// Errors from configuration loading and domain validation.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid operation: {0:?}")]
    InvalidOperation(String),

    #[error("unsupported input format .{ext} for {operation}")]
    UnsupportedInputFormat { operation: String, ext: String },

    #[error("{0}")]
    InvalidParams(String),
}

/// Result type for core operations.
pub type CoreResult<T> = std::result::Result<T, CoreError>;
