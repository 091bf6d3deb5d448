//! Crypto error types.

use thiserror::Error;

/// Errors from key derivation and the stream envelope.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("master key must be 32 bytes, got {0}")]
    InvalidMasterKey(usize),

    #[error("key derivation failed")]
    KeyDerivation,

    #[error("encrypt chunk {0} failed")]
    Encrypt(u32),

    #[error("decrypt chunk {0} failed (corrupt ciphertext or wrong key)")]
    Decrypt(u32),

    #[error("truncated stream: incomplete header")]
    TruncatedHeader,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result type for crypto operations.
pub type CryptoResult<T> = std::result::Result<T, CryptoError>;
