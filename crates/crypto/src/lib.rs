//! Per-job envelope encryption for stored blobs.
//!
//! Every job gets its own AES-256-GCM key derived from the service master
//! key, and every blob is a chunked ciphertext stream that can be produced
//! and consumed incrementally.

pub mod envelope;
pub mod error;

pub use envelope::{
    decrypt_file, decrypt_stream, derive_key, encrypt_file, encrypt_stream, Decryptor, Encryptor,
    CHUNK_SIZE, ENCRYPTED_CHUNK_SIZE, NONCE_SIZE, TAG_SIZE,
};
pub use error::{CryptoError, CryptoResult};
