//! Chunked AES-256-GCM stream envelope.
//!
//! Wire format: a 12-byte random base nonce followed by sealed chunks.
//! Plaintext chunks are 64 KiB (the final chunk may be shorter); each
//! sealed chunk is plaintext + 16-byte tag. The nonce for chunk `i` is the
//! base nonce with the big-endian 32-bit counter XORed into bytes 8..12.
//! Nonce uniqueness holds because keys are derived per job and each blob is
//! written exactly once.

use crate::error::{CryptoError, CryptoResult};
use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, Key, KeyInit, Nonce};
use hkdf::Hkdf;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

/// Plaintext bytes per chunk.
pub const CHUNK_SIZE: usize = 64 * 1024;
/// Base nonce length.
pub const NONCE_SIZE: usize = 12;
/// GCM authentication tag length.
pub const TAG_SIZE: usize = 16;
/// Ciphertext bytes per full chunk.
pub const ENCRYPTED_CHUNK_SIZE: usize = CHUNK_SIZE + TAG_SIZE;

const HKDF_INFO: &[u8] = b"fileforge-file-encryption";

/// Derive the per-job file key from the 32-byte master key and the job id.
/// Deterministic: the same pair always yields the same key.
pub fn derive_key(master: &[u8], job_id: &str) -> CryptoResult<[u8; 32]> {
    if master.len() != 32 {
        return Err(CryptoError::InvalidMasterKey(master.len()));
    }
    let hk = Hkdf::<Sha256>::new(Some(job_id.as_bytes()), master);
    let mut key = [0u8; 32];
    hk.expand(HKDF_INFO, &mut key)
        .map_err(|_| CryptoError::KeyDerivation)?;
    Ok(key)
}

fn chunk_nonce(base: &[u8; NONCE_SIZE], idx: u32) -> [u8; NONCE_SIZE] {
    let mut nonce = *base;
    let counter = idx.to_be_bytes();
    for (n, c) in nonce[8..].iter_mut().zip(counter) {
        *n ^= c;
    }
    nonce
}

/// Incremental encryptor. Feed arbitrary slices with [`Encryptor::update`];
/// full chunks are sealed as they fill and the trailing partial chunk is
/// sealed by [`Encryptor::finish`].
pub struct Encryptor {
    cipher: Aes256Gcm,
    base_nonce: [u8; NONCE_SIZE],
    chunk_idx: u32,
    pending: Vec<u8>,
}

impl Encryptor {
    pub fn new(key: &[u8; 32]) -> Self {
        let mut base_nonce = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut base_nonce);
        Self {
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key)),
            base_nonce,
            chunk_idx: 0,
            pending: Vec::with_capacity(CHUNK_SIZE),
        }
    }

    /// The stream header. Must be written before any sealed chunks.
    pub fn header(&self) -> &[u8] {
        &self.base_nonce
    }

    /// Absorb plaintext, returning the ciphertext of any chunks that
    /// filled up.
    pub fn update(&mut self, mut input: &[u8]) -> CryptoResult<Vec<u8>> {
        let mut out = Vec::new();
        while self.pending.len() + input.len() >= CHUNK_SIZE {
            let take = CHUNK_SIZE - self.pending.len();
            self.pending.extend_from_slice(&input[..take]);
            input = &input[take..];
            let chunk = std::mem::take(&mut self.pending);
            out.extend_from_slice(&self.seal(&chunk)?);
            self.pending.reserve(CHUNK_SIZE);
        }
        self.pending.extend_from_slice(input);
        Ok(out)
    }

    /// Seal the trailing partial chunk, if any. Empty input produces a
    /// header-only stream.
    pub fn finish(mut self) -> CryptoResult<Vec<u8>> {
        if self.pending.is_empty() {
            return Ok(Vec::new());
        }
        let last = std::mem::take(&mut self.pending);
        self.seal(&last)
    }

    fn seal(&mut self, plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
        let nonce = chunk_nonce(&self.base_nonce, self.chunk_idx);
        let sealed = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|_| CryptoError::Encrypt(self.chunk_idx))?;
        self.chunk_idx += 1;
        Ok(sealed)
    }
}

/// Incremental decryptor over fixed-size sealed chunks. The caller splits
/// the stream into [`ENCRYPTED_CHUNK_SIZE`] slices; a short final slice is
/// the end of the stream.
pub struct Decryptor {
    cipher: Aes256Gcm,
    base_nonce: [u8; NONCE_SIZE],
    chunk_idx: u32,
}

impl Decryptor {
    pub fn new(key: &[u8; 32], base_nonce: [u8; NONCE_SIZE]) -> Self {
        Self {
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key)),
            base_nonce,
            chunk_idx: 0,
        }
    }

    /// Open one sealed chunk. Any tag mismatch fails the whole stream.
    pub fn open_chunk(&mut self, sealed: &[u8]) -> CryptoResult<Vec<u8>> {
        let nonce = chunk_nonce(&self.base_nonce, self.chunk_idx);
        let plain = self
            .cipher
            .decrypt(Nonce::from_slice(&nonce), sealed)
            .map_err(|_| CryptoError::Decrypt(self.chunk_idx))?;
        self.chunk_idx += 1;
        Ok(plain)
    }
}

/// Read as many bytes as possible into `buf`, stopping early only at EOF.
fn read_full<R: Read>(src: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = src.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// Encrypt everything readable from `src` into `dst`.
pub fn encrypt_stream<R: Read, W: Write>(
    key: &[u8; 32],
    src: &mut R,
    dst: &mut W,
) -> CryptoResult<()> {
    let mut enc = Encryptor::new(key);
    dst.write_all(enc.header())?;

    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let n = read_full(src, &mut buf)?;
        if n == 0 {
            break;
        }
        dst.write_all(&enc.update(&buf[..n])?)?;
        if n < buf.len() {
            break;
        }
    }
    dst.write_all(&enc.finish()?)?;
    Ok(())
}

/// Decrypt a full envelope stream from `src` into `dst`. An entirely empty
/// source decrypts to empty output; a partial header is an error.
pub fn decrypt_stream<R: Read, W: Write>(
    key: &[u8; 32],
    src: &mut R,
    dst: &mut W,
) -> CryptoResult<()> {
    let mut header = [0u8; NONCE_SIZE];
    match read_full(src, &mut header)? {
        0 => return Ok(()),
        NONCE_SIZE => {}
        _ => return Err(CryptoError::TruncatedHeader),
    }

    let mut dec = Decryptor::new(key, header);
    let mut buf = vec![0u8; ENCRYPTED_CHUNK_SIZE];
    loop {
        let n = read_full(src, &mut buf)?;
        if n == 0 {
            break;
        }
        dst.write_all(&dec.open_chunk(&buf[..n])?)?;
        if n < buf.len() {
            break;
        }
    }
    Ok(())
}

/// Encrypt `src_path` into `dst_path`, fsyncing the result. The partial
/// destination is removed on failure.
pub fn encrypt_file(key: &[u8; 32], src_path: &Path, dst_path: &Path) -> CryptoResult<()> {
    let mut src = File::open(src_path)?;
    let mut dst = File::create(dst_path)?;
    let result = encrypt_stream(key, &mut src, &mut dst)
        .and_then(|()| dst.sync_all().map_err(CryptoError::from));
    if result.is_err() {
        drop(dst);
        let _ = std::fs::remove_file(dst_path);
    }
    result
}

/// Decrypt `src_path` into `dst_path`, fsyncing the result. The partial
/// destination is removed on failure.
pub fn decrypt_file(key: &[u8; 32], src_path: &Path, dst_path: &Path) -> CryptoResult<()> {
    let mut src = File::open(src_path)?;
    let mut dst = File::create(dst_path)?;
    let result = decrypt_stream(key, &mut src, &mut dst)
        .and_then(|()| dst.sync_all().map_err(CryptoError::from));
    if result.is_err() {
        drop(dst);
        let _ = std::fs::remove_file(dst_path);
    }
    result
}
