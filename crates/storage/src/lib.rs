//! On-disk blob store for encrypted job artifacts.
//!
//! Blobs are keyed by job id under two roots: `inputs/` for uploads and
//! `outputs/` for results. Both are opaque ciphertext. A blob only lives
//! while its job row does; deletion is always row-first, with the sweeper
//! catching any file the row left behind.

pub mod error;

pub use error::{StorageError, StorageResult};

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use uuid::Uuid;

const DIR_MODE: u32 = 0o750;

fn create_dir_with_mode(path: &Path, mode: u32) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        std::fs::DirBuilder::new()
            .recursive(true)
            .mode(mode)
            .create(path)
    }
    #[cfg(not(unix))]
    {
        let _ = mode;
        std::fs::create_dir_all(path)
    }
}

/// Local blob store with `inputs/` and `outputs/` roots.
#[derive(Debug, Clone)]
pub struct BlobStore {
    base: PathBuf,
    inputs: PathBuf,
    outputs: PathBuf,
}

impl BlobStore {
    /// Open the store rooted at `base`, creating both roots (mode 0750).
    pub fn new(base: impl AsRef<Path>) -> StorageResult<Self> {
        let base = base.as_ref().to_path_buf();
        let inputs = base.join("inputs");
        let outputs = base.join("outputs");
        for dir in [&inputs, &outputs] {
            create_dir_with_mode(dir, DIR_MODE)?;
        }
        Ok(Self {
            base,
            inputs,
            outputs,
        })
    }

    pub fn input_path(&self, job_id: Uuid) -> PathBuf {
        self.inputs.join(job_id.to_string())
    }

    pub fn output_path(&self, job_id: Uuid) -> PathBuf {
        self.outputs.join(job_id.to_string())
    }

    pub fn input_exists(&self, job_id: Uuid) -> bool {
        self.input_path(job_id).is_file()
    }

    pub fn output_exists(&self, job_id: Uuid) -> bool {
        self.output_path(job_id).is_file()
    }

    /// Truncate-open the input blob for writing.
    pub async fn create_input(&self, job_id: Uuid) -> StorageResult<tokio::fs::File> {
        Ok(tokio::fs::File::create(self.input_path(job_id)).await?)
    }

    /// Open the output blob for reading.
    pub async fn open_output(&self, job_id: Uuid) -> StorageResult<tokio::fs::File> {
        tokio::fs::File::open(self.output_path(job_id))
            .await
            .map_err(|e| {
                if e.kind() == ErrorKind::NotFound {
                    StorageError::NotFound(job_id.to_string())
                } else {
                    StorageError::Io(e)
                }
            })
    }

    /// Best-effort removal of both blobs for a job. Never fails; a missing
    /// file is the common case.
    pub fn delete_job_files(&self, job_id: Uuid) {
        for path in [self.input_path(job_id), self.output_path(job_id)] {
            if let Err(e) = std::fs::remove_file(&path) {
                if e.kind() != ErrorKind::NotFound {
                    tracing::warn!(path = %path.display(), error = %e, "failed to delete blob");
                }
            }
        }
    }

    /// Total bytes stored under both roots. Tolerant of concurrent
    /// mutation; per-entry errors are swallowed.
    pub fn used_bytes(&self) -> u64 {
        fn dir_size(path: &Path) -> u64 {
            let entries = match std::fs::read_dir(path) {
                Ok(entries) => entries,
                Err(_) => return 0,
            };
            let mut total = 0;
            for entry in entries.flatten() {
                let Ok(meta) = entry.metadata() else {
                    continue;
                };
                if meta.is_dir() {
                    total += dir_size(&entry.path());
                } else {
                    total += meta.len();
                }
            }
            total
        }
        dir_size(&self.base)
    }

    pub fn used_mb(&self) -> u64 {
        self.used_bytes() / (1024 * 1024)
    }
}
