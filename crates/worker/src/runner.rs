//! The worker loop: dequeue, guard, process, account.

use crate::processors::{self, ProcessContext, ProcessError};
use fileforge_core::{Config, JobParams, Operation};
use fileforge_crypto as crypto;
use fileforge_metadata::{JobRow, JobStatus, JobStore};
use fileforge_queue::WorkQueue;
use fileforge_storage::BlobStore;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use uuid::Uuid;

/// How long one dequeue blocks before the loop re-checks for shutdown.
const DEQUEUE_TIMEOUT: Duration = Duration::from_secs(5);

/// Per-job scratch directory, removed on every exit path when dropped.
pub struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    pub fn create(base: &Path, job_id: Uuid) -> std::io::Result<Self> {
        let path = base.join(job_id.to_string());
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            std::fs::DirBuilder::new()
                .recursive(true)
                .mode(0o700)
                .create(&path)?;
        }
        #[cfg(not(unix))]
        std::fs::create_dir_all(&path)?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.path);
    }
}

/// Why a processing attempt did not complete.
enum AttemptError {
    /// Shutdown interrupted the job; leave the row in `processing`.
    Cancelled,
    /// The attempt failed; run the retry accounting.
    Failed(String),
}

/// Shared dependencies for the worker pool.
pub struct Worker {
    pub config: Arc<Config>,
    pub master_key: [u8; 32],
    pub metadata: Arc<JobStore>,
    pub queue: Arc<WorkQueue>,
    pub store: Arc<BlobStore>,
    pub http: reqwest::Client,
}

impl Worker {
    /// One worker task. Runs until the shutdown signal flips.
    ///
    /// `pop_queue` must be this worker's own connection: the blocking pop
    /// would stall every other command multiplexed onto a shared one.
    pub async fn run(
        self: Arc<Self>,
        worker_id: usize,
        pop_queue: WorkQueue,
        mut shutdown: watch::Receiver<bool>,
    ) {
        tracing::info!(worker = worker_id, "worker started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            let popped = tokio::select! {
                result = pop_queue.dequeue(DEQUEUE_TIMEOUT) => result,
                _ = shutdown.wait_for(|stop| *stop) => break,
            };

            let job_id = match popped {
                Ok(Some(raw)) => match Uuid::parse_str(&raw) {
                    Ok(id) => id,
                    Err(_) => {
                        tracing::warn!(worker = worker_id, raw_id = %raw, "dropping malformed queue entry");
                        continue;
                    }
                },
                Ok(None) => continue,
                Err(e) => {
                    tracing::error!(worker = worker_id, error = %e, "dequeue failed");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    continue;
                }
            };

            self.process_job(worker_id, job_id, &mut shutdown).await;
        }

        tracing::info!(worker = worker_id, "worker stopped");
    }

    async fn process_job(
        &self,
        worker_id: usize,
        job_id: Uuid,
        shutdown: &mut watch::Receiver<bool>,
    ) {
        let started = Instant::now();
        tracing::info!(worker = worker_id, job_id = %job_id, "job picked up");

        let scratch = match ScratchDir::create(&self.config.tmp_dir, job_id) {
            Ok(scratch) => scratch,
            Err(e) => {
                tracing::error!(worker = worker_id, job_id = %job_id, error = %e, "scratch dir failed");
                self.fail(job_id, "Internal error: failed to create temp directory")
                    .await;
                return;
            }
        };

        let job = match self.metadata.get_job(job_id).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                tracing::warn!(worker = worker_id, job_id = %job_id, "job row missing, dropping");
                return;
            }
            Err(e) => {
                tracing::error!(worker = worker_id, job_id = %job_id, error = %e, "job fetch failed");
                return;
            }
        };

        // At-least-once delivery: anything not pending was already claimed
        // or finished by someone else.
        if job.status != JobStatus::Pending.as_str() {
            tracing::debug!(
                worker = worker_id,
                job_id = %job_id,
                status = %job.status,
                "skipping non-pending job"
            );
            return;
        }

        if let Err(e) = self.metadata.update_job_started(job_id).await {
            tracing::error!(worker = worker_id, job_id = %job_id, error = %e, "start transition failed");
            return;
        }

        match self.run_attempt(&job, scratch.path(), shutdown).await {
            Ok((output_filename, output_size)) => {
                if let Err(e) = self
                    .metadata
                    .update_job_completed(job_id, &output_filename, output_size)
                    .await
                {
                    tracing::error!(worker = worker_id, job_id = %job_id, error = %e, "completion update failed");
                    return;
                }
                tracing::info!(
                    worker = worker_id,
                    job_id = %job_id,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    output_filename = %output_filename,
                    input_size = job.input_size,
                    output_size,
                    "job completed"
                );
            }
            Err(AttemptError::Cancelled) => {
                // Shutdown mid-job. The row stays in `processing` and is
                // harvested by the expiry sweeper.
                tracing::warn!(worker = worker_id, job_id = %job_id, "job interrupted by shutdown");
            }
            Err(AttemptError::Failed(message)) => {
                tracing::error!(worker = worker_id, job_id = %job_id, error = %message, "attempt failed");
                self.handle_failure(&job, message).await;
            }
        }
    }

    /// One processing attempt: decrypt, dispatch with the per-operation
    /// deadline, validate, encrypt back. Returns the user-visible filename
    /// and plaintext size.
    async fn run_attempt(
        &self,
        job: &JobRow,
        scratch: &Path,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<(String, i64), AttemptError> {
        let job_id = job.job_id;

        let operation: Operation = job
            .operation
            .parse()
            .map_err(|_| AttemptError::Failed(format!("Unsupported operation: {}", job.operation)))?;

        let key = crypto::derive_key(&self.master_key, &job_id.to_string())
            .map_err(|_| AttemptError::Failed("Encryption key derivation failed".to_string()))?;

        let params = JobParams::from_json(&job.params)
            .map_err(|e| AttemptError::Failed(format!("Invalid parameters: {e}")))?;

        let mut input_ext = job.input_ext();
        if input_ext.is_empty() {
            input_ext = "bin".to_string();
        }
        let scratch_input = scratch.join(format!("input.{input_ext}"));

        let input_blob = self.store.input_path(job_id);
        let decrypt_input = scratch_input.clone();
        let decrypt_key = key;
        let decrypted = tokio::task::spawn_blocking(move || {
            crypto::decrypt_file(&decrypt_key, &input_blob, &decrypt_input)
        })
        .await;
        match decrypted {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                return Err(AttemptError::Failed(format!("Failed to decrypt input: {e}")));
            }
            Err(e) => {
                return Err(AttemptError::Failed(format!("Decrypt task failed: {e}")));
            }
        }

        let output_ext = if params.output_format.is_empty() {
            input_ext.clone()
        } else {
            params.output_format.clone()
        };
        let scratch_output = scratch.join(format!("output.{output_ext}"));

        tracing::info!(
            job_id = %job_id,
            operation = %operation,
            original_name = %job.original_name,
            output_ext = %output_ext,
            "processing"
        );

        // Only the processor invocation runs under the per-operation
        // deadline; the crypto phases answer to the worker lifetime alone.
        let ctx = ProcessContext {
            http: &self.http,
            rembg_url: &self.config.rembg_url,
            scratch,
        };
        let deadline = self.config.timeout_for(operation);
        let dispatched = tokio::select! {
            result = tokio::time::timeout(
                deadline,
                processors::dispatch(operation, &scratch_input, &scratch_output, &ctx, &params),
            ) => result,
            _ = shutdown.wait_for(|stop| *stop) => return Err(AttemptError::Cancelled),
        };
        match dispatched {
            Ok(Ok(())) => {}
            Ok(Err(ProcessError::Failed(msg))) => return Err(AttemptError::Failed(msg)),
            Ok(Err(ProcessError::Io(e))) => {
                return Err(AttemptError::Failed(format!("processing I/O error: {e}")));
            }
            Err(_) => return Err(AttemptError::Failed("operation timed out".to_string())),
        }

        let output_size = match tokio::fs::metadata(&scratch_output).await {
            Ok(meta) if meta.len() > 0 => meta.len() as i64,
            _ => {
                return Err(AttemptError::Failed(
                    "Processing completed but output file is missing or empty".to_string(),
                ));
            }
        };

        let output_blob = self.store.output_path(job_id);
        let encrypt_key = key;
        let encrypted = tokio::task::spawn_blocking(move || {
            crypto::encrypt_file(&encrypt_key, &scratch_output, &output_blob)
        })
        .await;
        match encrypted {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                return Err(AttemptError::Failed(format!("Failed to encrypt output: {e}")));
            }
            Err(e) => {
                return Err(AttemptError::Failed(format!("Encrypt task failed: {e}")));
            }
        }

        let output_filename =
            fileforge_core::operations::output_name(&job.original_name, &params.output_format);
        Ok((output_filename, output_size))
    }

    /// Retry accounting: put the job back while the budget lasts, fail it
    /// terminally otherwise. A failed requeue fails the job immediately
    /// rather than stranding a pending row outside the queue.
    async fn handle_failure(&self, job: &JobRow, message: String) {
        let job_id = job.job_id;

        let retry_count = match self.metadata.increment_retry_count(job_id).await {
            Ok(count) => count,
            Err(e) => {
                tracing::error!(job_id = %job_id, error = %e, "retry increment failed");
                self.fail(job_id, &message).await;
                return;
            }
        };

        let max_retries = job
            .operation
            .parse::<Operation>()
            .map(|op| self.config.max_retries_for(op))
            .unwrap_or(0);

        if retry_count <= max_retries as i32 {
            tracing::warn!(
                job_id = %job_id,
                attempt = retry_count,
                max_retries,
                error = %message,
                "requeueing failed job"
            );
            if let Err(e) = self.queue.requeue(job_id).await {
                tracing::error!(job_id = %job_id, error = %e, "requeue failed");
                self.fail(job_id, &message).await;
            }
        } else {
            tracing::error!(
                job_id = %job_id,
                attempts = retry_count,
                error = %message,
                "job permanently failed"
            );
            self.fail(job_id, &message).await;
        }
    }

    async fn fail(&self, job_id: Uuid, message: &str) {
        if let Err(e) = self.metadata.update_job_failed(job_id, message).await {
            tracing::error!(job_id = %job_id, error = %e, "failed to mark job failed");
        }
    }
}
