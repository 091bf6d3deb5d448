//! Application state shared across handlers.

use fileforge_core::Config;
use fileforge_metadata::JobStore;
use fileforge_queue::WorkQueue;
use fileforge_storage::BlobStore;
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Service configuration.
    pub config: Arc<Config>,
    /// Master encryption key, validated at startup.
    pub master_key: [u8; 32],
    /// Job and session repository.
    pub metadata: Arc<JobStore>,
    /// Work queue.
    pub queue: Arc<WorkQueue>,
    /// Blob store.
    pub store: Arc<BlobStore>,
}

impl AppState {
    /// Create application state.
    ///
    /// # Panics
    ///
    /// Panics when the configured master key is invalid; `Config::load`
    /// already rejects that at startup.
    pub fn new(
        config: Config,
        metadata: Arc<JobStore>,
        queue: Arc<WorkQueue>,
        store: Arc<BlobStore>,
    ) -> Self {
        let master_key = config
            .master_key()
            .expect("master key validated at configuration load");
        Self {
            config: Arc::new(config),
            master_key,
            metadata,
            queue,
            store,
        }
    }

    /// Request body cap: the upload limit plus multipart framing slack.
    pub fn body_limit(&self) -> usize {
        (self.config.max_file_size + 10 * 1024 * 1024) as usize
    }
}
