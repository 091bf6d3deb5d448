//! Server test utilities.
//!
//! These tests need live Postgres and Redis. Set
//! `FILEFORGE_TEST_DATABASE_URL` and `FILEFORGE_TEST_REDIS_URL` to run
//! them; every test skips itself otherwise.

use fileforge_core::Config;
use fileforge_metadata::JobStore;
use fileforge_queue::WorkQueue;
use fileforge_server::{create_router, AppState};
use fileforge_storage::BlobStore;
use std::sync::Arc;
use tempfile::TempDir;

/// A test server with all dependencies wired to test infrastructure.
/// Note: #[allow(dead_code)] because each test file compiles common/
/// separately.
#[allow(dead_code)]
pub struct TestServer {
    pub router: axum::Router,
    pub state: AppState,
    _storage_dir: TempDir,
}

#[allow(dead_code)]
impl TestServer {
    /// Create a test server, or `None` when the test infrastructure env
    /// vars are unset.
    pub async fn new_or_skip() -> Option<Self> {
        Self::with_config_or_skip(|_| {}).await
    }

    /// Same, with a configuration tweak applied before wiring.
    pub async fn with_config_or_skip<F>(modifier: F) -> Option<Self>
    where
        F: FnOnce(&mut Config),
    {
        let (Ok(db_url), Ok(redis_url)) = (
            std::env::var("FILEFORGE_TEST_DATABASE_URL"),
            std::env::var("FILEFORGE_TEST_REDIS_URL"),
        ) else {
            eprintln!(
                "skipping: FILEFORGE_TEST_DATABASE_URL / FILEFORGE_TEST_REDIS_URL not set"
            );
            return None;
        };

        let storage_dir = tempfile::tempdir().expect("failed to create storage dir");
        let mut config = Config::for_testing();
        config.storage_path = storage_dir.path().to_path_buf();
        modifier(&mut config);

        let metadata = JobStore::from_url(&db_url, 5)
            .await
            .expect("failed to connect to test database");
        let queue = WorkQueue::connect(&redis_url, 2)
            .await
            .expect("failed to connect to test redis");
        let store = BlobStore::new(&config.storage_path).expect("failed to open blob store");

        let state = AppState::new(config, Arc::new(metadata), Arc::new(queue), Arc::new(store));
        let router = create_router(state.clone());

        Some(Self {
            router,
            state,
            _storage_dir: storage_dir,
        })
    }
}

/// Unique admission identity per test so suites can share a database.
#[allow(dead_code)]
pub fn test_ip() -> String {
    format!("test-{}", uuid::Uuid::new_v4())
}

/// Build a multipart/form-data body. Returns (content type, body bytes).
#[allow(dead_code)]
pub fn multipart_body(
    fields: &[(&str, &str)],
    file: Option<(&str, &[u8])>,
) -> (String, Vec<u8>) {
    let boundary = "fileforge-test-boundary";
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    if let Some((filename, bytes)) = file {
        body.extend_from_slice(
            format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
    (format!("multipart/form-data; boundary={boundary}"), body)
}
