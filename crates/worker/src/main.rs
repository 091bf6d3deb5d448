//! FileForge worker binary.

use anyhow::{Context, Result};
use clap::Parser;
use fileforge_core::Config;
use fileforge_metadata::JobStore;
use fileforge_queue::WorkQueue;
use fileforge_storage::BlobStore;
use fileforge_worker::Worker;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// FileForge - transformation worker pool
#[derive(Parser, Debug)]
#[command(name = "fileforge-worker")]
#[command(version, about, long_about = None)]
struct Args {}

/// Workers get this long to finish in-flight jobs after a shutdown signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(120);

#[tokio::main]
async fn main() -> Result<()> {
    let _args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("FileForge worker v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::load().context("failed to load configuration")?;
    let master_key = config.master_key().context("invalid master key")?;

    let metadata = JobStore::from_config(&config)
        .await
        .context("failed to initialize database")?;

    let queue = WorkQueue::connect(&config.redis_url(), config.redis_pool_size)
        .await
        .context("failed to initialize queue")?;

    let store =
        BlobStore::new(&config.storage_path).context("failed to initialize blob storage")?;

    std::fs::create_dir_all(&config.tmp_dir)
        .with_context(|| format!("failed to create tmp dir {}", config.tmp_dir.display()))?;

    let concurrency = config.worker_concurrency.max(1);
    let worker = Arc::new(Worker {
        config: Arc::new(config),
        master_key,
        metadata: Arc::new(metadata),
        queue: Arc::new(queue),
        store: Arc::new(store),
        http: reqwest::Client::new(),
    });

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut handles = Vec::with_capacity(concurrency);
    for worker_id in 0..concurrency {
        // Each worker gets its own queue connection for the blocking pop.
        let pop_queue = WorkQueue::connect(&worker.config.redis_url(), 1)
            .await
            .context("failed to open worker queue connection")?;
        handles.push(tokio::spawn(worker.clone().run(
            worker_id,
            pop_queue,
            shutdown_rx.clone(),
        )));
    }
    tracing::info!(concurrency, "worker pool ready");

    shutdown_signal().await;
    let _ = shutdown_tx.send(true);

    let drain = async {
        for handle in handles {
            let _ = handle.await;
        }
    };
    if tokio::time::timeout(SHUTDOWN_GRACE, drain).await.is_err() {
        tracing::warn!(
            grace_secs = SHUTDOWN_GRACE.as_secs(),
            "shutdown grace elapsed, some jobs may not have completed cleanly"
        );
    }

    tracing::info!("worker stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}
