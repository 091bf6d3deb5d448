//! FileForge API server binary.

use anyhow::{Context, Result};
use clap::Parser;
use fileforge_core::Config;
use fileforge_metadata::JobStore;
use fileforge_queue::WorkQueue;
use fileforge_server::{create_router, sweeper, AppState};
use fileforge_storage::BlobStore;
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// FileForge - asynchronous file transformation API
#[derive(Parser, Debug)]
#[command(name = "fileforge-api")]
#[command(version, about, long_about = None)]
struct Args {}

/// Connections still draining this long after the shutdown signal are
/// abandoned.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    let _args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("FileForge API v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::load().context("failed to load configuration")?;

    let metadata = JobStore::from_config(&config)
        .await
        .context("failed to initialize database")?;
    tracing::info!("job repository initialized");

    let queue = WorkQueue::connect(&config.redis_url(), config.redis_pool_size)
        .await
        .context("failed to initialize queue")?;
    tracing::info!("work queue initialized");

    let store =
        BlobStore::new(&config.storage_path).context("failed to initialize blob storage")?;
    tracing::info!(path = %config.storage_path.display(), "blob storage initialized");

    let api_port = config.api_port;
    let state = AppState::new(config, Arc::new(metadata), Arc::new(queue), Arc::new(store));

    // The sweeper shares the shutdown signal with the HTTP drain logic.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper_handle = sweeper::spawn(state.clone(), shutdown_rx);

    let app = create_router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], api_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;
    tracing::info!("listening on {addr}");

    let signal_tx = shutdown_tx.clone();
    let server = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        shutdown_signal().await;
        let _ = signal_tx.send(true);
    });

    let mut drain_rx = shutdown_tx.subscribe();
    tokio::select! {
        result = server.into_future() => result.context("server error")?,
        _ = async {
            let _ = drain_rx.wait_for(|stop| *stop).await;
            tokio::time::sleep(DRAIN_TIMEOUT).await;
        } => {
            tracing::warn!(
                timeout_secs = DRAIN_TIMEOUT.as_secs(),
                "graceful drain timed out, abandoning open connections"
            );
        }
    }

    let _ = shutdown_tx.send(true);
    let _ = sweeper_handle.await;
    tracing::info!("API server stopped");
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
