//! Periodic expiry sweeper.
//!
//! Runs on the API side: deletes expired job rows (row first, then their
//! blobs) and zeroes stale hourly counters. The first tick fires
//! immediately at startup.

use crate::state::AppState;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Spawn the sweeper. It exits when `shutdown` flips to true.
pub fn spawn(state: AppState, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let period = Duration::from_secs(state.config.cleanup_interval_minutes.max(1) * 60);
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        tracing::info!(period_secs = period.as_secs(), "sweeper started");
        loop {
            if *shutdown.borrow() {
                tracing::info!("sweeper stopping");
                return;
            }
            tokio::select! {
                _ = ticker.tick() => sweep_once(&state).await,
                _ = shutdown.changed() => {}
            }
        }
    })
}

/// One sweep: expire rows, remove their blobs, reset hourly counters.
pub async fn sweep_once(state: &AppState) {
    match state.metadata.cleanup_expired_jobs().await {
        Ok(ids) => {
            if !ids.is_empty() {
                tracing::info!(expired = ids.len(), "removed expired jobs");
            }
            for id in ids {
                state.store.delete_job_files(id);
            }
        }
        Err(e) => tracing::error!(error = %e, "expiry cleanup failed"),
    }

    match state.metadata.reset_hourly_counts().await {
        Ok(reset) if reset > 0 => tracing::debug!(reset, "hourly counters reset"),
        Ok(_) => {}
        Err(e) => tracing::error!(error = %e, "hourly counter reset failed"),
    }
}
