//! Operational counters.

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::extract::State;
use axum::Json;
use fileforge_metadata::AdminStats;

/// GET /api/admin/stats
pub async fn admin_stats(State(state): State<AppState>) -> ApiResult<Json<AdminStats>> {
    let mut stats = state.metadata.admin_stats().await.map_err(|e| {
        tracing::error!(error = %e, "admin stats query failed");
        ApiError::Internal("Failed to fetch stats".to_string())
    })?;

    stats.storage_used_mb = state.store.used_mb() as i64;

    // Queue length is best-effort; a Redis hiccup should not fail the
    // whole stats view.
    match state.queue.len().await {
        Ok(len) => stats.queue_length = len,
        Err(e) => tracing::warn!(error = %e, "queue length unavailable"),
    }

    Ok(Json(stats))
}
