//! HTTP handlers.

pub mod admin;
pub mod download;
pub mod jobs;

pub use admin::admin_stats;
pub use download::download;
pub use jobs::{create_job, delete_job, get_job};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use uuid::Uuid;

/// GET /api/health
pub async fn health(State(state): State<AppState>) -> Response {
    let database = state.metadata.health_check().await.err().map(|e| e.to_string());
    let redis = state.queue.ping().await.err().map(|e| e.to_string());

    if database.is_none() && redis.is_none() {
        Json(serde_json::json!({"status": "ok", "service": "api"})).into_response()
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "status": "degraded",
                "database": database.unwrap_or_else(|| "ok".to_string()),
                "redis": redis.unwrap_or_else(|| "ok".to_string()),
            })),
        )
            .into_response()
    }
}

/// GET /api/formats
pub async fn formats() -> impl IntoResponse {
    (
        [
            (header::CONTENT_TYPE, "application/json"),
            (header::CACHE_CONTROL, "public, max-age=3600"),
        ],
        fileforge_core::operations::FORMATS_JSON,
    )
}

/// Parse a path segment as a job id.
pub(crate) fn parse_job_id(raw: &str) -> ApiResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| ApiError::BadRequest("Invalid job ID".to_string()))
}
