//! Route configuration.

use crate::handlers;
use crate::session::session_middleware;
use crate::state::AppState;
use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    // Health and the static format catalog bypass admission so probes and
    // UI bootstrapping never consume a session's budget.
    let open_routes = Router::new()
        .route("/api/health", get(handlers::health))
        .route("/api/formats", get(handlers::formats));

    let job_routes = Router::new()
        .route("/api/jobs", post(handlers::create_job))
        .route(
            "/api/jobs/{id}",
            get(handlers::get_job).delete(handlers::delete_job),
        )
        .route("/api/jobs/{id}/download", get(handlers::download))
        .route("/api/admin/stats", get(handlers::admin_stats))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            session_middleware,
        ))
        .layer(DefaultBodyLimit::max(state.body_limit()));

    Router::new()
        .merge(open_routes)
        .merge(job_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
