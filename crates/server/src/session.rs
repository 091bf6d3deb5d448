//! Per-IP admission in front of the job routes.
//!
//! Every admitted request touches its session row exactly once. A flagged
//! session is refused outright; a session over its hourly budget gets a 429
//! with a Retry-After. The updated session rides the request extensions for
//! the handler.

use crate::error::ApiError;
use crate::state::AppState;
use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use fileforge_metadata::SessionRow;
use std::net::SocketAddr;
use std::sync::Arc;

/// The admitted session, inserted into request extensions.
#[derive(Clone)]
pub struct CurrentSession(pub Arc<SessionRow>);

/// Client IP resolution: X-Real-IP, then the first X-Forwarded-For entry,
/// then the socket peer. The service sits behind its own reverse proxy, so
/// the headers are authoritative when present.
pub fn client_ip(req: &Request<Body>) -> Option<String> {
    if let Some(real_ip) = req.headers().get("x-real-ip") {
        if let Ok(s) = real_ip.to_str() {
            let s = s.trim();
            if !s.is_empty() {
                return Some(s.to_string());
            }
        }
    }

    if let Some(forwarded) = req.headers().get("x-forwarded-for") {
        if let Ok(s) = forwarded.to_str() {
            if let Some(first) = s.split(',').next() {
                let first = first.trim();
                if !first.is_empty() {
                    return Some(first.to_string());
                }
            }
        }
    }

    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip().to_string())
}

/// Admission middleware for the job routes.
pub async fn session_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let Some(ip) = client_ip(&req) else {
        return ApiError::BadRequest("Could not determine client IP".to_string()).into_response();
    };

    let session = match state
        .metadata
        .touch_session(&ip, state.config.flag_threshold)
        .await
    {
        Ok(session) => session,
        Err(e) => {
            tracing::error!(ip = %ip, error = %e, "session touch failed");
            return ApiError::Internal("Session error".to_string()).into_response();
        }
    };

    if session.is_flagged {
        tracing::warn!(
            ip = %ip,
            total_requests = session.total_request_count,
            "blocked flagged IP"
        );
        return ApiError::Flagged.into_response();
    }

    if session.hourly_request_count > state.config.rate_limit_per_hour {
        tracing::warn!(
            ip = %ip,
            hourly = session.hourly_request_count,
            limit = state.config.rate_limit_per_hour,
            "rate limited"
        );
        return ApiError::RateLimited.into_response();
    }

    req.extensions_mut().insert(CurrentSession(Arc::new(session)));
    next.run(req).await
}
