//! HTTP API for FileForge.
//!
//! This crate provides the intake side of the service:
//! - Per-IP admission in front of every job route
//! - Multipart upload intake (encrypt, persist, enqueue, compensate)
//! - Status, streaming download, and delete endpoints
//! - The periodic expiry sweeper

pub mod error;
pub mod handlers;
pub mod routes;
pub mod session;
pub mod state;
pub mod sweeper;

pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
