//! Job and session repository for FileForge.
//!
//! This crate owns the control-plane data model:
//! - Per-IP admission sessions (counters, rate state, flagging)
//! - Job rows and their lifecycle state machine
//! - Expiry cleanup and operational counters

pub mod error;
pub mod models;
pub mod postgres;

pub use error::{MetadataError, MetadataResult};
pub use models::{AdminStats, JobResponse, JobRow, JobStatus, SessionRow};
pub use postgres::JobStore;
