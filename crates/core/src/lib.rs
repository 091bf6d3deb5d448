//! Shared domain types and configuration for FileForge.
//!
//! This crate holds everything both binaries agree on:
//! - Environment-driven configuration
//! - The operation catalog and input/output format tables
//! - Job parameter resolution and validation
//! - Output naming, filename sanitisation, and the MIME table

pub mod config;
pub mod error;
pub mod operations;
pub mod params;

pub use config::Config;
pub use error::{CoreError, CoreResult};
pub use operations::Operation;
pub use params::JobParams;
