//! Worker pool for FileForge.
//!
//! Workers pop job ids from the queue, decrypt the input into a per-job
//! scratch directory, run the processor adapter for the operation under a
//! bounded timeout, and encrypt the result back into the blob store.

pub mod processors;
pub mod runner;

pub use runner::Worker;
