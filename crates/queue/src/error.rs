//! Queue error types.

use thiserror::Error;

/// Errors from the Redis work queue.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("redis not ready after {0} attempts")]
    NotReady(u32),
}

/// Result type for queue operations.
pub type QueueResult<T> = std::result::Result<T, QueueError>;
