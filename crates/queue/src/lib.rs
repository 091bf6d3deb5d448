//! Redis-backed work queue.
//!
//! One list holds pending job ids. Producers LPUSH, workers BRPOP, and a
//! retry goes back with RPUSH, which lands it at the consuming end. The
//! queue offers no delivery acknowledgement; correctness rests on the job
//! row's status guard.

pub mod error;

pub use error::{QueueError, QueueResult};

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::time::Duration;
use uuid::Uuid;

const QUEUE_KEY: &str = "fileforge:jobs:pending";

/// Startup connection attempts before giving up.
const CONNECT_ATTEMPTS: u32 = 30;

/// FIFO of pending job ids.
#[derive(Clone)]
pub struct WorkQueue {
    conn: ConnectionManager,
}

impl WorkQueue {
    /// Connect to Redis, retrying while the server comes up. `pool_size`
    /// is advisory: the multiplexed connection manager replaces explicit
    /// pool sizing.
    pub async fn connect(url: &str, pool_size: u32) -> QueueResult<Self> {
        let client = redis::Client::open(url)?;
        let mut last_err: Option<redis::RedisError> = None;

        for attempt in 1..=CONNECT_ATTEMPTS {
            match ConnectionManager::new(client.clone()).await {
                Ok(mut conn) => match redis::cmd("PING").query_async::<String>(&mut conn).await {
                    Ok(_) => {
                        tracing::info!(pool_size, "connected to Redis");
                        return Ok(Self { conn });
                    }
                    Err(e) => {
                        tracing::warn!(attempt, max_attempts = CONNECT_ATTEMPTS, error = %e, "redis ping failed");
                        last_err = Some(e);
                    }
                },
                Err(e) => {
                    tracing::warn!(attempt, max_attempts = CONNECT_ATTEMPTS, error = %e, "redis not ready");
                    last_err = Some(e);
                }
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }

        Err(last_err
            .map(QueueError::Redis)
            .unwrap_or(QueueError::NotReady(CONNECT_ATTEMPTS)))
    }

    pub async fn ping(&self) -> QueueResult<()> {
        let mut conn = self.conn.clone();
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(())
    }

    /// Append a fresh job id to the queue.
    pub async fn enqueue(&self, job_id: Uuid) -> QueueResult<()> {
        let mut conn = self.conn.clone();
        let _: i64 = conn.lpush(QUEUE_KEY, job_id.to_string()).await?;
        Ok(())
    }

    /// Blocking pop with a timeout. `None` means the timeout elapsed with
    /// nothing to do.
    pub async fn dequeue(&self, timeout: Duration) -> QueueResult<Option<String>> {
        let mut conn = self.conn.clone();
        let popped: Option<(String, String)> =
            conn.brpop(QUEUE_KEY, timeout.as_secs_f64()).await?;
        Ok(popped.map(|(_, job_id)| job_id))
    }

    /// Put a job id back for another attempt. Requeued ids are served
    /// before older fresh enqueues.
    pub async fn requeue(&self, job_id: Uuid) -> QueueResult<()> {
        let mut conn = self.conn.clone();
        let _: i64 = conn.rpush(QUEUE_KEY, job_id.to_string()).await?;
        Ok(())
    }

    pub async fn len(&self) -> QueueResult<i64> {
        let mut conn = self.conn.clone();
        Ok(conn.llen(QUEUE_KEY).await?)
    }
}
