//! PostgreSQL-backed job and session repository.
//!
//! Every mutating operation is a single SQL statement, so row-level
//! atomicity comes from the database rather than application locks.

use crate::error::{MetadataError, MetadataResult};
use crate::models::{AdminStats, JobRow, SessionRow};
use fileforge_core::Config;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{PgPool, Pool, Postgres};
use std::str::FromStr;
use std::time::Duration;
use time::OffsetDateTime;
use uuid::Uuid;

/// Embedded schema (applied statement by statement).
const POSTGRES_SCHEMA: &str = include_str!("postgres_schema.sql");

/// Startup connection attempts before giving up. The database container
/// routinely comes up after the service does.
const CONNECT_ATTEMPTS: u32 = 30;

/// Error messages are capped at this many bytes before persistence.
const MAX_ERROR_BYTES: usize = 1000;

fn schema_statements(schema: &str) -> Vec<&str> {
    schema
        .split(';')
        .filter_map(|statement| {
            let trimmed = statement.trim();
            if trimmed.is_empty() {
                return None;
            }
            let has_sql = trimmed.lines().any(|line| {
                let line = line.trim();
                !line.is_empty() && !line.starts_with("--")
            });
            has_sql.then_some(trimmed)
        })
        .collect()
}

/// Truncate `msg` to at most `limit` bytes on a char boundary, appending an
/// ellipsis marker when anything was cut.
pub fn truncate_error(msg: &str, limit: usize) -> String {
    if msg.len() <= limit {
        return msg.to_string();
    }
    let mut cut = limit;
    while !msg.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…", &msg[..cut])
}

/// PostgreSQL job store.
#[derive(Debug, Clone)]
pub struct JobStore {
    pool: Pool<Postgres>,
}

impl JobStore {
    /// Connect using the service configuration, retrying while the
    /// database comes up, then apply the schema.
    pub async fn from_config(config: &Config) -> MetadataResult<Self> {
        let opts = PgConnectOptions::new()
            .host(&config.postgres_host)
            .port(config.postgres_port)
            .username(&config.postgres_user)
            .password(&config.postgres_password)
            .database(&config.postgres_db);

        tracing::info!(
            host = %config.postgres_host,
            port = config.postgres_port,
            database = %config.postgres_db,
            "connecting to PostgreSQL"
        );

        Self::connect(opts, 25).await
    }

    /// Connect from a full connection URL (used by tests and tooling).
    pub async fn from_url(url: &str, max_connections: u32) -> MetadataResult<Self> {
        let opts = PgConnectOptions::from_str(url)?;
        Self::connect(opts, max_connections).await
    }

    async fn connect(opts: PgConnectOptions, max_connections: u32) -> MetadataResult<Self> {
        let mut last_err: Option<sqlx::Error> = None;

        for attempt in 1..=CONNECT_ATTEMPTS {
            match PgPoolOptions::new()
                .max_connections(max_connections)
                .connect_with(opts.clone())
                .await
            {
                Ok(pool) => {
                    let store = Self { pool };
                    store.migrate().await?;
                    tracing::info!("connected to PostgreSQL");
                    return Ok(store);
                }
                Err(e) => {
                    tracing::warn!(
                        attempt,
                        max_attempts = CONNECT_ATTEMPTS,
                        error = %e,
                        "database not ready"
                    );
                    last_err = Some(e);
                }
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }

        Err(last_err.map(MetadataError::Database).unwrap_or_else(|| {
            MetadataError::Config(format!(
                "database not ready after {CONNECT_ATTEMPTS} attempts"
            ))
        }))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn migrate(&self) -> MetadataResult<()> {
        // Postgres rejects multi-statement prepared statements, so the
        // schema runs one statement at a time.
        for statement in schema_statements(POSTGRES_SCHEMA) {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    pub async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Upsert the session for `ip`: bump counters, reset the hourly count
    /// when the previous request is over an hour old, and flag the session
    /// once the cumulative count reaches `flag_threshold`. Flagging is
    /// monotonic.
    pub async fn touch_session(
        &self,
        ip: &str,
        flag_threshold: i64,
    ) -> MetadataResult<SessionRow> {
        let session = sqlx::query_as::<_, SessionRow>(
            r#"
            INSERT INTO sessions (session_id, ip_address, hourly_request_count, total_request_count)
            VALUES ($1, $2, 1, 1)
            ON CONFLICT (ip_address) DO UPDATE SET
                last_request_at = NOW(),
                hourly_request_count = CASE
                    WHEN sessions.last_request_at < NOW() - INTERVAL '1 hour' THEN 1
                    ELSE sessions.hourly_request_count + 1
                END,
                total_request_count = sessions.total_request_count + 1,
                is_flagged = sessions.is_flagged OR sessions.total_request_count + 1 >= $3
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(ip)
        .bind(flag_threshold)
        .fetch_one(&self.pool)
        .await?;
        Ok(session)
    }

    /// Zero the hourly counter of every session idle for over an hour.
    /// Returns the number of sessions reset.
    pub async fn reset_hourly_counts(&self) -> MetadataResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE sessions
            SET hourly_request_count = 0
            WHERE hourly_request_count > 0
              AND last_request_at < NOW() - INTERVAL '1 hour'
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Insert a new pending job with a fresh id.
    pub async fn create_job(
        &self,
        session_id: Uuid,
        operation: &str,
        original_name: &str,
        input_size: i64,
        params_json: &str,
        retention_hours: i64,
    ) -> MetadataResult<JobRow> {
        let expires_at = OffsetDateTime::now_utc() + time::Duration::hours(retention_hours);
        let job = sqlx::query_as::<_, JobRow>(
            r#"
            INSERT INTO jobs (job_id, session_id, operation, original_name, input_size, params, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(session_id)
        .bind(operation)
        .bind(original_name)
        .bind(input_size)
        .bind(params_json)
        .bind(expires_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(job)
    }

    pub async fn get_job(&self, job_id: Uuid) -> MetadataResult<Option<JobRow>> {
        let job = sqlx::query_as::<_, JobRow>("SELECT * FROM jobs WHERE job_id = $1")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(job)
    }

    pub async fn update_job_started(&self, job_id: Uuid) -> MetadataResult<()> {
        sqlx::query("UPDATE jobs SET status = 'processing', started_at = NOW() WHERE job_id = $1")
            .bind(job_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn update_job_completed(
        &self,
        job_id: Uuid,
        output_filename: &str,
        output_size: i64,
    ) -> MetadataResult<()> {
        sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'completed',
                output_filename = $2,
                output_size = $3,
                completed_at = NOW()
            WHERE job_id = $1
            "#,
        )
        .bind(job_id)
        .bind(output_filename)
        .bind(output_size)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn update_job_failed(&self, job_id: Uuid, message: &str) -> MetadataResult<()> {
        sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'failed',
                error_message = $2,
                completed_at = NOW()
            WHERE job_id = $1
            "#,
        )
        .bind(job_id)
        .bind(truncate_error(message, MAX_ERROR_BYTES))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Atomically bump the retry counter and put the job back in `pending`.
    /// Returns the new count.
    pub async fn increment_retry_count(&self, job_id: Uuid) -> MetadataResult<i32> {
        let count: Option<i32> = sqlx::query_scalar(
            r#"
            UPDATE jobs SET retry_count = retry_count + 1, status = 'pending'
            WHERE job_id = $1
            RETURNING retry_count
            "#,
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?;
        count.ok_or_else(|| MetadataError::NotFound(format!("job {job_id}")))
    }

    /// Hard delete. Returns whether a row existed.
    pub async fn delete_job(&self, job_id: Uuid) -> MetadataResult<bool> {
        let result = sqlx::query("DELETE FROM jobs WHERE job_id = $1")
            .bind(job_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete every expired job row and return the deleted ids so the
    /// caller can remove the matching blobs.
    pub async fn cleanup_expired_jobs(&self) -> MetadataResult<Vec<Uuid>> {
        let ids: Vec<Uuid> =
            sqlx::query_scalar("DELETE FROM jobs WHERE expires_at < NOW() RETURNING job_id")
                .fetch_all(&self.pool)
                .await?;
        Ok(ids)
    }

    /// Database-derived operational counters. `queue_length` and
    /// `storage_used_mb` are left for the caller.
    pub async fn admin_stats(&self) -> MetadataResult<AdminStats> {
        let active_jobs: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM jobs WHERE status IN ('pending', 'processing')",
        )
        .fetch_one(&self.pool)
        .await?;
        let completed_24h: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM jobs WHERE status = 'completed' AND completed_at > NOW() - INTERVAL '24 hours'",
        )
        .fetch_one(&self.pool)
        .await?;
        let failed_24h: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM jobs WHERE status = 'failed' AND completed_at > NOW() - INTERVAL '24 hours'",
        )
        .fetch_one(&self.pool)
        .await?;
        let active_sessions: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sessions WHERE last_request_at > NOW() - INTERVAL '24 hours'",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(AdminStats {
            queue_length: 0,
            active_jobs,
            completed_24h,
            failed_24h,
            active_sessions,
            storage_used_mb: 0,
        })
    }
}
