//! Database rows and API response shapes.

use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Lifecycle states of a job row.
///
/// Transitions: pending -> processing -> completed | failed. A transient
/// failure is modelled by the retry increment resetting the row to pending;
/// there is no failed -> pending revival.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

/// Per-IP admission record.
#[derive(Debug, Clone, FromRow)]
pub struct SessionRow {
    pub session_id: Uuid,
    pub ip_address: String,
    pub created_at: OffsetDateTime,
    pub last_request_at: OffsetDateTime,
    pub hourly_request_count: i32,
    pub total_request_count: i64,
    pub is_flagged: bool,
}

/// A persisted unit of transformation work.
#[derive(Debug, Clone, FromRow)]
pub struct JobRow {
    pub job_id: Uuid,
    pub session_id: Uuid,
    pub operation: String,
    pub status: String,
    pub original_name: String,
    pub input_size: i64,
    pub output_size: Option<i64>,
    pub output_filename: Option<String>,
    /// Structured params as JSON text.
    pub params: String,
    pub error_message: Option<String>,
    pub retry_count: i32,
    pub created_at: OffsetDateTime,
    pub started_at: Option<OffsetDateTime>,
    pub completed_at: Option<OffsetDateTime>,
    pub expires_at: OffsetDateTime,
}

impl JobRow {
    /// Lowercased extension of the original filename, without alias folding.
    pub fn input_ext(&self) -> String {
        std::path::Path::new(&self.original_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default()
    }

    pub fn to_response(&self) -> JobResponse {
        JobResponse {
            id: self.job_id,
            operation: self.operation.clone(),
            status: self.status.clone(),
            input_size: self.input_size,
            output_size: self.output_size,
            original_name: self.original_name.clone(),
            output_filename: self.output_filename.clone(),
            error_message: self.error_message.clone(),
            created_at: self.created_at,
            started_at: self.started_at,
            completed_at: self.completed_at,
        }
    }
}

/// Client-facing job representation.
#[derive(Debug, Clone, Serialize)]
pub struct JobResponse {
    pub id: Uuid,
    pub operation: String,
    pub status: String,
    pub input_size: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_size: Option<i64>,
    pub original_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option", skip_serializing_if = "Option::is_none")]
    pub started_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option", skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<OffsetDateTime>,
}

/// Operational counters for `GET /api/admin/stats`. The repository fills
/// the database-derived fields; queue length and storage usage are filled
/// by the caller.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AdminStats {
    pub queue_length: i64,
    pub active_jobs: i64,
    pub completed_24h: i64,
    pub failed_24h: i64,
    pub active_sessions: i64,
    pub storage_used_mb: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_job() -> JobRow {
        JobRow {
            job_id: Uuid::new_v4(),
            session_id: Uuid::new_v4(),
            operation: "image_convert".to_string(),
            status: JobStatus::Pending.as_str().to_string(),
            original_name: "Photo.JPG".to_string(),
            input_size: 1234,
            output_size: None,
            output_filename: None,
            params: "{}".to_string(),
            error_message: None,
            retry_count: 0,
            created_at: OffsetDateTime::now_utc(),
            started_at: None,
            completed_at: None,
            expires_at: OffsetDateTime::now_utc(),
        }
    }

    #[test]
    fn input_ext_is_lowercased_without_alias_folding() {
        let mut job = sample_job();
        assert_eq!(job.input_ext(), "jpg");
        job.original_name = "noext".to_string();
        assert_eq!(job.input_ext(), "");
    }

    #[test]
    fn pending_response_omits_optional_fields() {
        let json = serde_json::to_value(sample_job().to_response()).unwrap();
        assert_eq!(json["status"], "pending");
        assert_eq!(json["input_size"], 1234);
        assert!(json.get("output_size").is_none());
        assert!(json.get("error_message").is_none());
        assert!(json.get("started_at").is_none());
        assert!(json["created_at"].as_str().unwrap().contains('T'));
    }

    #[test]
    fn completed_response_carries_output_fields() {
        let mut job = sample_job();
        job.status = JobStatus::Completed.as_str().to_string();
        job.output_size = Some(999);
        job.output_filename = Some("Photo.png".to_string());
        job.completed_at = Some(OffsetDateTime::now_utc());

        let json = serde_json::to_value(job.to_response()).unwrap();
        assert_eq!(json["output_size"], 999);
        assert_eq!(json["output_filename"], "Photo.png");
        assert!(json.get("completed_at").is_some());
    }
}
