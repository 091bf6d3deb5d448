//! Environment-driven configuration.
//!
//! Every setting comes from a flat environment variable (`API_PORT`,
//! `POSTGRES_HOST`, ...). Only `ENCRYPTION_MASTER_KEY` has no default:
//! extraction fails at startup when it is missing.

use crate::error::{CoreError, CoreResult};
use crate::operations::Operation;
use figment::providers::Env;
use figment::Figment;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Service configuration shared by the API and worker binaries.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    #[serde(default = "default_postgres_host")]
    pub postgres_host: String,
    #[serde(default = "default_postgres_port")]
    pub postgres_port: u16,
    #[serde(default = "default_postgres_user")]
    pub postgres_user: String,
    #[serde(default = "default_postgres_password")]
    pub postgres_password: String,
    #[serde(default = "default_postgres_db")]
    pub postgres_db: String,

    #[serde(default = "default_redis_host")]
    pub redis_host: String,
    #[serde(default = "default_redis_port")]
    pub redis_port: u16,
    #[serde(default = "default_redis_pool_size")]
    pub redis_pool_size: u32,

    /// 64 hex chars (32 bytes). Required.
    pub encryption_master_key: String,

    #[serde(default = "default_rate_limit_per_hour")]
    pub rate_limit_per_hour: i32,
    #[serde(default = "default_flag_threshold")]
    pub flag_threshold: i64,

    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    #[serde(default = "default_storage_path")]
    pub storage_path: PathBuf,
    #[serde(default = "default_cleanup_interval_minutes")]
    pub cleanup_interval_minutes: u64,
    #[serde(default = "default_file_retention_hours")]
    pub file_retention_hours: i64,

    #[serde(default = "default_worker_concurrency")]
    pub worker_concurrency: usize,
    #[serde(default = "default_rembg_url")]
    pub rembg_url: String,
    #[serde(default = "default_tmp_dir")]
    pub tmp_dir: PathBuf,

    #[serde(default = "default_timeout_image_convert")]
    pub timeout_image_convert: u64,
    #[serde(default = "default_timeout_image_compress")]
    pub timeout_image_compress: u64,
    #[serde(default = "default_timeout_image_remove_bg")]
    pub timeout_image_remove_bg: u64,
    #[serde(default = "default_timeout_pdf_compress")]
    pub timeout_pdf_compress: u64,
    #[serde(default = "default_timeout_audio_convert")]
    pub timeout_audio_convert: u64,
    #[serde(default = "default_timeout_audio_compress")]
    pub timeout_audio_compress: u64,
    #[serde(default = "default_timeout_video_compress")]
    pub timeout_video_compress: u64,

    #[serde(default = "default_retry_media")]
    pub retry_image: u32,
    #[serde(default = "default_retry_media")]
    pub retry_pdf: u32,
    #[serde(default = "default_retry_media")]
    pub retry_audio: u32,
    #[serde(default = "default_retry_video")]
    pub retry_video: u32,
}

fn default_api_port() -> u16 {
    3015
}
fn default_postgres_host() -> String {
    "postgres".to_string()
}
fn default_postgres_port() -> u16 {
    5432
}
fn default_postgres_user() -> String {
    "fileforge".to_string()
}
fn default_postgres_password() -> String {
    "changeme".to_string()
}
fn default_postgres_db() -> String {
    "fileforge".to_string()
}
fn default_redis_host() -> String {
    "redis".to_string()
}
fn default_redis_port() -> u16 {
    6379
}
fn default_redis_pool_size() -> u32 {
    10
}
fn default_rate_limit_per_hour() -> i32 {
    60
}
fn default_flag_threshold() -> i64 {
    200
}
fn default_max_file_size() -> u64 {
    500 * 1024 * 1024
}
fn default_storage_path() -> PathBuf {
    PathBuf::from("/app/storage")
}
fn default_cleanup_interval_minutes() -> u64 {
    10
}
fn default_file_retention_hours() -> i64 {
    24
}
fn default_worker_concurrency() -> usize {
    4
}
fn default_rembg_url() -> String {
    "http://rembg:5000".to_string()
}
fn default_tmp_dir() -> PathBuf {
    PathBuf::from("/tmp/processing")
}
fn default_timeout_image_convert() -> u64 {
    120
}
fn default_timeout_image_compress() -> u64 {
    120
}
fn default_timeout_image_remove_bg() -> u64 {
    180
}
fn default_timeout_pdf_compress() -> u64 {
    300
}
fn default_timeout_audio_convert() -> u64 {
    300
}
fn default_timeout_audio_compress() -> u64 {
    300
}
fn default_timeout_video_compress() -> u64 {
    1800
}
fn default_retry_media() -> u32 {
    2
}
fn default_retry_video() -> u32 {
    1
}

impl Config {
    /// Load configuration from the environment. Fails when
    /// `ENCRYPTION_MASTER_KEY` is missing or not 64 hex chars.
    pub fn load() -> CoreResult<Self> {
        let config: Config = Figment::new()
            .merge(Env::raw())
            .extract()
            .map_err(|e| CoreError::Config(e.to_string()))?;
        config.master_key()?;
        Ok(config)
    }

    /// Decode and validate the master encryption key.
    pub fn master_key(&self) -> CoreResult<[u8; 32]> {
        let bytes = hex::decode(self.encryption_master_key.trim()).map_err(|_| {
            CoreError::Config(
                "ENCRYPTION_MASTER_KEY must be valid hex (generate with: openssl rand -hex 32)"
                    .to_string(),
            )
        })?;
        let len = bytes.len();
        bytes.as_slice().try_into().map_err(|_| {
            CoreError::Config(format!(
                "ENCRYPTION_MASTER_KEY must be 64 hex chars (32 bytes), got {len} bytes"
            ))
        })
    }

    pub fn redis_url(&self) -> String {
        format!("redis://{}:{}", self.redis_host, self.redis_port)
    }

    /// Wall-clock budget for one processing attempt of `op`.
    pub fn timeout_for(&self, op: Operation) -> Duration {
        let secs = match op {
            Operation::ImageConvert => self.timeout_image_convert,
            Operation::ImageCompress => self.timeout_image_compress,
            Operation::ImageRemoveBg => self.timeout_image_remove_bg,
            Operation::PdfCompress => self.timeout_pdf_compress,
            Operation::AudioConvert => self.timeout_audio_convert,
            Operation::AudioCompress => self.timeout_audio_compress,
            Operation::VideoCompress => self.timeout_video_compress,
        };
        Duration::from_secs(secs)
    }

    /// Retry budget for `op` (attempts beyond the first).
    pub fn max_retries_for(&self, op: Operation) -> u32 {
        match op {
            Operation::ImageConvert | Operation::ImageCompress | Operation::ImageRemoveBg => {
                self.retry_image
            }
            Operation::PdfCompress => self.retry_pdf,
            Operation::AudioConvert | Operation::AudioCompress => self.retry_audio,
            Operation::VideoCompress => self.retry_video,
        }
    }

    /// A localhost configuration for tests. The master key is a fixed
    /// test-only value.
    pub fn for_testing() -> Self {
        Self {
            api_port: 0,
            postgres_host: "localhost".to_string(),
            postgres_port: 5432,
            postgres_user: "fileforge".to_string(),
            postgres_password: "fileforge".to_string(),
            postgres_db: "fileforge_test".to_string(),
            redis_host: "localhost".to_string(),
            redis_port: 6379,
            redis_pool_size: 2,
            encryption_master_key:
                "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f".to_string(),
            rate_limit_per_hour: 10_000,
            flag_threshold: 1_000_000,
            max_file_size: 16 * 1024 * 1024,
            storage_path: std::env::temp_dir().join("fileforge-test-storage"),
            cleanup_interval_minutes: 10,
            file_retention_hours: 24,
            worker_concurrency: 1,
            rembg_url: "http://localhost:5000".to_string(),
            tmp_dir: std::env::temp_dir().join("fileforge-test-tmp"),
            timeout_image_convert: default_timeout_image_convert(),
            timeout_image_compress: default_timeout_image_compress(),
            timeout_image_remove_bg: default_timeout_image_remove_bg(),
            timeout_pdf_compress: default_timeout_pdf_compress(),
            timeout_audio_convert: default_timeout_audio_convert(),
            timeout_audio_compress: default_timeout_audio_compress(),
            timeout_video_compress: default_timeout_video_compress(),
            retry_image: default_retry_media(),
            retry_pdf: default_retry_media(),
            retry_audio: default_retry_media(),
            retry_video: default_retry_video(),
        }
    }
}
