//! Job intake, status, and deletion.

use crate::error::{ApiError, ApiResult};
use crate::handlers::parse_job_id;
use crate::session::CurrentSession;
use crate::state::AppState;
use axum::extract::multipart::MultipartError;
use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use fileforge_core::operations::{self, Operation};
use fileforge_core::params::{self, RawParams};
use fileforge_crypto::{derive_key, CryptoError, Encryptor};
use fileforge_metadata::JobResponse;
use std::io::SeekFrom;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use uuid::Uuid;

/// The file field, spooled to an anonymous temp file while the rest of the
/// form is read. The spool is reclaimed when it drops.
struct UploadedFile {
    name: String,
    spool: tokio::fs::File,
    size: u64,
}

fn multipart_error(e: MultipartError) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge("File too large".to_string())
    } else {
        ApiError::BadRequest("Invalid form data".to_string())
    }
}

fn format_bytes(bytes: u64) -> String {
    const UNIT: u64 = 1024;
    if bytes < UNIT {
        return format!("{bytes} B");
    }
    let mut div = UNIT;
    let mut exp = 0;
    let mut n = bytes / UNIT;
    while n >= UNIT {
        div *= UNIT;
        exp += 1;
        n /= UNIT;
    }
    format!("{:.1} {}B", bytes as f64 / div as f64, ['K', 'M', 'G', 'T', 'P', 'E'][exp])
}

/// POST /api/jobs
pub async fn create_job(
    State(state): State<AppState>,
    Extension(session): Extension<CurrentSession>,
    mut multipart: Multipart,
) -> ApiResult<(StatusCode, Json<JobResponse>)> {
    let mut operation_field: Option<String> = None;
    let mut raw = RawParams::default();
    let mut file: Option<UploadedFile> = None;

    while let Some(mut field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "operation" => {
                operation_field =
                    Some(field.text().await.map_err(multipart_error)?.trim().to_string());
            }
            "output_format" => {
                raw.output_format = Some(field.text().await.map_err(multipart_error)?);
            }
            "quality" => raw.quality = Some(field.text().await.map_err(multipart_error)?),
            "lossless" => raw.lossless = Some(field.text().await.map_err(multipart_error)?),
            "image_dpi" => raw.image_dpi = Some(field.text().await.map_err(multipart_error)?),
            "image_quality" => {
                raw.image_quality = Some(field.text().await.map_err(multipart_error)?);
            }
            "file" => {
                let filename = field.file_name().unwrap_or("upload").to_string();
                let spool = tempfile::tempfile()
                    .map_err(|e| ApiError::Internal(format!("spool error: {e}")))?;
                let mut spool = tokio::fs::File::from_std(spool);
                let mut size: u64 = 0;
                while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
                    size += chunk.len() as u64;
                    if size > state.config.max_file_size {
                        return Err(ApiError::PayloadTooLarge(format!(
                            "File too large. Maximum: {}",
                            format_bytes(state.config.max_file_size)
                        )));
                    }
                    spool
                        .write_all(&chunk)
                        .await
                        .map_err(|e| ApiError::Internal(format!("spool error: {e}")))?;
                }
                file = Some(UploadedFile {
                    name: filename,
                    spool,
                    size,
                });
            }
            _ => {}
        }
    }

    let op_str = operation_field.unwrap_or_default();
    let operation: Operation = op_str
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("Invalid operation: {op_str:?}")))?;

    let upload = file.ok_or_else(|| {
        ApiError::BadRequest("No file provided. Use field name 'file'.".to_string())
    })?;
    if upload.size == 0 {
        return Err(ApiError::BadRequest("File is empty".to_string()));
    }

    let input_ext = operations::file_ext(&upload.name);
    if !operations::valid_input_format(operation, &input_ext) {
        return Err(ApiError::BadRequest(format!(
            "Unsupported input format .{input_ext} for {operation}"
        )));
    }

    let job_params = params::resolve(operation, &input_ext, &raw)
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let params_json = job_params
        .to_json()
        .map_err(|e| ApiError::Internal(format!("params encoding: {e}")))?;

    let job = state
        .metadata
        .create_job(
            session.0.session_id,
            operation.as_str(),
            &upload.name,
            upload.size as i64,
            &params_json,
            state.config.file_retention_hours,
        )
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "job insert failed");
            ApiError::Internal("Failed to create job".to_string())
        })?;

    // From here on every failure must undo the row and any blob before
    // surfacing an error.
    let key = match derive_key(&state.master_key, &job.job_id.to_string()) {
        Ok(key) => key,
        Err(e) => {
            tracing::error!(job_id = %job.job_id, error = %e, "key derivation failed");
            abort_intake(&state, job.job_id).await;
            return Err(ApiError::Internal("Internal error".to_string()));
        }
    };

    let mut dst = match state.store.create_input(job.job_id).await {
        Ok(dst) => dst,
        Err(e) => {
            tracing::error!(job_id = %job.job_id, error = %e, "input blob create failed");
            abort_intake(&state, job.job_id).await;
            return Err(ApiError::Internal("Storage error".to_string()));
        }
    };

    let mut spool = upload.spool;
    if let Err(e) = encrypt_spool(&key, &mut spool, &mut dst).await {
        tracing::error!(job_id = %job.job_id, error = %e, "upload encryption failed");
        abort_intake(&state, job.job_id).await;
        return Err(ApiError::Internal("Failed to process upload".to_string()));
    }

    if let Err(e) = state.queue.enqueue(job.job_id).await {
        tracing::error!(job_id = %job.job_id, error = %e, "enqueue failed");
        abort_intake(&state, job.job_id).await;
        return Err(ApiError::Internal("Failed to queue job".to_string()));
    }

    tracing::info!(
        job_id = %job.job_id,
        operation = %operation,
        original_name = %upload.name,
        input_size = upload.size,
        "job created"
    );

    Ok((StatusCode::CREATED, Json(job.to_response())))
}

/// Stream the spooled upload through the encryptor into the input blob,
/// fsyncing the result.
async fn encrypt_spool(
    key: &[u8; 32],
    spool: &mut tokio::fs::File,
    dst: &mut tokio::fs::File,
) -> Result<(), CryptoError> {
    spool.seek(SeekFrom::Start(0)).await?;

    let mut enc = Encryptor::new(key);
    dst.write_all(enc.header()).await?;

    let mut buf = vec![0u8; fileforge_crypto::CHUNK_SIZE];
    loop {
        let n = spool.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        let sealed = enc.update(&buf[..n])?;
        if !sealed.is_empty() {
            dst.write_all(&sealed).await?;
        }
    }
    dst.write_all(&enc.finish()?).await?;
    dst.sync_all().await?;
    Ok(())
}

/// Compensation: delete the job row, then any blobs named by it.
async fn abort_intake(state: &AppState, job_id: Uuid) {
    if let Err(e) = state.metadata.delete_job(job_id).await {
        tracing::error!(job_id = %job_id, error = %e, "compensating row delete failed");
    }
    state.store.delete_job_files(job_id);
}

/// GET /api/jobs/{id}
pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<JobResponse>> {
    let job_id = parse_job_id(&id)?;
    let job = state
        .metadata
        .get_job(job_id)
        .await
        .map_err(|e| {
            tracing::error!(job_id = %job_id, error = %e, "status lookup failed");
            ApiError::Internal("Database error".to_string())
        })?
        .ok_or_else(|| ApiError::NotFound("Job not found".to_string()))?;
    Ok(Json(job.to_response()))
}

/// DELETE /api/jobs/{id}
pub async fn delete_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let job_id = parse_job_id(&id)?;
    let deleted = state.metadata.delete_job(job_id).await.map_err(|e| {
        tracing::error!(job_id = %job_id, error = %e, "delete failed");
        ApiError::Internal("Database error".to_string())
    })?;
    if !deleted {
        return Err(ApiError::NotFound("Job not found".to_string()));
    }

    // Row first, then files. Anything missed here is swept later.
    state.store.delete_job_files(job_id);
    tracing::info!(job_id = %job_id, "job deleted");

    Ok(Json(serde_json::json!({
        "status": "deleted",
        "id": job_id,
    })))
}
