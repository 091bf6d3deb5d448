//! Streaming download of completed results, decrypted on the fly.

use crate::error::{ApiError, ApiResult};
use crate::handlers::parse_job_id;
use crate::state::AppState;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::Response;
use bytes::Bytes;
use fileforge_core::operations::{file_ext, mime_for_extension, sanitize_filename};
use fileforge_crypto::{derive_key, Decryptor, ENCRYPTED_CHUNK_SIZE, NONCE_SIZE};
use fileforge_metadata::JobStatus;
use futures_core::Stream;
use std::pin::Pin;
use tokio::io::AsyncReadExt;
use uuid::Uuid;

/// GET /api/jobs/{id}/download
pub async fn download(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let job_id = parse_job_id(&id)?;
    let job = state
        .metadata
        .get_job(job_id)
        .await
        .map_err(|e| {
            tracing::error!(job_id = %job_id, error = %e, "download lookup failed");
            ApiError::Internal("Database error".to_string())
        })?
        .ok_or_else(|| ApiError::NotFound("Job not found".to_string()))?;

    if job.status != JobStatus::Completed.as_str() {
        if job.status == JobStatus::Failed.as_str() {
            let message = job
                .error_message
                .unwrap_or_else(|| "Job failed".to_string());
            return Err(ApiError::OperationFailed(message));
        }
        return Err(ApiError::Conflict("Job is still processing".to_string()));
    }

    if !state.store.output_exists(job_id) {
        return Err(ApiError::NotFound(
            "Output file not found (may have expired)".to_string(),
        ));
    }

    let key = derive_key(&state.master_key, &job_id.to_string()).map_err(|e| {
        tracing::error!(job_id = %job_id, error = %e, "key derivation failed");
        ApiError::Internal("Internal error".to_string())
    })?;

    let mut file = state.store.open_output(job_id).await?;

    // The base nonce is read before any headers go out so a corrupt header
    // can still produce a clean error status.
    let mut base_nonce = [0u8; NONCE_SIZE];
    let header_len = read_full(&mut file, &mut base_nonce).await.map_err(|e| {
        tracing::error!(job_id = %job_id, error = %e, "output blob read failed");
        ApiError::Internal("Failed to read file".to_string())
    })?;
    let body = match header_len {
        0 => Body::empty(),
        NONCE_SIZE => {
            let dec = Decryptor::new(&key, base_nonce);
            Body::from_stream(decrypt_body(job_id, file, dec))
        }
        _ => {
            tracing::error!(job_id = %job_id, "output blob has a truncated header");
            return Err(ApiError::Internal("Failed to read file".to_string()));
        }
    };

    let output_name = match job.output_filename.as_deref() {
        Some(name) if !name.is_empty() => name,
        _ => "download",
    };
    let content_type = mime_for_extension(&file_ext(output_name));

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", sanitize_filename(output_name)),
        )
        .header(header::CACHE_CONTROL, "no-store");
    if let Some(size) = job.output_size.filter(|size| *size > 0) {
        builder = builder.header(header::CONTENT_LENGTH, size.to_string());
    }

    builder
        .body(body)
        .map_err(|e| ApiError::Internal(e.to_string()))
}

/// Read as many bytes as possible into `buf`, stopping early only at EOF.
async fn read_full(file: &mut tokio::fs::File, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = file.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// Decrypt the sealed chunks into a response stream. A tag failure is
/// logged and ends the stream mid-response; the status line is long gone
/// by then.
fn decrypt_body(
    job_id: Uuid,
    mut file: tokio::fs::File,
    mut dec: Decryptor,
) -> Pin<Box<dyn Stream<Item = Result<Bytes, std::io::Error>> + Send>> {
    Box::pin(async_stream::try_stream! {
        let mut buf = vec![0u8; ENCRYPTED_CHUNK_SIZE];
        loop {
            let n = read_full(&mut file, &mut buf).await?;
            if n == 0 {
                break;
            }
            let plain = dec.open_chunk(&buf[..n]).map_err(|e| {
                tracing::error!(job_id = %job_id, error = %e, "decrypt failed mid-download");
                std::io::Error::other(e)
            })?;
            yield Bytes::from(plain);
            if n < ENCRYPTED_CHUNK_SIZE {
                break;
            }
        }
    })
}
