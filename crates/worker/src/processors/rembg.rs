//! Background removal via the sidecar HTTP service.

use super::{truncate_output, ProcessError};
use fileforge_core::JobParams;
use std::path::Path;

/// POST the decrypted image to the removal service and write the returned
/// bytes to `output`.
pub async fn remove_background(
    http: &reqwest::Client,
    base_url: &str,
    input: &Path,
    output: &Path,
    params: &JobParams,
) -> Result<(), ProcessError> {
    let format = if params.output_format.is_empty() {
        "png"
    } else {
        params.output_format.as_str()
    };

    let data = tokio::fs::read(input).await?;
    let file_name = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "input".to_string());

    let form = reqwest::multipart::Form::new().part(
        "file",
        reqwest::multipart::Part::bytes(data).file_name(file_name),
    );

    let url = format!("{base_url}/remove-bg?format={format}");
    let response = http
        .post(&url)
        .multipart(form)
        .send()
        .await
        .map_err(|e| ProcessError::Failed(format!("rembg request failed: {e}")))?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(ProcessError::Failed(format!(
            "rembg service error (HTTP {status}): {}",
            truncate_output(&body, 2048)
        )));
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| ProcessError::Failed(format!("rembg response read failed: {e}")))?;
    if bytes.is_empty() {
        return Err(ProcessError::Failed(
            "rembg returned empty response".to_string(),
        ));
    }

    tokio::fs::write(output, &bytes).await?;
    Ok(())
}
