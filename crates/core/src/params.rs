//! Job parameters: the recognised fields, their per-operation defaults,
//! and validation of client-supplied values.

use crate::error::{CoreError, CoreResult};
use crate::operations::{self, Operation};
use serde::{Deserialize, Serialize};

fn is_zero(v: &i32) -> bool {
    *v == 0
}

fn is_false(v: &bool) -> bool {
    !*v
}

/// Structured parameters persisted on a job row as JSON text.
///
/// Zero/false/empty fields are treated as unset, matching the wire format
/// where absent keys take per-operation defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobParams {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub output_format: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub quality: i32,
    #[serde(default, skip_serializing_if = "is_false")]
    pub lossless: bool,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub image_dpi: i32,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub image_quality: i32,
}

impl JobParams {
    /// Parse params from their persisted JSON text. Empty, `{}`, and `null`
    /// all mean "no parameters". Unrecognised keys are ignored.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed == "{}" || trimmed == "null" {
            return Ok(Self::default());
        }
        serde_json::from_str(trimmed)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Raw form fields as received from the client, before resolution.
#[derive(Debug, Clone, Default)]
pub struct RawParams {
    pub output_format: Option<String>,
    pub quality: Option<String>,
    pub lossless: Option<String>,
    pub image_dpi: Option<String>,
    pub image_quality: Option<String>,
}

/// Resolve raw form fields into validated params for `op`, applying
/// per-operation defaults. `input_ext` must already be normalised.
pub fn resolve(op: Operation, input_ext: &str, raw: &RawParams) -> CoreResult<JobParams> {
    let mut params = JobParams::default();

    params.output_format = raw
        .output_format
        .as_deref()
        .map(operations::normalize_ext)
        .unwrap_or_default();

    match op {
        Operation::ImageConvert | Operation::AudioConvert => {
            if params.output_format.is_empty() {
                return Err(CoreError::InvalidParams(format!(
                    "output_format is required for {op}"
                )));
            }
            if !operations::valid_output_format(op, &params.output_format) {
                return Err(CoreError::InvalidParams(format!(
                    "unsupported output format: {}",
                    params.output_format
                )));
            }
        }
        Operation::ImageRemoveBg => {
            if params.output_format.is_empty() {
                params.output_format = "png".to_string();
            }
            if !operations::valid_output_format(op, &params.output_format) {
                return Err(CoreError::InvalidParams(
                    "background removal supports png or webp output".to_string(),
                ));
            }
        }
        Operation::ImageCompress | Operation::AudioCompress => {
            if params.output_format.is_empty() {
                params.output_format = input_ext.to_string();
            }
        }
        Operation::VideoCompress => {
            if params.output_format.is_empty() {
                params.output_format = if operations::valid_output_format(op, input_ext) {
                    input_ext.to_string()
                } else {
                    "mp4".to_string()
                };
            }
            if !operations::valid_output_format(op, &params.output_format) {
                return Err(CoreError::InvalidParams(format!(
                    "unsupported video output format: {}",
                    params.output_format
                )));
            }
        }
        Operation::PdfCompress => {
            params.output_format = "pdf".to_string();
        }
    }

    match raw.quality.as_deref().filter(|q| !q.is_empty()) {
        Some(q) => {
            params.quality = q
                .parse::<i32>()
                .ok()
                .filter(|v| (1..=100).contains(v))
                .ok_or_else(|| {
                    CoreError::InvalidParams("quality must be between 1 and 100".to_string())
                })?;
        }
        None => {
            params.quality = match op {
                Operation::ImageCompress => 80,
                Operation::AudioCompress => 70,
                Operation::VideoCompress => 65,
                _ => 0,
            };
        }
    }

    params.lossless = raw.lossless.as_deref() == Some("true");

    match raw.image_dpi.as_deref().filter(|d| !d.is_empty()) {
        Some(d) => {
            let v = d
                .parse::<i32>()
                .map_err(|_| CoreError::InvalidParams("invalid image_dpi value".to_string()))?;
            if ![72, 150, 300, 600].contains(&v) {
                return Err(CoreError::InvalidParams(
                    "image_dpi must be 72, 150, 300, or 600".to_string(),
                ));
            }
            params.image_dpi = v;
        }
        None => {
            if op == Operation::PdfCompress {
                params.image_dpi = 150;
            }
        }
    }

    match raw.image_quality.as_deref().filter(|q| !q.is_empty()) {
        Some(q) => {
            params.image_quality = q
                .parse::<i32>()
                .ok()
                .filter(|v| (1..=100).contains(v))
                .ok_or_else(|| {
                    CoreError::InvalidParams("image_quality must be between 1 and 100".to_string())
                })?;
        }
        None => {
            if op == Operation::PdfCompress {
                params.image_quality = 75;
            }
        }
    }

    Ok(params)
}
