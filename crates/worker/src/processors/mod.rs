//! Processor adapters: one external command invocation per operation.
//!
//! Adapters never touch the database or the queue; they turn a decrypted
//! scratch input into a scratch output or fail with a bounded message.
//! The caller wraps the whole dispatch in the per-operation timeout.

pub mod audio;
pub mod image;
pub mod pdf;
pub mod rembg;
pub mod video;

use fileforge_core::{JobParams, Operation};
use std::path::Path;
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;

/// Adapter failure.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("{0}")]
    Failed(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Ambient handles an adapter may need beyond its input and output paths.
pub struct ProcessContext<'a> {
    pub http: &'a reqwest::Client,
    pub rembg_url: &'a str,
    pub scratch: &'a Path,
}

/// Route an operation to its adapter. Adding an operation means adding an
/// arm here plus entries in the format and timeout tables.
pub async fn dispatch(
    op: Operation,
    input: &Path,
    output: &Path,
    ctx: &ProcessContext<'_>,
    params: &JobParams,
) -> Result<(), ProcessError> {
    match op {
        Operation::ImageConvert => image::convert(input, output, params).await,
        Operation::ImageCompress => image::compress(input, output, params).await,
        Operation::ImageRemoveBg => {
            rembg::remove_background(ctx.http, ctx.rembg_url, input, output, params).await
        }
        Operation::PdfCompress => pdf::compress(input, output, ctx.scratch, params).await,
        Operation::AudioConvert => audio::convert(input, output, params).await,
        Operation::AudioCompress => audio::compress(input, output, params).await,
        Operation::VideoCompress => video::compress(input, output, params).await,
    }
}

/// Run one command, capturing output. Non-zero exit becomes a failure with
/// up to 500 bytes of stderr (stdout when stderr is empty) embedded.
pub(crate) async fn run_command(program: &str, args: &[String]) -> Result<String, ProcessError> {
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await?;

    if !output.status.success() {
        let mut detail = String::from_utf8_lossy(&output.stderr).into_owned();
        if detail.trim().is_empty() {
            detail = String::from_utf8_lossy(&output.stdout).into_owned();
        }
        return Err(ProcessError::Failed(format!(
            "{program} failed ({}): {}",
            output.status,
            truncate_output(&detail, 500)
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Cap command output at `limit` bytes (char-boundary safe) before it gets
/// embedded in an error message.
pub(crate) fn truncate_output(s: &str, limit: usize) -> String {
    let s = s.trim();
    if s.len() <= limit {
        return s.to_string();
    }
    let mut cut = limit;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…", &s[..cut])
}

/// Linear quality mapping with clamping at both ends. Works for inverted
/// ranges (`out_min > out_max`) as well.
pub fn map_range(value: i64, in_min: i64, in_max: i64, out_min: i64, out_max: i64) -> i64 {
    if value <= in_min {
        return out_min;
    }
    if value >= in_max {
        return out_max;
    }
    out_min + (value - in_min) * (out_max - out_min) / (in_max - in_min)
}

pub(crate) fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_range_hits_endpoints() {
        assert_eq!(map_range(1, 1, 100, 32, 320), 32);
        assert_eq!(map_range(100, 1, 100, 32, 320), 320);
        assert_eq!(map_range(0, 1, 100, 32, 320), 32);
        assert_eq!(map_range(200, 1, 100, 32, 320), 320);
    }

    #[test]
    fn map_range_is_monotonic() {
        let mut prev = map_range(1, 1, 100, 45, 17);
        for q in 2..=100 {
            let cur = map_range(q, 1, 100, 45, 17);
            assert!(cur <= prev, "inverted range must be non-increasing");
            prev = cur;
        }

        let mut prev = map_range(1, 1, 100, 0, 10);
        for q in 2..=100 {
            let cur = map_range(q, 1, 100, 0, 10);
            assert!(cur >= prev, "forward range must be non-decreasing");
            prev = cur;
        }
    }

    #[test]
    fn truncate_output_bounds_and_marks() {
        assert_eq!(truncate_output("  ok  ", 500), "ok");
        let long = "e".repeat(600);
        let truncated = truncate_output(&long, 500);
        assert_eq!(truncated.len(), 500 + '…'.len_utf8());
        assert!(truncated.ends_with('…'));
    }

    #[tokio::test]
    async fn run_command_captures_failure_detail() {
        // `false` exits non-zero with no output.
        let err = run_command("false", &[]).await.unwrap_err();
        match err {
            ProcessError::Failed(msg) => assert!(msg.contains("false failed")),
            other => panic!("unexpected error: {other:?}"),
        }

        let out = run_command("echo", &["hello".to_string()]).await.unwrap();
        assert_eq!(out.trim(), "hello");
    }

    #[tokio::test]
    async fn run_command_missing_binary_is_io_error() {
        let err = run_command("definitely-not-a-real-binary-xyz", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessError::Io(_)));
    }
}
