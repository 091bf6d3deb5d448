//! Image conversion and compression via ffmpeg, with pngquant for lossy
//! PNG output.

use super::{map_range, path_arg, run_command, ProcessError};
use fileforge_core::JobParams;
use std::path::Path;

fn ffmpeg_base(input: &Path) -> Vec<String> {
    vec![
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-i".to_string(),
        path_arg(input),
    ]
}

pub(crate) fn convert_args(input: &Path, output: &Path, params: &JobParams) -> Vec<String> {
    let mut args = ffmpeg_base(input);
    // Conversion favours fidelity over size.
    if params.output_format == "jpeg" {
        args.extend(["-q:v".to_string(), "2".to_string()]);
    }
    args.extend(["-map_metadata".to_string(), "-1".to_string()]);
    args.extend(["-y".to_string(), path_arg(output)]);
    args
}

pub async fn convert(input: &Path, output: &Path, params: &JobParams) -> Result<(), ProcessError> {
    run_command("ffmpeg", &convert_args(input, output, params))
        .await
        .map_err(|e| match e {
            ProcessError::Failed(msg) => ProcessError::Failed(format!(
                "image convert to {}: {msg}",
                params.output_format
            )),
            other => other,
        })?;
    Ok(())
}

pub(crate) fn compress_args(input: &Path, output: &Path, params: &JobParams) -> Vec<String> {
    let mut args = ffmpeg_base(input);
    match params.output_format.as_str() {
        "jpeg" => {
            // mjpeg qscale runs 2 (best) to 31 (worst).
            let qscale = map_range(params.quality as i64, 1, 100, 31, 2);
            args.extend(["-q:v".to_string(), qscale.to_string()]);
        }
        "webp" => {
            if params.lossless {
                args.extend(["-lossless".to_string(), "1".to_string()]);
            } else {
                args.extend(["-quality".to_string(), params.quality.to_string()]);
            }
        }
        "avif" => {
            let crf = if params.lossless {
                0
            } else {
                map_range(params.quality as i64, 1, 100, 63, 10)
            };
            args.extend([
                "-c:v".to_string(),
                "libaom-av1".to_string(),
                "-crf".to_string(),
                crf.to_string(),
                "-still-picture".to_string(),
                "1".to_string(),
            ]);
        }
        "tiff" => {
            args.extend(["-compression_algo".to_string(), "deflate".to_string()]);
        }
        _ => {}
    }
    args.extend(["-map_metadata".to_string(), "-1".to_string()]);
    args.extend(["-y".to_string(), path_arg(output)]);
    args
}

pub async fn compress(input: &Path, output: &Path, params: &JobParams) -> Result<(), ProcessError> {
    if params.output_format == "png" {
        return compress_png(input, output, params.quality, params.lossless).await;
    }

    run_command("ffmpeg", &compress_args(input, output, params))
        .await
        .map_err(|e| match e {
            ProcessError::Failed(msg) => ProcessError::Failed(format!(
                "image compress ({}, q={}, lossless={}): {msg}",
                params.output_format, params.quality, params.lossless
            )),
            other => other,
        })?;
    Ok(())
}

pub(crate) fn pngquant_args(input: &Path, output: &Path, quality: i32) -> Vec<String> {
    let min_quality = (quality - 20).max(0);
    vec![
        "--quality".to_string(),
        format!("{min_quality}-{quality}"),
        "--speed".to_string(),
        "3".to_string(),
        "--force".to_string(),
        "--output".to_string(),
        path_arg(output),
        "--".to_string(),
        path_arg(input),
    ]
}

async fn compress_png(
    input: &Path,
    output: &Path,
    quality: i32,
    lossless: bool,
) -> Result<(), ProcessError> {
    if lossless {
        return recompress_png(input, output).await;
    }

    // pngquant refuses outputs that miss the quality floor; fall back to a
    // lossless recompress rather than failing the job.
    match run_command("pngquant", &pngquant_args(input, output, quality)).await {
        Ok(_) => Ok(()),
        Err(e) => {
            tracing::warn!(error = %e, "pngquant failed, falling back to lossless recompress");
            recompress_png(input, output).await
        }
    }
}

async fn recompress_png(input: &Path, output: &Path) -> Result<(), ProcessError> {
    let mut args = ffmpeg_base(input);
    args.extend(["-map_metadata".to_string(), "-1".to_string()]);
    args.extend(["-y".to_string(), path_arg(output)]);
    run_command("ffmpeg", &args).await.map_err(|e| match e {
        ProcessError::Failed(msg) => {
            ProcessError::Failed(format!("lossless PNG optimize: {msg}"))
        }
        other => other,
    })?;
    Ok(())
}
