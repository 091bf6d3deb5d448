//! Video compression via ffmpeg.

use super::{map_range, path_arg, run_command, ProcessError};
use fileforge_core::JobParams;
use std::path::Path;

pub(crate) fn quality_to_h264_crf(quality: i32) -> i64 {
    map_range(quality as i64, 1, 100, 45, 17)
}

pub(crate) fn quality_to_vp9_crf(quality: i32) -> i64 {
    map_range(quality as i64, 1, 100, 50, 15)
}

pub(crate) fn h264_preset(quality: i32) -> &'static str {
    if quality >= 80 {
        "slow"
    } else if quality >= 40 {
        "medium"
    } else {
        "faster"
    }
}

fn h264_args(quality: i32) -> Vec<String> {
    vec![
        "-c:v".to_string(),
        "libx264".to_string(),
        "-crf".to_string(),
        quality_to_h264_crf(quality).to_string(),
        "-preset".to_string(),
        h264_preset(quality).to_string(),
        // yuv420p for maximum player compatibility.
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        "-threads".to_string(),
        "0".to_string(),
    ]
}

fn vp9_args(quality: i32) -> Vec<String> {
    vec![
        "-c:v".to_string(),
        "libvpx-vp9".to_string(),
        "-crf".to_string(),
        quality_to_vp9_crf(quality).to_string(),
        // CRF mode in VP9 requires an explicit zero bitrate.
        "-b:v".to_string(),
        "0".to_string(),
        "-row-mt".to_string(),
        "1".to_string(),
        "-threads".to_string(),
        "0".to_string(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
    ]
}

fn aac_audio_args() -> Vec<String> {
    ["-c:a", "aac", "-b:a", "128k", "-ac", "2"]
        .into_iter()
        .map(str::to_string)
        .collect()
}

fn opus_audio_args() -> Vec<String> {
    ["-c:a", "libopus", "-b:a", "128k", "-ac", "2"]
        .into_iter()
        .map(str::to_string)
        .collect()
}

pub(crate) fn compress_args(input: &Path, output: &Path, params: &JobParams) -> Vec<String> {
    let mut args = vec![
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-i".to_string(),
        path_arg(input),
    ];

    match params.output_format.as_str() {
        "webm" => {
            args.extend(vp9_args(params.quality));
            args.extend(opus_audio_args());
        }
        "mp4" => {
            args.extend(h264_args(params.quality));
            args.extend(aac_audio_args());
            args.extend(["-movflags".to_string(), "+faststart".to_string()]);
        }
        _ => {
            args.extend(h264_args(params.quality));
            args.extend(aac_audio_args());
        }
    }

    // Strip subtitle/data streams and container metadata.
    args.extend([
        "-sn".to_string(),
        "-dn".to_string(),
        "-map_metadata".to_string(),
        "-1".to_string(),
    ]);
    args.extend(["-y".to_string(), path_arg(output)]);
    args
}

pub async fn compress(input: &Path, output: &Path, params: &JobParams) -> Result<(), ProcessError> {
    run_command("ffmpeg", &compress_args(input, output, params))
        .await
        .map_err(|e| match e {
            ProcessError::Failed(msg) => ProcessError::Failed(format!(
                "video compress to {} (q={}): {msg}",
                params.output_format, params.quality
            )),
            other => other,
        })?;
    Ok(())
}
