//! Audio conversion and compression via ffmpeg.

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

pub(crate) fn convert_codec_args(format: &str) -> Vec<&'static str> {
    match format {
        "mp3" => vec!["-c:a", "libmp3lame", "-q:a", "2"],
        "wav" => vec!["-c:a", "pcm_s16le"],
        "flac" => vec!["-c:a", "flac", "-compression_level", "8"],
        "ogg" => vec!["-c:a", "libvorbis", "-q:a", "5"],
        "opus" => vec!["-c:a", "libopus", "-b:a", "128k"],
        "aac" | "m4a" => vec!["-c:a", "aac", "-b:a", "192k"],
        "aiff" => vec!["-c:a", "pcm_s16be"],
        _ => vec!["-c:a", "copy"],
    }
}

pub async fn convert(input: &Path, output: &Path, params: &JobParams) -> Result<(), ProcessError> {
    let mut args = ffmpeg_base(input);
    args.extend(
        convert_codec_args(&params.output_format)
            .into_iter()
            .map(str::to_string),
    );
    args.push("-vn".to_string());
    args.extend(["-y".to_string(), path_arg(output)]);

    run_command("ffmpeg", &args).await.map_err(|e| match e {
        ProcessError::Failed(msg) => ProcessError::Failed(format!(
            "audio convert to {}: {msg}",
            params.output_format
        )),
        other => other,
    })?;
    Ok(())
}

pub(crate) fn lossless_codec_args(format: &str) -> Vec<String> {
    match format {
        "flac" => vec!["-c:a", "flac", "-compression_level", "12"]
            .into_iter()
            .map(str::to_string)
            .collect(),
        "wav" => vec!["-c:a".to_string(), "pcm_s16le".to_string()],
        "aiff" => vec!["-c:a".to_string(), "pcm_s16be".to_string()],
        // No lossless mode for the rest: use the best lossy setting.
        other => lossy_codec_args(other, 100),
    }
}

pub(crate) fn lossy_codec_args(format: &str, quality: i32) -> Vec<String> {
    let quality = quality as i64;
    match format {
        "mp3" => {
            let kbps = map_range(quality, 1, 100, 32, 320);
            vec!["-c:a".to_string(), "libmp3lame".to_string(), "-b:a".to_string(), format!("{kbps}k")]
        }
        "ogg" => {
            let q = map_range(quality, 1, 100, 0, 10);
            vec!["-c:a".to_string(), "libvorbis".to_string(), "-q:a".to_string(), q.to_string()]
        }
        "opus" => {
            let kbps = map_range(quality, 1, 100, 16, 256);
            vec!["-c:a".to_string(), "libopus".to_string(), "-b:a".to_string(), format!("{kbps}k")]
        }
        "aac" | "m4a" => {
            let kbps = map_range(quality, 1, 100, 32, 256);
            vec!["-c:a".to_string(), "aac".to_string(), "-b:a".to_string(), format!("{kbps}k")]
        }
        "flac" => {
            // Higher quality asks for less compression effort.
            let level = map_range(quality, 1, 100, 12, 0);
            vec!["-c:a".to_string(), "flac".to_string(), "-compression_level".to_string(), level.to_string()]
        }
        "wav" => vec!["-c:a".to_string(), "pcm_s16le".to_string()],
        "aiff" => vec!["-c:a".to_string(), "pcm_s16be".to_string()],
        "wma" => {
            let kbps = map_range(quality, 1, 100, 32, 192);
            vec!["-c:a".to_string(), "wmav2".to_string(), "-b:a".to_string(), format!("{kbps}k")]
        }
        _ => vec!["-c:a".to_string(), "copy".to_string()],
    }
}

pub async fn compress(input: &Path, output: &Path, params: &JobParams) -> Result<(), ProcessError> {
    let mut args = ffmpeg_base(input);
    if params.lossless {
        args.extend(lossless_codec_args(&params.output_format));
    } else {
        args.extend(lossy_codec_args(&params.output_format, params.quality));
    }
    args.push("-vn".to_string());
    args.extend(["-y".to_string(), path_arg(output)]);

    run_command("ffmpeg", &args).await.map_err(|e| match e {
        ProcessError::Failed(msg) => ProcessError::Failed(format!(
            "audio compress ({}, q={}, lossless={}): {msg}",
            params.output_format, params.quality, params.lossless
        )),
        other => other,
    })?;
    Ok(())
}
