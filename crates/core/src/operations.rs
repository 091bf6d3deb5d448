//! The operation catalog and format tables.
//!
//! Extensions are normalised before any table lookup: lowercased, leading
//! dot stripped, and the `jpg`/`tif` aliases folded into their canonical
//! forms. The tables below therefore only carry canonical extensions.

use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// A supported transformation operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    ImageConvert,
    ImageCompress,
    ImageRemoveBg,
    PdfCompress,
    AudioConvert,
    AudioCompress,
    VideoCompress,
}

impl Operation {
    /// All operations, in catalog order.
    pub const ALL: [Operation; 7] = [
        Operation::ImageConvert,
        Operation::ImageCompress,
        Operation::ImageRemoveBg,
        Operation::PdfCompress,
        Operation::AudioConvert,
        Operation::AudioCompress,
        Operation::VideoCompress,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::ImageConvert => "image_convert",
            Operation::ImageCompress => "image_compress",
            Operation::ImageRemoveBg => "image_remove_bg",
            Operation::PdfCompress => "pdf_compress",
            Operation::AudioConvert => "audio_convert",
            Operation::AudioCompress => "audio_compress",
            Operation::VideoCompress => "video_compress",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "image_convert" => Ok(Operation::ImageConvert),
            "image_compress" => Ok(Operation::ImageCompress),
            "image_remove_bg" => Ok(Operation::ImageRemoveBg),
            "pdf_compress" => Ok(Operation::PdfCompress),
            "audio_convert" => Ok(Operation::AudioConvert),
            "audio_compress" => Ok(Operation::AudioCompress),
            "video_compress" => Ok(Operation::VideoCompress),
            other => Err(CoreError::InvalidOperation(other.to_string())),
        }
    }
}

const IMAGE_INPUTS: &[&str] = &[
    "jpeg", "png", "webp", "tiff", "gif", "avif", "heif", "heic", "bmp",
];
const IMAGE_CONVERT_OUTPUTS: &[&str] = &[
    "jpeg", "png", "webp", "tiff", "gif", "avif", "heif", "bmp",
];
const REMOVE_BG_INPUTS: &[&str] = &["jpeg", "png", "webp", "tiff", "bmp"];
const REMOVE_BG_OUTPUTS: &[&str] = &["png", "webp"];
const AUDIO_INPUTS: &[&str] = &[
    "mp3", "wav", "flac", "ogg", "opus", "aac", "m4a", "aiff", "wma",
];
const AUDIO_CONVERT_OUTPUTS: &[&str] = &[
    "mp3", "wav", "flac", "ogg", "opus", "aac", "m4a", "aiff",
];
const VIDEO_INPUTS: &[&str] = &["mp4", "mkv", "webm", "avi", "mov"];
const VIDEO_OUTPUTS: &[&str] = &["mp4", "mkv", "webm"];
const PDF_ONLY: &[&str] = &["pdf"];

/// Normalise a file extension: lowercase, strip a leading dot, and fold
/// the jpg/tif aliases.
pub fn normalize_ext(ext: &str) -> String {
    let ext = ext.trim().trim_start_matches('.').to_ascii_lowercase();
    match ext.as_str() {
        "jpg" => "jpeg".to_string(),
        "tif" => "tiff".to_string(),
        _ => ext,
    }
}

/// Extract and normalise the extension of a filename.
pub fn file_ext(name: &str) -> String {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(normalize_ext)
        .unwrap_or_default()
}

/// Accepted input extensions (canonical) for an operation.
pub fn input_formats(op: Operation) -> &'static [&'static str] {
    match op {
        Operation::ImageConvert | Operation::ImageCompress => IMAGE_INPUTS,
        Operation::ImageRemoveBg => REMOVE_BG_INPUTS,
        Operation::PdfCompress => PDF_ONLY,
        Operation::AudioConvert | Operation::AudioCompress => AUDIO_INPUTS,
        Operation::VideoCompress => VIDEO_INPUTS,
    }
}

/// Accepted output extensions for an operation. An empty table means
/// "same as the input extension".
pub fn output_formats(op: Operation) -> &'static [&'static str] {
    match op {
        Operation::ImageConvert => IMAGE_CONVERT_OUTPUTS,
        Operation::ImageCompress | Operation::AudioCompress => &[],
        Operation::ImageRemoveBg => REMOVE_BG_OUTPUTS,
        Operation::PdfCompress => PDF_ONLY,
        Operation::AudioConvert => AUDIO_CONVERT_OUTPUTS,
        Operation::VideoCompress => VIDEO_OUTPUTS,
    }
}

/// Whether `ext` is an accepted input for `op`.
pub fn valid_input_format(op: Operation, ext: &str) -> bool {
    input_formats(op).contains(&normalize_ext(ext).as_str())
}

/// Whether `ext` is an accepted output for `op`.
pub fn valid_output_format(op: Operation, ext: &str) -> bool {
    let formats = output_formats(op);
    if formats.is_empty() {
        return valid_input_format(op, ext);
    }
    formats.contains(&normalize_ext(ext).as_str())
}

/// MIME type for a file extension, `application/octet-stream` when unknown.
pub fn mime_for_extension(ext: &str) -> &'static str {
    match normalize_ext(ext).as_str() {
        "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "tiff" => "image/tiff",
        "gif" => "image/gif",
        "avif" => "image/avif",
        "heif" => "image/heif",
        "heic" => "image/heic",
        "bmp" => "image/bmp",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "flac" => "audio/flac",
        "ogg" => "audio/ogg",
        "opus" => "audio/opus",
        "aac" => "audio/aac",
        "m4a" => "audio/mp4",
        "aiff" => "audio/aiff",
        "wma" => "audio/x-ms-wma",
        "mp4" => "video/mp4",
        "mkv" => "video/x-matroska",
        "webm" => "video/webm",
        "avi" => "video/x-msvideo",
        "mov" => "video/quicktime",
        "pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
}

/// User-visible result filename: the original name with its extension
/// swapped for `output_format`. An empty format keeps the name as-is.
pub fn output_name(original: &str, output_format: &str) -> String {
    if output_format.is_empty() {
        return original.to_string();
    }
    let base = match original.rfind('.') {
        Some(idx) => &original[..idx],
        None => original,
    };
    format!("{}.{}", base, output_format.to_ascii_lowercase())
}

/// Sanitise a filename for a Content-Disposition header.
pub fn sanitize_filename(name: &str) -> String {
    let mut out: String = name
        .chars()
        .filter(|c| *c != '\0')
        .map(|c| match c {
            '/' | '\\' => '_',
            '"' => '\'',
            other => other,
        })
        .collect();
    if out.is_empty() {
        out.push_str("download");
    }
    out
}

/// Static catalog served by `GET /api/formats`.
pub const FORMATS_JSON: &str = r#"{
  "image_convert": {
    "input": ["jpeg","jpg","png","webp","tiff","tif","gif","avif","heif","heic","bmp"],
    "output": ["jpeg","png","webp","tiff","gif","avif","heif","bmp"]
  },
  "image_compress": {
    "input": ["jpeg","jpg","png","webp","tiff","tif","gif","avif","heif","heic","bmp"],
    "output": "same_as_input",
    "params": {"quality":{"type":"range","min":1,"max":100,"default":80},"lossless":{"type":"bool","default":false}}
  },
  "image_remove_bg": {
    "input": ["jpeg","jpg","png","webp","tiff","tif","bmp"],
    "output": ["png","webp"],
    "default_output": "png"
  },
  "pdf_compress": {
    "input": ["pdf"],
    "output": ["pdf"],
    "params": {"image_dpi":{"type":"select","options":[72,150,300,600],"default":150},"image_quality":{"type":"range","min":1,"max":100,"default":75}}
  },
  "audio_convert": {
    "input": ["mp3","wav","flac","ogg","opus","aac","m4a","aiff","wma"],
    "output": ["mp3","wav","flac","ogg","opus","aac","m4a","aiff"]
  },
  "audio_compress": {
    "input": ["mp3","wav","flac","ogg","opus","aac","m4a","aiff","wma"],
    "output": "same_as_input",
    "params": {"quality":{"type":"range","min":1,"max":100,"default":70},"lossless":{"type":"bool","default":false}}
  },
  "video_compress": {
    "input": ["mp4","mkv","webm","avi","mov"],
    "output": ["mp4","mkv","webm"],
    "params": {"quality":{"type":"range","min":1,"max":100,"default":65}}
  }
}"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_round_trips_through_str() {
        for op in Operation::ALL {
            assert_eq!(op.as_str().parse::<Operation>().unwrap(), op);
        }
        assert!("resize".parse::<Operation>().is_err());
        assert!("".parse::<Operation>().is_err());
    }

    #[test]
    fn operation_serde_matches_wire_names() {
        let json = serde_json::to_string(&Operation::ImageRemoveBg).unwrap();
        assert_eq!(json, "\"image_remove_bg\"");
        let op: Operation = serde_json::from_str("\"video_compress\"").unwrap();
        assert_eq!(op, Operation::VideoCompress);
    }

    #[test]
    fn normalize_ext_folds_aliases() {
        assert_eq!(normalize_ext("JPG"), "jpeg");
        assert_eq!(normalize_ext(".tif"), "tiff");
        assert_eq!(normalize_ext("PNG"), "png");
        assert_eq!(normalize_ext(""), "");
    }

    #[test]
    fn file_ext_handles_dotted_names() {
        assert_eq!(file_ext("a.b.JPG"), "jpeg");
        assert_eq!(file_ext("archive.tar"), "tar");
        assert_eq!(file_ext("noext"), "");
    }

    #[test]
    fn input_tables_accept_aliases() {
        assert!(valid_input_format(Operation::ImageConvert, "jpg"));
        assert!(valid_input_format(Operation::ImageConvert, "TIF"));
        assert!(!valid_input_format(Operation::ImageConvert, "svg"));
        assert!(valid_input_format(Operation::PdfCompress, "pdf"));
        assert!(!valid_input_format(Operation::PdfCompress, "png"));
        assert!(valid_input_format(Operation::AudioConvert, "wma"));
        assert!(!valid_input_format(Operation::VideoCompress, "wmv"));
    }

    #[test]
    fn compress_outputs_mirror_inputs() {
        // Empty output table means "same as input".
        assert!(valid_output_format(Operation::ImageCompress, "heic"));
        assert!(valid_output_format(Operation::AudioCompress, "wma"));
        assert!(!valid_output_format(Operation::AudioCompress, "mp4"));
    }

    #[test]
    fn convert_outputs_are_restricted() {
        assert!(valid_output_format(Operation::ImageConvert, "jpeg"));
        assert!(!valid_output_format(Operation::ImageConvert, "heic"));
        assert!(valid_output_format(Operation::AudioConvert, "mp3"));
        assert!(!valid_output_format(Operation::AudioConvert, "wma"));
        assert!(!valid_output_format(Operation::VideoCompress, "avi"));
        assert!(valid_output_format(Operation::ImageRemoveBg, "webp"));
        assert!(!valid_output_format(Operation::ImageRemoveBg, "jpeg"));
    }

    #[test]
    fn output_name_swaps_only_the_last_extension() {
        assert_eq!(output_name("a.b.JPG", "png"), "a.b.png");
        assert_eq!(output_name("x", "png"), "x.png");
        assert_eq!(output_name("y.pdf", ""), "y.pdf");
        assert_eq!(output_name("track.flac", "MP3"), "track.mp3");
    }

    #[test]
    fn sanitize_filename_strips_header_hazards() {
        assert_eq!(sanitize_filename("a/b\\c.png"), "a_b_c.png");
        assert_eq!(sanitize_filename("say \"hi\".pdf"), "say 'hi'.pdf");
        assert_eq!(sanitize_filename("nul\0byte"), "nulbyte");
        assert_eq!(sanitize_filename(""), "download");
    }

    #[test]
    fn mime_table_covers_catalog_extensions() {
        assert_eq!(mime_for_extension(".JPG"), "image/jpeg");
        assert_eq!(mime_for_extension("m4a"), "audio/mp4");
        assert_eq!(mime_for_extension("pdf"), "application/pdf");
        assert_eq!(mime_for_extension("xyz"), "application/octet-stream");
    }

    #[test]
    fn formats_catalog_is_valid_json() {
        let value: serde_json::Value = serde_json::from_str(FORMATS_JSON).unwrap();
        for op in Operation::ALL {
            assert!(value.get(op.as_str()).is_some(), "missing {op}");
        }
    }
}
