//! PDF compression: ghostscript downsample, then qpdf linearisation, with
//! a staged fallback chain so a partially working toolchain still yields
//! an output.

use super::{path_arg, run_command, ProcessError};
use fileforge_core::JobParams;
use std::path::Path;

/// Ghostscript PDFSETTINGS preset by image quality.
pub(crate) fn pdf_preset(quality: i32) -> &'static str {
    if quality <= 30 {
        "/screen"
    } else if quality <= 60 {
        "/ebook"
    } else if quality <= 85 {
        "/printer"
    } else {
        "/prepress"
    }
}

pub(crate) fn ghostscript_args(input: &Path, output: &Path, params: &JobParams) -> Vec<String> {
    let dpi = if params.image_dpi > 0 {
        params.image_dpi
    } else {
        150
    };
    let quality = if params.image_quality > 0 {
        params.image_quality
    } else {
        75
    };
    // Mono art tolerates much higher resolution than photographs.
    let mono_dpi = (dpi * 2).min(600);

    vec![
        "-sDEVICE=pdfwrite".to_string(),
        "-dCompatibilityLevel=1.4".to_string(),
        "-dSAFER".to_string(),
        "-dNOPAUSE".to_string(),
        "-dBATCH".to_string(),
        "-dQUIET".to_string(),
        format!("-dPDFSETTINGS={}", pdf_preset(quality)),
        format!("-dColorImageResolution={dpi}"),
        format!("-dGrayImageResolution={dpi}"),
        format!("-dMonoImageResolution={mono_dpi}"),
        "-dDownsampleColorImages=true".to_string(),
        "-dDownsampleGrayImages=true".to_string(),
        "-dDownsampleMonoImages=true".to_string(),
        "-dColorImageDownsampleType=/Bicubic".to_string(),
        "-dGrayImageDownsampleType=/Bicubic".to_string(),
        "-dCompressFonts=true".to_string(),
        "-dEmbedAllFonts=true".to_string(),
        "-dSubsetFonts=true".to_string(),
        format!("-sOutputFile={}", path_arg(output)),
        path_arg(input),
    ]
}

async fn run_qpdf(input: &Path, output: &Path) -> Result<(), ProcessError> {
    let args = vec![
        "--linearize".to_string(),
        "--object-streams=generate".to_string(),
        "--compress-streams=y".to_string(),
        "--recompress-flate".to_string(),
        "--decode-level=generalized".to_string(),
        path_arg(input),
        path_arg(output),
    ];
    run_command("qpdf", &args).await.map(|_| ())
}

async fn run_qpdf_minimal(input: &Path, output: &Path) -> Result<(), ProcessError> {
    let args = vec![
        "--linearize".to_string(),
        path_arg(input),
        path_arg(output),
    ];
    run_command("qpdf", &args).await.map(|_| ())
}

pub async fn compress(
    input: &Path,
    output: &Path,
    scratch: &Path,
    params: &JobParams,
) -> Result<(), ProcessError> {
    let gs_output = scratch.join("gs_intermediate.pdf");

    let gs_result = run_command("gs", &ghostscript_args(input, &gs_output, params))
        .await
        .map(|_| ());

    let qpdf_input = match &gs_result {
        Ok(()) => gs_output.as_path(),
        Err(e) => {
            tracing::warn!(error = %e, "ghostscript failed, trying qpdf on the original");
            input
        }
    };

    if let Err(qpdf_err) = run_qpdf(qpdf_input, output).await {
        tracing::warn!(error = %qpdf_err, "qpdf failed");

        match gs_result {
            Ok(()) => {
                // The downsampled intermediate is still a valid result.
                tokio::fs::copy(&gs_output, output).await?;
            }
            Err(gs_err) => {
                if let Err(minimal_err) = run_qpdf_minimal(input, output).await {
                    return Err(ProcessError::Failed(format!(
                        "PDF compression failed: ghostscript={gs_err}, qpdf={minimal_err}"
                    )));
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn preset_bands_match_quality() {
        assert_eq!(pdf_preset(1), "/screen");
        assert_eq!(pdf_preset(30), "/screen");
        assert_eq!(pdf_preset(31), "/ebook");
        assert_eq!(pdf_preset(60), "/ebook");
        assert_eq!(pdf_preset(61), "/printer");
        assert_eq!(pdf_preset(85), "/printer");
        assert_eq!(pdf_preset(86), "/prepress");
    }

    #[test]
    fn ghostscript_args_derive_resolutions() {
        let params = JobParams {
            output_format: "pdf".to_string(),
            image_dpi: 300,
            image_quality: 75,
            ..Default::default()
        };
        let args = ghostscript_args(
            &PathBuf::from("/tmp/in.pdf"),
            &PathBuf::from("/tmp/out.pdf"),
            &params,
        );
        let joined = args.join(" ");
        assert!(joined.contains("-dColorImageResolution=300"));
        assert!(joined.contains("-dMonoImageResolution=600"));
        assert!(joined.contains("-dPDFSETTINGS=/printer"));
    }

    #[test]
    fn mono_dpi_is_capped_at_600() {
        let params = JobParams {
            image_dpi: 600,
            image_quality: 20,
            ..Default::default()
        };
        let args = ghostscript_args(
            &PathBuf::from("/tmp/in.pdf"),
            &PathBuf::from("/tmp/out.pdf"),
            &params,
        );
        let joined = args.join(" ");
        assert!(joined.contains("-dMonoImageResolution=600"));
        assert!(joined.contains("-dPDFSETTINGS=/screen"));
    }

    #[test]
    fn unset_fields_take_pdf_defaults() {
        let args = ghostscript_args(
            &PathBuf::from("/tmp/in.pdf"),
            &PathBuf::from("/tmp/out.pdf"),
            &JobParams::default(),
        );
        let joined = args.join(" ");
        assert!(joined.contains("-dColorImageResolution=150"));
        assert!(joined.contains("-dPDFSETTINGS=/printer"));
    }
}
