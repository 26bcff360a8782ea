//! Office → PDF conversion through a headless LibreOffice subprocess.
//!
//! The PDF is written next to the input deck, as `<stem>.pdf`, which is
//! where LibreOffice puts it when `--outdir` is the deck's own directory.

use crate::error::DeckMetaError;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info};

/// Convert `input` to PDF with `<office_command> --headless --convert-to pdf`.
///
/// Returns the path of the produced PDF.
///
/// # Errors
/// [`DeckMetaError::OfficeConversionFailed`] when the command cannot be
/// started, exits non-zero, or exits cleanly without producing the PDF
/// (LibreOffice does this when another instance holds the profile lock).
pub async fn convert_to_pdf(input: &Path, office_command: &str) -> Result<PathBuf, DeckMetaError> {
    if !input.exists() {
        return Err(DeckMetaError::SourceNotFound {
            path: input.to_path_buf(),
        });
    }

    let out_dir = match input.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .ok_or_else(|| DeckMetaError::OfficeConversionFailed {
            path: input.to_path_buf(),
            detail: "input has no file name".into(),
        })?;
    let pdf_path = out_dir.join(format!("{stem}.pdf"));

    info!("Converting {} to PDF", input.display());
    let output = Command::new(office_command)
        .arg("--headless")
        .arg("--convert-to")
        .arg("pdf")
        .arg("--outdir")
        .arg(&out_dir)
        .arg(input)
        .output()
        .await
        .map_err(|e| DeckMetaError::OfficeConversionFailed {
            path: input.to_path_buf(),
            detail: format!("failed to run '{office_command}': {e}"),
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(DeckMetaError::OfficeConversionFailed {
            path: input.to_path_buf(),
            detail: format!("'{office_command}' exited with {}: {}", output.status, stderr.trim()),
        });
    }

    if !pdf_path.exists() {
        return Err(DeckMetaError::OfficeConversionFailed {
            path: input.to_path_buf(),
            detail: format!("expected output {} was not produced", pdf_path.display()),
        });
    }

    debug!("PDF written to {}", pdf_path.display());
    Ok(pdf_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_input_is_source_not_found() {
        let err = convert_to_pdf(Path::new("/no/such/deck.pptx"), "libreoffice")
            .await
            .unwrap_err();
        assert!(matches!(err, DeckMetaError::SourceNotFound { .. }));
    }

    #[tokio::test]
    async fn missing_command_is_conversion_failure() {
        let dir = tempfile::tempdir().unwrap();
        let deck = dir.path().join("deck.pptx");
        std::fs::write(&deck, b"not really a deck").unwrap();

        let err = convert_to_pdf(&deck, "deckmeta-no-such-office-binary")
            .await
            .unwrap_err();
        match err {
            DeckMetaError::OfficeConversionFailed { detail, .. } => {
                assert!(detail.contains("failed to run"), "got: {detail}")
            }
            other => panic!("expected OfficeConversionFailed, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn clean_exit_without_pdf_is_failure() {
        let dir = tempfile::tempdir().unwrap();
        let deck = dir.path().join("deck.pptx");
        std::fs::write(&deck, b"x").unwrap();

        // `true` ignores its arguments and exits 0 without writing anything.
        let err = convert_to_pdf(&deck, "true").await.unwrap_err();
        assert!(err.to_string().contains("was not produced"), "got: {err}");
    }
}
