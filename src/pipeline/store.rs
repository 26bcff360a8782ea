//! Metadata persistence: the `<stem>_metadata.json` file beside each
//! Markdown document.
//!
//! Writes are atomic (temp file + rename) so a consumer polling the file
//! mid-run sees either the unenriched or the enriched document, never a
//! truncated one. The layout is `serde_json`'s pretty printer: two-space
//! indentation, non-ASCII characters written literally, no trailing newline.

use crate::error::DeckMetaError;
use crate::output::MetadataDocument;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Suffix appended to the Markdown file stem.
pub const METADATA_SUFFIX: &str = "_metadata.json";

/// `<dir>/<stem>.md` → `<dir>/<stem>_metadata.json`.
pub fn metadata_path(markdown_path: &Path) -> PathBuf {
    let stem = markdown_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let file_name = format!("{stem}{METADATA_SUFFIX}");
    match markdown_path.parent() {
        Some(dir) => dir.join(file_name),
        None => PathBuf::from(file_name),
    }
}

/// Serialise `doc` exactly as it is persisted.
pub fn to_json(doc: &MetadataDocument) -> Result<String, DeckMetaError> {
    Ok(serde_json::to_string_pretty(doc)?)
}

/// Write `doc` to `path`, replacing any existing file atomically.
pub async fn write_metadata(doc: &MetadataDocument, path: &Path) -> Result<(), DeckMetaError> {
    let json = to_json(doc)?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| DeckMetaError::MetadataWriteFailed {
                path: path.to_path_buf(),
                source: e,
            })?;
    }

    let tmp_path = path.with_extension("json.tmp");
    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| DeckMetaError::MetadataWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

    if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(DeckMetaError::MetadataWriteFailed {
            path: path.to_path_buf(),
            source: e,
        });
    }

    debug!(
        "Wrote metadata for {} slides to {}",
        doc.slide_count(),
        path.display()
    );
    Ok(())
}

/// Load a previously written metadata document.
pub async fn read_metadata(path: &Path) -> Result<MetadataDocument, DeckMetaError> {
    let json = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| DeckMetaError::MetadataReadFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

    serde_json::from_str(&json).map_err(|e| DeckMetaError::InvalidMetadata {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })
}
