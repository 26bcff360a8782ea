//! Error types for the deckmeta library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`DeckMetaError`]: **Fatal** for one file. The deck or Markdown
//!   document cannot be processed at all (missing input, malformed image
//!   syntax, unwritable output). The batch loop logs it, counts it and moves
//!   on to the next file.
//!
//! * [`AnnotationError`]: **Non-fatal**. A single caption or summary request
//!   failed (timeout, transport error, empty model output). It never crosses
//!   the [`crate::pipeline::annotate::Annotator`] boundary except as the
//!   reason stored in [`crate::output::Annotation::Failed`], so a dead
//!   inference backend still leaves a complete structural extraction.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal (per-file) errors returned by the deckmeta library.
#[derive(Debug, Error)]
pub enum DeckMetaError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Source document was not found at the given path.
    #[error("Source file not found: '{path}'\nCheck the path exists and is readable.")]
    SourceNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file exists but could not be read as UTF-8 text.
    #[error("Failed to read '{path}': {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Segmentation errors ───────────────────────────────────────────────
    /// A line starts like an image reference but has no `(path)` group.
    #[error("Malformed image reference on slide {slide}, line {line_number}: {line:?}")]
    MalformedImage {
        slide: usize,
        line_number: usize,
        line: String,
    },

    // ── Collaborator errors ───────────────────────────────────────────────
    /// The office suite could not convert the deck to PDF.
    #[error("Office conversion failed for '{path}': {detail}")]
    OfficeConversionFailed { path: PathBuf, detail: String },

    /// The document converter could not render the PDF to Markdown.
    #[error("Document conversion failed for '{path}': {detail}")]
    DocumentConversionFailed { path: PathBuf, detail: String },

    /// The converter was asked for an output format it cannot produce.
    #[error("Unsupported output format '{format}'. Only markdown is supported.")]
    UnsupportedOutputFormat { format: String },

    /// An extracted image could not be written under the image directory.
    #[error("Failed to save image '{path}': {source}")]
    ImageSaveFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An input, output or image directory could not be created.
    #[error("Failed to create directory '{path}': {source}")]
    DirectoryCreateFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Inference setup errors ────────────────────────────────────────────
    /// The configured provider could not be constructed (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Persistence errors ────────────────────────────────────────────────
    /// Could not write the rendered Markdown document.
    #[error("Failed to write Markdown file '{path}': {source}")]
    MarkdownWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Could not create or write the metadata JSON file.
    #[error("Failed to write metadata file '{path}': {source}")]
    MetadataWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The metadata document could not be serialised.
    #[error("Failed to serialise metadata: {0}")]
    MetadataSerialize(#[from] serde_json::Error),

    /// Could not read a previously written metadata file.
    #[error("Failed to read metadata file '{path}': {source}")]
    MetadataReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A metadata file was read but its content is not a valid document.
    #[error("Invalid metadata file '{path}': {detail}")]
    InvalidMetadata { path: PathBuf, detail: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl DeckMetaError {
    /// Map an I/O error from reading a source file to the matching input error.
    pub(crate) fn from_read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::NotFound => DeckMetaError::SourceNotFound { path },
            std::io::ErrorKind::PermissionDenied => DeckMetaError::PermissionDenied { path },
            _ => DeckMetaError::ReadFailed { path, source },
        }
    }
}

/// A non-fatal error for a single caption or summary request.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AnnotationError {
    /// The request did not complete within the configured timeout.
    #[error("request timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    /// The backend could not be reached or the connection broke.
    #[error("transport error: {0}")]
    Transport(String),

    /// The backend answered with a non-success HTTP status.
    #[error("HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    /// The backend answered but the body was not the expected shape.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// The model produced no usable text.
    #[error("model returned an empty response")]
    EmptyResponse,

    /// The image file exists but could not be read or encoded.
    #[error("could not read image '{path}': {detail}")]
    ImageRead { path: PathBuf, detail: String },

    /// A hosted provider returned an error.
    #[error("provider error: {0}")]
    Provider(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_image_display() {
        let e = DeckMetaError::MalformedImage {
            slide: 2,
            line_number: 5,
            line: "![broken".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("slide 2"), "got: {msg}");
        assert!(msg.contains("line 5"), "got: {msg}");
        assert!(msg.contains("![broken"), "got: {msg}");
    }

    #[test]
    fn from_read_maps_not_found() {
        let err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let e = DeckMetaError::from_read("deck.md", err);
        assert!(matches!(e, DeckMetaError::SourceNotFound { .. }));
    }

    #[test]
    fn from_read_maps_permission_denied() {
        let err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope");
        let e = DeckMetaError::from_read("deck.md", err);
        assert!(matches!(e, DeckMetaError::PermissionDenied { .. }));
    }

    #[test]
    fn from_read_keeps_other_errors() {
        let err = std::io::Error::new(std::io::ErrorKind::InvalidData, "not utf-8");
        let e = DeckMetaError::from_read("deck.md", err);
        assert!(matches!(e, DeckMetaError::ReadFailed { .. }));
        assert!(e.to_string().contains("not utf-8"));
    }

    #[test]
    fn timeout_display() {
        let e = AnnotationError::Timeout { elapsed_ms: 5000 };
        assert!(e.to_string().contains("5000ms"));
    }

    #[test]
    fn http_status_display() {
        let e = AnnotationError::HttpStatus {
            status: 404,
            body: "model 'gemma3:4b' not found".into(),
        };
        assert!(e.to_string().contains("404"));
        assert!(e.to_string().contains("gemma3:4b"));
    }
}
