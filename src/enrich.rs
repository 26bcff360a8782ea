//! Metadata enrichment: Markdown file → `<stem>_metadata.json`.
//!
//! The enricher orchestrates the segmenter, the optional [`Annotator`] and
//! the metadata store. It always persists the structural (unenriched)
//! document first, so a deck whose model calls all fail, or a run without a
//! model, still leaves a usable metadata file behind. Enrichment then
//! rewrites the same file in place.
//!
//! ## Sequence
//!
//! ```text
//! read ──▶ segment ──▶ write (unenriched) ──▶ summarize ──▶ describe_images ──▶ write
//!                            │                 (per slide)   (one batch call)
//!                            └── no annotator: stop here
//! ```

use crate::error::DeckMetaError;
use crate::output::{Annotation, MetadataDocument};
use crate::pipeline::annotate::Annotator;
use crate::pipeline::segment::segment_slides;
use crate::pipeline::store::{metadata_path, write_metadata};
use crate::progress::ProgressCallback;
use chrono::{Local, NaiveDateTime};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info};

/// Builds and persists the metadata document for one Markdown file.
///
/// # Example
/// ```rust,no_run
/// use deckmeta::MetadataEnricher;
/// use std::path::Path;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), deckmeta::DeckMetaError> {
/// // Structural metadata only; no model involved.
/// let path = MetadataEnricher::new()
///     .enrich(Path::new("output/deck/deck.md"), None)
///     .await?;
/// println!("wrote {}", path.display());
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Default)]
pub struct MetadataEnricher {
    progress: Option<ProgressCallback>,
    generated_at: Option<NaiveDateTime>,
}

impl MetadataEnricher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    /// Stamp documents with a fixed `parsed_at` instead of the current local
    /// time. Two runs with the same input and a deterministic annotator then
    /// produce byte-identical files.
    pub fn with_generated_at(mut self, ts: NaiveDateTime) -> Self {
        self.generated_at = Some(ts);
        self
    }

    /// Segment `markdown_path`, persist its metadata and, when an annotator
    /// is given, enrich it with summaries and image descriptions.
    ///
    /// Returns the metadata path. Annotation failures never fail the call;
    /// they leave the affected field empty.
    ///
    /// # Errors
    /// - [`DeckMetaError::SourceNotFound`] / [`DeckMetaError::PermissionDenied`] /
    ///   [`DeckMetaError::ReadFailed`] if the Markdown cannot be read
    /// - [`DeckMetaError::MalformedImage`] if segmentation fails (nothing is written)
    /// - [`DeckMetaError::MetadataWriteFailed`] if either write fails
    pub async fn enrich(
        &self,
        markdown_path: &Path,
        annotator: Option<&dyn Annotator>,
    ) -> Result<PathBuf, DeckMetaError> {
        let start = Instant::now();
        let markdown = read_markdown(markdown_path).await?;
        let slides = segment_slides(&markdown)?;

        let source_file = markdown_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let generated_at = self
            .generated_at
            .unwrap_or_else(|| Local::now().naive_local());
        let mut doc = MetadataDocument::new(source_file, generated_at, slides);

        let out_path = metadata_path(markdown_path);
        write_metadata(&doc, &out_path).await?;
        info!(
            "Parsed {} slides ({} images) from {}",
            doc.slide_count(),
            doc.image_count(),
            markdown_path.display()
        );

        let Some(annotator) = annotator else {
            debug!("No annotator configured; leaving annotations empty");
            return Ok(out_path);
        };

        let markdown_dir = markdown_path.parent().unwrap_or_else(|| Path::new(""));
        self.annotate(&mut doc, markdown_path, markdown_dir, annotator)
            .await;

        write_metadata(&doc, &out_path).await?;

        let summaries = doc.summary_counts();
        let descriptions = doc.description_counts();
        info!(
            "Enriched {}: summaries {} ok / {} failed, images {} ok / {} failed / {} unavailable ({}ms)",
            markdown_path.display(),
            summaries.generated,
            summaries.failed,
            descriptions.generated,
            descriptions.failed,
            descriptions.pending,
            start.elapsed().as_millis()
        );

        Ok(out_path)
    }

    async fn annotate(
        &self,
        doc: &mut MetadataDocument,
        markdown_path: &Path,
        markdown_dir: &Path,
        annotator: &dyn Annotator,
    ) {
        let total_slides = doc.slide_count();
        let summary_total = doc.slides().iter().filter(|s| !s.text.is_empty()).count();
        let image_total = doc.image_count();
        if let Some(ref cb) = self.progress {
            cb.on_enrichment_start(markdown_path, summary_total, image_total);
        }

        // ── Summaries, one slide at a time ──────────────────────────────
        for slide in doc.slides_mut().iter_mut() {
            if slide.text.is_empty() {
                continue;
            }
            slide.summary = annotator.summarize(&slide.text).await;
            if let Some(ref cb) = self.progress {
                cb.on_summary_done(slide.index, total_slides, slide.summary.is_generated());
            }
        }

        // ── Image descriptions, one batch call ──────────────────────────
        let resolved: Vec<PathBuf> = doc
            .slides()
            .iter()
            .flat_map(|s| s.images.iter())
            .map(|image| markdown_dir.join(&image.relative_path))
            .collect();
        if resolved.is_empty() {
            return;
        }

        let descriptions = annotator.describe_images(&resolved).await;
        let images = doc.slides_mut().iter_mut().flat_map(|s| s.images.iter_mut());
        for (i, (image, path)) in images.zip(resolved.iter()).enumerate() {
            image.description = descriptions
                .get(path)
                .cloned()
                .unwrap_or(Annotation::Pending);
            if let Some(ref cb) = self.progress {
                cb.on_image_described(i, image_total, image.description.is_generated());
            }
        }
    }
}

/// Enrich one Markdown file with default settings.
///
/// Shorthand for `MetadataEnricher::new().enrich(markdown_path, annotator)`.
pub async fn enrich(
    markdown_path: impl AsRef<Path>,
    annotator: Option<&dyn Annotator>,
) -> Result<PathBuf, DeckMetaError> {
    MetadataEnricher::new()
        .enrich(markdown_path.as_ref(), annotator)
        .await
}

async fn read_markdown(path: &Path) -> Result<String, DeckMetaError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| DeckMetaError::from_read(path, e))?;
    String::from_utf8(bytes).map_err(|e| {
        DeckMetaError::from_read(
            path,
            std::io::Error::new(std::io::ErrorKind::InvalidData, e),
        )
    })
}
