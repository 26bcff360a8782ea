//! Output types: the per-slide metadata model and run statistics.
//!
//! The persisted JSON layout is fixed for downstream consumers, so the Rust
//! field names are mapped onto it with `#[serde(rename)]` instead of being
//! named after the wire format:
//!
//! | Rust                       | JSON            |
//! |----------------------------|-----------------|
//! | `MetadataDocument::generated_at` | `parsed_at` |
//! | `SlideRecord::index`       | `slide_number`  |
//! | `SlideRecord::text`        | `description`   |
//! | `SlideRecord::summary`     | `desc_summary`  |
//! | `ImageRef::relative_path`  | `path`          |

use crate::error::AnnotationError;
use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::path::PathBuf;

// ── Annotation ───────────────────────────────────────────────────────────

/// The outcome of one caption or summary request.
///
/// Failure information stays available in memory for logs and progress
/// reporting; only [`Annotation::Generated`] text reaches the JSON file.
/// Everything else is written as `""`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Annotation {
    /// Not requested yet, not requested at all, or the input was unavailable.
    #[default]
    Pending,
    /// The model produced this text.
    Generated(String),
    /// The request failed; the reason is kept for logging only.
    Failed { reason: String },
}

impl Annotation {
    /// Text as persisted: the generated text, or `""`.
    pub fn as_str(&self) -> &str {
        match self {
            Annotation::Generated(text) => text,
            Annotation::Pending | Annotation::Failed { .. } => "",
        }
    }

    pub fn is_generated(&self) -> bool {
        matches!(self, Annotation::Generated(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Annotation::Failed { .. })
    }

    /// Collapse a backend result into an annotation.
    pub fn from_result(result: Result<String, AnnotationError>) -> Self {
        match result {
            Ok(text) if !text.is_empty() => Annotation::Generated(text),
            Ok(_) => Annotation::Failed {
                reason: AnnotationError::EmptyResponse.to_string(),
            },
            Err(e) => Annotation::Failed {
                reason: e.to_string(),
            },
        }
    }
}

impl Serialize for Annotation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Annotation {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        if text.is_empty() {
            Ok(Annotation::Pending)
        } else {
            Ok(Annotation::Generated(text))
        }
    }
}

// ── Slide model ──────────────────────────────────────────────────────────

/// An image referenced from a slide.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    /// Path exactly as written in the Markdown, relative to the Markdown file.
    #[serde(rename = "path")]
    pub relative_path: String,
    /// One-sentence caption.
    pub description: Annotation,
}

impl ImageRef {
    pub fn new(relative_path: impl Into<String>) -> Self {
        Self {
            relative_path: relative_path.into(),
            description: Annotation::Pending,
        }
    }
}

/// The extracted content of one deck page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlideRecord {
    /// Zero-based position in the document.
    #[serde(rename = "slide_number")]
    pub index: usize,
    /// Retained non-image lines, joined with `\n`.
    #[serde(rename = "description")]
    pub text: String,
    /// One-sentence synopsis of `text`.
    #[serde(rename = "desc_summary")]
    pub summary: Annotation,
    /// Images in order of appearance.
    pub images: Vec<ImageRef>,
}

impl SlideRecord {
    pub fn new(index: usize, text: impl Into<String>, images: Vec<ImageRef>) -> Self {
        Self {
            index,
            text: text.into(),
            summary: Annotation::Pending,
            images,
        }
    }
}

// ── Metadata document ────────────────────────────────────────────────────

/// Counts of annotation states across a document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationCounts {
    pub generated: usize,
    pub failed: usize,
    pub pending: usize,
}

impl AnnotationCounts {
    fn record(&mut self, annotation: &Annotation) {
        match annotation {
            Annotation::Generated(_) => self.generated += 1,
            Annotation::Failed { .. } => self.failed += 1,
            Annotation::Pending => self.pending += 1,
        }
    }
}

/// The metadata record persisted next to each Markdown document.
///
/// `slide_count` always equals `slides().len()`: slides are only handed out
/// as a mutable slice, and deserialisation rejects documents that disagree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawMetadataDocument")]
pub struct MetadataDocument {
    source_file: String,
    #[serde(rename = "parsed_at", with = "iso_timestamp")]
    generated_at: NaiveDateTime,
    slide_count: usize,
    slides: Vec<SlideRecord>,
}

impl MetadataDocument {
    pub fn new(
        source_file: impl Into<String>,
        generated_at: NaiveDateTime,
        slides: Vec<SlideRecord>,
    ) -> Self {
        Self {
            source_file: source_file.into(),
            generated_at,
            slide_count: slides.len(),
            slides,
        }
    }

    pub fn source_file(&self) -> &str {
        &self.source_file
    }

    pub fn generated_at(&self) -> NaiveDateTime {
        self.generated_at
    }

    pub fn slide_count(&self) -> usize {
        self.slide_count
    }

    pub fn slides(&self) -> &[SlideRecord] {
        &self.slides
    }

    /// Mutable access for enrichment; the slide list cannot grow or shrink.
    pub fn slides_mut(&mut self) -> &mut [SlideRecord] {
        &mut self.slides
    }

    pub fn image_count(&self) -> usize {
        self.slides.iter().map(|s| s.images.len()).sum()
    }

    /// Summary states, counted only for slides that have text.
    pub fn summary_counts(&self) -> AnnotationCounts {
        let mut counts = AnnotationCounts::default();
        for slide in self.slides.iter().filter(|s| !s.text.is_empty()) {
            counts.record(&slide.summary);
        }
        counts
    }

    pub fn description_counts(&self) -> AnnotationCounts {
        let mut counts = AnnotationCounts::default();
        for image in self.slides.iter().flat_map(|s| s.images.iter()) {
            counts.record(&image.description);
        }
        counts
    }
}

#[derive(Deserialize)]
struct RawMetadataDocument {
    source_file: String,
    #[serde(rename = "parsed_at", with = "iso_timestamp")]
    generated_at: NaiveDateTime,
    slide_count: usize,
    slides: Vec<SlideRecord>,
}

impl TryFrom<RawMetadataDocument> for MetadataDocument {
    type Error = String;

    fn try_from(raw: RawMetadataDocument) -> Result<Self, Self::Error> {
        if raw.slide_count != raw.slides.len() {
            return Err(format!(
                "slide_count is {} but {} slides are present",
                raw.slide_count,
                raw.slides.len()
            ));
        }
        Ok(MetadataDocument::new(
            raw.source_file,
            raw.generated_at,
            raw.slides,
        ))
    }
}

/// ISO-8601 local timestamps with microsecond precision,
/// e.g. `2025-03-14T09:26:53.589793`.
mod iso_timestamp {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

    pub fn serialize<S: Serializer>(ts: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&ts.format(FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDateTime, D::Error> {
        let s = String::deserialize(deserializer)?;
        // FromStr accepts the fractional part as optional.
        s.parse::<NaiveDateTime>().map_err(serde::de::Error::custom)
    }
}

// ── Run results ──────────────────────────────────────────────────────────

/// Paths and counts produced for one processed deck.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeckOutput {
    /// The deck that was processed.
    pub source: PathBuf,
    /// Rendered Markdown document.
    pub markdown_path: PathBuf,
    /// Persisted metadata JSON.
    pub metadata_path: PathBuf,
    /// Number of images saved under the deck's `images/` directory.
    pub images_saved: usize,
}

/// A per-file failure recorded by the batch loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileFailure {
    pub path: PathBuf,
    pub error: String,
}

/// Run summary reported at the end of a batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Files processed without a fatal error.
    pub processed: usize,
    /// Files that failed; the batch continued past each of them.
    pub failed: usize,
    /// Wall-clock time for the whole batch.
    pub elapsed_ms: u64,
    pub failures: Vec<FileFailure>,
}

impl BatchSummary {
    pub fn total(&self) -> usize {
        self.processed + self.failed
    }
}
