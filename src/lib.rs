//! # deckmeta
//!
//! Turn slide decks into per-slide metadata for search and retrieval.
//!
//! Each `.pptx` is converted to PDF, rendered to paginated Markdown with its
//! images extracted, split into one record per slide, and optionally
//! enriched with one-sentence slide summaries and image captions from a
//! language model (a local Ollama server by default). The result is a
//! `<stem>_metadata.json` file beside the Markdown.
//!
//! ## Pipeline Overview
//!
//! ```text
//! deck.pptx
//!  │
//!  ├─ 1. Office    LibreOffice → PDF
//!  ├─ 2. Document  marker → paginated Markdown + images/
//!  ├─ 3. Segment   Markdown → ordered slide records
//!  ├─ 4. Write     unenriched <stem>_metadata.json
//!  ├─ 5. Annotate  summary per slide, caption per image (sequential)
//!  └─ 6. Write     enriched <stem>_metadata.json (atomic overwrite)
//! ```
//!
//! Model failures never fail a deck: the affected field is left empty and
//! the run continues.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use deckmeta::{build_annotator, MetadataEnricher, PipelineConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PipelineConfig::default();
//!     let annotator = build_annotator(&config)?;
//!     let path = MetadataEnricher::new()
//!         .enrich("output/deck/deck.md".as_ref(), Some(&annotator))
//!         .await?;
//!     println!("metadata written to {}", path.display());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `deckmeta` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! deckmeta = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod enrich;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{PipelineConfig, PipelineConfigBuilder};
pub use convert::{
    build_annotator, enrich_markdown_files, process_deck, process_pdf, run_batch, run_batch_with,
};
pub use enrich::{enrich, MetadataEnricher};
pub use error::{AnnotationError, DeckMetaError};
pub use output::{
    Annotation, AnnotationCounts, BatchSummary, DeckOutput, FileFailure, ImageRef,
    MetadataDocument, SlideRecord,
};
pub use pipeline::annotate::{Annotator, LlmAnnotator};
pub use pipeline::backend::{
    GenerationOptions, InferenceBackend, InferenceRequest, OllamaBackend, ProviderBackend,
};
pub use pipeline::document::{DocumentConverter, MarkerConverter, OutputFormat, RenderOptions};
pub use pipeline::segment::segment_slides;
pub use pipeline::store::{metadata_path, read_metadata, write_metadata};
pub use progress::{NoopProgressCallback, PipelineProgressCallback, ProgressCallback};
