//! Deck and batch entry points.
//!
//! ```text
//! deck.pptx ──▶ office ──▶ document ──▶ save images ──▶ <stem>.md ──▶ enrich
//!              (PDF)      (Markdown)    (images/)                   (<stem>_metadata.json)
//! ```
//!
//! Files are processed one at a time. A failure in one deck is logged,
//! counted in the [`BatchSummary`] and the batch moves on.

use crate::config::PipelineConfig;
use crate::enrich::MetadataEnricher;
use crate::error::DeckMetaError;
use crate::output::{BatchSummary, DeckOutput, FileFailure};
use crate::pipeline::annotate::{Annotator, LlmAnnotator};
use crate::pipeline::backend::{InferenceBackend, OllamaBackend, ProviderBackend};
use crate::pipeline::document::{save_images, DocumentConverter, MarkerConverter, IMAGE_DIR_NAME};
use crate::pipeline::office;
use edgequake_llm::{LLMProvider, ProviderFactory};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Convert every `*.pptx` in `config.input_dir` and write its metadata.
///
/// Uses [`MarkerConverter`] with `config.converter_command`; see
/// [`run_batch_with`] to supply another converter.
///
/// # Errors
/// Only setup failures are returned (directories cannot be created, the
/// input directory cannot be listed, the inference backend cannot be built).
/// Per-deck failures are reported in the summary.
pub async fn run_batch(config: &PipelineConfig) -> Result<BatchSummary, DeckMetaError> {
    let converter = MarkerConverter::new(config.converter_command.clone());
    run_batch_with(config, &converter).await
}

/// [`run_batch`] with an explicit document converter.
pub async fn run_batch_with(
    config: &PipelineConfig,
    converter: &dyn DocumentConverter,
) -> Result<BatchSummary, DeckMetaError> {
    config.ensure_dirs_exist()?;
    let decks = list_decks(&config.input_dir)?;
    info!(
        "Found {} presentation(s) in {}",
        decks.len(),
        config.input_dir.display()
    );

    let annotator = prepare_annotator(config).await?;
    let annotator = annotator.as_ref().map(|a| a as &dyn Annotator);

    run_each(config, &decks, |deck| async move {
        process_deck(&deck, config, converter, annotator)
            .await
            .map(|_| ())
    })
    .await
}

/// Run only the segmentation and enrichment core over existing Markdown files.
pub async fn enrich_markdown_files(
    paths: &[PathBuf],
    config: &PipelineConfig,
) -> Result<BatchSummary, DeckMetaError> {
    let annotator = prepare_annotator(config).await?;
    let annotator = annotator.as_ref().map(|a| a as &dyn Annotator);
    let enricher = enricher_for(config);
    let enricher = &enricher;

    run_each(config, paths, |path| async move {
        enricher.enrich(&path, annotator).await.map(|_| ())
    })
    .await
}

/// Process one deck: PDF conversion, Markdown rendering, image extraction
/// and metadata.
pub async fn process_deck(
    deck_path: &Path,
    config: &PipelineConfig,
    converter: &dyn DocumentConverter,
    annotator: Option<&dyn Annotator>,
) -> Result<DeckOutput, DeckMetaError> {
    let start = Instant::now();
    info!("Processing {}", deck_path.display());

    let pdf_path = office::convert_to_pdf(deck_path, &config.office_command).await?;
    let mut output = process_pdf(&pdf_path, config, converter, annotator).await?;
    output.source = deck_path.to_path_buf();

    info!(
        "Finished {} in {}ms",
        deck_path.display(),
        start.elapsed().as_millis()
    );
    Ok(output)
}

/// Render an already converted PDF into `<output_dir>/<stem>/` and write
/// its metadata.
pub async fn process_pdf(
    pdf_path: &Path,
    config: &PipelineConfig,
    converter: &dyn DocumentConverter,
    annotator: Option<&dyn Annotator>,
) -> Result<DeckOutput, DeckMetaError> {
    let markdown_path = deck_markdown_path(pdf_path, config);
    let deck_dir = config.deck_output_dir(pdf_path);
    let image_dir = deck_dir.join(IMAGE_DIR_NAME);

    let rendered = converter.render(pdf_path, &config.render_options()).await?;
    let markdown = save_images(&rendered, &image_dir).await?;

    write_markdown(&markdown_path, &markdown).await?;
    debug!(
        "Saved {} images and {} chars of Markdown to {}",
        rendered.images.len(),
        markdown.len(),
        deck_dir.display()
    );

    let metadata_path = enricher_for(config)
        .enrich(&markdown_path, annotator)
        .await?;

    Ok(DeckOutput {
        source: pdf_path.to_path_buf(),
        markdown_path,
        metadata_path,
        images_saved: rendered.images.len(),
    })
}

// ── Backend resolution ───────────────────────────────────────────────────

/// Build the annotator described by `config`.
///
/// The backend is resolved from most-specific to least-specific:
///
/// 1. **Pre-built provider** (`config.provider`): used as-is.
/// 2. **Named provider** (`config.provider_name`): created through
///    [`ProviderFactory::create_llm_provider`], which reads the matching API
///    key (`OPENAI_API_KEY`, …) from the environment.
/// 3. **Ollama** at `config.ollama_url`: the default for local runs.
pub fn build_annotator(config: &PipelineConfig) -> Result<LlmAnnotator, DeckMetaError> {
    let backend = resolve_backend(config)?;
    info!("Using inference backend {}", backend.describe());
    Ok(LlmAnnotator::new(backend).with_timeout(config.api_timeout()))
}

fn resolve_backend(config: &PipelineConfig) -> Result<Arc<dyn InferenceBackend>, DeckMetaError> {
    let options = config.generation_options();

    if let Some(ref provider) = config.provider {
        return Ok(Arc::new(ProviderBackend::new(
            Arc::clone(provider),
            format!("provider:{}", config.model),
            options,
        )));
    }

    if let Some(ref name) = config.provider_name {
        let provider = create_provider(name, &config.model)?;
        return Ok(Arc::new(ProviderBackend::new(
            provider,
            format!("{name}:{}", config.model),
            options,
        )));
    }

    let backend = OllamaBackend::new(
        config.ollama_url.clone(),
        config.model.clone(),
        options,
        config.api_timeout(),
    )
    .map_err(|e| DeckMetaError::ProviderNotConfigured {
        provider: "ollama".into(),
        hint: e.to_string(),
    })?;
    Ok(Arc::new(backend))
}

fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, DeckMetaError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        DeckMetaError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// `None` when enrichment is disabled. An unreachable backend is only
/// a warning: metadata is still written, with empty annotations.
async fn prepare_annotator(config: &PipelineConfig) -> Result<Option<LlmAnnotator>, DeckMetaError> {
    if !config.describe_images {
        info!("Enrichment disabled; writing structural metadata only");
        return Ok(None);
    }

    let annotator = build_annotator(config)?;
    let backend = annotator.backend();
    if let Err(e) = backend.check_connection().await {
        warn!(
            "{} is not reachable ({}); summaries and descriptions will be empty",
            backend.describe(),
            e
        );
    }
    Ok(Some(annotator))
}

// ── Internal helpers ─────────────────────────────────────────────────────

fn enricher_for(config: &PipelineConfig) -> MetadataEnricher {
    match config.progress_callback {
        Some(ref cb) => MetadataEnricher::new().with_progress(Arc::clone(cb)),
        None => MetadataEnricher::new(),
    }
}

/// Run `job` for every path in order, catching per-file errors.
async fn run_each<F, Fut>(
    config: &PipelineConfig,
    paths: &[PathBuf],
    job: F,
) -> Result<BatchSummary, DeckMetaError>
where
    F: Fn(PathBuf) -> Fut,
    Fut: Future<Output = Result<(), DeckMetaError>>,
{
    let start = Instant::now();
    let total = paths.len();
    let mut summary = BatchSummary::default();

    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_start(total);
    }

    for (i, path) in paths.iter().enumerate() {
        let file_num = i + 1;
        if let Some(ref cb) = config.progress_callback {
            cb.on_file_start(path, file_num, total);
        }

        match job(path.clone()).await {
            Ok(()) => {
                summary.processed += 1;
                if let Some(ref cb) = config.progress_callback {
                    cb.on_file_complete(path, file_num, total);
                }
            }
            Err(e) => {
                error!("Error processing {}: {}", path.display(), e);
                summary.failed += 1;
                if let Some(ref cb) = config.progress_callback {
                    cb.on_file_error(path, file_num, total, &e.to_string());
                }
                summary.failures.push(FileFailure {
                    path: path.clone(),
                    error: e.to_string(),
                });
            }
        }
    }

    summary.elapsed_ms = start.elapsed().as_millis() as u64;
    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_complete(total, summary.processed);
    }
    info!(
        "Batch complete: {} processed, {} failed, {:.2}s",
        summary.processed,
        summary.failed,
        summary.elapsed_ms as f64 / 1000.0
    );
    Ok(summary)
}

/// `*.pptx` files directly inside `dir`, sorted by path.
fn list_decks(dir: &Path) -> Result<Vec<PathBuf>, DeckMetaError> {
    let entries = std::fs::read_dir(dir).map_err(|e| DeckMetaError::from_read(dir, e))?;
    let mut decks: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.is_file()
                && p.extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("pptx"))
        })
        .collect();
    decks.sort();
    Ok(decks)
}

/// Atomic write: temp file, then rename.
async fn write_markdown(path: &Path, markdown: &str) -> Result<(), DeckMetaError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| DeckMetaError::DirectoryCreateFailed {
                path: parent.to_path_buf(),
                source: e,
            })?;
    }

    let tmp_path = path.with_extension("md.tmp");
    tokio::fs::write(&tmp_path, markdown)
        .await
        .map_err(|e| DeckMetaError::MarkdownWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })?;
    if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(DeckMetaError::MarkdownWriteFailed {
            path: path.to_path_buf(),
            source: e,
        });
    }
    Ok(())
}

/// `<output_dir>/<stem>/<stem>.md` for a deck or PDF at `path`.
pub fn deck_markdown_path(path: &Path, config: &PipelineConfig) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    config.deck_output_dir(path).join(format!("{stem}.md"))
}
