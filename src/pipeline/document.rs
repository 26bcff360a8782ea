//! PDF → Markdown through an external document converter.
//!
//! The converter produces paginated Markdown (pages separated by the
//! `{N}------…` rule the segmenter splits on) plus the images it extracted.
//! [`DocumentConverter`] is the seam; [`MarkerConverter`] drives the
//! `marker_single` CLI, and tests substitute an in-memory converter.

use crate::error::DeckMetaError;
use async_trait::async_trait;
use image::ImageFormat;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tokio::process::Command;
use tracing::{debug, info};

/// Directory (relative to the Markdown file) that extracted images go into.
pub const IMAGE_DIR_NAME: &str = "images";

/// Output formats a converter may be asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Paginated Markdown. The only format the segmenter understands.
    #[default]
    Markdown,
    /// Accepted on the command line, rejected at conversion time.
    Html,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Markdown => f.write_str("markdown"),
            OutputFormat::Html => f.write_str("html"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            "html" => Ok(OutputFormat::Html),
            other => Err(format!("unknown output format '{other}' (expected markdown or html)")),
        }
    }
}

/// Converter knobs taken from [`crate::config::PipelineConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderOptions {
    pub output_format: OutputFormat,
    /// Comma-separated OCR language codes, e.g. `en,de`.
    pub langs: String,
    pub force_ocr: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            output_format: OutputFormat::Markdown,
            langs: "en".into(),
            force_ocr: true,
        }
    }
}

/// Markdown plus the images it references by bare file name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderedDocument {
    pub markdown: String,
    /// `(file name, encoded bytes)` in file-name order.
    pub images: Vec<(String, Vec<u8>)>,
}

/// Renders a PDF into paginated Markdown.
#[async_trait]
pub trait DocumentConverter: Send + Sync {
    async fn render(&self, pdf: &Path, options: &RenderOptions)
        -> Result<RenderedDocument, DeckMetaError>;
}

// ── marker ───────────────────────────────────────────────────────────────

/// [`DocumentConverter`] over the `marker_single` command-line tool.
#[derive(Debug, Clone)]
pub struct MarkerConverter {
    command: String,
}

impl MarkerConverter {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }

    fn args(&self, pdf: &Path, out_dir: &Path, options: &RenderOptions) -> Vec<String> {
        let mut args = vec![
            pdf.to_string_lossy().into_owned(),
            "--output_dir".into(),
            out_dir.to_string_lossy().into_owned(),
            "--output_format".into(),
            options.output_format.to_string(),
            "--paginate_output".into(),
        ];
        if options.force_ocr {
            args.push("--force_ocr".into());
        }
        if !options.langs.is_empty() {
            args.push("--languages".into());
            args.push(options.langs.clone());
        }
        args
    }
}

impl Default for MarkerConverter {
    fn default() -> Self {
        Self::new("marker_single")
    }
}

#[async_trait]
impl DocumentConverter for MarkerConverter {
    async fn render(
        &self,
        pdf: &Path,
        options: &RenderOptions,
    ) -> Result<RenderedDocument, DeckMetaError> {
        if options.output_format != OutputFormat::Markdown {
            return Err(DeckMetaError::UnsupportedOutputFormat {
                format: options.output_format.to_string(),
            });
        }

        let scratch = tempfile::tempdir().map_err(|e| DeckMetaError::DocumentConversionFailed {
            path: pdf.to_path_buf(),
            detail: format!("cannot create scratch directory: {e}"),
        })?;

        info!("Rendering {} with {}", pdf.display(), self.command);
        let output = Command::new(&self.command)
            .args(self.args(pdf, scratch.path(), options))
            .output()
            .await
            .map_err(|e| DeckMetaError::DocumentConversionFailed {
                path: pdf.to_path_buf(),
                detail: format!("failed to run '{}': {e}", self.command),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DeckMetaError::DocumentConversionFailed {
                path: pdf.to_path_buf(),
                detail: format!("'{}' exited with {}: {}", self.command, output.status, stderr.trim()),
            });
        }

        collect_output(pdf, scratch.path()).await
    }
}

/// Find the Markdown file the converter wrote under `out_dir` (directly or
/// one level down, in a per-document folder) and the images beside it.
async fn collect_output(pdf: &Path, out_dir: &Path) -> Result<RenderedDocument, DeckMetaError> {
    let conversion_failed = |detail: String| DeckMetaError::DocumentConversionFailed {
        path: pdf.to_path_buf(),
        detail,
    };

    let mut search = vec![out_dir.to_path_buf()];
    search.extend(
        list_dir(out_dir)
            .await
            .map_err(|e| conversion_failed(e.to_string()))?
            .into_iter()
            .filter(|p| p.is_dir()),
    );

    for dir in search {
        let entries = list_dir(&dir)
            .await
            .map_err(|e| conversion_failed(e.to_string()))?;
        let Some(md_path) = entries
            .iter()
            .find(|p| p.extension().is_some_and(|ext| ext == "md"))
        else {
            continue;
        };

        let markdown = tokio::fs::read_to_string(md_path)
            .await
            .map_err(|e| conversion_failed(format!("cannot read {}: {e}", md_path.display())))?;

        let mut images = Vec::new();
        for path in entries.iter().filter(|p| p.is_file() && is_image_file(p)) {
            let bytes = tokio::fs::read(path)
                .await
                .map_err(|e| conversion_failed(format!("cannot read {}: {e}", path.display())))?;
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            images.push((name, bytes));
        }

        debug!(
            "Converter produced {} chars of Markdown and {} images",
            markdown.len(),
            images.len()
        );
        return Ok(RenderedDocument { markdown, images });
    }

    Err(conversion_failed(format!(
        "no Markdown file found in {}",
        out_dir.display()
    )))
}

async fn list_dir(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut entries = Vec::new();
    let mut reader = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = reader.next_entry().await? {
        entries.push(entry.path());
    }
    entries.sort();
    Ok(entries)
}

fn is_image_file(path: &Path) -> bool {
    ImageFormat::from_path(path).is_ok()
}

// ── Saving ───────────────────────────────────────────────────────────────

/// Write every extracted image under `image_dir` and point the Markdown's
/// bare `![](<name>)` references at `images/<name>`.
///
/// Returns the rewritten Markdown.
pub async fn save_images(
    rendered: &RenderedDocument,
    image_dir: &Path,
) -> Result<String, DeckMetaError> {
    tokio::fs::create_dir_all(image_dir)
        .await
        .map_err(|e| DeckMetaError::DirectoryCreateFailed {
            path: image_dir.to_path_buf(),
            source: e,
        })?;

    let mut markdown = rendered.markdown.clone();
    for (name, bytes) in &rendered.images {
        let path = image_dir.join(name);
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| DeckMetaError::ImageSaveFailed {
                path: path.clone(),
                source: e,
            })?;
        markdown = rewrite_image_ref(&markdown, name);
    }
    Ok(markdown)
}

fn rewrite_image_ref(markdown: &str, name: &str) -> String {
    markdown.replace(
        &format!("![]({name})"),
        &format!("![]({IMAGE_DIR_NAME}/{name})"),
    )
}
