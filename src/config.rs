//! Configuration for the deck pipeline.
//!
//! All run behaviour is controlled through [`PipelineConfig`], built via its
//! [`PipelineConfigBuilder`]. The CLI maps its flags one-to-one onto the
//! builder; library callers set only what they care about and rely on the
//! defaults for the rest.

use crate::error::DeckMetaError;
use crate::pipeline::backend::GenerationOptions;
use crate::pipeline::document::{OutputFormat, RenderOptions};
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Configuration for a batch run.
///
/// Built via [`PipelineConfig::builder()`] or using
/// [`PipelineConfig::default()`].
///
/// # Example
/// ```rust
/// use deckmeta::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .input_dir("decks")
///     .model("llava:13b")
///     .api_timeout_secs(60)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Directory scanned for `*.pptx` files. Default: `input`.
    pub input_dir: PathBuf,

    /// Root of the per-deck output folders. Default: `output`.
    ///
    /// Each deck gets `<output_dir>/<stem>/` holding `<stem>.md`,
    /// `<stem>_metadata.json` and `images/`.
    pub output_dir: PathBuf,

    /// Base URL of the Ollama server. Default: `http://localhost:11434`.
    pub ollama_url: String,

    /// Model used for captions and summaries. Default: `gemma3:4b`.
    ///
    /// With a named `provider_name` this is passed to the provider factory
    /// instead.
    pub model: String,

    /// Run the enrichment phase. Default: true.
    ///
    /// When false, metadata is still written with every summary and
    /// description left empty.
    pub describe_images: bool,

    /// Ask the converter to OCR every page. Default: true.
    ///
    /// Slide decks exported to PDF often carry text as vector outlines that
    /// the converter cannot extract without OCR.
    pub force_ocr: bool,

    /// Converter output format. Default: Markdown.
    pub output_format: OutputFormat,

    /// Comma-separated OCR languages. Default: `en`.
    pub langs: String,

    /// edgequake-llm provider name (e.g. "openai", "anthropic").
    /// If None along with `provider`, the local Ollama server is used.
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Per-request timeout in seconds. Default: 120.
    pub api_timeout_secs: u64,

    /// Sampling temperature. Default: None (the model's own default).
    pub temperature: Option<f32>,

    /// Maximum tokens per caption or summary. Default: 500.
    pub max_tokens: usize,

    /// Office suite executable. Default: `libreoffice`.
    pub office_command: String,

    /// Document converter executable. Default: `marker_single`.
    pub converter_command: String,

    /// Optional progress callback.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("input"),
            output_dir: PathBuf::from("output"),
            ollama_url: "http://localhost:11434".into(),
            model: "gemma3:4b".into(),
            describe_images: true,
            force_ocr: true,
            output_format: OutputFormat::Markdown,
            langs: "en".into(),
            provider_name: None,
            provider: None,
            api_timeout_secs: 120,
            temperature: None,
            max_tokens: 500,
            office_command: "libreoffice".into(),
            converter_command: "marker_single".into(),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("input_dir", &self.input_dir)
            .field("output_dir", &self.output_dir)
            .field("ollama_url", &self.ollama_url)
            .field("model", &self.model)
            .field("describe_images", &self.describe_images)
            .field("force_ocr", &self.force_ocr)
            .field("output_format", &self.output_format)
            .field("langs", &self.langs)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("office_command", &self.office_command)
            .field("converter_command", &self.converter_command)
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }

    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api_timeout_secs)
    }

    pub fn generation_options(&self) -> GenerationOptions {
        GenerationOptions {
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }

    pub fn render_options(&self) -> RenderOptions {
        RenderOptions {
            output_format: self.output_format,
            langs: self.langs.clone(),
            force_ocr: self.force_ocr,
        }
    }

    /// `<output_dir>/<stem>` for a deck at `deck_path`.
    pub fn deck_output_dir(&self, deck_path: &Path) -> PathBuf {
        let stem = deck_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.output_dir.join(stem)
    }

    /// Create the input and output directories if they are missing.
    pub fn ensure_dirs_exist(&self) -> Result<(), DeckMetaError> {
        for dir in [&self.input_dir, &self.output_dir] {
            std::fs::create_dir_all(dir).map_err(|e| DeckMetaError::DirectoryCreateFailed {
                path: dir.clone(),
                source: e,
            })?;
        }
        Ok(())
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn input_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.input_dir = dir.into();
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn ollama_url(mut self, url: impl Into<String>) -> Self {
        self.config.ollama_url = url.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn describe_images(mut self, v: bool) -> Self {
        self.config.describe_images = v;
        self
    }

    pub fn force_ocr(mut self, v: bool) -> Self {
        self.config.force_ocr = v;
        self
    }

    pub fn output_format(mut self, format: OutputFormat) -> Self {
        self.config.output_format = format;
        self
    }

    pub fn langs(mut self, langs: impl Into<String>) -> Self {
        self.config.langs = langs.into();
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = Some(t.clamp(0.0, 2.0));
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn office_command(mut self, cmd: impl Into<String>) -> Self {
        self.config.office_command = cmd.into();
        self
    }

    pub fn converter_command(mut self, cmd: impl Into<String>) -> Self {
        self.config.converter_command = cmd.into();
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, DeckMetaError> {
        let c = &self.config;
        if c.api_timeout_secs == 0 {
            return Err(DeckMetaError::InvalidConfig(
                "API timeout must be ≥ 1 second".into(),
            ));
        }
        if c.max_tokens == 0 {
            return Err(DeckMetaError::InvalidConfig(
                "max_tokens must be ≥ 1".into(),
            ));
        }
        if c.model.trim().is_empty() {
            return Err(DeckMetaError::InvalidConfig("model must not be empty".into()));
        }
        if c.provider.is_none()
            && c.provider_name.is_none()
            && !(c.ollama_url.starts_with("http://") || c.ollama_url.starts_with("https://"))
        {
            return Err(DeckMetaError::InvalidConfig(format!(
                "Ollama URL must start with http:// or https://, got '{}'",
                c.ollama_url
            )));
        }
        if c.langs.split(',').any(|l| l.trim().is_empty()) {
            return Err(DeckMetaError::InvalidConfig(format!(
                "languages must be a comma-separated list, got '{}'",
                c.langs
            )));
        }
        Ok(self.config)
    }
}
