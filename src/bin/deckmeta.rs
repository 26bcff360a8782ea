//! CLI binary for deckmeta.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `PipelineConfig` and prints results.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use deckmeta::pipeline::store::to_json;
use deckmeta::{
    enrich_markdown_files, read_metadata, run_batch, BatchSummary, OutputFormat, PipelineConfig,
    PipelineProgressCallback, ProgressCallback,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

/// Terminal progress callback: one bar over the files of the run, with the
/// current slide or image shown as the bar message.
struct CliProgressCallback {
    bar: ProgressBar,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} files  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        bar.set_style(style);
        bar.set_prefix("Processing");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            errors: AtomicUsize::new(0),
        })
    }
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

impl PipelineProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_files: usize) {
        self.bar.set_length(total_files as u64);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Processing {total_files} file(s)…"))
        ));
    }

    fn on_file_start(&self, path: &Path, _file_num: usize, _total_files: usize) {
        self.bar.set_message(file_label(path));
    }

    fn on_file_complete(&self, path: &Path, file_num: usize, total_files: usize) {
        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {}",
            green("✓"),
            file_num,
            total_files,
            file_label(path)
        ));
        self.bar.inc(1);
    }

    fn on_file_error(&self, path: &Path, file_num: usize, total_files: usize, error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);

        // Keep one line per file.
        let first_line = error.lines().next().unwrap_or_default();
        let msg = match first_line.char_indices().nth(100) {
            Some((idx, _)) => format!("{}\u{2026}", &first_line[..idx]),
            None => first_line.to_string(),
        };

        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {}  {}",
            red("✗"),
            file_num,
            total_files,
            file_label(path),
            red(&msg),
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, _total_files: usize, _success_count: usize) {
        self.bar.finish_and_clear();
    }

    fn on_enrichment_start(&self, _markdown_path: &Path, summaries: usize, images: usize) {
        self.bar
            .set_message(format!("annotating {summaries} slides, {images} images"));
    }

    fn on_summary_done(&self, slide_index: usize, total_slides: usize, _generated: bool) {
        self.bar
            .set_message(format!("slide {}/{}", slide_index + 1, total_slides));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert every deck in ./input, captions and summaries from local Ollama
  deckmeta run

  # Other folders and model
  deckmeta run --input-dir decks --output-dir out --model llava:13b

  # Structural metadata only (no model calls)
  deckmeta run --no-desc-images

  # Re-run segmentation and enrichment on existing Markdown
  deckmeta enrich out/Q3/Q3.md out/Q4/Q4.md

  # Use a hosted vision model instead of Ollama
  deckmeta run --provider openai --model gpt-4.1-mini

  # Summarise a metadata file
  deckmeta inspect out/Q3/Q3_metadata.json

OUTPUT LAYOUT:
  <output-dir>/<stem>/<stem>.md               paginated Markdown
  <output-dir>/<stem>/images/                 extracted images
  <output-dir>/<stem>/<stem>_metadata.json    per-slide metadata

EXTERNAL TOOLS:
  libreoffice     (--office-command)     .pptx → .pdf
  marker_single   (--converter-command)  .pdf → Markdown + images
  ollama          (--ollama-url)         captions and summaries

ENVIRONMENT VARIABLES:
  OLLAMA_HOST             Ollama base URL
  DECKMETA_MODEL          Model name
  DECKMETA_PROVIDER       edgequake-llm provider (openai, anthropic, gemini, …)
  OPENAI_API_KEY          OpenAI API key (with --provider openai)
  ANTHROPIC_API_KEY       Anthropic API key (with --provider anthropic)
  RUST_LOG                Log filter, overrides -v / -q
"#;

/// Turn slide decks into per-slide metadata.
#[derive(Parser, Debug)]
#[command(
    name = "deckmeta",
    version,
    about = "Turn slide decks into per-slide metadata with AI captions and summaries",
    long_about = "Convert PowerPoint decks to PDF and paginated Markdown, split them into \
per-slide records, and enrich each slide with a one-sentence summary and image captions from \
a local Ollama model or any edgequake-llm provider.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "DECKMETA_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "DECKMETA_QUIET")]
    quiet: bool,

    /// Disable progress bar.
    #[arg(long, global = true, env = "DECKMETA_NO_PROGRESS")]
    no_progress: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Process every .pptx in the input directory.
    Run(RunArgs),

    /// Segment and enrich existing Markdown files.
    Enrich {
        /// Markdown files produced by an earlier run.
        #[arg(required = true)]
        markdown: Vec<PathBuf>,

        #[command(flatten)]
        model: ModelArgs,
    },

    /// Print a summary of a metadata file.
    Inspect {
        /// A `<stem>_metadata.json` file.
        metadata: PathBuf,

        /// Print the document as JSON instead.
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Directory containing .pptx files.
    #[arg(long, env = "DECKMETA_INPUT_DIR", default_value = "input")]
    input_dir: PathBuf,

    /// Directory for per-deck output folders.
    #[arg(long, env = "DECKMETA_OUTPUT_DIR", default_value = "output")]
    output_dir: PathBuf,

    /// Do not force OCR in the document converter.
    #[arg(long, env = "DECKMETA_NO_FORCE_OCR")]
    no_force_ocr: bool,

    /// Converter output format.
    #[arg(long, env = "DECKMETA_OUTPUT_FORMAT", value_enum, default_value = "markdown")]
    output_format: OutputFormatArg,

    /// Comma-separated OCR languages.
    #[arg(long, env = "DECKMETA_LANGS", default_value = "en")]
    langs: String,

    /// Office suite executable used for .pptx → .pdf.
    #[arg(long, env = "DECKMETA_OFFICE_COMMAND", default_value = "libreoffice")]
    office_command: String,

    /// Document converter executable used for .pdf → Markdown.
    #[arg(long, env = "DECKMETA_CONVERTER_COMMAND", default_value = "marker_single")]
    converter_command: String,

    #[command(flatten)]
    model: ModelArgs,
}

#[derive(Args, Debug)]
struct ModelArgs {
    /// Ollama server URL.
    #[arg(long, env = "OLLAMA_HOST", default_value = "http://localhost:11434")]
    ollama_url: String,

    /// Model used for captions and summaries.
    #[arg(long, env = "DECKMETA_MODEL", default_value = "gemma3:4b")]
    model: String,

    /// edgequake-llm provider (openai, anthropic, gemini, …) instead of Ollama.
    #[arg(long, env = "DECKMETA_PROVIDER")]
    provider: Option<String>,

    /// Skip captions and summaries; write structural metadata only.
    #[arg(long, env = "DECKMETA_NO_DESC_IMAGES")]
    no_desc_images: bool,

    /// Per-request timeout in seconds.
    #[arg(long, env = "DECKMETA_API_TIMEOUT", default_value_t = 120,
          value_parser = clap::value_parser!(u64).range(1..))]
    api_timeout: u64,

    /// Sampling temperature (0.0–2.0). Model default when unset.
    #[arg(long, env = "DECKMETA_TEMPERATURE")]
    temperature: Option<f32>,

    /// Max tokens per caption or summary.
    #[arg(long, env = "DECKMETA_MAX_TOKENS", default_value_t = 500)]
    max_tokens: usize,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum OutputFormatArg {
    Markdown,
    Html,
}

impl From<OutputFormatArg> for OutputFormat {
    fn from(v: OutputFormatArg) -> Self {
        match v {
            OutputFormatArg::Markdown => OutputFormat::Markdown,
            OutputFormatArg::Html => OutputFormat::Html,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO-level logs unless -v is given.
    let is_inspect = matches!(cli.command, Command::Inspect { .. });
    let show_progress = !cli.quiet && !cli.no_progress && !is_inspect;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let progress: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn PipelineProgressCallback>)
    } else {
        None
    };

    match cli.command {
        Command::Run(ref args) => {
            let config = build_run_config(args, progress)?;
            let summary = run_batch(&config).await.context("Batch setup failed")?;
            if !cli.quiet {
                print_summary(&summary);
            }
        }
        Command::Enrich {
            ref markdown,
            ref model,
        } => {
            let config = apply_model_args(PipelineConfig::builder(), model, progress)
                .build()
                .context("Invalid configuration")?;
            let summary = enrich_markdown_files(markdown, &config)
                .await
                .context("Enrichment setup failed")?;
            if !cli.quiet {
                print_summary(&summary);
            }
        }
        Command::Inspect { ref metadata, json } => {
            inspect(metadata, json).await?;
        }
    }

    Ok(())
}

/// Map `run` args to `PipelineConfig`.
fn build_run_config(args: &RunArgs, progress: Option<ProgressCallback>) -> Result<PipelineConfig> {
    let builder = PipelineConfig::builder()
        .input_dir(&args.input_dir)
        .output_dir(&args.output_dir)
        .force_ocr(!args.no_force_ocr)
        .output_format(args.output_format.into())
        .langs(&args.langs)
        .office_command(&args.office_command)
        .converter_command(&args.converter_command);

    apply_model_args(builder, &args.model, progress)
        .build()
        .context("Invalid configuration")
}

fn apply_model_args(
    mut builder: deckmeta::PipelineConfigBuilder,
    args: &ModelArgs,
    progress: Option<ProgressCallback>,
) -> deckmeta::PipelineConfigBuilder {
    builder = builder
        .ollama_url(&args.ollama_url)
        .model(&args.model)
        .describe_images(!args.no_desc_images)
        .api_timeout_secs(args.api_timeout)
        .max_tokens(args.max_tokens);

    if let Some(t) = args.temperature {
        builder = builder.temperature(t);
    }
    if let Some(ref name) = args.provider {
        builder = builder.provider_name(name);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }
    builder
}

fn print_summary(summary: &BatchSummary) {
    let secs = summary.elapsed_ms as f64 / 1000.0;
    let mark = if summary.failed == 0 {
        green("✔")
    } else if summary.processed == 0 && summary.total() > 0 {
        red("✘")
    } else {
        cyan("⚠")
    };
    eprintln!(
        "{}  Processed: {}  Errors: {}  Total time: {:.2}s",
        mark,
        bold(&summary.processed.to_string()),
        if summary.failed == 0 {
            summary.failed.to_string()
        } else {
            red(&summary.failed.to_string())
        },
        secs
    );
    for failure in &summary.failures {
        eprintln!("   {} {}", red("✗"), dim(&failure.path.display().to_string()));
    }
}

async fn inspect(path: &Path, json: bool) -> Result<()> {
    let doc = read_metadata(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;

    if json {
        println!("{}", to_json(&doc).context("Failed to serialise metadata")?);
        return Ok(());
    }

    let summaries = doc.summary_counts();
    let descriptions = doc.description_counts();
    println!("File:          {}", path.display());
    println!("Source:        {}", doc.source_file());
    println!("Parsed at:     {}", doc.generated_at());
    println!("Slides:        {}", doc.slide_count());
    println!("Images:        {}", doc.image_count());
    println!(
        "Summaries:     {}/{}",
        summaries.generated,
        summaries.generated + summaries.failed + summaries.pending
    );
    println!("Descriptions:  {}/{}", descriptions.generated, doc.image_count());
    for slide in doc.slides() {
        let first_line = slide.text.lines().next().unwrap_or("");
        println!(
            "  [{:>3}] {:<50} {}",
            slide.index,
            first_line.chars().take(50).collect::<String>(),
            dim(slide.summary.as_str())
        );
    }
    Ok(())
}
