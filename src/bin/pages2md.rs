//! CLI binary: transcribe a directory of page images into one markdown file.
//!
//! A thin shim over the library: flags map to `TranscribeConfig`, pages are
//! collected before the model is loaded so a bad directory fails fast.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_docprep::prompts::{DEFAULT_HEADING_TEMPLATE, DEFAULT_PAGE_PROMPT};
use edgequake_docprep::{
    collect_pages, resolve_output_path, transcribe_pages, LlmVisionModel, PageProgressCallback,
    ProgressCallback, TranscribeConfig,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
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

/// Live progress bar plus one log line per finished page.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);
        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Loading model…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }

    /// Stop the spinner and erase the bar.
    fn clear(&self) {
        self.bar.finish_and_clear();
    }
}

impl PageProgressCallback for CliProgressCallback {
    fn on_run_start(&self, total_pages: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total_pages as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Transcribing");
        self.bar.reset_eta();
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Transcribing {total_pages} pages…"))
        ));
    }

    fn on_page_start(&self, _page_num: usize, _total: usize, image_name: &str) {
        self.bar.set_message(image_name.to_string());
    }

    fn on_page_complete(&self, page_num: usize, total: usize, elapsed_secs: f64, markdown_len: usize) {
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {:<8}  {}",
            green("✓"),
            page_num,
            total,
            dim(&format!("{markdown_len:>5} chars")),
            dim(&format!("{elapsed_secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_run_complete(&self, _total_pages: usize, _total_secs: f64) {
        self.clear();
    }
}

const AFTER_HELP: &str = r###"EXAMPLES:
  # Transcribe pages written by pdf-split (→ report_pages_combined.md)
  pages2md report_pages/

  # Local Ollama vision model, explicit output file
  pages2md --provider ollama --model qwen3-vl:32b report_pages/ --output report.md

  # Custom prompt and zero-padded headings
  pages2md --prompt "Transcribe page {page_number} verbatim." \
           --heading-template "## Page {page_number:03d} ({image_name})" report_pages/

TEMPLATES:
  {page_number}        1-based page position (also {page_number:04d})
  {image_name}         file name of the page image
  {{ and }}            literal braces

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Provider used when --provider is not given
  EDGEQUAKE_MODEL         Model used with EDGEQUAKE_LLM_PROVIDER
"###;

/// Transcribe page images into a single markdown document with a vision model.
#[derive(Parser, Debug)]
#[command(
    name = "pages2md",
    version,
    about = "Transcribe page images into one markdown file with a vision LLM",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Directory of page images (e.g. *_page_0001.jpg).
    image_dir: PathBuf,

    /// Markdown output. Default: `<dir>_combined.md` next to the directory.
    #[arg(short, long, env = "PAGES2MD_OUTPUT")]
    output: Option<PathBuf>,

    /// Prompt template sent with each page.
    #[arg(long, env = "PAGES2MD_PROMPT", default_value = DEFAULT_PAGE_PROMPT)]
    prompt: String,

    /// Heading template written above each page.
    #[arg(long, env = "PAGES2MD_HEADING_TEMPLATE", default_value = DEFAULT_HEADING_TEMPLATE)]
    heading_template: String,

    /// Maximum tokens to generate per page.
    #[arg(long, env = "PAGES2MD_MAX_TOKENS", default_value_t = 3200)]
    max_tokens: usize,

    /// Vision model ID.
    #[arg(long, env = "PAGES2MD_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, …
    #[arg(long, env = "PAGES2MD_PROVIDER")]
    provider: Option<String>,

    /// Sampling temperature (0.0–2.0).
    #[arg(long, env = "PAGES2MD_TEMPERATURE", default_value_t = 0.0)]
    temperature: f32,

    /// Disable progress bar.
    #[arg(long, env = "PAGES2MD_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PAGES2MD_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PAGES2MD_QUIET")]
    quiet: bool,
}

/// Log filter when `RUST_LOG` is unset. Warnings stay visible under the
/// progress bar; only `--quiet` hides them.
fn log_filter(verbose: bool, quiet: bool, show_progress: bool) -> &'static str {
    if verbose {
        "debug"
    } else if quiet {
        "error"
    } else if show_progress {
        "warn"
    } else {
        "info"
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces the per-page INFO lines.
    let show_progress = !cli.quiet && !cli.no_progress;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(log_filter(cli.verbose, cli.quiet, show_progress))),
        )
        .with_writer(io::stderr)
        .init();

    let progress = show_progress.then(CliProgressCallback::new);
    let result = run(&cli, progress.clone()).await;
    if result.is_err() {
        if let Some(ref cb) = progress {
            cb.clear();
        }
    }
    result
}

async fn run(cli: &Cli, progress: Option<Arc<CliProgressCallback>>) -> Result<()> {
    let config = build_config(cli, progress.map(|cb| cb as ProgressCallback))?;

    // ── Collect pages, then load the model ───────────────────────────────
    let image_dir = cli
        .image_dir
        .canonicalize()
        .unwrap_or_else(|_| cli.image_dir.clone());
    let pages = collect_pages(
        &image_dir,
        config.image_suffixes.as_slice(),
        config.diagnostics.as_ref(),
    )
    .context("Failed to collect page images")?;
    let output_path = resolve_output_path(&image_dir, config.output.as_deref());

    let model = LlmVisionModel::load(&config).context("Failed to load vision model")?;

    let stats = transcribe_pages(&pages, &output_path, &config, &model)
        .await
        .context("Transcription failed")?;

    if !cli.quiet {
        eprintln!(
            "{}  {} pages  {:.1}s total  {:.1}s/page  →  {}",
            green("✔"),
            stats.pages,
            stats.total_seconds,
            stats.average_seconds(),
            bold(&stats.output_path.display().to_string()),
        );
    }
    Ok(())
}

/// Map CLI args to `TranscribeConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<TranscribeConfig> {
    let mut builder = TranscribeConfig::builder()
        .prompt_template(&cli.prompt)
        .heading_template(&cli.heading_template)
        .max_tokens(cli.max_tokens)
        .temperature(cli.temperature);

    if let Some(ref output) = cli.output {
        builder = builder.output(output);
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn help_text_keeps_quoted_heading_example() {
        assert!(AFTER_HELP.contains(r###""## Page {page_number:03d} ({image_name})""###));
        assert!(AFTER_HELP.trim_end().ends_with("EDGEQUAKE_LLM_PROVIDER"));
    }

    #[test]
    fn warnings_survive_the_progress_bar() {
        assert_eq!(log_filter(false, false, true), "warn");
        assert_eq!(log_filter(false, false, false), "info");
        assert_eq!(log_filter(false, true, false), "error");
        assert_eq!(log_filter(true, true, true), "debug");
    }

    #[test]
    fn clearing_finishes_the_spinner() {
        let cb = CliProgressCallback::new();
        assert!(!cb.bar.is_finished());
        cb.clear();
        assert!(cb.bar.is_finished());
    }

    #[test]
    fn cli_flags_map_to_config() {
        let cli = Cli::parse_from([
            "pages2md",
            "pages",
            "--max-tokens",
            "512",
            "--heading-template",
            "# {page_number:d}",
        ]);
        let config = build_config(&cli, None).unwrap();
        assert_eq!(config.max_tokens, 512);
        assert_eq!(config.heading_template, "# {page_number:d}");
        assert!(config.progress_callback.is_none());

        let cli = Cli::parse_from(["pages2md", "pages", "--max-tokens", "0"]);
        assert!(build_config(&cli, None).is_err());
    }
}
