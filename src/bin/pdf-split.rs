//! CLI binary: split a PDF into one JPEG per page.
//!
//! Exit codes: 0 success, 1 invalid input, 2 missing backend dependency
//! (also clap usage errors), 3 conversion failure, 4 anything else.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_docprep::{split_pdf, DocprepError, RenderBackend, SplitConfig};
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Default: in-process pdfium renderer, quality 90, 200 dpi
  pdf-split report.pdf

  # Poppler backend with four concurrent pdftoppm processes
  pdf-split --algorithm pdf2image --thread-count 4 report.pdf

  # Smaller files, custom location
  pdf-split --quality 70 --output-dir /tmp/pages report.pdf

BACKENDS:
  pymupdf    pdfium via pdfium-render (needs libpdfium)
  pdf2image  Poppler's pdfinfo + pdftoppm (needs poppler-utils on PATH)

ENVIRONMENT VARIABLES:
  PDFIUM_LIB_PATH   Path to an existing libpdfium
  RUST_LOG          Overrides the log filter (e.g. RUST_LOG=debug)
"#;

/// Split a PDF into per-page JPEG images.
#[derive(Parser, Debug)]
#[command(
    name = "pdf-split",
    version,
    about = "Split a PDF into per-page JPEG images",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// PDF file to split.
    pdf_path: PathBuf,

    /// Rendering backend.
    #[arg(long, env = "PDF_SPLIT_ALGORITHM", value_enum, default_value = "pymupdf")]
    algorithm: AlgorithmArg,

    /// JPEG quality (1–100).
    #[arg(long, env = "PDF_SPLIT_QUALITY", default_value_t = 90,
          value_parser = clap::value_parser!(u8).range(1..=100))]
    quality: u8,

    /// Output directory. Default: `<stem>_pages` next to the PDF.
    #[arg(long, env = "PDF_SPLIT_OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    /// Rendering DPI (36–1200).
    #[arg(long, env = "PDF_SPLIT_DPI", default_value_t = 200,
          value_parser = clap::value_parser!(u32).range(36..=1200))]
    dpi: u32,

    /// Concurrent pdftoppm processes (pdf2image only).
    #[arg(long, env = "PDF_SPLIT_THREAD_COUNT", default_value_t = 2)]
    thread_count: usize,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDF_SPLIT_VERBOSE")]
    verbose: bool,
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum AlgorithmArg {
    #[value(name = "pymupdf")]
    Pymupdf,
    #[value(name = "pdf2image")]
    Pdf2image,
}

impl From<AlgorithmArg> for RenderBackend {
    fn from(v: AlgorithmArg) -> Self {
        match v {
            AlgorithmArg::Pymupdf => RenderBackend::Pdfium,
            AlgorithmArg::Pdf2image => RenderBackend::Poppler,
        }
    }
}

/// Exit code for a failed run, from the library error underneath.
fn exit_code(err: &anyhow::Error) -> u8 {
    match err.chain().find_map(|e| e.downcast_ref::<DocprepError>()) {
        Some(e) if e.is_input_error() => 1,
        Some(DocprepError::MissingDependency { .. }) => 2,
        Some(DocprepError::ConversionFailed { .. }) => 3,
        _ => 4,
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = SplitConfig::builder()
        .backend(cli.algorithm.into())
        .quality(cli.quality)
        .dpi(cli.dpi)
        .thread_count(cli.thread_count);
    let config = match cli.output_dir {
        Some(dir) => config.output_dir(dir),
        None => config,
    }
    .build()
    .context("Invalid configuration")?;

    let output = split_pdf(&cli.pdf_path, &config)
        .await
        .with_context(|| format!("Failed to split {}", cli.pdf_path.display()))?;

    eprintln!(
        "{}  {} pages  {}ms  →  {}",
        green("✔"),
        output.pages.len(),
        output.duration_ms,
        bold(&output.output_dir.display().to_string()),
    );
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{} {:#}", red("✘"), err);
            ExitCode::from(exit_code(&err))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wrapped(err: DocprepError) -> anyhow::Error {
        Err::<(), _>(err)
            .context("Failed to split report.pdf")
            .unwrap_err()
    }

    #[test]
    fn exit_codes_follow_the_library_error() {
        let not_found = wrapped(DocprepError::NotFound {
            path: PathBuf::from("report.pdf"),
        });
        assert_eq!(exit_code(&not_found), 1);

        let missing = wrapped(DocprepError::MissingDependency {
            backend: "pdf2image".into(),
            hint: "install poppler-utils".into(),
        });
        assert_eq!(exit_code(&missing), 2);

        let failed = wrapped(DocprepError::ConversionFailed {
            backend: "pdf2image".into(),
            detail: "pdftoppm exited with 1".into(),
        });
        assert_eq!(exit_code(&failed), 3);

        assert_eq!(exit_code(&wrapped(DocprepError::Internal("x".into()))), 4);
        assert_eq!(exit_code(&anyhow::anyhow!("plain")), 4);
    }

    #[test]
    fn invalid_config_is_an_input_error() {
        let err = wrapped(DocprepError::InvalidConfig("quality".into()));
        assert_eq!(exit_code(&err), 1);
    }

    #[test]
    fn algorithm_names_map_to_backends() {
        let cli = Cli::parse_from(["pdf-split", "a.pdf", "--algorithm", "pdf2image"]);
        assert_eq!(RenderBackend::from(cli.algorithm), RenderBackend::Poppler);
        let cli = Cli::parse_from(["pdf-split", "a.pdf"]);
        assert_eq!(RenderBackend::from(cli.algorithm), RenderBackend::Pdfium);
        assert!(Cli::try_parse_from(["pdf-split", "a.pdf", "--quality", "0"]).is_err());
    }
}
