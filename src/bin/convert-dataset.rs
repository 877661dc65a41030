//! CLI binary: convert a chat dataset from `conversations` to `messages`.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_docprep::{convert_dataset, DatasetConfig, OutputFormat};
use std::io;
use tracing_subscriber::EnvFilter;

const AFTER_HELP: &str = r#"EXAMPLES:
  # Local JSON Lines file → chats_train.jsonl
  convert-dataset ./chats.jsonl --output-path out/chats.jsonl

  # One split of a hub dataset, first 500 rows, as parquet
  convert-dataset org/chat-corpus --split train --max-samples 500 \
                  --format parquet --output-path out/chat-corpus

  # Stream, validate the first record, and push to the Hub
  convert-dataset ./data/ --streaming --validate --format hf_hub \
                  --output-path my-org/chat-corpus-messages

ENVIRONMENT VARIABLES:
  HF_TOKEN                Hub token (required for --format hf_hub)
  HUGGING_FACE_HUB_TOKEN  Alternative token variable
  HF_ENDPOINT             Hub endpoint (default https://huggingface.co)
"#;

/// Convert chat datasets from the conversations format to the messages format.
#[derive(Parser, Debug)]
#[command(
    name = "convert-dataset",
    version,
    about = "Convert chat datasets from conversations to messages format",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local file or directory, or a hub identifier (org/repo).
    dataset_path: String,

    /// Output path (local file stem, or hub repo for hf_hub).
    #[arg(long, env = "CONVERT_DATASET_OUTPUT_PATH")]
    output_path: String,

    /// Convert only this split.
    #[arg(long, env = "CONVERT_DATASET_SPLIT")]
    split: Option<String>,

    /// Output format.
    #[arg(long, env = "CONVERT_DATASET_FORMAT", value_enum, default_value = "jsonl")]
    format: FormatArg,

    /// Maximum number of samples to process.
    #[arg(long, env = "CONVERT_DATASET_MAX_SAMPLES")]
    max_samples: Option<usize>,

    /// Read and convert rows lazily.
    #[arg(long, env = "CONVERT_DATASET_STREAMING")]
    streaming: bool,

    /// Validate the first converted record before saving.
    #[arg(long, env = "CONVERT_DATASET_VALIDATE")]
    validate: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "CONVERT_DATASET_VERBOSE")]
    verbose: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum FormatArg {
    Json,
    Jsonl,
    Parquet,
    #[value(name = "hf_hub")]
    HfHub,
}

impl From<FormatArg> for OutputFormat {
    fn from(v: FormatArg) -> Self {
        match v {
            FormatArg::Json => OutputFormat::Json,
            FormatArg::Jsonl => OutputFormat::Jsonl,
            FormatArg::Parquet => OutputFormat::Parquet,
            FormatArg::HfHub => OutputFormat::HfHub,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let mut builder = DatasetConfig::builder()
        .format(cli.format.into())
        .streaming(cli.streaming)
        .validate(cli.validate);
    if let Some(ref split) = cli.split {
        builder = builder.split(split);
    }
    if let Some(n) = cli.max_samples {
        builder = builder.max_samples(n);
    }
    let config = builder.build().context("Invalid configuration")?;

    let summaries = convert_dataset(&cli.dataset_path, &cli.output_path, &config)
        .await
        .context("Conversion failed")?;

    for s in &summaries {
        eprintln!(
            "✔  {:<12} {}/{} samples  →  {}",
            s.split, s.retained, s.processed, s.output
        );
    }
    Ok(())
}
