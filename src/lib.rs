//! # edgequake-docprep
//!
//! Document-preparation tools for building text datasets from PDFs:
//!
//! | Binary            | Library entry point                        | Does                                     |
//! |-------------------|--------------------------------------------|------------------------------------------|
//! | `pdf-split`       | [`split_pdf`]                              | PDF → one JPEG per page                  |
//! | `pages2md`        | [`transcribe_dir`] / [`transcribe_pages`]  | page images → one markdown file via a VLM |
//! | (library only)    | [`transcribe_image`]                       | one image → trimmed text                 |
//! | `convert-dataset` | [`convert_dataset`]                        | `conversations` → `messages` chat data   |
//!
//! ## Pipeline Overview
//!
//! ```text
//! report.pdf
//!  │
//!  ├─ pdf-split   render pages (pdfium in-process, or Poppler pdftoppm)
//!  │              → report_pages/report_page_0001.jpg …
//!  │
//!  └─ pages2md    collect pages in numeric order, one VLM call per page,
//!                 append + flush each block → report_pages_combined.md
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_docprep::{split_pdf, transcribe_dir, LlmVisionModel, SplitConfig, TranscribeConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let split = split_pdf("report.pdf", &SplitConfig::default()).await?;
//!
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / …
//!     let config = TranscribeConfig::builder().build()?;
//!     let model = LlmVisionModel::load(&config)?;
//!     let stats = transcribe_dir(&split.output_dir, &config, &model).await?;
//!     eprintln!("{} pages, avg {:.1}s/page", stats.pages, stats.average_seconds());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the three binaries (clap + indicatif + anyhow + tracing-subscriber) |
//!
//! ## Diagnostics
//!
//! Skipped rows, dropped turns and unnumbered page files are not errors. They
//! are reported to the [`DiagnosticSink`] on the config (a [`TracingSink`] by
//! default), so tests can capture them with a [`CollectingSink`].

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod dataset;
pub mod diagnostics;
pub mod error;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod split;
pub mod transcribe;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    DatasetConfig, DatasetConfigBuilder, OutputFormat, RenderBackend, SplitConfig,
    SplitConfigBuilder, TranscribeConfig, TranscribeConfigBuilder,
};
pub use dataset::{convert_dataset, ConversionRecord, ConversionSummary, DatasetNames, Message, Role};
pub use diagnostics::{
    CollectingSink, Diagnostic, DiagnosticSink, SharedSink, SkipReason, TracingSink,
};
pub use error::DocprepError;
pub use pipeline::collect::{collect_pages, validate_image_path, PageFile};
pub use pipeline::llm::{LlmVisionModel, VisionModel};
pub use progress::{NoopProgressCallback, PageProgressCallback, ProgressCallback};
pub use split::{split_pdf, SplitOutput};
pub use transcribe::{
    resolve_output_path, transcribe_dir, transcribe_image, transcribe_pages, PageInferenceResult,
    SingleImageResult, TranscriptionStats,
};
