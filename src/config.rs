//! Configuration types for the three tools.
//!
//! Each tool is driven by one struct built through a builder:
//!
//! * [`SplitConfig`]: PDF → JPEG pages
//! * [`TranscribeConfig`]: page images → markdown via a vision model
//! * [`DatasetConfig`]: `conversations` → `messages` dataset conversion
//!
//! Out-of-range values are rejected by `build()` with
//! [`DocprepError::InvalidConfig`] before any file is touched.

use crate::diagnostics::{default_sink, SharedSink};
use crate::error::DocprepError;
use crate::progress::ProgressCallback;
use crate::prompts::{validate_template, DEFAULT_HEADING_TEMPLATE, DEFAULT_PAGE_PROMPT};
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// JPEG quality used when none is given.
pub const DEFAULT_JPEG_QUALITY: u8 = 90;

/// Rendering DPI shared by both backends.
pub const DEFAULT_DPI: u32 = 200;

/// Number of `pdftoppm` processes the Poppler backend runs at once.
pub const DEFAULT_THREAD_COUNT: usize = 2;

/// Image extensions accepted by the transcription driver.
pub const SUPPORTED_IMAGE_SUFFIXES: &[&str] = &[".jpg", ".jpeg", ".png", ".webp"];

/// Default output token budget per page.
pub const DEFAULT_MAX_TOKENS: usize = 3200;

/// Model used with a named provider when no model is given.
pub const DEFAULT_MODEL: &str = "qwen3-vl:32b";

/// Rows converted per batch in non-streaming mode.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

// ── Enums ────────────────────────────────────────────────────────────────

/// PDF rasterisation backend.
///
/// The CLI keeps the historical algorithm names: `pymupdf` selects the
/// in-process pdfium renderer, `pdf2image` selects Poppler's `pdftoppm`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RenderBackend {
    /// In-process rendering through pdfium. (default)
    #[default]
    Pdfium,
    /// `pdfinfo` + `pdftoppm` child processes.
    Poppler,
}

impl RenderBackend {
    /// The name used on the command line and in error messages.
    pub fn algorithm_name(&self) -> &'static str {
        match self {
            RenderBackend::Pdfium => "pymupdf",
            RenderBackend::Poppler => "pdf2image",
        }
    }
}

impl fmt::Display for RenderBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.algorithm_name())
    }
}

/// Output format for converted datasets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OutputFormat {
    /// One JSON array per split.
    Json,
    /// JSON Lines. (default)
    #[default]
    Jsonl,
    /// Apache Parquet.
    Parquet,
    /// Commit JSON Lines files to a Hugging Face Hub dataset repo.
    HfHub,
}

impl OutputFormat {
    /// File extension for local formats; `None` for the hub.
    pub fn extension(&self) -> Option<&'static str> {
        match self {
            OutputFormat::Json => Some("json"),
            OutputFormat::Jsonl => Some("jsonl"),
            OutputFormat::Parquet => Some("parquet"),
            OutputFormat::HfHub => None,
        }
    }
}

// ── SplitConfig ──────────────────────────────────────────────────────────

/// Configuration for splitting a PDF into page images.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitConfig {
    /// Which renderer to use. Default: [`RenderBackend::Pdfium`].
    pub backend: RenderBackend,

    /// JPEG quality, 1 (worst) to 100 (best). Default: 90.
    pub quality: u8,

    /// Rendering resolution. Default: 200 for both backends.
    pub dpi: u32,

    /// Concurrent `pdftoppm` processes (Poppler only). Default: 2.
    pub thread_count: usize,

    /// Where pages go. Default: `<pdf stem>_pages` next to the PDF.
    pub output_dir: Option<PathBuf>,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            backend: RenderBackend::default(),
            quality: DEFAULT_JPEG_QUALITY,
            dpi: DEFAULT_DPI,
            thread_count: DEFAULT_THREAD_COUNT,
            output_dir: None,
        }
    }
}

impl SplitConfig {
    pub fn builder() -> SplitConfigBuilder {
        SplitConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`SplitConfig`].
#[derive(Debug)]
pub struct SplitConfigBuilder {
    config: SplitConfig,
}

impl SplitConfigBuilder {
    pub fn backend(mut self, backend: RenderBackend) -> Self {
        self.config.backend = backend;
        self
    }

    pub fn quality(mut self, quality: u8) -> Self {
        self.config.quality = quality;
        self
    }

    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi;
        self
    }

    pub fn thread_count(mut self, n: usize) -> Self {
        self.config.thread_count = n;
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = Some(dir.into());
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<SplitConfig, DocprepError> {
        let c = &self.config;
        if !(1..=100).contains(&c.quality) {
            return Err(DocprepError::InvalidConfig(format!(
                "quality must be between 1 and 100, got {}",
                c.quality
            )));
        }
        if !(36..=1200).contains(&c.dpi) {
            return Err(DocprepError::InvalidConfig(format!(
                "DPI must be 36–1200, got {}",
                c.dpi
            )));
        }
        if c.thread_count == 0 {
            return Err(DocprepError::InvalidConfig(
                "thread count must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── TranscribeConfig ─────────────────────────────────────────────────────

/// Configuration for transcribing page images into one markdown file.
#[derive(Clone)]
pub struct TranscribeConfig {
    /// Prompt template sent with each page. See [`crate::prompts`].
    pub prompt_template: String,

    /// Heading template written above each page.
    pub heading_template: String,

    /// Maximum tokens the model may generate per page. Default: 3200.
    pub max_tokens: usize,

    /// Sampling temperature. Default: 0.0 (greedy, faithful transcription).
    pub temperature: f32,

    /// Explicit output path. See [`crate::transcribe::resolve_output_path`].
    pub output: Option<PathBuf>,

    /// Model identifier passed to the provider factory.
    pub model: Option<String>,

    /// Provider name (e.g. "ollama", "openai").
    pub provider_name: Option<String>,

    /// Pre-constructed provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Accepted image extensions.
    pub image_suffixes: Vec<String>,

    /// Receives per-page progress events.
    pub progress_callback: Option<ProgressCallback>,

    /// Receives collector warnings.
    pub diagnostics: SharedSink,
}

impl Default for TranscribeConfig {
    fn default() -> Self {
        Self {
            prompt_template: DEFAULT_PAGE_PROMPT.to_string(),
            heading_template: DEFAULT_HEADING_TEMPLATE.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: 0.0,
            output: None,
            model: None,
            provider_name: None,
            provider: None,
            image_suffixes: SUPPORTED_IMAGE_SUFFIXES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            progress_callback: None,
            diagnostics: default_sink(),
        }
    }
}

impl fmt::Debug for TranscribeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TranscribeConfig")
            .field("prompt_template", &self.prompt_template)
            .field("heading_template", &self.heading_template)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("output", &self.output)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("image_suffixes", &self.image_suffixes)
            .finish()
    }
}

impl TranscribeConfig {
    pub fn builder() -> TranscribeConfigBuilder {
        TranscribeConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`TranscribeConfig`].
#[derive(Debug)]
pub struct TranscribeConfigBuilder {
    config: TranscribeConfig,
}

impl TranscribeConfigBuilder {
    pub fn prompt_template(mut self, template: impl Into<String>) -> Self {
        self.config.prompt_template = template.into();
        self
    }

    pub fn heading_template(mut self, template: impl Into<String>) -> Self {
        self.config.heading_template = template.into();
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn output(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.output = Some(path.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
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

    pub fn image_suffixes<S: Into<String>>(mut self, suffixes: impl IntoIterator<Item = S>) -> Self {
        self.config.image_suffixes = suffixes.into_iter().map(Into::into).collect();
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    pub fn diagnostics(mut self, sink: SharedSink) -> Self {
        self.config.diagnostics = sink;
        self
    }

    /// Build the configuration, validating the token budget and templates.
    pub fn build(self) -> Result<TranscribeConfig, DocprepError> {
        let c = &self.config;
        if c.max_tokens == 0 {
            return Err(DocprepError::InvalidConfig(
                "--max-tokens must be positive".into(),
            ));
        }
        if c.image_suffixes.is_empty() {
            return Err(DocprepError::InvalidConfig(
                "at least one image suffix is required".into(),
            ));
        }
        validate_template(&c.prompt_template)?;
        validate_template(&c.heading_template)?;
        Ok(self.config)
    }
}

// ── DatasetConfig ────────────────────────────────────────────────────────

/// Configuration for converting a chat dataset.
#[derive(Clone)]
pub struct DatasetConfig {
    /// Keep only this split; the result is then a single dataset.
    pub split: Option<String>,

    /// Output format. Default: JSON Lines.
    pub format: OutputFormat,

    /// Cap on samples (input rows when materialised, retained records when
    /// streaming).
    pub max_samples: Option<usize>,

    /// Read and convert rows lazily.
    pub streaming: bool,

    /// Check the first converted record before saving.
    pub validate: bool,

    /// Rows per conversion batch in non-streaming mode. Default: 1000.
    pub batch_size: usize,

    /// Receives per-row and per-turn warnings.
    pub diagnostics: SharedSink,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            split: None,
            format: OutputFormat::default(),
            max_samples: None,
            streaming: false,
            validate: false,
            batch_size: DEFAULT_BATCH_SIZE,
            diagnostics: default_sink(),
        }
    }
}

impl fmt::Debug for DatasetConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatasetConfig")
            .field("split", &self.split)
            .field("format", &self.format)
            .field("max_samples", &self.max_samples)
            .field("streaming", &self.streaming)
            .field("validate", &self.validate)
            .field("batch_size", &self.batch_size)
            .finish()
    }
}

impl DatasetConfig {
    pub fn builder() -> DatasetConfigBuilder {
        DatasetConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`DatasetConfig`].
#[derive(Debug)]
pub struct DatasetConfigBuilder {
    config: DatasetConfig,
}

impl DatasetConfigBuilder {
    pub fn split(mut self, split: impl Into<String>) -> Self {
        self.config.split = Some(split.into());
        self
    }

    pub fn format(mut self, format: OutputFormat) -> Self {
        self.config.format = format;
        self
    }

    pub fn max_samples(mut self, n: usize) -> Self {
        self.config.max_samples = Some(n);
        self
    }

    pub fn streaming(mut self, v: bool) -> Self {
        self.config.streaming = v;
        self
    }

    pub fn validate(mut self, v: bool) -> Self {
        self.config.validate = v;
        self
    }

    pub fn batch_size(mut self, n: usize) -> Self {
        self.config.batch_size = n.max(1);
        self
    }

    pub fn diagnostics(mut self, sink: SharedSink) -> Self {
        self.config.diagnostics = sink;
        self
    }

    pub fn build(self) -> Result<DatasetConfig, DocprepError> {
        if self.config.split.as_deref().is_some_and(|s| s.trim().is_empty()) {
            return Err(DocprepError::InvalidConfig("split name is empty".into()));
        }
        if self.config.max_samples == Some(0) {
            return Err(DocprepError::InvalidConfig(
                "--max-samples must be positive; omit it to convert every row".into(),
            ));
        }
        Ok(self.config)
    }
}
