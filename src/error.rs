//! Error types for the edgequake-docprep library.
//!
//! Every fatal failure across the three tools is a [`DocprepError`]. The
//! variants are grouped by the stage that raises them so the binaries can map
//! them onto their exit codes without string matching.
//!
//! Problems with a single dataset row or conversation turn are *not* errors:
//! they are reported through [`crate::diagnostics::DiagnosticSink`] and the
//! row or turn is skipped.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-docprep library.
#[derive(Debug, Error)]
pub enum DocprepError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The input path does not exist.
    #[error("Not found: '{path}'\nCheck the path exists and is readable.")]
    NotFound { path: PathBuf },

    /// The input path exists but is not a directory.
    #[error("Expected a directory path: '{path}'")]
    NotADirectory { path: PathBuf },

    /// The input path exists but is not a regular file.
    #[error("Expected a file path, got: '{path}'")]
    NotAFile { path: PathBuf },

    /// The directory holds no file with an accepted extension.
    #[error("No supported files found in '{dir}'. Expected suffixes: {}", .suffixes.join(", "))]
    NoMatchingFiles { dir: PathBuf, suffixes: Vec<String> },

    /// A single image does not have an accepted extension.
    #[error("Unsupported image suffix for '{path}'. Expected one of: {}", .suffixes.join(", "))]
    UnsupportedImage { path: PathBuf, suffixes: Vec<String> },

    // ── Render errors ─────────────────────────────────────────────────────
    /// A rendering backend's library or executable is not installed.
    #[error("Algorithm '{backend}' is unavailable: {hint}")]
    MissingDependency { backend: String, hint: String },

    /// The backend was available but failed while rendering.
    #[error("Conversion with '{backend}' failed: {detail}")]
    ConversionFailed { backend: String, detail: String },

    // ── Inference errors ──────────────────────────────────────────────────
    /// The configured LLM provider could not be created.
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The vision model failed on a page. The run stops here.
    #[error("Inference failed on page {page}: {detail}")]
    InferenceFailed { page: usize, detail: String },

    // ── Dataset errors ────────────────────────────────────────────────────
    /// The dataset could not be located or parsed.
    #[error("Failed to load dataset '{source_name}': {detail}")]
    DatasetLoad { source_name: String, detail: String },

    /// `--split` named a split the dataset does not have.
    #[error("Split '{split}' not found. Available splits: {}", .available.join(", "))]
    SplitNotFound {
        split: String,
        available: Vec<String>,
    },

    /// The first converted record did not have the expected shape.
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    /// The file extension is not one the dataset readers understand.
    #[error("Unsupported dataset file format: '{path}'")]
    UnsupportedFormat { path: PathBuf },

    /// A Hugging Face Hub or datasets-server request failed.
    #[error("Hub request to '{url}' failed: {detail}")]
    HubRequest { url: String, detail: String },

    /// Parquet or Arrow reported an error while reading or writing.
    #[error("Parquet error for '{path}': {detail}")]
    Parquet { path: PathBuf, detail: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write an output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Any other filesystem failure, tagged with the path involved.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DocprepError {
    /// True for errors raised while validating user input, before any work.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            DocprepError::NotFound { .. }
                | DocprepError::NotADirectory { .. }
                | DocprepError::NotAFile { .. }
                | DocprepError::NoMatchingFiles { .. }
                | DocprepError::UnsupportedImage { .. }
                | DocprepError::InvalidConfig(_)
        )
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DocprepError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DocprepError::OutputWriteFailed {
            path: path.into(),
            source,
        }
    }
}
