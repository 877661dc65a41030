//! Injectable sink for non-fatal warnings.
//!
//! Components never touch the global `tracing` subscriber to report skipped
//! rows, dropped turns or unnumbered page files. They receive an
//! [`Arc<dyn DiagnosticSink>`] instead. The binaries pass a [`TracingSink`];
//! tests pass a [`CollectingSink`] and assert on what was reported without
//! any process-wide side effects.

use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::warn;

/// Why a dataset row produced no record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The row has no `conversations` field.
    MissingConversations,
    /// `conversations` is present but is not an array.
    NotAList,
    /// Every turn was dropped.
    NoValidMessages,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::MissingConversations => f.write_str("no 'conversations' field found"),
            SkipReason::NotAList => f.write_str("'conversations' is not a list"),
            SkipReason::NoValidMessages => f.write_str("no valid messages after conversion"),
        }
    }
}

/// A single non-fatal event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// Page files without a trailing number; they sort after numbered pages.
    UnnumberedPages { files: Vec<String> },
    /// A conversation turn was not an object with string `from` and `value`.
    InvalidTurn { sample: usize },
    /// A conversation turn used a `from` label outside the role table.
    UnknownRole { sample: usize, role: String },
    /// A whole dataset row was dropped.
    RecordSkipped { sample: usize, reason: SkipReason },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::UnnumberedPages { files } => write!(
                f,
                "The following files are missing a trailing page number and will appear last in lexicographic order: {}",
                files.join(", ")
            ),
            Diagnostic::InvalidTurn { sample } => {
                write!(f, "Sample {sample}: Invalid conversation turn format")
            }
            Diagnostic::UnknownRole { sample, role } => {
                write!(f, "Sample {sample}: Unknown role '{role}', skipping turn")
            }
            Diagnostic::RecordSkipped { sample, reason } => write!(f, "Sample {sample}: {reason}"),
        }
    }
}

/// Receives warnings from the collector and the field remapper.
///
/// Implementations must be `Send + Sync`: the Poppler backend collects its
/// intermediate files from inside `spawn_blocking`.
pub trait DiagnosticSink: Send + Sync {
    fn warning(&self, diagnostic: Diagnostic);
}

/// Forwards every diagnostic to `tracing::warn!`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn warning(&self, diagnostic: Diagnostic) {
        warn!("{}", diagnostic);
    }
}

/// Keeps every diagnostic in memory.
#[derive(Debug, Default)]
pub struct CollectingSink {
    events: Mutex<Vec<Diagnostic>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything reported so far.
    pub fn events(&self) -> Vec<Diagnostic> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

impl DiagnosticSink for CollectingSink {
    fn warning(&self, diagnostic: Diagnostic) {
        if let Ok(mut events) = self.events.lock() {
            events.push(diagnostic);
        }
    }
}

/// Convenience alias matching the type stored in the config structs.
pub type SharedSink = Arc<dyn DiagnosticSink>;

/// The sink used when none is configured.
pub fn default_sink() -> SharedSink {
    Arc::new(TracingSink)
}
