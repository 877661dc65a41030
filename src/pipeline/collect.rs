//! Page file collection: list a directory and order its pages numerically.
//!
//! Page images produced by `pdf-split` (or any other tool) are named like
//! `doc_page_0001.jpg`, but zero padding is not guaranteed, so a plain string
//! sort would put `page_10` before `page_9`. The collector extracts the
//! trailing digit run of each file stem and sorts on that number. Files
//! without one are kept, but always after every numbered page.

use crate::diagnostics::{Diagnostic, DiagnosticSink};
use crate::error::DocprepError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::debug;

static RE_TRAILING_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"([0-9]+)$").unwrap());

/// A candidate page file and the number parsed from its stem, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageFile {
    pub page_number: Option<u64>,
    pub path: PathBuf,
}

impl PageFile {
    pub fn new(path: PathBuf) -> Self {
        let page_number = path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(page_number_of_stem);
        Self { page_number, path }
    }

    /// File name as a lossy string, used for lexicographic ordering and logs.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Parse the maximal run of ASCII digits at the end of `stem`.
///
/// Runs that overflow `u64` are treated as absent.
pub fn page_number_of_stem(stem: &str) -> Option<u64> {
    RE_TRAILING_NUMBER
        .captures(stem)
        .and_then(|caps| caps[1].parse::<u64>().ok())
}

/// Normalise suffixes to lower-case without the leading dot.
fn normalise_suffixes<S: AsRef<str>>(suffixes: &[S]) -> BTreeSet<String> {
    suffixes
        .iter()
        .map(|s| s.as_ref().trim_start_matches('.').to_ascii_lowercase())
        .collect()
}

/// Resolve a single image path and check its extension against `suffixes`.
///
/// # Errors
/// - [`DocprepError::NotFound`] if `path` does not exist
/// - [`DocprepError::NotAFile`] if it is not a regular file
/// - [`DocprepError::UnsupportedImage`] if its extension is not accepted
pub fn validate_image_path<S: AsRef<str>>(
    path: &Path,
    suffixes: &[S],
) -> Result<PathBuf, DocprepError> {
    if !path.exists() {
        return Err(DocprepError::NotFound {
            path: path.to_path_buf(),
        });
    }
    if !path.is_file() {
        return Err(DocprepError::NotAFile {
            path: path.to_path_buf(),
        });
    }
    let resolved = path.canonicalize().map_err(|e| DocprepError::io(path, e))?;

    let accepted = normalise_suffixes(suffixes);
    let ext = resolved
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    if !accepted.contains(&ext) {
        return Err(DocprepError::UnsupportedImage {
            path: resolved,
            suffixes: accepted.iter().map(|s| format!(".{s}")).collect(),
        });
    }
    Ok(resolved)
}

/// Collect the files in `dir` whose extension is in `suffixes`, ordered by
/// trailing page number.
///
/// Numbered files come first in ascending numeric order (stable for equal
/// numbers); unnumbered files follow in lexicographic file-name order and are
/// reported to `sink` as one [`Diagnostic::UnnumberedPages`].
///
/// # Errors
/// - [`DocprepError::NotFound`] if `dir` does not exist
/// - [`DocprepError::NotADirectory`] if it is not a directory
/// - [`DocprepError::NoMatchingFiles`] if nothing matches `suffixes`
pub fn collect_pages<S: AsRef<str>>(
    dir: &Path,
    suffixes: &[S],
    sink: &dyn DiagnosticSink,
) -> Result<Vec<PageFile>, DocprepError> {
    if !dir.exists() {
        return Err(DocprepError::NotFound {
            path: dir.to_path_buf(),
        });
    }
    if !dir.is_dir() {
        return Err(DocprepError::NotADirectory {
            path: dir.to_path_buf(),
        });
    }

    let accepted = normalise_suffixes(suffixes);

    let entries = std::fs::read_dir(dir).map_err(|e| DocprepError::io(dir, e))?;
    let mut candidates = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| DocprepError::io(dir, e))?.path();
        if !path.is_file() {
            continue;
        }
        let matches = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| accepted.contains(&e.to_ascii_lowercase()))
            .unwrap_or(false);
        if matches {
            candidates.push(PageFile::new(path));
        }
    }

    if candidates.is_empty() {
        return Err(DocprepError::NoMatchingFiles {
            dir: dir.to_path_buf(),
            suffixes: accepted.iter().map(|s| format!(".{s}")).collect(),
        });
    }

    // read_dir order is filesystem-dependent; fix it so ties are reproducible.
    candidates.sort_by(|a, b| a.path.cmp(&b.path));

    let (mut numbered, mut unnumbered): (Vec<PageFile>, Vec<PageFile>) =
        candidates.into_iter().partition(|p| p.page_number.is_some());

    numbered.sort_by(|a, b| a.page_number.cmp(&b.page_number));
    unnumbered.sort_by(|a, b| compare_names(a, b));

    if !unnumbered.is_empty() {
        sink.warning(Diagnostic::UnnumberedPages {
            files: unnumbered.iter().map(PageFile::file_name).collect(),
        });
    }

    debug!(
        "Collected {} numbered and {} unnumbered files from {}",
        numbered.len(),
        unnumbered.len(),
        dir.display()
    );

    numbered.extend(unnumbered);
    Ok(numbered)
}

fn compare_names(a: &PageFile, b: &PageFile) -> Ordering {
    a.file_name().cmp(&b.file_name())
}
