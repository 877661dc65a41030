//! Dataset discovery and row readers.
//!
//! A dataset is a list of named splits, each backed by one or more files.
//! Rows are read lazily as `serde_json::Value`s, whatever the file format,
//! so the remapper sees the same shape for JSON, JSON Lines and Parquet.

use super::hub::HubClient;
use crate::error::DocprepError;
use parquet::file::reader::SerializedFileReader;
use parquet::record::reader::RowIter;
use serde_json::Value;
use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info};

/// Split used for single files and for directory files with no keyword.
pub const DEFAULT_SPLIT: &str = "train";

const SUPPORTED_EXTENSIONS: &[&str] = &["json", "jsonl", "parquet"];

/// Stem keywords that map a file to a split, checked in order.
const SPLIT_KEYWORDS: &[(&str, &[&str])] = &[
    ("train", &["train"]),
    ("validation", &["validation", "valid", "val", "dev"]),
    ("test", &["test"]),
];

/// One named split and the files that hold its rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitSource {
    pub name: String,
    pub files: Vec<PathBuf>,
}

impl SplitSource {
    /// Lazily read every row of every file, in file order.
    pub fn rows(&self) -> SplitRows {
        SplitRows {
            files: self.files.iter().cloned().collect(),
            current: None,
        }
    }
}

/// A loaded dataset: its splits, and whether it was narrowed to one split.
#[derive(Debug)]
pub struct LoadedDataset {
    pub splits: Vec<SplitSource>,
    /// True when `--split` was given; the result is a single dataset.
    pub single: bool,
    // Holds downloaded hub shards until conversion is done.
    _scratch: Option<TempDir>,
}

impl LoadedDataset {
    pub fn split_names(&self) -> Vec<String> {
        self.splits.iter().map(|s| s.name.clone()).collect()
    }
}

/// Locate `dataset_path` and group its files into splits.
///
/// An existing local path wins; otherwise an `org/repo` identifier is fetched
/// from the Hub's parquet export. With `split`, only that split is kept.
pub async fn load_dataset(
    dataset_path: &str,
    split: Option<&str>,
) -> Result<LoadedDataset, DocprepError> {
    info!("Loading dataset from: {}", dataset_path);
    let local = Path::new(dataset_path);

    let (splits, scratch) = if local.exists() {
        (local_splits(local)?, None)
    } else if looks_like_hub_id(dataset_path) {
        let (splits, scratch) = hub_splits(dataset_path, split).await?;
        (splits, Some(scratch))
    } else {
        return Err(DocprepError::NotFound {
            path: local.to_path_buf(),
        });
    };

    let splits = select_split(splits, split)?;
    info!(
        "Found splits: {:?}",
        splits.iter().map(|s| s.name.as_str()).collect::<Vec<_>>()
    );

    Ok(LoadedDataset {
        splits,
        single: split.is_some(),
        _scratch: scratch,
    })
}

fn looks_like_hub_id(path: &str) -> bool {
    path.contains('/') && !path.starts_with("./") && !path.starts_with('/')
}

fn select_split(
    splits: Vec<SplitSource>,
    wanted: Option<&str>,
) -> Result<Vec<SplitSource>, DocprepError> {
    let Some(wanted) = wanted else {
        return Ok(splits);
    };
    let available: Vec<String> = splits.iter().map(|s| s.name.clone()).collect();
    match splits.into_iter().find(|s| s.name == wanted) {
        Some(s) => Ok(vec![s]),
        None => Err(DocprepError::SplitNotFound {
            split: wanted.to_string(),
            available,
        }),
    }
}

// ── Local ────────────────────────────────────────────────────────────────

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

fn is_supported(path: &Path) -> bool {
    extension_of(path).is_some_and(|e| SUPPORTED_EXTENSIONS.contains(&e.as_str()))
}

/// Split a file belongs to, from keywords in its stem.
fn split_for_stem(stem: &str) -> &'static str {
    let stem = stem.to_ascii_lowercase();
    let words: Vec<&str> = stem
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    SPLIT_KEYWORDS
        .iter()
        .find(|(_, keys)| words.iter().any(|w| keys.contains(w)))
        .map(|(name, _)| *name)
        .unwrap_or(DEFAULT_SPLIT)
}

fn local_splits(path: &Path) -> Result<Vec<SplitSource>, DocprepError> {
    if path.is_file() {
        if !is_supported(path) {
            return Err(DocprepError::UnsupportedFormat {
                path: path.to_path_buf(),
            });
        }
        return Ok(vec![SplitSource {
            name: DEFAULT_SPLIT.to_string(),
            files: vec![path.to_path_buf()],
        }]);
    }

    let mut files = Vec::new();
    for entry in std::fs::read_dir(path).map_err(|e| DocprepError::io(path, e))? {
        let file = entry.map_err(|e| DocprepError::io(path, e))?.path();
        if file.is_file() && is_supported(&file) {
            files.push(file);
        }
    }
    if files.is_empty() {
        return Err(DocprepError::NoMatchingFiles {
            dir: path.to_path_buf(),
            suffixes: SUPPORTED_EXTENSIONS.iter().map(|e| format!(".{e}")).collect(),
        });
    }
    files.sort();

    let mut splits: Vec<SplitSource> = Vec::new();
    for (name, _) in SPLIT_KEYWORDS {
        let members: Vec<PathBuf> = files
            .iter()
            .filter(|f| {
                let stem = f.file_stem().map(|s| s.to_string_lossy()).unwrap_or_default();
                split_for_stem(&stem) == *name
            })
            .cloned()
            .collect();
        if !members.is_empty() {
            debug!("Split '{}': {} file(s)", name, members.len());
            splits.push(SplitSource {
                name: name.to_string(),
                files: members,
            });
        }
    }
    Ok(splits)
}

// ── Hub ──────────────────────────────────────────────────────────────────

async fn hub_splits(
    dataset: &str,
    wanted: Option<&str>,
) -> Result<(Vec<SplitSource>, TempDir), DocprepError> {
    let client = HubClient::from_env()?;
    let shards = client.parquet_shards(dataset).await?;
    if shards.is_empty() {
        return Err(DocprepError::DatasetLoad {
            source_name: dataset.to_string(),
            detail: "the datasets-server lists no parquet files".into(),
        });
    }

    let scratch = TempDir::new().map_err(|e| DocprepError::Internal(format!("tempdir: {e}")))?;
    let mut splits: Vec<SplitSource> = Vec::new();

    for (idx, shard) in shards.iter().enumerate() {
        let pos = match splits.iter().position(|s| s.name == shard.split) {
            Some(pos) => pos,
            None => {
                splits.push(SplitSource {
                    name: shard.split.clone(),
                    files: Vec::new(),
                });
                splits.len() - 1
            }
        };
        // Only the wanted split is downloaded; the others stay listed so a
        // miss can report what exists.
        if wanted.is_some_and(|w| w != shard.split) {
            continue;
        }
        let dest = scratch
            .path()
            .join(format!("{}-{:05}-{}", shard.split, idx, shard.filename));
        client.download(&shard.url, &dest).await?;
        splits[pos].files.push(dest);
    }

    Ok((splits, scratch))
}

// ── Row readers ──────────────────────────────────────────────────────────

type RowIterator = Box<dyn Iterator<Item = Result<Value, DocprepError>>>;

/// Rows of a split, file after file.
pub struct SplitRows {
    files: VecDeque<PathBuf>,
    current: Option<RowIterator>,
}

impl Iterator for SplitRows {
    type Item = Result<Value, DocprepError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(rows) = self.current.as_mut() {
                if let Some(row) = rows.next() {
                    return Some(row);
                }
                self.current = None;
            }
            let file = self.files.pop_front()?;
            match read_rows(&file) {
                Ok(rows) => self.current = Some(rows),
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

/// Open one data file as a lazy row iterator.
pub fn read_rows(path: &Path) -> Result<RowIterator, DocprepError> {
    debug!("Reading rows from {}", path.display());
    match extension_of(path).as_deref() {
        Some("jsonl") => json_lines(path),
        Some("json") => {
            if first_significant_byte(path)? == Some(b'[') {
                json_array(path)
            } else {
                json_lines(path)
            }
        }
        Some("parquet") => parquet_rows(path),
        _ => Err(DocprepError::UnsupportedFormat {
            path: path.to_path_buf(),
        }),
    }
}

fn load_error(path: &Path, detail: impl std::fmt::Display) -> DocprepError {
    DocprepError::DatasetLoad {
        source_name: path.display().to_string(),
        detail: detail.to_string(),
    }
}

fn first_significant_byte(path: &Path) -> Result<Option<u8>, DocprepError> {
    let file = File::open(path).map_err(|e| DocprepError::io(path, e))?;
    for byte in BufReader::new(file).bytes() {
        let byte = byte.map_err(|e| DocprepError::io(path, e))?;
        if !byte.is_ascii_whitespace() {
            return Ok(Some(byte));
        }
    }
    Ok(None)
}

fn json_array(path: &Path) -> Result<RowIterator, DocprepError> {
    let file = File::open(path).map_err(|e| DocprepError::io(path, e))?;
    let rows: Vec<Value> =
        serde_json::from_reader(BufReader::new(file)).map_err(|e| load_error(path, e))?;
    Ok(Box::new(rows.into_iter().map(Ok)))
}

fn json_lines(path: &Path) -> Result<RowIterator, DocprepError> {
    let file = File::open(path).map_err(|e| DocprepError::io(path, e))?;
    let owned = path.to_path_buf();
    let rows = BufReader::new(file)
        .lines()
        .enumerate()
        .filter_map(move |(idx, line)| match line {
            Ok(line) if line.trim().is_empty() => None,
            Ok(line) => Some(
                serde_json::from_str::<Value>(&line)
                    .map_err(|e| load_error(&owned, format!("line {}: {e}", idx + 1))),
            ),
            Err(e) => Some(Err(DocprepError::io(&owned, e))),
        });
    Ok(Box::new(rows))
}

fn parquet_rows(path: &Path) -> Result<RowIterator, DocprepError> {
    let parquet_error = |detail: String| DocprepError::Parquet {
        path: path.to_path_buf(),
        detail,
    };
    let file = File::open(path).map_err(|e| DocprepError::io(path, e))?;
    let reader = SerializedFileReader::new(file).map_err(|e| parquet_error(e.to_string()))?;
    let rows = RowIter::from_file_into(Box::new(reader));

    let owned = path.to_path_buf();
    Ok(Box::new(rows.map(move |row| {
        row.map(|r| r.to_json_value())
            .map_err(|e| DocprepError::Parquet {
                path: owned.clone(),
                detail: e.to_string(),
            })
    })))
}
