//! `convert-dataset`: chat datasets from `conversations` to `messages`.
//!
//! ```text
//! load ──▶ remap (per row) ──▶ [validate first record] ──▶ save
//! (json/jsonl/parquet/hub)                              (json/jsonl/parquet/hub)
//! ```
//!
//! Source rows look like
//! `{"conversations": [{"from": "human", "value": "hi"}, ...]}`; converted
//! records look like
//! `{"messages": [{"role": "user", "content": "hi"}, ...], "id": "name_0", "source": "name"}`.

pub mod hub;
pub mod load;
pub mod remap;
pub mod save;
pub mod validate;

use crate::config::{DatasetConfig, OutputFormat};
use crate::diagnostics::DiagnosticSink;
use crate::error::DocprepError;
use hub::HubClient;
use load::{load_dataset, SplitRows, SplitSource, DEFAULT_SPLIT};
use remap::{convert_batch, remap_row};
use save::{output_file, RecordWriter};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use tracing::info;
use validate::validate_sample;

// ── Records ──────────────────────────────────────────────────────────────

/// Target role of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }

    /// Map a source `from` label. `system` turns are dropped before this is
    /// consulted, so only `human` and `gpt` map.
    pub fn from_source_label(label: &str) -> Option<Role> {
        match label {
            "human" => Some(Role::User),
            "gpt" => Some(Role::Assistant),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

/// One converted example. Never emitted with an empty `messages`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionRecord {
    pub messages: Vec<Message>,
    pub id: String,
    pub source: String,
}

/// Name used in record ids, and the `source` written into every record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetNames {
    pub dataset_name: String,
    pub source: String,
}

impl DatasetNames {
    /// Derive names from the dataset path as given on the command line.
    ///
    /// `org/repo[/...]` (a `/` without a leading `./` or `/`) is a hub id:
    /// the id is the source and `repo` the dataset name. Anything else is a
    /// local path and both names are the file name without its extension.
    pub fn from_path(dataset_path: &str) -> Self {
        if dataset_path.contains('/')
            && !dataset_path.starts_with("./")
            && !dataset_path.starts_with('/')
        {
            let repo = dataset_path.split('/').nth(1).unwrap_or(dataset_path);
            return Self {
                dataset_name: repo.to_string(),
                source: dataset_path.to_string(),
            };
        }

        let path = Path::new(dataset_path);
        let name = if path.extension().is_some() {
            path.file_stem()
        } else {
            path.file_name()
        };
        let name = name
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| dataset_path.to_string());
        Self {
            dataset_name: name.clone(),
            source: name,
        }
    }
}

/// Outcome for one split.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionSummary {
    pub split: String,
    /// Input rows read.
    pub processed: usize,
    /// Records written.
    pub retained: usize,
    /// File written, or hub location.
    pub output: String,
}

// ── Per-split record sources ─────────────────────────────────────────────

/// Lazily converted rows. Stops once `limit` records have been retained.
struct StreamingRecords<'a> {
    rows: SplitRows,
    names: &'a DatasetNames,
    sink: &'a dyn DiagnosticSink,
    next_sample: usize,
    retained: usize,
    limit: Option<usize>,
}

impl Iterator for StreamingRecords<'_> {
    type Item = Result<ConversionRecord, DocprepError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.limit.is_some_and(|l| self.retained >= l) {
            return None;
        }
        loop {
            let row = match self.rows.next()? {
                Ok(row) => row,
                Err(e) => return Some(Err(e)),
            };
            let sample = self.next_sample;
            self.next_sample += 1;
            if let Ok(record) = remap_row(&row, sample, self.names, self.sink) {
                self.retained += 1;
                return Some(Ok(record));
            }
        }
    }
}

enum SplitRecords<'a> {
    Streaming(StreamingRecords<'a>),
    Materialised {
        records: std::vec::IntoIter<ConversionRecord>,
        processed: usize,
    },
}

impl SplitRecords<'_> {
    fn processed(&self) -> usize {
        match self {
            SplitRecords::Streaming(s) => s.next_sample,
            SplitRecords::Materialised { processed, .. } => *processed,
        }
    }
}

impl Iterator for SplitRecords<'_> {
    type Item = Result<ConversionRecord, DocprepError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            SplitRecords::Streaming(s) => s.next(),
            SplitRecords::Materialised { records, .. } => records.next().map(Ok),
        }
    }
}

fn open_split<'a>(
    split: &SplitSource,
    names: &'a DatasetNames,
    config: &'a DatasetConfig,
) -> Result<SplitRecords<'a>, DocprepError> {
    let sink = config.diagnostics.as_ref();

    if config.streaming {
        info!("Converting streaming split: {}", split.name);
        return Ok(SplitRecords::Streaming(StreamingRecords {
            rows: split.rows(),
            names,
            sink,
            next_sample: 0,
            retained: 0,
            limit: config.max_samples,
        }));
    }

    let rows: Vec<Value> = match config.max_samples {
        Some(limit) => {
            info!("Limiting to {} samples", limit);
            split.rows().take(limit).collect::<Result<_, _>>()?
        }
        None => split.rows().collect::<Result<_, _>>()?,
    };
    info!("Converting {} samples of split '{}'...", rows.len(), split.name);

    let batch_size = config.batch_size.max(1);
    let records: Vec<ConversionRecord> = rows
        .chunks(batch_size)
        .enumerate()
        .flat_map(|(batch, chunk)| convert_batch(chunk, batch * batch_size, names, sink))
        .collect();
    info!(
        "Conversion complete: {}/{} samples retained",
        records.len(),
        rows.len()
    );

    Ok(SplitRecords::Materialised {
        records: records.into_iter(),
        processed: rows.len(),
    })
}

fn validate_record(record: &ConversionRecord) -> Result<(), DocprepError> {
    let sample = serde_json::to_value(record)
        .map_err(|e| DocprepError::ValidationFailed(format!("cannot serialise sample: {e}")))?;
    validate_sample(&sample)?;
    info!("Validation passed ✓");
    info!(
        "Sample: {}",
        serde_json::to_string_pretty(&sample).unwrap_or_default()
    );
    Ok(())
}

// ── Entry point ──────────────────────────────────────────────────────────

/// Load `dataset_path`, convert every selected split and save the result.
///
/// With `config.validate`, the first record of the first split is checked
/// before any output is created; a failed check (or an empty first split)
/// returns [`DocprepError::ValidationFailed`] and writes nothing.
pub async fn convert_dataset(
    dataset_path: &str,
    output_path: &str,
    config: &DatasetConfig,
) -> Result<Vec<ConversionSummary>, DocprepError> {
    let names = DatasetNames::from_path(dataset_path);
    info!(
        "Using dataset_name='{}', source_name='{}'",
        names.dataset_name, names.source
    );

    let hub = match config.format {
        OutputFormat::HfHub => {
            let client = HubClient::from_env()?;
            client.require_token()?;
            Some(client)
        }
        _ => None,
    };

    let loaded = load_dataset(dataset_path, config.split.as_deref()).await?;
    let output = Path::new(output_path);

    let mut summaries = Vec::with_capacity(loaded.splits.len());
    let mut hub_files: Vec<(String, Vec<u8>)> = Vec::new();

    for (idx, split) in loaded.splits.iter().enumerate() {
        let mut records = open_split(split, &names, config)?;

        let first = if idx == 0 && config.validate {
            info!("Validating converted data...");
            let first = records.next().transpose()?.ok_or_else(|| {
                DocprepError::ValidationFailed("no converted record to validate".into())
            })?;
            validate_record(&first)?;
            Some(first)
        } else {
            None
        };

        let mut writer = match (config.format, config.format.extension()) {
            (OutputFormat::HfHub, _) | (_, None) => {
                let split_name = if loaded.single {
                    DEFAULT_SPLIT
                } else {
                    split.name.as_str()
                };
                RecordWriter::in_memory(format!("{output_path}/data/{split_name}.jsonl"))
            }
            (format, Some(ext)) => {
                let label = (!loaded.single).then_some(split.name.as_str());
                RecordWriter::to_file(format, &output_file(output, label, ext))?
            }
        };

        for record in first.into_iter().map(Ok).chain(records.by_ref()) {
            writer.write(&record?)?;
        }

        let retained = writer.written();
        let location = writer.path().display().to_string();
        let buffered = writer.finish()?;
        if hub.is_some() {
            let repo_path = location
                .strip_prefix(&format!("{output_path}/"))
                .unwrap_or(&location)
                .to_string();
            hub_files.push((repo_path, buffered));
        }

        info!(
            "Split '{}': {}/{} samples retained",
            split.name,
            retained,
            records.processed()
        );
        summaries.push(ConversionSummary {
            split: split.name.clone(),
            processed: records.processed(),
            retained,
            output: location,
        });
    }

    if let Some(client) = hub {
        info!("Pushing dataset to Hub: {}", output_path);
        client.create_dataset_repo(output_path).await?;
        client
            .commit_files(
                output_path,
                &hub_files,
                &format!("Add converted dataset from {}", names.source),
            )
            .await?;
    }

    info!("Conversion completed successfully!");
    Ok(summaries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hub_ids_use_repo_name() {
        let n = DatasetNames::from_path("teknium/OpenHermes-2.5");
        assert_eq!(n.dataset_name, "OpenHermes-2.5");
        assert_eq!(n.source, "teknium/OpenHermes-2.5");

        let n = DatasetNames::from_path("org/repo/sub/dir");
        assert_eq!(n.dataset_name, "repo");
        assert_eq!(n.source, "org/repo/sub/dir");
    }

    #[test]
    fn local_paths_use_file_stem() {
        let n = DatasetNames::from_path("./data/chats.jsonl");
        assert_eq!(n.dataset_name, "chats");
        assert_eq!(n.source, "chats");

        assert_eq!(DatasetNames::from_path("/abs/dump.parquet").source, "dump");
        assert_eq!(DatasetNames::from_path("chats.json").dataset_name, "chats");
        assert_eq!(DatasetNames::from_path("./corpus").dataset_name, "corpus");
    }

    #[test]
    fn roles_serialise_lowercase() {
        let m = Message {
            role: Role::Assistant,
            content: "x".into(),
        };
        assert_eq!(
            serde_json::to_string(&m).unwrap(),
            r#"{"role":"assistant","content":"x"}"#
        );
        assert_eq!(Role::from_source_label("human"), Some(Role::User));
        assert_eq!(Role::from_source_label("system"), None);
    }

    #[test]
    fn record_field_order() {
        let r = ConversionRecord {
            messages: vec![],
            id: "a_0".into(),
            source: "a".into(),
        };
        assert_eq!(
            serde_json::to_string(&r).unwrap(),
            r#"{"messages":[],"id":"a_0","source":"a"}"#
        );
    }
}
