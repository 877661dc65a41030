//! Record writers for converted splits.
//!
//! Records are written as they arrive. JSON and JSON Lines go straight to a
//! buffered file; Parquet is flushed through an Arrow writer every
//! [`PARQUET_BATCH_ROWS`] records; hub uploads are accumulated as JSON Lines
//! in memory and committed once every split is done.

use super::ConversionRecord;
use crate::config::OutputFormat;
use crate::error::DocprepError;
use arrow_array::builder::{ListBuilder, StringBuilder, StructBuilder};
use arrow_array::{ArrayRef, RecordBatch, StringArray};
use arrow_schema::{ArrowError, DataType, Field, Fields};
use parquet::arrow::ArrowWriter;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Records per Arrow record batch.
pub const PARQUET_BATCH_ROWS: usize = 1000;

/// File for one converted split.
///
/// `split` is `None` for a single dataset (`<stem>.<ext>`), otherwise the
/// split name is appended to the stem (`<stem>_<split>.<ext>`). The file
/// always sits in the output path's directory.
pub fn output_file(output: &Path, split: Option<&str>, ext: &str) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "converted".to_string());
    let name = match split {
        Some(split) => format!("{stem}_{split}.{ext}"),
        None => format!("{stem}.{ext}"),
    };
    output.parent().unwrap_or_else(|| Path::new("")).join(name)
}

enum Sink {
    Json { out: BufWriter<File>, first: bool },
    Jsonl(BufWriter<File>),
    Parquet {
        writer: ArrowWriter<File>,
        pending: Vec<ConversionRecord>,
    },
    Memory(Vec<u8>),
}

/// Incremental writer for one split.
pub struct RecordWriter {
    path: PathBuf,
    sink: Sink,
    written: usize,
}

impl RecordWriter {
    /// Create (and truncate) `path` for `format`, creating parent
    /// directories as needed.
    pub fn to_file(format: OutputFormat, path: &Path) -> Result<Self, DocprepError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| DocprepError::write(parent, e))?;
        }
        info!("Saving dataset to: {}", path.display());
        let file = File::create(path).map_err(|e| DocprepError::write(path, e))?;

        let sink = match format {
            OutputFormat::Json => {
                let mut out = BufWriter::new(file);
                out.write_all(b"[").map_err(|e| DocprepError::write(path, e))?;
                Sink::Json { out, first: true }
            }
            OutputFormat::Jsonl => Sink::Jsonl(BufWriter::new(file)),
            OutputFormat::Parquet => {
                let schema = record_batch(&[]).map_err(|e| parquet_error(path, e))?.schema();
                let writer =
                    ArrowWriter::try_new(file, schema, None).map_err(|e| parquet_error(path, e))?;
                Sink::Parquet {
                    writer,
                    pending: Vec::with_capacity(PARQUET_BATCH_ROWS),
                }
            }
            OutputFormat::HfHub => {
                return Err(DocprepError::Internal(
                    "hub output is buffered, not written to a file".into(),
                ))
            }
        };

        Ok(Self {
            path: path.to_path_buf(),
            sink,
            written: 0,
        })
    }

    /// JSON Lines buffered in memory; `label` only appears in errors.
    pub fn in_memory(label: impl Into<PathBuf>) -> Self {
        Self {
            path: label.into(),
            sink: Sink::Memory(Vec::new()),
            written: 0,
        }
    }

    /// Records written so far.
    pub fn written(&self) -> usize {
        self.written
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(&mut self, record: &ConversionRecord) -> Result<(), DocprepError> {
        let path = &self.path;
        match self.sink {
            Sink::Json {
                ref mut out,
                ref mut first,
            } => {
                let sep: &[u8] = if *first { b"\n" } else { b",\n" };
                *first = false;
                out.write_all(sep).map_err(|e| DocprepError::write(path, e))?;
                serde_json::to_writer(&mut *out, record).map_err(|e| json_error(path, e))?;
            }
            Sink::Jsonl(ref mut out) => write_json_line(out, record, path)?,
            Sink::Memory(ref mut buf) => write_json_line(buf, record, path)?,
            Sink::Parquet {
                ref mut writer,
                ref mut pending,
            } => {
                pending.push(record.clone());
                if pending.len() >= PARQUET_BATCH_ROWS {
                    flush_parquet(writer, pending, path)?;
                }
            }
        }
        self.written += 1;
        Ok(())
    }

    /// Close the output. Returns the buffered bytes for an in-memory writer
    /// and an empty vector otherwise.
    pub fn finish(self) -> Result<Vec<u8>, DocprepError> {
        let path = &self.path;
        let buffered = match self.sink {
            Sink::Json { mut out, first } => {
                let tail: &[u8] = if first { b"]\n" } else { b"\n]\n" };
                out.write_all(tail)
                    .and_then(|_| out.flush())
                    .map_err(|e| DocprepError::write(path, e))?;
                Vec::new()
            }
            Sink::Jsonl(mut out) => {
                out.flush().map_err(|e| DocprepError::write(path, e))?;
                Vec::new()
            }
            Sink::Parquet {
                mut writer,
                mut pending,
            } => {
                flush_parquet(&mut writer, &mut pending, path)?;
                writer.close().map_err(|e| parquet_error(path, e))?;
                Vec::new()
            }
            Sink::Memory(buf) => buf,
        };
        debug!("Finished {} ({} records)", path.display(), self.written);
        Ok(buffered)
    }
}

fn write_json_line(
    out: &mut impl Write,
    record: &ConversionRecord,
    path: &Path,
) -> Result<(), DocprepError> {
    serde_json::to_writer(&mut *out, record).map_err(|e| json_error(path, e))?;
    out.write_all(b"\n").map_err(|e| DocprepError::write(path, e))
}

fn json_error(path: &Path, e: serde_json::Error) -> DocprepError {
    DocprepError::Internal(format!("serialising record for {}: {e}", path.display()))
}

fn parquet_error(path: &Path, e: impl std::fmt::Display) -> DocprepError {
    DocprepError::Parquet {
        path: path.to_path_buf(),
        detail: e.to_string(),
    }
}

fn flush_parquet(
    writer: &mut ArrowWriter<File>,
    pending: &mut Vec<ConversionRecord>,
    path: &Path,
) -> Result<(), DocprepError> {
    if pending.is_empty() {
        return Ok(());
    }
    let batch = record_batch(pending).map_err(|e| parquet_error(path, e))?;
    writer.write(&batch).map_err(|e| parquet_error(path, e))?;
    debug!("Wrote parquet batch of {} rows", pending.len());
    pending.clear();
    Ok(())
}

/// Arrow batch with columns
/// `messages: list<struct<role: utf8, content: utf8>>, id: utf8, source: utf8`.
pub fn record_batch(records: &[ConversionRecord]) -> Result<RecordBatch, ArrowError> {
    let message_fields = Fields::from(vec![
        Field::new("role", DataType::Utf8, false),
        Field::new("content", DataType::Utf8, false),
    ]);
    let mut messages = ListBuilder::new(StructBuilder::from_fields(
        message_fields,
        records.len(),
    ));

    for record in records {
        let entries = messages.values();
        for message in &record.messages {
            entries
                .field_builder::<StringBuilder>(0)
                .ok_or_else(|| ArrowError::SchemaError("role builder missing".into()))?
                .append_value(message.role.as_str());
            entries
                .field_builder::<StringBuilder>(1)
                .ok_or_else(|| ArrowError::SchemaError("content builder missing".into()))?
                .append_value(&message.content);
            entries.append(true);
        }
        messages.append(true);
    }

    let ids: StringArray = records.iter().map(|r| Some(r.id.as_str())).collect();
    let sources: StringArray = records.iter().map(|r| Some(r.source.as_str())).collect();

    RecordBatch::try_from_iter(vec![
        ("messages", Arc::new(messages.finish()) as ArrayRef),
        ("id", Arc::new(ids) as ArrayRef),
        ("source", Arc::new(sources) as ArrayRef),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{Message, Role};
    use crate::dataset::load::read_rows;
    use tempfile::TempDir;

    fn record(n: usize, text: &str) -> ConversionRecord {
        ConversionRecord {
            messages: vec![
                Message {
                    role: Role::User,
                    content: text.to_string(),
                },
                Message {
                    role: Role::Assistant,
                    content: "ok".into(),
                },
            ],
            id: format!("chats_{n}"),
            source: "chats".into(),
        }
    }

    #[test]
    fn output_file_names() {
        let out = Path::new("/out/converted.jsonl");
        assert_eq!(output_file(out, None, "jsonl"), PathBuf::from("/out/converted.jsonl"));
        assert_eq!(
            output_file(out, Some("train"), "parquet"),
            PathBuf::from("/out/converted_train.parquet")
        );
        assert_eq!(
            output_file(Path::new("result"), Some("test"), "json"),
            PathBuf::from("result_test.json")
        );
    }

    #[test]
    fn json_array_is_valid_and_keeps_unicode() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("out.json");
        let mut w = RecordWriter::to_file(OutputFormat::Json, &path).unwrap();
        w.write(&record(0, "héllo 世界")).unwrap();
        w.write(&record(1, "second")).unwrap();
        assert_eq!(w.written(), 2);
        w.finish().unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("héllo 世界"));
        let parsed: Vec<ConversionRecord> = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, vec![record(0, "héllo 世界"), record(1, "second")]);
    }

    #[test]
    fn empty_json_array() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested/empty.json");
        RecordWriter::to_file(OutputFormat::Json, &path)
            .unwrap()
            .finish()
            .unwrap();
        let parsed: Vec<ConversionRecord> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert!(parsed.is_empty());
    }

    #[test]
    fn jsonl_has_one_record_per_line() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("out.jsonl");
        let mut w = RecordWriter::to_file(OutputFormat::Jsonl, &path).unwrap();
        for n in 0..3 {
            w.write(&record(n, "x")).unwrap();
        }
        w.finish().unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[2].contains("\"id\":\"chats_2\""));
        assert!(lines[0].starts_with("{\"messages\":[{\"role\":\"user\""));
    }

    #[test]
    fn parquet_reads_back_as_messages() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("out.parquet");
        let mut w = RecordWriter::to_file(OutputFormat::Parquet, &path).unwrap();
        for n in 0..(PARQUET_BATCH_ROWS + 5) {
            w.write(&record(n, "q")).unwrap();
        }
        w.finish().unwrap();

        let rows: Vec<serde_json::Value> = read_rows(&path).unwrap().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), PARQUET_BATCH_ROWS + 5);
        assert_eq!(rows[0]["id"], "chats_0");
        assert_eq!(rows[0]["source"], "chats");
        assert_eq!(rows[0]["messages"][0]["role"], "user");
        assert_eq!(rows[0]["messages"][1]["content"], "ok");
        assert_eq!(rows[1004]["id"], "chats_1004");
    }

    #[test]
    fn schema_has_three_columns() {
        let batch = record_batch(&[record(0, "a")]).unwrap();
        let schema = batch.schema();
        let names: Vec<&str> = schema.fields().iter().map(|f| f.name().as_str()).collect();
        assert_eq!(names, vec!["messages", "id", "source"]);
        assert!(matches!(schema.field(0).data_type(), DataType::List(_)));
        assert_eq!(batch.num_rows(), 1);
    }

    #[test]
    fn memory_writer_buffers_jsonl() {
        let mut w = RecordWriter::in_memory("hub:train");
        w.write(&record(7, "x")).unwrap();
        let bytes = w.finish().unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.ends_with("}\n"));
        assert!(text.contains("chats_7"));
    }
}
