//! `conversations` → `messages` field remapping.
//!
//! A row is either converted or skipped with a [`Skip`] reason; there is no
//! third outcome. Every skipped row and every dropped turn is reported to the
//! injected [`DiagnosticSink`].

use super::{ConversionRecord, DatasetNames, Message, Role};
use crate::diagnostics::{Diagnostic, DiagnosticSink, SkipReason};
use serde_json::Value;

/// Why a row produced no record.
pub type Skip = SkipReason;

/// Convert one row. `sample` is the zero-based row number within its split.
pub fn remap_row(
    row: &Value,
    sample: usize,
    names: &DatasetNames,
    sink: &dyn DiagnosticSink,
) -> Result<ConversionRecord, Skip> {
    let skip = |reason: Skip| {
        sink.warning(Diagnostic::RecordSkipped { sample, reason });
        reason
    };

    let conversations = row
        .get("conversations")
        .ok_or_else(|| skip(Skip::MissingConversations))?;
    let turns = conversations
        .as_array()
        .ok_or_else(|| skip(Skip::NotAList))?;

    let mut messages = Vec::with_capacity(turns.len());
    for turn in turns {
        let (Some(from), Some(value)) = (turn.get("from"), turn.get("value")) else {
            sink.warning(Diagnostic::InvalidTurn { sample });
            continue;
        };
        let (Some(from), Some(content)) = (from.as_str(), value.as_str()) else {
            sink.warning(Diagnostic::InvalidTurn { sample });
            continue;
        };

        if from == "system" {
            continue;
        }
        match Role::from_source_label(from) {
            Some(role) => messages.push(Message {
                role,
                content: content.to_string(),
            }),
            None => sink.warning(Diagnostic::UnknownRole {
                sample,
                role: from.to_string(),
            }),
        }
    }

    if messages.is_empty() {
        return Err(skip(Skip::NoValidMessages));
    }

    Ok(ConversionRecord {
        messages,
        id: format!("{}_{}", names.dataset_name, sample),
        source: names.source.clone(),
    })
}

/// Convert a batch of rows whose first row is number `start`, keeping only
/// the records that survive.
pub fn convert_batch(
    rows: &[Value],
    start: usize,
    names: &DatasetNames,
    sink: &dyn DiagnosticSink,
) -> Vec<ConversionRecord> {
    rows.iter()
        .enumerate()
        .filter_map(|(offset, row)| remap_row(row, start + offset, names, sink).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::CollectingSink;
    use serde_json::json;

    fn names() -> DatasetNames {
        DatasetNames::from_path("org/chats")
    }

    #[test]
    fn human_and_gpt_turns_are_mapped() {
        let sink = CollectingSink::new();
        let row = json!({"conversations": [
            {"from": "human", "value": "hi"},
            {"from": "gpt", "value": "hello"}
        ]});

        let record = remap_row(&row, 3, &names(), &sink).unwrap();

        assert_eq!(
            record.messages,
            vec![
                Message { role: Role::User, content: "hi".into() },
                Message { role: Role::Assistant, content: "hello".into() },
            ]
        );
        assert_eq!(record.id, "chats_3");
        assert_eq!(record.source, "org/chats");
        assert!(sink.events().is_empty());
    }

    #[test]
    fn system_only_row_is_skipped() {
        let sink = CollectingSink::new();
        let row = json!({"conversations": [{"from": "system", "value": "be nice"}]});

        let skip = remap_row(&row, 0, &names(), &sink).unwrap_err();

        assert_eq!(skip, Skip::NoValidMessages);
        assert_eq!(
            sink.events(),
            vec![Diagnostic::RecordSkipped {
                sample: 0,
                reason: Skip::NoValidMessages
            }]
        );
    }

    #[test]
    fn unknown_role_drops_only_that_turn() {
        let sink = CollectingSink::new();
        let row = json!({"conversations": [
            {"from": "human", "value": "q"},
            {"from": "bot", "value": "??"},
            {"from": "gpt", "value": "a"}
        ]});

        let record = remap_row(&row, 5, &names(), &sink).unwrap();

        assert_eq!(record.messages.len(), 2);
        assert_eq!(
            sink.events(),
            vec![Diagnostic::UnknownRole {
                sample: 5,
                role: "bot".into()
            }]
        );
    }

    #[test]
    fn malformed_turns_are_reported() {
        let sink = CollectingSink::new();
        let row = json!({"conversations": [
            "not an object",
            {"from": "human"},
            {"from": "human", "value": 42},
            {"from": "gpt", "value": "ok"}
        ]});

        let record = remap_row(&row, 1, &names(), &sink).unwrap();

        assert_eq!(record.messages.len(), 1);
        assert_eq!(sink.events(), vec![Diagnostic::InvalidTurn { sample: 1 }; 3]);
    }

    #[test]
    fn missing_or_non_list_conversations() {
        let sink = CollectingSink::new();
        assert_eq!(
            remap_row(&json!({"text": "x"}), 0, &names(), &sink).unwrap_err(),
            Skip::MissingConversations
        );
        assert_eq!(
            remap_row(&json!({"conversations": "x"}), 1, &names(), &sink).unwrap_err(),
            Skip::NotAList
        );
        assert_eq!(sink.events().len(), 2);
    }

    #[test]
    fn batch_keeps_row_numbers() {
        let sink = CollectingSink::new();
        let rows = vec![
            json!({"conversations": [{"from": "human", "value": "a"}]}),
            json!({"conversations": []}),
            json!({"conversations": [{"from": "gpt", "value": "c"}]}),
        ];

        let records = convert_batch(&rows, 1000, &names(), &sink);

        let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["chats_1000", "chats_1002"]);
    }
}
