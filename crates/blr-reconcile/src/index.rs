use std::collections::HashMap;
use std::fmt;
use std::io::{self, BufRead};

use blr_events::{is_indexable, BinlogEvent, CompositeKey, IntField, FIELD_EVENT_TYPE};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::jsonl::for_each_line;

/// Why an indexable event was refused a slot in the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexRejection {
    MissingBinlogFile {
        event_type: String,
    },
    /// Position absent, zero, or left unparsed by the normalizer.
    InvalidLogPosition {
        event_type: String,
        raw: Option<String>,
    },
}

impl fmt::Display for IndexRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexRejection::MissingBinlogFile { event_type } => {
                write!(f, "{event_type} event has no binlog_file")
            }
            IndexRejection::InvalidLogPosition {
                event_type,
                raw: Some(raw),
            } => write!(f, "{event_type} event has invalid log_position '{raw}'"),
            IndexRejection::InvalidLogPosition {
                event_type,
                raw: None,
            } => write!(f, "{event_type} event has no log_position"),
        }
    }
}

impl std::error::Error for IndexRejection {}

/// Join key of an indexed event.
pub fn index_key(event: &BinlogEvent) -> Result<CompositeKey, IndexRejection> {
    let file = event
        .file()
        .ok_or_else(|| IndexRejection::MissingBinlogFile {
            event_type: event.event_type.clone(),
        })?;
    let position = event
        .position()
        .ok_or_else(|| IndexRejection::InvalidLogPosition {
            event_type: event.event_type.clone(),
            raw: event.log_position.as_ref().map(IntField::to_string),
        })?;
    Ok(CompositeKey::new(file, position))
}

/// Counts from one index load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IndexLoadStats {
    pub lines_read: u64,
    /// Not JSON, or an indexable event whose fields do not decode.
    pub malformed_lines: u64,
    /// Lines whose `event_type` is neither a row mutation nor `XID`.
    pub irrelevant_events: u64,
    pub rejected_events: u64,
    /// Later event replaced an earlier one under the same key.
    pub collisions: u64,
    pub indexed_events: u64,
}

/// `(binlog_file, position)` → event, for row mutations and `XID` only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordIndex {
    events: HashMap<CompositeKey, BinlogEvent>,
}

impl RecordIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert under the event's own key. Last write wins: a replaced event is
    /// returned.
    pub fn insert(&mut self, event: BinlogEvent) -> Result<Option<BinlogEvent>, IndexRejection> {
        let key = index_key(&event)?;
        Ok(self.events.insert(key, event))
    }

    /// Filter, validate and insert one decoded event, updating `stats`.
    pub fn admit(&mut self, event: BinlogEvent, stats: &mut IndexLoadStats) {
        if !is_indexable(&event.event_type) {
            stats.irrelevant_events += 1;
            return;
        }
        match self.insert(event) {
            Ok(None) => stats.indexed_events += 1,
            Ok(Some(replaced)) => {
                stats.collisions += 1;
                warn!(
                    event_type = %replaced.event_type,
                    binlog_file = ?replaced.binlog_file,
                    position = ?replaced.position(),
                    "binlog key collision; keeping the later event"
                );
            }
            Err(rejection) => {
                stats.rejected_events += 1;
                warn!(%rejection, "binlog event not indexed");
            }
        }
    }

    /// Build from newline-delimited normalized events.
    ///
    /// The event type is checked before the typed decode, so fields of
    /// events that are never indexed cannot make a line malformed.
    pub fn load<R: BufRead>(reader: R) -> io::Result<(Self, IndexLoadStats)> {
        let mut index = Self::new();
        let mut stats = IndexLoadStats::default();
        let scan = for_each_line(reader, "binlog", |line, raw: Value| {
            index.admit_json(line, raw, &mut stats);
            Ok(())
        })?;
        stats.lines_read = scan.lines_read;
        stats.malformed_lines += scan.malformed;
        debug!(?stats, "binlog index loaded");
        Ok((index, stats))
    }

    fn admit_json(&mut self, line: usize, raw: Value, stats: &mut IndexLoadStats) {
        let indexable = raw
            .get(FIELD_EVENT_TYPE)
            .and_then(Value::as_str)
            .is_some_and(is_indexable);
        if !indexable {
            stats.irrelevant_events += 1;
            return;
        }
        match serde_json::from_value::<BinlogEvent>(raw) {
            Ok(event) => self.admit(event, stats),
            Err(e) => {
                stats.malformed_lines += 1;
                warn!(source = "binlog", line, error = %e, "skipping undecodable binlog event");
            }
        }
    }

    pub fn get(&self, key: &CompositeKey) -> Option<&BinlogEvent> {
        self.events.get(key)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Unordered.
    pub fn iter(&self) -> impl Iterator<Item = (&CompositeKey, &BinlogEvent)> {
        self.events.iter()
    }
}

impl FromIterator<BinlogEvent> for RecordIndex {
    /// Same filtering as [`RecordIndex::load`]; rejections are logged.
    fn from_iter<T: IntoIterator<Item = BinlogEvent>>(iter: T) -> Self {
        let mut index = Self::new();
        let mut stats = IndexLoadStats::default();
        for event in iter {
            index.admit(event, &mut stats);
        }
        index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_row_mutations_and_xid_only() {
        let mut index = RecordIndex::new();
        let mut stats = IndexLoadStats::default();
        index.admit(BinlogEvent::new("WriteRowsEventV2", "a", 1), &mut stats);
        index.admit(BinlogEvent::new("XID", "a", 2), &mut stats);
        index.admit(BinlogEvent::new("GTID", "a", 3), &mut stats);
        index.admit(BinlogEvent::new("Query", "a", 4), &mut stats);
        assert_eq!(index.len(), 2);
        assert_eq!(stats.indexed_events, 2);
        assert_eq!(stats.irrelevant_events, 2);
    }

    #[test]
    fn rejects_missing_file_and_zero_position() {
        let mut no_file = BinlogEvent::new("XID", "", 5);
        assert!(matches!(
            RecordIndex::new().insert(no_file.clone()),
            Err(IndexRejection::MissingBinlogFile { .. })
        ));
        no_file.binlog_file = None;
        assert!(RecordIndex::new().insert(no_file).is_err());

        let zero = BinlogEvent::new("XID", "a", 0);
        assert_eq!(
            RecordIndex::new().insert(zero),
            Err(IndexRejection::InvalidLogPosition {
                event_type: "XID".to_string(),
                raw: Some("0".to_string()),
            })
        );
    }

    #[test]
    fn collision_is_last_write_wins() {
        let mut index = RecordIndex::new();
        let mut stats = IndexLoadStats::default();
        index.admit(BinlogEvent::new("WriteRowsEventV2", "a", 9), &mut stats);
        index.admit(BinlogEvent::new("DeleteRowsEventV2", "a", 9), &mut stats);
        assert_eq!(stats.collisions, 1);
        assert_eq!(index.len(), 1);
        let kept = index.get(&CompositeKey::new("a", 9)).unwrap();
        assert_eq!(kept.event_type, "DeleteRowsEventV2");
    }

    #[test]
    fn fields_of_irrelevant_events_are_not_decoded() {
        let input = concat!(
            r#"{"event_type":"Rotate","timestamp":12345,"log_position":["x"]}"#,
            "\n",
            r#"{"event_type":"WriteRowsEventV2","timestamp":12345,"binlog_file":"a","log_position":4}"#,
            "\n",
            r#"{"event_type":"XID","binlog_file":"a","log_position":9}"#,
            "\n",
            r#"{"no_event_type":true}"#,
            "\n",
        );
        let (index, stats) = RecordIndex::load(input.as_bytes()).unwrap();
        assert_eq!(stats.lines_read, 4);
        assert_eq!(stats.irrelevant_events, 2);
        assert_eq!(stats.malformed_lines, 1);
        assert_eq!(stats.indexed_events, 1);
        assert_eq!(index.len(), 1);
        assert!(index.get(&CompositeKey::new("a", 9)).is_some());
    }

    #[test]
    fn rejection_display() {
        let r = IndexRejection::InvalidLogPosition {
            event_type: "XID".to_string(),
            raw: None,
        };
        assert_eq!(r.to_string(), "XID event has no log_position");
    }
}
