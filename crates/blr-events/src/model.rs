//! Event field model.
//!
//! Two views of the same data live here:
//! - [`NormalizedEvent`]: what the normalizer writes (sorted field map, one
//!   JSON object per line).
//! - [`BinlogEvent`]: what the index reads back. Fields that the normalizer
//!   may have degraded to raw strings are typed as [`IntField`] /
//!   [`TimestampField`] so comparison code has to handle the degraded case.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, FixedOffset, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

// ---------------------------------------------------------------------------
// Taxonomy
// ---------------------------------------------------------------------------

pub const EVENT_WRITE_ROWS: &str = "WriteRowsEventV2";
pub const EVENT_UPDATE_ROWS: &str = "UpdateRowsEventV2";
pub const EVENT_DELETE_ROWS: &str = "DeleteRowsEventV2";
/// Transaction-boundary marker.
pub const EVENT_XID: &str = "XID";
pub const EVENT_GTID: &str = "GTID";

/// Row-mutation event types recognized by substring in headers and in the
/// `Event type` field.
pub const ROW_MUTATION_EVENTS: [&str; 3] = [EVENT_WRITE_ROWS, EVENT_UPDATE_ROWS, EVENT_DELETE_ROWS];

// Current and legacy suffix spellings, per mutation kind.
const INSERT_SUFFIXES: &[&str] = &["WriteRowsEventV2", "WriteRowsEventV1", "WriteRowsV1"];
const UPDATE_SUFFIXES: &[&str] = &["UpdateRowsEventV2", "UpdateRowsEventV1", "UpdateRowsV1"];
const DELETE_SUFFIXES: &[&str] = &[
    "DeleteRowsEventV2",
    "DeleteRowsEventV1",
    "DeleteRowsV2",
    "DeleteRowsV1",
];

// Well-known field names.
pub const FIELD_EVENT_TYPE: &str = "event_type";
pub const FIELD_BINLOG_FILE: &str = "binlog_file";
pub const FIELD_LOG_POSITION: &str = "log_position";
pub const FIELD_TIMESTAMP: &str = "timestamp";

/// Row mutation kind, as declared by change-stream records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeType {
    Insert,
    Update,
    Delete,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::Insert => "INSERT",
            ChangeType::Update => "UPDATE",
            ChangeType::Delete => "DELETE",
        }
    }

    /// Infer the mutation kind from an event type by suffix.
    pub fn from_event_type(event_type: &str) -> Option<Self> {
        let ends_with_any = |suffixes: &[&str]| suffixes.iter().any(|s| event_type.ends_with(s));
        if ends_with_any(INSERT_SUFFIXES) {
            Some(ChangeType::Insert)
        } else if ends_with_any(UPDATE_SUFFIXES) {
            Some(ChangeType::Update)
        } else if ends_with_any(DELETE_SUFFIXES) {
            Some(ChangeType::Delete)
        } else {
            None
        }
    }

    /// Case-insensitive comparison against a declared kind string.
    pub fn matches_declared(&self, declared: &str) -> bool {
        declared.eq_ignore_ascii_case(self.as_str())
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn is_row_mutation(event_type: &str) -> bool {
    ChangeType::from_event_type(event_type).is_some()
}

/// Event types the index keeps: row mutations plus the transaction boundary.
pub fn is_indexable(event_type: &str) -> bool {
    is_row_mutation(event_type) || event_type == EVENT_XID
}

// ---------------------------------------------------------------------------
// Composite key
// ---------------------------------------------------------------------------

/// `(binlog_file, position)` join key shared by both sources.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CompositeKey {
    pub binlog_file: String,
    pub position: i64,
}

impl CompositeKey {
    pub fn new(binlog_file: impl Into<String>, position: i64) -> Self {
        Self {
            binlog_file: binlog_file.into(),
            position,
        }
    }
}

impl fmt::Display for CompositeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.binlog_file, self.position)
    }
}

// ---------------------------------------------------------------------------
// Writer side
// ---------------------------------------------------------------------------

/// Output precision of a normalized timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampPrecision {
    Seconds,
    Nanos,
}

/// A single normalized field value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Int(i64),
    Timestamp {
        at: DateTime<FixedOffset>,
        precision: TimestampPrecision,
    },
    Text(String),
}

impl FieldValue {
    /// Integer when the whole value parses as base-10 `i64`, text otherwise.
    pub fn lenient_int(raw: &str) -> Self {
        raw.parse::<i64>()
            .map(FieldValue::Int)
            .unwrap_or_else(|_| FieldValue::Text(raw.to_string()))
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            FieldValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Int(v) => write!(f, "{v}"),
            FieldValue::Timestamp { at, precision } => {
                f.write_str(&format_timestamp(at, *precision))
            }
            FieldValue::Text(s) => f.write_str(s),
        }
    }
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FieldValue::Int(v) => serializer.serialize_i64(*v),
            FieldValue::Timestamp { at, precision } => {
                serializer.serialize_str(&format_timestamp(at, *precision))
            }
            FieldValue::Text(s) => serializer.serialize_str(s),
        }
    }
}

/// RFC 3339 rendering; UTC renders as `Z`.
pub fn format_timestamp(at: &DateTime<FixedOffset>, precision: TimestampPrecision) -> String {
    match precision {
        TimestampPrecision::Seconds => at.to_rfc3339_opts(SecondsFormat::Secs, true),
        TimestampPrecision::Nanos => at.to_rfc3339_opts(SecondsFormat::AutoSi, true),
    }
}

/// One parsed event block. Keys serialize in sorted order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct NormalizedEvent {
    fields: BTreeMap<String, FieldValue>,
}

impl NormalizedEvent {
    pub fn new(event_type: impl Into<String>) -> Self {
        let mut ev = Self::default();
        ev.insert(FIELD_EVENT_TYPE, FieldValue::Text(event_type.into()));
        ev
    }

    pub fn insert(&mut self, key: impl Into<String>, value: FieldValue) {
        self.fields.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    pub fn event_type(&self) -> Option<&str> {
        self.get(FIELD_EVENT_TYPE).and_then(FieldValue::as_text)
    }

    pub fn binlog_file(&self) -> Option<&str> {
        self.get(FIELD_BINLOG_FILE).and_then(FieldValue::as_text)
    }

    /// End-of-event position; `0` when absent or left unparsed.
    pub fn log_position(&self) -> i64 {
        self.get(FIELD_LOG_POSITION)
            .and_then(FieldValue::as_int)
            .unwrap_or(0)
    }

    pub fn to_json_line(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

// ---------------------------------------------------------------------------
// Reader side
// ---------------------------------------------------------------------------

/// Integer that may have been left as its raw string by the normalizer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IntField {
    Parsed(i64),
    Raw(String),
}

impl IntField {
    pub fn parsed(&self) -> Option<i64> {
        match self {
            IntField::Parsed(v) => Some(*v),
            IntField::Raw(_) => None,
        }
    }
}

impl fmt::Display for IntField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntField::Parsed(v) => write!(f, "{v}"),
            IntField::Raw(s) => f.write_str(s),
        }
    }
}

/// RFC 3339 timestamp that may have been left as its raw string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimestampField {
    Parsed(DateTime<FixedOffset>),
    Raw(String),
}

impl TimestampField {
    pub fn parse(raw: &str) -> Self {
        DateTime::parse_from_rfc3339(raw)
            .map(TimestampField::Parsed)
            .unwrap_or_else(|_| TimestampField::Raw(raw.to_string()))
    }

    pub fn instant(&self) -> Option<DateTime<Utc>> {
        match self {
            TimestampField::Parsed(at) => Some(at.with_timezone(&Utc)),
            TimestampField::Raw(_) => None,
        }
    }
}

impl fmt::Display for TimestampField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimestampField::Parsed(at) => {
                f.write_str(&format_timestamp(at, TimestampPrecision::Nanos))
            }
            TimestampField::Raw(s) => f.write_str(s),
        }
    }
}

impl Serialize for TimestampField {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TimestampField {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(TimestampField::parse(&raw))
    }
}

/// Indexed view of a normalized event. Unknown fields are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinlogEvent {
    pub event_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binlog_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_position: Option<IntField>,
    /// Second precision, from `Date`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<TimestampField>,
    /// Nanosecond precision commit time. The field name keeps the dump's spelling.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub immediate_commmit_timestamp: Option<TimestampField>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<IntField>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<IntField>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gtid_next: Option<IntField>,
}

impl BinlogEvent {
    pub fn new(event_type: impl Into<String>, binlog_file: impl Into<String>, position: i64) -> Self {
        Self {
            event_type: event_type.into(),
            binlog_file: Some(binlog_file.into()),
            log_position: Some(IntField::Parsed(position)),
            timestamp: None,
            immediate_commmit_timestamp: None,
            table: None,
            schema: None,
            gtid_next: None,
        }
    }

    /// Non-empty file name, if any.
    pub fn file(&self) -> Option<&str> {
        self.binlog_file.as_deref().filter(|f| !f.is_empty())
    }

    /// Parsed, non-zero position, if any.
    pub fn position(&self) -> Option<i64> {
        self.log_position
            .as_ref()
            .and_then(IntField::parsed)
            .filter(|p| *p != 0)
    }

    pub fn is_row_mutation(&self) -> bool {
        is_row_mutation(&self.event_type)
    }

    pub fn change_type(&self) -> Option<ChangeType> {
        ChangeType::from_event_type(&self.event_type)
    }

    /// Commit instant used for comparison: the nanosecond commit timestamp
    /// when it parsed, else the second-precision `timestamp`.
    pub fn reference_instant(&self) -> Option<DateTime<Utc>> {
        self.immediate_commmit_timestamp
            .as_ref()
            .and_then(TimestampField::instant)
            .or_else(|| self.timestamp.as_ref().and_then(TimestampField::instant))
    }

    /// Non-empty `gtid_next`, rendered as text.
    pub fn gtid(&self) -> Option<String> {
        self.gtid_next
            .as_ref()
            .map(ToString::to_string)
            .filter(|g| !g.is_empty())
    }

    pub fn with_timestamp(mut self, raw: &str) -> Self {
        self.timestamp = Some(TimestampField::parse(raw));
        self
    }

    pub fn with_commit_timestamp(mut self, raw: &str) -> Self {
        self.immediate_commmit_timestamp = Some(TimestampField::parse(raw));
        self
    }

    pub fn with_gtid(mut self, gtid: &str) -> Self {
        self.gtid_next = Some(IntField::Raw(gtid.to_string()));
        self
    }

    pub fn with_table(mut self, schema: &str, table: &str) -> Self {
        self.schema = Some(IntField::Raw(schema.to_string()));
        self.table = Some(IntField::Raw(table.to_string()));
        self
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
