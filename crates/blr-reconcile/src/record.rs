//! Change-stream record wire format.
//!
//! # Purpose
//! The change stream exports one JSON object per row change. Its metadata
//! block uses the union-type envelope of the originating serialization:
//! every nullable primitive is wrapped as `{"string": ..}`, `{"long": ..}`,
//! `{"int": ..}` or `{"boolean": ..}`, and a JSON `null` means absent.
//!
//! # Design constraints
//! - Each envelope is its own type so a record re-serializes to the same
//!   shape it was read from. Nothing is flattened on the way in.
//! - Unknown fields are ignored (`deny_unknown_fields` is NOT set) so new
//!   metadata columns do not break decoding.
//! - `payload` is source specific and kept opaque.

use std::fmt;

use blr_events::CompositeKey;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Union envelopes
// ---------------------------------------------------------------------------

/// `{"string": "..."}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnionString {
    pub string: String,
}

/// `{"long": 123}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnionLong {
    pub long: i64,
}

/// `{"int": 123}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnionInt {
    pub int: i32,
}

/// `{"boolean": true}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnionBoolean {
    pub boolean: bool,
}

impl UnionString {
    pub fn new(s: impl Into<String>) -> Self {
        Self { string: s.into() }
    }
}

fn non_empty(s: &Option<UnionString>) -> Option<&str> {
    s.as_ref()
        .map(|u| u.string.as_str())
        .filter(|v| !v.is_empty())
}

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

/// Metadata block of a change-stream record.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SourceMetadata {
    #[serde(default)]
    pub database: String,
    #[serde(default)]
    pub table: String,
    /// `INSERT` | `UPDATE` | `DELETE` (any case).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_type: Option<UnionString>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gtid: Option<UnionString>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binlog_file: Option<UnionString>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binlog_position: Option<UnionLong>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_deleted: Option<UnionBoolean>,
    #[serde(default)]
    pub primary_keys: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datastream_master_server_uuid: Option<UnionString>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datastream_master_server_id: Option<UnionLong>,
}

/// One change-stream record. Read once, compared once, dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRecord {
    /// Commit time, epoch milliseconds.
    pub source_timestamp: i64,
    pub source_metadata: SourceMetadata,
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// Why a record was excluded from the join.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyRejection {
    MissingBinlogFile,
    /// Absent or zero.
    MissingBinlogPosition,
}

impl fmt::Display for KeyRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyRejection::MissingBinlogFile => {
                write!(f, "source_metadata.binlog_file is missing or empty")
            }
            KeyRejection::MissingBinlogPosition => {
                write!(f, "source_metadata.binlog_position is missing or zero")
            }
        }
    }
}

impl std::error::Error for KeyRejection {}

impl SourceRecord {
    pub fn key(&self) -> Result<CompositeKey, KeyRejection> {
        let file = non_empty(&self.source_metadata.binlog_file)
            .ok_or(KeyRejection::MissingBinlogFile)?;
        let position = self
            .source_metadata
            .binlog_position
            .map(|p| p.long)
            .filter(|p| *p != 0)
            .ok_or(KeyRejection::MissingBinlogPosition)?;
        Ok(CompositeKey::new(file, position))
    }

    /// `None` only when the millisecond value is outside chrono's range.
    pub fn source_instant(&self) -> Option<DateTime<Utc>> {
        DateTime::<Utc>::from_timestamp_millis(self.source_timestamp)
    }

    pub fn change_type(&self) -> Option<&str> {
        non_empty(&self.source_metadata.change_type)
    }

    pub fn gtid(&self) -> Option<&str> {
        non_empty(&self.source_metadata.gtid)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
