use std::fmt;

use blr_events::{ChangeType, CompositeKey};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::record::KeyRejection;

/// Which consistency check a matched pair failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiscrepancyKind {
    Timestamp,
    /// Neither binlog timestamp parsed; an error condition, not a drift.
    TimestampUnavailable,
    Gtid,
    ChangeType,
}

/// Per-record result of the join.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RecordOutcome {
    /// No usable join key; excluded from matched / unmatched accounting.
    Rejected(KeyRejection),
    SourceOnly,
    /// Empty `discrepancies` means consistent.
    Matched { discrepancies: Vec<DiscrepancyKind> },
}

impl RecordOutcome {
    pub fn is_consistent_match(&self) -> bool {
        matches!(self, RecordOutcome::Matched { discrepancies } if discrepancies.is_empty())
    }
}

/// One reportable observation.
///
/// `line` is the 1-based line of the change-stream record that produced it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Finding {
    SourceOnly {
        line: usize,
        key: CompositeKey,
        database: String,
        table: String,
        change_type: Option<String>,
    },
    TimestampMismatch {
        line: usize,
        key: CompositeKey,
        source_timestamp_ms: i64,
        source_at: DateTime<Utc>,
        binlog_at: DateTime<Utc>,
        delta_ms: i64,
        event_type: String,
    },
    TimestampUnavailable {
        line: usize,
        key: CompositeKey,
        source_timestamp_ms: i64,
        immediate_commit_timestamp: Option<String>,
        timestamp: Option<String>,
    },
    GtidMismatch {
        line: usize,
        key: CompositeKey,
        source_gtid: String,
        binlog_gtid: String,
    },
    ChangeTypeMismatch {
        line: usize,
        key: CompositeKey,
        source_change_type: String,
        binlog_event_type: String,
        inferred: ChangeType,
    },
    IndexOnly {
        key: CompositeKey,
        event_type: String,
        schema: Option<String>,
        table: Option<String>,
        timestamp: Option<String>,
    },
}

impl Finding {
    pub fn key(&self) -> &CompositeKey {
        match self {
            Finding::SourceOnly { key, .. }
            | Finding::TimestampMismatch { key, .. }
            | Finding::TimestampUnavailable { key, .. }
            | Finding::GtidMismatch { key, .. }
            | Finding::ChangeTypeMismatch { key, .. }
            | Finding::IndexOnly { key, .. } => key,
        }
    }

    /// `None` for the two unmatched categories.
    pub fn discrepancy(&self) -> Option<DiscrepancyKind> {
        match self {
            Finding::TimestampMismatch { .. } => Some(DiscrepancyKind::Timestamp),
            Finding::TimestampUnavailable { .. } => Some(DiscrepancyKind::TimestampUnavailable),
            Finding::GtidMismatch { .. } => Some(DiscrepancyKind::Gtid),
            Finding::ChangeTypeMismatch { .. } => Some(DiscrepancyKind::ChangeType),
            Finding::SourceOnly { .. } | Finding::IndexOnly { .. } => None,
        }
    }
}

/// Run counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileCounters {
    /// Decoded change-stream records, rejected ones included.
    pub records_processed: u64,
    pub matched: u64,
    /// Matched records with at least one counted discrepancy.
    pub mismatched: u64,
    pub source_only: u64,
    pub index_only: u64,
    /// Records without a usable join key.
    pub rejected: u64,
    pub malformed_lines: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Consistent,
    DiscrepanciesFound,
}

impl Verdict {
    pub fn from_counters(c: &ReconcileCounters) -> Self {
        if c.mismatched == 0 && c.source_only == 0 && c.index_only == 0 {
            Verdict::Consistent
        } else {
            Verdict::DiscrepanciesFound
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Consistent => f.write_str("consistent"),
            Verdict::DiscrepanciesFound => f.write_str("discrepancies found"),
        }
    }
}

/// Full report. Findings are in stream order, index-only findings last.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub counters: ReconcileCounters,
    pub findings: Vec<Finding>,
    pub verdict: Verdict,
}

impl ReconcileReport {
    pub fn is_consistent(&self) -> bool {
        self.verdict == Verdict::Consistent
    }

    pub fn findings_of(&self, kind: DiscrepancyKind) -> impl Iterator<Item = &Finding> {
        self.findings
            .iter()
            .filter(move |f| f.discrepancy() == Some(kind))
    }

    pub fn source_only(&self) -> impl Iterator<Item = &Finding> {
        self.findings
            .iter()
            .filter(|f| matches!(f, Finding::SourceOnly { .. }))
    }

    pub fn index_only(&self) -> impl Iterator<Item = &Finding> {
        self.findings
            .iter()
            .filter(|f| matches!(f, Finding::IndexOnly { .. }))
    }
}
