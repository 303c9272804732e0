use std::collections::HashSet;
use std::io::{self, BufRead};

use blr_events::{BinlogEvent, ChangeType, CompositeKey};
use chrono::Duration;
use serde::Serialize;
use tracing::{debug, warn};

use crate::index::RecordIndex;
use crate::jsonl::for_each_line;
use crate::record::SourceRecord;
use crate::{
    DiscrepancyKind, Finding, ReconcileCounters, ReconcileReport, RecordOutcome, Verdict,
};

pub const DEFAULT_TIMESTAMP_TOLERANCE_MS: i64 = 100;

/// Comparison policy.
///
/// The default counts only timestamp findings toward `mismatched`; GTID and
/// change-type findings are reported but not counted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ReconcilePolicy {
    /// Inclusive: a difference of exactly this many milliseconds is consistent.
    pub timestamp_tolerance_ms: i64,
    pub count_gtid_mismatches: bool,
    pub count_change_type_mismatches: bool,
}

impl Default for ReconcilePolicy {
    fn default() -> Self {
        Self {
            timestamp_tolerance_ms: DEFAULT_TIMESTAMP_TOLERANCE_MS,
            count_gtid_mismatches: false,
            count_change_type_mismatches: false,
        }
    }
}

impl ReconcilePolicy {
    fn counts(&self, kind: DiscrepancyKind) -> bool {
        match kind {
            DiscrepancyKind::Timestamp | DiscrepancyKind::TimestampUnavailable => true,
            DiscrepancyKind::Gtid => self.count_gtid_mismatches,
            DiscrepancyKind::ChangeType => self.count_change_type_mismatches,
        }
    }
}

/// One reconciliation run: owns the index, the consumed-key set and the
/// counters. Build a fresh one per run.
#[derive(Debug)]
pub struct Reconciler {
    index: RecordIndex,
    policy: ReconcilePolicy,
    consumed: HashSet<CompositeKey>,
    counters: ReconcileCounters,
    findings: Vec<Finding>,
}

impl Reconciler {
    pub fn new(index: RecordIndex, policy: ReconcilePolicy) -> Self {
        Self {
            index,
            policy,
            consumed: HashSet::new(),
            counters: ReconcileCounters::default(),
            findings: Vec::new(),
        }
    }

    pub fn counters(&self) -> &ReconcileCounters {
        &self.counters
    }

    /// Findings produced so far and not yet drained.
    pub fn findings(&self) -> &[Finding] {
        &self.findings
    }

    /// Hand off buffered findings. A caller that drains after every
    /// [`observe`](Self::observe) keeps memory flat over the stream.
    pub fn drain_findings(&mut self) -> std::vec::Drain<'_, Finding> {
        self.findings.drain(..)
    }

    pub fn note_malformed_lines(&mut self, n: u64) {
        self.counters.malformed_lines += n;
    }

    /// Join one change-stream record against the index.
    pub fn observe(&mut self, line: usize, record: &SourceRecord) -> RecordOutcome {
        self.counters.records_processed += 1;

        let key = match record.key() {
            Ok(key) => key,
            Err(rejection) => {
                self.counters.rejected += 1;
                warn!(line, %rejection, "skipping source record without join key");
                return RecordOutcome::Rejected(rejection);
            }
        };

        let Some(event) = self.index.get(&key) else {
            self.counters.source_only += 1;
            self.findings.push(Finding::SourceOnly {
                line,
                database: record.source_metadata.database.clone(),
                table: record.source_metadata.table.clone(),
                change_type: record.change_type().map(str::to_string),
                key,
            });
            return RecordOutcome::SourceOnly;
        };

        self.counters.matched += 1;

        let found: Vec<Finding> = [
            check_timestamp(line, &key, event, record, &self.policy),
            check_gtid(line, &key, event, record),
            check_change_type(line, &key, event, record),
        ]
        .into_iter()
        .flatten()
        .collect();

        let discrepancies: Vec<DiscrepancyKind> =
            found.iter().filter_map(Finding::discrepancy).collect();
        if discrepancies.iter().any(|k| self.policy.counts(*k)) {
            self.counters.mismatched += 1;
        }
        if !discrepancies.is_empty() {
            debug!(line, %key, ?discrepancies, "matched with discrepancies");
        }

        self.findings.extend(found);
        self.consumed.insert(key);
        RecordOutcome::Matched { discrepancies }
    }

    /// Sweep the index for row mutations never joined and close the run.
    /// The report holds whatever findings were not drained, then the
    /// index-only ones.
    pub fn finish(mut self) -> ReconcileReport {
        let mut unjoined: Vec<(&CompositeKey, &BinlogEvent)> = self
            .index
            .iter()
            .filter(|(key, event)| event.is_row_mutation() && !self.consumed.contains(*key))
            .collect();
        // Stable ordering for index-only findings (deterministic output).
        unjoined.sort_by(|a, b| a.0.cmp(b.0));

        for (key, event) in unjoined {
            self.counters.index_only += 1;
            self.findings.push(Finding::IndexOnly {
                key: key.clone(),
                event_type: event.event_type.clone(),
                schema: event.schema.as_ref().map(ToString::to_string),
                table: event.table.as_ref().map(ToString::to_string),
                timestamp: event.timestamp.as_ref().map(ToString::to_string),
            });
        }

        ReconcileReport {
            verdict: Verdict::from_counters(&self.counters),
            counters: self.counters,
            findings: self.findings,
        }
    }
}

/// Stream newline-delimited change-stream records against `index`.
///
/// Only read errors are returned; malformed lines are skipped and counted.
pub fn reconcile_stream<R: BufRead>(
    index: RecordIndex,
    reader: R,
    policy: ReconcilePolicy,
) -> io::Result<ReconcileReport> {
    let mut reconciler = Reconciler::new(index, policy);
    let scan = for_each_line(reader, "source", |line, record: SourceRecord| {
        reconciler.observe(line, &record);
        Ok(())
    })?;
    reconciler.note_malformed_lines(scan.malformed);
    Ok(reconciler.finish())
}

/// Like [`reconcile_stream`], but each stream-order finding goes to `emit`
/// as soon as its record is observed and is not kept. The returned report
/// carries the counters and the index-only findings.
///
/// An error from `emit` aborts the run.
pub fn reconcile_stream_with<R, F>(
    index: RecordIndex,
    reader: R,
    policy: ReconcilePolicy,
    mut emit: F,
) -> io::Result<ReconcileReport>
where
    R: BufRead,
    F: FnMut(&Finding) -> io::Result<()>,
{
    let mut reconciler = Reconciler::new(index, policy);
    let scan = for_each_line(reader, "source", |line, record: SourceRecord| {
        reconciler.observe(line, &record);
        reconciler.drain_findings().try_for_each(|finding| emit(&finding))
    })?;
    reconciler.note_malformed_lines(scan.malformed);
    Ok(reconciler.finish())
}

// ---------------------------------------------------------------------------
// Checks
// ---------------------------------------------------------------------------

fn check_timestamp(
    line: usize,
    key: &CompositeKey,
    event: &BinlogEvent,
    record: &SourceRecord,
    policy: &ReconcilePolicy,
) -> Option<Finding> {
    let (Some(binlog_at), Some(source_at)) = (event.reference_instant(), record.source_instant())
    else {
        return Some(Finding::TimestampUnavailable {
            line,
            key: key.clone(),
            source_timestamp_ms: record.source_timestamp,
            immediate_commit_timestamp: event
                .immediate_commmit_timestamp
                .as_ref()
                .map(ToString::to_string),
            timestamp: event.timestamp.as_ref().map(ToString::to_string),
        });
    };

    let tolerance = Duration::milliseconds(policy.timestamp_tolerance_ms);
    let delta = source_at - binlog_at;
    if delta > tolerance || delta < -tolerance {
        Some(Finding::TimestampMismatch {
            line,
            key: key.clone(),
            source_timestamp_ms: record.source_timestamp,
            source_at,
            binlog_at,
            delta_ms: delta.num_milliseconds(),
            event_type: event.event_type.clone(),
        })
    } else {
        None
    }
}

/// Case-sensitive; only when both sides carry one.
fn check_gtid(
    line: usize,
    key: &CompositeKey,
    event: &BinlogEvent,
    record: &SourceRecord,
) -> Option<Finding> {
    let source_gtid = record.gtid()?;
    let binlog_gtid = event.gtid()?;
    if source_gtid == binlog_gtid {
        return None;
    }
    Some(Finding::GtidMismatch {
        line,
        key: key.clone(),
        source_gtid: source_gtid.to_string(),
        binlog_gtid,
    })
}

fn check_change_type(
    line: usize,
    key: &CompositeKey,
    event: &BinlogEvent,
    record: &SourceRecord,
) -> Option<Finding> {
    let declared = record.change_type()?;
    let inferred = ChangeType::from_event_type(&event.event_type)?;
    if inferred.matches_declared(declared) {
        return None;
    }
    Some(Finding::ChangeTypeMismatch {
        line,
        key: key.clone(),
        source_change_type: declared.to_string(),
        binlog_event_type: event.event_type.clone(),
        inferred,
    })
}
