use std::fmt;
use std::io::{self, Write};

use chrono::{DateTime, SecondsFormat, Utc};

use crate::{Finding, ReconcileReport, Verdict};

fn rfc3339(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn or_dash(v: &Option<String>) -> &str {
    v.as_deref().unwrap_or("-")
}

/// Detail block for one finding. Timestamp and identifier mismatches span
/// several lines.
impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Finding::SourceOnly {
                line,
                key,
                database,
                table,
                change_type,
            } => write!(
                f,
                "SOURCE_ONLY: line {line}. key {key} (db: {database}, table: {table}, type: {}) -> no matching binlog event",
                or_dash(change_type)
            ),
            Finding::TimestampMismatch {
                line,
                key,
                source_timestamp_ms,
                source_at,
                binlog_at,
                delta_ms,
                event_type,
            } => {
                writeln!(f, "MISMATCH (timestamp): line {line}. key {key} (delta {delta_ms} ms)")?;
                writeln!(
                    f,
                    "  source ts: {} (unix ms: {source_timestamp_ms})",
                    rfc3339(source_at)
                )?;
                write!(f, "  binlog ts: {} (event type: {event_type})", rfc3339(binlog_at))
            }
            Finding::TimestampUnavailable {
                line,
                key,
                source_timestamp_ms,
                immediate_commit_timestamp,
                timestamp,
            } => write!(
                f,
                "ERROR (timestamp): line {line}. key {key}. could not parse binlog timestamp '{}' or '{}' (source unix ms: {source_timestamp_ms})",
                or_dash(immediate_commit_timestamp),
                or_dash(timestamp)
            ),
            Finding::GtidMismatch {
                line,
                key,
                source_gtid,
                binlog_gtid,
            } => {
                writeln!(f, "MISMATCH (gtid): line {line}. key {key}")?;
                writeln!(f, "  source gtid: {source_gtid}")?;
                write!(f, "  binlog GTID_NEXT: {binlog_gtid}")
            }
            Finding::ChangeTypeMismatch {
                line,
                key,
                source_change_type,
                binlog_event_type,
                inferred,
            } => {
                writeln!(f, "MISMATCH (change_type): line {line}. key {key}")?;
                writeln!(f, "  source change type: {source_change_type}")?;
                write!(f, "  inferred binlog change type (from {binlog_event_type}): {inferred}")
            }
            Finding::IndexOnly {
                key,
                event_type,
                schema,
                table,
                timestamp,
            } => write!(
                f,
                "INDEX_ONLY: key {key} (event: {event_type}, schema: {}, table: {}, ts: {}) -> no matching source record",
                or_dash(schema),
                or_dash(table),
                or_dash(timestamp)
            ),
        }
    }
}

/// Human-readable report: matched-side findings in stream order, the
/// index-only section, the summary counters and the verdict.
pub fn render_text<W: Write>(report: &ReconcileReport, out: &mut W) -> io::Result<()> {
    for finding in report
        .findings
        .iter()
        .filter(|f| !matches!(f, Finding::IndexOnly { .. }))
    {
        writeln!(out, "{finding}")?;
    }
    render_summary(report, out)
}

/// Everything after the stream-order findings: the index-only section, the
/// summary counters and the verdict. Other findings in `report` are ignored.
pub fn render_summary<W: Write>(report: &ReconcileReport, out: &mut W) -> io::Result<()> {
    writeln!(out)?;
    writeln!(out, "--- Unmatched Binlog Row Mutations (INDEX_ONLY) ---")?;
    let mut any_index_only = false;
    for finding in report.index_only() {
        any_index_only = true;
        writeln!(out, "{finding}")?;
    }
    if !any_index_only {
        writeln!(out, "No binlog row mutations without a matching source record.")?;
    }

    let c = &report.counters;
    writeln!(out)?;
    writeln!(out, "--- Reconciliation Summary ---")?;
    writeln!(out, "Source records processed: {}", c.records_processed)?;
    writeln!(out, "Matched by binlog key: {}", c.matched)?;
    writeln!(out, "Mismatched (within matched set): {}", c.mismatched)?;
    writeln!(out, "Source records with no binlog match: {}", c.source_only)?;
    writeln!(out, "Binlog row mutations with no source match: {}", c.index_only)?;
    writeln!(out, "Source records without join key: {}", c.rejected)?;
    writeln!(out, "Malformed source lines: {}", c.malformed_lines)?;

    writeln!(out)?;
    match report.verdict {
        Verdict::Consistent => writeln!(
            out,
            "CONCLUSION: {}. Every source record has a matching binlog event and all counted checks agree.",
            report.verdict
        ),
        Verdict::DiscrepanciesFound => writeln!(
            out,
            "CONCLUSION: WARNING - {} during reconciliation.",
            report.verdict
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ReconcileCounters;
    use blr_events::{ChangeType, CompositeKey};

    fn render(report: &ReconcileReport) -> String {
        let mut buf = Vec::new();
        render_text(report, &mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn empty_run_is_consistent() {
        let counters = ReconcileCounters::default();
        let report = ReconcileReport {
            verdict: Verdict::from_counters(&counters),
            counters,
            findings: Vec::new(),
        };
        let text = render(&report);
        assert!(text.contains("No binlog row mutations without a matching source record."));
        assert!(text.contains("Source records processed: 0"));
        assert!(text.contains("CONCLUSION: consistent."));
    }

    #[test]
    fn findings_render_in_order_with_index_only_section_last() {
        let counters = ReconcileCounters {
            records_processed: 2,
            matched: 1,
            source_only: 1,
            index_only: 1,
            ..ReconcileCounters::default()
        };
        let report = ReconcileReport {
            verdict: Verdict::from_counters(&counters),
            counters,
            findings: vec![
                Finding::IndexOnly {
                    key: CompositeKey::new("a.000001", 900),
                    event_type: "DeleteRowsEventV2".to_string(),
                    schema: Some("shop".to_string()),
                    table: None,
                    timestamp: None,
                },
                Finding::SourceOnly {
                    line: 1,
                    key: CompositeKey::new("a.000001", 4),
                    database: "shop".to_string(),
                    table: "orders".to_string(),
                    change_type: Some("INSERT".to_string()),
                },
                Finding::ChangeTypeMismatch {
                    line: 2,
                    key: CompositeKey::new("a.000001", 500),
                    source_change_type: "DELETE".to_string(),
                    binlog_event_type: "WriteRowsEventV2".to_string(),
                    inferred: ChangeType::Insert,
                },
            ],
        };
        let text = render(&report);

        let source_only = text.find("SOURCE_ONLY: line 1").unwrap();
        let change_type = text.find("MISMATCH (change_type): line 2").unwrap();
        let section = text.find("(INDEX_ONLY) ---").unwrap();
        let index_only = text.find("INDEX_ONLY: key (a.000001, 900)").unwrap();
        assert!(source_only < change_type);
        assert!(change_type < section);
        assert!(section < index_only);

        assert!(text.contains("table: -"));
        assert!(text.contains("inferred binlog change type (from WriteRowsEventV2): INSERT"));
        assert!(text.contains("CONCLUSION: WARNING - discrepancies found"));
    }

    #[test]
    fn summary_skips_stream_order_findings() {
        let counters = ReconcileCounters {
            records_processed: 1,
            source_only: 1,
            ..ReconcileCounters::default()
        };
        let report = ReconcileReport {
            verdict: Verdict::from_counters(&counters),
            counters,
            findings: vec![Finding::SourceOnly {
                line: 1,
                key: CompositeKey::new("a.000001", 4),
                database: "shop".to_string(),
                table: "orders".to_string(),
                change_type: None,
            }],
        };
        let mut buf = Vec::new();
        render_summary(&report, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(!text.contains("SOURCE_ONLY"));
        assert!(text.starts_with("\n--- Unmatched Binlog Row Mutations (INDEX_ONLY) ---"));
        assert!(text.contains("Source records with no binlog match: 1"));
    }

    #[test]
    fn timestamp_mismatch_shows_both_instants() {
        let f = Finding::TimestampMismatch {
            line: 3,
            key: CompositeKey::new("a.000001", 500),
            source_timestamp_ms: 1_704_067_205_000,
            source_at: DateTime::<Utc>::from_timestamp_millis(1_704_067_205_000).unwrap(),
            binlog_at: DateTime::<Utc>::from_timestamp_millis(1_704_067_200_000).unwrap(),
            delta_ms: 5000,
            event_type: "WriteRowsEventV2".to_string(),
        };
        let text = f.to_string();
        assert!(text.starts_with("MISMATCH (timestamp): line 3. key (a.000001, 500) (delta 5000 ms)"));
        assert!(text.contains("source ts: 2024-01-01T00:00:05Z (unix ms: 1704067205000)"));
        assert!(text.contains("binlog ts: 2024-01-01T00:00:00Z (event type: WriteRowsEventV2)"));
    }
}
