//! `blr reconcile`: index the normalized binlog, stream the change-stream
//! export against it, print findings as they occur, then the summary.

use anyhow::{Context, Result};
use blr_config::{reconcile_policy_from_config, report_unused_keys, UnusedKeyPolicy};
use blr_reconcile::{
    reconcile_stream_with, render_summary, Finding, IndexLoadStats, ReconcilePolicy, ReconcileReport, RecordIndex,
};
use serde::Serialize;
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use tracing::{info, warn};

use super::{load_config, open_input};

pub struct ReconcileArgs {
    pub binlog_json: PathBuf,
    pub source_json: PathBuf,
    pub config_paths: Vec<String>,
    pub strict_config: bool,
    pub report_json: Option<PathBuf>,
}

/// Machine-readable report written by `--report-json`.
#[derive(Serialize)]
struct JsonReport<'a> {
    config_hash: &'a str,
    policy: ReconcilePolicy,
    index: IndexLoadStats,
    #[serde(flatten)]
    report: &'a ReconcileReport,
}

pub fn run(args: ReconcileArgs) -> Result<()> {
    let loaded = load_config(&args.config_paths)?;
    let unused_policy = if args.strict_config {
        UnusedKeyPolicy::Fail
    } else {
        UnusedKeyPolicy::Warn
    };
    let unused = report_unused_keys(&loaded.config_json, unused_policy)?;
    for pointer in &unused.unused_leaf_pointers {
        warn!(pointer = %pointer, "config key is not read by reconcile");
    }
    let policy = reconcile_policy_from_config(&loaded.config_json)?;

    let binlog = open_input(&args.binlog_json, "binlog json")?;
    let source = open_input(&args.source_json, "source json")?;

    println!("config_hash={}", loaded.config_hash);
    println!(
        "Loading binlog events from {}...",
        args.binlog_json.display()
    );
    let (index, stats) = RecordIndex::load(binlog)
        .with_context(|| format!("read binlog json failed: {}", args.binlog_json.display()))?;
    println!(
        "Loaded {} relevant binlog events (row mutations or XID).",
        index.len()
    );
    if stats.malformed_lines > 0 || stats.rejected_events > 0 {
        warn!(
            malformed_lines = stats.malformed_lines,
            rejected_events = stats.rejected_events,
            "binlog index is incomplete"
        );
    }

    println!(
        "Reconciling source records from {}...",
        args.source_json.display()
    );

    // Findings are only kept when the JSON report needs them.
    let keep_findings = args.report_json.is_some();
    let mut streamed: Vec<Finding> = Vec::new();
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut report = reconcile_stream_with(index, source, policy, |finding| {
        writeln!(out, "{finding}")?;
        if keep_findings {
            streamed.push(finding.clone());
        }
        Ok(())
    })
    .with_context(|| format!("reconcile source json failed: {}", args.source_json.display()))?;

    writeln!(out).context("write report failed")?;
    writeln!(out, "Reconciliation complete.").context("write report failed")?;
    render_summary(&report, &mut out).context("write report failed")?;
    out.flush().context("flush stdout failed")?;
    drop(out);

    streamed.append(&mut report.findings);
    report.findings = streamed;

    if let Some(path) = &args.report_json {
        let doc = JsonReport {
            config_hash: &loaded.config_hash,
            policy,
            index: stats,
            report: &report,
        };
        let json = serde_json::to_string_pretty(&doc).context("serialize report json failed")?;
        fs::write(path, json)
            .with_context(|| format!("write report failed: {}", path.display()))?;
        println!("report_path={}", path.display());
    }

    info!(
        verdict = %report.verdict,
        matched = report.counters.matched,
        mismatched = report.counters.mismatched,
        "reconcile complete"
    );
    Ok(())
}
