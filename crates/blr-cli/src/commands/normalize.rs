//! `blr normalize`: binlog text dump on stdin, one JSON event per line on stdout.

use anyhow::{Context, Result};
use blr_events::EventNormalizer;
use std::io::{self, BufWriter, Write};
use tracing::info;

pub fn run(binlog_file: &str) -> Result<()> {
    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());

    let mut normalizer = EventNormalizer::from_reader(stdin.lock(), binlog_file);
    let mut events = 0u64;
    for event in normalizer.by_ref() {
        let event = event.context("read binlog dump from stdin failed")?;
        let line = event.to_json_line().context("serialize normalized event failed")?;
        writeln!(out, "{line}").context("write stdout failed")?;
        events += 1;
    }
    out.flush().context("flush stdout failed")?;

    info!(
        binlog_file = normalizer.binlog_file(),
        events,
        warnings = normalizer.warnings().len(),
        "normalize complete"
    );
    Ok(())
}
