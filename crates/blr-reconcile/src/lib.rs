//! blr-reconcile
//!
//! Binlog ↔ change-stream reconciliation.
//!
//! Architectural decisions:
//! - The normalized binlog side defines identity and is loaded eagerly into a
//!   [`RecordIndex`] keyed by `(binlog_file, position)`
//! - Change-stream records are streamed one at a time, never materialized;
//!   findings can be emitted as they occur instead of buffered
//! - A miss is a finding, never an error
//! - Malformed lines and records without a join key are skipped with a
//!   diagnostic and counted
//!
//! Pure logic over `BufRead` / `Write`. No file paths.

mod engine;
mod index;
mod jsonl;
mod record;
mod report;
mod types;

pub use engine::{
    reconcile_stream, reconcile_stream_with, ReconcilePolicy, Reconciler,
    DEFAULT_TIMESTAMP_TOLERANCE_MS,
};
pub use index::{IndexLoadStats, IndexRejection, RecordIndex};
pub use record::*;
pub use report::{render_summary, render_text};
pub use types::*;
