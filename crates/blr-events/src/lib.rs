//! blr-events
//!
//! Binlog text-dump normalization and the typed event model shared with the
//! reconciliation engine.
//!
//! - [`normalizer`] turns `=== Title ===` / `Key: value` blocks into
//!   [`NormalizedEvent`] values (writer side).
//! - [`model`] holds the field model, the event-type taxonomy, the composite
//!   join key, and the reader-side [`BinlogEvent`] view used for indexing.
//!
//! No file IO. Callers hand in a line source and the originating file name.

pub mod model;
pub mod normalizer;

pub use model::*;
pub use normalizer::{EventNormalizer, ParseWarning};
