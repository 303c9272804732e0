//! Binlog text dump → [`NormalizedEvent`] stream.
//!
//! Input grammar (one line at a time, surrounding whitespace ignored):
//! - `=== <title> ===` starts a new block and closes the previous one
//! - `<key>: <value>` updates the open block
//! - blank lines and a literal `--` are noise
//!
//! The normalizer is a single forward pass. Values that fail to parse are
//! kept as raw text and reported as a [`ParseWarning`]; they never stop the
//! stream. Bytes that are not UTF-8 are replaced and warned about the same
//! way. Only a failed read ends the stream early. The originating file's
//! basename is stamped on every event.
//!
//! It does **not**:
//! - read files (callers hand in any line source)
//! - filter event types (that is the index's job)

use std::borrow::Cow;
use std::fmt;
use std::io::{self, BufRead};
use std::mem;
use std::path::Path;

use chrono::{DateTime, FixedOffset, NaiveDateTime};
use tracing::{debug, warn};

use crate::model::{
    FieldValue, NormalizedEvent, TimestampPrecision, EVENT_GTID, EVENT_XID, FIELD_BINLOG_FILE,
    FIELD_EVENT_TYPE, FIELD_LOG_POSITION, FIELD_TIMESTAMP, ROW_MUTATION_EVENTS,
};

const BLOCK_SEPARATOR: &str = "--";
const HEADER_FENCE: &str = "===";

/// `Date: 2024-01-01 00:00:00`
const DATE_LAYOUT: &str = "%Y-%m-%d %H:%M:%S";
/// `2024-01-01 00:00:00.123456 +0000` (zone abbreviation stripped first).
const HIGH_PRECISION_LAYOUT: &str = "%Y-%m-%d %H:%M:%S%.f %z";

/// Counter-like fields the dump tool prints. They go through the same
/// lenient integer parse as every other key; a textual value is only logged.
const INTEGER_FIELDS: &[&str] = &[
    "Table",
    "Schema",
    "Query",
    "XID",
    "GTID_NEXT",
    "Commit flag",
    "LAST_COMMITTED",
    "SEQUENCE_NUMBER",
    "Transaction length",
    "Immediate server version",
    "Orignal server version",
    "TableID",
    "Flags",
    "Column count",
    "Slave proxy ID",
    "Execution time",
    "Error code",
    "server_version",
    "version",
];

// ---------------------------------------------------------------------------
// Diagnostics
// ---------------------------------------------------------------------------

/// A value that could not be parsed and was stored verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseWarning {
    /// 1-based input line number.
    pub line: usize,
    /// Key as written in the dump.
    pub key: String,
    pub value: String,
    pub reason: String,
}

impl fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "line {}: kept '{}' for key '{}' as text: {}",
            self.line, self.value, self.key, self.reason
        )
    }
}

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

enum State {
    AwaitingHeader,
    InBlock(NormalizedEvent),
}

/// Lazy, single-pass iterator of normalized events over a line source.
pub struct EventNormalizer<I> {
    lines: I,
    binlog_file: String,
    state: State,
    line_no: usize,
    warnings: Vec<ParseWarning>,
    done: bool,
}

impl<R: BufRead> EventNormalizer<io::Split<R>> {
    pub fn from_reader(reader: R, origin: impl AsRef<Path>) -> Self {
        Self::new(reader.split(b'\n'), origin)
    }
}

impl<I> EventNormalizer<I>
where
    I: Iterator<Item = io::Result<Vec<u8>>>,
{
    /// `origin` is the binlog file the dump was rendered from; only its
    /// basename is kept.
    pub fn new(lines: I, origin: impl AsRef<Path>) -> Self {
        Self {
            lines,
            binlog_file: basename(origin.as_ref()),
            state: State::AwaitingHeader,
            line_no: 0,
            warnings: Vec::new(),
            done: false,
        }
    }

    pub fn binlog_file(&self) -> &str {
        &self.binlog_file
    }

    /// Every degradation seen so far, in input order.
    pub fn warnings(&self) -> &[ParseWarning] {
        &self.warnings
    }

    /// Feed one line; returns the block it closed, if any.
    fn apply_line(&mut self, raw: &str) -> Option<NormalizedEvent> {
        let line = raw.trim();
        if line.is_empty() || line == BLOCK_SEPARATOR {
            return None;
        }

        if let Some(title) = parse_header(line) {
            let next = State::InBlock(NormalizedEvent::new(event_type_from_header(title)));
            return match mem::replace(&mut self.state, next) {
                State::InBlock(finished) => Some(self.stamp(finished)),
                State::AwaitingHeader => None,
            };
        }

        // Body lines before the first header belong to no event.
        let State::InBlock(event) = &mut self.state else {
            return None;
        };
        let (key, value) = parse_key_value(line)?;
        if let Err(reason) = apply_field(event, key, value) {
            self.record_warning(key, value, reason);
        }
        None
    }

    fn stamp(&self, mut event: NormalizedEvent) -> NormalizedEvent {
        event.insert(FIELD_BINLOG_FILE, FieldValue::Text(self.binlog_file.clone()));
        event
    }

    /// Non-UTF-8 bytes are replaced with U+FFFD; the line is still applied.
    fn record_lossy_line(&mut self, decoded: &str) {
        let line = decoded.trim();
        let (key, value) = parse_key_value(line).unwrap_or(("", line));
        self.record_warning(key, value, "invalid UTF-8 replaced with U+FFFD".to_string());
    }

    fn record_warning(&mut self, key: &str, value: &str, reason: String) {
        warn!(
            line = self.line_no,
            key,
            value,
            "{reason}; keeping raw value"
        );
        self.warnings.push(ParseWarning {
            line: self.line_no,
            key: key.to_string(),
            value: value.to_string(),
            reason,
        });
    }
}

impl<I> Iterator for EventNormalizer<I>
where
    I: Iterator<Item = io::Result<Vec<u8>>>,
{
    type Item = io::Result<NormalizedEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            match self.lines.next() {
                Some(Ok(bytes)) => {
                    self.line_no += 1;
                    let line = String::from_utf8_lossy(&bytes);
                    if let Cow::Owned(decoded) = &line {
                        self.record_lossy_line(decoded);
                    }
                    if let Some(event) = self.apply_line(&line) {
                        return Some(Ok(event));
                    }
                }
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(e));
                }
                None => {
                    self.done = true;
                    return match mem::replace(&mut self.state, State::AwaitingHeader) {
                        State::InBlock(last) => Some(Ok(self.stamp(last))),
                        State::AwaitingHeader => None,
                    };
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Line parsing
// ---------------------------------------------------------------------------

fn parse_header(line: &str) -> Option<&str> {
    let inner = line
        .strip_prefix(HEADER_FENCE)?
        .strip_suffix(HEADER_FENCE)?;
    let title = inner.strip_prefix(' ')?.strip_suffix(' ')?;
    if title.is_empty() {
        None
    } else {
        Some(title)
    }
}

/// `key: value` with a non-empty key (no colon) and non-empty value.
fn parse_key_value(line: &str) -> Option<(&str, &str)> {
    let (key, rest) = line.split_once(':')?;
    let value = rest.strip_prefix(' ')?;
    let (key, value) = (key.trim(), value.trim());
    if key.is_empty() || value.is_empty() {
        None
    } else {
        Some((key, value))
    }
}

fn row_mutation_in(text: &str) -> Option<&'static str> {
    ROW_MUTATION_EVENTS.into_iter().find(|t| text.contains(t))
}

fn event_type_from_header(title: &str) -> String {
    if let Some(t) = row_mutation_in(title) {
        return t.to_string();
    }
    let title = title.trim();
    match title.strip_suffix("Event").unwrap_or(title) {
        "Xid" | "XID" => EVENT_XID.to_string(),
        "Gtid" | "GTID" => EVENT_GTID.to_string(),
        other => other.to_string(),
    }
}

/// `Log position` → `log_position`, `GTID_NEXT` → `gtid_next`.
fn normalize_key(key: &str) -> String {
    key.replace(' ', "_").to_lowercase()
}

/// Apply one field to the open block. `Err` carries the reason a value was
/// stored verbatim.
fn apply_field(event: &mut NormalizedEvent, key: &str, value: &str) -> Result<(), String> {
    let normalized_key = normalize_key(key);

    match key {
        "Date" => match NaiveDateTime::parse_from_str(value, DATE_LAYOUT) {
            Ok(naive) => {
                event.insert(
                    FIELD_TIMESTAMP,
                    FieldValue::Timestamp {
                        at: DateTime::<FixedOffset>::from(naive.and_utc()),
                        precision: TimestampPrecision::Seconds,
                    },
                );
                Ok(())
            }
            Err(e) => {
                event.insert(normalized_key, FieldValue::Text(value.to_string()));
                Err(format!("failed to parse 'Date' timestamp: {e}"))
            }
        },

        "Log position" => match value.parse::<i64>() {
            Ok(pos) => {
                event.insert(FIELD_LOG_POSITION, FieldValue::Int(pos));
                Ok(())
            }
            Err(e) => {
                event.insert(normalized_key, FieldValue::Text(value.to_string()));
                Err(format!("failed to parse 'Log position': {e}"))
            }
        },

        "Immediate commmit timestamp" | "Orignal commmit timestamp" => {
            match parse_commit_timestamp(value) {
                Ok(at) => {
                    event.insert(
                        normalized_key,
                        FieldValue::Timestamp {
                            at,
                            precision: TimestampPrecision::Nanos,
                        },
                    );
                    Ok(())
                }
                Err(reason) => {
                    event.insert(normalized_key, FieldValue::Text(value.to_string()));
                    Err(reason)
                }
            }
        }

        "Event type" => {
            if let Some(t) = row_mutation_in(value) {
                event.insert(FIELD_EVENT_TYPE, FieldValue::Text(t.to_string()));
            }
            Ok(())
        }

        _ => {
            let parsed = FieldValue::lenient_int(value);
            if parsed.as_text().is_some() && INTEGER_FIELDS.contains(&key) {
                debug!(key, value, "counter field kept as text");
            }
            event.insert(normalized_key, parsed);
            Ok(())
        }
    }
}

/// Commit timestamps come in two encodings:
/// - `<micros> (2024-01-01T00:00:00.123456Z)`: the parenthesized RFC 3339 part
/// - `2024-01-01 00:00:00.123456 +0000 UTC`
fn parse_commit_timestamp(value: &str) -> Result<DateTime<FixedOffset>, String> {
    if value.ends_with("Z)") {
        if let Some(open) = value.rfind('(') {
            let extracted = &value[open + 1..value.len() - 1];
            return DateTime::parse_from_rfc3339(extracted).map_err(|e| {
                format!("could not parse extracted RFC 3339 timestamp '{extracted}': {e}")
            });
        }
    }
    parse_high_precision(value)
        .map_err(|e| format!("failed to parse high-precision timestamp: {e}"))
}

fn parse_high_precision(value: &str) -> Result<DateTime<FixedOffset>, chrono::ParseError> {
    // The trailing zone abbreviation duplicates the numeric offset.
    let without_abbrev = match value.rsplit_once(' ') {
        Some((head, abbrev)) if abbrev.chars().all(|c| c.is_ascii_alphabetic()) => head,
        _ => value,
    };
    DateTime::parse_from_str(without_abbrev, HIGH_PRECISION_LAYOUT)
}

fn basename(origin: &Path) -> String {
    origin
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| origin.to_string_lossy().into_owned())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
