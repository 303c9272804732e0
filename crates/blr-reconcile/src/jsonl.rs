use std::io::{self, BufRead};

use serde::de::DeserializeOwned;
use tracing::{debug, warn};

/// Line accounting for one newline-delimited JSON pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct LineScan {
    pub lines_read: u64,
    pub malformed: u64,
}

/// Decode each non-blank line as `T` and hand it to `f` with its 1-based
/// line number.
///
/// Lines are read as bytes, so invalid UTF-8 is a malformed line like any
/// other decode failure: logged, counted, skipped. Read errors and errors
/// returned by `f` abort.
pub(crate) fn for_each_line<R, T, F>(reader: R, source: &str, mut f: F) -> io::Result<LineScan>
where
    R: BufRead,
    T: DeserializeOwned,
    F: FnMut(usize, T) -> io::Result<()>,
{
    let mut scan = LineScan::default();
    for (idx, line) in reader.split(b'\n').enumerate() {
        let line = line?;
        let line_no = idx + 1;
        scan.lines_read += 1;

        if line.iter().all(u8::is_ascii_whitespace) {
            debug!(source, line = line_no, "blank line");
            continue;
        }

        match serde_json::from_slice::<T>(&line) {
            Ok(value) => f(line_no, value)?,
            Err(e) => {
                scan.malformed += 1;
                warn!(source, line = line_no, error = %e, "skipping malformed JSON line");
            }
        }
    }
    Ok(scan)
}
