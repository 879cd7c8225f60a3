//! RESP client-side plumbing: request encoding, reply framing, and discovery
//! of the randomization windows inside an encoded request.
//!
//! The engine only needs to know when a reply is complete and whether it was
//! an error, so [`RespParser`] frames replies without materializing them.

use kvbench_lib::{Feed, RAND_KEY_WIDTH, ReplyParser};

const CRLF: &[u8] = b"\r\n";

/// Marker preceding a randomized key suffix, e.g. `key:rand:000000000000`.
const RAND_MARKER: &[u8] = b":rand:";

/// Encode a command as a RESP multi-bulk array. Binary-safe.
pub fn format_command<S: AsRef<[u8]>>(argv: &[S]) -> Vec<u8> {
    let mut out = Vec::with_capacity(argv.iter().map(|a| a.as_ref().len() + 16).sum());
    out.extend_from_slice(format!("*{}\r\n", argv.len()).as_bytes());
    for arg in argv {
        let arg = arg.as_ref();
        out.extend_from_slice(format!("${}\r\n", arg.len()).as_bytes());
        out.extend_from_slice(arg);
        out.extend_from_slice(CRLF);
    }
    out
}

/// Byte offsets of every randomization window in an encoded request: the
/// [`RAND_KEY_WIDTH`]-digit run immediately following a [`RAND_MARKER`].
pub fn rand_offsets(request: &[u8]) -> Vec<usize> {
    let window = RAND_MARKER.len() + RAND_KEY_WIDTH;
    let mut offsets = Vec::new();
    let mut i = 0;
    while i + window <= request.len() {
        if &request[i..i + RAND_MARKER.len()] == RAND_MARKER
            && request[i + RAND_MARKER.len()..i + window]
                .iter()
                .all(u8::is_ascii_digit)
        {
            offsets.push(i + RAND_MARKER.len());
            i += window;
        } else {
            i += 1;
        }
    }
    offsets
}

/// Incremental RESP reply framer.
///
/// Buffers partial input across feeds; a reply is complete once one whole
/// RESP object (status, error, integer, bulk, or nested multi-bulk) has been
/// seen. Error replies (`-`) are reported as complete with `is_error` set.
#[derive(Debug, Default)]
pub struct RespParser {
    buf: Vec<u8>,
}

impl ReplyParser for RespParser {
    fn feed(&mut self, bytes: &[u8]) -> Feed {
        self.buf.extend_from_slice(bytes);
        match scan_reply(&self.buf, 0) {
            Scan::Complete(end) => {
                let is_error = self.buf.first() == Some(&b'-');
                self.buf.drain(..end);
                Feed::Complete { is_error }
            }
            Scan::Incomplete => Feed::Incomplete,
            Scan::Malformed => Feed::Malformed,
        }
    }
}

enum Scan {
    /// One whole reply ends at this buffer offset.
    Complete(usize),
    Incomplete,
    Malformed,
}

enum Line {
    Parsed(i64, usize),
    Incomplete,
    Malformed,
}

fn scan_reply(buf: &[u8], pos: usize) -> Scan {
    let Some(&kind) = buf.get(pos) else {
        return Scan::Incomplete;
    };
    match kind {
        b'+' | b'-' | b':' => match find_crlf(buf, pos + 1) {
            Some(end) => Scan::Complete(end + 2),
            None => Scan::Incomplete,
        },
        b'$' => match scan_int_line(buf, pos + 1) {
            Line::Parsed(-1, after) => Scan::Complete(after),
            Line::Parsed(len, after) if len >= 0 => {
                let end = after + len as usize;
                if buf.len() < end + 2 {
                    Scan::Incomplete
                } else if &buf[end..end + 2] == CRLF {
                    Scan::Complete(end + 2)
                } else {
                    Scan::Malformed
                }
            }
            Line::Parsed(..) => Scan::Malformed,
            Line::Incomplete => Scan::Incomplete,
            Line::Malformed => Scan::Malformed,
        },
        b'*' => match scan_int_line(buf, pos + 1) {
            Line::Parsed(-1, after) => Scan::Complete(after),
            Line::Parsed(count, after) if count >= 0 => {
                let mut cursor = after;
                for _ in 0..count {
                    match scan_reply(buf, cursor) {
                        Scan::Complete(end) => cursor = end,
                        other => return other,
                    }
                }
                Scan::Complete(cursor)
            }
            Line::Parsed(..) => Scan::Malformed,
            Line::Incomplete => Scan::Incomplete,
            Line::Malformed => Scan::Malformed,
        },
        _ => Scan::Malformed,
    }
}

fn find_crlf(buf: &[u8], from: usize) -> Option<usize> {
    buf[from.min(buf.len())..]
        .windows(2)
        .position(|w| w == CRLF)
        .map(|i| from + i)
}

/// Parse a CRLF-terminated decimal, as used by `$` and `*` headers.
fn scan_int_line(buf: &[u8], from: usize) -> Line {
    let Some(end) = find_crlf(buf, from) else {
        return Line::Incomplete;
    };
    match std::str::from_utf8(&buf[from..end])
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
    {
        Some(value) => Line::Parsed(value, end + 2),
        None => Line::Malformed,
    }
}
