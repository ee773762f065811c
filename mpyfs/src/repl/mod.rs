//! Raw-REPL protocol: control bytes, framing, and the session driver.
//!
//! MicroPython's raw REPL accepts a program over the wire, echoes `OK`,
//! then replies with `\x04<stdout>\x04<stderr>\x04>`. This module holds
//! the protocol constants and the pure framing helpers; [`raw::RawRepl`]
//! drives an actual session over a [`crate::port::Port`].

pub mod raw;

use std::time::Duration;

pub use raw::RawRepl;

/// CTRL-A: enter raw mode.
pub const RAW_ENTER: u8 = 0x01;

/// CTRL-B: leave raw mode, back to the friendly REPL.
pub const RAW_EXIT: u8 = 0x02;

/// CTRL-C: interrupt the running program.
pub const INTERRUPT: u8 = 0x03;

/// CTRL-D: end of transmission. Submits a raw-mode command for
/// evaluation; outside raw mode it soft-reboots the board.
pub const EOT: u8 = 0x04;

/// Banner printed by the firmware on entering raw mode.
pub const RAW_BANNER: &[u8] = b"raw REPL; CTRL-B to exit\r\n>";

/// Terminator of a raw-mode response.
pub const SENTINEL: &[u8] = b"\x04>";

/// Chunk size for raw-mode command writes.
pub const RAW_CHUNK: usize = 32;

/// Pause between raw-mode command chunks.
pub const RAW_CHUNK_DELAY: Duration = Duration::from_millis(1);

/// Chunk size for friendly-REPL exec writes (runner path).
pub const EXEC_CHUNK: usize = 64;

/// Pause between friendly-REPL exec chunks.
pub const EXEC_CHUNK_DELAY: Duration = Duration::from_millis(10);

/// Number of interrupts sent when breaking into a running program.
pub const INTERRUPT_COUNT: usize = 3;

/// Gap between consecutive interrupts.
pub const INTERRUPT_GAP: Duration = Duration::from_millis(10);

/// Split a raw-mode response into (stdout, stderr).
///
/// The wire shape is `OK<stdout>\x04<stderr>\x04>`. The leading echo and
/// the trailing sentinel are stripped and the remainder is split on the
/// first embedded EOT. A response without the embedded EOT is treated as
/// all stdout; the device occasionally elides the stderr frame.
pub fn split_response(response: &[u8]) -> (Vec<u8>, Vec<u8>) {
    if response.len() < 4 {
        return (response.to_vec(), Vec::new());
    }
    let body = &response[2..response.len() - 2];
    match body.iter().position(|&b| b == EOT) {
        Some(pos) => (body[..pos].to_vec(), body[pos + 1..].to_vec()),
        None => (body.to_vec(), Vec::new()),
    }
}

/// Derive a one-line human message from device stderr.
///
/// A MicroPython traceback ends with the exception line followed by the
/// prompt fragment, so the second-to-last CRLF-separated line is the
/// message. Anything too short to have that shape is returned whole.
pub fn clean_error(err: &[u8]) -> String {
    if err.is_empty() {
        return "There was an error.".to_string();
    }
    let decoded = String::from_utf8_lossy(err);
    let lines: Vec<&str> = decoded.split("\r\n").collect();
    if lines.len() >= 2 {
        lines[lines.len() - 2].to_string()
    } else {
        decoded.into_owned()
    }
}

/// Flatten device stderr into host line endings, keeping every line.
pub fn format_error(err: &[u8]) -> String {
    if err.is_empty() {
        return "There was an error.".to_string();
    }
    String::from_utf8_lossy(err).replace("\r\n", "\n")
}

/// Remove the echo/sentinel marker runs that drained file reads leave
/// interleaved with payload bytes.
pub fn strip_read_markers(data: &[u8]) -> Vec<u8> {
    let mut out = data.to_vec();
    for marker in [
        b"\x04\x04>OK\x04\x04>".as_slice(),
        b"OK\x04\x04>".as_slice(),
        b"\x04\x04>".as_slice(),
    ] {
        out = replace_all(&out, marker, b"");
    }
    out
}

fn replace_all(haystack: &[u8], needle: &[u8], replacement: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(haystack.len());
    let mut i = 0;
    while i < haystack.len() {
        if haystack[i..].starts_with(needle) {
            out.extend_from_slice(replacement);
            i += needle.len();
        } else {
            out.push(haystack[i]);
            i += 1;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_response_stdout_and_stderr() {
        let (out, err) = split_response(b"OKhello\x04oops\x04>");
        assert_eq!(out, b"hello");
        assert_eq!(err, b"oops");
    }

    #[test]
    fn test_split_response_empty_frames() {
        let (out, err) = split_response(b"OK\x04\x04>");
        assert_eq!(out, b"");
        assert_eq!(err, b"");
    }

    #[test]
    fn test_split_response_missing_embedded_eot_is_all_stdout() {
        let (out, err) = split_response(b"OKraw bytes\x04>");
        assert_eq!(out, b"raw bytes");
        assert!(err.is_empty());
    }

    #[test]
    fn test_split_response_too_short() {
        let (out, err) = split_response(b">");
        assert_eq!(out, b">");
        assert!(err.is_empty());
    }

    #[test]
    fn test_clean_error_takes_exception_line() {
        let err = b"Traceback (most recent call last):\r\n  File \"<stdin>\", line 1, in <module>\r\nOSError: [Errno 2] ENOENT\r\n";
        assert_eq!(clean_error(err), "OSError: [Errno 2] ENOENT");
    }

    #[test]
    fn test_clean_error_single_line() {
        assert_eq!(clean_error(b"short"), "short");
    }

    #[test]
    fn test_clean_error_empty() {
        assert_eq!(clean_error(b""), "There was an error.");
    }

    #[test]
    fn test_format_error_normalizes_line_endings() {
        assert_eq!(format_error(b"a\r\nb\r\n"), "a\nb\n");
    }

    #[test]
    fn test_strip_read_markers() {
        let raw = b"line one\r\n\x04\x04>OK\x04\x04>line two\r\nOK\x04\x04>tail\x04\x04>";
        assert_eq!(strip_read_markers(raw), b"line one\r\nline two\r\ntail");
    }

    #[test]
    fn test_strip_read_markers_clean_input() {
        assert_eq!(strip_read_markers(b"plain"), b"plain");
    }
}
