//! Scripted in-memory port for protocol tests.

use std::collections::VecDeque;
use std::io::{Read, Write};
use std::time::Duration;

use crate::error::Result;
use crate::port::Port;
use crate::repl::{EOT, RAW_ENTER};

/// A `Port` whose "device side" is a pre-loaded byte script.
///
/// Bytes fed with [`MockPort::feed`] are readable immediately. Staged
/// responses ([`MockPort::with_response`]) become readable only after
/// the next submit write (CTRL-A or CTRL-D), matching when a real board
/// produces them; this keeps them out of reach of the input flush that
/// precedes raw-mode entry. Writes and modem-line changes are recorded
/// for assertion.
pub struct MockPort {
    rx: VecDeque<u8>,
    staged: VecDeque<Vec<u8>>,
    pub written: Vec<u8>,
    pub lines: Vec<(&'static str, bool)>,
    pub cleared: usize,
    timeout: Duration,
}

impl Default for MockPort {
    fn default() -> Self {
        Self::new()
    }
}

impl MockPort {
    pub fn new() -> Self {
        Self {
            rx: VecDeque::new(),
            staged: VecDeque::new(),
            written: Vec::new(),
            lines: Vec::new(),
            cleared: 0,
            timeout: Duration::from_secs(1),
        }
    }

    /// Append bytes the device has already "sent"; readable at once.
    pub fn feed(&mut self, data: &[u8]) {
        self.rx.extend(data.iter().copied());
    }

    #[must_use]
    pub fn with_rx(mut self, data: &[u8]) -> Self {
        self.feed(data);
        self
    }

    /// Stage one response segment, released by the next submit write.
    pub fn stage(&mut self, data: &[u8]) {
        self.staged.push_back(data.to_vec());
    }

    #[must_use]
    pub fn with_response(mut self, data: &[u8]) -> Self {
        self.stage(data);
        self
    }

    /// Writes observed so far, decoded lossily for assertions.
    pub fn written_str(&self) -> String {
        String::from_utf8_lossy(&self.written).into_owned()
    }
}

impl Read for MockPort {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.rx.is_empty() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "script exhausted",
            ));
        }
        let mut n = 0;
        while n < buf.len() {
            match self.rx.pop_front() {
                Some(b) => {
                    buf[n] = b;
                    n += 1;
                },
                None => break,
            }
        }
        Ok(n)
    }
}

impl Write for MockPort {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.written.extend_from_slice(buf);
        if buf.contains(&RAW_ENTER) || buf.contains(&EOT) {
            if let Some(segment) = self.staged.pop_front() {
                self.rx.extend(segment);
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Port for MockPort {
    fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        self.timeout = timeout;
        Ok(())
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn bytes_to_read(&mut self) -> Result<u32> {
        Ok(self.rx.len() as u32)
    }

    fn clear_buffers(&mut self) -> Result<()> {
        self.cleared += 1;
        self.rx.clear();
        Ok(())
    }

    fn name(&self) -> &str {
        "mock"
    }

    fn set_dtr(&mut self, level: bool) -> Result<()> {
        self.lines.push(("dtr", level));
        Ok(())
    }

    fn set_rts(&mut self, level: bool) -> Result<()> {
        self.lines.push(("rts", level));
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::flush_input;
    use crate::repl::INTERRUPT;

    #[test]
    fn test_staged_response_survives_input_flush() {
        let mut port = MockPort::new().with_response(b"hello>");

        // The pre-entry housekeeping writes must not release the
        // response, so the flush finds nothing to discard.
        port.write_all(&[b'\r', INTERRUPT]).unwrap();
        flush_input(&mut port).unwrap();
        assert!(port.read(&mut [0u8; 8]).is_err());

        port.write_all(&[b'\r', RAW_ENTER]).unwrap();
        let mut buf = [0u8; 8];
        let n = port.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"hello>");
    }

    #[test]
    fn test_staged_segments_release_in_order() {
        let mut port = MockPort::new()
            .with_response(b"first")
            .with_response(b"second");

        port.write_all(&[RAW_ENTER]).unwrap();
        let mut buf = [0u8; 8];
        let n = port.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"first");

        port.write_all(&[EOT]).unwrap();
        let n = port.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"second");
    }
}
