//! Raw-REPL session driver.

use std::thread;
use std::time::Duration;

use log::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::port::{self, Port};
use crate::repl::{
    EOT, INTERRUPT, INTERRUPT_COUNT, INTERRUPT_GAP, RAW_BANNER, RAW_CHUNK, RAW_CHUNK_DELAY,
    RAW_ENTER, RAW_EXIT, SENTINEL, clean_error, split_response, strip_read_markers,
};

/// Quiet deadline for draining burst output after file reads.
const DRAIN_DEADLINE: Duration = Duration::from_secs(2);

/// Poll cadence while draining.
const DRAIN_POLL: Duration = Duration::from_millis(100);

/// Settle delay after mode transitions.
const SETTLE: Duration = Duration::from_millis(10);

/// Send CR + CTRL-C a few times to break out of whatever the board is
/// running. One interrupt is not always enough to escape a tight loop.
pub(crate) fn interrupt_program<P: Port + ?Sized>(port: &mut P) -> Result<()> {
    for _ in 0..INTERRUPT_COUNT {
        port.write_all(&[b'\r', INTERRUPT])?;
        thread::sleep(INTERRUPT_GAP);
    }
    Ok(())
}

/// Soft-reboot the board with a single CTRL-D outside raw mode.
pub fn soft_reboot<P: Port + ?Sized>(port: &mut P) -> Result<()> {
    port.write_all(&[EOT])?;
    port.flush()?;
    Ok(())
}

/// An active raw-mode conversation.
///
/// Mutably borrows the port for its whole lifetime, so the borrow
/// checker rules out a second concurrent conversation. Raw mode is left
/// on every path: explicitly via [`RawRepl::exit`], or best-effort on
/// drop.
pub struct RawRepl<'a, P: Port + ?Sized> {
    port: &'a mut P,
    active: bool,
}

impl<'a, P: Port + ?Sized> RawRepl<'a, P> {
    /// Enter raw mode, tolerating a missing banner.
    ///
    /// Some boards swallow the banner when their output buffer holds
    /// stale bytes; the commands still work, so the default path logs
    /// and proceeds.
    pub fn enter(port: &'a mut P) -> Result<Self> {
        Self::enter_inner(port, false)
    }

    /// Enter raw mode, failing with [`Error::Desync`] when the banner
    /// does not arrive.
    pub fn enter_strict(port: &'a mut P) -> Result<Self> {
        Self::enter_inner(port, true)
    }

    fn enter_inner(port: &'a mut P, strict: bool) -> Result<Self> {
        // Leave raw mode first in case a previous session died in it.
        port.write_all(&[RAW_EXIT])?;
        interrupt_program(port)?;
        port::flush_input(port)?;
        port.write_all(&[b'\r', RAW_ENTER])?;

        let banner = port::read_until(port, RAW_BANNER)?;
        if !banner.ends_with(RAW_BANNER) {
            if strict {
                return Err(Error::Desync(format!(
                    "raw mode banner not seen, got {} bytes",
                    banner.len()
                )));
            }
            warn!("Raw mode banner not seen ({} bytes), proceeding", banner.len());
        }
        // The firmware repeats the banner once it has settled.
        let second = port::read_until(port, RAW_BANNER)?;
        if !second.ends_with(RAW_BANNER) {
            trace!("No second banner ({} bytes)", second.len());
        }
        port::read_until(port, SENTINEL)?;
        thread::sleep(SETTLE);

        Ok(Self { port, active: true })
    }

    /// Light re-entry into raw mode without the banner handshake.
    ///
    /// Directory and statement commands leave the parser in a state
    /// where a plain CTRL-D submit is unreliable; re-arming before them
    /// keeps the sentinel framing intact.
    pub fn rearm(&mut self) -> Result<()> {
        self.port.write_all(&[RAW_EXIT])?;
        interrupt_program(self.port)?;
        self.port.write_all(&[b'\r', RAW_ENTER])?;
        port::read_until(self.port, SENTINEL)?;
        Ok(())
    }

    /// Submit one command and return its stdout.
    ///
    /// Non-empty stderr leaves raw mode and fails the call with the
    /// cleaned device message.
    pub fn exec(&mut self, command: &str) -> Result<Vec<u8>> {
        if command.starts_with("import os;") {
            self.rearm()?;
        }
        trace!("exec: {command}");
        port::write_chunked(self.port, command.as_bytes(), RAW_CHUNK, RAW_CHUNK_DELAY)?;
        self.port.write_all(&[EOT])?;

        let response = port::read_until(self.port, SENTINEL)?;
        if !response.ends_with(SENTINEL) {
            warn!("Response sentinel not seen ({} bytes)", response.len());
        }
        let (out, err) = split_response(&response);
        if !err.is_empty() {
            let message = clean_error(&err);
            debug!("Device reported: {message}");
            self.leave()?;
            return Err(Error::DeviceReported(message));
        }
        Ok(out)
    }

    /// Run a batch of commands and return the concatenated stdout.
    ///
    /// With `drain`, burst output arriving after the last sentinel is
    /// collected too and the interleaved echo markers are removed; file
    /// reads need this because their payload outruns the framing.
    pub fn exec_batch(&mut self, commands: &[String], drain: bool) -> Result<Vec<u8>> {
        let mut result = Vec::new();
        for command in commands {
            result.extend_from_slice(&self.exec(command)?);
        }
        if drain {
            let burst = port::drain_available(self.port, DRAIN_POLL, DRAIN_DEADLINE)?;
            result.extend_from_slice(&burst);
            result = strip_read_markers(&result);
        }
        Ok(result)
    }

    /// Leave raw mode and end the session.
    pub fn exit(mut self) -> Result<()> {
        thread::sleep(SETTLE);
        self.leave()
    }

    fn leave(&mut self) -> Result<()> {
        if self.active {
            self.port.write_all(&[RAW_EXIT])?;
            self.port.flush()?;
            self.active = false;
        }
        Ok(())
    }
}

impl<P: Port + ?Sized> Drop for RawRepl<'_, P> {
    fn drop(&mut self) {
        if self.active {
            let _ = self.port.write_all(&[RAW_EXIT]);
        }
    }
}

/// Run one complete raw-mode conversation: enter, execute the batch,
/// leave.
pub fn run_batch<P: Port + ?Sized>(
    port: &mut P,
    commands: &[String],
    drain: bool,
) -> Result<Vec<u8>> {
    let mut repl = RawRepl::enter(port)?;
    let result = repl.exec_batch(commands, drain)?;
    repl.exit()?;
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::MockPort;

    fn enter_script() -> Vec<u8> {
        let mut script = Vec::new();
        script.extend_from_slice(RAW_BANNER);
        script.extend_from_slice(RAW_BANNER);
        script.extend_from_slice(SENTINEL);
        script
    }

    #[test]
    fn test_enter_preamble_bytes() {
        let mut port = MockPort::new().with_response(&enter_script());
        let repl = RawRepl::enter(&mut port).unwrap();
        drop(repl);
        assert!(
            port.written
                .starts_with(b"\x02\r\x03\r\x03\r\x03\r\x01")
        );
        // Drop leaves raw mode.
        assert_eq!(port.written.last(), Some(&RAW_EXIT));
    }

    #[test]
    fn test_enter_strict_without_banner() {
        let mut port = MockPort::new();
        match RawRepl::enter_strict(&mut port) {
            Err(Error::Desync(_)) => {},
            Err(other) => panic!("expected desync, got {other:?}"),
            Ok(_) => panic!("expected desync, got a session"),
        }
    }

    #[test]
    fn test_enter_tolerates_missing_banner() {
        let mut port = MockPort::new();
        assert!(RawRepl::enter(&mut port).is_ok());
    }

    #[test]
    fn test_exec_batch_collects_stdout() {
        let mut port = MockPort::new()
            .with_response(&enter_script())
            .with_response(b"OKhello\r\n\x04\x04>");

        let out = run_batch(&mut port, &["print('hello')".to_string()], false).unwrap();
        assert_eq!(out, b"hello\r\n");
        assert!(port.written_str().contains("print('hello')"));
        assert_eq!(port.written.last(), Some(&RAW_EXIT));
    }

    #[test]
    fn test_exec_rearms_for_statement_commands() {
        let mut port = MockPort::new()
            .with_response(&enter_script())
            .with_response(SENTINEL) // rearm ack
            .with_response(b"OK['a.py']\r\n\x04\x04>");

        let out =
            run_batch(&mut port, &["import os;print(os.listdir())".to_string()], false).unwrap();
        assert_eq!(out, b"['a.py']\r\n");
        // Two raw-mode entries: initial plus the rearm.
        let entries = port.written.iter().filter(|&&b| b == 0x01).count();
        assert_eq!(entries, 2);
    }

    #[test]
    fn test_stderr_fails_batch_after_leaving_raw_mode() {
        let mut port = MockPort::new()
            .with_response(&enter_script())
            .with_response(SENTINEL) // rearm ack
            .with_response(
                b"OK\x04Traceback (most recent call last):\r\nOSError: [Errno 2] ENOENT\r\n\x04>",
            );

        let err = run_batch(&mut port, &["import os;os.remove('x')".to_string()], false);
        match err {
            Err(Error::DeviceReported(msg)) => {
                assert_eq!(msg, "OSError: [Errno 2] ENOENT");
            },
            other => panic!("expected device error, got {other:?}"),
        }
        assert_eq!(port.written.last(), Some(&RAW_EXIT));
    }

    #[test]
    fn test_exec_batch_drains_and_strips_markers() {
        // The burst after the sentinel belongs to the same submit, so it
        // rides in the same segment and is picked up by the drain.
        let mut port = MockPort::new()
            .with_response(&enter_script())
            .with_response(b"OKpayload \x04\x04>more\x04\x04>OK\x04\x04> bytes");

        let out = run_batch(&mut port, &["print(f.read())".to_string()], true).unwrap();
        assert_eq!(out, b"payload more bytes");
    }

    #[test]
    fn test_soft_reboot_sends_eot() {
        let mut port = MockPort::new();
        soft_reboot(&mut port).unwrap();
        assert_eq!(port.written, vec![EOT]);
    }
}
