//! Execution runner: run a program on the board outside raw mode.
//!
//! Raw-mode framing cannot carry a program that runs indefinitely and
//! prints as it goes, so the runner streams an `exec(...)` line into the
//! friendly REPL instead and only classifies the immediate response.
//! After a clean start it blocks cooperatively on a [`StopToken`] until
//! the caller wants the program interrupted.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use log::{debug, info};

use crate::error::Result;
use crate::fs::literal;
use crate::port::{self, Port};
use crate::repl::raw::interrupt_program;
use crate::repl::{EXEC_CHUNK, EXEC_CHUNK_DELAY, INTERRUPT, RAW_EXIT, SENTINEL};

/// Settle delay after the interrupt burst, before sending the command.
const PRIME_SETTLE: Duration = Duration::from_millis(500);

/// Short settle used around DTR toggles.
const LINE_SETTLE: Duration = Duration::from_millis(100);

/// Poll cadence of the cooperative wait loop.
const STOP_POLL: Duration = Duration::from_millis(100);

/// Cancellation token polled cooperatively by the runner.
///
/// Cloned handles share one flag; any holder may request the stop.
#[derive(Debug, Clone, Default)]
pub struct StopToken {
    inner: Arc<AtomicBool>,
}

impl StopToken {
    /// Fresh token in the not-stopped state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request the running program be interrupted.
    pub fn stop(&self) {
        self.inner.store(true, Ordering::SeqCst);
    }

    /// Whether a stop has been requested.
    pub fn is_stopped(&self) -> bool {
        self.inner.load(Ordering::SeqCst)
    }
}

/// Outcome of one execution request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionResult {
    /// The program started (and was later interrupted via the token).
    Success,
    /// The device printed a traceback right after the send.
    SyntaxError(String),
    /// The device ran out of memory loading the program.
    OutOfMemory {
        /// Flattened device message.
        detail: String,
        /// Bytes the failed allocation asked for, when the message says.
        size_hint: Option<usize>,
    },
}

/// Classify the immediate response to an exec send.
///
/// `MemoryError:` wins over `Traceback ` because memory pressure makes
/// the device emit both markers and the specific one must win. Neither
/// marker means the program is running.
pub fn classify_response(response: &[u8]) -> Option<ExecutionResult> {
    let text = String::from_utf8_lossy(response);

    if let Some((_, tail)) = text.split_once("MemoryError:") {
        let detail = format!("MemoryError:{}", tail.replace("\r\n", "").replace('>', ""));
        let size_hint = parse_size_hint(&detail);
        return Some(ExecutionResult::OutOfMemory { detail, size_hint });
    }
    if let Some((_, tail)) = text.split_once("Traceback ") {
        return Some(ExecutionResult::SyntaxError(format!("Traceback {tail}")));
    }
    None
}

/// Pull the allocation size out of a MicroPython memory error, e.g.
/// `memory allocation failed, allocating 8192 bytes`.
fn parse_size_hint(detail: &str) -> Option<usize> {
    let (_, rest) = detail.split_once("allocating ")?;
    let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
    digits.parse().ok()
}

/// Run a file already stored on the device.
pub fn run_file<P: Port + ?Sized>(
    port: &mut P,
    filename: &str,
    stop: &StopToken,
) -> Result<ExecutionResult> {
    info!("Running {filename}");
    let command = format!(
        "exec(open({}).read(),globals())\r\n",
        literal::py_str(&format!("./{filename}"))
    );
    run_command(port, &command, stop)
}

/// Run inline source text without storing it first.
pub fn run_source<P: Port + ?Sized>(
    port: &mut P,
    source: &str,
    stop: &StopToken,
) -> Result<ExecutionResult> {
    let normalized = source.replace("\r\n", "\n");
    let command = format!("exec({},globals())\r\n", literal::py_str(&normalized));
    run_command(port, &command, stop)
}

fn run_command<P: Port + ?Sized>(
    port: &mut P,
    command: &str,
    stop: &StopToken,
) -> Result<ExecutionResult> {
    // Priming: wake the board, leave raw mode in case a session died in
    // it, break out of whatever is running, let the prompt settle.
    port.set_dtr(true)?;
    thread::sleep(LINE_SETTLE);
    port.write_all(&[RAW_EXIT])?;
    interrupt_program(port)?;
    thread::sleep(PRIME_SETTLE);

    port::write_chunked(port, command.as_bytes(), EXEC_CHUNK, EXEC_CHUNK_DELAY)?;
    thread::sleep(LINE_SETTLE);
    port.set_dtr(false)?;

    let response = port::read_until(port, SENTINEL)?;
    if let Some(failure) = classify_response(&response) {
        debug!("Execution failed immediately: {failure:?}");
        return Ok(failure);
    }

    // The program is running. Block here until the caller signals stop,
    // then interrupt it.
    while !stop.is_stopped() {
        thread::sleep(STOP_POLL);
    }
    stop_program(port)?;
    Ok(ExecutionResult::Success)
}

/// Interrupt whatever the board is running and return it to the
/// friendly prompt. Callers issue this before starting a new session.
pub fn stop_program<P: Port + ?Sized>(port: &mut P) -> Result<()> {
    port.write_all(&[RAW_EXIT, INTERRUPT])?;
    port.flush()?;
    thread::sleep(LINE_SETTLE);
    Ok(())
}
