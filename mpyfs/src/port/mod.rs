//! Port abstraction for serial communication with the board.
//!
//! The protocol layers (`repl`, `fs`, `runner`, `firmware`) are written
//! against the `Port` trait so they can be exercised with a scripted
//! in-memory port in tests; `NativePort` is the `serialport`-backed
//! implementation used against real hardware.

pub mod native;

use std::io::{Read, Write};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::Result;

/// Baud rate used by the board's USB-UART bridge.
pub const BOARD_BAUD: u32 = 115_200;

/// Default read timeout for a single blocking read.
pub const READ_TIMEOUT: Duration = Duration::from_secs(1);

/// Serial port configuration.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// Port name/path (e.g., "/dev/ttyUSB0", "COM3").
    pub port_name: String,
    /// Baud rate.
    pub baud_rate: u32,
    /// Read/write timeout.
    pub timeout: Duration,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port_name: String::new(),
            baud_rate: BOARD_BAUD,
            timeout: READ_TIMEOUT,
        }
    }
}

impl SerialConfig {
    /// Create a new configuration for the given port at the board baud rate.
    pub fn new(port_name: impl Into<String>) -> Self {
        Self {
            port_name: port_name.into(),
            ..Default::default()
        }
    }

    /// Set the timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Serial port information reported by the enumerator.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PortInfo {
    /// Port name/path.
    pub name: String,
    /// USB vendor ID (if available).
    pub vid: Option<u16>,
    /// USB product ID (if available).
    pub pid: Option<u16>,
    /// Manufacturer string (if available).
    pub manufacturer: Option<String>,
    /// Product string (if available).
    pub product: Option<String>,
    /// Serial number (if available).
    pub serial_number: Option<String>,
}

/// Unified port trait for serial communication.
///
/// Exactly one logical operation may write to a port at a time; the
/// protocol layers take `&mut` for the whole conversation so the borrow
/// checker enforces that rule.
pub trait Port: Read + Write + Send {
    /// Set the read/write timeout.
    fn set_timeout(&mut self, timeout: Duration) -> Result<()>;

    /// Get the current timeout.
    fn timeout(&self) -> Duration;

    /// Number of bytes waiting in the input buffer.
    fn bytes_to_read(&mut self) -> Result<u32>;

    /// Clear input/output buffers.
    fn clear_buffers(&mut self) -> Result<()>;

    /// Get the port name/path.
    fn name(&self) -> &str;

    /// Set DTR (Data Terminal Ready) pin state.
    fn set_dtr(&mut self, level: bool) -> Result<()>;

    /// Set RTS (Request To Send) pin state.
    fn set_rts(&mut self, level: bool) -> Result<()>;

    /// Close the port and release resources.
    ///
    /// After calling this method, the port cannot be used for further I/O.
    fn close(&mut self) -> Result<()>;
}

/// Trait for listing available serial ports.
///
/// This is separated from `Port` because it's a static operation that
/// doesn't require an open port instance.
pub trait PortEnumerator {
    /// List all available serial ports.
    fn list_ports() -> Result<Vec<PortInfo>>;
}

/// Read until `delimiter` appears, a read times out, or the port's
/// timeout elapses as a total budget.
///
/// Returns whatever was read either way; callers must check whether the
/// buffer actually ends with the delimiter. A timeout here is not an
/// error because several protocol paths tolerate a missing terminator.
/// The total budget matters when the device prints continuously: without
/// it a chatty program would keep every single-byte read alive and this
/// loop would never return.
pub fn read_until<P: Port + ?Sized>(port: &mut P, delimiter: &[u8]) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    let mut byte = [0u8; 1];
    let deadline = Instant::now() + port.timeout();

    loop {
        match port.read(&mut byte) {
            Ok(0) => break,
            Ok(_) => {
                buf.push(byte[0]);
                if buf.ends_with(delimiter) {
                    break;
                }
                if Instant::now() >= deadline {
                    break;
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => break,
            Err(e) => return Err(e.into()),
        }
    }

    Ok(buf)
}

/// Write `data` in chunks of at most `chunk` bytes with a pause between
/// chunks.
///
/// The board's receive buffer is small; a fast host writing a long
/// command in one burst overruns it and the tail of the command is lost.
pub fn write_chunked<P: Port + ?Sized>(
    port: &mut P,
    data: &[u8],
    chunk: usize,
    delay: Duration,
) -> Result<()> {
    for piece in data.chunks(chunk) {
        port.write_all(piece)?;
        thread::sleep(delay);
    }
    port.flush()?;
    Ok(())
}

/// Drain everything currently queued in the input buffer.
///
/// Polls `bytes_to_read` on a fixed cadence and keeps reading as long as
/// new bytes keep arriving; stops once the buffer stays empty or the
/// quiet deadline is exceeded. File-read commands produce output in
/// bursts after the primary response, which is why this exists.
pub fn drain_available<P: Port + ?Sized>(
    port: &mut P,
    poll: Duration,
    deadline: Duration,
) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let start = Instant::now();

    loop {
        let available = port.bytes_to_read()?;
        if available == 0 {
            break;
        }
        let mut buf = vec![0u8; available as usize];
        let n = port.read(&mut buf)?;
        out.extend_from_slice(&buf[..n]);

        if start.elapsed() >= deadline {
            break;
        }
        thread::sleep(poll);
    }

    Ok(out)
}

/// Discard all pending input bytes.
pub fn flush_input<P: Port + ?Sized>(port: &mut P) -> Result<()> {
    loop {
        let available = port.bytes_to_read()?;
        if available == 0 {
            return Ok(());
        }
        let mut buf = vec![0u8; available as usize];
        port.read(&mut buf)?;
    }
}

pub use native::{NativePort, NativePortEnumerator};
