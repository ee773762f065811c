//! Error types for mpyfs.

use std::io;
use thiserror::Error;

/// Result type for mpyfs operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for mpyfs operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (serial port, local file operations).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serial port error.
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// No board matching the known vendor/product id is attached.
    #[error("Could not find an attached mPython board")]
    DeviceNotFound,

    /// An expected protocol sentinel or banner was not observed.
    #[error("Protocol desync: {0}")]
    Desync(String),

    /// The device executed a command and reported an error on stderr.
    #[error("{0}")]
    DeviceReported(String),

    /// Communication timeout.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// A device response (listing, banner, uname output) could not be decoded.
    #[error("Parse error: {0}")]
    Parse(String),

    /// The external flashing tool failed or could not be launched.
    #[error("External tool error: {0}")]
    ExternalTool(String),
}
