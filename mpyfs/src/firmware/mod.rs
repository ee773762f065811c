//! Firmware version detection and update advice.

pub mod recovery;

use std::thread;
use std::time::Duration;

use log::{debug, info};

use crate::error::Result;
use crate::port::{self, Port};
use crate::repl::RAW_EXIT;
use crate::repl::raw::interrupt_program;

/// Tail of the MicroPython boot banner; the version line precedes it.
pub const HELP_PROMPT: &[u8] = b"Type \"help()\" for more information.";

/// The banner names the runtime with vendor-specific capitalization, so
/// matching starts one character in.
const VERSION_MARKER: &str = "icroPython ";

/// Marker separating the version proper from its release date.
const DATE_MARKER: &str = " on ";

/// Firmware identity read from a boot banner.
///
/// An empty `version` means no firmware was detectable, which is a
/// valid probe result, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FirmwareRecord {
    /// Full version string up to the banner's semicolon, e.g.
    /// `v2.0.1 on 2020-04-10`.
    pub version: String,
    /// Release date extracted from the version string.
    pub date: String,
}

impl FirmwareRecord {
    /// Whether the probe actually found a firmware banner.
    pub fn detected(&self) -> bool {
        !self.version.is_empty()
    }

    fn undetected() -> Self {
        Self {
            version: String::new(),
            date: "None".to_string(),
        }
    }
}

/// The firmware record persisted alongside the bundled image, read from
/// the caller's configuration.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LocalFirmware {
    /// Version string of the bundled image.
    pub version: String,
    /// Release date of the bundled image.
    pub date: String,
    /// Suppresses all update advice when set.
    pub ignore: bool,
}

/// What to do about the firmware on the attached board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateAdvice {
    /// Versions match, or the user opted out.
    NoAction,
    /// Nothing detectable on the board; offer the bundled image. Wipes
    /// user files, so callers must warn before acting.
    FullReflash { release_date: String },
    /// A different firmware is installed; offer the bundled image. Also
    /// destructive, and callers must double-confirm before acting.
    Reflash {
        device_date: String,
        bundled_date: String,
    },
}

/// Extract `(version, date)` from boot banner bytes.
pub fn parse_banner(response: &[u8]) -> Option<FirmwareRecord> {
    let text = String::from_utf8_lossy(response);
    let start = text.find(VERSION_MARKER)? + VERSION_MARKER.len();
    let rest = &text[start..];
    let version = rest.split(';').next()?;
    let date = version
        .find(DATE_MARKER)
        .map(|k| &version[k + DATE_MARKER.len()..])
        .unwrap_or("");
    Some(FirmwareRecord {
        version: version.to_string(),
        date: date.to_string(),
    })
}

/// Interrupt the board and read its boot banner to identify the
/// installed firmware.
///
/// Retried once with a fresh interrupt because a stale output buffer
/// sometimes swallows the first banner. An undetectable firmware yields
/// an empty-version record.
pub fn probe<P: Port + ?Sized>(port: &mut P) -> Result<FirmwareRecord> {
    port.write_all(&[RAW_EXIT])?;
    interrupt_program(port)?;
    let response = port::read_until(port, HELP_PROMPT)?;
    if let Some(record) = parse_banner(&response) {
        info!("Detected firmware: {}", record.version);
        return Ok(record);
    }

    debug!("No banner on first probe, retrying");
    port.write_all(b"\r\x03")?;
    thread::sleep(Duration::from_millis(10));
    let response = port::read_until(port, HELP_PROMPT)?;
    match parse_banner(&response) {
        Some(record) => {
            info!("Detected firmware on retry: {}", record.version);
            Ok(record)
        },
        None => {
            info!("No firmware detected");
            Ok(FirmwareRecord::undetected())
        },
    }
}

/// Compare a probed record against the bundled one.
pub fn advise(probed: &FirmwareRecord, local: &LocalFirmware) -> UpdateAdvice {
    if local.ignore || probed.version == local.version {
        return UpdateAdvice::NoAction;
    }
    if !probed.detected() {
        return UpdateAdvice::FullReflash {
            release_date: local.date.clone(),
        };
    }
    UpdateAdvice::Reflash {
        device_date: probed.date.clone(),
        bundled_date: local.date.clone(),
    }
}
