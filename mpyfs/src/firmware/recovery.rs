//! Firmware recovery via the external `esptool.py` flasher.
//!
//! The tool's stdout is the only progress channel, so its lines are
//! classified through a closed prefix table into lifecycle events. The
//! flow is asynchronous by nature: in-flight failures surface as events
//! for the caller to render, never as errors; only a launch that could
//! not happen at all is an error.

use std::io::{BufRead, BufReader};
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, info, warn};

use crate::error::{Error, Result};
use crate::runner::StopToken;

/// Baud rate the flasher drives the bootloader at.
pub const FLASH_BAUD: u32 = 1_152_000;

/// Flasher invoked on the host. Must be on `PATH`.
pub const FLASH_TOOL: &str = "esptool.py";

/// Lifecycle events derived from flasher output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryEvent {
    /// The flasher itself is not installed.
    ToolMissing,
    /// The tool is waiting on the bootloader; the user has a short
    /// window to hold the board's button combo.
    AwaitingButtons,
    /// The tool reported an unrecoverable failure.
    Fatal(String),
    /// Compression started; the long write phase is underway.
    Started,
    /// The tool hard-reset the board; flashing is complete.
    Finished,
}

/// Map one flasher output line to an event.
///
/// The prefix set is closed on purpose; unknown lines carry no
/// control-flow meaning and classify to `None`.
pub fn classify_line(line: &str) -> Option<RecoveryEvent> {
    const TABLE: [(&str, fn(&str) -> RecoveryEvent); 5] = [
        ("'esptool' ", |_| RecoveryEvent::ToolMissing),
        ("Serial port ", |_| RecoveryEvent::AwaitingButtons),
        ("A fatal error occurred: ", |rest| {
            RecoveryEvent::Fatal(rest.trim_end().to_string())
        }),
        ("Compressed ", |_| RecoveryEvent::Started),
        ("Hard resetting via RTS pin...", |_| RecoveryEvent::Finished),
    ];

    for (prefix, make) in TABLE {
        if let Some(rest) = line.strip_prefix(prefix) {
            return Some(make(rest));
        }
    }
    None
}

/// One firmware restore run.
#[derive(Debug, Clone)]
pub struct Restorer {
    port_name: String,
    image: std::path::PathBuf,
}

impl Restorer {
    /// A restore of `image` onto the board behind `port_name`.
    pub fn new(port_name: impl Into<String>, image: &Path) -> Self {
        Self {
            port_name: port_name.into(),
            image: image.to_path_buf(),
        }
    }

    /// Flash the image, feeding classified events to `on_event` as the
    /// tool makes progress. Blocks until the tool exits.
    pub fn run(&self, mut on_event: impl FnMut(RecoveryEvent)) -> Result<()> {
        info!(
            "Restoring firmware on {} from {}",
            self.port_name,
            self.image.display()
        );
        let mut child = Command::new(FLASH_TOOL)
            .arg("-p")
            .arg(&self.port_name)
            .arg("-b")
            .arg(FLASH_BAUD.to_string())
            .arg("write_flash")
            .args(["-ff=40m", "-fm=dio", "-fs=8MB", "0x0000"])
            .arg(&self.image)
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| Error::ExternalTool(format!("failed to launch {FLASH_TOOL}: {e}")))?;

        if let Some(stdout) = child.stdout.take() {
            for line in BufReader::new(stdout).lines() {
                let line = line?;
                debug!("{FLASH_TOOL}: {line}");
                if let Some(event) = classify_line(&line) {
                    on_event(event);
                }
            }
        }

        let status = child.wait()?;
        if !status.success() {
            warn!("{FLASH_TOOL} exited with {status}");
        }
        Ok(())
    }
}

/// Progress percentage estimator for the write phase.
///
/// The flasher reports no byte counts we can use, so progress is
/// approximated on a fixed cadence: 3% per tick, held at 99% until the
/// finished event lands.
#[derive(Debug, Default)]
pub struct ProgressModel {
    count: u32,
}

impl ProgressModel {
    /// Fresh model at zero percent.
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance one cadence step and return the current percentage.
    pub fn tick(&mut self) -> u8 {
        let percent = (self.count * 3).min(99) as u8;
        if self.count < 33 {
            self.count += 1;
        }
        percent
    }

    /// Final percentage once flashing is done.
    pub fn finish(&self) -> u8 {
        100
    }
}

/// Drive a [`ProgressModel`] on its own thread, emitting a percentage
/// every `cadence` until `stop` fires, then 100 as the last emission.
pub fn spawn_estimator(
    stop: StopToken,
    cadence: Duration,
    mut emit: impl FnMut(u8) + Send + 'static,
) -> JoinHandle<()> {
    thread::spawn(move || {
        let mut model = ProgressModel::new();
        while !stop.is_stopped() {
            thread::sleep(cadence);
            if stop.is_stopped() {
                break;
            }
            emit(model.tick());
        }
        emit(model.finish());
    })
}
