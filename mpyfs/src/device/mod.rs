//! Board discovery over USB serial enumeration.
//!
//! The mPython board exposes a CP210x USB-to-UART bridge with a fixed
//! vendor/product id pair. Discovery is recomputed on every call because
//! boards are routinely hot-plugged; nothing here is cached.

use crate::error::Result;
use crate::port::{NativePort, NativePortEnumerator, PortEnumerator, PortInfo};
use log::{debug, info};

/// USB vendor id of the board's CP210x bridge.
pub const BOARD_VID: u16 = 0x10C4;

/// USB product id of the board's CP210x bridge.
pub const BOARD_PID: u16 = 0xEA60;

/// Serial-number prefixes of boards the bundled runtime image supports.
pub const SUPPORTED_SERIAL_PREFIXES: [u16; 2] = [9900, 9901];

/// A board found on the USB bus. Transient: valid only for the operation
/// that discovered it.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DiscoveredDevice {
    /// Port name/path (e.g., "/dev/ttyUSB0" or "COM3").
    pub port_name: String,
    /// USB serial number string, if the bridge reports one.
    pub serial_number: Option<String>,
}

impl DiscoveredDevice {
    /// Whether the board's serial-number prefix indicates a model the
    /// bundled MicroPython runtime image supports.
    pub fn supports_bundled_runtime(&self) -> bool {
        let Some(serial) = self.serial_number.as_deref() else {
            return false;
        };
        serial
            .get(..4)
            .and_then(|prefix| prefix.parse::<u16>().ok())
            .is_some_and(|prefix| SUPPORTED_SERIAL_PREFIXES.contains(&prefix))
    }
}

/// Pick the first enumerated port matching the board's VID/PID.
///
/// Pure over the supplied port list so it can be tested without hardware.
pub fn match_board(ports: &[PortInfo]) -> Option<DiscoveredDevice> {
    ports
        .iter()
        .find(|p| p.vid == Some(BOARD_VID) && p.pid == Some(BOARD_PID))
        .map(|p| DiscoveredDevice {
            port_name: p.name.clone(),
            serial_number: p.serial_number.clone(),
        })
}

/// Find an attached board.
///
/// Returns `None` when nothing matches; absence of a board is an
/// expected state, not an error.
pub fn find_device() -> Result<Option<DiscoveredDevice>> {
    let ports = NativePortEnumerator::list_ports()?;
    let found = match_board(&ports);
    match &found {
        Some(device) => info!("Found board on {}", device.port_name),
        None => debug!("No board among {} enumerated ports", ports.len()),
    }
    Ok(found)
}

/// Find an attached board and open its port with board serial settings.
pub fn open_device() -> Result<NativePort> {
    match find_device()? {
        Some(device) => NativePort::open_board(&device.port_name),
        None => Err(crate::error::Error::DeviceNotFound),
    }
}
