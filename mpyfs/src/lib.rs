//! # mpyfs
//!
//! A library for controlling MicroPython boards over a serial link.
//!
//! This crate provides the core functionality for talking to an
//! mPython-class board through its REPL, including:
//!
//! - Raw-REPL protocol driving (enter/exit, command framing, response
//!   demarcation)
//! - Chunked file transfer built out of textual commands (list, get,
//!   put, remove, rename, boot-file management)
//! - Program execution outside raw mode with error classification and
//!   cooperative stop
//! - Firmware version detection from the boot banner, plus recovery via
//!   the external `esptool.py` flasher
//! - Board discovery by USB vendor/product id
//!
//! ## Features
//!
//! - `serde`: Serialization support for data types
//!
//! ## Example
//!
//! ```rust,no_run
//! use mpyfs::{device, fs};
//!
//! fn main() -> mpyfs::Result<()> {
//!     let mut port = device::open_device()?;
//!
//!     for name in fs::ls(&mut port)? {
//!         println!("{name}");
//!     }
//!     fs::put_bytes(&mut port, "blink.py", b"import mpython\n")?;
//!     fs::set_boot(&mut port, "blink.py")?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod device;
pub mod error;
pub mod firmware;
pub mod fs;
pub mod port;
pub mod repl;
pub mod runner;

#[cfg(test)]
pub(crate) mod testutil;

pub use error::{Error, Result};
pub use runner::{ExecutionResult, StopToken};
