//! Serial port selection.
//!
//! Resolution order: explicit `--port`, configured port, attached-board
//! discovery, then an interactive pick among whatever is enumerated.
//! Non-interactive mode never prompts and fails loudly when the choice
//! is ambiguous.

use anyhow::Result;
use console::style;
use dialoguer::{Confirm, Select, theme::ColorfulTheme};
use log::debug;
use mpyfs::device;
use mpyfs::port::{NativePortEnumerator, PortEnumerator, PortInfo};

use crate::CliError;
use crate::config::Config;

/// Options for serial port selection.
#[derive(Debug, Clone, Default)]
pub struct SerialOptions {
    /// Explicit port specified via CLI.
    pub port: Option<String>,
    /// Non-interactive mode (fail if ambiguous).
    pub non_interactive: bool,
}

/// Outcome of port selection.
#[derive(Debug)]
pub struct SelectedPort {
    /// Port name/path.
    pub name: String,
    /// Whether the port came from configuration or an explicit flag
    /// (no point offering to remember those).
    pub from_config: bool,
}

fn usage_err(message: &str) -> anyhow::Error {
    // Selection failures map to exit code 2 so script callers can
    // branch on them.
    CliError::Usage(message.to_string()).into()
}

/// Select a serial port per the resolution order.
pub fn select_serial_port(options: &SerialOptions, config: &Config) -> Result<SelectedPort> {
    if let Some(port_name) = &options.port {
        return Ok(SelectedPort {
            name: port_name.clone(),
            from_config: true,
        });
    }

    if let Some(port_name) = &config.connection.serial {
        debug!("Using port from config: {port_name}");
        return Ok(SelectedPort {
            name: port_name.clone(),
            from_config: true,
        });
    }

    if let Some(board) = device::find_device()? {
        return Ok(SelectedPort {
            name: board.port_name,
            from_config: false,
        });
    }

    let ports = NativePortEnumerator::list_ports()?;
    if ports.is_empty() {
        return Err(usage_err("No serial ports found"));
    }

    if options.non_interactive {
        return select_non_interactive(ports);
    }
    select_interactive(ports)
}

fn select_non_interactive(ports: Vec<PortInfo>) -> Result<SelectedPort> {
    // Deterministic: exactly one candidate or nothing.
    if ports.len() == 1 {
        let port = ports
            .into_iter()
            .next()
            .expect("ports has exactly 1 element here");
        Ok(SelectedPort {
            name: port.name,
            from_config: false,
        })
    } else {
        Err(usage_err(
            "Multiple serial ports found; pass --port to choose one",
        ))
    }
}

fn select_interactive(ports: Vec<PortInfo>) -> Result<SelectedPort> {
    let labels: Vec<String> = ports.iter().map(describe_port).collect();
    let choice = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("Select a serial port")
        .items(&labels)
        .default(0)
        .interact_opt()
        .map_err(|_| usage_err("Port selection prompt failed"))?;

    match choice {
        Some(index) => Ok(SelectedPort {
            name: ports[index].name.clone(),
            from_config: false,
        }),
        None => Err(CliError::Cancelled("Port selection cancelled".to_string()).into()),
    }
}

/// Human-readable label for a selection entry.
fn describe_port(port: &PortInfo) -> String {
    match (port.vid, port.pid) {
        (Some(vid), Some(pid)) => {
            let product = port.product.as_deref().unwrap_or("USB serial");
            format!("{} - {product} ({vid:04x}:{pid:04x})", port.name)
        },
        _ => format!("{} - unknown type", port.name),
    }
}

/// Offer to persist the chosen port for next time.
pub fn ask_remember_port(port_name: &str, config: &mut Config) -> Result<()> {
    let remember = Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(format!("Remember {port_name} for future runs?"))
        .default(false)
        .interact_opt()
        .unwrap_or(Some(false))
        .unwrap_or(false);

    if remember {
        config.save_port(port_name)?;
        eprintln!("{} Port saved to configuration", style("✓").green());
    }
    Ok(())
}
