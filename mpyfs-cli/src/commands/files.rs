//! Filesystem and board-maintenance commands.

use std::io::Write as _;
use std::path::Path;

use anyhow::{Context, Result};
use console::style;
use mpyfs::device::{BOARD_PID, BOARD_VID};
use mpyfs::port::{NativePortEnumerator, Port, PortEnumerator};
use mpyfs::repl::raw::soft_reboot;
use mpyfs::{fs, runner};
use serde_json::json;

use crate::config::Config;
use crate::{Cli, open_port};

/// List serial ports, marking attached boards.
pub fn cmd_list_ports(json: bool) -> Result<()> {
    let ports = NativePortEnumerator::list_ports()?;

    if json {
        let entries: Vec<_> = ports
            .iter()
            .map(|p| {
                json!({
                    "name": p.name,
                    "vid": p.vid,
                    "pid": p.pid,
                    "product": p.product,
                    "serial_number": p.serial_number,
                    "is_board": p.vid == Some(BOARD_VID) && p.pid == Some(BOARD_PID),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if ports.is_empty() {
        eprintln!("No serial ports found");
        return Ok(());
    }
    for p in &ports {
        let board = p.vid == Some(BOARD_VID) && p.pid == Some(BOARD_PID);
        let marker = if board {
            style("(mPython board)").green().to_string()
        } else {
            String::new()
        };
        match (p.vid, p.pid) {
            (Some(vid), Some(pid)) => {
                let product = p.product.as_deref().unwrap_or("USB serial");
                println!("{}  {product} [{vid:04x}:{pid:04x}] {marker}", p.name);
            },
            _ => println!("{}  unknown type", p.name),
        }
    }
    Ok(())
}

/// List files on the board.
pub fn cmd_ls(cli: &Cli, config: &mut Config) -> Result<()> {
    let mut port = open_port(cli, config)?;
    runner::stop_program(&mut port)?;
    for name in fs::ls(&mut port)? {
        println!("{name}");
    }
    Ok(())
}

/// Download a file. `-` as the local name writes to stdout.
pub fn cmd_get(cli: &Cli, config: &mut Config, remote: &str, local: Option<&Path>) -> Result<()> {
    let mut port = open_port(cli, config)?;
    runner::stop_program(&mut port)?;
    let content = fs::get(&mut port, remote)?;

    match local {
        Some(path) if path.as_os_str() == "-" => {
            std::io::stdout().write_all(&content)?;
        },
        Some(path) => {
            std::fs::write(path, &content)
                .with_context(|| format!("failed to write {}", path.display()))?;
            success(cli, &format!("{remote} -> {} ({} bytes)", path.display(), content.len()));
        },
        None => {
            std::fs::write(remote, &content)
                .with_context(|| format!("failed to write {remote}"))?;
            success(cli, &format!("{remote} ({} bytes)", content.len()));
        },
    }
    Ok(())
}

/// Upload a local file.
pub fn cmd_put(cli: &Cli, config: &mut Config, local: &Path, remote: Option<&str>) -> Result<()> {
    let mut port = open_port(cli, config)?;
    runner::stop_program(&mut port)?;
    fs::put(&mut port, local, remote)?;
    let shown = remote
        .map(str::to_string)
        .unwrap_or_else(|| local.file_name().unwrap_or_default().to_string_lossy().into_owned());
    success(cli, &format!("{} -> {shown}", local.display()));
    Ok(())
}

/// Remove a remote file.
pub fn cmd_rm(cli: &Cli, config: &mut Config, remote: &str) -> Result<()> {
    let mut port = open_port(cli, config)?;
    runner::stop_program(&mut port)?;
    fs::rm(&mut port, remote)?;
    success(cli, &format!("removed {remote}"));
    Ok(())
}

/// Rename a remote file.
pub fn cmd_mv(cli: &Cli, config: &mut Config, from: &str, to: &str) -> Result<()> {
    let mut port = open_port(cli, config)?;
    runner::stop_program(&mut port)?;
    fs::rename(&mut port, from, to)?;
    success(cli, &format!("{from} -> {to}"));
    Ok(())
}

/// Print the boot target, if main.py is a trampoline.
pub fn cmd_boot_get(cli: &Cli, config: &mut Config) -> Result<()> {
    let mut port = open_port(cli, config)?;
    runner::stop_program(&mut port)?;
    match fs::boot_target(&mut port)? {
        Some(name) => println!("{name}"),
        None => eprintln!("main.py does not start a stored file"),
    }
    Ok(())
}

/// Point main.py at a stored file.
pub fn cmd_boot_set(cli: &Cli, config: &mut Config, file: &str) -> Result<()> {
    let mut port = open_port(cli, config)?;
    runner::stop_program(&mut port)?;
    fs::set_boot(&mut port, file)?;
    success(cli, &format!("{file} runs on boot"));
    Ok(())
}

/// Install the support library.
pub fn cmd_write_lib(cli: &Cli, config: &mut Config, local: &Path) -> Result<()> {
    let mut port = open_port(cli, config)?;
    runner::stop_program(&mut port)?;
    fs::write_lib(&mut port, local)?;
    success(cli, &format!("installed {}", fs::LIB_NAME));
    Ok(())
}

/// Show os.uname() details.
pub fn cmd_uname(cli: &Cli, config: &mut Config) -> Result<()> {
    let mut port = open_port(cli, config)?;
    runner::stop_program(&mut port)?;
    for (key, value) in fs::uname(&mut port)? {
        println!("{key}: {value}");
    }
    Ok(())
}

/// Soft-reboot the board.
pub fn cmd_reboot(cli: &Cli, config: &mut Config) -> Result<()> {
    let mut port = open_port(cli, config)?;
    runner::stop_program(&mut port)?;
    soft_reboot(&mut port)?;
    port.close()?;
    success(cli, "soft reboot sent");
    Ok(())
}

fn success(cli: &Cli, message: &str) {
    if !cli.quiet {
        eprintln!("{} {message}", style("✓").green());
    }
}
