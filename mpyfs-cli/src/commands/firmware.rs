//! Firmware check and recovery commands.

use std::path::Path;
use std::time::Duration;

use anyhow::{Result, bail};
use console::style;
use dialoguer::{Confirm, theme::ColorfulTheme};
use indicatif::{ProgressBar, ProgressStyle};
use mpyfs::firmware::recovery::{RecoveryEvent, Restorer, spawn_estimator};
use mpyfs::firmware::{self, UpdateAdvice};
use mpyfs::port::Port;
use mpyfs::runner::StopToken;

use crate::config::Config;
use crate::{Cli, CliError, get_port, open_port};

/// Compare the board's firmware against the configured bundled record.
pub fn cmd_check(cli: &Cli, config: &mut Config) -> Result<()> {
    let Some(local) = config.local_firmware() else {
        return Err(CliError::Usage(
            "No [firmware] record in configuration; nothing to compare against".to_string(),
        )
        .into());
    };

    let mut port = open_port(cli, config)?;
    let probed = firmware::probe(&mut port)?;
    port.close()?;

    match firmware::advise(&probed, &local) {
        UpdateAdvice::NoAction => {
            if probed.detected() {
                eprintln!(
                    "{} Firmware {} matches the bundled record",
                    style("✓").green(),
                    probed.version
                );
            } else {
                eprintln!("{} Firmware advice suppressed by config", style("✓").green());
            }
        },
        UpdateAdvice::FullReflash { release_date } => {
            eprintln!(
                "{} No onboard firmware detected. A full reflash with the bundled \
                 firmware (release date: {release_date}) is recommended.",
                style("⚠").yellow()
            );
            eprintln!("  Warning: reflashing destroys all user files.");
            eprintln!("  Run: mpy restore <image>");
        },
        UpdateAdvice::Reflash {
            device_date,
            bundled_date,
        } => {
            eprintln!(
                "{} The firmware on the board (release date: {device_date}) differs \
                 from the bundled firmware (release date: {bundled_date}).",
                style("⚠").yellow()
            );
            eprintln!("  Warning: reflashing destroys all user files.");
            eprintln!("  Run: mpy restore <image>");
        },
    }
    Ok(())
}

/// Reflash the board from an image file.
pub fn cmd_restore(cli: &Cli, config: &mut Config, image: &Path, yes: bool) -> Result<()> {
    if !image.is_file() {
        return Err(CliError::Usage(format!("No such image: {}", image.display())).into());
    }

    // The flasher opens the port itself, so only the name is resolved here.
    let port_name = get_port(cli, config)?;

    if !yes {
        confirm_destruction(cli)?;
    }

    let bar = if cli.quiet {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new(100);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{bar:40.cyan/blue}] {pos}%")
                .unwrap()
                .progress_chars("#>-"),
        );
        pb
    };

    let stop = StopToken::new();
    let mut estimator = None;
    let mut failure: Option<String> = None;

    Restorer::new(&port_name, image).run(|event| match event {
        RecoveryEvent::ToolMissing => {
            failure = Some(
                "esptool.py was not found; install esptool and make sure it is on PATH"
                    .to_string(),
            );
        },
        RecoveryEvent::AwaitingButtons => {
            if !cli.quiet {
                eprintln!(
                    "{} In the next 15 seconds, press keys A and B at once, then \
                     release both",
                    style("⏳").yellow()
                );
            }
        },
        RecoveryEvent::Started => {
            if !cli.quiet {
                eprintln!(
                    "{} Recovering the firmware, this takes about 30 seconds...",
                    style("⚙").cyan()
                );
            }
            if estimator.is_none() {
                let bar = bar.clone();
                estimator = Some(spawn_estimator(
                    stop.clone(),
                    Duration::from_secs(1),
                    move |percent| bar.set_position(u64::from(percent)),
                ));
            }
        },
        RecoveryEvent::Finished => stop.stop(),
        RecoveryEvent::Fatal(detail) => {
            failure = Some(format!("recovery failed: {detail}"));
        },
    })?;

    // The estimator's last emission is 100; stop it even if the tool
    // died without the finished line.
    stop.stop();
    if let Some(handle) = estimator {
        let _ = handle.join();
    }
    bar.finish_and_clear();

    if let Some(message) = failure {
        bail!(message);
    }
    if !cli.quiet {
        eprintln!("{} Firmware restored", style("🎉").green().bold());
    }
    Ok(())
}

/// The reflash wipes the board; insist on two explicit confirmations.
fn confirm_destruction(cli: &Cli) -> Result<()> {
    if cli.non_interactive {
        return Err(CliError::Usage(
            "restore is destructive; pass --yes to run it non-interactively".to_string(),
        )
        .into());
    }

    let theme = ColorfulTheme::default();
    let first = Confirm::with_theme(&theme)
        .with_prompt("Reflashing will destroy ALL user files on the board. Continue?")
        .default(false)
        .interact_opt()
        .unwrap_or(Some(false))
        .unwrap_or(false);
    if !first {
        return Err(CliError::Cancelled("Restore cancelled".to_string()).into());
    }

    let second = Confirm::with_theme(&theme)
        .with_prompt("WARNING: this operation will cause all user files to be lost. Really continue?")
        .default(false)
        .interact_opt()
        .unwrap_or(Some(false))
        .unwrap_or(false);
    if !second {
        return Err(CliError::Cancelled("Restore cancelled".to_string()).into());
    }
    Ok(())
}
