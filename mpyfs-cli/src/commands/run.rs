//! Program execution commands with Ctrl-C stop.

use std::path::Path;

use anyhow::{Context, Result, bail};
use console::style;
use mpyfs::runner::{self, ExecutionResult, StopToken};

use crate::config::Config;
use crate::{Cli, open_port};

/// Run a file already stored on the board.
pub fn cmd_run(cli: &Cli, config: &mut Config, remote: &str) -> Result<()> {
    let mut port = open_port(cli, config)?;
    let stop = arm_ctrlc()?;
    if !cli.quiet {
        eprintln!(
            "{} Running {remote} (press Ctrl-C to stop)",
            style("▶").cyan()
        );
    }
    report(cli, runner::run_file(&mut port, remote, &stop)?)
}

/// Run a local file on the board without storing it.
pub fn cmd_exec(cli: &Cli, config: &mut Config, local: &Path) -> Result<()> {
    let source = std::fs::read_to_string(local)
        .with_context(|| format!("failed to read {}", local.display()))?;

    let mut port = open_port(cli, config)?;
    let stop = arm_ctrlc()?;
    if !cli.quiet {
        eprintln!(
            "{} Running {} (press Ctrl-C to stop)",
            style("▶").cyan(),
            local.display()
        );
    }
    report(cli, runner::run_source(&mut port, &source, &stop)?)
}

fn report(cli: &Cli, result: ExecutionResult) -> Result<()> {
    match result {
        ExecutionResult::Success => {
            if !cli.quiet {
                eprintln!("{} Program stopped", style("✓").green());
            }
            Ok(())
        },
        ExecutionResult::SyntaxError(detail) => {
            bail!("the board reported an error:\n{}", detail.replace("\r\n", "\n"));
        },
        ExecutionResult::OutOfMemory { detail, size_hint } => match size_hint {
            Some(bytes) => bail!(
                "MemoryError: memory allocation failed, allocating {bytes} bytes"
            ),
            None => bail!("{detail}"),
        },
    }
}

/// Route Ctrl-C into a stop token the runner polls.
fn arm_ctrlc() -> Result<StopToken> {
    let stop = StopToken::new();
    let handler = stop.clone();
    ctrlc::set_handler(move || handler.stop())
        .context("failed to install Ctrl-C handler")?;
    Ok(stop)
}
