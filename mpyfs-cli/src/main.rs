//! mpy - command-line tool for mPython boards.
//!
//! ## Features
//!
//! - Browse, upload, download, and remove files on the board
//! - Run stored or local programs with Ctrl-C stop
//! - Boot-file management and support-library installation
//! - Firmware version check and recovery flashing
//! - Interactive serial port selection
//! - Shell completion generation

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use console::style;
use env_logger::Env;
use log::debug;
use mpyfs::port::NativePort;
use thiserror::Error;

mod commands;
mod config;
mod serial;

use config::Config;
use serial::{SerialOptions, ask_remember_port, select_serial_port};

/// Failure classes with dedicated exit codes.
#[derive(Debug, Error)]
pub enum CliError {
    /// Bad invocation or ambiguous setup; exit code 2.
    #[error("{0}")]
    Usage(String),
    /// The user backed out of a prompt; exit code 130.
    #[error("{0}")]
    Cancelled(String),
}

impl CliError {
    fn exit_code(&self) -> u8 {
        match self {
            Self::Usage(_) => 2,
            Self::Cancelled(_) => 130,
        }
    }
}

/// mpy - control a MicroPython board over its serial REPL.
///
/// Environment variables:
///   MPY_PORT              - Default serial port
///   MPY_NON_INTERACTIVE   - Non-interactive mode (disable prompts)
#[derive(Parser)]
#[command(name = "mpy")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Serial port to use (auto-detected if not specified).
    #[arg(short, long, global = true, env = "MPY_PORT")]
    pub port: Option<String>,

    /// Verbose output level (-v, -vv for increasing detail).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (suppress non-essential output).
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Non-interactive mode (fail instead of prompting).
    #[arg(long, global = true, env = "MPY_NON_INTERACTIVE")]
    pub non_interactive: bool,

    /// Path to a configuration file.
    #[arg(long = "config", global = true, value_name = "PATH")]
    pub config_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// List available serial ports.
    ListPorts {
        /// Output port list as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// List files on the board.
    Ls,

    /// Download a file from the board.
    Get {
        /// Remote filename.
        remote: String,
        /// Local destination (defaults to the remote name, stdout with "-").
        local: Option<PathBuf>,
    },

    /// Upload a local file to the board.
    Put {
        /// Local file to upload.
        local: PathBuf,
        /// Remote filename (defaults to the local basename).
        remote: Option<String>,
    },

    /// Remove a file on the board.
    Rm {
        /// Remote filename.
        remote: String,
    },

    /// Rename a file on the board.
    Mv {
        /// Current remote filename.
        from: String,
        /// New remote filename.
        to: String,
    },

    /// Show or set the file run on boot.
    Boot {
        #[command(subcommand)]
        action: BootAction,
    },

    /// Install the mpython support library onto the board.
    WriteLib {
        /// Local copy of the library source.
        local: PathBuf,
    },

    /// Run a file already stored on the board (Ctrl-C to stop).
    Run {
        /// Remote filename.
        remote: String,
    },

    /// Run a local file on the board without storing it (Ctrl-C to stop).
    Exec {
        /// Local file with the source to run.
        local: PathBuf,
    },

    /// Show the board's os.uname() details.
    Uname,

    /// Soft-reboot the board.
    Reboot,

    /// Compare the board's firmware against the bundled record.
    CheckFirmware,

    /// Reflash the board with a firmware image. Destroys all user files.
    Restore {
        /// Firmware image to flash.
        image: PathBuf,
        /// Skip the confirmation prompts.
        #[arg(long)]
        yes: bool,
    },

    /// Generate shell completion scripts.
    Completions {
        /// Shell type for completions.
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Boot-file subcommands.
#[derive(Subcommand)]
enum BootAction {
    /// Print the filename main.py currently starts, if any.
    Get,
    /// Make the named file start on boot.
    Set {
        /// Remote filename to run on boot.
        file: String,
    },
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            if let Some(cli_err) = err.downcast_ref::<CliError>() {
                eprintln!("{} {cli_err}", style("Error:").red().bold());
                ExitCode::from(cli_err.exit_code())
            } else {
                eprintln!("{} {err:#}", style("Error:").red().bold());
                ExitCode::FAILURE
            }
        },
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.quiet {
        "warn"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_target(cli.verbose >= 2)
        .format_timestamp(if cli.verbose >= 2 {
            Some(env_logger::TimestampPrecision::Millis)
        } else {
            None
        })
        .init();

    debug!("mpy v{}", env!("CARGO_PKG_VERSION"));

    if std::env::var("NO_COLOR").is_ok() || !console::Term::stderr().is_term() {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    let mut config = if let Some(ref path) = cli.config_path {
        Config::load_from_path(path)
    } else {
        Config::load()
    };

    match &cli.command {
        Commands::ListPorts { json } => commands::files::cmd_list_ports(*json),
        Commands::Ls => commands::files::cmd_ls(&cli, &mut config),
        Commands::Get { remote, local } => {
            commands::files::cmd_get(&cli, &mut config, remote, local.as_deref())
        },
        Commands::Put { local, remote } => {
            commands::files::cmd_put(&cli, &mut config, local, remote.as_deref())
        },
        Commands::Rm { remote } => commands::files::cmd_rm(&cli, &mut config, remote),
        Commands::Mv { from, to } => commands::files::cmd_mv(&cli, &mut config, from, to),
        Commands::Boot { action } => match action {
            BootAction::Get => commands::files::cmd_boot_get(&cli, &mut config),
            BootAction::Set { file } => commands::files::cmd_boot_set(&cli, &mut config, file),
        },
        Commands::WriteLib { local } => commands::files::cmd_write_lib(&cli, &mut config, local),
        Commands::Run { remote } => commands::run::cmd_run(&cli, &mut config, remote),
        Commands::Exec { local } => commands::run::cmd_exec(&cli, &mut config, local),
        Commands::Uname => commands::files::cmd_uname(&cli, &mut config),
        Commands::Reboot => commands::files::cmd_reboot(&cli, &mut config),
        Commands::CheckFirmware => commands::firmware::cmd_check(&cli, &mut config),
        Commands::Restore { image, yes } => {
            commands::firmware::cmd_restore(&cli, &mut config, image, *yes)
        },
        Commands::Completions { shell } => {
            commands::completions::cmd_completions(*shell);
            Ok(())
        },
    }
}

/// Get the serial port name from CLI args, config, or discovery.
pub fn get_port(cli: &Cli, config: &mut Config) -> Result<String> {
    let options = SerialOptions {
        port: cli.port.clone(),
        non_interactive: cli.non_interactive,
    };
    let selected = select_serial_port(&options, config)?;

    if !selected.from_config && !cli.non_interactive {
        ask_remember_port(&selected.name, config)?;
    }
    Ok(selected.name)
}

/// Select a port and open it with the board's serial settings.
pub fn open_port(cli: &Cli, config: &mut Config) -> Result<NativePort> {
    let port = get_port(cli, config)?;
    if !cli.quiet {
        eprintln!("{} Using port {port}", style("🔌").cyan());
    }
    NativePort::open_board(&port).with_context(|| format!("failed to open {port}"))
}
