//! Configuration file support for mpy.
//!
//! Configuration is loaded from multiple sources with the following priority (highest first):
//! 1. Command-line arguments
//! 2. Environment variables (MPY_*)
//! 3. Local config file (./mpyfs.toml)
//! 4. Global config file (~/.config/mpyfs/config.toml)

use directories::ProjectDirs;
use log::{debug, info, warn};
use mpyfs::firmware::LocalFirmware;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Connection configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Preferred serial port (e.g., "/dev/ttyUSB0" or "COM3").
    pub serial: Option<String>,
}

/// Bundled firmware record, compared against the board during
/// check-firmware.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FirmwareConfig {
    /// Version string of the bundled image.
    pub version: Option<String>,
    /// Release date of the bundled image.
    pub date: Option<String>,
    /// Suppress firmware update advice entirely.
    #[serde(default)]
    pub ignore: bool,
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Connection settings.
    #[serde(default)]
    pub connection: ConnectionConfig,
    /// Bundled firmware record.
    #[serde(default)]
    pub firmware: FirmwareConfig,
}

impl Config {
    /// Load configuration from all available sources.
    pub fn load() -> Self {
        let mut config = Self::default();

        if let Some(global_path) = Self::global_config_path() {
            if global_path.exists() {
                if let Some(global_config) = Self::load_from_file(&global_path) {
                    debug!("Loaded global config from {}", global_path.display());
                    config.merge(global_config);
                }
            }
        }

        if let Some(local_config) = Self::load_from_file(Path::new("mpyfs.toml")) {
            debug!("Loaded local config from mpyfs.toml");
            config.merge(local_config);
        }

        config
    }

    /// Load configuration from a specific file path (--config flag).
    pub fn load_from_path(path: &Path) -> Self {
        if let Some(config) = Self::load_from_file(path) {
            debug!("Loaded config from {}", path.display());
            config
        } else {
            warn!(
                "Could not load config from {}, using defaults",
                path.display()
            );
            Self::default()
        }
    }

    fn load_from_file(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }

        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => Some(config),
                Err(e) => {
                    warn!("Failed to parse config file {}: {}", path.display(), e);
                    None
                },
            },
            Err(e) => {
                warn!("Failed to read config file {}: {}", path.display(), e);
                None
            },
        }
    }

    /// Get the global configuration directory.
    pub fn global_config_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "mpyfs").map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the global configuration file path.
    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_config_dir().map(|dir| dir.join("config.toml"))
    }

    fn merge(&mut self, other: Self) {
        if other.connection.serial.is_some() {
            self.connection.serial = other.connection.serial;
        }
        if other.firmware.version.is_some() {
            self.firmware.version = other.firmware.version;
        }
        if other.firmware.date.is_some() {
            self.firmware.date = other.firmware.date;
        }
        if other.firmware.ignore {
            self.firmware.ignore = true;
        }
    }

    /// The bundled firmware record, when the config carries one.
    pub fn local_firmware(&self) -> Option<LocalFirmware> {
        let version = self.firmware.version.clone()?;
        Some(LocalFirmware {
            version,
            date: self.firmware.date.clone().unwrap_or_default(),
            ignore: self.firmware.ignore,
        })
    }

    /// Remember the selected serial port in the local config file.
    pub fn save_port(&mut self, serial: &str) -> anyhow::Result<()> {
        self.connection.serial = Some(serial.to_string());

        let path = if Path::new("mpyfs.toml").exists() {
            PathBuf::from("mpyfs.toml")
        } else if let Some(global_dir) = Self::global_config_dir() {
            fs::create_dir_all(&global_dir)?;
            global_dir.join("config.toml")
        } else {
            PathBuf::from("mpyfs.toml")
        };

        let content = toml::to_string_pretty(self)?;
        fs::write(&path, content)?;
        info!("Saved port configuration to {}", path.display());
        Ok(())
    }
}
