//! Application settings

use crate::core::transport::{SerialConfig, SerialFlowControl, SerialParity};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Default baud rate for new devices
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Default record file prefix
pub const DEFAULT_PREFIX: &str = "data";

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Platform has no config directory
    #[error("Could not determine config directory")]
    NoConfigDir,

    /// No device has been saved yet
    #[error("No previously used device on file")]
    NotFound,

    /// Reading or writing the config file failed
    #[error("Config I/O error on {}: {source}", path.display())]
    Io {
        /// Config file
        path: PathBuf,
        /// Underlying cause
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML for this schema
    #[error("Invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config could not be serialized
    #[error("Cannot serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Serial device settings
    pub device: DeviceSettings,
    /// Record output settings
    pub recording: RecordingSettings,
    /// File this config was loaded from
    #[serde(skip)]
    source: Option<PathBuf>,
}

/// Serial device settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceSettings {
    /// Device used by the previous session
    pub last_device: Option<String>,
    /// Baud rate
    pub baud_rate: u32,
    /// Data bits (5 to 8)
    pub data_bits: u8,
    /// Stop bits (1 or 2)
    pub stop_bits: u8,
    /// Parity
    pub parity: SerialParity,
    /// Flow control
    pub flow_control: SerialFlowControl,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            last_device: None,
            baud_rate: DEFAULT_BAUD_RATE,
            data_bits: 8,
            stop_bits: 1,
            parity: SerialParity::None,
            flow_control: SerialFlowControl::None,
        }
    }
}

/// Record output settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingSettings {
    /// Directory for record files (current directory if unset)
    pub directory: Option<PathBuf>,
    /// Record file prefix
    pub prefix: String,
    /// Echo received data to the terminal
    pub echo: bool,
    /// Echo as hex instead of escaped text
    pub hex: bool,
}

impl Default for RecordingSettings {
    fn default() -> Self {
        Self {
            directory: None,
            prefix: DEFAULT_PREFIX.to_string(),
            echo: true,
            hex: false,
        }
    }
}

impl AppConfig {
    /// Default config file location
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        super::config_dir()
            .map(|dir| dir.join("config.toml"))
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Load config from the default location
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::default_path()?)
    }

    /// Load config from `path`; a missing file yields defaults
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            toml::from_str(&content)?
        } else {
            debug!(path = %path.display(), "No config file; using defaults");
            Self::default()
        };
        config.source = Some(path.to_path_buf());
        Ok(config)
    }

    /// Save config to the file it was loaded from, or the default location
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = match &self.source {
            Some(path) => path.clone(),
            None => Self::default_path()?,
        };
        let io_error = |source| ConfigError::Io {
            path: path.clone(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_error)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&path, content).map_err(io_error)?;
        debug!(path = %path.display(), "Config saved");
        Ok(())
    }

    /// Device used by the previous session
    pub fn load_last_device(&self) -> Result<String, ConfigError> {
        self.device
            .last_device
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(str::to_string)
            .ok_or(ConfigError::NotFound)
    }

    /// Remember `name` for the next session and persist it
    pub fn save_device(&mut self, name: &str) -> Result<(), ConfigError> {
        self.device.last_device = Some(name.trim().to_string());
        self.save()
    }

    /// Port settings for `port`; `baud_rate` overrides the configured rate
    pub fn serial_config(&self, port: &str, baud_rate: Option<u32>) -> SerialConfig {
        SerialConfig::new(port, baud_rate.unwrap_or(self.device.baud_rate))
            .data_bits(self.device.data_bits)
            .stop_bits(self.device.stop_bits)
            .parity(self.device.parity)
            .flow_control(self.device.flow_control)
    }

    /// Directory records are written to
    pub fn output_dir(&self) -> PathBuf {
        self.recording
            .directory
            .clone()
            .unwrap_or_else(|| PathBuf::from("."))
    }
}
