//! Configuration module
//!
//! Handles persisted settings such as the last used device

mod settings;

pub use settings::{
    AppConfig, ConfigError, DeviceSettings, RecordingSettings, DEFAULT_BAUD_RATE, DEFAULT_PREFIX,
};

use directories::ProjectDirs;
use std::path::PathBuf;

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "serlog", "Serlog")
}

/// Get the application configuration directory
pub fn config_dir() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the application data directory
pub fn data_dir() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.data_dir().to_path_buf())
}

/// Get the diagnostic log directory
pub fn log_dir() -> Option<PathBuf> {
    data_dir().map(|d| d.join("logs"))
}
