//! Application settings

use crate::core::logger::LogFormat;
use crate::core::protocol::WireFormat;
use crate::core::transport::SerialConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// No platform config directory
    #[error("Could not determine config directory")]
    NoConfigDir,

    /// Reading or writing the file failed
    #[error("Config I/O error on {path}: {source}")]
    Io {
        /// Config file path
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// Invalid TOML
    #[error("Invalid config file {path}: {source}")]
    Parse {
        /// Config file path
        path: PathBuf,
        /// Underlying error
        source: toml::de::Error,
    },

    /// Serialization failed
    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Serial port settings
    pub serial: SerialConfig,
    /// Decoder settings
    pub decoder: DecoderSettings,
    /// Record logging settings
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load config from the default location, falling back to defaults
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = super::config_path().ok_or(ConfigError::NoConfigDir)?;

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific file
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Save config to the default location
    pub fn save(&self) -> Result<(), ConfigError> {
        let config_path = super::config_path().ok_or(ConfigError::NoConfigDir)?;
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        self.save_to(&config_path)
    }

    /// Save config to a specific file
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Decoder settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderSettings {
    /// Payload wire format
    pub wire_format: WireFormat,
    /// Delay between serial polls in milliseconds
    pub poll_interval_ms: u64,
}

impl DecoderSettings {
    /// Poll interval as a duration
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for DecoderSettings {
    fn default() -> Self {
        Self {
            wire_format: WireFormat::Packed,
            poll_interval_ms: 50,
        }
    }
}

/// Record logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log decoded records while monitoring
    pub enabled: bool,
    /// Default log directory
    pub directory: Option<PathBuf>,
    /// Default log format
    pub format: LogFormat,
    /// File name prefix
    pub file_prefix: String,
}

impl LoggingConfig {
    /// Full path for a new log file, if a directory is known
    pub fn new_log_path(&self) -> Option<PathBuf> {
        let dir = self.directory.clone().or_else(super::log_dir)?;
        Some(dir.join(crate::core::logger::generate_log_filename(
            &self.file_prefix,
            self.format,
        )))
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            directory: super::log_dir(),
            format: LogFormat::Csv,
            file_prefix: "frames".to_string(),
        }
    }
}
