//! Configuration module for pype-rs
//!
//! Runtime configuration is a small TOML document:
//!
//! ```toml
//! worker_name_prefix = "pype"
//! failure_channel_capacity = 256
//!
//! [logging]
//! filter = "info,pype_rs=debug"
//! file = "logs/pype.log"
//! ansi = true
//! ```
//!
//! Every field has a default, so an empty file is a valid configuration.
//! The `RUST_LOG` environment variable takes precedence over
//! `logging.filter` when logging is initialized.

use crate::error::{PypeError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default prefix for boundary worker thread names
pub const DEFAULT_WORKER_NAME_PREFIX: &str = "pype";

/// Default capacity of the async failure channel
pub const DEFAULT_FAILURE_CHANNEL_CAPACITY: usize = 256;

/// Default log filter when `RUST_LOG` is unset
pub const DEFAULT_LOG_FILTER: &str = "info,pype_rs=debug";

/// Configuration shared by every pipeline built with it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Worker threads are named `<prefix>-<boundary name>`
    #[serde(default = "default_worker_name_prefix")]
    pub worker_name_prefix: String,

    /// How many async failure reports are buffered before new ones are dropped
    #[serde(default = "default_failure_channel_capacity")]
    pub failure_channel_capacity: usize,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_worker_name_prefix() -> String {
    DEFAULT_WORKER_NAME_PREFIX.to_string()
}

fn default_failure_channel_capacity() -> usize {
    DEFAULT_FAILURE_CHANNEL_CAPACITY
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            worker_name_prefix: default_worker_name_prefix(),
            failure_channel_capacity: DEFAULT_FAILURE_CHANNEL_CAPACITY,
            logging: LoggingConfig::default(),
        }
    }
}

impl RuntimeConfig {
    /// Parse a configuration from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| PypeError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Serialize to a TOML string
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| PypeError::Serialization(format!("Failed to serialize config: {}", e)))
    }

    /// Load a configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            PypeError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Load a configuration file, returning defaults on any error
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Save the configuration to disk as TOML
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    PypeError::Config(format!("Failed to create config directory: {}", e))
                })?;
            }
        }

        let content = self.to_toml_string()?;
        std::fs::write(path, content).map_err(|e| {
            PypeError::Config(format!("Failed to write config file {:?}: {}", path, e))
        })
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    #[serde(default = "default_log_filter")]
    pub filter: String,

    /// Also write logs to this file (without ANSI colors)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,

    /// Colored terminal output
    #[serde(default = "default_true")]
    pub ansi: bool,
}

fn default_log_filter() -> String {
    DEFAULT_LOG_FILTER.to_string()
}

fn default_true() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            file: None,
            ansi: true,
        }
    }
}
