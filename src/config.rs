//! Layered sidecar configuration.
//!
//! Sources, highest priority first:
//! 1. `SCHOLARD_*` environment variables (`__` separates sections, e.g.
//!    `SCHOLARD_LOGGING__FORMAT=json`)
//! 2. `scholard.toml` in the working directory, or the file named by
//!    `SCHOLARD_CONFIG`
//! 3. Built-in defaults

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

pub const CONFIG_FILE_NAME: &str = "scholard.toml";
pub const CONFIG_PATH_ENV: &str = "SCHOLARD_CONFIG";
pub const ENV_PREFIX: &str = "SCHOLARD_";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration error: {0}")]
    Figment(#[from] Box<figment::Error>),

    #[error("invalid configuration value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

impl From<figment::Error> for ConfigError {
    fn from(e: figment::Error) -> Self {
        ConfigError::Figment(Box::new(e))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. `info` or `scholard=debug`.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

/// Largest uncompressed ZIP entry read into memory.
pub const DEFAULT_MAX_ENTRY_BYTES: u64 = 32 * 1024 * 1024;

fn default_max_entry_bytes() -> u64 {
    DEFAULT_MAX_ENTRY_BYTES
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ImportConfig {
    /// Field separator for every imported CSV; sniffed per file when unset.
    #[serde(default)]
    pub delimiter: Option<char>,
    #[serde(default = "default_max_entry_bytes")]
    pub max_entry_bytes: u64,
}

impl Default for ImportConfig {
    fn default() -> Self {
        ImportConfig {
            delimiter: None,
            max_entry_bytes: DEFAULT_MAX_ENTRY_BYTES,
        }
    }
}

impl ImportConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.delimiter_byte()?;
        if self.max_entry_bytes == 0 {
            return Err(ConfigError::InvalidValue {
                field: "import.max_entry_bytes".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    pub fn delimiter_byte(&self) -> Result<Option<u8>, ConfigError> {
        match self.delimiter {
            None => Ok(None),
            Some(c) if c.is_ascii() && !c.is_ascii_alphanumeric() && c != '"' => Ok(Some(c as u8)),
            Some(c) => Err(ConfigError::InvalidValue {
                field: "import.delimiter".to_string(),
                reason: format!("'{c}' cannot separate CSV fields"),
            }),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ScholarConfig {
    /// Workspace opened at startup, before any `workspace.select`.
    #[serde(default)]
    pub workspace: Option<PathBuf>,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub import: ImportConfig,
}

impl ScholarConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let config: ScholarConfig = Self::figment().extract()?;
        config.import.validate()?;
        Ok(config)
    }

    pub fn figment() -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        let file = std::env::var_os(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME));
        if file.exists() {
            figment = figment.merge(Toml::file(file));
        }

        figment.merge(
            Env::prefixed(ENV_PREFIX)
                .ignore(&["log", "config"])
                .split("__"),
        )
    }
}
