//! Error types for configuration loading.
//!
//! Every variant carries the path of the offending `config.toml` so the CLI
//! can point at it.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while reading `.story-cycle/config.toml`.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file exists but could not be read.
    #[error("Failed to read config file at {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Invalid TOML syntax or a field of the wrong type.
    #[error("Failed to parse settings in {path}: {source}")]
    TomlParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// Settings parsed but cannot drive a cycle, e.g. an empty base branch.
    #[error("Invalid configuration in {path}: {reason}")]
    InvalidConfig { path: PathBuf, reason: String },
}

pub type ConfigResult<T> = Result<T, ConfigError>;
