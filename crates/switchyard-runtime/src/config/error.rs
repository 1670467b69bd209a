//! Configuration errors.
//!
//! # Error Code Convention
//!
//! All configuration errors use the `CONFIG_` prefix:
//!
//! | Error | Code | Recoverable |
//! |-------|------|-------------|
//! | [`ConfigError::ReadFile`] | `CONFIG_READ_FAILED` | No |
//! | [`ConfigError::ParseToml`] | `CONFIG_PARSE_FAILED` | No |
//! | [`ConfigError::Serialize`] | `CONFIG_SERIALIZE_FAILED` | No |
//! | [`ConfigError::InvalidEnvVar`] | `CONFIG_INVALID_ENV_VAR` | No |
//!
//! Configuration problems need a human to fix a file or an environment
//! variable; nothing here is worth an automatic retry.

use std::path::PathBuf;
use switchyard_types::ErrorCode;
use thiserror::Error;

/// Configuration error type.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file.
    #[error("failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse TOML.
    #[error("failed to parse config file '{path}': {source}")]
    ParseToml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// Failed to serialize config.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Invalid environment variable value.
    #[error("invalid value for environment variable '{name}': {message}")]
    InvalidEnvVar { name: String, message: String },
}

impl ConfigError {
    /// Creates a read file error.
    pub fn read_file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::ReadFile {
            path: path.into(),
            source,
        }
    }

    /// Creates a parse TOML error.
    pub fn parse_toml(path: impl Into<PathBuf>, source: toml::de::Error) -> Self {
        Self::ParseToml {
            path: path.into(),
            source,
        }
    }

    /// Creates an invalid env var error.
    pub fn invalid_env_var(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidEnvVar {
            name: name.into(),
            message: message.into(),
        }
    }
}

impl ErrorCode for ConfigError {
    fn code(&self) -> &'static str {
        match self {
            Self::ReadFile { .. } => "CONFIG_READ_FAILED",
            Self::ParseToml { .. } => "CONFIG_PARSE_FAILED",
            Self::Serialize(_) => "CONFIG_SERIALIZE_FAILED",
            Self::InvalidEnvVar { .. } => "CONFIG_INVALID_ENV_VAR",
        }
    }

    fn is_recoverable(&self) -> bool {
        false
    }
}
