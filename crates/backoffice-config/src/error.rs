//! Configuration error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration file not found.
    #[error("configuration file not found: {path}")]
    FileNotFound {
        /// Path that was looked up.
        path: PathBuf,
    },

    /// Configuration file could not be read.
    #[error("failed to read configuration file {path}: {source}")]
    ReadError {
        /// Path of the file.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// TOML parse error (also raised for unknown fields).
    #[error("failed to parse TOML configuration: {0}")]
    TomlError(#[from] toml::de::Error),

    /// JSON parse error (also raised for unknown fields).
    #[error("failed to parse JSON configuration: {0}")]
    JsonError(#[from] serde_json::Error),

    /// A `.env` file exists but could not be parsed.
    #[error("failed to load dotenv file: {0}")]
    DotenvError(String),

    /// Unsupported file extension.
    #[error("unsupported configuration format: {0} (expected .toml or .json)")]
    UnsupportedFormat(String),

    /// Environment override with an unknown key or unparseable value.
    #[error("failed to parse environment variable {var}: {reason}")]
    EnvParseError {
        /// Variable name.
        var: String,
        /// What went wrong.
        reason: String,
    },

    /// Configuration parsed but is not usable.
    #[error("invalid configuration value for '{field}': {reason}")]
    InvalidValue {
        /// Dotted field path.
        field: String,
        /// What is wrong with it.
        reason: String,
    },
}

impl ConfigError {
    /// Creates a file-not-found error.
    pub fn file_not_found(path: impl Into<PathBuf>) -> Self {
        Self::FileNotFound { path: path.into() }
    }

    /// Creates an invalid-value error.
    pub fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Creates an environment parse error.
    pub fn env_parse_error(var: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::EnvParseError {
            var: var.into(),
            reason: reason.into(),
        }
    }
}

/// Result alias for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_not_found_error() {
        let err = ConfigError::file_not_found("/etc/backoffice/config.toml");
        assert!(err.to_string().contains("/etc/backoffice/config.toml"));
    }

    #[test]
    fn test_invalid_value_error() {
        let err = ConfigError::invalid_value("server.http_addr", "not a socket address");
        assert!(err.to_string().contains("server.http_addr"));
        assert!(err.to_string().contains("not a socket address"));
    }

    #[test]
    fn test_env_parse_error() {
        let err = ConfigError::env_parse_error("BACKOFFICE__STREAM__BUFFER_SIZE", "expected integer");
        assert!(err.to_string().contains("BACKOFFICE__STREAM__BUFFER_SIZE"));
        assert!(err.to_string().contains("expected integer"));
    }
}
