//! Layered configuration loading.
//!
//! Layers apply in order, later ones overriding earlier ones:
//! 1. Built-in defaults or a preset
//! 2. A configuration file (TOML or JSON, chosen by extension)
//! 3. A `.env` file, loaded into the process environment
//! 4. `PREFIX__SECTION__KEY` environment variables

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use crate::{BackofficeConfig, ConfigError};

/// Default environment prefix.
pub const DEFAULT_ENV_PREFIX: &str = "BACKOFFICE";

/// Builds a [`BackofficeConfig`] from defaults, files and the environment.
///
/// # Example
///
/// ```no_run
/// use backoffice_config::ConfigLoader;
///
/// # fn main() -> Result<(), backoffice_config::ConfigError> {
/// let config = ConfigLoader::new()
///     .with_optional_file("backoffice.toml")?
///     .with_dotenv()?
///     .with_env_prefix("BACKOFFICE")
///     .load()?;
/// println!("listening on {}", config.server.http_addr);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ConfigLoader {
    config: BackofficeConfig,
    env_prefix: Option<String>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Starts from the built-in defaults.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: BackofficeConfig::default(),
            env_prefix: None,
        }
    }

    /// Starts from the development preset.
    ///
    /// ```
    /// use backoffice_config::ConfigLoader;
    ///
    /// let config = ConfigLoader::new().with_development().load().unwrap();
    /// assert_eq!(config.telemetry.logging.level, "debug");
    /// ```
    #[must_use]
    pub fn with_development(mut self) -> Self {
        self.config = BackofficeConfig::development();
        self
    }

    /// Starts from the production preset.
    #[must_use]
    pub fn with_production(mut self) -> Self {
        self.config = BackofficeConfig::production();
        self
    }

    /// Loads a TOML or JSON file. The whole document replaces the current
    /// configuration; sections it omits take their defaults.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::file_not_found(path));
        }

        let content = fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;

        let format = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();
        self.config = parse(&content, &format)?;
        Ok(self)
    }

    /// Like [`with_file`](Self::with_file), but a missing file is skipped.
    pub fn with_optional_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            self.with_file(path)
        } else {
            Ok(self)
        }
    }

    /// Loads configuration from a string in the given format (`toml` or `json`).
    ///
    /// ```
    /// use backoffice_config::ConfigLoader;
    ///
    /// let config = ConfigLoader::new()
    ///     .with_string("[server]\nhttp_addr = \"127.0.0.1:3000\"", "toml")
    ///     .unwrap()
    ///     .load()
    ///     .unwrap();
    /// assert_eq!(config.server.http_addr, "127.0.0.1:3000");
    /// ```
    pub fn with_string(mut self, content: &str, format: &str) -> Result<Self, ConfigError> {
        self.config = parse(content, &format.to_lowercase())?;
        Ok(self)
    }

    /// Enables `PREFIX__SECTION__KEY` overrides.
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_uppercase());
        self
    }

    /// Loads `.env` from the working directory or its parents, if present.
    pub fn with_dotenv(self) -> Result<Self, ConfigError> {
        match dotenvy::dotenv() {
            Ok(_) => Ok(self),
            Err(e) if e.not_found() => Ok(self),
            Err(e) => Err(ConfigError::DotenvError(e.to_string())),
        }
    }

    /// Applies environment overrides and validates.
    pub fn load(mut self) -> Result<BackofficeConfig, ConfigError> {
        if let Some(prefix) = self.env_prefix.take() {
            let scoped = format!("{prefix}__");
            let vars: BTreeMap<String, String> = env::vars()
                .filter(|(k, _)| k.starts_with(&scoped))
                .collect();
            for (key, value) in &vars {
                self.apply_env_var(key, value, &prefix)?;
            }
        }

        self.config.validate()?;
        Ok(self.config)
    }

    fn apply_env_var(&mut self, key: &str, value: &str, prefix: &str) -> Result<(), ConfigError> {
        let rest = key
            .strip_prefix(prefix)
            .and_then(|k| k.strip_prefix("__"))
            .ok_or_else(|| ConfigError::env_parse_error(key, "invalid key format"))?;

        let parts: Vec<&str> = rest.split("__").collect();
        let config = &mut self.config;

        match parts.as_slice() {
            ["ENVIRONMENT"] => {
                config.environment = value
                    .parse()
                    .map_err(|e: String| ConfigError::env_parse_error(key, e))?;
            }

            ["SERVER", "HTTP_ADDR"] => config.server.http_addr = value.to_string(),
            ["SERVER", "SHUTDOWN_TIMEOUT_SECS"] => {
                config.server.shutdown_timeout_secs = parse_num(key, value)?;
            }
            ["SERVER", "REQUEST_TIMEOUT_MS"] => {
                config.server.request_timeout_ms = parse_num(key, value)?;
            }
            ["SERVER", "MAX_BODY_BYTES"] => config.server.max_body_bytes = parse_num(key, value)?,

            ["TELEMETRY", "SERVICE_NAME"] => config.telemetry.service_name = value.to_string(),
            ["TELEMETRY", "LOGGING", "ENABLED"] => {
                config.telemetry.logging.enabled = parse_flag(key, value)?;
            }
            ["TELEMETRY", "LOGGING", "LEVEL"] => config.telemetry.logging.level = value.to_string(),
            ["TELEMETRY", "LOGGING", "FORMAT"] => {
                config.telemetry.logging.format = match value.to_lowercase().as_str() {
                    "json" => backoffice_telemetry::LogFormat::Json,
                    "pretty" => backoffice_telemetry::LogFormat::Pretty,
                    _ => {
                        return Err(ConfigError::env_parse_error(key, "expected 'json' or 'pretty'"))
                    }
                };
            }
            ["TELEMETRY", "LOGGING", "INCLUDE_LOCATION"] => {
                config.telemetry.logging.include_location = parse_flag(key, value)?;
            }
            ["TELEMETRY", "METRICS", "ENABLED"] => {
                config.telemetry.metrics.enabled = parse_flag(key, value)?;
            }
            ["TELEMETRY", "METRICS", "ADDR"] => config.telemetry.metrics.addr = value.to_string(),

            ["AUTH", "BOT_TOKEN"] => config.auth.bot_token = non_empty(value),
            ["AUTH", "ADMIN_TOKEN"] => config.auth.admin_token = non_empty(value),

            ["STREAM", "BUFFER_SIZE"] => config.stream.buffer_size = parse_num(key, value)?,
            ["STREAM", "KEEP_ALIVE_SECS"] => config.stream.keep_alive_secs = parse_num(key, value)?,
            ["STREAM", "RETRY_MS"] => config.stream.retry_ms = parse_num(key, value)?,

            ["JOBS", "ENABLED"] => config.jobs.enabled = parse_flag(key, value)?,
            ["JOBS", "DAILY_CRON"] => config.jobs.daily_cron = value.to_string(),

            ["DOCS", "ENABLED"] => config.docs.enabled = parse_flag(key, value)?,
            ["DOCS", "PATH"] => config.docs.path = value.to_string(),
            ["DOCS", "UNREPRESENTABLE"] => {
                config.docs.unrepresentable = match value.to_lowercase().as_str() {
                    "any" => backoffice_docs::UnrepresentablePolicy::Any,
                    "skip" => backoffice_docs::UnrepresentablePolicy::Skip,
                    _ => return Err(ConfigError::env_parse_error(key, "expected 'any' or 'skip'")),
                };
            }

            _ => return Err(ConfigError::env_parse_error(key, "unknown configuration key")),
        }

        Ok(())
    }
}

fn parse(content: &str, format: &str) -> Result<BackofficeConfig, ConfigError> {
    match format {
        "toml" => Ok(toml::from_str(content)?),
        "json" => Ok(serde_json::from_str(content)?),
        other => Err(ConfigError::UnsupportedFormat(other.to_string())),
    }
}

fn parse_num<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::env_parse_error(key, "expected integer"))
}

fn parse_flag(key: &str, value: &str) -> Result<bool, ConfigError> {
    parse_bool(value).ok_or_else(|| ConfigError::env_parse_error(key, "expected boolean"))
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}
