//! The root configuration type and its builder.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{
    AuthConfig, ConfigError, DocsConfig, Environment, JobsConfig, ServerConfig, StreamSection,
    TelemetrySection,
};

/// Complete runtime configuration.
///
/// Use [`ConfigLoader`](crate::ConfigLoader) to load it from files and the
/// environment.
///
/// # Example
///
/// ```
/// use backoffice_config::BackofficeConfig;
///
/// let config = BackofficeConfig::default();
/// assert_eq!(config.server.http_addr, "0.0.0.0:8080");
/// assert!(config.docs_served());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(deny_unknown_fields)]
pub struct BackofficeConfig {
    /// Deployment environment.
    #[serde(default)]
    pub environment: Environment,

    /// HTTP listener.
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging and metrics.
    #[serde(default)]
    pub telemetry: TelemetrySection,

    /// Role tokens.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Event stream clients.
    #[serde(default)]
    pub stream: StreamSection,

    /// Scheduled jobs.
    #[serde(default)]
    pub jobs: JobsConfig,

    /// OpenAPI endpoint.
    #[serde(default)]
    pub docs: DocsConfig,
}

impl BackofficeConfig {
    /// Creates a configuration builder.
    #[must_use]
    pub fn builder() -> BackofficeConfigBuilder {
        BackofficeConfigBuilder::default()
    }

    /// Whether the documentation endpoint is mounted.
    ///
    /// Never true in production, whatever `docs.enabled` says.
    #[must_use]
    pub fn docs_served(&self) -> bool {
        self.docs.enabled && !self.environment.is_production()
    }

    /// Checks values serde cannot check on its own.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self
            .server
            .http_addr
            .parse::<std::net::SocketAddr>()
            .is_err()
        {
            return Err(ConfigError::invalid_value(
                "server.http_addr",
                format!("invalid socket address: {}", self.server.http_addr),
            ));
        }

        if self.server.request_timeout_ms == 0 {
            return Err(ConfigError::invalid_value(
                "server.request_timeout_ms",
                "must be greater than zero",
            ));
        }

        if self.telemetry.metrics.enabled
            && self
                .telemetry
                .metrics
                .addr
                .parse::<std::net::SocketAddr>()
                .is_err()
        {
            return Err(ConfigError::invalid_value(
                "telemetry.metrics.addr",
                format!("invalid socket address: {}", self.telemetry.metrics.addr),
            ));
        }

        for (field, token) in [
            ("auth.bot_token", &self.auth.bot_token),
            ("auth.admin_token", &self.auth.admin_token),
        ] {
            if token.as_deref().is_some_and(|t| t.trim().is_empty()) {
                return Err(ConfigError::invalid_value(field, "must not be blank"));
            }
        }

        if self.stream.buffer_size == 0 {
            return Err(ConfigError::invalid_value(
                "stream.buffer_size",
                "must be greater than zero",
            ));
        }

        if self.jobs.enabled {
            if let Err(e) = cron::Schedule::from_str(&self.jobs.daily_cron) {
                return Err(ConfigError::invalid_value(
                    "jobs.daily_cron",
                    format!("invalid cron expression '{}': {e}", self.jobs.daily_cron),
                ));
            }
        }

        if !self.docs.path.starts_with('/') {
            return Err(ConfigError::invalid_value(
                "docs.path",
                "must start with '/'",
            ));
        }

        Ok(())
    }

    /// Local development preset: pretty debug logs, docs on.
    #[must_use]
    pub fn development() -> Self {
        let mut config = Self {
            environment: Environment::Development,
            ..Self::default()
        };
        config.server.http_addr = "127.0.0.1:8080".to_string();
        config.telemetry.logging.level = "debug".to_string();
        config.telemetry.logging.format = backoffice_telemetry::LogFormat::Pretty;
        config.telemetry.logging.include_location = true;
        config
    }

    /// Production preset: JSON logs, metrics on, docs off.
    #[must_use]
    pub fn production() -> Self {
        let mut config = Self {
            environment: Environment::Production,
            ..Self::default()
        };
        config.telemetry.metrics.enabled = true;
        config.docs.enabled = false;
        config
    }
}

/// Builder for [`BackofficeConfig`].
#[derive(Debug, Default)]
pub struct BackofficeConfigBuilder {
    environment: Option<Environment>,
    server: Option<ServerConfig>,
    telemetry: Option<TelemetrySection>,
    auth: Option<AuthConfig>,
    stream: Option<StreamSection>,
    jobs: Option<JobsConfig>,
    docs: Option<DocsConfig>,
}

impl BackofficeConfigBuilder {
    /// Sets the environment.
    #[must_use]
    pub fn environment(mut self, environment: Environment) -> Self {
        self.environment = Some(environment);
        self
    }

    /// Sets the server section.
    #[must_use]
    pub fn server(mut self, server: ServerConfig) -> Self {
        self.server = Some(server);
        self
    }

    /// Sets the telemetry section.
    #[must_use]
    pub fn telemetry(mut self, telemetry: TelemetrySection) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Sets the auth section.
    #[must_use]
    pub fn auth(mut self, auth: AuthConfig) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Sets the stream section.
    #[must_use]
    pub fn stream(mut self, stream: StreamSection) -> Self {
        self.stream = Some(stream);
        self
    }

    /// Sets the jobs section.
    #[must_use]
    pub fn jobs(mut self, jobs: JobsConfig) -> Self {
        self.jobs = Some(jobs);
        self
    }

    /// Sets the docs section.
    #[must_use]
    pub fn docs(mut self, docs: DocsConfig) -> Self {
        self.docs = Some(docs);
        self
    }

    /// Builds the configuration. Unset sections use their defaults.
    #[must_use]
    pub fn build(self) -> BackofficeConfig {
        BackofficeConfig {
            environment: self.environment.unwrap_or_default(),
            server: self.server.unwrap_or_default(),
            telemetry: self.telemetry.unwrap_or_default(),
            auth: self.auth.unwrap_or_default(),
            stream: self.stream.unwrap_or_default(),
            jobs: self.jobs.unwrap_or_default(),
            docs: self.docs.unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        BackofficeConfig::default().validate().unwrap();
        BackofficeConfig::development().validate().unwrap();
        BackofficeConfig::production().validate().unwrap();
    }

    #[test]
    fn test_docs_never_served_in_production() {
        let mut config = BackofficeConfig::production();
        config.docs.enabled = true;
        assert!(!config.docs_served());

        let staging = BackofficeConfig::builder()
            .environment(Environment::Staging)
            .build();
        assert!(staging.docs_served());
    }

    #[test]
    fn test_invalid_http_addr() {
        let config = BackofficeConfig::builder()
            .server(ServerConfig {
                http_addr: "localhost".to_string(),
                ..ServerConfig::default()
            })
            .build();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("server.http_addr"));
    }

    #[test]
    fn test_invalid_cron() {
        let config = BackofficeConfig::builder()
            .jobs(JobsConfig {
                enabled: true,
                daily_cron: "every night".to_string(),
            })
            .build();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("jobs.daily_cron"));
    }

    #[test]
    fn test_disabled_jobs_skip_cron_check() {
        let config = BackofficeConfig::builder()
            .jobs(JobsConfig {
                enabled: false,
                daily_cron: "never".to_string(),
            })
            .build();
        config.validate().unwrap();
    }

    #[test]
    fn test_blank_token_rejected() {
        let config = BackofficeConfig::builder()
            .auth(AuthConfig {
                bot_token: Some("  ".to_string()),
                admin_token: None,
            })
            .build();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("auth.bot_token"));
    }

    #[test]
    fn test_zero_buffer_rejected() {
        let config = BackofficeConfig::builder()
            .stream(StreamSection {
                buffer_size: 0,
                ..StreamSection::default()
            })
            .build();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_docs_path_must_be_absolute() {
        let config = BackofficeConfig::builder()
            .docs(DocsConfig {
                path: "openapi.json".to_string(),
                ..DocsConfig::default()
            })
            .build();
        assert!(config.validate().is_err());
    }
}
