//! Configuration sections.
//!
//! Every section rejects unknown fields and fills missing ones from its
//! `default_*` function, so a partial file only overrides what it names.

use std::time::Duration;

use backoffice_docs::UnrepresentablePolicy;
use backoffice_telemetry::{LogConfig, LogFormat, MetricsConfig, TelemetryConfig};
use serde::{Deserialize, Serialize};

/// Deployment environment.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Local development.
    #[default]
    Development,
    /// Pre-production.
    Staging,
    /// Production. Documentation is never served here.
    Production,
}

impl Environment {
    /// Lowercase name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Staging => "staging",
            Self::Production => "production",
        }
    }

    /// Whether this is the production environment.
    #[must_use]
    pub const fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "staging" => Ok(Self::Staging),
            "production" | "prod" => Ok(Self::Production),
            other => Err(format!("unknown environment '{other}'")),
        }
    }
}

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Listen address.
    #[serde(default = "default_http_addr")]
    pub http_addr: String,

    /// Grace period for in-flight requests on shutdown.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,

    /// Per-request deadline, handler included.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,

    /// Largest accepted request body.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl ServerConfig {
    /// Shutdown grace period.
    #[must_use]
    pub const fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    /// Request deadline.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
            shutdown_timeout_secs: default_shutdown_timeout(),
            request_timeout_ms: default_request_timeout(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

fn default_http_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_shutdown_timeout() -> u64 {
    30
}

fn default_request_timeout() -> u64 {
    30_000
}

fn default_max_body_bytes() -> usize {
    1024 * 1024
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LoggingSection {
    /// Enable logging.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Filter directive (`info`, `info,backoffice_tasks=debug`).
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,

    /// Include source file and line.
    #[serde(default)]
    pub include_location: bool,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            enabled: true,
            level: default_log_level(),
            format: LogFormat::default(),
            include_location: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Prometheus exporter settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct MetricsSection {
    /// Serve the scrape endpoint.
    #[serde(default)]
    pub enabled: bool,

    /// Scrape listener address.
    #[serde(default = "default_metrics_addr")]
    pub addr: String,
}

impl Default for MetricsSection {
    fn default() -> Self {
        Self {
            enabled: false,
            addr: default_metrics_addr(),
        }
    }
}

fn default_metrics_addr() -> String {
    "0.0.0.0:9090".to_string()
}

/// Logging and metrics.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct TelemetrySection {
    /// Service name attached to log output.
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingSection,

    /// Metrics settings.
    #[serde(default)]
    pub metrics: MetricsSection,
}

impl TelemetrySection {
    /// Converts to the telemetry crate's runtime configuration.
    #[must_use]
    pub fn to_telemetry_config(&self) -> TelemetryConfig {
        let base = match self.logging.format {
            LogFormat::Json => LogConfig::production(),
            LogFormat::Pretty => LogConfig::development(),
        };
        TelemetryConfig::builder()
            .service_name(&self.service_name)
            .logging(LogConfig {
                enabled: self.logging.enabled,
                level: self.logging.level.clone(),
                format: self.logging.format,
                file_line_info: self.logging.include_location,
                ..base
            })
            .metrics(MetricsConfig {
                enabled: self.metrics.enabled,
                addr: self.metrics.addr.clone(),
            })
            .build()
    }
}

impl Default for TelemetrySection {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            logging: LoggingSection::default(),
            metrics: MetricsSection::default(),
        }
    }
}

fn default_service_name() -> String {
    "backoffice".to_string()
}

/// Shared-secret tokens for the `bot` and `admin` roles.
///
/// A `None` token disables that role entirely.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    /// Value expected in the `bottoken` header.
    #[serde(default)]
    pub bot_token: Option<String>,

    /// Value expected in the `admin-token` header.
    #[serde(default)]
    pub admin_token: Option<String>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mask = |token: &Option<String>| token.as_ref().map(|_| "***");
        f.debug_struct("AuthConfig")
            .field("bot_token", &mask(&self.bot_token))
            .field("admin_token", &mask(&self.admin_token))
            .finish()
    }
}

/// Event stream client settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct StreamSection {
    /// Per-client queue length before the client counts as failed.
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,

    /// Keep-alive comment interval. `0` disables keep-alives.
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,

    /// Reconnect hint sent to clients. `0` omits it.
    #[serde(default = "default_retry_ms")]
    pub retry_ms: u64,
}

impl StreamSection {
    /// Keep-alive interval, if enabled.
    #[must_use]
    pub const fn keep_alive(&self) -> Option<Duration> {
        if self.keep_alive_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.keep_alive_secs))
        }
    }

    /// Reconnect hint, if enabled.
    #[must_use]
    pub const fn retry(&self) -> Option<Duration> {
        if self.retry_ms == 0 {
            None
        } else {
            Some(Duration::from_millis(self.retry_ms))
        }
    }
}

impl Default for StreamSection {
    fn default() -> Self {
        Self {
            buffer_size: default_buffer_size(),
            keep_alive_secs: default_keep_alive_secs(),
            retry_ms: default_retry_ms(),
        }
    }
}

fn default_buffer_size() -> usize {
    64
}

fn default_keep_alive_secs() -> u64 {
    15
}

fn default_retry_ms() -> u64 {
    3000
}

/// Scheduled aggregation jobs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct JobsConfig {
    /// Run the scheduler.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Cron expression (seconds first) for the daily aggregation run.
    #[serde(default = "default_daily_cron")]
    pub daily_cron: String,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            daily_cron: default_daily_cron(),
        }
    }
}

fn default_daily_cron() -> String {
    "0 10 0 * * *".to_string()
}

/// OpenAPI document endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct DocsConfig {
    /// Serve the document outside production.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Path the document is served on.
    #[serde(default = "default_docs_path")]
    pub path: String,

    /// Handling of shapes with no schema equivalent.
    #[serde(default)]
    pub unrepresentable: UnrepresentablePolicy,
}

impl Default for DocsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: default_docs_path(),
            unrepresentable: UnrepresentablePolicy::default(),
        }
    }
}

fn default_docs_path() -> String {
    "/docs/openapi.json".to_string()
}

fn default_true() -> bool {
    true
}
