//! Typed configuration for the back-office runtime.
//!
//! [`BackofficeConfig`] is assembled by [`ConfigLoader`] from built-in
//! defaults, an optional TOML or JSON file, a `.env` file and
//! `BACKOFFICE__SECTION__KEY` environment variables. Unknown fields are
//! rejected at every level.
//!
//! # Configuration file format
//!
//! ```toml
//! environment = "production"
//!
//! [server]
//! http_addr = "0.0.0.0:8080"
//! shutdown_timeout_secs = 30
//! request_timeout_ms = 30000
//!
//! [telemetry]
//! service_name = "backoffice"
//!
//! [telemetry.logging]
//! level = "info"
//! format = "json"
//!
//! [telemetry.metrics]
//! enabled = true
//! addr = "0.0.0.0:9090"
//!
//! [auth]
//! bot_token = "..."
//! admin_token = "..."
//!
//! [stream]
//! buffer_size = 64
//! keep_alive_secs = 15
//! retry_ms = 3000
//!
//! [jobs]
//! enabled = true
//! daily_cron = "0 10 0 * * *"
//!
//! [docs]
//! enabled = true
//! path = "/docs/openapi.json"
//! unrepresentable = "any"
//! ```
//!
//! # Environment overrides
//!
//! - `BACKOFFICE__ENVIRONMENT=staging`
//! - `BACKOFFICE__SERVER__HTTP_ADDR=0.0.0.0:9000`
//! - `BACKOFFICE__TELEMETRY__LOGGING__LEVEL=debug`
//! - `BACKOFFICE__AUTH__BOT_TOKEN=...`

mod config;
mod error;
mod loader;
mod schema;

pub use config::{BackofficeConfig, BackofficeConfigBuilder};
pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, DEFAULT_ENV_PREFIX};
pub use schema::{
    AuthConfig, DocsConfig, Environment, JobsConfig, LoggingSection, MetricsSection, ServerConfig,
    StreamSection, TelemetrySection,
};
