//! Observability for the back-office runtime.
//!
//! - **Logging**: `tracing-subscriber` with an `EnvFilter`, JSON or pretty output
//! - **Metrics**: the `metrics` facade with an optional Prometheus scrape listener
//!
//! # Example
//!
//! ```rust,ignore
//! use backoffice_telemetry::{init_telemetry, TelemetryConfig};
//!
//! let config = TelemetryConfig::builder()
//!     .service_name("backoffice")
//!     .metrics_addr("0.0.0.0:9090")
//!     .build();
//! init_telemetry(&config)?;
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;

pub use config::{TelemetryConfig, TelemetryConfigBuilder};
pub use error::TelemetryError;
pub use logging::{init_logging, LogConfig, LogFormat};
pub use metrics::{init_metrics, InFlightGuard, MetricsConfig};

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;

/// Installs logging, then metrics.
///
/// # Errors
///
/// Returns `TelemetryError` if either subsystem fails to initialize.
pub fn init_telemetry(config: &TelemetryConfig) -> TelemetryResult<()> {
    init_logging(&config.logging)?;
    init_metrics(&config.metrics)?;
    tracing::info!(service = %config.service_name, metrics = config.metrics.enabled, "telemetry initialized");
    Ok(())
}
