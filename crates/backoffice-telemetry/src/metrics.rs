//! Prometheus metrics.
//!
//! # Standard Metrics
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `backoffice_requests_total` | Counter | `contract`, `status` | Completed requests |
//! | `backoffice_request_duration_seconds` | Histogram | `contract` | Request latency |
//! | `backoffice_in_flight_requests` | Gauge | - | Requests being processed |
//! | `backoffice_authz_decisions_total` | Counter | `allowed`, `reason` | Authorization outcomes |
//! | `backoffice_validation_failures_total` | Counter | `location` | Rejected request fields |
//! | `backoffice_stream_clients` | Gauge | - | Registered stream clients |
//! | `backoffice_events_delivered_total` | Counter | `kind` | Events written to client channels |
//! | `backoffice_stream_clients_dropped_total` | Counter | - | Clients removed after a failed write |
//! | `backoffice_job_runs_total` | Counter | `job`, `status` | Aggregation job runs |
//!
//! Recording functions are safe to call before [`init_metrics`]; the `metrics`
//! facade discards values until a recorder is installed.

use crate::error::TelemetryError;
use crate::TelemetryResult;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Duration;

/// Metrics configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsConfig {
    /// Whether metrics are enabled.
    pub enabled: bool,

    /// Scrape listener address (e.g. "0.0.0.0:9090").
    pub addr: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            addr: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Installs the Prometheus recorder and spawns its scrape listener.
///
/// Must be called from within a Tokio runtime when enabled.
///
/// # Errors
///
/// Returns `TelemetryError::InvalidAddress` for a bad address and
/// `TelemetryError::MetricsInit` if a recorder is already installed.
pub fn init_metrics(config: &MetricsConfig) -> TelemetryResult<()> {
    if !config.enabled {
        return Ok(());
    }

    let addr: SocketAddr = config
        .addr
        .parse()
        .map_err(|e| TelemetryError::InvalidAddress(format!("{}: {e}", config.addr)))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;

    register_metric_descriptions();
    Ok(())
}

fn register_metric_descriptions() {
    describe_counter!("backoffice_requests_total", "Completed requests by contract and status");
    describe_histogram!("backoffice_request_duration_seconds", "Request duration in seconds");
    describe_gauge!("backoffice_in_flight_requests", "Requests currently being processed");
    describe_counter!("backoffice_authz_decisions_total", "Authorization decisions by result");
    describe_counter!("backoffice_validation_failures_total", "Rejected request fields by location");
    describe_gauge!("backoffice_stream_clients", "Registered stream clients");
    describe_counter!("backoffice_events_delivered_total", "Events written to client channels");
    describe_counter!(
        "backoffice_stream_clients_dropped_total",
        "Stream clients removed after a failed write"
    );
    describe_counter!("backoffice_job_runs_total", "Aggregation job runs by job and status");
}

/// Records a completed request.
pub fn record_request(contract: &str, status_code: u16, duration: Duration) {
    counter!(
        "backoffice_requests_total",
        "contract" => contract.to_string(),
        "status" => status_code.to_string()
    )
    .increment(1);

    histogram!(
        "backoffice_request_duration_seconds",
        "contract" => contract.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Records an authorization decision. `reason` is "allowed" or a denial label.
pub fn record_authz_decision(allowed: bool, reason: &str) {
    counter!(
        "backoffice_authz_decisions_total",
        "allowed" => allowed.to_string(),
        "reason" => reason.to_string()
    )
    .increment(1);
}

/// Records rejected fields at a request location ("params", "query", "body").
pub fn record_validation_failure(location: &str, fields: usize) {
    counter!(
        "backoffice_validation_failures_total",
        "location" => location.to_string()
    )
    .increment(fields as u64);
}

/// Sets the registered stream client gauge.
pub fn set_stream_clients(count: usize) {
    gauge!("backoffice_stream_clients").set(count as f64);
}

/// Records events written to client channels.
pub fn record_events_delivered(kind: &'static str, count: usize) {
    counter!("backoffice_events_delivered_total", "kind" => kind).increment(count as u64);
}

/// Records stream clients removed after a failed write.
pub fn record_stream_clients_dropped(count: usize) {
    counter!("backoffice_stream_clients_dropped_total").increment(count as u64);
}

/// Records an aggregation job run.
pub fn record_job_run(job: &str, status: &str) {
    counter!(
        "backoffice_job_runs_total",
        "job" => job.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Keeps the in-flight gauge raised while alive.
#[derive(Debug)]
pub struct InFlightGuard {
    _private: (),
}

impl InFlightGuard {
    /// Increments the gauge.
    #[must_use]
    pub fn new() -> Self {
        gauge!("backoffice_in_flight_requests").increment(1.0);
        Self { _private: () }
    }
}

impl Default for InFlightGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        gauge!("backoffice_in_flight_requests").decrement(1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_disabled() {
        let config = MetricsConfig::default();
        assert!(!config.enabled);
        assert!(init_metrics(&config).is_ok());
    }

    #[test]
    fn test_invalid_address() {
        let config = MetricsConfig {
            enabled: true,
            addr: "not-an-addr".to_string(),
        };
        assert!(matches!(init_metrics(&config), Err(TelemetryError::InvalidAddress(_))));
    }

    #[test]
    fn test_recording_without_recorder() {
        let _guard = InFlightGuard::new();
        record_request("announcement_read", 200, Duration::from_millis(4));
        record_authz_decision(false, "role");
        record_validation_failure("body", 2);
        set_stream_clients(3);
        record_events_delivered("store_status_changed", 3);
        record_stream_clients_dropped(1);
        record_job_run("transaction_daily", "succeeded");
    }
}
