//! Liveness and readiness probes.
//!
//! `/health` answers as long as the process serves requests. `/ready` turns
//! to 503 once shutdown begins so load balancers drain the instance.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;

/// Body of the `/health` response.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct HealthStatus {
    /// Always `"healthy"` while the process answers.
    pub status: &'static str,
    /// Service name.
    pub service: String,
    /// Crate version.
    pub version: &'static str,
    /// Seconds since start.
    pub uptime_seconds: u64,
}

/// Body of the `/ready` response.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ReadinessStatus {
    /// Whether new traffic is accepted.
    pub ready: bool,
    /// Open event streams.
    pub stream_clients: usize,
}

/// Shared probe state.
#[derive(Debug, Clone)]
pub struct Probes {
    service: String,
    started: Instant,
    ready: Arc<AtomicBool>,
}

impl Probes {
    /// Probes for `service`, initially ready.
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            started: Instant::now(),
            ready: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Current liveness.
    pub fn health(&self) -> HealthStatus {
        HealthStatus {
            status: "healthy",
            service: self.service.clone(),
            version: env!("CARGO_PKG_VERSION"),
            uptime_seconds: self.started.elapsed().as_secs(),
        }
    }

    /// Current readiness.
    pub fn readiness(&self, stream_clients: usize) -> ReadinessStatus {
        ReadinessStatus {
            ready: self.is_ready(),
            stream_clients,
        }
    }

    /// Whether new traffic is accepted.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Flips readiness.
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }
}
