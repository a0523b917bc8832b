//! # Backoffice
//!
//! **Contract-driven request runtime for the POS back-office**
//!
//! Every API route is a declarative contract: method, path, admitted roles,
//! policies and request/response shapes. The runtime built on top of the
//! contract table provides:
//!
//! - **Validation**: every failing field reported at once, before any
//!   transaction opens
//! - **Authorization**: roles plus resource-aware policies, evaluated in order
//! - **Transactions**: one per call, committed on success, rolled back on any
//!   error; events only leave after the commit
//! - **Streams**: per-store server-sent event channels with a snapshot on
//!   connect
//! - **Documentation**: an OpenAPI document generated from the same contracts
//! - **Batch jobs**: idempotent daily aggregations, on a schedule or on demand
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use backoffice::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ConfigLoader::new().with_env_prefix("BACKOFFICE").load()?;
//!
//!     let app = App::builder(config)
//!         .database(Arc::new(MemoryDatabase::new()))
//!         .build()?;
//!
//!     app.run().await
//! }
//! ```
//!
//! ## Request pipeline
//!
//! ```text
//! Request → Resolve → Validate → Identity → AuthZ → Begin tx → Context → Handler
//!                                                                          ↓
//! Response ← Shape/ErrorNorm ← Publish events ← Commit / Rollback ←────────┘
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod app;
pub mod contracts;

pub use app::{App, AppBuilder};

// Re-export core types
pub use backoffice_core as core;

// Re-export router types
pub use backoffice_router as router;

// Re-export authorization types
pub use backoffice_authz as authz;

// Re-export SSE types
pub use backoffice_sse as sse;

// Re-export documentation types
pub use backoffice_docs as docs;

// Re-export telemetry types
pub use backoffice_telemetry as telemetry;

// Re-export configuration types
pub use backoffice_config as config;

// Re-export server types
pub use backoffice_server as server;

// Re-export background task types
pub use backoffice_tasks as tasks;

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```rust
/// use backoffice::prelude::*;
/// ```
pub mod prelude {
    pub use crate::app::{App, AppBuilder};

    pub use backoffice_core::{
        ApiEvent, BackofficeError, BackofficeResult, BoxFuture, CallerIdentity, ContractDefinition,
        ContractHandler, ContractRegistry, Database, Filter, MemoryDatabase, PosSession, Record,
        Reply, RequestContext, Role, Service, ServiceIds, Shape, StaticSessions, Transaction,
    };

    pub use backoffice_config::{BackofficeConfig, ConfigLoader, Environment};

    pub use backoffice_server::{DispatchRequest, Dispatched, Dispatcher, Server, ShutdownSignal};

    pub use backoffice_sse::{FanoutRegistry, StreamConfig};

    pub use backoffice_tasks::{DailyScheduler, JobKey, JobRunner};
}
