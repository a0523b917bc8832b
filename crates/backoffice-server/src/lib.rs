//! # Backoffice Server
//!
//! The contract dispatcher and the HTTP server in front of it.
//!
//! - [`Dispatcher`] runs the validate, authorize, transact, shape pipeline
//!   and maps every error to its response
//! - [`HandlerRegistry`] binds handlers to contract names
//! - [`Server`] is the hyper accept loop with health, readiness and docs
//!   routes and graceful shutdown
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use backoffice_server::{Dispatcher, HandlerRegistry, Server};
//!
//! let dispatcher = Dispatcher::builder(Arc::new(contracts))
//!     .handlers(handlers)
//!     .database(Arc::new(database))
//!     .build()?;
//!
//! Server::new(Arc::new(dispatcher), config.server).run().await?;
//! ```

#![doc(html_root_url = "https://docs.rs/backoffice-server/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod dispatcher;
mod error;
mod handler;
mod health;
mod server;
pub mod shutdown;

pub use dispatcher::{
    DispatchBody, DispatchRequest, Dispatched, Dispatcher, DispatcherBuilder, REQUEST_ID_HEADER,
};
pub use error::{ServerError, ServerResult};
pub use handler::HandlerRegistry;
pub use health::{HealthStatus, Probes, ReadinessStatus};
pub use server::{BoxError, HttpResponse, ResponseBody, Server, HEALTH_PATH, READY_PATH};
pub use shutdown::{ConnectionTracker, ShutdownSignal};
