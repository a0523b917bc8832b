//! Core types for the back-office request runtime.
//!
//! This crate holds everything a contract needs short of the HTTP server:
//!
//! - [`contract`]: contract definitions and the registry
//! - [`schema`]: field shapes and the validation engine
//! - [`identity`]: roles, sessions and caller resolution
//! - [`context`]: the per-request context and its transaction
//! - [`service`]: request-scoped service composition
//! - [`db`]: the ORM collaborator, with an in-memory implementation in [`memory`]
//! - [`event`]: events delivered to stream clients
//! - [`error`]: the error taxonomy and client envelope

pub mod context;
pub mod contract;
pub mod db;
pub mod di;
pub mod error;
pub mod event;
pub mod handler;
pub mod identity;
pub mod memory;
pub mod schema;
pub mod service;

pub use context::{ContextBuilder, FinishedContext, RequestContext, RequestId, Resources, STORE_TABLE};
pub use contract::{
    ContractBuilder, ContractDefinition, ContractRegistry, DeclaredError, PolicyId, RawRequest,
    RequestInput, Resolution,
};
pub use db::{Database, Filter, Record, Transaction};
pub use di::ServiceRegistry;
pub use error::{BackofficeError, BackofficeResult, ErrorCategory, ErrorEnvelope, FieldErrors};
pub use event::{ApiEvent, EventPublisher, TaskStatus};
pub use handler::{BoxFuture, ContractHandler, Reply};
pub use identity::{CallerIdentity, IdentityResolver, PosSession, Role, SessionResolver, StaticSessions};
pub use memory::MemoryDatabase;
pub use schema::Shape;
pub use service::{Service, ServiceIds};
