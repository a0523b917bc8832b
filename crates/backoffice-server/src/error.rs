//! Server error types.

use backoffice_authz::AuthzError;
use thiserror::Error;

/// Errors raised while assembling or running the server.
///
/// Request-level failures never surface here; the dispatcher renders them
/// into responses.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listen address could not be parsed.
    #[error("invalid listen address '{addr}': {reason}")]
    InvalidAddress {
        /// Address as configured.
        addr: String,
        /// Parse failure.
        reason: String,
    },

    /// Binding the listener failed.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address we tried to bind.
        addr: String,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// A contract has no handler.
    #[error("contract '{0}' has no registered handler")]
    MissingHandler(String),

    /// A handler was registered for a contract that does not exist.
    #[error("handler registered for unknown contract '{0}'")]
    UnknownContract(String),

    /// Two handlers were registered for one contract.
    #[error("contract '{0}' already has a handler")]
    DuplicateHandler(String),

    /// The dispatcher was built without a database.
    #[error("dispatcher requires a database")]
    MissingDatabase,

    /// A contract references a policy that does not resolve.
    #[error(transparent)]
    Authz(#[from] AuthzError),

    /// IO failure outside request handling.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for server operations.
pub type ServerResult<T> = Result<T, ServerError>;
