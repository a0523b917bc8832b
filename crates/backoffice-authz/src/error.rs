//! Error types for the authorization crate.

use backoffice_core::BackofficeError;
use thiserror::Error;

/// Result type for authorization setup.
pub type AuthzResult<T> = Result<T, AuthzError>;

/// Errors raised while assembling a policy set.
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum AuthzError {
    /// A policy id is registered twice.
    #[error("policy '{0}' is already registered")]
    DuplicatePolicy(String),

    /// A contract references a policy that is not registered.
    #[error("contract '{contract}' references unknown policy '{policy}'")]
    UnknownPolicy {
        /// Contract name.
        contract: String,
        /// Policy id.
        policy: String,
    },
}

impl From<AuthzError> for BackofficeError {
    fn from(err: AuthzError) -> Self {
        match err {
            AuthzError::DuplicatePolicy(_) => BackofficeError::conflict(err.to_string()),
            AuthzError::UnknownPolicy { .. } => BackofficeError::unknown(err.to_string()),
        }
    }
}
