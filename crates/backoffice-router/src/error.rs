//! Route table errors.

use thiserror::Error;

/// Errors raised while parsing path templates or building the route table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    /// The path template could not be parsed.
    #[error("invalid path template '{template}': {reason}")]
    InvalidTemplate {
        /// The offending template.
        template: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The method is not one the route table serves.
    #[error("unsupported method {0}")]
    UnsupportedMethod(String),

    /// The (method, path) pair is already bound to a contract.
    #[error("{method} {template} is already bound to contract '{existing}'")]
    Duplicate {
        /// HTTP method.
        method: String,
        /// Path template.
        template: String,
        /// The contract that already owns the route.
        existing: String,
    },

    /// Two templates name the parameter at the same position differently.
    #[error("parameter [{found}] conflicts with [{existing}] at the same position in '{template}'")]
    ParamConflict {
        /// Path template being inserted.
        template: String,
        /// Parameter name already in the tree.
        existing: String,
        /// Parameter name in the new template.
        found: String,
    },
}

impl RouteError {
    pub(crate) fn invalid(template: &str, reason: impl Into<String>) -> Self {
        Self::InvalidTemplate {
            template: template.to_string(),
            reason: reason.into(),
        }
    }
}
