//! Authorization decisions.

use std::collections::BTreeSet;
use std::fmt;

use backoffice_core::{PolicyId, Role};
use serde::Serialize;

/// Why a request was denied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DenyReason {
    /// The caller's role is not admitted.
    Role {
        /// Caller role.
        role: Role,
        /// Roles the contract admits.
        required: BTreeSet<Role>,
    },
    /// A policy rejected the request.
    Policy {
        /// The failing policy.
        policy: PolicyId,
        /// Policy message.
        message: String,
    },
    /// The contract names a policy nobody registered. Fails closed.
    UnknownPolicy {
        /// The missing policy.
        policy: PolicyId,
    },
}

impl DenyReason {
    /// Short label for metrics.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Role { .. } => "role",
            Self::Policy { .. } => "policy",
            Self::UnknownPolicy { .. } => "unknown_policy",
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Role { role, required } => {
                let required: Vec<&str> = required.iter().map(Role::as_str).collect();
                write!(f, "role '{role}' is not one of [{}]", required.join(", "))
            }
            Self::Policy { policy, message } => write!(f, "policy '{policy}' denied: {message}"),
            Self::UnknownPolicy { policy } => write!(f, "policy '{policy}' is not registered"),
        }
    }
}

/// Outcome of evaluating a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Proceed.
    Allow,
    /// Reject before any handler code runs.
    Deny(DenyReason),
}

impl Decision {
    /// Returns true for [`Decision::Allow`].
    #[must_use]
    pub const fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }

    /// The denial reason, if denied.
    #[must_use]
    pub const fn reason(&self) -> Option<&DenyReason> {
        match self {
            Self::Allow => None,
            Self::Deny(reason) => Some(reason),
        }
    }
}
