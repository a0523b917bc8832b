//! Role and policy evaluation.

use std::collections::BTreeSet;

use backoffice_core::{BackofficeError, CallerIdentity, ContractDefinition, ContractRegistry, PolicyId, Role};
use serde_json::{Map, Value};
use tracing::{debug, instrument};

use crate::decision::{Decision, DenyReason};
use crate::error::{AuthzError, AuthzResult};
use crate::policy::{PolicyInput, PolicySet};

/// Decides whether a caller may invoke a contract.
///
/// Evaluation is pure: the same role, contract and parameters always produce
/// the same decision, and nothing is read from storage.
///
/// # Example
///
/// ```rust
/// use backoffice_authz::Authorizer;
/// use backoffice_core::{CallerIdentity, ContractDefinition, Role};
/// use serde_json::Map;
///
/// let contract = ContractDefinition::builder("calculate")
///     .path("task/daily")
///     .role(Role::Bot)
///     .build()
///     .unwrap();
///
/// let authorizer = Authorizer::default();
/// let params = Map::new();
/// assert!(authorizer.authorize(&contract, &CallerIdentity::Bot, &params).is_allowed());
/// assert!(!authorizer.authorize(&contract, &CallerIdentity::Anonymous, &params).is_allowed());
/// ```
#[derive(Debug, Clone, Default)]
pub struct Authorizer {
    policies: PolicySet,
}

impl Authorizer {
    /// Creates an authorizer over a policy set.
    #[must_use]
    pub fn new(policies: PolicySet) -> Self {
        Self { policies }
    }

    /// The policy set.
    #[must_use]
    pub fn policies(&self) -> &PolicySet {
        &self.policies
    }

    /// Evaluates a role against the admitted roles, then each policy in order.
    ///
    /// `Everyone` in `required` admits every caller. Policies are conjunctive
    /// and evaluation stops at the first denial.
    pub fn evaluate(
        &self,
        role: Role,
        required: &BTreeSet<Role>,
        policies: &[PolicyId],
        input: &PolicyInput<'_>,
    ) -> Decision {
        if !required.contains(&Role::Everyone) && !required.contains(&role) {
            return Decision::Deny(DenyReason::Role {
                role,
                required: required.clone(),
            });
        }

        for id in policies {
            let Some(policy) = self.policies.get(id) else {
                return Decision::Deny(DenyReason::UnknownPolicy { policy: id.clone() });
            };
            if let Err(message) = policy.check(input) {
                return Decision::Deny(DenyReason::Policy {
                    policy: id.clone(),
                    message,
                });
            }
        }

        Decision::Allow
    }

    /// Evaluates a caller against a contract.
    #[instrument(skip(self, contract, params), fields(contract = %contract.name(), caller = %caller.log_id()))]
    pub fn authorize(&self, contract: &ContractDefinition, caller: &CallerIdentity, params: &Map<String, Value>) -> Decision {
        let input = PolicyInput {
            contract: contract.name(),
            caller,
            params,
        };
        let decision = self.evaluate(caller.role(), contract.roles(), contract.policies(), &input);
        match &decision {
            Decision::Allow => debug!("authorization allowed"),
            Decision::Deny(reason) => debug!(reason = %reason, "authorization denied"),
        }
        decision
    }

    /// Like [`Authorizer::authorize`], mapping a denial to a permission error.
    pub fn check(
        &self,
        contract: &ContractDefinition,
        caller: &CallerIdentity,
        params: &Map<String, Value>,
    ) -> Result<(), BackofficeError> {
        match self.authorize(contract, caller, params) {
            Decision::Allow => Ok(()),
            Decision::Deny(reason) => Err(BackofficeError::permission_for_contract(
                reason.to_string(),
                contract.name(),
            )),
        }
    }

    /// Fails if any registered contract names a policy that does not resolve.
    ///
    /// Run at startup so misconfigured contracts are caught before traffic.
    pub fn verify(&self, registry: &ContractRegistry) -> AuthzResult<()> {
        for contract in registry.iter() {
            if let Some(missing) = contract.policies().iter().find(|id| !self.policies.contains(id)) {
                return Err(AuthzError::UnknownPolicy {
                    contract: contract.name().to_string(),
                    policy: missing.to_string(),
                });
            }
        }
        Ok(())
    }
}
