//! Resource-aware policies.
//!
//! A policy is a synchronous predicate over the caller and the validated
//! request. Policies never touch storage; anything they need must already be
//! in the [`PolicyInput`].

use std::fmt;
use std::sync::Arc;

use backoffice_core::{CallerIdentity, PolicyId};
use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::error::{AuthzError, AuthzResult};

/// Id of the built-in store access policy.
pub const STORE_ACCESS: &str = "store_access";

/// Prefix of built-in permission policies (`permission:<flag>`).
pub const PERMISSION_PREFIX: &str = "permission:";

/// What a policy sees.
#[derive(Debug, Clone, Copy)]
pub struct PolicyInput<'a> {
    /// Name of the contract being served.
    pub contract: &'a str,
    /// The caller.
    pub caller: &'a CallerIdentity,
    /// Coerced path parameters.
    pub params: &'a Map<String, Value>,
}

impl PolicyInput<'_> {
    /// The `store_id` path parameter as an integer.
    #[must_use]
    pub fn store_id(&self) -> Option<i64> {
        match self.params.get("store_id")? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }
}

/// A fine-grained authorization check.
pub trait Policy: Send + Sync {
    /// `Ok` to allow, `Err(message)` to deny.
    fn check(&self, input: &PolicyInput<'_>) -> Result<(), String>;
}

/// The caller must be linked to the store in the path.
///
/// Bot and admin callers operate across stores and always pass; anonymous
/// callers never do.
#[derive(Debug, Clone, Copy, Default)]
pub struct StoreAccess;

impl Policy for StoreAccess {
    fn check(&self, input: &PolicyInput<'_>) -> Result<(), String> {
        let Some(store_id) = input.store_id() else {
            return Err("request has no store_id".to_string());
        };
        match input.caller {
            CallerIdentity::Bot | CallerIdentity::Admin => Ok(()),
            CallerIdentity::Pos(session) if session.store_ids.contains(&store_id) => Ok(()),
            CallerIdentity::Pos(_) => Err(format!("caller is not linked to store {store_id}")),
            CallerIdentity::Anonymous => Err("anonymous callers have no store".to_string()),
        }
    }
}

/// The caller's permission set must contain a flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Permission(pub String);

impl Policy for Permission {
    fn check(&self, input: &PolicyInput<'_>) -> Result<(), String> {
        match input.caller {
            CallerIdentity::Bot | CallerIdentity::Admin => Ok(()),
            CallerIdentity::Pos(session) if session.permissions.contains(&self.0) => Ok(()),
            _ => Err(format!("missing permission '{}'", self.0)),
        }
    }
}

/// Policies by id.
///
/// `store_access` and `permission:<flag>` resolve without registration.
#[derive(Clone, Default)]
pub struct PolicySet {
    policies: IndexMap<PolicyId, Arc<dyn Policy>>,
}

impl fmt::Debug for PolicySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolicySet")
            .field("policies", &self.policies.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl PolicySet {
    /// A set with only the built-ins.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a custom policy.
    pub fn register(&mut self, id: impl Into<PolicyId>, policy: impl Policy + 'static) -> AuthzResult<()> {
        let id = id.into();
        if self.policies.contains_key(&id) || Self::builtin(&id).is_some() {
            return Err(AuthzError::DuplicatePolicy(id.to_string()));
        }
        self.policies.insert(id, Arc::new(policy));
        Ok(())
    }

    /// Looks a policy up by id.
    #[must_use]
    pub fn get(&self, id: &PolicyId) -> Option<Arc<dyn Policy>> {
        self.policies.get(id).cloned().or_else(|| Self::builtin(id))
    }

    /// Returns true if `id` resolves.
    #[must_use]
    pub fn contains(&self, id: &PolicyId) -> bool {
        self.get(id).is_some()
    }

    fn builtin(id: &PolicyId) -> Option<Arc<dyn Policy>> {
        if id.as_str() == STORE_ACCESS {
            return Some(Arc::new(StoreAccess));
        }
        id.as_str()
            .strip_prefix(PERMISSION_PREFIX)
            .filter(|flag| !flag.is_empty())
            .map(|flag| Arc::new(Permission(flag.to_string())) as Arc<dyn Policy>)
    }
}

/// Id of the permission policy for `flag`.
#[must_use]
pub fn permission(flag: &str) -> PolicyId {
    PolicyId::new(format!("{PERMISSION_PREFIX}{flag}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use backoffice_core::PosSession;
    use serde_json::json;

    fn params(store_id: Value) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("store_id".to_string(), store_id);
        map
    }

    fn input<'a>(caller: &'a CallerIdentity, params: &'a Map<String, Value>) -> PolicyInput<'a> {
        PolicyInput {
            contract: "c",
            caller,
            params,
        }
    }

    #[test]
    fn test_store_access() {
        let pos = CallerIdentity::Pos(PosSession::new(1, 1).with_store(3));
        let p3 = params(json!(3));
        let p4 = params(json!("4"));
        assert!(StoreAccess.check(&input(&pos, &p3)).is_ok());
        assert!(StoreAccess.check(&input(&pos, &p4)).is_err());
        assert!(StoreAccess.check(&input(&CallerIdentity::Bot, &p4)).is_ok());
        assert!(StoreAccess.check(&input(&CallerIdentity::Anonymous, &p3)).is_err());
        assert!(StoreAccess.check(&input(&pos, &Map::new())).is_err());
    }

    #[test]
    fn test_permission() {
        let pos = CallerIdentity::Pos(PosSession::new(1, 1).with_permission("stock"));
        let empty = Map::new();
        let input = PolicyInput {
            contract: "c",
            caller: &pos,
            params: &empty,
        };
        assert!(Permission("stock".to_string()).check(&input).is_ok());
        assert!(Permission("sales".to_string()).check(&input).is_err());
    }

    #[test]
    fn test_builtins_resolve_without_registration() {
        let set = PolicySet::new();
        assert!(set.contains(&PolicyId::new(STORE_ACCESS)));
        assert!(set.contains(&permission("announcement")));
        assert!(!set.contains(&PolicyId::new("permission:")));
        assert!(!set.contains(&PolicyId::new("business_hours")));
    }

    #[test]
    fn test_register_rejects_duplicates() {
        struct Never;
        impl Policy for Never {
            fn check(&self, _: &PolicyInput<'_>) -> Result<(), String> {
                Err("never".to_string())
            }
        }

        let mut set = PolicySet::new();
        set.register("never", Never).unwrap();
        assert!(set.contains(&PolicyId::new("never")));
        assert_eq!(
            set.register("never", Never),
            Err(AuthzError::DuplicatePolicy("never".to_string()))
        );
        assert!(set.register(STORE_ACCESS, Never).is_err());
    }
}
