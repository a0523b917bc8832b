//! Application-wide service registry.
//!
//! Long-lived collaborators (gateway clients, the event publisher, job
//! runners) are registered once at startup and looked up by type from a
//! request context.
//!
//! ```rust
//! use backoffice_core::di::ServiceRegistry;
//! use std::sync::Arc;
//!
//! struct PaymentGateway {
//!     endpoint: String,
//! }
//!
//! let mut services = ServiceRegistry::new();
//! services.register(Arc::new(PaymentGateway { endpoint: "https://pay.example".into() }));
//!
//! let gateway: Arc<PaymentGateway> = services.resolve().unwrap();
//! assert_eq!(gateway.endpoint, "https://pay.example");
//! ```

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{BackofficeError, BackofficeResult};

/// Type-keyed map of shared services.
#[derive(Default, Clone)]
pub struct ServiceRegistry {
    services: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
    names: Vec<&'static str>,
}

impl ServiceRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a service, replacing any previous one of the same type.
    pub fn register<T: Send + Sync + 'static>(&mut self, service: Arc<T>) {
        if self.services.insert(TypeId::of::<T>(), service).is_none() {
            self.names.push(std::any::type_name::<T>());
        }
    }

    /// Registers a service and returns `self` for chaining.
    #[must_use]
    pub fn with<T: Send + Sync + 'static>(mut self, service: Arc<T>) -> Self {
        self.register(service);
        self
    }

    /// Looks a service up by type.
    #[must_use]
    pub fn resolve<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.services
            .get(&TypeId::of::<T>())
            .and_then(|s| Arc::clone(s).downcast::<T>().ok())
    }

    /// Looks a service up by type, failing with an unknown error if absent.
    pub fn require<T: Send + Sync + 'static>(&self) -> BackofficeResult<Arc<T>> {
        self.resolve().ok_or_else(|| {
            BackofficeError::unknown(format!(
                "service {} is not registered",
                std::any::type_name::<T>()
            ))
        })
    }

    /// Returns true if a service of type `T` is registered.
    #[must_use]
    pub fn contains<T: 'static>(&self) -> bool {
        self.services.contains_key(&TypeId::of::<T>())
    }

    /// Number of registered services.
    #[must_use]
    pub fn len(&self) -> usize {
        self.services.len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

impl fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("services", &self.names)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Gateway(u32);
    #[derive(Debug)]
    struct Mailer;

    #[test]
    fn test_register_and_resolve() {
        let services = ServiceRegistry::new().with(Arc::new(Gateway(7)));
        assert_eq!(services.resolve::<Gateway>().unwrap().0, 7);
        assert!(services.resolve::<Mailer>().is_none());
        assert!(services.contains::<Gateway>());
        assert_eq!(services.len(), 1);
    }

    #[test]
    fn test_require_missing_is_unknown_error() {
        let err = ServiceRegistry::new().require::<Mailer>().unwrap_err();
        assert_eq!(err.status_code(), http::StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_replacement_keeps_one_entry() {
        let mut services = ServiceRegistry::new();
        services.register(Arc::new(Gateway(1)));
        services.register(Arc::new(Gateway(2)));
        assert_eq!(services.len(), 1);
        assert_eq!(services.resolve::<Gateway>().unwrap().0, 2);
        assert!(format!("{services:?}").contains("Gateway"));
    }
}
