//! Handler registration.
//!
//! Contracts are registered by name in the [`ContractRegistry`]; handlers are
//! registered against the same names here. The two tables are checked
//! against each other once at startup, so a request can never resolve to a
//! contract without a handler.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use backoffice_core::{ContractHandler, ContractRegistry};

use crate::error::{ServerError, ServerResult};

/// Table of contract name to handler.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn ContractHandler>>,
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.names().collect();
        names.sort_unstable();
        f.debug_struct("HandlerRegistry").field("contracts", &names).finish()
    }
}

impl HandlerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for the contract named `contract`.
    pub fn register(
        &mut self,
        contract: impl Into<String>,
        handler: impl ContractHandler,
    ) -> ServerResult<()> {
        self.register_arc(contract, Arc::new(handler))
    }

    /// Registers a shared handler.
    pub fn register_arc(
        &mut self,
        contract: impl Into<String>,
        handler: Arc<dyn ContractHandler>,
    ) -> ServerResult<()> {
        let contract = contract.into();
        if self.handlers.contains_key(&contract) {
            return Err(ServerError::DuplicateHandler(contract));
        }
        tracing::debug!(contract = %contract, "registered handler");
        self.handlers.insert(contract, handler);
        Ok(())
    }

    /// Handler for `contract`.
    #[must_use]
    pub fn get(&self, contract: &str) -> Option<&Arc<dyn ContractHandler>> {
        self.handlers.get(contract)
    }

    /// Returns true if `contract` has a handler.
    #[must_use]
    pub fn contains(&self, contract: &str) -> bool {
        self.handlers.contains_key(contract)
    }

    /// Registered contract names, unordered.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    /// Number of handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Returns true if no handler is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Checks that handlers and contracts correspond one to one.
    pub fn verify(&self, contracts: &ContractRegistry) -> ServerResult<()> {
        if let Some(missing) = contracts.iter().find(|c| !self.contains(c.name())) {
            return Err(ServerError::MissingHandler(missing.name().to_string()));
        }
        let mut stray: Vec<&str> = self.names().filter(|n| contracts.get(n).is_none()).collect();
        stray.sort_unstable();
        if let Some(name) = stray.first() {
            return Err(ServerError::UnknownContract((*name).to_string()));
        }
        Ok(())
    }
}
