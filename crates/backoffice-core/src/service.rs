//! Service composition.
//!
//! A domain service is a request-scoped value: it borrows the
//! [`RequestContext`], carries a [`ServiceIds`] scoping map, and delegates
//! business logic to zero or more cores. Cores are plain values implementing
//! [`Scoped`], so [`Service::set_ids`] can push the same scope into them.
//!
//! One context can back several differently scoped services at once:
//!
//! ```
//! # use backoffice_core::service::{Service, ServiceIds};
//! # fn demo(ctx: &backoffice_core::RequestContext) -> backoffice_core::BackofficeResult<()> {
//! let mut here = Service::new(ctx, ());
//! let mut elsewhere = Service::new(ctx, ());
//! elsewhere.reset_ids(ServiceIds::store(42));
//! here.set_ids(ServiceIds::store(7));
//! assert_ne!(here.store_id()?, elsewhere.store_id()?);
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeMap;

use crate::context::RequestContext;
use crate::db::Filter;
use crate::error::{BackofficeError, BackofficeResult};

/// Identifiers a service filters by.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceIds {
    /// Store scope.
    pub store_id: Option<i64>,
    /// Corporation scope.
    pub corporation_id: Option<i64>,
    /// Register (till) scope.
    pub register_id: Option<i64>,
    /// Any other named ids.
    pub extra: BTreeMap<String, i64>,
}

impl ServiceIds {
    /// Ids with only a store.
    #[must_use]
    pub fn store(store_id: i64) -> Self {
        Self {
            store_id: Some(store_id),
            ..Self::default()
        }
    }

    /// Sets an id by name, including the fixed ones.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, id: i64) -> Self {
        let name = name.into();
        match name.as_str() {
            "store_id" => self.store_id = Some(id),
            "corporation_id" => self.corporation_id = Some(id),
            "register_id" => self.register_id = Some(id),
            _ => {
                self.extra.insert(name, id);
            }
        }
        self
    }

    /// Fills every id that is unset here from `other`. Never overwrites.
    pub fn fill_from(&mut self, other: &ServiceIds) {
        self.store_id = self.store_id.or(other.store_id);
        self.corporation_id = self.corporation_id.or(other.corporation_id);
        self.register_id = self.register_id.or(other.register_id);
        for (name, id) in &other.extra {
            self.extra.entry(name.clone()).or_insert(*id);
        }
    }

    /// Looks an id up by name, including the fixed ones.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<i64> {
        match name {
            "store_id" => self.store_id,
            "corporation_id" => self.corporation_id,
            "register_id" => self.register_id,
            other => self.extra.get(other).copied(),
        }
    }

    /// Looks an id up by name, failing with "missing scope id" if unset.
    pub fn require(&self, name: &str) -> BackofficeResult<i64> {
        self.get(name)
            .ok_or_else(|| BackofficeError::unknown(format!("missing scope id '{name}'")))
    }
}

/// How new ids are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeMode {
    /// Keep existing ids, fill the gaps.
    Fill,
    /// Replace the ids wholesale.
    Replace,
}

/// Anything that carries a scope and accepts propagated ids.
pub trait Scoped {
    /// Applies `ids` to this value and anything it delegates to.
    fn apply_ids(&mut self, ids: &ServiceIds, mode: ScopeMode);
}

impl Scoped for () {
    fn apply_ids(&mut self, _ids: &ServiceIds, _mode: ScopeMode) {}
}

impl Scoped for ServiceIds {
    fn apply_ids(&mut self, ids: &ServiceIds, mode: ScopeMode) {
        match mode {
            ScopeMode::Fill => self.fill_from(ids),
            ScopeMode::Replace => *self = ids.clone(),
        }
    }
}

impl<T: Scoped> Scoped for Vec<T> {
    fn apply_ids(&mut self, ids: &ServiceIds, mode: ScopeMode) {
        for core in self {
            core.apply_ids(ids, mode);
        }
    }
}

impl<A: Scoped, B: Scoped> Scoped for (A, B) {
    fn apply_ids(&mut self, ids: &ServiceIds, mode: ScopeMode) {
        self.0.apply_ids(ids, mode);
        self.1.apply_ids(ids, mode);
    }
}

/// A request-scoped service composed of a context borrow, a scope and a core.
#[derive(Debug)]
pub struct Service<'ctx, C> {
    ctx: &'ctx RequestContext,
    ids: ServiceIds,
    core: C,
}

impl<'ctx, C: Scoped> Service<'ctx, C> {
    /// Creates a service scoped to the request's store and corporation.
    pub fn new(ctx: &'ctx RequestContext, mut core: C) -> Self {
        let ids = ServiceIds {
            store_id: ctx.resources().store_id(),
            corporation_id: ctx
                .resources()
                .corporation_id()
                .or_else(|| ctx.caller().session().map(|s| s.corporation_id)),
            ..ServiceIds::default()
        };
        core.apply_ids(&ids, ScopeMode::Fill);
        Self { ctx, ids, core }
    }

    /// Adds ids without overwriting existing ones, then propagates to the core.
    pub fn set_ids(&mut self, ids: ServiceIds) -> &mut Self {
        self.ids.fill_from(&ids);
        let scope = self.ids.clone();
        self.core.apply_ids(&scope, ScopeMode::Fill);
        self
    }

    /// Replaces the ids wholesale, then propagates to the core.
    pub fn reset_ids(&mut self, ids: ServiceIds) -> &mut Self {
        self.ids = ids;
        self.core.apply_ids(&self.ids, ScopeMode::Replace);
        self
    }

    /// Current scope.
    #[must_use]
    pub fn ids(&self) -> &ServiceIds {
        &self.ids
    }

    /// The request context.
    #[must_use]
    pub fn ctx(&self) -> &'ctx RequestContext {
        self.ctx
    }

    /// The core.
    #[must_use]
    pub fn core(&self) -> &C {
        &self.core
    }

    /// Store scope, required.
    pub fn store_id(&self) -> BackofficeResult<i64> {
        self.ids.require("store_id")
    }

    /// A filter on every id named in `required`, failing before any query
    /// runs if one is unset.
    pub fn scoped_filter(&self, required: &[&str]) -> BackofficeResult<Filter> {
        required.iter().try_fold(Filter::new(), |filter, name| {
            Ok(filter.eq(*name, self.ids.require(name)?))
        })
    }
}
