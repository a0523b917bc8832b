//! Route table for back-office contracts.
//!
//! Contracts declare paths with bracketed parameters such as
//! `store/[store_id]/announcement/[id]/read`. This crate parses those
//! templates and resolves incoming `(method, path)` pairs to contract names
//! with a radix tree:
//!
//! ```text
//!                 (root)
//!                   │
//!                "store"
//!              ┌────┴─────┐
//!           "list"   "[store_id]"
//!           [GET]         │
//!                  "announcement"
//!                         │
//!                       "[id]"
//!                         │
//!                       "read"
//!                       [POST]
//! ```
//!
//! # Example
//!
//! ```rust
//! use backoffice_router::{PathTemplate, Router};
//! use http::Method;
//!
//! let mut router = Router::new();
//! router.insert(&Method::GET, &PathTemplate::parse("store/list").unwrap(), "listStores").unwrap();
//! router.insert(&Method::GET, &PathTemplate::parse("store/[store_id]").unwrap(), "getStore").unwrap();
//!
//! let m = router.match_route(&Method::GET, "/store/8").unwrap();
//! assert_eq!(m.contract, "getStore");
//! assert_eq!(m.params.get("store_id"), Some("8"));
//! ```

mod error;
mod method_router;
mod node;
mod params;
mod router;
mod template;

pub use error::RouteError;
pub use method_router::MethodRouter;
pub use params::Params;
pub use router::Router;
pub use template::{PathTemplate, Segment};

/// A resolved route: the contract name and the raw captured parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch<'a> {
    /// Name of the matched contract.
    pub contract: &'a str,
    /// Captured path parameters.
    pub params: Params,
}

impl<'a> RouteMatch<'a> {
    /// Creates a route match.
    #[must_use]
    pub fn new(contract: &'a str, params: Params) -> Self {
        Self { contract, params }
    }
}
