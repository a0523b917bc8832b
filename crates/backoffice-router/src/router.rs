//! Route table.

use http::Method;

use crate::error::RouteError;
use crate::method_router::MethodRouter;
use crate::node::Node;
use crate::params::Params;
use crate::template::PathTemplate;
use crate::RouteMatch;

/// Maps `(method, path)` to contract names.
///
/// # Route priority
///
/// Static segments beat parameters, so `store/list` matches before
/// `store/[store_id]` for the path `/store/list`. A parameter branch is still
/// tried when the static branch cannot complete the match.
///
/// # Example
///
/// ```rust
/// use backoffice_router::{PathTemplate, Router};
/// use http::Method;
///
/// let mut router = Router::new();
/// let template = PathTemplate::parse("store/[store_id]/announcement/[id]/read").unwrap();
/// router.insert(&Method::POST, &template, "markAnnouncementRead").unwrap();
///
/// let matched = router.match_route(&Method::POST, "/store/3/announcement/9/read").unwrap();
/// assert_eq!(matched.contract, "markAnnouncementRead");
/// assert_eq!(matched.params.get("store_id"), Some("3"));
/// assert_eq!(matched.params.get("id"), Some("9"));
/// ```
#[derive(Debug, Clone)]
pub struct Router {
    root: Node,
    route_count: usize,
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    /// Creates an empty route table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            root: Node::root(),
            route_count: 0,
        }
    }

    /// Binds `method` + `template` to `contract`.
    ///
    /// # Errors
    ///
    /// - [`RouteError::Duplicate`] if the pair is already bound
    /// - [`RouteError::ParamConflict`] if another template names the
    ///   parameter at the same position differently
    /// - [`RouteError::UnsupportedMethod`] for methods other than GET/POST/PUT/DELETE
    pub fn insert(
        &mut self,
        method: &Method,
        template: &PathTemplate,
        contract: impl Into<String>,
    ) -> Result<(), RouteError> {
        let node = self
            .root
            .descend_or_create(template.segments(), template.as_str())?;

        node.methods_mut()
            .set(method, contract)
            .map_err(|err| match err {
                RouteError::Duplicate {
                    method, existing, ..
                } => RouteError::Duplicate {
                    method,
                    template: template.to_string(),
                    existing,
                },
                other => other,
            })?;

        self.route_count += 1;
        Ok(())
    }

    /// Resolves a request.
    ///
    /// Returns `None` when no path matches or the path does not accept
    /// `method`; use [`Router::allowed_methods`] to tell the two apart.
    #[must_use]
    pub fn match_route(&self, method: &Method, path: &str) -> Option<RouteMatch<'_>> {
        let (methods, params) = self.match_path(path)?;
        let contract = methods.get(method)?;
        Some(RouteMatch::new(contract, params))
    }

    /// Resolves a path without looking at the method.
    #[must_use]
    pub fn match_path(&self, path: &str) -> Option<(&MethodRouter, Params)> {
        let path = path.split('?').next().unwrap_or(path);
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let mut params = Params::new();
        let methods = self.root.match_segments(&segments, &mut params)?;
        Some((methods, params))
    }

    /// Methods accepted on `path`, empty if nothing matches.
    #[must_use]
    pub fn allowed_methods(&self, path: &str) -> Vec<Method> {
        self.match_path(path)
            .map(|(m, _)| m.allowed_methods())
            .unwrap_or_default()
    }

    /// Number of bound `(method, path)` pairs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.route_count
    }

    /// Returns true if no route is bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.route_count == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str) -> PathTemplate {
        PathTemplate::parse(s).unwrap()
    }

    #[test]
    fn test_static_beats_param() {
        let mut router = Router::new();
        router.insert(&Method::GET, &t("store/[store_id]"), "getStore").unwrap();
        router.insert(&Method::GET, &t("store/list"), "listStores").unwrap();

        let m = router.match_route(&Method::GET, "/store/list").unwrap();
        assert_eq!(m.contract, "listStores");
        assert!(m.params.is_empty());

        let m = router.match_route(&Method::GET, "/store/12").unwrap();
        assert_eq!(m.contract, "getStore");
        assert_eq!(m.params.get("store_id"), Some("12"));
    }

    #[test]
    fn test_backtracks_into_param_branch() {
        let mut router = Router::new();
        router.insert(&Method::GET, &t("store/list/summary"), "summary").unwrap();
        router.insert(&Method::GET, &t("store/[store_id]/stats"), "stats").unwrap();

        let m = router.match_route(&Method::GET, "/store/list/stats").unwrap();
        assert_eq!(m.contract, "stats");
        assert_eq!(m.params.len(), 1);
        assert_eq!(m.params.get("store_id"), Some("list"));
    }

    #[test]
    fn test_duplicate_route_rejected() {
        let mut router = Router::new();
        router.insert(&Method::POST, &t("store/[store_id]/close"), "close").unwrap();
        let err = router
            .insert(&Method::POST, &t("/store/[store_id]/close/"), "closeAgain")
            .unwrap_err();

        assert_eq!(
            err,
            RouteError::Duplicate {
                method: "POST".to_string(),
                template: "/store/[store_id]/close".to_string(),
                existing: "close".to_string(),
            }
        );
        assert_eq!(router.len(), 1);
    }

    #[test]
    fn test_param_name_conflict() {
        let mut router = Router::new();
        router.insert(&Method::GET, &t("store/[store_id]"), "a").unwrap();
        let err = router.insert(&Method::PUT, &t("store/[id]"), "b").unwrap_err();
        assert!(matches!(err, RouteError::ParamConflict { .. }));
    }

    #[test]
    fn test_allowed_methods_and_miss() {
        let mut router = Router::new();
        router.insert(&Method::GET, &t("announcement"), "list").unwrap();
        router.insert(&Method::POST, &t("announcement"), "create").unwrap();

        assert!(router.match_route(&Method::DELETE, "/announcement").is_none());
        assert_eq!(router.allowed_methods("/announcement"), vec![Method::GET, Method::POST]);
        assert!(router.allowed_methods("/nothing").is_empty());
        assert!(router.match_route(&Method::GET, "/announcement/extra").is_none());
    }

    #[test]
    fn test_query_string_is_ignored() {
        let mut router = Router::new();
        router.insert(&Method::GET, &t("store/[store_id]/items"), "items").unwrap();
        let m = router.match_route(&Method::GET, "/store/5/items?take=10").unwrap();
        assert_eq!(m.params.get("store_id"), Some("5"));
    }
}
