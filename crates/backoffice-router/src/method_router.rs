//! Per-path method table.

use http::Method;

use crate::error::RouteError;

/// Maps the methods a contract may use to contract names for one path.
///
/// Contracts are served over GET, POST, PUT and DELETE only.
///
/// # Example
///
/// ```rust
/// use backoffice_router::MethodRouter;
/// use http::Method;
///
/// let mut methods = MethodRouter::new();
/// methods.set(&Method::GET, "listAnnouncements").unwrap();
/// methods.set(&Method::POST, "createAnnouncement").unwrap();
///
/// assert_eq!(methods.get(&Method::GET), Some("listAnnouncements"));
/// assert_eq!(methods.get(&Method::DELETE), None);
/// assert!(methods.set(&Method::GET, "other").is_err());
/// ```
#[derive(Debug, Clone, Default)]
pub struct MethodRouter {
    get: Option<String>,
    post: Option<String>,
    put: Option<String>,
    delete: Option<String>,
}

impl MethodRouter {
    /// Creates an empty method table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn slot_mut(&mut self, method: &Method) -> Result<&mut Option<String>, RouteError> {
        match *method {
            Method::GET => Ok(&mut self.get),
            Method::POST => Ok(&mut self.post),
            Method::PUT => Ok(&mut self.put),
            Method::DELETE => Ok(&mut self.delete),
            _ => Err(RouteError::UnsupportedMethod(method.to_string())),
        }
    }

    /// Binds `method` to `contract`.
    ///
    /// Fails with [`RouteError::Duplicate`] if the method is already bound.
    /// The returned error carries an empty template; [`crate::Router`] fills it in.
    pub fn set(&mut self, method: &Method, contract: impl Into<String>) -> Result<(), RouteError> {
        let slot = self.slot_mut(method)?;
        if let Some(existing) = slot {
            return Err(RouteError::Duplicate {
                method: method.to_string(),
                template: String::new(),
                existing: existing.clone(),
            });
        }
        *slot = Some(contract.into());
        Ok(())
    }

    /// Returns the contract bound to `method`.
    #[must_use]
    pub fn get(&self, method: &Method) -> Option<&str> {
        match *method {
            Method::GET => self.get.as_deref(),
            Method::POST => self.post.as_deref(),
            Method::PUT => self.put.as_deref(),
            Method::DELETE => self.delete.as_deref(),
            _ => None,
        }
    }

    /// Methods bound on this path, for `Allow` headers on 405 responses.
    #[must_use]
    pub fn allowed_methods(&self) -> Vec<Method> {
        [
            (Method::GET, &self.get),
            (Method::POST, &self.post),
            (Method::PUT, &self.put),
            (Method::DELETE, &self.delete),
        ]
        .into_iter()
        .filter(|(_, slot)| slot.is_some())
        .map(|(m, _)| m)
        .collect()
    }

    /// Returns true if no method is bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.get.is_none() && self.post.is_none() && self.put.is_none() && self.delete.is_none()
    }
}
