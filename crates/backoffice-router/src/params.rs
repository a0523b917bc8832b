//! Captured path parameters.
//!
//! Most back-office routes carry one or two parameters (`[store_id]`, `[id]`),
//! so values are kept inline in a small vector.

use smallvec::SmallVec;

const INLINE_PARAMS: usize = 4;

/// Raw path parameters captured by a route match, in path order.
///
/// Values are the undecoded path segments; typing and coercion happen in the
/// validation layer.
///
/// # Example
///
/// ```rust
/// use backoffice_router::Params;
///
/// let mut params = Params::new();
/// params.push("store_id", "42");
/// params.push("id", "7");
///
/// assert_eq!(params.get("store_id"), Some("42"));
/// assert_eq!(params.get("id"), Some("7"));
/// assert_eq!(params.get("missing"), None);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Params {
    inner: SmallVec<[(String, String); INLINE_PARAMS]>,
}

impl Params {
    /// Creates an empty parameter set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a captured parameter.
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.inner.push((name.into(), value.into()));
    }

    /// Removes the most recently captured parameter.
    pub fn pop(&mut self) -> Option<(String, String)> {
        self.inner.pop()
    }

    /// Drops every parameter past `len`. Used when a match attempt backtracks.
    pub fn truncate(&mut self, len: usize) {
        self.inner.truncate(len);
    }

    /// Returns the value captured for `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.inner
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Returns true if nothing was captured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Returns the number of captured parameters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Iterates over `(name, value)` pairs in path order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inner.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }
}

impl FromIterator<(String, String)> for Params {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            inner: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_and_get() {
        let mut params = Params::new();
        params.push("store_id", "1");
        params.push("id", "abc");

        assert_eq!(params.get("store_id"), Some("1"));
        assert_eq!(params.get("id"), Some("abc"));
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn test_truncate_backtracks() {
        let mut params = Params::new();
        params.push("a", "1");
        let mark = params.len();
        params.push("b", "2");
        params.push("c", "3");

        params.truncate(mark);
        assert_eq!(params.iter().collect::<Vec<_>>(), vec![("a", "1")]);
        assert_eq!(params.pop(), Some(("a".to_string(), "1".to_string())));
        assert!(params.is_empty());
    }

    #[test]
    fn test_spills_past_inline_capacity() {
        let params: Params = (0..10)
            .map(|i| (format!("k{i}"), format!("v{i}")))
            .collect();
        assert_eq!(params.len(), 10);
        assert_eq!(params.get("k7"), Some("v7"));
    }
}
