//! Path templates with bracketed parameters.
//!
//! Templates look like `store/[store_id]/announcement/[id]/read`. Leading and
//! trailing slashes are ignored, so `/store/[store_id]/` and `store/[store_id]`
//! are the same template.

use std::fmt;
use std::str::FromStr;

use crate::error::RouteError;

/// One segment of a [`PathTemplate`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    /// Literal text that must match exactly.
    Static(String),
    /// Named parameter captured from the request path.
    Param(String),
}

impl Segment {
    /// Returns the parameter name, if this is a parameter segment.
    #[must_use]
    pub fn param_name(&self) -> Option<&str> {
        match self {
            Self::Param(name) => Some(name),
            Self::Static(_) => None,
        }
    }
}

/// A parsed, normalized path template.
///
/// # Example
///
/// ```rust
/// use backoffice_router::PathTemplate;
///
/// let template = PathTemplate::parse("/store/[store_id]/announcement/[id]/read").unwrap();
/// assert_eq!(template.as_str(), "store/[store_id]/announcement/[id]/read");
/// assert_eq!(template.param_names().collect::<Vec<_>>(), vec!["store_id", "id"]);
/// assert_eq!(template.to_openapi(), "/store/{store_id}/announcement/{id}/read");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PathTemplate {
    raw: String,
    segments: Vec<Segment>,
}

impl PathTemplate {
    /// Parses a template.
    ///
    /// # Errors
    ///
    /// Returns [`RouteError::InvalidTemplate`] for empty parameter names,
    /// characters outside `[A-Za-z0-9_]` in a parameter name, stray brackets,
    /// or a parameter name used twice.
    pub fn parse(template: &str) -> Result<Self, RouteError> {
        let mut segments = Vec::new();

        for part in template.split('/').filter(|s| !s.is_empty()) {
            if let Some(inner) = part.strip_prefix('[') {
                let name = inner
                    .strip_suffix(']')
                    .ok_or_else(|| RouteError::invalid(template, format!("unclosed '[' in '{part}'")))?;

                if name.is_empty() {
                    return Err(RouteError::invalid(template, "empty parameter name"));
                }
                if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                    return Err(RouteError::invalid(
                        template,
                        format!("parameter name '{name}' must be alphanumeric or '_'"),
                    ));
                }
                if segments.iter().any(|s: &Segment| s.param_name() == Some(name)) {
                    return Err(RouteError::invalid(
                        template,
                        format!("parameter [{name}] appears twice"),
                    ));
                }
                segments.push(Segment::Param(name.to_string()));
            } else if part.contains('[') || part.contains(']') {
                return Err(RouteError::invalid(
                    template,
                    format!("brackets must wrap a whole segment, got '{part}'"),
                ));
            } else {
                segments.push(Segment::Static(part.to_string()));
            }
        }

        let raw = segments
            .iter()
            .map(|s| match s {
                Segment::Static(text) => text.clone(),
                Segment::Param(name) => format!("[{name}]"),
            })
            .collect::<Vec<_>>()
            .join("/");

        Ok(Self { raw, segments })
    }

    /// Returns the normalized template text (no leading slash).
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Returns the parsed segments.
    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Iterates over parameter names in path order.
    pub fn param_names(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(Segment::param_name)
    }

    /// Returns true if the template captures the named parameter.
    #[must_use]
    pub fn has_param(&self, name: &str) -> bool {
        self.param_names().any(|p| p == name)
    }

    /// Renders the template in OpenAPI form (`/store/{store_id}`).
    #[must_use]
    pub fn to_openapi(&self) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            out.push('/');
            match segment {
                Segment::Static(text) => out.push_str(text),
                Segment::Param(name) => {
                    out.push('{');
                    out.push_str(name);
                    out.push('}');
                }
            }
        }
        if out.is_empty() {
            out.push('/');
        }
        out
    }
}

impl fmt::Display for PathTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.raw)
    }
}

impl FromStr for PathTemplate {
    type Err = RouteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
