//! Contract definitions and the contract registry.
//!
//! A contract is the declarative description of one endpoint: method, path
//! template, required roles and policies, request and response shapes,
//! declared errors and the streaming marker. Definitions are built once at
//! startup and never mutated; the [`ContractRegistry`] resolves
//! `(method, path)` to a definition at dispatch time.
//!
//! # Example
//!
//! ```
//! use backoffice_core::contract::{ContractDefinition, ContractRegistry};
//! use backoffice_core::schema::Shape;
//! use backoffice_core::Role;
//! use http::Method;
//!
//! let mut registry = ContractRegistry::new();
//! registry
//!     .register(
//!         ContractDefinition::builder("markAnnouncementRead")
//!             .method(Method::POST)
//!             .path("store/[store_id]/announcement/[id]/read")
//!             .role(Role::Pos)
//!             .param("store_id", Shape::integer().required())
//!             .param("id", Shape::integer().required())
//!             .build()
//!             .unwrap(),
//!     )
//!     .unwrap();
//!
//! let resolved = registry.resolve(&Method::POST, "/store/3/announcement/9/read");
//! assert!(resolved.is_found());
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use backoffice_router::{Params, PathTemplate, RouteError, Router};
use http::{Method, StatusCode};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::{BackofficeError, BackofficeResult, ErrorCategory, ErrorDetail, ErrorEnvelope, FieldErrors};
use crate::handler::Reply;
use crate::identity::Role;
use crate::schema::{Shape, ShapeKind};

/// Identifier of an authorization policy.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PolicyId(String);

impl PolicyId {
    /// Creates a policy id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PolicyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PolicyId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// An error a contract declares by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclaredError {
    /// HTTP status to answer with.
    pub status: u16,
    /// Client-facing message.
    pub message: String,
}

/// Request shape split by location.
#[derive(Debug, Clone)]
pub struct RequestShape {
    /// Path parameters (object shape).
    pub params: Shape,
    /// Query string (object shape).
    pub query: Shape,
    /// JSON body. `None` means the body is ignored.
    pub body: Option<Shape>,
}

impl Default for RequestShape {
    fn default() -> Self {
        Self {
            params: Shape::empty_object(),
            query: Shape::empty_object(),
            body: None,
        }
    }
}

/// One declared response.
#[derive(Debug, Clone)]
pub struct ResponseSpec {
    /// Shape of the `data` payload.
    pub shape: Shape,
    /// Body returned when the handler produces no value.
    pub static_body: Option<Value>,
    /// Documentation text.
    pub description: Option<String>,
}

/// Unvalidated request parts handed to [`ContractDefinition::parse_request`].
#[derive(Debug, Clone, Copy)]
pub struct RawRequest<'a> {
    /// Path parameters captured by the router.
    pub params: &'a Params,
    /// Raw query string without the leading `?`.
    pub query: &'a str,
    /// Raw body bytes.
    pub body: &'a [u8],
}

/// Validated and coerced request input.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestInput {
    /// Coerced path parameters.
    pub params: Map<String, Value>,
    /// Coerced query parameters.
    pub query: Map<String, Value>,
    /// Validated body, `Null` when absent or ignored.
    pub body: Value,
}

impl RequestInput {
    /// An integer path parameter.
    pub fn param_i64(&self, name: &str) -> BackofficeResult<i64> {
        self.params
            .get(name)
            .and_then(Value::as_i64)
            .ok_or_else(|| BackofficeError::invalid_field(format!("params.{name}"), "must be an integer"))
    }

    /// Deserializes the body into `T`.
    ///
    /// The body already passed shape validation, so a failure here means the
    /// shape and `T` disagree; that is reported as an unknown error.
    pub fn body_as<T: serde::de::DeserializeOwned>(&self) -> BackofficeResult<T> {
        serde_json::from_value(self.body.clone()).map_err(|e| {
            BackofficeError::unknown_with_source("body does not match the handler's type", e)
        })
    }
}

/// An immutable endpoint definition.
#[derive(Debug, Clone)]
pub struct ContractDefinition {
    name: String,
    method: Method,
    path: PathTemplate,
    roles: BTreeSet<Role>,
    policies: Vec<PolicyId>,
    request: RequestShape,
    responses: BTreeMap<u16, ResponseSpec>,
    errors: IndexMap<String, DeclaredError>,
    is_stream: bool,
    summary: Option<String>,
    description: Option<String>,
    tags: Vec<String>,
}

impl ContractDefinition {
    /// Starts a definition.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> ContractBuilder {
        ContractBuilder::new(name)
    }

    /// Unique contract name (operation id).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// HTTP method.
    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Path template.
    #[must_use]
    pub fn path(&self) -> &PathTemplate {
        &self.path
    }

    /// Roles admitted. Contains `Everyone` for public contracts.
    #[must_use]
    pub fn roles(&self) -> &BTreeSet<Role> {
        &self.roles
    }

    /// Policies evaluated in order after the role check.
    #[must_use]
    pub fn policies(&self) -> &[PolicyId] {
        &self.policies
    }

    /// Request shape.
    #[must_use]
    pub fn request(&self) -> &RequestShape {
        &self.request
    }

    /// Declared responses by status.
    #[must_use]
    pub fn responses(&self) -> &BTreeMap<u16, ResponseSpec> {
        &self.responses
    }

    /// Declared errors by name.
    #[must_use]
    pub fn errors(&self) -> &IndexMap<String, DeclaredError> {
        &self.errors
    }

    /// Whether the contract opens an event stream.
    #[must_use]
    pub fn is_stream(&self) -> bool {
        self.is_stream
    }

    /// Short summary.
    #[must_use]
    pub fn summary(&self) -> Option<&str> {
        self.summary.as_deref()
    }

    /// Long description.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Documentation tags.
    #[must_use]
    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// Status used when the handler does not choose one: the lowest declared
    /// 2xx status, or 200.
    #[must_use]
    pub fn default_status(&self) -> u16 {
        self.responses
            .keys()
            .copied()
            .find(|s| (200..300).contains(s))
            .unwrap_or(200)
    }

    /// Coerces and validates path, query and body.
    ///
    /// Every failing field across all three locations is reported in one
    /// [`BackofficeError::Validation`].
    pub fn parse_request(&self, raw: RawRequest<'_>) -> BackofficeResult<RequestInput> {
        let mut errors = FieldErrors::new();

        let params = self
            .request
            .params
            .coerce_pairs(raw.params.iter(), "params", &mut errors);

        let query_pairs: Vec<(String, String)> = if raw.query.is_empty() {
            Vec::new()
        } else {
            match serde_urlencoded::from_str(raw.query) {
                Ok(pairs) => pairs,
                Err(_) => {
                    errors.add("query", "is not a valid query string");
                    Vec::new()
                }
            }
        };
        let query = self.request.query.coerce_pairs(
            query_pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())),
            "query",
            &mut errors,
        );

        let body = match &self.request.body {
            None => Value::Null,
            Some(shape) => {
                let parsed = if raw.body.iter().all(u8::is_ascii_whitespace) {
                    None
                } else {
                    match serde_json::from_slice::<Value>(raw.body) {
                        Ok(v) => Some(v),
                        Err(_) => {
                            errors.add("body", "is not valid JSON");
                            return Err(BackofficeError::validation(errors));
                        }
                    }
                };
                // A missing object body is checked as `{}` so each required
                // field is reported by name.
                let mut parsed = match (parsed, shape.kind()) {
                    (None, ShapeKind::Object { .. }) => Some(Value::Object(Map::new())),
                    (other, _) => other,
                };
                shape.validate_at(parsed.as_ref(), "body", &mut errors);
                if let Some(value) = parsed.as_mut() {
                    shape.strip_unknown(value);
                }
                parsed.unwrap_or(Value::Null)
            }
        };

        errors.into_result()?;
        Ok(RequestInput {
            params,
            query,
            body,
        })
    }

    /// Turns a handler reply into the status and JSON body to send.
    ///
    /// A value that does not match the declared shape for its status is an
    /// unknown error; the mismatch is logged with every failing path.
    pub fn shape_response(&self, reply: Reply) -> BackofficeResult<(StatusCode, Value)> {
        let status = reply.status.map_or_else(|| self.default_status(), |s| s.as_u16());
        let spec = self.responses.get(&status);

        let body = match reply.data {
            Some(data) => {
                if let Some(spec) = spec {
                    if let Err(errors) = spec.shape.check(&data, "response") {
                        tracing::error!(
                            contract = %self.name,
                            status,
                            fields = ?errors.fields,
                            "handler response does not match the declared shape"
                        );
                        return Err(BackofficeError::unknown(format!(
                            "response of '{}' failed shape check",
                            self.name
                        )));
                    }
                }
                json!({ "data": data })
            }
            None => spec
                .and_then(|s| s.static_body.clone())
                .unwrap_or_else(|| json!({ "ok": "completed" })),
        };

        let status = StatusCode::from_u16(status)
            .map_err(|e| BackofficeError::unknown_with_source("invalid response status", e))?;
        Ok((status, body))
    }

    /// Status and client-safe envelope for an error raised while serving
    /// this contract. Declared errors resolve against this contract.
    #[must_use]
    pub fn render_error(&self, err: &BackofficeError, request_id: Option<&str>) -> (StatusCode, ErrorEnvelope) {
        if let BackofficeError::Declared { name } = err {
            if let Some(declared) = self.errors.get(name) {
                if let Ok(status) = StatusCode::from_u16(declared.status) {
                    let envelope = ErrorEnvelope {
                        error: ErrorDetail {
                            code: name.clone(),
                            message: declared.message.clone(),
                            category: ErrorCategory::Declared,
                            details: None,
                        },
                        request_id: request_id.map(ToString::to_string),
                    };
                    return (status, envelope);
                }
            }
            tracing::error!(contract = %self.name, error = %name, "undeclared error name returned by handler");
        }
        (err.status_code(), err.to_envelope(request_id))
    }
}

/// Builder for [`ContractDefinition`].
#[derive(Debug)]
#[must_use]
pub struct ContractBuilder {
    name: String,
    method: Method,
    path: String,
    roles: BTreeSet<Role>,
    policies: Vec<PolicyId>,
    request: RequestShape,
    responses: BTreeMap<u16, ResponseSpec>,
    errors: IndexMap<String, DeclaredError>,
    is_stream: bool,
    summary: Option<String>,
    description: Option<String>,
    tags: Vec<String>,
}

impl ContractBuilder {
    /// Starts a GET contract at `/` with no roles.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            method: Method::GET,
            path: String::new(),
            roles: BTreeSet::new(),
            policies: Vec::new(),
            request: RequestShape::default(),
            responses: BTreeMap::new(),
            errors: IndexMap::new(),
            is_stream: false,
            summary: None,
            description: None,
            tags: Vec::new(),
        }
    }

    /// Sets the method.
    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Sets the path template.
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Admits a role.
    pub fn role(mut self, role: Role) -> Self {
        self.roles.insert(role);
        self
    }

    /// Admits several roles.
    pub fn roles(mut self, roles: impl IntoIterator<Item = Role>) -> Self {
        self.roles.extend(roles);
        self
    }

    /// Appends a policy.
    pub fn policy(mut self, policy: impl Into<PolicyId>) -> Self {
        self.policies.push(policy.into());
        self
    }

    /// Declares a path parameter.
    pub fn param(mut self, name: impl Into<String>, shape: Shape) -> Self {
        self.request.params = self.request.params.with_field(name, shape);
        self
    }

    /// Declares a query parameter.
    pub fn query_param(mut self, name: impl Into<String>, shape: Shape) -> Self {
        self.request.query = self.request.query.with_field(name, shape);
        self
    }

    /// Sets the body shape.
    pub fn body(mut self, shape: Shape) -> Self {
        self.request.body = Some(shape);
        self
    }

    /// Declares the response shape for a status.
    pub fn response(mut self, status: u16, shape: Shape) -> Self {
        self.responses.insert(
            status,
            ResponseSpec {
                shape,
                static_body: None,
                description: None,
            },
        );
        self
    }

    /// Declares a fixed body returned when the handler yields no value.
    pub fn static_response(mut self, status: u16, body: Value) -> Self {
        self.responses.insert(
            status,
            ResponseSpec {
                shape: Shape::any(),
                static_body: Some(body),
                description: None,
            },
        );
        self
    }

    /// Declares a named error.
    pub fn error(mut self, name: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        self.errors.insert(
            name.into(),
            DeclaredError {
                status,
                message: message.into(),
            },
        );
        self
    }

    /// Marks the contract as an event stream.
    pub fn stream(mut self) -> Self {
        self.is_stream = true;
        self
    }

    /// Sets the summary.
    pub fn summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    /// Sets the description.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Adds a tag.
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Finishes the definition.
    ///
    /// Template parameters without a declared shape become required strings.
    /// Fails if the template is malformed, the method is unsupported, no role
    /// is admitted, or a declared parameter is not in the template.
    pub fn build(self) -> BackofficeResult<ContractDefinition> {
        let invalid = |reason: String| {
            BackofficeError::unknown(format!("invalid contract '{}': {reason}", self.name))
        };

        if self.name.is_empty() {
            return Err(invalid("name must not be empty".to_string()));
        }
        if ![Method::GET, Method::POST, Method::PUT, Method::DELETE].contains(&self.method) {
            return Err(invalid(format!("unsupported method {}", self.method)));
        }
        if self.roles.is_empty() {
            return Err(invalid("at least one role is required".to_string()));
        }

        let path = PathTemplate::parse(&self.path).map_err(|e| invalid(e.to_string()))?;

        let mut request = self.request;
        if let Some(fields) = request.params.fields() {
            if let Some(stray) = fields.keys().find(|k| !path.has_param(k)) {
                return Err(invalid(format!("parameter '{stray}' is not in the path")));
            }
        }
        for name in path.param_names() {
            let declared = request
                .params
                .fields()
                .is_some_and(|f| f.contains_key(name));
            if !declared {
                request.params = request
                    .params
                    .with_field(name, Shape::string().required());
            }
        }

        let mut responses = self.responses;
        if responses.is_empty() {
            responses.insert(
                200,
                ResponseSpec {
                    shape: Shape::any(),
                    static_body: None,
                    description: None,
                },
            );
        }

        Ok(ContractDefinition {
            name: self.name,
            method: self.method,
            path,
            roles: self.roles,
            policies: self.policies,
            request,
            responses,
            errors: self.errors,
            is_stream: self.is_stream,
            summary: self.summary,
            description: self.description,
            tags: self.tags,
        })
    }
}

/// Outcome of resolving a request against the registry.
#[derive(Debug)]
pub enum Resolution {
    /// A contract matched.
    Found(Arc<ContractDefinition>, Params),
    /// The path exists but not for this method.
    MethodNotAllowed(Vec<Method>),
    /// Nothing matched.
    NotFound,
}

impl Resolution {
    /// Returns true if a contract matched.
    #[must_use]
    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found(..))
    }
}

/// Registration table of every contract, built at startup.
///
/// Populate it with [`ContractRegistry::register`], then share it behind an
/// `Arc`; it is read-only from then on.
#[derive(Debug, Default)]
pub struct ContractRegistry {
    contracts: IndexMap<String, Arc<ContractDefinition>>,
    router: Router,
}

impl ContractRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a contract.
    ///
    /// Fails with [`BackofficeError::Conflict`] when the name or the
    /// `(method, path)` pair is already taken.
    pub fn register(&mut self, contract: ContractDefinition) -> BackofficeResult<()> {
        if self.contracts.contains_key(contract.name()) {
            return Err(BackofficeError::conflict(format!(
                "contract '{}' is already registered",
                contract.name()
            )));
        }

        self.router
            .insert(contract.method(), contract.path(), contract.name())
            .map_err(|e| match e {
                RouteError::Duplicate { .. } => BackofficeError::conflict(e.to_string()),
                other => BackofficeError::unknown(other.to_string()),
            })?;

        tracing::debug!(
            contract = %contract.name(),
            method = %contract.method(),
            path = %contract.path(),
            "registered contract"
        );
        self.contracts
            .insert(contract.name().to_string(), Arc::new(contract));
        Ok(())
    }

    /// Resolves a request path.
    #[must_use]
    pub fn resolve(&self, method: &Method, path: &str) -> Resolution {
        let Some((methods, params)) = self.router.match_path(path) else {
            return Resolution::NotFound;
        };
        match methods.get(method).and_then(|name| self.contracts.get(name)) {
            Some(contract) => Resolution::Found(Arc::clone(contract), params),
            None => Resolution::MethodNotAllowed(methods.allowed_methods()),
        }
    }

    /// Looks a contract up by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<ContractDefinition>> {
        self.contracts.get(name)
    }

    /// Iterates in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<ContractDefinition>> {
        self.contracts.values()
    }

    /// Number of contracts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.contracts.len()
    }

    /// Returns true if no contract is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.contracts.is_empty()
    }
}
