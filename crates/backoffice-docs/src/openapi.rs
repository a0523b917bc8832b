//! OpenAPI 3.0 document types.
//!
//! Only the parts of <https://spec.openapis.org/oas/v3.0.3> the generator
//! emits are modeled. Contract roles and the stream marker travel as the
//! `x-roles` and `x-stream` extensions.

use std::collections::BTreeMap;

use http::Method;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// The served document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenApi {
    /// Always `3.0.3`.
    pub openapi: String,
    /// Title and version.
    pub info: Info,
    /// Keyed by `{param}` path, in registration order.
    #[serde(default)]
    pub paths: IndexMap<String, PathItem>,
    /// Credential schemes.
    #[serde(default)]
    pub components: Components,
    /// Union of every contract's tags, sorted.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<Tag>,
}

impl OpenApi {
    /// Every operation with its method and path, in document order.
    pub fn operations(&self) -> impl Iterator<Item = (Method, &str, &Operation)> {
        self.paths.iter().flat_map(|(path, item)| {
            item.operations()
                .into_iter()
                .map(move |(method, op)| (method, path.as_str(), op))
        })
    }

    /// Looks up an operation by its id.
    #[must_use]
    pub fn operation(&self, operation_id: &str) -> Option<(Method, &str, &Operation)> {
        self.operations().find(|(_, _, op)| op.operation_id == operation_id)
    }

    /// Serializes to pretty JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Title block of the document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Info {
    /// API title.
    pub title: String,
    /// Crate version unless overridden.
    pub version: String,
    /// Longer prose.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Operations sharing a path, keyed by lowercase method name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PathItem {
    by_method: BTreeMap<String, Operation>,
}

impl PathItem {
    /// Stores `operation` under `method`. Returns the operation back when
    /// the slot is taken or the method is not one contracts may use.
    pub fn insert(&mut self, method: &Method, operation: Operation) -> Result<(), Operation> {
        if !matches!(*method, Method::GET | Method::POST | Method::PUT | Method::DELETE) {
            return Err(operation);
        }
        let key = method.as_str().to_ascii_lowercase();
        if self.by_method.contains_key(&key) {
            return Err(operation);
        }
        self.by_method.insert(key, operation);
        Ok(())
    }

    /// Stored operations with their methods.
    #[must_use]
    pub fn operations(&self) -> Vec<(Method, &Operation)> {
        self.by_method
            .iter()
            .filter_map(|(name, op)| {
                Method::from_bytes(name.to_ascii_uppercase().as_bytes())
                    .ok()
                    .map(|method| (method, op))
            })
            .collect()
    }
}

/// One documented contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    /// Contract name.
    #[serde(rename = "operationId")]
    pub operation_id: String,
    /// One-line summary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Longer prose.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Grouping tags.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Path parameters first, then query parameters.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<Parameter>,
    /// Present when the contract declares a body shape.
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "requestBody")]
    pub request_body: Option<RequestBody>,
    /// Keyed by status code; declared errors included.
    pub responses: IndexMap<String, Response>,
    /// Alternative credential requirements, one per admitted role.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub security: Vec<SecurityRequirement>,
    /// Roles admitted by the contract.
    #[serde(rename = "x-roles")]
    pub roles: Vec<String>,
    /// Policies evaluated after the role check.
    #[serde(default, rename = "x-policies", skip_serializing_if = "Vec::is_empty")]
    pub policies: Vec<String>,
    /// The contract answers with an event stream.
    #[serde(default, rename = "x-stream", skip_serializing_if = "std::ops::Not::not")]
    pub stream: bool,
}

/// Where a parameter is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterIn {
    /// `?name=value`.
    Query,
    /// A bracketed template segment.
    Path,
}

/// A path or query parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    /// Name as declared.
    pub name: String,
    /// Path or query.
    #[serde(rename = "in")]
    pub location: ParameterIn,
    /// Longer prose.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Always true for path parameters.
    #[serde(default)]
    pub required: bool,
    /// Value schema.
    pub schema: Schema,
}

/// JSON request body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestBody {
    /// Whether the value must be present.
    #[serde(default)]
    pub required: bool,
    /// By content type; only JSON is emitted.
    pub content: IndexMap<String, MediaType>,
}

/// Body schema for one content type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaType {
    /// Value schema.
    pub schema: Schema,
    /// Static body declared by the contract, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub example: Option<serde_json::Value>,
}

/// One status code's answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Mandatory in OpenAPI; the declared message for declared errors.
    pub description: String,
    /// Empty for streams and bodiless answers.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub content: IndexMap<String, MediaType>,
}

/// Shared schemas and the credential schemes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Components {
    /// Named schemas.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub schemas: IndexMap<String, Schema>,
    /// Role credentials by scheme name.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty", rename = "securitySchemes")]
    pub security_schemes: IndexMap<String, SecurityScheme>,
}

/// How a caller proves a role: a bearer session or a token header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityScheme {
    /// `http` for sessions, `apiKey` for token headers.
    #[serde(rename = "type")]
    pub scheme_type: String,
    /// Longer prose.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// `bearer` when `scheme_type` is `http`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheme: Option<String>,
    /// `header` when `scheme_type` is `apiKey`.
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "in")]
    pub location: Option<String>,
    /// Header carrying the token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Scheme name to scopes. Scopes are always empty here.
pub type SecurityRequirement = BTreeMap<String, Vec<String>>;

/// Document-level tag entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    /// Name as declared.
    pub name: String,
}

/// The `type` keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaType {
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
}

/// Schema object. A schema with no type accepts any value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    /// Unset for any-value schemas.
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "type")]
    pub schema_type: Option<SchemaType>,
    /// `date-time` for datetime shapes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    /// Longer prose.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// `#/components/schemas/...` pointer.
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "$ref")]
    pub reference: Option<String>,
    /// Object fields.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub properties: IndexMap<String, Schema>,
    /// Whether the value must be present.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
    /// `Some(true)` only for objects that allow unknown fields.
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "additionalProperties")]
    pub additional_properties: Option<bool>,
    /// Element schema of arrays.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<Schema>>,
    /// Allowed values.
    #[serde(default, skip_serializing_if = "Vec::is_empty", rename = "enum")]
    pub enum_values: Vec<serde_json::Value>,
    /// Inclusive bounds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    /// Upper bound.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
    /// String length bounds.
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "minLength")]
    pub min_length: Option<u64>,
    /// Upper length bound.
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "maxLength")]
    pub max_length: Option<u64>,
    /// Whether null is accepted.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub nullable: bool,
}

impl Schema {
    /// A schema of one type.
    #[must_use]
    pub fn typed(schema_type: SchemaType) -> Self {
        Self {
            schema_type: Some(schema_type),
            ..Self::default()
        }
    }

    /// A schema accepting anything.
    #[must_use]
    pub fn any() -> Self {
        Self::default()
    }

    /// A reference to `#/components/schemas/{name}`.
    #[must_use]
    pub fn reference(name: &str) -> Self {
        Self {
            reference: Some(format!("#/components/schemas/{name}")),
            ..Self::default()
        }
    }

    /// Adds a property.
    #[must_use]
    pub fn property(mut self, name: impl Into<String>, schema: Schema, required: bool) -> Self {
        let name = name.into();
        if required {
            self.required.push(name.clone());
        }
        self.properties.insert(name, schema);
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}
