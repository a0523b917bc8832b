//! Contract registry to OpenAPI conversion.

use std::collections::BTreeSet;

use backoffice_core::identity::{ADMIN_TOKEN_HEADER, BOT_TOKEN_HEADER};
use backoffice_core::schema::ShapeKind;
use backoffice_core::{ContractDefinition, ContractRegistry, Role, Shape};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{DocsError, DocsResult};
use crate::openapi::{
    Components, Info, MediaType, OpenApi, Operation, Parameter, ParameterIn, PathItem, RequestBody, Response,
    Schema, SchemaType, SecurityRequirement, SecurityScheme, Tag,
};

const JSON: &str = "application/json";
const EVENT_STREAM: &str = "text/event-stream";
const ERROR_SCHEMA: &str = "ErrorEnvelope";

/// What to do with a contract whose shapes have no schema equivalent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnrepresentablePolicy {
    /// Document the shape as an untyped schema.
    #[default]
    Any,
    /// Leave the whole contract out, with a warning.
    Skip,
}

/// A contract left out of the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedContract {
    /// Contract name.
    pub contract: String,
    /// The shape that could not be represented.
    pub reason: String,
}

/// A generated document plus the contracts it does not cover.
#[derive(Debug, Clone)]
pub struct GeneratedDocs {
    /// The document.
    pub document: OpenApi,
    /// Contracts skipped under [`UnrepresentablePolicy::Skip`].
    pub skipped: Vec<SkippedContract>,
}

/// Builds an OpenAPI document from the contract registry.
///
/// # Example
///
/// ```rust
/// use backoffice_core::{ContractDefinition, ContractRegistry, Role};
/// use backoffice_docs::OpenApiGenerator;
///
/// let mut registry = ContractRegistry::new();
/// registry
///     .register(
///         ContractDefinition::builder("store_status")
///             .path("store/[store_id]/status")
///             .role(Role::Pos)
///             .build()
///             .unwrap(),
///     )
///     .unwrap();
///
/// let docs = OpenApiGenerator::new().title("Back office").generate(&registry).unwrap();
/// let (method, path, op) = docs.document.operation("store_status").unwrap();
/// assert_eq!(method, http::Method::GET);
/// assert_eq!(path, "/store/{store_id}/status");
/// assert_eq!(op.roles, vec!["pos"]);
/// ```
#[derive(Debug, Clone)]
pub struct OpenApiGenerator {
    title: String,
    version: String,
    description: Option<String>,
    policy: UnrepresentablePolicy,
}

impl Default for OpenApiGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl OpenApiGenerator {
    /// Create a new generator.
    #[must_use]
    pub fn new() -> Self {
        Self {
            title: "Back office API".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            description: None,
            policy: UnrepresentablePolicy::default(),
        }
    }

    /// Set the API title.
    #[must_use]
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Set the API version.
    #[must_use]
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Set the API description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the policy for unrepresentable shapes.
    #[must_use]
    pub fn unrepresentable(mut self, policy: UnrepresentablePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Generate the document for every registered contract.
    pub fn generate(&self, registry: &ContractRegistry) -> DocsResult<GeneratedDocs> {
        let mut paths: IndexMap<String, PathItem> = IndexMap::new();
        let mut tags = BTreeSet::new();
        let mut skipped = Vec::new();

        for contract in registry.iter() {
            if self.policy == UnrepresentablePolicy::Skip {
                if let Some(name) = first_custom(contract) {
                    warn!(contract = contract.name(), shape = name, "contract skipped in documentation");
                    skipped.push(SkippedContract {
                        contract: contract.name().to_string(),
                        reason: format!("shape '{name}' has no schema representation"),
                    });
                    continue;
                }
            }

            let operation = convert_operation(contract);
            tags.extend(operation.tags.iter().cloned());

            let item = paths.entry(contract.path().to_openapi()).or_default();
            if item.insert(contract.method(), operation).is_err() {
                return Err(DocsError::InvalidContract {
                    contract: contract.name().to_string(),
                    reason: format!("{} {} cannot be documented", contract.method(), contract.path()),
                });
            }
        }

        let document = OpenApi {
            openapi: "3.0.3".to_string(),
            info: Info {
                title: self.title.clone(),
                version: self.version.clone(),
                description: self.description.clone(),
            },
            paths,
            components: components(),
            tags: tags.into_iter().map(|name| Tag { name }).collect(),
        };
        Ok(GeneratedDocs { document, skipped })
    }
}

fn convert_operation(contract: &ContractDefinition) -> Operation {
    let request = contract.request();
    let mut parameters = params_of(&request.params, ParameterIn::Path);
    parameters.extend(params_of(&request.query, ParameterIn::Query));

    let request_body = request.body.as_ref().map(|body| {
        let required = body.is_required() || body.fields().is_some_and(|f| f.values().any(Shape::is_required));
        RequestBody {
            required,
            content: media(JSON, shape_schema(body), None),
        }
    });

    Operation {
        operation_id: contract.name().to_string(),
        summary: contract.summary().map(str::to_string),
        description: contract.description().map(str::to_string),
        tags: contract.tags().to_vec(),
        parameters,
        request_body,
        responses: responses(contract),
        security: contract.roles().iter().filter_map(|role| security_for(*role)).collect(),
        roles: contract.roles().iter().map(|role| role.as_str().to_string()).collect(),
        policies: contract.policies().iter().map(ToString::to_string).collect(),
        stream: contract.is_stream(),
    }
}

fn params_of(shape: &Shape, location: ParameterIn) -> Vec<Parameter> {
    let Some(fields) = shape.fields() else {
        return Vec::new();
    };
    fields
        .iter()
        .map(|(name, field)| Parameter {
            name: name.clone(),
            location,
            description: field.description().map(str::to_string),
            required: location == ParameterIn::Path || field.is_required(),
            schema: shape_schema(field),
        })
        .collect()
}

fn responses(contract: &ContractDefinition) -> IndexMap<String, Response> {
    let mut out = IndexMap::new();

    for (status, spec) in contract.responses() {
        let description = spec
            .description
            .clone()
            .unwrap_or_else(|| default_description(*status).to_string());
        let content = if contract.is_stream() {
            media(
                EVENT_STREAM,
                Schema::typed(SchemaType::String).with_description("One JSON-encoded event per message"),
                None,
            )
        } else {
            let envelope = Schema::typed(SchemaType::Object).property("data", shape_schema(&spec.shape), false);
            media(JSON, envelope, spec.static_body.clone())
        };
        out.insert(status.to_string(), Response { description, content });
    }

    for (name, declared) in contract.errors() {
        out.entry(declared.status.to_string()).or_insert_with(|| Response {
            description: format!("{name}: {}", declared.message),
            content: media(JSON, Schema::reference(ERROR_SCHEMA), None),
        });
    }

    out.insert(
        "default".to_string(),
        Response {
            description: "Error".to_string(),
            content: media(JSON, Schema::reference(ERROR_SCHEMA), None),
        },
    );
    out
}

fn default_description(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        204 => "No Content",
        _ => "Response",
    }
}

fn media(content_type: &str, schema: Schema, example: Option<serde_json::Value>) -> IndexMap<String, MediaType> {
    let mut content = IndexMap::new();
    content.insert(content_type.to_string(), MediaType { schema, example });
    content
}

/// Converts a field shape. Constraints carry over one to one; custom shapes
/// become untyped schemas.
pub fn shape_schema(shape: &Shape) -> Schema {
    let mut schema = match shape.kind() {
        ShapeKind::String { min_len, max_len, one_of } => Schema {
            min_length: min_len.map(|n| n as u64),
            max_length: max_len.map(|n| n as u64),
            enum_values: one_of
                .iter()
                .flatten()
                .map(|v| serde_json::Value::String(v.clone()))
                .collect(),
            ..Schema::typed(SchemaType::String)
        },
        ShapeKind::Integer { min, max } => Schema {
            minimum: min.map(|n| n as f64),
            maximum: max.map(|n| n as f64),
            ..Schema::typed(SchemaType::Integer)
        },
        ShapeKind::Number { min, max } => Schema {
            minimum: *min,
            maximum: *max,
            ..Schema::typed(SchemaType::Number)
        },
        ShapeKind::Boolean => Schema::typed(SchemaType::Boolean),
        ShapeKind::DateTime => Schema {
            format: Some("date-time".to_string()),
            ..Schema::typed(SchemaType::String)
        },
        ShapeKind::Array(item) => Schema {
            items: Some(Box::new(shape_schema(item))),
            ..Schema::typed(SchemaType::Array)
        },
        ShapeKind::Object { fields, strict } => {
            let mut object = Schema::typed(SchemaType::Object);
            for (name, field) in fields {
                object = object.property(name.clone(), shape_schema(field), field.is_required());
            }
            if *strict {
                object.additional_properties = Some(false);
            }
            object
        }
        ShapeKind::Any => Schema::any(),
        ShapeKind::Custom { name, .. } => Schema::any().with_description(format!("opaque: {name}")),
    };
    if let Some(description) = shape.description() {
        schema.description = Some(description.to_string());
    }
    schema.nullable = shape.is_nullable();
    schema
}

fn first_custom(contract: &ContractDefinition) -> Option<&'static str> {
    let request = contract.request();
    std::iter::once(&request.params)
        .chain(std::iter::once(&request.query))
        .chain(request.body.iter())
        .chain(contract.responses().values().map(|spec| &spec.shape))
        .find_map(custom_in)
}

fn custom_in(shape: &Shape) -> Option<&'static str> {
    match shape.kind() {
        ShapeKind::Custom { name, .. } => Some(*name),
        ShapeKind::Array(item) => custom_in(item),
        ShapeKind::Object { fields, .. } => fields.values().find_map(custom_in),
        _ => None,
    }
}

fn security_for(role: Role) -> Option<SecurityRequirement> {
    let scheme = match role {
        Role::Everyone => return None,
        Role::Pos => "session",
        Role::Bot => "botToken",
        Role::Admin => "adminToken",
    };
    Some(SecurityRequirement::from([(scheme.to_string(), Vec::new())]))
}

fn components() -> Components {
    let mut security_schemes = IndexMap::new();
    security_schemes.insert(
        "session".to_string(),
        SecurityScheme {
            scheme_type: "http".to_string(),
            description: Some("POS terminal session".to_string()),
            scheme: Some("bearer".to_string()),
            location: None,
            name: None,
        },
    );
    for (key, header, description) in [
        ("botToken", BOT_TOKEN_HEADER, "Automation shared secret"),
        ("adminToken", ADMIN_TOKEN_HEADER, "Administrator shared secret"),
    ] {
        security_schemes.insert(
            key.to_string(),
            SecurityScheme {
                scheme_type: "apiKey".to_string(),
                description: Some(description.to_string()),
                scheme: None,
                location: Some("header".to_string()),
                name: Some(header.to_string()),
            },
        );
    }

    let detail = Schema::typed(SchemaType::Object)
        .property("code", Schema::typed(SchemaType::String), true)
        .property("message", Schema::typed(SchemaType::String), true)
        .property("category", Schema::typed(SchemaType::String), true)
        .property("details", Schema::any(), false);
    let envelope = Schema::typed(SchemaType::Object)
        .property("error", detail, true)
        .property("request_id", Schema::typed(SchemaType::String), false);

    let mut schemas = IndexMap::new();
    schemas.insert(ERROR_SCHEMA.to_string(), envelope);
    Components {
        schemas,
        security_schemes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use backoffice_core::Role;
    use http::Method;
    use serde_json::json;

    fn registry() -> ContractRegistry {
        let mut registry = ContractRegistry::new();
        registry
            .register(
                ContractDefinition::builder("announcement_read")
                    .method(Method::POST)
                    .path("store/[store_id]/announcement/[id]/read")
                    .role(Role::Pos)
                    .policy("store_access")
                    .param("store_id", Shape::integer().required())
                    .param("id", Shape::integer().required())
                    .static_response(200, json!({"ok": true}))
                    .tag("announcement")
                    .build()
                    .unwrap(),
            )
            .unwrap();
        registry
            .register(
                ContractDefinition::builder("item_search")
                    .path("store/[store_id]/item")
                    .roles([Role::Pos, Role::Bot])
                    .query_param("name", Shape::string().max_len(40))
                    .query_param("limit", Shape::integer().min(1).max(100).required())
                    .response(200, Shape::array(Shape::object([("id", Shape::integer().required())])))
                    .error("ITEM_LOCKED", 423, "Item is locked")
                    .tag("item")
                    .build()
                    .unwrap(),
            )
            .unwrap();
        registry
            .register(
                ContractDefinition::builder("store_status_stream")
                    .path("store/[store_id]/status/stream")
                    .role(Role::Pos)
                    .stream()
                    .build()
                    .unwrap(),
            )
            .unwrap();
        registry
    }

    fn custom_check(_: &serde_json::Value) -> Result<(), String> {
        Ok(())
    }

    #[test]
    fn test_every_contract_round_trips() {
        let registry = registry();
        let docs = OpenApiGenerator::new().generate(&registry).unwrap();
        assert!(docs.skipped.is_empty());

        for contract in registry.iter() {
            let (method, path, op) = docs.document.operation(contract.name()).unwrap();
            assert_eq!(&method, contract.method());
            assert_eq!(path, contract.path().to_openapi());
            let roles: BTreeSet<Role> = op.roles.iter().map(|r| r.parse().unwrap()).collect();
            assert_eq!(&roles, contract.roles());
        }
        assert_eq!(docs.document.operations().count(), registry.len());
    }

    #[test]
    fn test_parameters_and_constraints() {
        let docs = OpenApiGenerator::new().generate(&registry()).unwrap();
        let (_, _, op) = docs.document.operation("item_search").unwrap();

        let store = op.parameters.iter().find(|p| p.name == "store_id").unwrap();
        assert_eq!(store.location, ParameterIn::Path);
        assert!(store.required);

        let limit = op.parameters.iter().find(|p| p.name == "limit").unwrap();
        assert_eq!(limit.location, ParameterIn::Query);
        assert!(limit.required);
        assert_eq!(limit.schema.minimum, Some(1.0));
        assert_eq!(limit.schema.maximum, Some(100.0));

        let name = op.parameters.iter().find(|p| p.name == "name").unwrap();
        assert!(!name.required);
        assert_eq!(name.schema.max_length, Some(40));

        assert!(op.responses.contains_key("423"));
        assert!(op.responses.contains_key("default"));
        assert_eq!(op.security.len(), 2);
    }

    #[test]
    fn test_static_response_example_and_stream_marker() {
        let docs = OpenApiGenerator::new().generate(&registry()).unwrap();

        let (_, _, read) = docs.document.operation("announcement_read").unwrap();
        assert_eq!(read.responses["200"].content[JSON].example, Some(json!({"ok": true})));
        assert_eq!(read.policies, vec!["store_access"]);

        let (_, _, stream) = docs.document.operation("store_status_stream").unwrap();
        assert!(stream.stream);
        assert!(stream.responses["200"].content.contains_key(EVENT_STREAM));
    }

    #[test]
    fn test_object_schema_is_lossless() {
        let shape = Shape::object([
            ("name", Shape::string().min_len(1).one_of(["a", "b"]).required()),
            ("at", Shape::datetime().nullable()),
        ])
        .strict();
        let schema = shape_schema(&shape);
        assert_eq!(schema.schema_type, Some(SchemaType::Object));
        assert_eq!(schema.required, vec!["name"]);
        assert_eq!(schema.additional_properties, Some(false));
        assert_eq!(schema.properties["name"].min_length, Some(1));
        assert_eq!(schema.properties["name"].enum_values, vec![json!("a"), json!("b")]);
        assert_eq!(schema.properties["at"].format.as_deref(), Some("date-time"));
        assert!(schema.properties["at"].nullable);

        let lenient = shape_schema(&Shape::object([("name", Shape::string())]));
        assert_eq!(lenient.additional_properties, None);
    }

    #[test]
    fn test_unrepresentable_policy() {
        let mut registry = registry();
        registry
            .register(
                ContractDefinition::builder("barcode_lookup")
                    .path("barcode")
                    .role(Role::Everyone)
                    .query_param("code", Shape::custom("ean13", custom_check).required())
                    .build()
                    .unwrap(),
            )
            .unwrap();

        let docs = OpenApiGenerator::new().generate(&registry).unwrap();
        let (_, _, op) = docs.document.operation("barcode_lookup").unwrap();
        assert_eq!(op.parameters[0].schema.schema_type, None);
        assert!(op.security.is_empty());

        let docs = OpenApiGenerator::new()
            .unrepresentable(UnrepresentablePolicy::Skip)
            .generate(&registry)
            .unwrap();
        assert!(docs.document.operation("barcode_lookup").is_none());
        assert_eq!(docs.skipped.len(), 1);
        assert_eq!(docs.skipped[0].contract, "barcode_lookup");
        assert_eq!(docs.document.operations().count(), 3);
    }

    #[test]
    fn test_document_serializes() {
        let docs = OpenApiGenerator::new().title("Back office").generate(&registry()).unwrap();
        let json: serde_json::Value = serde_json::from_str(&docs.document.to_json().unwrap()).unwrap();
        assert_eq!(json["openapi"], "3.0.3");
        assert_eq!(json["info"]["title"], "Back office");
        assert_eq!(
            json["paths"]["/store/{store_id}/announcement/{id}/read"]["post"]["x-roles"],
            json!(["pos"])
        );
        assert_eq!(json["components"]["securitySchemes"]["botToken"]["name"], "bottoken");

        let parsed: OpenApi = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, docs.document);
    }
}
