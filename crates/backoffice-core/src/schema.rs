//! Field shapes and the validation engine.
//!
//! A [`Shape`] describes one value of a request or response. Validation walks
//! the whole value and records every failure under its field path instead of
//! stopping at the first one, so a client can fix a form in one round trip.
//!
//! Path and query values arrive as strings; [`Shape::coerce_pairs`] converts
//! them per the declared shape before validation.
//!
//! # Example
//!
//! ```
//! use backoffice_core::schema::Shape;
//! use serde_json::json;
//!
//! let body = Shape::object([
//!     ("name", Shape::string().min_len(1).required()),
//!     ("price", Shape::integer().min(0).required()),
//!     ("tags", Shape::array(Shape::string())),
//! ]);
//!
//! let errors = body
//!     .check(&json!({ "price": -1, "tags": ["a", 2] }), "body")
//!     .unwrap_err();
//!
//! let paths: Vec<_> = errors.paths().collect();
//! assert_eq!(paths, vec!["body.name", "body.price", "body.tags[1]"]);
//! ```

use chrono::{DateTime, SecondsFormat, Utc};
use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::error::FieldErrors;

/// Signature of a custom check. Returns the failure message on rejection.
pub type CustomCheck = fn(&Value) -> Result<(), String>;

/// The type part of a [`Shape`].
#[derive(Debug, Clone)]
pub enum ShapeKind {
    /// UTF-8 string.
    String {
        /// Minimum length in characters.
        min_len: Option<usize>,
        /// Maximum length in characters.
        max_len: Option<usize>,
        /// Allowed values.
        one_of: Option<Vec<String>>,
    },
    /// Whole number.
    Integer {
        /// Inclusive minimum.
        min: Option<i64>,
        /// Inclusive maximum.
        max: Option<i64>,
    },
    /// Any JSON number.
    Number {
        /// Inclusive minimum.
        min: Option<f64>,
        /// Inclusive maximum.
        max: Option<f64>,
    },
    /// `true` or `false`.
    Boolean,
    /// RFC 3339 timestamp string.
    DateTime,
    /// Homogeneous array.
    Array(Box<Shape>),
    /// Object with declared fields.
    Object {
        /// Declared fields in declaration order.
        fields: IndexMap<String, Shape>,
        /// Reject keys that are not declared instead of dropping them.
        strict: bool,
    },
    /// Anything, including null.
    Any,
    /// Application-defined check with no schema representation.
    Custom {
        /// Name used in documentation warnings.
        name: &'static str,
        /// The check itself.
        check: CustomCheck,
    },
}

/// A field shape: a kind plus presence rules.
///
/// Fields are optional unless marked [`Shape::required`].
#[derive(Debug, Clone)]
pub struct Shape {
    kind: ShapeKind,
    required: bool,
    nullable: bool,
    description: Option<String>,
}

impl Shape {
    fn of(kind: ShapeKind) -> Self {
        Self {
            kind,
            required: false,
            nullable: false,
            description: None,
        }
    }

    /// A string.
    #[must_use]
    pub fn string() -> Self {
        Self::of(ShapeKind::String {
            min_len: None,
            max_len: None,
            one_of: None,
        })
    }

    /// An integer.
    #[must_use]
    pub fn integer() -> Self {
        Self::of(ShapeKind::Integer {
            min: None,
            max: None,
        })
    }

    /// A number.
    #[must_use]
    pub fn number() -> Self {
        Self::of(ShapeKind::Number {
            min: None,
            max: None,
        })
    }

    /// A boolean.
    #[must_use]
    pub fn boolean() -> Self {
        Self::of(ShapeKind::Boolean)
    }

    /// An RFC 3339 timestamp.
    #[must_use]
    pub fn datetime() -> Self {
        Self::of(ShapeKind::DateTime)
    }

    /// An array of `item`.
    #[must_use]
    pub fn array(item: Shape) -> Self {
        Self::of(ShapeKind::Array(Box::new(item)))
    }

    /// An object with the given fields. Unknown keys are rejected.
    #[must_use]
    pub fn object<K: Into<String>>(fields: impl IntoIterator<Item = (K, Shape)>) -> Self {
        Self::of(ShapeKind::Object {
            fields: fields.into_iter().map(|(k, v)| (k.into(), v)).collect(),
            strict: false,
        })
    }

    /// An object with no declared fields.
    #[must_use]
    pub fn empty_object() -> Self {
        Self::object(Vec::<(String, Shape)>::new())
    }

    /// Any value.
    #[must_use]
    pub fn any() -> Self {
        Self::of(ShapeKind::Any)
    }

    /// A value checked by application code.
    #[must_use]
    pub fn custom(name: &'static str, check: CustomCheck) -> Self {
        Self::of(ShapeKind::Custom { name, check })
    }

    /// Marks the field as required.
    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Accepts explicit `null`.
    #[must_use]
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Attaches a description for generated documentation.
    #[must_use]
    pub fn describe(mut self, text: impl Into<String>) -> Self {
        self.description = Some(text.into());
        self
    }

    /// Minimum string length. Ignored on other kinds.
    #[must_use]
    pub fn min_len(mut self, len: usize) -> Self {
        if let ShapeKind::String { min_len, .. } = &mut self.kind {
            *min_len = Some(len);
        }
        self
    }

    /// Maximum string length. Ignored on other kinds.
    #[must_use]
    pub fn max_len(mut self, len: usize) -> Self {
        if let ShapeKind::String { max_len, .. } = &mut self.kind {
            *max_len = Some(len);
        }
        self
    }

    /// Restricts a string to the given values. Ignored on other kinds.
    #[must_use]
    pub fn one_of<S: Into<String>>(mut self, values: impl IntoIterator<Item = S>) -> Self {
        if let ShapeKind::String { one_of, .. } = &mut self.kind {
            *one_of = Some(values.into_iter().map(Into::into).collect());
        }
        self
    }

    /// Inclusive minimum for integers and numbers.
    #[must_use]
    pub fn min(mut self, value: i64) -> Self {
        match &mut self.kind {
            ShapeKind::Integer { min, .. } => *min = Some(value),
            ShapeKind::Number { min, .. } => *min = Some(value as f64),
            _ => {}
        }
        self
    }

    /// Inclusive maximum for integers and numbers.
    #[must_use]
    pub fn max(mut self, value: i64) -> Self {
        match &mut self.kind {
            ShapeKind::Integer { max, .. } => *max = Some(value),
            ShapeKind::Number { max, .. } => *max = Some(value as f64),
            _ => {}
        }
        self
    }

    /// Rejects undeclared object keys. Ignored on other kinds.
    ///
    /// Objects drop undeclared keys by default.
    #[must_use]
    pub fn strict(mut self) -> Self {
        if let ShapeKind::Object { strict, .. } = &mut self.kind {
            *strict = true;
        }
        self
    }

    /// Adds a field to an object shape, replacing one with the same name.
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, shape: Shape) -> Self {
        if let ShapeKind::Object { fields, .. } = &mut self.kind {
            fields.insert(name.into(), shape);
        }
        self
    }

    /// Returns the kind.
    #[must_use]
    pub fn kind(&self) -> &ShapeKind {
        &self.kind
    }

    /// Returns true if the field must be present.
    #[must_use]
    pub fn is_required(&self) -> bool {
        self.required
    }

    /// Returns true if explicit `null` is accepted.
    #[must_use]
    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    /// Returns the description.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Declared fields of an object shape.
    #[must_use]
    pub fn fields(&self) -> Option<&IndexMap<String, Shape>> {
        match &self.kind {
            ShapeKind::Object { fields, .. } => Some(fields),
            _ => None,
        }
    }

    /// Validates `value`, reporting failures under `root`.
    pub fn check(&self, value: &Value, root: &str) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();
        self.validate_at(Some(value), root, &mut errors);
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Validates a possibly-absent value, appending failures to `errors`.
    pub fn validate_at(&self, value: Option<&Value>, path: &str, errors: &mut FieldErrors) {
        let value = match value {
            None => {
                if self.required {
                    errors.add(path, "is required");
                }
                return;
            }
            Some(Value::Null) if matches!(self.kind, ShapeKind::Any) => return,
            Some(Value::Null) => {
                if !self.nullable {
                    errors.add(path, "must not be null");
                }
                return;
            }
            Some(v) => v,
        };

        match &self.kind {
            ShapeKind::String {
                min_len,
                max_len,
                one_of,
            } => {
                let Some(s) = value.as_str() else {
                    errors.add(path, type_message("a string", value));
                    return;
                };
                let len = s.chars().count();
                if let Some(min) = min_len {
                    if len < *min {
                        errors.add(path, format!("must be at least {min} characters"));
                    }
                }
                if let Some(max) = max_len {
                    if len > *max {
                        errors.add(path, format!("must be at most {max} characters"));
                    }
                }
                if let Some(allowed) = one_of {
                    if !allowed.iter().any(|a| a == s) {
                        errors.add(path, format!("must be one of: {}", allowed.join(", ")));
                    }
                }
            }
            ShapeKind::Integer { min, max } => {
                let Some(n) = value.as_i64() else {
                    errors.add(path, type_message("an integer", value));
                    return;
                };
                if let Some(min) = min {
                    if n < *min {
                        errors.add(path, format!("must be at least {min}"));
                    }
                }
                if let Some(max) = max {
                    if n > *max {
                        errors.add(path, format!("must be at most {max}"));
                    }
                }
            }
            ShapeKind::Number { min, max } => {
                let Some(n) = value.as_f64() else {
                    errors.add(path, type_message("a number", value));
                    return;
                };
                if let Some(min) = min {
                    if n < *min {
                        errors.add(path, format!("must be at least {min}"));
                    }
                }
                if let Some(max) = max {
                    if n > *max {
                        errors.add(path, format!("must be at most {max}"));
                    }
                }
            }
            ShapeKind::Boolean => {
                if !value.is_boolean() {
                    errors.add(path, type_message("a boolean", value));
                }
            }
            ShapeKind::DateTime => match value.as_str() {
                Some(s) if DateTime::parse_from_rfc3339(s).is_ok() => {}
                Some(_) => errors.add(path, "must be an RFC 3339 timestamp"),
                None => errors.add(path, type_message("an RFC 3339 timestamp", value)),
            },
            ShapeKind::Array(item) => {
                let Some(items) = value.as_array() else {
                    errors.add(path, type_message("an array", value));
                    return;
                };
                for (i, element) in items.iter().enumerate() {
                    item.validate_at(Some(element), &format!("{path}[{i}]"), errors);
                }
            }
            ShapeKind::Object { fields, strict } => {
                let Some(object) = value.as_object() else {
                    errors.add(path, type_message("an object", value));
                    return;
                };
                for (name, shape) in fields {
                    shape.validate_at(object.get(name), &join(path, name), errors);
                }
                if *strict {
                    for key in object.keys().filter(|k| !fields.contains_key(*k)) {
                        errors.add(join(path, key), "is not a recognized field");
                    }
                }
            }
            ShapeKind::Any => {}
            ShapeKind::Custom { check, .. } => {
                if let Err(message) = check(value) {
                    errors.add(path, message);
                }
            }
        }
    }

    /// Removes undeclared keys from non-strict objects, at any depth.
    pub fn strip_unknown(&self, value: &mut Value) {
        match (&self.kind, value) {
            (ShapeKind::Object { fields, strict }, Value::Object(object)) => {
                if !strict {
                    object.retain(|key, _| fields.contains_key(key));
                }
                for (name, field) in object.iter_mut() {
                    if let Some(shape) = fields.get(name) {
                        shape.strip_unknown(field);
                    }
                }
            }
            (ShapeKind::Array(item), Value::Array(items)) => {
                for element in items {
                    item.strip_unknown(element);
                }
            }
            _ => {}
        }
    }

    /// Converts a raw path or query string into a JSON value of this shape.
    ///
    /// Timestamps are normalized to UTC. Strings that cannot be converted
    /// yield the failure message.
    pub fn coerce(&self, raw: &str) -> Result<Value, String> {
        match &self.kind {
            ShapeKind::Integer { .. } => raw
                .trim()
                .parse::<i64>()
                .map(Value::from)
                .map_err(|_| "must be an integer".to_string()),
            ShapeKind::Number { .. } => raw
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .ok_or_else(|| "must be a number".to_string()),
            ShapeKind::Boolean => match raw.trim() {
                "true" | "1" => Ok(Value::Bool(true)),
                "false" | "0" => Ok(Value::Bool(false)),
                _ => Err("must be true or false".to_string()),
            },
            ShapeKind::DateTime => DateTime::parse_from_rfc3339(raw.trim())
                .map(|dt| {
                    Value::String(
                        dt.with_timezone(&Utc)
                            .to_rfc3339_opts(SecondsFormat::Millis, true),
                    )
                })
                .map_err(|_| "must be an RFC 3339 timestamp".to_string()),
            ShapeKind::Array(item) => raw
                .split(',')
                .filter(|s| !s.is_empty())
                .map(|part| item.coerce(part))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            ShapeKind::Any if raw.is_empty() => Ok(Value::Null),
            _ => Ok(Value::String(raw.to_string())),
        }
    }

    /// Coerces string pairs (path params or query) into an object, validating
    /// the result against this object shape.
    ///
    /// A key repeated for an array field accumulates; for scalar fields the
    /// last occurrence wins. Undeclared keys are dropped unless the shape is
    /// [`strict`](Self::strict). Returns the coerced object even when errors were
    /// recorded so the caller can report every location at once.
    pub fn coerce_pairs<'a>(
        &self,
        pairs: impl IntoIterator<Item = (&'a str, &'a str)>,
        root: &str,
        errors: &mut FieldErrors,
    ) -> Map<String, Value> {
        let mut object = Map::new();
        let (fields, strict) = match &self.kind {
            ShapeKind::Object { fields, strict } => (Some(fields), *strict),
            _ => (None, false),
        };

        for (key, raw) in pairs {
            let path = join(root, key);
            match fields.and_then(|f| f.get(key)) {
                Some(shape) => match (shape.coerce(raw), &shape.kind) {
                    (Ok(Value::Array(items)), ShapeKind::Array(_)) => {
                        match object
                            .entry(key.to_string())
                            .or_insert_with(|| Value::Array(Vec::new()))
                        {
                            Value::Array(existing) => existing.extend(items),
                            other => *other = Value::Array(items),
                        }
                    }
                    (Ok(value), _) => {
                        object.insert(key.to_string(), value);
                    }
                    (Err(message), _) => errors.add(path, message),
                },
                None if fields.is_none() => {
                    object.insert(key.to_string(), Value::String(raw.to_string()));
                }
                None if strict => errors.add(path, "is not a recognized field"),
                None => {}
            }
        }

        if let Some(fields) = fields {
            for (name, shape) in fields {
                if errors.contains(&join(root, name)) {
                    continue;
                }
                shape.validate_at(object.get(name), &join(root, name), errors);
            }
        }

        object
    }
}

impl Default for Shape {
    fn default() -> Self {
        Self::any()
    }
}

fn join(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_string()
    } else {
        format!("{parent}.{key}")
    }
}

fn type_message(expected: &str, value: &Value) -> String {
    format!("must be {expected}, got {}", value_type_name(value))
}

/// JSON type name used in validation messages.
#[must_use]
pub fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn product() -> Shape {
        Shape::object([
            ("name", Shape::string().min_len(1).max_len(10).required()),
            ("price", Shape::integer().min(0).required()),
            ("kind", Shape::string().one_of(["SELL", "BUY"])),
            ("released_at", Shape::datetime().nullable()),
            (
                "items",
                Shape::array(Shape::object([("price", Shape::number().required())]).strict()),
            ),
        ])
        .strict()
    }

    #[test]
    fn test_valid_body_passes() {
        let body = json!({
            "name": "Pikachu",
            "price": 300,
            "kind": "SELL",
            "released_at": null,
            "items": [{ "price": 1.5 }]
        });
        assert!(product().check(&body, "body").is_ok());
    }

    #[test]
    fn test_reports_all_failures() {
        let body = json!({
            "price": "free",
            "kind": "RENT",
            "released_at": "yesterday",
            "items": [{ "price": 1 }, {}, { "price": 2, "extra": true }],
            "color": "red"
        });
        let errors = product().check(&body, "body").unwrap_err();

        for path in [
            "body.name",
            "body.price",
            "body.kind",
            "body.released_at",
            "body.items[1].price",
            "body.items[2].extra",
            "body.color",
        ] {
            assert!(errors.contains(path), "missing {path} in {errors:?}");
        }
        assert_eq!(errors.len(), 7);
    }

    #[test]
    fn test_null_handling() {
        let shape = Shape::object([
            ("a", Shape::string()),
            ("b", Shape::string().nullable()),
            ("c", Shape::any()),
        ]);
        let errors = shape.check(&json!({"a": null, "b": null, "c": null}), "body").unwrap_err();
        assert_eq!(errors.paths().collect::<Vec<_>>(), vec!["body.a"]);
    }

    #[test]
    fn test_length_counts_characters() {
        let shape = Shape::string().max_len(3);
        assert!(shape.check(&json!("ポケモ"), "name").is_ok());
        assert!(shape.check(&json!("ポケモン"), "name").is_err());
    }

    #[test]
    fn test_custom_check() {
        fn even(v: &Value) -> Result<(), String> {
            match v.as_i64() {
                Some(n) if n % 2 == 0 => Ok(()),
                _ => Err("must be even".to_string()),
            }
        }
        let shape = Shape::custom("even", even);
        assert!(shape.check(&json!(4), "n").is_ok());
        let errors = shape.check(&json!(3), "n").unwrap_err();
        assert_eq!(errors.fields["n"], vec!["must be even".to_string()]);
    }

    #[test]
    fn test_coerce_scalars() {
        assert_eq!(Shape::integer().coerce("42"), Ok(json!(42)));
        assert!(Shape::integer().coerce("4.2").is_err());
        assert_eq!(Shape::number().coerce("4.5"), Ok(json!(4.5)));
        assert_eq!(Shape::boolean().coerce("1"), Ok(json!(true)));
        assert_eq!(Shape::boolean().coerce("false"), Ok(json!(false)));
        assert!(Shape::boolean().coerce("yes").is_err());
        assert_eq!(
            Shape::datetime().coerce("2024-03-01T09:00:00+09:00"),
            Ok(json!("2024-03-01T00:00:00.000Z"))
        );
        assert_eq!(Shape::string().coerce("abc"), Ok(json!("abc")));
    }

    #[test]
    fn test_coerce_pairs_collects_every_location_error() {
        let query = Shape::object([
            ("take", Shape::integer().min(1)),
            ("ids", Shape::array(Shape::integer())),
            ("from", Shape::datetime().required()),
        ])
        .strict();
        let mut errors = FieldErrors::new();
        let object = query.coerce_pairs(
            [("take", "0"), ("ids", "1,2"), ("ids", "3"), ("bogus", "x")],
            "query",
            &mut errors,
        );

        assert_eq!(object["ids"], json!([1, 2, 3]));
        assert!(errors.contains("query.take"));
        assert!(errors.contains("query.from"));
        assert!(errors.contains("query.bogus"));
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn test_undeclared_keys_dropped_by_default() {
        let body = Shape::object([
            ("name", Shape::string().required()),
            ("lines", Shape::array(Shape::object([("sku", Shape::string())]))),
        ]);
        let mut value = json!({
            "name": "x",
            "force": true,
            "lines": [{ "sku": "a", "note": "gift" }]
        });

        assert!(body.check(&value, "body").is_ok());
        body.strip_unknown(&mut value);
        assert_eq!(value, json!({ "name": "x", "lines": [{ "sku": "a" }] }));

        let query = Shape::object([("take", Shape::integer())]);
        let mut errors = FieldErrors::new();
        let object = query.coerce_pairs([("take", "5"), ("_", "1700000000")], "query", &mut errors);
        assert!(errors.is_empty());
        assert_eq!(Value::Object(object), json!({ "take": 5 }));
    }

    #[test]
    fn test_strict_object_keeps_undeclared_keys_for_rejection() {
        let body = Shape::object([("name", Shape::string())]).strict();
        let mut value = json!({ "name": "x", "force": true });
        body.strip_unknown(&mut value);
        assert_eq!(value["force"], true);
        let errors = body.check(&value, "body").unwrap_err();
        assert_eq!(errors.paths().collect::<Vec<_>>(), vec!["body.force"]);
    }

    #[test]
    fn test_coercion_failure_reported_once() {
        let params = Shape::object([("store_id", Shape::integer().required())]);
        let mut errors = FieldErrors::new();
        params.coerce_pairs([("store_id", "abc")], "params", &mut errors);
        assert_eq!(errors.fields["params.store_id"], vec!["must be an integer".to_string()]);
    }

    proptest! {
        #[test]
        fn prop_integer_coercion_roundtrips(n in any::<i64>()) {
            prop_assert_eq!(Shape::integer().coerce(&n.to_string()), Ok(json!(n)));
        }

        #[test]
        fn prop_missing_required_fields_all_reported(
            names in proptest::collection::btree_set("[a-z]{1,6}", 1..8)
        ) {
            let shape = Shape::object(names.iter().map(|n| (n.clone(), Shape::string().required())));
            let errors = shape.check(&json!({}), "body").unwrap_err();
            prop_assert_eq!(errors.len(), names.len());
            for name in &names {
                let path = format!("body.{name}");
                prop_assert!(errors.contains(&path));
            }
        }
    }
}
