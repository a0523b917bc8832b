//! Error taxonomy for the back-office runtime.
//!
//! Handlers and services return [`BackofficeError`]; the dispatcher is the only
//! place that turns one into an HTTP response, via [`BackofficeError::status_code`]
//! and [`BackofficeError::to_envelope`].
//!
//! | Variant | Status | Wire message |
//! |---|---|---|
//! | `Validation` | 400 | message plus every failing field |
//! | `Permission` | 403 | message |
//! | `NotExist` | 404 | message |
//! | `Conflict` | 409 | message |
//! | `ExternalService` | 502 / 503 | redacted |
//! | `Unknown` | 500 | redacted |
//! | `Declared` | per contract | per contract |

use std::collections::BTreeMap;

use http::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using [`BackofficeError`].
pub type BackofficeResult<T> = Result<T, BackofficeError>;

/// Message sent to clients in place of internal error details.
pub const REDACTED_INTERNAL: &str = "An unexpected error occurred";

/// Message sent to clients in place of downstream service details.
pub const REDACTED_EXTERNAL: &str = "A downstream service failed to respond";

/// Coarse error classification, serialized into the envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Request shape mismatch.
    Validation,
    /// Role or policy check failed.
    Permission,
    /// Referenced entity is absent.
    NotExist,
    /// Uniqueness or idempotency violation.
    Conflict,
    /// Downstream gateway failure.
    ExternalService,
    /// Anything uncategorized.
    Unknown,
    /// A contract-declared error.
    Declared,
}

impl ErrorCategory {
    /// Returns the default HTTP status code for this category.
    #[must_use]
    pub const fn default_status_code(&self) -> StatusCode {
        match self {
            Self::Validation => StatusCode::BAD_REQUEST,
            Self::Permission => StatusCode::FORBIDDEN,
            Self::NotExist => StatusCode::NOT_FOUND,
            Self::Conflict => StatusCode::CONFLICT,
            Self::ExternalService => StatusCode::BAD_GATEWAY,
            Self::Unknown | Self::Declared => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Standard error type for the back-office runtime.
///
/// # Example
///
/// ```
/// use backoffice_core::{BackofficeError, ErrorCategory};
///
/// fn find_store(id: i64) -> Result<(), BackofficeError> {
///     Err(BackofficeError::not_exist_resource("store", id.to_string()))
/// }
///
/// let err = find_store(3).unwrap_err();
/// assert_eq!(err.category(), ErrorCategory::NotExist);
/// assert_eq!(err.status_code().as_u16(), 404);
/// ```
#[derive(Error, Debug)]
pub enum BackofficeError {
    /// Request validation failed.
    #[error("Validation error: {message}")]
    Validation {
        /// Human-readable summary.
        message: String,
        /// Every failing field.
        field_errors: FieldErrors,
    },

    /// Role or policy check failed.
    #[error("Permission denied: {message}")]
    Permission {
        /// Human-readable error message.
        message: String,
        /// Contract that was denied.
        contract: Option<String>,
    },

    /// Referenced entity is absent or deleted.
    #[error("Not found: {message}")]
    NotExist {
        /// Human-readable error message.
        message: String,
        /// Kind of entity.
        resource_type: Option<String>,
        /// Entity identifier.
        resource_id: Option<String>,
    },

    /// Uniqueness or idempotency violation.
    #[error("Conflict: {message}")]
    Conflict {
        /// Human-readable error message.
        message: String,
    },

    /// A downstream gateway failed. The detail never reaches the client.
    #[error("External service '{service}' failed: {detail}")]
    ExternalService {
        /// Name of the downstream service.
        service: String,
        /// Server-side detail.
        detail: String,
        /// Answer 503 instead of 502.
        unavailable: bool,
    },

    /// Uncategorized failure. The detail never reaches the client.
    #[error("Unknown error: {message}")]
    Unknown {
        /// Server-side detail.
        message: String,
        /// The underlying error.
        #[source]
        source: Option<anyhow::Error>,
    },

    /// An error declared on the contract being served, resolved by name.
    #[error("Declared error '{name}'")]
    Declared {
        /// Name the contract declares the error under.
        name: String,
    },
}

impl BackofficeError {
    /// Creates a validation error from a non-empty set of field errors.
    #[must_use]
    pub fn validation(field_errors: FieldErrors) -> Self {
        let message = match field_errors.len() {
            1 => "1 field failed validation".to_string(),
            n => format!("{n} fields failed validation"),
        };
        Self::Validation {
            message,
            field_errors,
        }
    }

    /// Creates a validation error for a single field.
    #[must_use]
    pub fn invalid_field(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = FieldErrors::new();
        errors.add(field, message);
        Self::validation(errors)
    }

    /// Creates a permission error.
    #[must_use]
    pub fn permission(message: impl Into<String>) -> Self {
        Self::Permission {
            message: message.into(),
            contract: None,
        }
    }

    /// Creates a permission error naming the denied contract.
    #[must_use]
    pub fn permission_for_contract(message: impl Into<String>, contract: impl Into<String>) -> Self {
        Self::Permission {
            message: message.into(),
            contract: Some(contract.into()),
        }
    }

    /// Creates a not-exist error.
    #[must_use]
    pub fn not_exist(message: impl Into<String>) -> Self {
        Self::NotExist {
            message: message.into(),
            resource_type: None,
            resource_id: None,
        }
    }

    /// Creates a not-exist error with resource context.
    #[must_use]
    pub fn not_exist_resource(
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
    ) -> Self {
        let resource_type = resource_type.into();
        let resource_id = resource_id.into();
        Self::NotExist {
            message: format!("{resource_type} '{resource_id}' does not exist"),
            resource_type: Some(resource_type),
            resource_id: Some(resource_id),
        }
    }

    /// Creates a conflict error.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Creates a 502 external service error.
    #[must_use]
    pub fn external(service: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::ExternalService {
            service: service.into(),
            detail: detail.into(),
            unavailable: false,
        }
    }

    /// Creates a 503 external service error.
    #[must_use]
    pub fn external_unavailable(service: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::ExternalService {
            service: service.into(),
            detail: detail.into(),
            unavailable: true,
        }
    }

    /// Creates an unknown error.
    #[must_use]
    pub fn unknown(message: impl Into<String>) -> Self {
        Self::Unknown {
            message: message.into(),
            source: None,
        }
    }

    /// Creates an unknown error wrapping a source error.
    pub fn unknown_with_source(message: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        Self::Unknown {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Creates a reference to an error declared on the current contract.
    #[must_use]
    pub fn declared(name: impl Into<String>) -> Self {
        Self::Declared { name: name.into() }
    }

    /// Returns the error category.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::Validation { .. } => ErrorCategory::Validation,
            Self::Permission { .. } => ErrorCategory::Permission,
            Self::NotExist { .. } => ErrorCategory::NotExist,
            Self::Conflict { .. } => ErrorCategory::Conflict,
            Self::ExternalService { .. } => ErrorCategory::ExternalService,
            Self::Unknown { .. } => ErrorCategory::Unknown,
            Self::Declared { .. } => ErrorCategory::Declared,
        }
    }

    /// Returns the HTTP status code for this error.
    ///
    /// A `Declared` error answers 500 here; the dispatcher substitutes the
    /// status the contract declares.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::ExternalService {
                unavailable: true, ..
            } => StatusCode::SERVICE_UNAVAILABLE,
            _ => self.category().default_status_code(),
        }
    }

    /// Returns the field errors of a validation error.
    #[must_use]
    pub fn field_errors(&self) -> Option<&FieldErrors> {
        match self {
            Self::Validation { field_errors, .. } => Some(field_errors),
            _ => None,
        }
    }

    /// Converts this error to a client-safe envelope.
    #[must_use]
    pub fn to_envelope(&self, request_id: Option<&str>) -> ErrorEnvelope {
        ErrorEnvelope {
            error: ErrorDetail {
                code: self.error_code().to_string(),
                message: self.client_message(),
                category: self.category(),
                details: self.error_details(),
            },
            request_id: request_id.map(ToString::to_string),
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::Permission { .. } => "PERMISSION_ERROR",
            Self::NotExist { .. } => "NOT_EXIST_ERROR",
            Self::Conflict { .. } => "CONFLICT_ERROR",
            Self::ExternalService { .. } => "EXTERNAL_SERVICE_ERROR",
            Self::Unknown { .. } | Self::Declared { .. } => "UNKNOWN_ERROR",
        }
    }

    fn client_message(&self) -> String {
        match self {
            Self::ExternalService { .. } => REDACTED_EXTERNAL.to_string(),
            Self::Unknown { .. } | Self::Declared { .. } => REDACTED_INTERNAL.to_string(),
            other => other.to_string(),
        }
    }

    fn error_details(&self) -> Option<serde_json::Value> {
        match self {
            Self::Validation { field_errors, .. } => serde_json::to_value(field_errors).ok(),
            Self::NotExist {
                resource_type: Some(rt),
                resource_id: Some(rid),
                ..
            } => Some(serde_json::json!({
                "resource_type": rt,
                "resource_id": rid
            })),
            Self::Permission {
                contract: Some(contract),
                ..
            } => Some(serde_json::json!({ "contract": contract })),
            Self::ExternalService { service, .. } => {
                Some(serde_json::json!({ "service": service }))
            }
            _ => None,
        }
    }
}

impl From<serde_json::Error> for BackofficeError {
    fn from(err: serde_json::Error) -> Self {
        Self::unknown_with_source("JSON conversion failed", err)
    }
}

/// Validation failures keyed by field path (`body.items[2].price`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldErrors {
    /// Map of field path to error messages, ordered by path.
    pub fields: BTreeMap<String, Vec<String>>,
}

impl FieldErrors {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an error for a field.
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.fields
            .entry(field.into())
            .or_default()
            .push(message.into());
    }

    /// Moves every error from `other` into `self`.
    pub fn merge(&mut self, other: FieldErrors) {
        for (field, messages) in other.fields {
            self.fields.entry(field).or_default().extend(messages);
        }
    }

    /// Returns true if `field` has at least one error.
    #[must_use]
    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// Iterates over failing field paths.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Returns `true` if there are no field errors.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Returns the number of failing fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// `Ok(())` when empty, otherwise a [`BackofficeError::Validation`].
    pub fn into_result(self) -> BackofficeResult<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(BackofficeError::validation(self))
        }
    }
}

/// Serializable error envelope for HTTP responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    /// The error details.
    pub error: ErrorDetail,
    /// The request ID for correlation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

/// Error detail within an envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Machine-readable error code.
    pub code: String,
    /// Client-safe message.
    pub message: String,
    /// Error category.
    pub category: ErrorCategory,
    /// Additional structured details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}
