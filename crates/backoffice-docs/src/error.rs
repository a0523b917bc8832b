//! Error types for documentation generation.

use thiserror::Error;

/// Errors that can occur during documentation generation.
#[derive(Debug, Error)]
pub enum DocsError {
    /// Failed to serialize the document.
    #[error("Failed to serialize OpenAPI document: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// A contract cannot be placed in the document.
    #[error("Invalid contract '{contract}': {reason}")]
    InvalidContract {
        /// Contract name.
        contract: String,
        /// What is wrong with it.
        reason: String,
    },
}

/// Result type for documentation operations.
pub type DocsResult<T> = Result<T, DocsError>;
