//! # Back-office docs
//!
//! Generates an OpenAPI 3.0 document from the contract registry. Every
//! contract becomes one operation whose method, path and `x-roles` match its
//! definition exactly. Field shapes convert one to one; shapes with no schema
//! equivalent follow an explicit [`UnrepresentablePolicy`].
//!
//! ```rust,ignore
//! use backoffice_docs::{OpenApiGenerator, UnrepresentablePolicy};
//!
//! let docs = OpenApiGenerator::new()
//!     .title("Back office")
//!     .unrepresentable(UnrepresentablePolicy::Skip)
//!     .generate(&registry)?;
//! let json = docs.document.to_json()?;
//! ```

mod error;
mod generator;
mod openapi;

pub use error::{DocsError, DocsResult};
pub use generator::{shape_schema, GeneratedDocs, OpenApiGenerator, SkippedContract, UnrepresentablePolicy};
pub use openapi::{
    Components, Info, MediaType, OpenApi, Operation, Parameter, ParameterIn, PathItem, RequestBody, Response,
    Schema, SchemaType, SecurityRequirement, SecurityScheme, Tag,
};
