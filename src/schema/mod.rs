//! JSON-Schema subset: definitions, registry, validation.

pub mod registry;
pub mod types;
pub mod validator;

pub use registry::{SchemaHandle, SchemaRegistry};
pub use types::{SchemaDefinition, SchemaType, TypeSpec};
pub use validator::value_eq;
