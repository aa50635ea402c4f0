//! Schema registry: registration-time resolution and validation by handle.

use super::types::SchemaDefinition;
use super::validator::Node;
use crate::error::{ConfigError, ValidationError};
use serde_json::Value;
use std::collections::BTreeMap;

/// Opaque reference to a registered schema. Only meaningful for the registry that issued it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SchemaHandle(usize);

#[derive(Debug)]
struct Registered {
    /// Ref-free form, used for documentation.
    definition: SchemaDefinition,
    node: Node,
}

/// Holds every document and method schema. Populated at startup, read-only afterwards.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    definitions: BTreeMap<String, SchemaDefinition>,
    schemas: Vec<Registered>,
}

const REF_PREFIX: &str = "#/definitions/";

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a shared named definition usable as `#/definitions/<name>` from any schema.
    pub fn define(&mut self, name: impl Into<String>, schema: SchemaDefinition) {
        self.definitions.insert(name.into(), schema);
    }

    pub fn definitions(&self) -> &BTreeMap<String, SchemaDefinition> {
        &self.definitions
    }

    /// Resolve `$ref`s, compile and store. `context` names the schema in error messages.
    pub fn register(&mut self, schema: SchemaDefinition, context: &str) -> Result<SchemaHandle, ConfigError> {
        let local = schema.definitions.clone();
        let mut stack = Vec::new();
        let definition = self.inline(&schema, &local, context, &mut stack)?;
        let node = Node::compile(&definition, context)?;
        self.schemas.push(Registered { definition, node });
        let handle = SchemaHandle(self.schemas.len() - 1);
        tracing::debug!(context = %context, handle = handle.0, "schema registered");
        Ok(handle)
    }

    /// Like `register`, but the root must be `type: object`.
    pub fn register_object(&mut self, schema: SchemaDefinition, context: &str) -> Result<SchemaHandle, ConfigError> {
        if !schema.is_object_root() && schema.reference.is_none() {
            return Err(ConfigError::MalformedSchema {
                path: context.to_string(),
                reason: "schema root must be of type object".into(),
            });
        }
        let handle = self.register(schema, context)?;
        match self.definition(handle) {
            Some(def) if def.is_object_root() => Ok(handle),
            _ => Err(ConfigError::MalformedSchema {
                path: context.to_string(),
                reason: "schema root must be of type object".into(),
            }),
        }
    }

    fn inline(
        &self,
        schema: &SchemaDefinition,
        local: &BTreeMap<String, SchemaDefinition>,
        path: &str,
        stack: &mut Vec<String>,
    ) -> Result<SchemaDefinition, ConfigError> {
        let mut out = match &schema.reference {
            Some(reference) => {
                let name = reference.strip_prefix(REF_PREFIX).ok_or_else(|| ConfigError::MalformedSchema {
                    path: path.to_string(),
                    reason: format!("unsupported $ref '{}'", reference),
                })?;
                if stack.iter().any(|s| s == name) {
                    return Err(ConfigError::MalformedSchema {
                        path: path.to_string(),
                        reason: format!("recursive $ref '{}'", reference),
                    });
                }
                let target = local
                    .get(name)
                    .or_else(|| self.definitions.get(name))
                    .ok_or_else(|| ConfigError::MalformedSchema {
                        path: path.to_string(),
                        reason: format!("unresolved $ref '{}'", reference),
                    })?;
                stack.push(name.to_string());
                let mut resolved = self.inline(target, local, path, stack)?;
                stack.pop();
                if schema.description.is_some() {
                    resolved.description = schema.description.clone();
                }
                if schema.title.is_some() {
                    resolved.title = schema.title.clone();
                }
                if schema.default.is_some() {
                    resolved.default = schema.default.clone();
                }
                return Ok(resolved);
            }
            None => schema.clone(),
        };
        out.definitions.clear();
        for (name, prop) in out.properties.iter_mut() {
            let p = if path.is_empty() { name.clone() } else { format!("{}.{}", path, name) };
            *prop = self.inline(prop, local, &p, stack)?;
        }
        if let Some(items) = out.items.take() {
            out.items = Some(Box::new(self.inline(&items, local, &format!("{}[]", path), stack)?));
        }
        Ok(out)
    }

    /// The resolved definition behind a handle.
    pub fn definition(&self, handle: SchemaHandle) -> Option<&SchemaDefinition> {
        self.schemas.get(handle.0).map(|r| &r.definition)
    }

    /// Schema of one top-level property, if declared.
    pub fn property(&self, handle: SchemaHandle, field: &str) -> Option<&SchemaDefinition> {
        self.definition(handle).and_then(|d| d.properties.get(field))
    }

    /// Validate `value`, returning it with defaults filled in.
    pub fn validate(&self, handle: SchemaHandle, value: &Value) -> Result<Value, ValidationError> {
        match self.schemas.get(handle.0) {
            Some(r) => r.node.validate(value, ""),
            None => Err(unknown_handle(handle)),
        }
    }

    /// Validate a single top-level field of an object schema.
    pub fn validate_property(&self, handle: SchemaHandle, field: &str, value: &Value) -> Result<Value, ValidationError> {
        let root = &self.schemas.get(handle.0).ok_or_else(|| unknown_handle(handle))?.node;
        match root.property(field) {
            Some(node) => node.validate(value, field),
            None if root.allows_additional() => Ok(value.clone()),
            None => Err(ValidationError::single(field, None, "is not an allowed property")),
        }
    }
}

fn unknown_handle(handle: SchemaHandle) -> ValidationError {
    ValidationError::single("", None, format!("unknown schema handle {}", handle.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn def(v: Value) -> SchemaDefinition {
        SchemaDefinition::from_value(v).unwrap()
    }

    #[test]
    fn refs_resolve_locally_then_shared() {
        let mut reg = SchemaRegistry::new();
        reg.define("money", def(json!({"type": "number", "minimum": 0})));
        let h = reg
            .register(
                def(json!({
                    "type": "object",
                    "definitions": {"name": {"type": "string", "minLength": 2}},
                    "properties": {
                        "name": {"$ref": "#/definitions/name"},
                        "price": {"$ref": "#/definitions/money", "description": "unit price"}
                    }
                })),
                "widget",
            )
            .unwrap();
        let resolved = reg.definition(h).unwrap();
        assert!(resolved.definitions.is_empty());
        assert_eq!(resolved.properties["price"].description.as_deref(), Some("unit price"));
        assert!(resolved.properties["name"].reference.is_none());
        let err = reg.validate(h, &json!({"name": "x", "price": -3})).unwrap_err();
        assert_eq!(err.violations.len(), 2);
    }

    #[test]
    fn recursive_and_missing_refs_fail() {
        let mut reg = SchemaRegistry::new();
        reg.define("a", def(json!({"type": "object", "properties": {"b": {"$ref": "#/definitions/b"}}})));
        reg.define("b", def(json!({"type": "object", "properties": {"a": {"$ref": "#/definitions/a"}}})));
        let err = reg.register(def(json!({"$ref": "#/definitions/a"})), "loop").unwrap_err();
        assert!(err.to_string().contains("recursive"));
        let err = reg.register(def(json!({"$ref": "#/definitions/zzz"})), "missing").unwrap_err();
        assert!(err.to_string().contains("unresolved"));
    }

    #[test]
    fn object_root_required_for_register_object() {
        let mut reg = SchemaRegistry::new();
        assert!(reg.register_object(def(json!({"type": "array"})), "list").is_err());
        assert!(reg.register_object(def(json!({"type": "object"})), "doc").is_ok());
    }

    #[test]
    fn single_property_validation() {
        let mut reg = SchemaRegistry::new();
        let h = reg
            .register(
                def(json!({
                    "type": "object",
                    "additionalProperties": false,
                    "properties": {"qty": {"type": "integer", "minimum": 1}}
                })),
                "line",
            )
            .unwrap();
        assert_eq!(reg.validate_property(h, "qty", &json!(3)).unwrap(), json!(3));
        assert_eq!(reg.validate_property(h, "qty", &json!(0)).unwrap_err().paths(), vec!["qty"]);
        assert!(reg.validate_property(h, "other", &json!(1)).is_err());
    }
}
