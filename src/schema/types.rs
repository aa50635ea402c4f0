//! Schema definitions: the JSON-Schema object subset documents and method signatures are declared in.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaType {
    Object,
    Array,
    String,
    Number,
    Integer,
    Boolean,
    Null,
}

impl SchemaType {
    pub fn as_str(self) -> &'static str {
        match self {
            SchemaType::Object => "object",
            SchemaType::Array => "array",
            SchemaType::String => "string",
            SchemaType::Number => "number",
            SchemaType::Integer => "integer",
            SchemaType::Boolean => "boolean",
            SchemaType::Null => "null",
        }
    }

    /// Whether `value` is an instance of this type. Integral floats count as integers.
    pub fn matches(self, value: &Value) -> bool {
        match (self, value) {
            (SchemaType::Object, Value::Object(_)) => true,
            (SchemaType::Array, Value::Array(_)) => true,
            (SchemaType::String, Value::String(_)) => true,
            (SchemaType::Number, Value::Number(_)) => true,
            (SchemaType::Integer, Value::Number(n)) => {
                n.is_i64() || n.is_u64() || n.as_f64().map(|f| f.fract() == 0.0).unwrap_or(false)
            }
            (SchemaType::Boolean, Value::Bool(_)) => true,
            (SchemaType::Null, Value::Null) => true,
            _ => false,
        }
    }
}

/// `"type": "string"` or `"type": ["string", "null"]`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TypeSpec {
    Single(SchemaType),
    Union(Vec<SchemaType>),
}

impl TypeSpec {
    pub fn types(&self) -> Vec<SchemaType> {
        match self {
            TypeSpec::Single(t) => vec![*t],
            TypeSpec::Union(ts) => ts.clone(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SchemaDefinition {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_: Option<TypeSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, SchemaDefinition>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_properties: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<SchemaDefinition>>,
    #[serde(rename = "enum", skip_serializing_if = "Option::is_none")]
    pub enum_: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_length: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_items: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_items: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(rename = "$ref", skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub definitions: BTreeMap<String, SchemaDefinition>,
}

impl SchemaDefinition {
    /// Parse a schema from its JSON form.
    pub fn from_value(value: Value) -> Result<Self, ConfigError> {
        serde_json::from_value(value).map_err(|e| ConfigError::MalformedSchema {
            path: String::new(),
            reason: e.to_string(),
        })
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    pub fn typed(t: SchemaType) -> Self {
        SchemaDefinition {
            type_: Some(TypeSpec::Single(t)),
            ..Default::default()
        }
    }

    pub fn object() -> Self {
        Self::typed(SchemaType::Object)
    }

    pub fn string() -> Self {
        Self::typed(SchemaType::String)
    }

    pub fn integer() -> Self {
        Self::typed(SchemaType::Integer)
    }

    pub fn number() -> Self {
        Self::typed(SchemaType::Number)
    }

    pub fn boolean() -> Self {
        Self::typed(SchemaType::Boolean)
    }

    pub fn array(items: SchemaDefinition) -> Self {
        SchemaDefinition {
            items: Some(Box::new(items)),
            ..Self::typed(SchemaType::Array)
        }
    }

    pub fn property(mut self, name: impl Into<String>, schema: SchemaDefinition) -> Self {
        self.properties.insert(name.into(), schema);
        self
    }

    pub fn require(mut self, name: impl Into<String>) -> Self {
        self.required.push(name.into());
        self
    }

    pub fn closed(mut self) -> Self {
        self.additional_properties = Some(false);
        self
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn minimum(mut self, min: f64) -> Self {
        self.minimum = Some(min);
        self
    }

    pub fn maximum(mut self, max: f64) -> Self {
        self.maximum = Some(max);
        self
    }

    /// Declared types; empty means any type is accepted.
    pub fn types(&self) -> Vec<SchemaType> {
        self.type_.as_ref().map(TypeSpec::types).unwrap_or_default()
    }

    pub fn allows(&self, t: SchemaType) -> bool {
        let types = self.types();
        types.is_empty() || types.contains(&t) || (t == SchemaType::Integer && types.contains(&SchemaType::Number))
    }

    /// True when the schema declares exactly the object type at its root.
    pub fn is_object_root(&self) -> bool {
        self.types() == [SchemaType::Object]
    }

    /// Copy for partial updates: nothing required and no defaults injected at the top level.
    pub fn partial(&self) -> SchemaDefinition {
        let mut out = self.clone();
        out.required.clear();
        for prop in out.properties.values_mut() {
            prop.default = None;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_json_schema_keywords() {
        let schema = SchemaDefinition::from_value(json!({
            "type": "object",
            "required": ["name"],
            "additionalProperties": false,
            "properties": {
                "name": {"type": "string", "minLength": 1},
                "tags": {"type": "array", "items": {"type": "string"}, "maxItems": 3},
                "kind": {"enum": ["a", "b"]},
                "note": {"type": ["string", "null"]},
                "owner": {"$ref": "#/definitions/user"}
            }
        }))
        .unwrap();
        assert!(schema.is_object_root());
        assert_eq!(schema.required, vec!["name".to_string()]);
        assert_eq!(schema.additional_properties, Some(false));
        assert_eq!(schema.properties["name"].min_length, Some(1));
        assert_eq!(schema.properties["tags"].max_items, Some(3));
        assert_eq!(schema.properties["note"].types(), vec![SchemaType::String, SchemaType::Null]);
        assert_eq!(schema.properties["owner"].reference.as_deref(), Some("#/definitions/user"));
    }

    #[test]
    fn unknown_type_name_is_malformed() {
        let err = SchemaDefinition::from_value(json!({"type": "strnig"})).unwrap_err();
        assert!(matches!(err, ConfigError::MalformedSchema { .. }));
    }

    #[test]
    fn partial_drops_required_and_defaults() {
        let schema = SchemaDefinition::object()
            .property("count", SchemaDefinition::integer().with_default(json!(0)))
            .require("count");
        let partial = schema.partial();
        assert!(partial.required.is_empty());
        assert!(partial.properties["count"].default.is_none());
    }

    #[test]
    fn integral_floats_are_integers() {
        assert!(SchemaType::Integer.matches(&json!(3)));
        assert!(SchemaType::Integer.matches(&json!(3.0)));
        assert!(!SchemaType::Integer.matches(&json!(3.5)));
        assert!(SchemaType::Number.matches(&json!(3.5)));
    }
}
