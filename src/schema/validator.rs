//! Compiled schemas and collect-all validation.

use super::types::{SchemaDefinition, SchemaType};
use crate::error::{ConfigError, ValidationError};
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Format {
    Email,
    Uuid,
    DateTime,
    Date,
}

impl Format {
    fn parse(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "email" => Some(Format::Email),
            "uuid" => Some(Format::Uuid),
            "date-time" => Some(Format::DateTime),
            "date" => Some(Format::Date),
            _ => None,
        }
    }

    fn check(self, s: &str) -> Option<&'static str> {
        let ok = match self {
            Format::Email => {
                s.len() >= 3 && s.split_once('@').map(|(u, d)| !u.is_empty() && !d.is_empty()).unwrap_or(false)
            }
            Format::Uuid => uuid::Uuid::parse_str(s).is_ok(),
            Format::DateTime => chrono::DateTime::parse_from_rfc3339(s).is_ok(),
            Format::Date => chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok(),
        };
        if ok {
            None
        } else {
            Some(match self {
                Format::Email => "must be a valid email",
                Format::Uuid => "must be a valid UUID",
                Format::DateTime => "must be an RFC 3339 date-time",
                Format::Date => "must be a YYYY-MM-DD date",
            })
        }
    }
}

/// A schema with its `$ref`s inlined and its patterns compiled.
#[derive(Debug)]
pub(crate) struct Node {
    types: Vec<SchemaType>,
    properties: BTreeMap<String, Node>,
    required: Vec<String>,
    additional: bool,
    items: Option<Box<Node>>,
    enum_: Option<Vec<Value>>,
    minimum: Option<f64>,
    maximum: Option<f64>,
    min_length: Option<u64>,
    max_length: Option<u64>,
    min_items: Option<u64>,
    max_items: Option<u64>,
    pattern: Option<Regex>,
    format: Option<Format>,
    default: Option<Value>,
}

fn malformed(path: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::MalformedSchema {
        path: path.to_string(),
        reason: reason.into(),
    }
}

fn child_path(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", path, key)
    }
}

fn check_range<T: PartialOrd + std::fmt::Display>(
    path: &str,
    lo: Option<T>,
    hi: Option<T>,
    what: &str,
) -> Result<(), ConfigError> {
    if let (Some(lo), Some(hi)) = (lo, hi) {
        if lo > hi {
            return Err(malformed(path, format!("{} range is empty ({} > {})", what, lo, hi)));
        }
    }
    Ok(())
}

impl Node {
    /// Compile an already ref-resolved definition.
    pub(crate) fn compile(def: &SchemaDefinition, path: &str) -> Result<Node, ConfigError> {
        check_range(path, def.minimum, def.maximum, "minimum/maximum")?;
        check_range(path, def.min_length, def.max_length, "minLength/maxLength")?;
        check_range(path, def.min_items, def.max_items, "minItems/maxItems")?;
        if let Some(values) = &def.enum_ {
            if values.is_empty() {
                return Err(malformed(path, "enum must list at least one value"));
            }
        }
        let pattern = match &def.pattern {
            Some(p) => Some(Regex::new(p).map_err(|e| malformed(path, format!("invalid pattern: {}", e)))?),
            None => None,
        };
        let additional = def.additional_properties.unwrap_or(true);
        if !additional {
            if let Some(missing) = def.required.iter().find(|r| !def.properties.contains_key(*r)) {
                return Err(malformed(
                    path,
                    format!("required field '{}' is not declared on a closed object", missing),
                ));
            }
        }
        let mut properties = BTreeMap::new();
        for (name, prop) in &def.properties {
            properties.insert(name.clone(), Node::compile(prop, &child_path(path, name))?);
        }
        let items = match &def.items {
            Some(items) => Some(Box::new(Node::compile(items, &format!("{}[]", path))?)),
            None => None,
        };
        let node = Node {
            types: def.types(),
            properties,
            required: def.required.clone(),
            additional,
            items,
            enum_: def.enum_.clone(),
            minimum: def.minimum,
            maximum: def.maximum,
            min_length: def.min_length,
            max_length: def.max_length,
            min_items: def.min_items,
            max_items: def.max_items,
            pattern,
            format: def.format.as_deref().and_then(Format::parse),
            default: def.default.clone(),
        };
        if let Some(default) = &node.default {
            let mut errors = ValidationError::default();
            node.check(default, path, &mut errors);
            if !errors.is_empty() {
                return Err(malformed(path, format!("default does not satisfy its schema: {}", errors)));
            }
        }
        Ok(node)
    }

    pub(crate) fn property(&self, name: &str) -> Option<&Node> {
        self.properties.get(name)
    }

    pub(crate) fn allows_additional(&self) -> bool {
        self.additional
    }

    /// Validate `value`, returning it with defaults filled in for absent object properties.
    pub(crate) fn validate(&self, value: &Value, path: &str) -> Result<Value, ValidationError> {
        let mut errors = ValidationError::default();
        let out = self.check(value, path, &mut errors);
        errors.into_result().map(|_| out)
    }

    fn expected(&self) -> String {
        self.types.iter().map(|t| t.as_str()).collect::<Vec<_>>().join(" or ")
    }

    pub(crate) fn check(&self, value: &Value, path: &str, errors: &mut ValidationError) -> Value {
        if !self.types.is_empty() && !self.types.iter().any(|t| t.matches(value)) {
            errors.push(
                path,
                Some(self.expected()),
                format!("expected {}, got {}", self.expected(), json_type(value)),
            );
            return value.clone();
        }
        if let Some(allowed) = &self.enum_ {
            if !allowed.iter().any(|a| value_eq(value, a)) {
                errors.push(
                    path,
                    Some(format!("one of {}", Value::Array(allowed.clone()))),
                    "is not one of the allowed values",
                );
            }
        }
        match value {
            Value::Number(n) => {
                if let Some(n) = n.as_f64() {
                    if let Some(min) = self.minimum.filter(|min| n < *min) {
                        errors.push(path, None, format!("must be at least {}", min));
                    }
                    if let Some(max) = self.maximum.filter(|max| n > *max) {
                        errors.push(path, None, format!("must be at most {}", max));
                    }
                }
                self.integral(n).unwrap_or_else(|| value.clone())
            }
            Value::String(s) => {
                let len = s.chars().count() as u64;
                if let Some(min) = self.min_length.filter(|min| len < *min) {
                    errors.push(path, None, format!("must be at least {} characters", min));
                }
                if let Some(max) = self.max_length.filter(|max| len > *max) {
                    errors.push(path, None, format!("must be at most {} characters", max));
                }
                if let Some(re) = &self.pattern {
                    if !re.is_match(s) {
                        errors.push(path, None, format!("does not match pattern {}", re.as_str()));
                    }
                }
                if let Some(message) = self.format.and_then(|f| f.check(s)) {
                    errors.push(path, None, message);
                }
                value.clone()
            }
            Value::Array(items) => {
                let len = items.len() as u64;
                if let Some(min) = self.min_items.filter(|min| len < *min) {
                    errors.push(path, None, format!("must contain at least {} items", min));
                }
                if let Some(max) = self.max_items.filter(|max| len > *max) {
                    errors.push(path, None, format!("must contain at most {} items", max));
                }
                match &self.items {
                    Some(node) => Value::Array(
                        items
                            .iter()
                            .enumerate()
                            .map(|(i, item)| node.check(item, &format!("{}[{}]", path, i), errors))
                            .collect(),
                    ),
                    None => value.clone(),
                }
            }
            Value::Object(fields) => Value::Object(self.check_object(fields, path, errors)),
            _ => value.clone(),
        }
    }

    /// An integer-only node stores `9.0` as `9`, so keys and comparisons see one representation.
    fn integral(&self, n: &serde_json::Number) -> Option<Value> {
        if n.is_i64() || n.is_u64() || self.types.contains(&SchemaType::Number) || !self.types.contains(&SchemaType::Integer) {
            return None;
        }
        let f = n.as_f64()?;
        (f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64).then(|| Value::from(f as i64))
    }

    fn check_object(&self, fields: &Map<String, Value>, path: &str, errors: &mut ValidationError) -> Map<String, Value> {
        let mut out = Map::new();
        for (name, value) in fields {
            let p = child_path(path, name);
            match self.properties.get(name) {
                Some(node) => {
                    out.insert(name.clone(), node.check(value, &p, errors));
                }
                None if !self.additional => {
                    errors.push(p, None, "is not an allowed property");
                }
                None => {
                    out.insert(name.clone(), value.clone());
                }
            }
        }
        for (name, node) in &self.properties {
            if out.contains_key(name) || fields.contains_key(name) {
                continue;
            }
            if let Some(default) = &node.default {
                out.insert(name.clone(), default.clone());
            }
        }
        for name in &self.required {
            if !out.contains_key(name) && !fields.contains_key(name) {
                let expected = self.properties.get(name).map(|n| n.expected()).filter(|e| !e.is_empty());
                errors.push(child_path(path, name), expected, "is required");
            }
        }
        out
    }
}

pub(crate) fn json_type(value: &Value) -> &'static str {
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

/// Equality that treats `1` and `1.0` as the same number.
pub fn value_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(n), Value::Number(m)) => n.as_f64() == m.as_f64(),
        (Value::Array(x), Value::Array(y)) => x.len() == y.len() && x.iter().zip(y).all(|(a, b)| value_eq(a, b)),
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn compile(v: Value) -> Node {
        let def = SchemaDefinition::from_value(v).unwrap();
        Node::compile(&def, "").unwrap()
    }

    fn compile_err(v: Value) -> ConfigError {
        let def = SchemaDefinition::from_value(v).unwrap();
        Node::compile(&def, "").unwrap_err()
    }

    #[test]
    fn collects_every_violation() {
        let node = compile(json!({
            "type": "object",
            "required": ["name", "price"],
            "properties": {
                "name": {"type": "string", "minLength": 1},
                "price": {"type": "number", "minimum": 0},
                "tags": {"type": "array", "items": {"type": "string"}},
                "address": {"type": "object", "properties": {"zip": {"type": "string", "pattern": "^[0-9]{5}$"}}}
            }
        }));
        let err = node
            .validate(&json!({"price": -1, "tags": ["a", 2], "address": {"zip": "abc"}}), "")
            .unwrap_err();
        let mut paths = err.paths();
        paths.sort();
        assert_eq!(paths, vec!["address.zip", "name", "price", "tags[1]"]);
    }

    #[test]
    fn fills_defaults_for_absent_properties() {
        let node = compile(json!({
            "type": "object",
            "properties": {
                "count": {"type": "integer", "default": 0},
                "label": {"type": "string"}
            }
        }));
        let out = node.validate(&json!({"label": "x"}), "").unwrap();
        assert_eq!(out, json!({"label": "x", "count": 0}));
        let kept = node.validate(&json!({"count": 5}), "").unwrap();
        assert_eq!(kept["count"], json!(5));
    }

    #[test]
    fn closed_objects_reject_unknown_fields() {
        let node = compile(json!({
            "type": "object",
            "additionalProperties": false,
            "properties": {"a": {"type": "string"}}
        }));
        let err = node.validate(&json!({"a": "x", "b": 1}), "").unwrap_err();
        assert_eq!(err.paths(), vec!["b"]);
    }

    #[test]
    fn enum_union_and_formats() {
        let node = compile(json!({
            "type": "object",
            "properties": {
                "status": {"enum": ["open", "closed"]},
                "note": {"type": ["string", "null"]},
                "email": {"type": "string", "format": "email"},
                "id": {"type": "string", "format": "uuid"},
                "at": {"type": "string", "format": "date-time"},
                "day": {"type": "string", "format": "date"}
            }
        }));
        assert!(node
            .validate(
                &json!({
                    "status": "open",
                    "note": null,
                    "email": "a@b.c",
                    "id": "67e55044-10b1-426f-9247-bb680e5fe0c8",
                    "at": "2024-01-02T03:04:05Z",
                    "day": "2024-01-02"
                }),
                ""
            )
            .is_ok());
        let err = node
            .validate(
                &json!({"status": "pending", "note": 3, "email": "nope", "id": "x", "at": "yesterday", "day": "2024-13-01"}),
                "",
            )
            .unwrap_err();
        assert_eq!(err.violations.len(), 6);
    }

    #[test]
    fn integer_rejects_fractions() {
        let node = compile(json!({"type": "integer", "maximum": 10}));
        assert!(node.validate(&json!(4), "").is_ok());
        let err = node.validate(&json!(4.5), "").unwrap_err();
        assert_eq!(err.violations[0].expected.as_deref(), Some("integer"));
        assert!(node.validate(&json!(11), "").is_err());
    }

    #[test]
    fn whole_floats_become_integers() {
        let node = compile(json!({"type": "object", "properties": {"n": {"type": "integer"}, "x": {"type": "number"}}}));
        let out = node.validate(&json!({"n": 9.0, "x": 2.0}), "").unwrap();
        assert!(out["n"].is_i64());
        assert_eq!(out["n"], json!(9));
        assert!(out["x"].is_f64());
    }

    #[test]
    fn malformed_schemas_are_rejected() {
        assert!(matches!(compile_err(json!({"type": "string", "pattern": "("})), ConfigError::MalformedSchema { .. }));
        assert!(matches!(compile_err(json!({"minimum": 5, "maximum": 1})), ConfigError::MalformedSchema { .. }));
        assert!(matches!(compile_err(json!({"enum": []})), ConfigError::MalformedSchema { .. }));
        assert!(matches!(
            compile_err(json!({"type": "object", "additionalProperties": false, "required": ["x"]})),
            ConfigError::MalformedSchema { .. }
        ));
        assert!(matches!(
            compile_err(json!({"type": "object", "properties": {"n": {"type": "integer", "default": "zero"}}})),
            ConfigError::MalformedSchema { .. }
        ));
    }
}
