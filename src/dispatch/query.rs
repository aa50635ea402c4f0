//! Query-string arguments.
//!
//! A value wrapped in double quotes is that literal string. Otherwise a JSON literal decodes to its
//! JSON value (`5`, `true`, `null`, `[1,2]`, `{"a":1}`), and anything else stays a string.
//! Repeated keys collect into an array. `schema` is the documentation flag, never an argument.

use crate::error::AppError;
use crate::model::Arguments;
use crate::schema::{SchemaDefinition, SchemaType};
use serde_json::Value;
use std::collections::BTreeMap;

pub const SCHEMA_FLAG: &str = "schema";

pub fn decode_query_value(raw: &str) -> Value {
    if raw.len() >= 2 && raw.starts_with('"') && raw.ends_with('"') {
        return match serde_json::from_str::<String>(raw) {
            Ok(s) => Value::String(s),
            Err(_) => Value::String(raw[1..raw.len() - 1].to_string()),
        };
    }
    serde_json::from_str::<Value>(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Inverse of [`decode_query_value`]: strings that would decode as something else get quoted.
pub fn encode_query_value(value: &Value) -> String {
    match value {
        Value::String(s) => {
            if decode_query_value(s) == *value {
                s.clone()
            } else {
                value.to_string()
            }
        }
        other => other.to_string(),
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueryArgs {
    pub args: Arguments,
    /// Undecoded values, for schema-directed coercion.
    raw: BTreeMap<String, Vec<String>>,
    pub describe: bool,
}

impl QueryArgs {
    pub fn parse(query: Option<&str>) -> Result<Self, AppError> {
        let mut out = QueryArgs::default();
        let Some(query) = query.filter(|q| !q.is_empty()) else {
            return Ok(out);
        };
        let pairs: Vec<(String, String)> =
            serde_urlencoded::from_str(query).map_err(|e| AppError::BadRequest(format!("query string: {}", e)))?;
        for (key, raw) in pairs {
            if key == SCHEMA_FLAG {
                out.describe = !matches!(raw.as_str(), "false" | "0");
                continue;
            }
            let value = decode_query_value(&raw);
            let seen = out.raw.entry(key.clone()).or_default();
            seen.push(raw);
            match seen.len() {
                1 => {
                    out.args.insert(key, value);
                }
                2 => {
                    let first = out.args.remove(&key).unwrap_or(Value::Null);
                    out.args.insert(key, Value::Array(vec![first, value]));
                }
                _ => {
                    if let Some(Value::Array(items)) = out.args.get_mut(&key) {
                        items.push(value);
                    }
                }
            }
        }
        Ok(out)
    }

    /// Turn decoded values back into their raw strings where the parameter schema wants a string
    /// and would reject the decoded type (`?name=123` for a string `name`).
    pub fn coerce(&mut self, parameters: &SchemaDefinition) {
        for (key, value) in self.args.iter_mut() {
            let Some(prop) = parameters.properties.get(key) else { continue };
            let Some(raw) = self.raw.get(key) else { continue };
            let types = prop.types();
            if types.is_empty() || !types.contains(&SchemaType::String) {
                continue;
            }
            if let [single] = raw.as_slice() {
                if !value.is_string() && !types.iter().any(|t| t.matches(value)) {
                    *value = Value::String(single.clone());
                }
            }
        }
    }

    pub fn into_args(self) -> Arguments {
        self.args
    }
}
