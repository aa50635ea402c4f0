//! Response helpers. Success bodies are the bare JSON value the method returned.

use axum::{http::StatusCode, Json};
use serde_json::Value;

pub fn ok(data: Value) -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(data))
}

pub fn created(data: Value) -> (StatusCode, Json<Value>) {
    (StatusCode::CREATED, Json(data))
}

/// Flat error object: `{"error": kind, "message": ..., "details": ...}`.
pub fn error_body(kind: &str, message: String, details: Option<Value>) -> Value {
    let mut body = serde_json::json!({
        "error": kind,
        "message": message,
    });
    if let (Some(details), Value::Object(map)) = (details, &mut body) {
        map.insert("details".into(), details);
    }
    body
}
