//! Typed errors and HTTP mapping.

use crate::response::error_body;
use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Startup-time errors. Any of these prevents the suite from becoming ready.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("duplicate {kind} name: '{name}'")]
    DuplicateName { kind: &'static str, name: String },
    #[error("missing reference: {kind} '{id}'")]
    MissingReference { kind: &'static str, id: String },
    #[error("invalid primary key: collection {collection} field {field}")]
    InvalidPrimaryKey { collection: String, field: String },
    #[error("malformed schema at '{path}': {reason}")]
    MalformedSchema { path: String, reason: String },
    #[error("method '{method}' is declared for {declared:?} but registered on {registered:?}")]
    WrongOwner {
        method: String,
        declared: crate::model::OwnerKind,
        registered: crate::model::OwnerKind,
    },
    #[error("invalid name '{0}': names must be non-empty path segments")]
    InvalidName(String),
    #[error("config load: {0}")]
    Load(String),
}

/// One failing constraint. `path` is dotted (`address.zip`, `tags[1]`); the root is `""`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Violation {
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
    pub message: String,
}

/// Every violation found in a value, not just the first.
#[derive(Error, Clone, Debug, Default, PartialEq)]
#[error("validation failed: {}", describe_violations(.violations))]
pub struct ValidationError {
    pub violations: Vec<Violation>,
}

fn describe_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(|v| {
            if v.path.is_empty() {
                v.message.clone()
            } else {
                format!("{} {}", v.path, v.message)
            }
        })
        .collect::<Vec<_>>()
        .join("; ")
}

impl ValidationError {
    pub fn single(path: impl Into<String>, expected: Option<String>, message: impl Into<String>) -> Self {
        let mut err = ValidationError::default();
        err.push(path, expected, message);
        err
    }

    pub fn push(&mut self, path: impl Into<String>, expected: Option<String>, message: impl Into<String>) {
        self.violations.push(Violation {
            path: path.into(),
            expected,
            message: message.into(),
        });
    }

    pub fn extend(&mut self, other: ValidationError) {
        self.violations.extend(other.violations);
    }

    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    /// Paths of all violations, in discovery order.
    pub fn paths(&self) -> Vec<&str> {
        self.violations.iter().map(|v| v.path.as_str()).collect()
    }

    pub fn into_result(self) -> Result<(), ValidationError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RouteError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("method {method} not allowed on {target}")]
    MethodNotAllowed {
        method: String,
        target: String,
        allowed: Vec<&'static str>,
    },
}

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("not found: {0}")]
    NotFound(String),
    /// A value produced server-side violates its declared schema.
    #[error("{target} violated its declared schema: {source}")]
    SchemaViolation { target: String, source: ValidationError },
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("store: {0}")]
    Store(String),
    #[error("{0}")]
    Failed(String),
}

impl DispatchError {
    /// Internal errors are server-side defects; callers only see a generic message.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            DispatchError::SchemaViolation { .. } | DispatchError::Store(_) | DispatchError::Failed(_)
        )
    }
}

impl From<RouteError> for DispatchError {
    fn from(e: RouteError) -> Self {
        match e {
            RouteError::NotFound(what) => DispatchError::NotFound(what),
            other => DispatchError::BadRequest(other.to_string()),
        }
    }
}

impl From<crate::store::StoreError> for DispatchError {
    fn from(e: crate::store::StoreError) -> Self {
        use crate::store::StoreError;
        match e {
            StoreError::Conflict(msg) => DispatchError::Conflict(msg),
            StoreError::NotFound(what) => DispatchError::NotFound(what),
            StoreError::Backend(msg) => DispatchError::Store(msg),
        }
    }
}

/// Request-boundary error: everything a single request can fail with.
#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Route(#[from] RouteError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error("bad request: {0}")]
    BadRequest(String),
}

impl From<ValidationError> for AppError {
    fn from(e: ValidationError) -> Self {
        AppError::Dispatch(DispatchError::Validation(e))
    }
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        self.classify().0
    }

    pub fn kind(&self) -> &'static str {
        self.classify().1
    }

    fn classify(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Route(RouteError::NotFound(_)) => (StatusCode::NOT_FOUND, "not_found"),
            AppError::Route(RouteError::MethodNotAllowed { .. }) => {
                (StatusCode::METHOD_NOT_ALLOWED, "method_not_allowed")
            }
            AppError::Dispatch(e) => match e {
                DispatchError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
                DispatchError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
                DispatchError::SchemaViolation { .. } => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "schema_violation")
                }
                DispatchError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
                DispatchError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
                DispatchError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "store_error"),
                DispatchError::Failed(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
            },
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            AppError::Dispatch(DispatchError::Validation(v)) => serde_json::to_value(&v.violations).ok(),
            _ => None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, kind) = self.classify();
        let message = match &self {
            AppError::Dispatch(e) if e.is_internal() => {
                tracing::error!(error = %e, "internal error while serving request");
                "internal server error".to_string()
            }
            other => other.to_string(),
        };
        let body = error_body(kind, message, self.details());
        let mut response = (status, Json(body)).into_response();
        if let AppError::Route(RouteError::MethodNotAllowed { allowed, .. }) = &self {
            if let Ok(value) = HeaderValue::from_str(&allowed.join(", ")) {
                response.headers_mut().insert(header::ALLOW, value);
            }
        }
        response
    }
}
