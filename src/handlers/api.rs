//! The single suite handler: resolve the request, then dispatch it.

use crate::dispatch::{Dispatcher, Resolver};
use crate::error::AppError;
use crate::response;
use crate::state::AppState;
use axum::{
    body::Bytes,
    extract::{OriginalUri, State},
    http::Method,
    response::IntoResponse,
};
use serde_json::Value;

fn parse_body(bytes: &Bytes) -> Result<Option<Value>, AppError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    serde_json::from_slice(bytes)
        .map(Some)
        .map_err(|e| AppError::BadRequest(format!("request body is not valid JSON: {}", e)))
}

pub async fn handle(
    State(state): State<AppState>,
    method: Method,
    OriginalUri(uri): OriginalUri,
    bytes: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let result = serve(&state, &method, uri.path(), uri.query(), &bytes).await;
    if let Err(e) = &result {
        if e.status().is_client_error() {
            tracing::warn!(method = %method, path = %uri.path(), status = e.status().as_u16(), error = %e, "request rejected");
        }
    }
    result
}

async fn serve(
    state: &AppState,
    method: &Method,
    path: &str,
    query: Option<&str>,
    bytes: &Bytes,
) -> Result<(axum::http::StatusCode, axum::Json<Value>), AppError> {
    let body = parse_body(bytes)?;
    let target = Resolver::new(state.suite.clone()).resolve(method, path, query).await?;
    let created = target.is_create();
    let data = Dispatcher::new(state.suite.clone()).invoke(target, body).await?;
    Ok(if created { response::created(data) } else { response::ok(data) })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_body_is_absent() {
        assert_eq!(parse_body(&Bytes::from_static(b"")).unwrap(), None);
        assert_eq!(parse_body(&Bytes::from_static(b" \n")).unwrap(), None);
        assert_eq!(parse_body(&Bytes::from_static(b"{\"a\":1}")).unwrap(), Some(serde_json::json!({"a": 1})));
        assert!(matches!(parse_body(&Bytes::from_static(b"{oops")), Err(AppError::BadRequest(_))));
    }
}
