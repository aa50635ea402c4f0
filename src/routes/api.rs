//! Suite routes: every path under the base path goes to one handler.

use crate::handlers::api::handle;
use crate::state::AppState;
use axum::{extract::DefaultBodyLimit, routing::any, Router};
use tower_http::limit::RequestBodyLimitLayer;

pub fn suite_routes(state: AppState) -> Router {
    let settings = state.suite.settings();
    let base = settings.base_path.clone();
    let limit = settings.max_body_bytes;
    tracing::info!(base_path = %base, max_body_bytes = limit, "mounting suite routes");

    let router = if base.is_empty() {
        Router::new().route("/", any(handle)).route("/*rest", any(handle))
    } else {
        Router::new()
            .route(&base, any(handle))
            .route(&format!("{}/", base), any(handle))
            .route(&format!("{}/*rest", base), any(handle))
    };
    router
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(limit))
        .with_state(state)
}
