//! Operational routes: liveness, per-application store readiness, build version and suite info.

use crate::state::AppState;
use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;

#[derive(Serialize)]
struct Liveness {
    alive: bool,
}

/// `ready` only when every application's stores answered.
#[derive(Serialize)]
struct Readiness {
    ready: bool,
    applications: BTreeMap<String, &'static str>,
}

async fn liveness() -> Json<Liveness> {
    Json(Liveness { alive: true })
}

async fn readiness(State(state): State<AppState>) -> (StatusCode, Json<Readiness>) {
    let mut applications = BTreeMap::new();
    for app in state.suite.applications() {
        let store = match app.ping_stores().await {
            Ok(()) => "reachable",
            Err(e) => {
                tracing::warn!(application = %app.name(), error = %e, "store unreachable");
                "unreachable"
            }
        };
        applications.insert(app.name().to_string(), store);
    }
    let ready = applications.values().all(|s| *s == "reachable");
    let status = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status, Json(Readiness { ready, applications }))
}

fn build() -> Value {
    json!({
        "package": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    })
}

async fn version() -> Json<Value> {
    Json(build())
}

async fn info(State(state): State<AppState>) -> Json<Value> {
    let settings = state.suite.settings();
    Json(json!({
        "build": build(),
        "suite": settings.name,
        "base_path": settings.base_path,
        "applications": state.suite.applications().map(|a| a.url().to_string()).collect::<Vec<_>>(),
    }))
}

/// Stateless subset: GET /health and GET /version.
pub fn common_routes() -> Router {
    Router::new()
        .route("/health", get(liveness))
        .route("/version", get(version))
}

/// GET /health, /ready, /version and /info over the served suite.
pub fn common_routes_with_ready(state: AppState) -> Router {
    Router::new()
        .route("/health", get(liveness))
        .route("/ready", get(readiness))
        .route("/version", get(version))
        .route("/info", get(info))
        .with_state(state)
}
