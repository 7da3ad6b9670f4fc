use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};

use super::AppState;

/// Lightweight liveness probe — the process is up, independent of whether
/// any provider currently validates.
pub async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// The validator's current view of valid candidates per chain, as last
/// published by the most recent validation cycle.
pub async fn providers_handler(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.snapshot.load();
    (StatusCode::OK, Json(serde_json::to_value(&**snapshot).unwrap()))
}

/// Prometheus text-format exposition.
pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, state.metrics_handle.render())
}
