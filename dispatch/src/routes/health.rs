//! Liveness and pipeline state.

use axum::{extract::State, routing::get, Json, Router};
use pulse_engine::InitState;
use serde::Serialize;

use crate::AppState;

/// Body of `GET /health`. Open to unauthenticated callers.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    /// Whether the pipeline has been initialized
    pub state: InitState,
    /// Whether delivery has stopped for good
    pub shut_down: bool,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/", get(root))
}

/// Reports `draining` once the pipeline has shut down.
async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let shut_down = state.pipeline.is_shut_down();
    Json(HealthResponse {
        status: if shut_down { "draining" } else { "ok" },
        version: env!("CARGO_PKG_VERSION"),
        state: state.pipeline.state(),
        shut_down,
    })
}

async fn root() -> &'static str {
    "Pulse Collector"
}
