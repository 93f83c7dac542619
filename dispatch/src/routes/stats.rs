//! Pipeline statistics endpoint.

use axum::{extract::State, routing::get, Json, Router};

use crate::auth::IngestClient;
use crate::pipeline::PipelineStats;
use crate::AppState;

/// Create stats routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/stats", get(stats_handler))
}

/// GET /stats - Queue depth, state and delivery counters.
async fn stats_handler(State(state): State<AppState>, _client: IngestClient) -> Json<PipelineStats> {
    Json(state.pipeline.stats())
}
