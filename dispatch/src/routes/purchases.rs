//! Store purchase endpoint.

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use pulse_engine::PurchaseInput;

use crate::auth::IngestClient;
use crate::error::Result;
use crate::AppState;

/// Create purchase routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/purchases", post(purchase_handler))
}

/// POST /purchases - Validate and enqueue a purchase.
async fn purchase_handler(
    State(state): State<AppState>,
    _client: IngestClient,
    Json(input): Json<PurchaseInput>,
) -> Result<StatusCode> {
    state.pipeline.record_purchase(input)?;
    Ok(StatusCode::ACCEPTED)
}
