//! Host command endpoint.

use axum::{extract::State, routing::post, Json, Router};
use serde::Serialize;

use crate::auth::IngestClient;
use crate::AppState;

/// Outcome of a command batch.
#[derive(Debug, Serialize)]
pub struct CommandsResponse {
    /// Lines recognised as analytics commands
    pub handled: usize,
    /// Lines left for another handler
    pub ignored: usize,
}

/// Create command routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/commands", post(commands_handler))
}

/// POST /commands - One pipe-delimited message per line.
async fn commands_handler(
    State(state): State<AppState>,
    _client: IngestClient,
    body: String,
) -> Json<CommandsResponse> {
    let mut response = CommandsResponse {
        handled: 0,
        ignored: 0,
    };

    for line in body.lines().filter(|line| !line.trim().is_empty()) {
        if state.pipeline.handle_message(line) {
            response.handled += 1;
        } else {
            tracing::debug!(message = line, "Ignoring non-analytics message");
            response.ignored += 1;
        }
    }

    Json(response)
}
