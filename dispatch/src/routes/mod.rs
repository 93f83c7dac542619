//! HTTP route definitions.

mod commands;
mod health;
mod purchases;
mod stats;

use crate::AppState;
use axum::Router;

/// Create all application routes.
pub fn create_routes() -> Router<AppState> {
    Router::new()
        .merge(health::routes())
        .merge(commands::routes())
        .merge(purchases::routes())
        .merge(stats::routes())
}
