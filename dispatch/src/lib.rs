//! # Pulse Dispatch
//!
//! Runtime half of the Pulse analytics pipeline.
//!
//! [`Pipeline`] wraps the pure `pulse-engine` queue and gate in a mutex,
//! accepts events from any thread and drains them on a tokio task into the
//! registered [`Sink`]s, retrying transient failures with exponential
//! backoff. Embedded hosts reach it through the C ABI in [`ffi`]; the
//! `pulse-collector` binary exposes it over HTTP.
//!
//! ```rust,no_run
//! use pulse_dispatch::{LoggingSink, Pipeline, PipelineConfig};
//! use std::sync::Arc;
//!
//! # #[tokio::main] async fn main() {
//! let pipeline = Pipeline::new(PipelineConfig::default(), tokio::runtime::Handle::current());
//! pipeline.register_sink(Arc::new(LoggingSink::new()));
//!
//! pipeline.handle_message("analytics-send-screen-view|title");
//! pipeline.handle_message("game-analytics-initialize|game-key|secret-key");
//!
//! pipeline.shutdown().await;
//! # }
//! ```

pub mod auth;
pub mod config;
pub mod error;
pub mod ffi;
pub mod metrics;
pub mod pipeline;
pub mod routes;
pub mod sink;
mod worker;

pub use config::{Config, ConfigError, PipelineConfig};
pub use metrics::{Metrics, MetricsSnapshot};
pub use pipeline::{Pipeline, PipelineStats};
pub use sink::{Ack, HttpSink, LoggingSink, NullSink, SendFuture, Sink, SinkError};

use axum::Router;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub config: Arc<Config>,
}

/// Build the collector's router.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(routes::create_routes())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
