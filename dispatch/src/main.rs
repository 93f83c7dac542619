//! Pulse Collector - HTTP front end for the analytics pipeline.
//!
//! Game clients or a relay post host messages and purchases here; the
//! collector validates them and dispatches to the configured sinks.

use pulse_dispatch::{app, AppState, Config, HttpSink, LoggingSink, Pipeline};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "pulse_collector=debug,pulse_dispatch=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    tracing::info!("Starting Pulse Collector on {}:{}", config.host, config.port);

    // Build the pipeline and its sinks
    let pipeline = Arc::new(Pipeline::new(
        config.pipeline.clone(),
        tokio::runtime::Handle::current(),
    ));
    if config.log_events {
        pipeline.register_sink(Arc::new(LoggingSink::new()));
    }
    if let Some(url) = &config.sink_url {
        pipeline.register_sink(Arc::new(HttpSink::new(url.as_str())));
    }

    let state = AppState {
        pipeline: Arc::clone(&pipeline),
        config: Arc::new(config.clone()),
    };

    // Start server
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    pipeline.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
