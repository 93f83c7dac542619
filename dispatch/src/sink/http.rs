//! Sink that posts events to an HTTP analytics backend.
//!
//! Events are sent one per request as JSON to `<endpoint>/<gameKey>/events`.
//! Connection problems, timeouts, 429 and 5xx responses are transient; any
//! other non-success status means the backend rejected the payload.

use super::{read, write, Ack, SendFuture, Sink, SinkError};
use futures::FutureExt;
use pulse_engine::{Credentials, Event};
use reqwest::StatusCode;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

/// Header carrying the build label.
pub const BUILD_HEADER: &str = "x-pulse-build";

/// Header a backend may use to return a receipt.
pub const RECEIPT_HEADER: &str = "x-request-id";

/// Request body.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EventEnvelope<'a> {
    build: &'a str,
    event: &'a Event,
}

/// Posts events to an HTTP collector.
#[derive(Debug)]
pub struct HttpSink {
    client: reqwest::Client,
    endpoint: String,
    game_key: RwLock<Option<String>>,
    build_label: RwLock<String>,
    verbose: AtomicBool,
}

impl HttpSink {
    /// Create a sink for the given base URL.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), endpoint)
    }

    /// Create a sink sharing an existing client.
    pub fn with_client(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        let endpoint = endpoint.into().trim_end_matches('/').to_string();
        Self {
            client,
            endpoint,
            game_key: RwLock::new(None),
            build_label: RwLock::new(String::new()),
            verbose: AtomicBool::new(false),
        }
    }

    /// URL events are posted to, once a game key is known.
    pub fn events_url(&self) -> Option<String> {
        read(&self.game_key)
            .as_ref()
            .map(|key| format!("{}/{}/events", self.endpoint, key))
    }

    async fn post(&self, event: &Event) -> Result<Ack, SinkError> {
        let url = self
            .events_url()
            .ok_or_else(|| SinkError::Permanent("no game key configured".to_string()))?;
        let build = read(&self.build_label).clone();

        let response = self
            .client
            .post(&url)
            .header(BUILD_HEADER, build.as_str())
            .json(&EventEnvelope {
                build: &build,
                event,
            })
            .send()
            .await
            .map_err(classify_error)?;

        let status = response.status();
        if self.verbose.load(Ordering::Relaxed) {
            tracing::debug!(%url, %status, event_id = event.event_id(), "HTTP sink response");
        }
        classify_status(status)?;

        let receipt = response
            .headers()
            .get(RECEIPT_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        Ok(Ack { receipt })
    }
}

impl Sink for HttpSink {
    fn name(&self) -> &str {
        "http"
    }

    fn send<'a>(&'a self, event: &'a Event) -> SendFuture<'a> {
        self.post(event).boxed()
    }

    fn configure_environment(&self, build_label: &str) {
        *write(&self.build_label) = build_label.to_string();
    }

    fn set_logging(&self, enabled: bool) {
        self.verbose.store(enabled, Ordering::Relaxed);
    }

    fn configure_credentials(&self, credentials: &Credentials) {
        *write(&self.game_key) = Some(credentials.game_key.clone());
    }
}

/// Map a response status to a delivery outcome.
pub fn classify_status(status: StatusCode) -> Result<(), SinkError> {
    if status.is_success() {
        Ok(())
    } else if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        Err(SinkError::Transient(format!("backend returned {}", status)))
    } else {
        Err(SinkError::Permanent(format!("backend returned {}", status)))
    }
}

fn classify_error(error: reqwest::Error) -> SinkError {
    if error.is_builder() {
        SinkError::Permanent(error.to_string())
    } else {
        SinkError::Transient(error.to_string())
    }
}
