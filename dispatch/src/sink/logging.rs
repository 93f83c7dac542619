//! Sink that writes events to the log.

use super::{read, write, Ack, SendFuture, Sink};
use futures::FutureExt;
use pulse_engine::Event;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

/// Writes every event through `tracing`. Verbose mode adds the full JSON.
#[derive(Debug)]
pub struct LoggingSink {
    build_label: RwLock<String>,
    verbose: AtomicBool,
}

impl LoggingSink {
    pub fn new() -> Self {
        Self {
            build_label: RwLock::new(String::new()),
            verbose: AtomicBool::new(false),
        }
    }

    /// Build label last set through `configure_environment`.
    pub fn build_label(&self) -> String {
        read(&self.build_label).clone()
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose.load(Ordering::Relaxed)
    }
}

impl Default for LoggingSink {
    fn default() -> Self {
        Self::new()
    }
}

impl Sink for LoggingSink {
    fn name(&self) -> &str {
        "log"
    }

    fn send<'a>(&'a self, event: &'a Event) -> SendFuture<'a> {
        let build = self.build_label();
        tracing::info!(
            kind = %event.kind(),
            event_id = event.event_id(),
            value = ?event.value(),
            build = %build,
            "Analytics event"
        );

        if self.is_verbose() {
            match serde_json::to_string(event) {
                Ok(json) => tracing::debug!(payload = %json, "Analytics event payload"),
                Err(e) => tracing::warn!("Failed to serialize event {}: {}", event.event_id(), e),
            }
        }

        futures::future::ready(Ok(Ack::new())).boxed()
    }

    fn configure_environment(&self, build_label: &str) {
        *write(&self.build_label) = build_label.to_string();
    }

    fn set_logging(&self, enabled: bool) {
        self.verbose.store(enabled, Ordering::Relaxed);
    }
}
