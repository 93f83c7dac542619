//! Sink capability.
//!
//! A sink is a delivery backend for finalized events. The pipeline never owns
//! its sinks: the embedding application keeps its own `Arc` handle and lends a
//! clone to the pipeline.

mod http;
mod logging;

pub use http::{HttpSink, BUILD_HEADER, RECEIPT_HEADER};
pub use logging::LoggingSink;

use futures::future::BoxFuture;
use futures::FutureExt;
use pulse_engine::{Credentials, Event};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Future returned by [`Sink::send`].
pub type SendFuture<'a> = BoxFuture<'a, Result<Ack, SinkError>>;

/// Acknowledgement of a delivered event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ack {
    /// Backend-assigned receipt, if the backend returns one
    pub receipt: Option<String>,
}

impl Ack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_receipt(receipt: impl Into<String>) -> Self {
        Self {
            receipt: Some(receipt.into()),
        }
    }
}

/// Delivery failure reported by a sink.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SinkError {
    /// May succeed if retried unchanged (timeout, unavailable backend)
    #[error("transient sink failure: {0}")]
    Transient(String),

    /// Will never succeed unchanged (malformed payload, rejected request)
    #[error("permanent sink failure: {0}")]
    Permanent(String),
}

impl SinkError {
    pub fn is_transient(&self) -> bool {
        matches!(self, SinkError::Transient(_))
    }
}

/// A delivery backend.
pub trait Sink: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Deliver one event.
    fn send<'a>(&'a self, event: &'a Event) -> SendFuture<'a>;

    /// Tell the backend which build produced the events.
    fn configure_environment(&self, build_label: &str);

    /// Toggle the backend's own diagnostic logging.
    fn set_logging(&self, enabled: bool);

    /// Hand over the credentials accepted at initialization.
    fn configure_credentials(&self, _credentials: &Credentials) {}
}

/// Sink that accepts and discards everything.
#[derive(Debug, Clone, Default)]
pub struct NullSink;

impl NullSink {
    pub fn new() -> Self {
        Self
    }
}

impl Sink for NullSink {
    fn name(&self) -> &str {
        "null"
    }

    fn send<'a>(&'a self, _event: &'a Event) -> SendFuture<'a> {
        futures::future::ready(Ok(Ack::new())).boxed()
    }

    fn configure_environment(&self, _build_label: &str) {}

    fn set_logging(&self, _enabled: bool) {}
}

// Sinks hold small pieces of configuration behind std locks; a poisoned lock
// still holds a usable value.
fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}
