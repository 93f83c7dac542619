//! Delivery counters.
//!
//! Soft failures (overflow, permanent sink failures, exhausted retries) are
//! never surfaced to producers; they are counted here instead.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters shared between producers and the worker.
#[derive(Debug, Default)]
pub struct Metrics {
    accepted: AtomicU64,
    rejected: AtomicU64,
    queue_overflow: AtomicU64,
    delivered: AtomicU64,
    retried: AtomicU64,
    permanent_failures: AtomicU64,
    lost: AtomicU64,
    discarded: AtomicU64,
}

/// Point-in-time copy of [`Metrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    /// Events that passed validation and were queued or buffered
    pub accepted: u64,
    /// Events dropped by validation
    pub rejected: u64,
    /// Events dropped because a buffer was full
    pub queue_overflow: u64,
    /// Successful sink deliveries
    pub delivered: u64,
    /// Retry attempts scheduled after transient failures
    pub retried: u64,
    /// Deliveries dropped on a permanent sink failure
    pub permanent_failures: u64,
    /// Deliveries dropped after exhausting their retries
    pub lost: u64,
    /// Events still pending when the pipeline shut down
    pub discarded: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_accepted(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_overflow(&self, count: u64) {
        self.queue_overflow.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retry(&self) {
        self.retried.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_permanent_failure(&self) {
        self.permanent_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_lost(&self) {
        self.lost.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_discarded(&self, count: u64) {
        self.discarded.fetch_add(count, Ordering::Relaxed);
    }

    /// Take a snapshot of all counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            accepted: self.accepted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            queue_overflow: self.queue_overflow.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            permanent_failures: self.permanent_failures.load(Ordering::Relaxed),
            lost: self.lost.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
        }
    }
}
