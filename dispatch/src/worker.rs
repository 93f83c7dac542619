//! Dispatch worker.
//!
//! A single tokio task drains the queue in FIFO order and hands each event to
//! every registered sink. Each (event, sink) pair is a delivery with its own
//! retry state. An event goes to all sinks at once, and a delivery waiting
//! out its backoff never holds up the rest of the queue. Producers only ever
//! touch the queue mutex and a `Notify`.

use crate::pipeline::Shared;
use crate::sink::{Ack, Sink, SinkError};
use futures::future::join_all;
use pulse_engine::{Event, RetryDecision, RetryState, Timestamp};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// One event on its way to one sink.
struct Delivery {
    event: Arc<Event>,
    sink: Arc<dyn Sink>,
    retry: RetryState,
}

/// Drains the shared queue into the sinks until told to stop.
pub(crate) struct DispatchWorker {
    shared: Arc<Shared>,
    shutdown: watch::Receiver<bool>,
    /// Deliveries backing off after a transient failure
    retries: Vec<Delivery>,
    /// Origin of the worker's millisecond clock
    started: Instant,
}

impl DispatchWorker {
    pub(crate) fn new(shared: Arc<Shared>, shutdown: watch::Receiver<bool>) -> Self {
        Self {
            shared,
            shutdown,
            retries: Vec::new(),
            started: Instant::now(),
        }
    }

    /// Run until shutdown is signalled.
    pub(crate) async fn run(mut self) {
        tracing::debug!("Dispatch worker started");

        loop {
            if *self.shutdown.borrow() {
                break;
            }

            // Due retries go first; they are older than anything queued.
            if let Some(delivery) = self.take_due_retry() {
                self.attempt(delivery).await;
                continue;
            }

            // Backed-off deliveries count against the queue capacity, so a
            // failing sink leaves events in the bounded queue.
            if self.retries.len() < self.shared.config.queue.capacity {
                if let Some(event) = self.shared.pop_event() {
                    self.fan_out(event).await;
                    continue;
                }
            }

            // Idle: wait for a producer, the next retry, or shutdown.
            let next_retry = self
                .retries
                .iter()
                .map(|d| d.retry.next_eligible_at)
                .min()
                .map(|at| self.started + Duration::from_millis(at));
            let retry_due = async move {
                match next_retry {
                    Some(deadline) => tokio::time::sleep_until(deadline).await,
                    None => std::future::pending::<()>().await,
                }
            };

            let shared = Arc::clone(&self.shared);
            tokio::select! {
                _ = shared.wakeup.notified() => {}
                _ = retry_due => {}
                changed = self.shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        tracing::debug!(
            pending_retries = self.retries.len(),
            "Dispatch worker stopped"
        );
    }

    fn now_ms(&self) -> Timestamp {
        self.started.elapsed().as_millis() as Timestamp
    }

    /// Remove and return the due retry with the earliest eligibility time.
    fn take_due_retry(&mut self) -> Option<Delivery> {
        let now = self.now_ms();
        let index = self
            .retries
            .iter()
            .enumerate()
            .filter(|(_, d)| d.retry.is_due(now))
            .min_by_key(|(_, d)| d.retry.next_eligible_at)
            .map(|(i, _)| i)?;

        // Stays counted in `pending_retries` until settled.
        Some(self.retries.remove(index))
    }

    /// Hand one event to every registered sink at once.
    async fn fan_out(&mut self, event: Event) {
        let sinks = self.shared.sinks();
        if sinks.is_empty() {
            self.shared.metrics.record_discarded(1);
            tracing::warn!(
                event_id = event.event_id(),
                "No sinks registered, dropping event"
            );
            return;
        }

        let event = Arc::new(event);
        let deliveries: Vec<Delivery> = sinks
            .into_iter()
            .map(|sink| Delivery {
                event: Arc::clone(&event),
                sink,
                retry: RetryState::new(),
            })
            .collect();

        let results = join_all(deliveries.iter().map(|d| self.send(d))).await;
        for (delivery, result) in deliveries.into_iter().zip(results) {
            self.settle(delivery, result);
        }
        self.publish_pending_retries();
    }

    async fn attempt(&mut self, delivery: Delivery) {
        let result = self.send(&delivery).await;
        self.settle(delivery, result);
        self.publish_pending_retries();
    }

    /// One bounded send; a timeout is a transient failure.
    async fn send(&self, delivery: &Delivery) -> Result<Ack, SinkError> {
        let send_timeout = self.shared.config.send_timeout();
        match tokio::time::timeout(send_timeout, delivery.sink.send(&delivery.event)).await {
            Ok(result) => result,
            Err(_) => Err(SinkError::Transient(format!(
                "send timed out after {:?}",
                send_timeout
            ))),
        }
    }

    fn settle(&mut self, mut delivery: Delivery, result: Result<Ack, SinkError>) {
        let metrics = &self.shared.metrics;
        match result {
            Ok(ack) => {
                metrics.record_delivered();
                tracing::trace!(
                    sink = delivery.sink.name(),
                    event_id = delivery.event.event_id(),
                    receipt = ?ack.receipt,
                    "Event delivered"
                );
            }
            Err(SinkError::Permanent(reason)) => {
                metrics.record_permanent_failure();
                tracing::warn!(
                    sink = delivery.sink.name(),
                    event_id = delivery.event.event_id(),
                    "Sink rejected event permanently, dropping: {}",
                    reason
                );
            }
            Err(SinkError::Transient(reason)) => {
                let now = self.now_ms();
                match self
                    .shared
                    .config
                    .retry
                    .record_failure(&mut delivery.retry, now)
                {
                    RetryDecision::RetryAt { delay_ms, .. } => {
                        metrics.record_retry();
                        tracing::debug!(
                            sink = delivery.sink.name(),
                            event_id = delivery.event.event_id(),
                            attempt = delivery.retry.attempts,
                            delay_ms,
                            "Transient sink failure, retrying: {}",
                            reason
                        );
                        self.retries.push(delivery);
                    }
                    RetryDecision::GiveUp { attempts } => {
                        metrics.record_lost();
                        tracing::warn!(
                            sink = delivery.sink.name(),
                            event_id = delivery.event.event_id(),
                            attempts,
                            "Giving up on event after repeated failures: {}",
                            reason
                        );
                    }
                }
            }
        }
    }

    fn publish_pending_retries(&self) {
        self.shared
            .pending_retries
            .store(self.retries.len(), Ordering::Relaxed);
    }
}
