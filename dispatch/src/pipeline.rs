//! The pipeline: the object an application talks to.
//!
//! The pipeline owns the event queue and the initialization gate. Producers
//! call [`Pipeline::push`] (or the command/purchase entry points) from any
//! thread; those calls only take a short mutex and never wait on a sink.
//! The first successful [`Pipeline::initialize`] releases buffered events and
//! starts the [`DispatchWorker`](crate::worker::DispatchWorker).

use crate::config::PipelineConfig;
use crate::metrics::{Metrics, MetricsSnapshot};
use crate::sink::Sink;
use crate::worker::DispatchWorker;
use pulse_engine::{
    error::Result, Command, Credentials, Event, EventQueue, InitState, InitializationGate,
    PurchaseInput, PushOutcome, Timestamp,
};
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use tokio::runtime::Handle;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;

/// State guarded by the pipeline mutex.
pub(crate) struct Core {
    gate: InitializationGate,
    queue: EventQueue,
    shut_down: bool,
}

/// State shared between the pipeline handle and its worker.
pub(crate) struct Shared {
    core: Mutex<Core>,
    sinks: RwLock<Vec<Arc<dyn Sink>>>,
    pub(crate) config: PipelineConfig,
    pub(crate) metrics: Metrics,
    pub(crate) wakeup: Notify,
    pub(crate) pending_retries: AtomicUsize,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Core> {
        self.core.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn pop_event(&self) -> Option<Event> {
        self.lock().queue.pop_front()
    }

    /// Snapshot of the registered sinks.
    pub(crate) fn sinks(&self) -> Vec<Arc<dyn Sink>> {
        self.sinks
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

/// Queue and delivery statistics.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineStats {
    pub state: InitState,
    /// Events waiting in the main queue
    pub queued: usize,
    /// Events waiting for initialization
    pub buffered: usize,
    /// Deliveries backing off after a transient failure
    pub pending_retries: usize,
    /// Registered sinks
    pub sinks: usize,
    pub metrics: MetricsSnapshot,
}

/// Analytics event pipeline.
pub struct Pipeline {
    shared: Arc<Shared>,
    runtime: Handle,
    shutdown: watch::Sender<bool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Pipeline {
    /// Create an uninitialized pipeline whose worker will run on `runtime`.
    pub fn new(config: PipelineConfig, runtime: Handle) -> Self {
        let queue = EventQueue::new(config.queue);
        let (shutdown, _) = watch::channel(false);

        Self {
            shared: Arc::new(Shared {
                core: Mutex::new(Core {
                    gate: InitializationGate::new(),
                    queue,
                    shut_down: false,
                }),
                sinks: RwLock::new(Vec::new()),
                config,
                metrics: Metrics::new(),
                wakeup: Notify::new(),
                pending_retries: AtomicUsize::new(0),
            }),
            runtime,
            shutdown,
            worker: Mutex::new(None),
        }
    }

    /// Get the configuration.
    pub fn config(&self) -> &PipelineConfig {
        &self.shared.config
    }

    /// Lend a sink to the pipeline.
    ///
    /// A sink registered after initialization is configured immediately;
    /// earlier ones are configured by [`Pipeline::initialize`].
    pub fn register_sink(&self, sink: Arc<dyn Sink>) {
        // Holding the registry across the gate check means `initialize`
        // either sees this sink in its snapshot or opened the gate first.
        let mut sinks = self
            .shared
            .sinks
            .write()
            .unwrap_or_else(|e| e.into_inner());
        let credentials = self.shared.lock().gate.credentials().cloned();
        if let Some(credentials) = credentials {
            self.configure_sink(sink.as_ref(), &credentials);
        }

        tracing::info!(sink = sink.name(), "Sink registered");
        sinks.push(sink);
    }

    /// Initialize with backend credentials and start dispatching.
    ///
    /// Fails with `MissingCredentials` on blank keys. Any call after the first
    /// success returns `AlreadyInitialized` and changes nothing: the worker is
    /// not restarted and nothing is re-flushed.
    pub fn initialize(&self, game_key: &str, secret_key: &str) -> Result<()> {
        let (credentials, released) = {
            let mut core = self.shared.lock();
            let credentials = match core.gate.open(game_key, secret_key) {
                Ok(credentials) => credentials.clone(),
                Err(e) if e.is_already_initialized() => {
                    tracing::debug!("Analytics already initialized, ignoring");
                    return Err(e);
                }
                Err(e) => {
                    tracing::warn!("Analytics initialization refused: {}", e);
                    return Err(e);
                }
            };
            let overflow_before = core.queue.overflow_count();
            let released = core.queue.open();
            let dropped = core.queue.overflow_count() - overflow_before;
            if dropped > 0 {
                self.shared.metrics.record_overflow(dropped);
                tracing::debug!(dropped, "Buffered events exceeded queue capacity");
            }
            (credentials, released)
        };

        for sink in self.shared.sinks() {
            self.configure_sink(sink.as_ref(), &credentials);
        }

        let worker = DispatchWorker::new(Arc::clone(&self.shared), self.shutdown.subscribe());
        let handle = self.runtime.spawn(worker.run());
        *self.worker.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);

        tracing::info!(
            build = %self.shared.config.build_label,
            released,
            "Analytics initialized"
        );
        self.shared.wakeup.notify_one();
        Ok(())
    }

    fn configure_sink(&self, sink: &dyn Sink, credentials: &Credentials) {
        sink.configure_credentials(credentials);
        sink.configure_environment(&self.shared.config.build_label);
        sink.set_logging(self.shared.config.sink_debug);
    }

    /// Enqueue a validated event. Never blocks and never fails.
    ///
    /// Before initialization the event is buffered; when a buffer is full its
    /// oldest event is dropped and counted. Once open, deliveries backing off
    /// after a transient failure count against the queue capacity too.
    pub fn push(&self, event: Event) {
        let (outcome, trimmed, open) = {
            let mut core = self.shared.lock();
            if core.shut_down {
                tracing::debug!(
                    event_id = event.event_id(),
                    "Pipeline shut down, dropping event"
                );
                return;
            }
            let outcome = core.queue.push(event);
            let open = core.queue.is_open();
            let trimmed = if open {
                let pending = self.shared.pending_retries.load(Ordering::Relaxed);
                let budget = core.queue.config().capacity.saturating_sub(pending);
                core.queue.trim_to(budget)
            } else {
                0
            };
            (outcome, trimmed, open)
        };

        let metrics = &self.shared.metrics;
        match outcome {
            PushOutcome::Displaced(dropped) => {
                metrics.record_accepted();
                metrics.record_overflow(1);
                tracing::debug!(
                    event_id = dropped.event_id(),
                    "Event buffer full, dropped event"
                );
            }
            PushOutcome::Rejected(dropped) => {
                metrics.record_overflow(1);
                tracing::debug!(
                    event_id = dropped.event_id(),
                    "Event buffer has no capacity, dropped event"
                );
            }
            PushOutcome::Queued | PushOutcome::Buffered => metrics.record_accepted(),
        }
        if trimmed > 0 {
            metrics.record_overflow(trimmed as u64);
            tracing::debug!(trimmed, "Retries hold the queue budget, dropped oldest events");
        }

        if open {
            self.shared.wakeup.notify_one();
        }
    }

    /// Validate a store purchase and enqueue it.
    ///
    /// Validation errors are logged and returned for diagnostics; the
    /// purchase is not queued.
    pub fn record_purchase(&self, input: PurchaseInput) -> Result<()> {
        match input.validate(now_ms()) {
            Ok(event) => {
                self.push(event.into());
                Ok(())
            }
            Err(e) => {
                self.shared.metrics.record_rejected();
                tracing::warn!("Dropped invalid purchase: {}", e);
                Err(e)
            }
        }
    }

    /// Route a pipe-delimited host message.
    ///
    /// Returns `false` when the message is not an analytics command, so the
    /// host can try its next handler.
    pub fn handle_message(&self, message: &str) -> bool {
        self.handle_command(&pulse_engine::split_message(message))
    }

    /// Route an already split host message.
    pub fn handle_command(&self, parts: &[&str]) -> bool {
        match Command::parse(parts, now_ms()) {
            None => false,
            Some(Ok(Command::Initialize {
                game_key,
                secret_key,
            })) => {
                // Refusals are logged by initialize
                let _ = self.initialize(&game_key, &secret_key);
                true
            }
            Some(Ok(Command::Send(event))) => {
                self.push(event);
                true
            }
            Some(Err(e)) => {
                self.shared.metrics.record_rejected();
                tracing::warn!(
                    command = parts.first().copied().unwrap_or_default(),
                    "Dropped invalid analytics command: {}",
                    e
                );
                true
            }
        }
    }

    /// Current initialization state.
    pub fn state(&self) -> InitState {
        self.shared.lock().gate.state()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shared.lock().shut_down
    }

    /// Events waiting in the main queue.
    pub fn queue_len(&self) -> usize {
        self.shared.lock().queue.len()
    }

    /// Snapshot of the queued events, oldest first.
    pub fn queued_events(&self) -> Vec<Event> {
        self.shared.lock().queue.iter().cloned().collect()
    }

    /// Delivery counters.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.shared.metrics.snapshot()
    }

    /// Queue and delivery statistics.
    pub fn stats(&self) -> PipelineStats {
        let (state, queued, buffered) = {
            let core = self.shared.lock();
            (
                core.gate.state(),
                core.queue.len(),
                core.queue.pre_init_len(),
            )
        };

        PipelineStats {
            state,
            queued,
            buffered,
            pending_retries: self.shared.pending_retries.load(Ordering::Relaxed),
            sinks: self.shared.sinks().len(),
            metrics: self.metrics(),
        }
    }

    /// Stop the worker and discard whatever is still pending.
    ///
    /// The worker gets the configured grace period to finish its in-flight
    /// send; after that the send is abandoned. Events still queued are
    /// dropped: the queue is not a durable log.
    pub async fn shutdown(&self) {
        self.shared.lock().shut_down = true;
        self.shutdown.send_replace(true);

        let handle = self
            .worker
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(mut handle) = handle {
            let grace = self.shared.config.shutdown_grace();
            if tokio::time::timeout(grace, &mut handle).await.is_err() {
                tracing::warn!(
                    "Dispatch worker did not stop within {:?}, abandoning in-flight send",
                    grace
                );
                handle.abort();
            }
        }

        let discarded = self.shared.lock().queue.clear()
            + self.shared.pending_retries.swap(0, Ordering::Relaxed);
        self.shared.metrics.record_discarded(discarded as u64);
        tracing::info!(discarded, "Analytics pipeline shut down");
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
    }
}

/// Wall-clock milliseconds for event creation.
fn now_ms() -> Timestamp {
    chrono::Utc::now().timestamp_millis().max(0) as Timestamp
}
