//! Integration tests for queueing, dispatch and retry.
//!
//! Tests run on a paused tokio clock, so backoff delays elapse instantly and
//! attempt times are exact.

use futures::FutureExt;
use pulse_dispatch::{
    Ack, LoggingSink, Pipeline, PipelineConfig, PipelineStats, SendFuture, Sink, SinkError,
};
use pulse_engine::{
    Credentials, Error, Event, InitState, QueueConfig, RetryPolicy, ScreenView,
};
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Barrier, Mutex};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::time::Instant;

/// Sink that replays a scripted list of outcomes and records every attempt.
#[derive(Default)]
struct ScriptedSink {
    script: Mutex<VecDeque<Result<(), SinkError>>>,
    attempts: Mutex<Vec<(String, Instant)>>,
    /// Outcome once the script is exhausted; success when unset
    fallback: Option<SinkError>,
}

impl ScriptedSink {
    fn new(script: Vec<Result<(), SinkError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            ..Default::default()
        }
    }

    fn always(error: SinkError) -> Self {
        Self {
            fallback: Some(error),
            ..Default::default()
        }
    }

    fn attempted_ids(&self) -> Vec<String> {
        self.attempts
            .lock()
            .unwrap()
            .iter()
            .map(|(id, _)| id.clone())
            .collect()
    }

    fn attempt_times(&self) -> Vec<Instant> {
        self.attempts.lock().unwrap().iter().map(|(_, at)| *at).collect()
    }
}

impl Sink for ScriptedSink {
    fn name(&self) -> &str {
        "scripted"
    }

    fn send<'a>(&'a self, event: &'a Event) -> SendFuture<'a> {
        self.attempts
            .lock()
            .unwrap()
            .push((event.event_id().to_string(), Instant::now()));

        let outcome = match self.script.lock().unwrap().pop_front() {
            Some(outcome) => outcome,
            None => match &self.fallback {
                Some(error) => Err(error.clone()),
                None => Ok(()),
            },
        };
        futures::future::ready(outcome.map(|()| Ack::new())).boxed()
    }

    fn configure_environment(&self, _build_label: &str) {}

    fn set_logging(&self, _enabled: bool) {}
}

/// Sink whose sends never complete.
struct HangingSink;

impl Sink for HangingSink {
    fn name(&self) -> &str {
        "hanging"
    }

    fn send<'a>(&'a self, _event: &'a Event) -> SendFuture<'a> {
        futures::future::pending().boxed()
    }

    fn configure_environment(&self, _build_label: &str) {}

    fn set_logging(&self, _enabled: bool) {}
}

fn transient() -> SinkError {
    SinkError::Transient("backend unavailable".to_string())
}

fn pipeline_with(config: PipelineConfig, sink: Arc<dyn Sink>) -> Pipeline {
    let pipeline = Pipeline::new(config, Handle::current());
    pipeline.register_sink(sink);
    pipeline
}

fn screen(name: &str) -> Event {
    ScreenView::new(name, 1706745600000).into()
}

async fn wait_until(pipeline: &Pipeline, done: impl Fn(&PipelineStats) -> bool) {
    for _ in 0..2000 {
        if done(&pipeline.stats()) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached: {:?}", pipeline.stats());
}

#[tokio::test(start_paused = true)]
async fn test_pre_init_events_are_delivered_first() {
    let sink = Arc::new(ScriptedSink::default());
    let pipeline = pipeline_with(PipelineConfig::default(), sink.clone());

    pipeline.push(screen("a"));
    pipeline.push(screen("b"));
    assert_eq!(pipeline.state(), InitState::Uninitialized);
    assert_eq!(pipeline.stats().buffered, 2);

    pipeline.initialize("game", "secret").unwrap();
    pipeline.push(screen("c"));

    wait_until(&pipeline, |s| s.metrics.delivered == 3).await;
    assert_eq!(
        sink.attempted_ids(),
        ["screenView:a", "screenView:b", "screenView:c"]
    );
}

#[tokio::test(start_paused = true)]
async fn test_transient_failures_back_off_then_deliver() {
    let sink = Arc::new(ScriptedSink::new(vec![Err(transient()), Err(transient()), Ok(())]));
    let pipeline = pipeline_with(PipelineConfig::default(), sink.clone());
    pipeline.initialize("game", "secret").unwrap();

    pipeline.push(screen("menu"));
    wait_until(&pipeline, |s| s.metrics.delivered == 1).await;

    let metrics = pipeline.metrics();
    assert_eq!(metrics.delivered, 1);
    assert_eq!(metrics.retried, 2);
    assert_eq!(metrics.lost, 0);

    let times = sink.attempt_times();
    assert_eq!(times.len(), 3);
    let first_gap = times[1] - times[0];
    let second_gap = times[2] - times[1];
    assert!(first_gap >= Duration::from_millis(500), "{:?}", first_gap);
    assert!(second_gap >= Duration::from_millis(1000), "{:?}", second_gap);
    assert!(second_gap > first_gap);
}

#[tokio::test(start_paused = true)]
async fn test_permanent_failure_is_attempted_once() {
    let sink = Arc::new(ScriptedSink::always(SinkError::Permanent(
        "malformed payload".to_string(),
    )));
    let pipeline = pipeline_with(PipelineConfig::default(), sink.clone());
    pipeline.initialize("game", "secret").unwrap();

    pipeline.push(screen("menu"));
    wait_until(&pipeline, |s| s.metrics.permanent_failures == 1).await;
    tokio::time::sleep(Duration::from_secs(60)).await;

    assert_eq!(sink.attempted_ids().len(), 1);
    assert_eq!(pipeline.metrics().retried, 0);
    assert_eq!(pipeline.stats().pending_retries, 0);
}

#[tokio::test(start_paused = true)]
async fn test_retries_are_bounded() {
    let config = PipelineConfig {
        retry: RetryPolicy {
            max_attempts: 3,
            ..RetryPolicy::default()
        },
        ..PipelineConfig::default()
    };
    let sink = Arc::new(ScriptedSink::always(transient()));
    let pipeline = pipeline_with(config, sink.clone());
    pipeline.initialize("game", "secret").unwrap();

    pipeline.push(screen("menu"));
    wait_until(&pipeline, |s| s.metrics.lost == 1).await;

    assert_eq!(sink.attempted_ids().len(), 3);
    assert_eq!(pipeline.metrics().retried, 2);
    assert_eq!(pipeline.stats().pending_retries, 0);
}

#[tokio::test(start_paused = true)]
async fn test_retry_does_not_block_queue() {
    let sink = Arc::new(ScriptedSink::new(vec![Err(transient())]));
    let pipeline = pipeline_with(PipelineConfig::default(), sink.clone());
    pipeline.initialize("game", "secret").unwrap();

    pipeline.push(screen("first"));
    pipeline.push(screen("second"));
    wait_until(&pipeline, |s| s.metrics.delivered == 2).await;

    assert_eq!(
        sink.attempted_ids(),
        ["screenView:first", "screenView:second", "screenView:first"]
    );
}

#[tokio::test(start_paused = true)]
async fn test_slow_send_times_out_as_transient() {
    let config = PipelineConfig {
        send_timeout_ms: 100,
        retry: RetryPolicy {
            max_attempts: 2,
            ..RetryPolicy::default()
        },
        ..PipelineConfig::default()
    };
    let pipeline = pipeline_with(config, Arc::new(HangingSink));
    pipeline.initialize("game", "secret").unwrap();

    pipeline.push(screen("menu"));
    wait_until(&pipeline, |s| s.metrics.lost == 1).await;
    assert_eq!(pipeline.metrics().retried, 1);
}

#[tokio::test(start_paused = true)]
async fn test_second_initialize_is_a_no_op() {
    let sink = Arc::new(ScriptedSink::default());
    let pipeline = pipeline_with(PipelineConfig::default(), sink.clone());

    pipeline.push(screen("early"));
    pipeline.initialize("game", "secret").unwrap();
    wait_until(&pipeline, |s| s.metrics.delivered == 1).await;

    assert_eq!(
        pipeline.initialize("other", "keys"),
        Err(Error::AlreadyInitialized)
    );
    assert!(pipeline.handle_message("game-analytics-initialize|other|keys"));
    tokio::time::sleep(Duration::from_secs(5)).await;

    assert_eq!(sink.attempted_ids(), ["screenView:early"]);
    assert_eq!(pipeline.state(), InitState::Initialized);
}

#[tokio::test(start_paused = true)]
async fn test_pre_init_overflow_keeps_newest() {
    let config = PipelineConfig {
        queue: QueueConfig {
            capacity: 10,
            pre_init_capacity: 2,
        },
        ..PipelineConfig::default()
    };
    let sink = Arc::new(ScriptedSink::default());
    let pipeline = pipeline_with(config, sink.clone());

    for name in ["1", "2", "3", "4", "5"] {
        pipeline.push(screen(name));
    }
    let stats = pipeline.stats();
    assert_eq!(stats.buffered, 2);
    assert_eq!(stats.metrics.accepted, 5);
    assert_eq!(stats.metrics.queue_overflow, 3);

    pipeline.initialize("game", "secret").unwrap();
    wait_until(&pipeline, |s| s.metrics.delivered == 2).await;
    assert_eq!(sink.attempted_ids(), ["screenView:4", "screenView:5"]);
}

#[tokio::test(start_paused = true)]
async fn test_invalid_commands_never_reach_sinks() {
    let sink = Arc::new(ScriptedSink::default());
    let pipeline = pipeline_with(PipelineConfig::default(), sink.clone());
    pipeline.initialize("game", "secret").unwrap();

    assert!(pipeline.handle_message("analytics-send-progress|3|world|level|phase|10"));
    assert!(pipeline.handle_message("analytics-send-timing|load|level|l1|soon"));
    assert!(pipeline.handle_message("analytics-send-progress|2|world|level||10"));
    wait_until(&pipeline, |s| s.metrics.delivered == 1).await;

    let metrics = pipeline.metrics();
    assert_eq!(metrics.rejected, 2);
    assert_eq!(metrics.accepted, 1);
    assert_eq!(sink.attempted_ids(), ["Complete:world:level"]);
}

#[tokio::test(start_paused = true)]
async fn test_sinks_registered_late_are_configured() {
    let config = PipelineConfig {
        build_label: "android 1.2.0".to_string(),
        sink_debug: true,
        ..PipelineConfig::default()
    };
    let early = Arc::new(LoggingSink::new());
    let pipeline = pipeline_with(config, early.clone());
    pipeline.initialize("game", "secret").unwrap();

    let late = Arc::new(LoggingSink::new());
    pipeline.register_sink(late.clone());

    for sink in [&early, &late] {
        assert_eq!(sink.build_label(), "android 1.2.0");
        assert!(sink.is_verbose());
    }
    assert_eq!(pipeline.stats().sinks, 2);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_discards_remaining_events() {
    let config = PipelineConfig {
        shutdown_grace_ms: 100,
        send_timeout_ms: 60_000,
        ..PipelineConfig::default()
    };
    let pipeline = pipeline_with(config, Arc::new(HangingSink));
    pipeline.initialize("game", "secret").unwrap();

    pipeline.push(screen("in-flight"));
    tokio::time::sleep(Duration::from_millis(10)).await;
    pipeline.push(screen("queued-1"));
    pipeline.push(screen("queued-2"));
    assert_eq!(pipeline.queue_len(), 2);

    pipeline.shutdown().await;

    let stats = pipeline.stats();
    assert_eq!(stats.queued, 0);
    assert_eq!(stats.metrics.discarded, 2);
    assert_eq!(stats.metrics.delivered, 0);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_discards_pending_retries() {
    let sink = Arc::new(ScriptedSink::always(transient()));
    let pipeline = pipeline_with(PipelineConfig::default(), sink.clone());
    pipeline.initialize("game", "secret").unwrap();

    pipeline.push(screen("menu"));
    wait_until(&pipeline, |s| s.pending_retries == 1).await;

    pipeline.shutdown().await;
    assert_eq!(pipeline.metrics().discarded, 1);
    assert_eq!(pipeline.stats().pending_retries, 0);
}

#[tokio::test(start_paused = true)]
async fn test_retries_count_against_queue_capacity() {
    let config = PipelineConfig {
        queue: QueueConfig {
            capacity: 10,
            pre_init_capacity: 10,
        },
        ..PipelineConfig::default()
    };
    let sink = Arc::new(ScriptedSink::always(transient()));
    let pipeline = pipeline_with(config, sink.clone());
    pipeline.initialize("game", "secret").unwrap();

    for i in 0..500 {
        pipeline.push(screen(&i.to_string()));
        tokio::time::sleep(Duration::from_millis(1)).await;

        let stats = pipeline.stats();
        assert!(
            stats.queued + stats.pending_retries <= 10,
            "held {} queued + {} retrying",
            stats.queued,
            stats.pending_retries
        );
    }

    let metrics = pipeline.metrics();
    assert_eq!(metrics.accepted, 500);
    assert!(metrics.queue_overflow >= 400, "{:?}", metrics);
}

#[tokio::test(start_paused = true)]
async fn test_flush_overflow_is_counted() {
    let config = PipelineConfig {
        queue: QueueConfig {
            capacity: 2,
            pre_init_capacity: 5,
        },
        ..PipelineConfig::default()
    };
    let sink = Arc::new(ScriptedSink::default());
    let pipeline = pipeline_with(config, sink.clone());

    for name in ["1", "2", "3", "4", "5"] {
        pipeline.push(screen(name));
    }
    assert_eq!(pipeline.metrics().queue_overflow, 0);

    pipeline.initialize("game", "secret").unwrap();
    let metrics = pipeline.metrics();
    assert_eq!(metrics.accepted, 5);
    assert_eq!(metrics.queue_overflow, 3);

    wait_until(&pipeline, |s| s.metrics.delivered == 2).await;
    assert_eq!(sink.attempted_ids(), ["screenView:4", "screenView:5"]);
}

#[tokio::test(start_paused = true)]
async fn test_zero_capacity_buffer_rejects_without_accepting() {
    let config = PipelineConfig {
        queue: QueueConfig {
            capacity: 10,
            pre_init_capacity: 0,
        },
        ..PipelineConfig::default()
    };
    let pipeline = pipeline_with(config, Arc::new(ScriptedSink::default()));

    pipeline.push(screen("early"));
    let metrics = pipeline.metrics();
    assert_eq!(metrics.accepted, 0);
    assert_eq!(metrics.queue_overflow, 1);
}

#[tokio::test(start_paused = true)]
async fn test_events_without_sinks_are_discarded() {
    let pipeline = Pipeline::new(PipelineConfig::default(), Handle::current());
    pipeline.initialize("game", "secret").unwrap();

    pipeline.push(screen("nobody"));
    wait_until(&pipeline, |s| s.metrics.discarded == 1).await;
    assert_eq!(pipeline.queue_len(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_slow_sink_does_not_delay_others() {
    let config = PipelineConfig {
        send_timeout_ms: 5_000,
        ..PipelineConfig::default()
    };
    let fast = Arc::new(ScriptedSink::default());
    let pipeline = pipeline_with(config, Arc::new(HangingSink));
    pipeline.register_sink(fast.clone());
    pipeline.initialize("game", "secret").unwrap();

    let started = Instant::now();
    pipeline.push(screen("menu"));
    wait_until(&pipeline, |s| s.metrics.delivered == 1).await;

    let attempts = fast.attempt_times();
    assert_eq!(attempts.len(), 1);
    assert!(attempts[0] - started < Duration::from_secs(1));
}

/// Sink that remembers the game key it was configured with.
#[derive(Default)]
struct KeyedSink {
    game_key: Mutex<Option<String>>,
}

impl Sink for KeyedSink {
    fn name(&self) -> &str {
        "keyed"
    }

    fn send<'a>(&'a self, _event: &'a Event) -> SendFuture<'a> {
        futures::future::ready(Ok(Ack::new())).boxed()
    }

    fn configure_environment(&self, _build_label: &str) {}

    fn set_logging(&self, _enabled: bool) {}

    fn configure_credentials(&self, credentials: &Credentials) {
        *self.game_key.lock().unwrap() = Some(credentials.game_key.clone());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_sinks_registered_during_initialize_are_configured() {
    for _ in 0..50 {
        let pipeline = Arc::new(Pipeline::new(PipelineConfig::default(), Handle::current()));
        let barrier = Arc::new(Barrier::new(5));
        let sinks: Vec<Arc<KeyedSink>> = (0..4).map(|_| Arc::new(KeyedSink::default())).collect();

        let registrars: Vec<_> = sinks
            .iter()
            .map(|sink| {
                let pipeline = Arc::clone(&pipeline);
                let barrier = Arc::clone(&barrier);
                let sink = Arc::clone(sink);
                std::thread::spawn(move || {
                    barrier.wait();
                    pipeline.register_sink(sink);
                })
            })
            .collect();

        barrier.wait();
        pipeline.initialize("game", "secret").unwrap();
        for registrar in registrars {
            registrar.join().unwrap();
        }

        for sink in &sinks {
            assert_eq!(sink.game_key.lock().unwrap().as_deref(), Some("game"));
        }
        pipeline.shutdown().await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_initialize_and_push() {
    const THREADS: usize = 8;
    const EVENTS_PER_THREAD: usize = 10;

    let sink = Arc::new(ScriptedSink::default());
    let pipeline = Arc::new(pipeline_with(PipelineConfig::default(), sink.clone()));
    let barrier = Arc::new(Barrier::new(THREADS));

    let threads: Vec<_> = (0..THREADS)
        .map(|t| {
            let pipeline = Arc::clone(&pipeline);
            let barrier = Arc::clone(&barrier);
            std::thread::spawn(move || {
                barrier.wait();
                let mut results = Vec::new();
                for i in 0..EVENTS_PER_THREAD {
                    pipeline.push(screen(&format!("{}-{}", t, i)));
                    if i == EVENTS_PER_THREAD / 2 {
                        results.push(pipeline.initialize("game", "secret"));
                    }
                }
                results
            })
        })
        .collect();

    let results: Vec<_> = threads
        .into_iter()
        .flat_map(|thread| thread.join().unwrap())
        .collect();
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert_eq!(
        results
            .iter()
            .filter(|r| **r == Err(Error::AlreadyInitialized))
            .count(),
        THREADS - 1
    );

    let total = (THREADS * EVENTS_PER_THREAD) as u64;
    for _ in 0..500 {
        if pipeline.metrics().delivered == total {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let metrics = pipeline.metrics();
    assert_eq!(metrics.accepted, total);
    assert_eq!(metrics.delivered, total);
    assert_eq!(metrics.queue_overflow, 0);

    let ids = sink.attempted_ids();
    let unique: HashSet<_> = ids.iter().collect();
    assert_eq!(ids.len(), THREADS * EVENTS_PER_THREAD);
    assert_eq!(unique.len(), ids.len());
    pipeline.shutdown().await;
}
