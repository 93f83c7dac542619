//! FFI layer for mobile hosts.
//!
//! This module provides C-compatible functions for an Android/iOS host that
//! forwards its analytics messages to the pipeline. Structured data crosses
//! the boundary as JSON strings.
//!
//! # Memory Management
//!
//! - Strings returned by `pulse_*` functions are allocated by Rust
//! - Caller must free them with `pulse_string_free`
//! - Pipeline pointers must be freed with `pulse_pipeline_free`
//!
//! # Error Handling
//!
//! JSON-returning functions produce either:
//! - `{"ok": <result>}` on success
//! - `{"error": "<message>"}` on failure
//!
//! # Callback sinks
//!
//! A host delivers events itself by registering a [`PulseSendCallback`]. It
//! is called on a blocking thread with the event JSON and must return
//! `0` (delivered), `1` (transient failure, retry later) or any other value
//! (permanent failure, drop the event).
//!
//! A host that wraps a vendor SDK also needs the game key, build label and
//! logging flag the pipeline hands to its sinks. It registers a
//! [`PulseConfigureCallback`] through `pulse_register_host_sink` and receives
//! them as a [`HostConfig`] JSON document whenever one of them changes.

use crate::config::PipelineConfig;
use crate::pipeline::Pipeline;
use crate::sink::{Ack, SendFuture, Sink, SinkError};
use futures::FutureExt;
use pulse_engine::{Credentials, Event, PurchaseInput};
use std::ffi::{c_char, c_void, CStr, CString};
use std::ptr;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Callback status: delivered.
pub const PULSE_SEND_OK: i32 = 0;

/// Callback status: transient failure.
pub const PULSE_SEND_RETRY: i32 = 1;

/// Host delivery callback: `(user_data, event_json) -> status`.
pub type PulseSendCallback = extern "C" fn(user_data: *mut c_void, event_json: *const c_char) -> i32;

/// Host configuration callback: `(user_data, config_json)`.
///
/// Runs on the thread that initialized the pipeline or registered the sink,
/// and must not call back into the pipeline.
pub type PulseConfigureCallback = extern "C" fn(user_data: *mut c_void, config_json: *const c_char);

/// Settings forwarded to a host sink, as far as they are known.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HostConfig {
    pub game_key: Option<String>,
    pub secret_key: Option<String>,
    /// Build label, e.g. "android 1.2.0"
    pub build: Option<String>,
    pub verbose_logging: bool,
}

/// Result wrapper for FFI responses.
#[derive(serde::Serialize)]
#[serde(untagged)]
enum FfiResult<T: serde::Serialize> {
    Ok { ok: T },
    Err { error: String },
}

impl<T: serde::Serialize> FfiResult<T> {
    fn ok(value: T) -> Self {
        FfiResult::Ok { ok: value }
    }

    fn err(message: impl Into<String>) -> Self {
        FfiResult::Err {
            error: message.into(),
        }
    }

    fn to_json(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|e| format!(r#"{{"error":"serialization failed: {}"}}"#, e))
    }
}

/// Convert a Rust string to a C string pointer.
/// Caller must free with `pulse_string_free`.
fn to_c_string(s: String) -> *mut c_char {
    match CString::new(s) {
        Ok(cs) => cs.into_raw(),
        Err(_) => CString::from(c"{\"error\":\"string contained null bytes\"}").into_raw(),
    }
}

/// Borrow a C string as UTF-8.
/// Returns None if pointer is null or invalid UTF-8.
unsafe fn from_c_str<'a>(ptr: *const c_char) -> Option<&'a str> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok()
}

// ============================================================================
// Callback sink
// ============================================================================

/// Opaque host pointer handed back to every callback.
#[derive(Clone, Copy)]
struct UserData(*mut c_void);

// The host guarantees that `user_data` may be used from any thread for as
// long as the pipeline lives.
unsafe impl Send for UserData {}
unsafe impl Sync for UserData {}

impl UserData {
    fn get(self) -> *mut c_void {
        self.0
    }
}

/// Sink that hands events to a host callback.
pub struct CallbackSink {
    name: String,
    callback: PulseSendCallback,
    configure: Option<PulseConfigureCallback>,
    user_data: UserData,
    host_config: Mutex<HostConfig>,
    verbose: AtomicBool,
}

impl CallbackSink {
    /// # Safety
    /// `user_data` must stay valid, and usable from any thread, until the
    /// pipeline the sink is registered with has been freed and every
    /// callback still running has returned.
    pub unsafe fn new(
        name: impl Into<String>,
        callback: PulseSendCallback,
        user_data: *mut c_void,
    ) -> Self {
        Self {
            name: name.into(),
            callback,
            configure: None,
            user_data: UserData(user_data),
            host_config: Mutex::new(HostConfig::default()),
            verbose: AtomicBool::new(false),
        }
    }

    /// Also forward configuration to the host.
    pub fn with_configure(mut self, configure: PulseConfigureCallback) -> Self {
        self.configure = Some(configure);
        self
    }

    /// Settings handed to this sink so far.
    pub fn host_config(&self) -> HostConfig {
        self.host_config
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn update_host_config(&self, update: impl FnOnce(&mut HostConfig)) {
        let config = {
            let mut config = self.host_config.lock().unwrap_or_else(|e| e.into_inner());
            update(&mut config);
            config.clone()
        };

        let Some(configure) = self.configure else {
            return;
        };
        let json = serde_json::to_string(&config)
            .ok()
            .and_then(|json| CString::new(json).ok());
        match json {
            Some(json) => configure(self.user_data.get(), json.as_ptr()),
            None => tracing::warn!(sink = %self.name, "Failed to encode host config"),
        }
    }

    async fn deliver(&self, event: &Event) -> Result<Ack, SinkError> {
        let json = serde_json::to_string(event)
            .map_err(|e| SinkError::Permanent(format!("failed to encode event: {}", e)))?;
        let json = CString::new(json)
            .map_err(|_| SinkError::Permanent("event contained null bytes".to_string()))?;

        if self.verbose.load(Ordering::Relaxed) {
            tracing::debug!(sink = %self.name, event_id = event.event_id(), "Calling host sink");
        }

        let callback = self.callback;
        let user_data = self.user_data;
        let status = tokio::task::spawn_blocking(move || callback(user_data.get(), json.as_ptr()))
            .await
            .map_err(|e| SinkError::Permanent(format!("host callback failed: {}", e)))?;

        match status {
            PULSE_SEND_OK => Ok(Ack::new()),
            PULSE_SEND_RETRY => Err(SinkError::Transient(format!(
                "host sink {} asked to retry",
                self.name
            ))),
            other => Err(SinkError::Permanent(format!(
                "host sink {} rejected event with status {}",
                self.name, other
            ))),
        }
    }
}

impl Sink for CallbackSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn send<'a>(&'a self, event: &'a Event) -> SendFuture<'a> {
        self.deliver(event).boxed()
    }

    fn configure_environment(&self, build_label: &str) {
        tracing::debug!(sink = %self.name, build = build_label, "Host sink configured");
        self.update_host_config(|config| config.build = Some(build_label.to_string()));
    }

    fn set_logging(&self, enabled: bool) {
        self.verbose.store(enabled, Ordering::Relaxed);
        self.update_host_config(|config| config.verbose_logging = enabled);
    }

    fn configure_credentials(&self, credentials: &Credentials) {
        self.update_host_config(|config| {
            config.game_key = Some(credentials.game_key.clone());
            config.secret_key = Some(credentials.secret_key.clone());
        });
    }
}

// ============================================================================
// Pipeline Lifecycle
// ============================================================================

/// A pipeline together with the runtime its worker runs on.
pub struct FfiPipeline {
    runtime: tokio::runtime::Runtime,
    pipeline: Pipeline,
}

impl FfiPipeline {
    fn new(config: PipelineConfig) -> std::io::Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("pulse-dispatch")
            .enable_all()
            .build()?;
        let pipeline = Pipeline::new(config, runtime.handle().clone());
        Ok(Self { runtime, pipeline })
    }
}

/// Create a new pipeline.
///
/// # Arguments
/// - `config_json`: JSON string of `PipelineConfig`, or null for defaults
///
/// # Returns
/// Pointer to the pipeline, or null on failure.
///
/// # Safety
/// - `config_json` must be a valid null-terminated C string or null
/// - Caller must free the returned pointer with `pulse_pipeline_free`
#[no_mangle]
pub unsafe extern "C" fn pulse_pipeline_new(config_json: *const c_char) -> *mut FfiPipeline {
    let config = if config_json.is_null() {
        PipelineConfig::default()
    } else {
        let parsed = from_c_str(config_json)
            .ok_or_else(|| "config is not valid UTF-8".to_string())
            .and_then(|json| PipelineConfig::from_json(json).map_err(|e| e.to_string()));
        match parsed {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Invalid pipeline config: {}", e);
                return ptr::null_mut();
            }
        }
    };

    match FfiPipeline::new(config) {
        Ok(pipeline) => Box::into_raw(Box::new(pipeline)),
        Err(e) => {
            tracing::error!("Failed to start pipeline runtime: {}", e);
            ptr::null_mut()
        }
    }
}

/// Shut a pipeline down and free it.
///
/// Blocks for at most twice the configured shutdown grace period: once for
/// the dispatch worker, once for host callbacks still running. A callback
/// still running after that is left to finish on its own thread.
///
/// # Safety
/// - `pipeline` must be a valid pointer from `pulse_pipeline_new`
/// - Must not be called twice on the same pointer
/// - Must not be called from inside a callback
/// - `user_data` of registered sinks must stay valid until every callback
///   still running has returned
#[no_mangle]
pub unsafe extern "C" fn pulse_pipeline_free(pipeline: *mut FfiPipeline) {
    if pipeline.is_null() {
        return;
    }
    let FfiPipeline { runtime, pipeline } = *Box::from_raw(pipeline);
    let grace = pipeline.config().shutdown_grace();
    runtime.block_on(pipeline.shutdown());
    drop(pipeline);
    runtime.shutdown_timeout(grace);
}

/// Free a string allocated by this library.
///
/// # Safety
/// - `s` must be a valid pointer from a `pulse_*` function
/// - Must not be called twice on the same pointer
#[no_mangle]
pub unsafe extern "C" fn pulse_string_free(s: *mut c_char) {
    if !s.is_null() {
        drop(CString::from_raw(s));
    }
}

// ============================================================================
// Pipeline Operations
// ============================================================================

/// Register a host callback as a sink.
///
/// # Returns
/// `false` if an argument is null or the name is not valid UTF-8.
///
/// # Safety
/// - `pipeline` must be a valid pointer from `pulse_pipeline_new`
/// - `name` must be a valid null-terminated C string
/// - `user_data` must stay valid, and usable from any thread, until the
///   pipeline is freed and every callback still running has returned
#[no_mangle]
pub unsafe extern "C" fn pulse_register_callback_sink(
    pipeline: *mut FfiPipeline,
    name: *const c_char,
    callback: Option<PulseSendCallback>,
    user_data: *mut c_void,
) -> bool {
    pulse_register_host_sink(pipeline, name, callback, None, user_data)
}

/// Register a host sink that also receives its configuration.
///
/// `configure` is called with a `HostConfig` JSON document each time the
/// pipeline hands the sink credentials, a build label or a logging flag.
/// Sinks registered before initialization are configured when it succeeds.
///
/// # Returns
/// `false` if a required argument is null or the name is not valid UTF-8.
///
/// # Safety
/// Same as `pulse_register_callback_sink`.
#[no_mangle]
pub unsafe extern "C" fn pulse_register_host_sink(
    pipeline: *mut FfiPipeline,
    name: *const c_char,
    callback: Option<PulseSendCallback>,
    configure: Option<PulseConfigureCallback>,
    user_data: *mut c_void,
) -> bool {
    let (Some(pipeline), Some(name), Some(callback)) =
        (pipeline.as_ref(), from_c_str(name), callback)
    else {
        return false;
    };

    let mut sink = CallbackSink::new(name, callback, user_data);
    if let Some(configure) = configure {
        sink = sink.with_configure(configure);
    }
    pipeline.pipeline.register_sink(Arc::new(sink));
    true
}

/// Route a pipe-delimited host message.
///
/// # Returns
/// `true` if the message was an analytics command (even one whose event was
/// dropped by validation), `false` if another handler should take it.
///
/// # Safety
/// - `pipeline` must be a valid pointer from `pulse_pipeline_new`
/// - `message` must be a valid null-terminated C string
#[no_mangle]
pub unsafe extern "C" fn pulse_message_received(
    pipeline: *mut FfiPipeline,
    message: *const c_char,
) -> bool {
    match (pipeline.as_ref(), from_c_str(message)) {
        (Some(pipeline), Some(message)) => pipeline.pipeline.handle_message(message),
        _ => false,
    }
}

/// Record a store purchase.
///
/// # Arguments
/// - `purchase_json`: JSON string of `PurchaseInput`
///
/// # Returns
/// JSON: `{"ok": true}` or `{"error": "..."}`.
/// Caller must free with `pulse_string_free`.
///
/// # Safety
/// - `pipeline` must be a valid pointer from `pulse_pipeline_new`
/// - `purchase_json` must be a valid null-terminated C string
#[no_mangle]
pub unsafe extern "C" fn pulse_record_purchase(
    pipeline: *mut FfiPipeline,
    purchase_json: *const c_char,
) -> *mut c_char {
    let Some(pipeline) = pipeline.as_ref() else {
        return to_c_string(FfiResult::<()>::err("Null pipeline pointer").to_json());
    };

    let Some(json) = from_c_str(purchase_json) else {
        return to_c_string(FfiResult::<()>::err("Invalid purchase JSON string").to_json());
    };

    let input: PurchaseInput = match serde_json::from_str(json) {
        Ok(input) => input,
        Err(e) => {
            return to_c_string(FfiResult::<()>::err(format!("Invalid purchase: {}", e)).to_json())
        }
    };

    let result = match pipeline.pipeline.record_purchase(input) {
        Ok(()) => FfiResult::ok(true).to_json(),
        Err(e) => FfiResult::<bool>::err(e.to_string()).to_json(),
    };
    to_c_string(result)
}

/// Get pipeline statistics.
///
/// # Returns
/// JSON: `{"ok": PipelineStats}` or `{"error": "..."}`.
/// Caller must free with `pulse_string_free`.
///
/// # Safety
/// - `pipeline` must be a valid pointer from `pulse_pipeline_new`
#[no_mangle]
pub unsafe extern "C" fn pulse_stats(pipeline: *mut FfiPipeline) -> *mut c_char {
    let result = match pipeline.as_ref() {
        Some(pipeline) => FfiResult::ok(pipeline.pipeline.stats()).to_json(),
        None => FfiResult::<()>::err("Null pipeline pointer").to_json(),
    };
    to_c_string(result)
}
