//! Configuration management.
//!
//! The collector reads its configuration from environment variables (after
//! loading `.env` through `dotenvy`). Embedded hosts pass the same structure
//! as JSON through the C ABI; every field has a default.

use pulse_engine::{QueueConfig, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Settings of a single [`crate::Pipeline`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PipelineConfig {
    /// Queue and pre-init buffer capacities
    pub queue: QueueConfig,
    /// Backoff for transient sink failures
    pub retry: RetryPolicy,
    /// Upper bound on a single `send`, after which it counts as transient
    pub send_timeout_ms: u64,
    /// How long shutdown waits for an in-flight send
    pub shutdown_grace_ms: u64,
    /// Build/version label handed to sinks, e.g. "android 1.2.0"
    pub build_label: String,
    /// Turn on verbose logging inside sinks
    pub sink_debug: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            queue: QueueConfig::default(),
            retry: RetryPolicy::default(),
            send_timeout_ms: 10_000,
            shutdown_grace_ms: 2_000,
            build_label: "unknown".to_string(),
            sink_debug: false,
        }
    }
}

impl PipelineConfig {
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    /// Parse a JSON document; missing fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Collector configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// Server host address
    pub host: String,
    /// Server port
    pub port: u16,
    /// Pipeline settings
    pub pipeline: PipelineConfig,
    /// Base URL of an HTTP analytics backend; no HTTP sink when unset
    pub sink_url: Option<String>,
    /// Register a sink that writes every event to the log
    pub log_events: bool,
    /// Bearer token required by the ingestion endpoints
    pub ingest_token: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            pipeline: PipelineConfig::default(),
            sink_url: None,
            log_events: true,
            ingest_token: None,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration from any variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Config::default();
        let pipeline_defaults = defaults.pipeline.clone();

        let pipeline = PipelineConfig {
            queue: QueueConfig {
                capacity: parse_var(
                    &lookup,
                    "PULSE_QUEUE_CAPACITY",
                    pipeline_defaults.queue.capacity,
                )?,
                pre_init_capacity: parse_var(
                    &lookup,
                    "PULSE_PRE_INIT_CAPACITY",
                    pipeline_defaults.queue.pre_init_capacity,
                )?,
            },
            retry: RetryPolicy {
                base_delay_ms: parse_var(
                    &lookup,
                    "PULSE_RETRY_BASE_MS",
                    pipeline_defaults.retry.base_delay_ms,
                )?,
                max_delay_ms: parse_var(
                    &lookup,
                    "PULSE_RETRY_MAX_DELAY_MS",
                    pipeline_defaults.retry.max_delay_ms,
                )?,
                max_attempts: parse_var(
                    &lookup,
                    "PULSE_RETRY_MAX_ATTEMPTS",
                    pipeline_defaults.retry.max_attempts,
                )?,
            },
            send_timeout_ms: parse_var(
                &lookup,
                "PULSE_SEND_TIMEOUT_MS",
                pipeline_defaults.send_timeout_ms,
            )?,
            shutdown_grace_ms: parse_var(
                &lookup,
                "PULSE_SHUTDOWN_GRACE_MS",
                pipeline_defaults.shutdown_grace_ms,
            )?,
            build_label: lookup("PULSE_BUILD_LABEL").unwrap_or(pipeline_defaults.build_label),
            sink_debug: parse_flag(&lookup, "PULSE_SINK_DEBUG", pipeline_defaults.sink_debug)?,
        };

        Ok(Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: parse_var(&lookup, "PORT", defaults.port)?,
            pipeline,
            sink_url: lookup("PULSE_SINK_URL").filter(|url| !url.trim().is_empty()),
            log_events: parse_flag(&lookup, "PULSE_LOG_EVENTS", defaults.log_events)?,
            ingest_token: lookup("PULSE_INGEST_TOKEN").filter(|token| !token.is_empty()),
        })
    }
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(name) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        None => Ok(default),
    }
}

fn parse_flag(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: bool,
) -> Result<bool, ConfigError> {
    match lookup(name) {
        Some(value) => match value.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::Invalid { name, value }),
        },
        None => Ok(default),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },

    #[error("Invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),
}
