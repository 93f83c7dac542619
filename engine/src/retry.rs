//! Retry policy for transient delivery failures.
//!
//! Backoff is exponential: after failed attempt `n` the next attempt waits
//! `base * 2^(n-1)`, capped at `max_delay`. After `max_attempts` failed
//! attempts the delivery is given up and counted as lost.
//!
//! Time is passed in as milliseconds on the caller's monotonic clock, so the
//! policy is deterministic.

use crate::Timestamp;
use serde::{Deserialize, Serialize};

/// Default delay before the first retry.
pub const DEFAULT_BASE_DELAY_MS: u64 = 500;

/// Default upper bound on a single delay.
pub const DEFAULT_MAX_DELAY_MS: u64 = 30_000;

/// Default number of attempts, the first one included.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Exponential backoff configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetryPolicy {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Total send attempts allowed per delivery, including the first
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

/// Per-delivery retry bookkeeping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryState {
    /// Failed attempts so far
    pub attempts: u32,
    /// Earliest time the next attempt may run
    pub next_eligible_at: Timestamp,
}

impl RetryState {
    /// Fresh state for a delivery that has not been attempted.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the next attempt may run at `now`.
    pub fn is_due(&self, now: Timestamp) -> bool {
        now >= self.next_eligible_at
    }
}

/// What to do after a transient failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Try again once `at` is reached
    RetryAt { at: Timestamp, delay_ms: u64 },
    /// Attempts exhausted; drop the delivery
    GiveUp { attempts: u32 },
}

impl RetryPolicy {
    /// Delay scheduled after failed attempt number `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> u64 {
        let exponent = attempt.saturating_sub(1);
        let factor = 1u64.checked_shl(exponent).unwrap_or(u64::MAX);
        self.base_delay_ms
            .saturating_mul(factor)
            .min(self.max_delay_ms)
    }

    /// Record a transient failure at `now` and decide what happens next.
    pub fn record_failure(&self, state: &mut RetryState, now: Timestamp) -> RetryDecision {
        state.attempts += 1;
        if state.attempts >= self.max_attempts.max(1) {
            return RetryDecision::GiveUp {
                attempts: state.attempts,
            };
        }

        let delay_ms = self.delay_after(state.attempts);
        state.next_eligible_at = now.saturating_add(delay_ms);
        RetryDecision::RetryAt {
            at: state.next_eligible_at,
            delay_ms,
        }
    }
}
