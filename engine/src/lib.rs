//! # Pulse Engine
//!
//! The deterministic core of an analytics event pipeline.
//!
//! This crate turns raw host input into validated analytics events and holds
//! them until a dispatcher hands them to a delivery backend. It contains no
//! IO and reads no clocks: timestamps are passed in, so the same inputs always
//! produce the same outputs.
//!
//! ## Core Concepts
//!
//! ### Events
//!
//! An [`Event`] is one of:
//! - [`ScreenView`] - a screen was shown
//! - [`DesignEvent`] - a custom event with an optional dimension
//! - [`TimingEvent`] - an elapsed-time measurement
//! - [`ProgressionEvent`] - a level was started, failed or completed
//! - [`PurchaseEvent`] - a store purchase, built from a [`PurchaseInput`]
//!
//! Each event carries a stable colon-joined identifier.
//!
//! ### Validation
//!
//! The [`validate`] module substitutes defaults for lenient fields (currency,
//! product category) and rejects malformed ones (status codes, negative
//! prices, unparseable numbers).
//!
//! ### Queue and gate
//!
//! The [`EventQueue`] is a bounded FIFO that drops its oldest entry when full.
//! Until the [`InitializationGate`] opens, events wait in a smaller pre-init
//! buffer and are moved to the front of the queue on opening.
//!
//! ### Retry
//!
//! The [`RetryPolicy`] schedules exponential backoff for transient delivery
//! failures and gives up after a bounded number of attempts.
//!
//! ## Quick Start
//!
//! ```rust
//! use pulse_engine::{Command, EventQueue, InitializationGate};
//!
//! let mut gate = InitializationGate::new();
//! let mut queue = EventQueue::default();
//!
//! // Early events are buffered
//! if let Some(Ok(Command::Send(event))) =
//!     Command::parse_message("analytics-send-screen-view|title", 1706745600000)
//! {
//!     queue.push(event);
//! }
//! assert_eq!(queue.len(), 0);
//!
//! // Opening the gate releases them
//! gate.open("game-key", "secret-key").unwrap();
//! queue.open();
//! assert_eq!(queue.pop_front().unwrap().event_id(), "screenView:title");
//! ```

pub mod command;
pub mod error;
pub mod event;
pub mod gate;
pub mod queue;
pub mod retry;
pub mod validate;

// Re-export main types at crate root
pub use command::{split_message, Command};
pub use error::Error;
pub use event::{
    DesignEvent, Event, EventKind, ProgressionEvent, ProgressionStatus, PurchaseEvent,
    ScreenView, TimingEvent,
};
pub use gate::{Credentials, InitState, InitializationGate};
pub use queue::{EventQueue, PushOutcome, QueueConfig};
pub use retry::{RetryDecision, RetryPolicy, RetryState};
pub use validate::PurchaseInput;

/// Milliseconds. Wall-clock for event creation, monotonic for retries.
pub type Timestamp = u64;
