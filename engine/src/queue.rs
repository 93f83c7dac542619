//! Bounded event queue with a pre-initialization buffer.
//!
//! Events pushed before the queue is opened land in a smaller pre-init
//! buffer. Opening moves them, in order, to the front of the main queue.
//! Both buffers drop their oldest entry when full; pushing never blocks.

use crate::Event;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Default capacity of the main queue.
pub const DEFAULT_CAPACITY: usize = 1000;

/// Default capacity of the pre-init buffer.
pub const DEFAULT_PRE_INIT_CAPACITY: usize = 100;

/// Capacities of an [`EventQueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QueueConfig {
    /// Maximum events held once open
    pub capacity: usize,
    /// Maximum events held before opening; 0 drops every early event
    pub pre_init_capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            pre_init_capacity: DEFAULT_PRE_INIT_CAPACITY,
        }
    }
}

/// Result of pushing an event.
#[derive(Debug, Clone, PartialEq)]
pub enum PushOutcome {
    /// Added to the main queue
    Queued,
    /// Added to the pre-init buffer
    Buffered,
    /// Added, but the oldest event was dropped to make room
    Displaced(Event),
    /// Not stored at all (zero-capacity buffer)
    Rejected(Event),
}

impl PushOutcome {
    /// Whether the push cost an event (counts as a queue overflow).
    pub fn overflowed(&self) -> bool {
        matches!(self, PushOutcome::Displaced(_) | PushOutcome::Rejected(_))
    }
}

/// Bounded FIFO of events pending dispatch.
#[derive(Debug, Clone)]
pub struct EventQueue {
    config: QueueConfig,
    open: bool,
    main: VecDeque<Event>,
    pre_init: VecDeque<Event>,
    overflow_count: u64,
}

impl EventQueue {
    /// Create a closed queue with the given capacities.
    pub fn new(config: QueueConfig) -> Self {
        Self {
            config,
            open: false,
            main: VecDeque::with_capacity(config.capacity.min(DEFAULT_CAPACITY)),
            pre_init: VecDeque::new(),
            overflow_count: 0,
        }
    }

    /// Get the capacities.
    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Whether the queue has been opened.
    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Push an event, dropping the oldest one if the target buffer is full.
    pub fn push(&mut self, event: Event) -> PushOutcome {
        let outcome = if self.open {
            push_bounded(&mut self.main, self.config.capacity, event, PushOutcome::Queued)
        } else {
            push_bounded(
                &mut self.pre_init,
                self.config.pre_init_capacity,
                event,
                PushOutcome::Buffered,
            )
        };

        if outcome.overflowed() {
            self.overflow_count += 1;
        }
        outcome
    }

    /// Open the queue, moving buffered events to the front of the main queue.
    ///
    /// Returns the number of events moved. Opening twice moves nothing.
    pub fn open(&mut self) -> usize {
        if self.open {
            return 0;
        }
        self.open = true;

        let moved = self.pre_init.len();
        for event in self.pre_init.drain(..).rev() {
            self.main.push_front(event);
        }

        // Buffered events are the oldest, so they go first if over capacity.
        while self.main.len() > self.config.capacity {
            self.main.pop_front();
            self.overflow_count += 1;
        }

        moved
    }

    /// Drop the oldest queued events until at most `limit` remain.
    ///
    /// Returns how many were dropped. They count as overflow.
    pub fn trim_to(&mut self, limit: usize) -> usize {
        let excess = self.main.len().saturating_sub(limit);
        self.main.drain(..excess);
        self.overflow_count += excess as u64;
        excess
    }

    /// Take the oldest event.
    pub fn pop_front(&mut self) -> Option<Event> {
        self.main.pop_front()
    }

    /// Events in the main queue.
    pub fn len(&self) -> usize {
        self.main.len()
    }

    /// Check if the main queue is empty.
    pub fn is_empty(&self) -> bool {
        self.main.is_empty()
    }

    /// Events waiting in the pre-init buffer.
    pub fn pre_init_len(&self) -> usize {
        self.pre_init.len()
    }

    /// Total events dropped to overflow since creation.
    pub fn overflow_count(&self) -> u64 {
        self.overflow_count
    }

    /// Iterate over the main queue, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.main.iter()
    }

    /// Discard everything, returning how many events were dropped.
    pub fn clear(&mut self) -> usize {
        let dropped = self.main.len() + self.pre_init.len();
        self.main.clear();
        self.pre_init.clear();
        dropped
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new(QueueConfig::default())
    }
}

fn push_bounded(
    buffer: &mut VecDeque<Event>,
    capacity: usize,
    event: Event,
    stored: PushOutcome,
) -> PushOutcome {
    if capacity == 0 {
        return PushOutcome::Rejected(event);
    }
    let displaced = if buffer.len() >= capacity {
        buffer.pop_front()
    } else {
        None
    };
    buffer.push_back(event);
    match displaced {
        Some(old) => PushOutcome::Displaced(old),
        None => stored,
    }
}
