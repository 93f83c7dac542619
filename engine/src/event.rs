//! Event types for analytics telemetry.
//!
//! Every event carries a creation timestamp and a stable identifier built
//! from its category/action/label components. Events are immutable once
//! constructed: the queue and the sinks only ever read them.

use crate::{error::Result, Error, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Separator between the components of an event identifier.
pub const ID_SEPARATOR: char = ':';

/// A screen view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenView {
    /// Name of the screen that was shown
    pub screen_name: String,
    /// Stable identifier, `screenView:<screen>`
    pub event_id: String,
    /// Creation time in milliseconds
    pub timestamp: Timestamp,
}

/// A custom design event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DesignEvent {
    pub category: String,
    pub action: String,
    pub label: String,
    /// Numeric value attached to the event
    pub value: i64,
    /// Custom dimension slot; only positive indices are meaningful
    pub dimension_index: i32,
    pub dimension_value: String,
    /// Stable identifier, `category:action:label[:dimension<i>.<value>]`
    pub event_id: String,
    /// Creation time in milliseconds
    pub timestamp: Timestamp,
}

/// A timing measurement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimingEvent {
    pub category: String,
    pub variable: String,
    pub label: String,
    /// Elapsed time in milliseconds
    pub elapsed_ms: i64,
    /// Stable identifier, `timing:category:variable:label`
    pub event_id: String,
    /// Creation time in milliseconds
    pub timestamp: Timestamp,
}

/// Progression status of a level attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProgressionStatus {
    Start,
    Fail,
    Complete,
}

impl ProgressionStatus {
    /// Map a numeric status code (0, 1, 2) to a status.
    ///
    /// Any other code is rejected, never coerced.
    pub fn from_code(code: i64) -> Result<Self> {
        match code {
            0 => Ok(ProgressionStatus::Start),
            1 => Ok(ProgressionStatus::Fail),
            2 => Ok(ProgressionStatus::Complete),
            other => Err(Error::InvalidStatus(other)),
        }
    }

    /// The numeric code of this status.
    pub fn code(self) -> i64 {
        match self {
            ProgressionStatus::Start => 0,
            ProgressionStatus::Fail => 1,
            ProgressionStatus::Complete => 2,
        }
    }
}

impl TryFrom<i64> for ProgressionStatus {
    type Error = Error;

    fn try_from(code: i64) -> Result<Self> {
        Self::from_code(code)
    }
}

impl fmt::Display for ProgressionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProgressionStatus::Start => write!(f, "Start"),
            ProgressionStatus::Fail => write!(f, "Fail"),
            ProgressionStatus::Complete => write!(f, "Complete"),
        }
    }
}

/// A progression event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressionEvent {
    pub status: ProgressionStatus,
    pub world: String,
    pub level: String,
    pub phase: String,
    pub score: i32,
    /// Stable identifier, `Status:world[:level[:phase]]`
    pub event_id: String,
    /// Creation time in milliseconds
    pub timestamp: Timestamp,
}

/// A purchase (business) event.
///
/// Built through [`crate::validate::PurchaseInput::validate`], which applies
/// the currency and category defaults and the price conversion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseEvent {
    /// Currency code, "USD" when the store did not report one
    pub currency: String,
    /// Product category, at most 64 characters
    pub category: String,
    /// Price in the smallest currency unit (cents)
    pub amount_cents: i64,
    pub product_id: String,
    pub cart_id: String,
    /// Raw purchase data from the store (receipt)
    pub receipt: String,
    pub store: String,
    pub signature: String,
    /// Stable identifier, `category:productId`
    pub event_id: String,
    /// Creation time in milliseconds
    pub timestamp: Timestamp,
}

/// Discriminant of an [`Event`], used for logging and routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventKind {
    ScreenView,
    Design,
    Timing,
    Progression,
    Purchase,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::ScreenView => write!(f, "screenView"),
            EventKind::Design => write!(f, "design"),
            EventKind::Timing => write!(f, "timing"),
            EventKind::Progression => write!(f, "progression"),
            EventKind::Purchase => write!(f, "purchase"),
        }
    }
}

/// An analytics event ready for dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Event {
    ScreenView(ScreenView),
    Design(DesignEvent),
    Timing(TimingEvent),
    Progression(ProgressionEvent),
    Purchase(PurchaseEvent),
}

impl Event {
    /// Get the kind of this event.
    pub fn kind(&self) -> EventKind {
        match self {
            Event::ScreenView(_) => EventKind::ScreenView,
            Event::Design(_) => EventKind::Design,
            Event::Timing(_) => EventKind::Timing,
            Event::Progression(_) => EventKind::Progression,
            Event::Purchase(_) => EventKind::Purchase,
        }
    }

    /// Get the stable identifier of this event.
    pub fn event_id(&self) -> &str {
        match self {
            Event::ScreenView(e) => &e.event_id,
            Event::Design(e) => &e.event_id,
            Event::Timing(e) => &e.event_id,
            Event::Progression(e) => &e.event_id,
            Event::Purchase(e) => &e.event_id,
        }
    }

    /// Get the creation timestamp of this event.
    pub fn timestamp(&self) -> Timestamp {
        match self {
            Event::ScreenView(e) => e.timestamp,
            Event::Design(e) => e.timestamp,
            Event::Timing(e) => e.timestamp,
            Event::Progression(e) => e.timestamp,
            Event::Purchase(e) => e.timestamp,
        }
    }

    /// Numeric magnitude a sink should attach to the event, if any.
    pub fn value(&self) -> Option<f64> {
        match self {
            Event::ScreenView(_) => None,
            Event::Design(e) => Some(e.value as f64),
            Event::Timing(e) => Some(e.elapsed_ms as f64),
            Event::Progression(e) => Some(f64::from(e.score)),
            Event::Purchase(e) => Some(e.amount_cents as f64),
        }
    }
}

impl ScreenView {
    /// Create a new screen view.
    pub fn new(screen_name: impl Into<String>, timestamp: Timestamp) -> Self {
        let screen_name = screen_name.into();
        let event_id = join_id(["screenView", screen_name.as_str()]);
        Self {
            screen_name,
            event_id,
            timestamp,
        }
    }
}

impl DesignEvent {
    /// Create a new design event.
    ///
    /// The dimension is appended to the identifier only when the index is
    /// positive and the value is non-empty.
    pub fn new(
        category: impl Into<String>,
        action: impl Into<String>,
        label: impl Into<String>,
        value: i64,
        dimension_index: i32,
        dimension_value: impl Into<String>,
        timestamp: Timestamp,
    ) -> Self {
        let category = category.into();
        let action = action.into();
        let label = label.into();
        let dimension_value = dimension_value.into();

        let mut event_id = join_id([category.as_str(), action.as_str(), label.as_str()]);
        if dimension_index > 0 && !dimension_value.is_empty() {
            event_id.push(ID_SEPARATOR);
            event_id.push_str(&format!("dimension{}.{}", dimension_index, dimension_value));
        }

        Self {
            category,
            action,
            label,
            value,
            dimension_index,
            dimension_value,
            event_id,
            timestamp,
        }
    }
}

impl TimingEvent {
    /// Create a new timing event.
    pub fn new(
        category: impl Into<String>,
        variable: impl Into<String>,
        label: impl Into<String>,
        elapsed_ms: i64,
        timestamp: Timestamp,
    ) -> Self {
        let category = category.into();
        let variable = variable.into();
        let label = label.into();
        let event_id = join_id([
            "timing",
            category.as_str(),
            variable.as_str(),
            label.as_str(),
        ]);
        Self {
            category,
            variable,
            label,
            elapsed_ms,
            event_id,
            timestamp,
        }
    }
}

impl ProgressionEvent {
    /// Create a new progression event.
    pub fn new(
        status: ProgressionStatus,
        world: impl Into<String>,
        level: impl Into<String>,
        phase: impl Into<String>,
        score: i32,
        timestamp: Timestamp,
    ) -> Self {
        let world = world.into();
        let level = level.into();
        let phase = phase.into();

        // Trailing empty components are left out of the identifier.
        let mut parts = vec![world.as_str(), level.as_str(), phase.as_str()];
        while parts.last().is_some_and(|p| p.is_empty()) {
            parts.pop();
        }
        let status_name = status.to_string();
        let event_id = join_id(std::iter::once(status_name.as_str()).chain(parts));

        Self {
            status,
            world,
            level,
            phase,
            score,
            event_id,
            timestamp,
        }
    }
}

fn join_id<'a>(parts: impl IntoIterator<Item = &'a str>) -> String {
    let mut id = String::new();
    for (i, part) in parts.into_iter().enumerate() {
        if i > 0 {
            id.push(ID_SEPARATOR);
        }
        id.push_str(part);
    }
    id
}

impl From<ScreenView> for Event {
    fn from(e: ScreenView) -> Self {
        Event::ScreenView(e)
    }
}

impl From<DesignEvent> for Event {
    fn from(e: DesignEvent) -> Self {
        Event::Design(e)
    }
}

impl From<TimingEvent> for Event {
    fn from(e: TimingEvent) -> Self {
        Event::Timing(e)
    }
}

impl From<ProgressionEvent> for Event {
    fn from(e: ProgressionEvent) -> Self {
        Event::Progression(e)
    }
}

impl From<PurchaseEvent> for Event {
    fn from(e: PurchaseEvent) -> Self {
        Event::Purchase(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn screen_view_id() {
        let event = ScreenView::new("main_menu", 1000);
        assert_eq!(event.event_id, "screenView:main_menu");
    }

    #[test]
    fn design_event_id_without_dimension() {
        let event = DesignEvent::new("ui", "click", "play", 1, 0, "gold", 1000);
        assert_eq!(event.event_id, "ui:click:play");
    }

    #[test]
    fn design_event_id_with_dimension() {
        let event = DesignEvent::new("ui", "click", "play", 1, 2, "gold", 1000);
        assert_eq!(event.event_id, "ui:click:play:dimension2.gold");
    }

    #[test]
    fn design_event_dimension_needs_value() {
        let event = DesignEvent::new("ui", "click", "play", 1, 3, "", 1000);
        assert_eq!(event.event_id, "ui:click:play");

        let event = DesignEvent::new("ui", "click", "play", 1, -1, "gold", 1000);
        assert_eq!(event.event_id, "ui:click:play");
    }

    #[test]
    fn timing_event_id() {
        let event = TimingEvent::new("load", "level", "forest", 1500, 1000);
        assert_eq!(event.event_id, "timing:load:level:forest");
        assert_eq!(Event::from(event).value(), Some(1500.0));
    }

    #[test]
    fn progression_status_codes() {
        assert_eq!(ProgressionStatus::from_code(0), Ok(ProgressionStatus::Start));
        assert_eq!(ProgressionStatus::from_code(1), Ok(ProgressionStatus::Fail));
        assert_eq!(
            ProgressionStatus::from_code(2),
            Ok(ProgressionStatus::Complete)
        );
        assert_eq!(
            ProgressionStatus::from_code(3),
            Err(Error::InvalidStatus(3))
        );
        assert_eq!(
            ProgressionStatus::try_from(-1),
            Err(Error::InvalidStatus(-1))
        );
    }

    #[test]
    fn progression_id_skips_trailing_empty_parts() {
        let event = ProgressionEvent::new(ProgressionStatus::Start, "w1", "l1", "", 0, 1000);
        assert_eq!(event.event_id, "Start:w1:l1");

        let event =
            ProgressionEvent::new(ProgressionStatus::Complete, "w1", "l1", "p2", 300, 1000);
        assert_eq!(event.event_id, "Complete:w1:l1:p2");
    }

    #[test]
    fn event_accessors() {
        let event = Event::from(DesignEvent::new("a", "b", "c", 42, 0, "", 1234));
        assert_eq!(event.kind(), EventKind::Design);
        assert_eq!(event.event_id(), "a:b:c");
        assert_eq!(event.timestamp(), 1234);
        assert_eq!(event.value(), Some(42.0));
    }

    #[test]
    fn serialization_format() {
        let event = Event::from(ScreenView::new("shop", 1000));
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"screenView\""));
        assert!(json.contains("\"screenName\":\"shop\""));

        let parsed: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(event, parsed);
    }
}
