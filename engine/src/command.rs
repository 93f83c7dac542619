//! Textual command surface.
//!
//! Host messages are pipe-delimited: `name|arg1|arg2...`. A message is ours
//! only when both the name and the arity match; anything else is left for the
//! next handler. A matching message with unparseable numbers is still ours,
//! it just fails validation.

use crate::{
    error::Result,
    validate::{parse_i32, parse_i64},
    DesignEvent, Event, ProgressionEvent, ProgressionStatus, ScreenView, Timestamp, TimingEvent,
};

/// Field separator in host messages.
pub const MESSAGE_SEPARATOR: char = '|';

pub const CMD_INITIALIZE: &str = "game-analytics-initialize";
pub const CMD_SCREEN_VIEW: &str = "analytics-send-screen-view";
pub const CMD_EVENT: &str = "analytics-send-event";
pub const CMD_TIMING: &str = "analytics-send-timing";
pub const CMD_PROGRESS: &str = "analytics-send-progress";

/// A recognized host command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Provide credentials and start dispatching
    Initialize { game_key: String, secret_key: String },
    /// Enqueue an event
    Send(Event),
}

impl Command {
    /// Parse an already split message.
    ///
    /// Returns `None` when the message is not handled here (unknown name or
    /// wrong arity), `Some(Err(_))` when it matched but failed validation.
    pub fn parse(parts: &[&str], timestamp: Timestamp) -> Option<Result<Command>> {
        let result = match (parts.first().copied()?, parts.len()) {
            (CMD_INITIALIZE, 3) => Ok(Command::Initialize {
                game_key: parts[1].to_string(),
                secret_key: parts[2].to_string(),
            }),
            (CMD_SCREEN_VIEW, 2) => Ok(Command::Send(
                ScreenView::new(parts[1], timestamp).into(),
            )),
            (CMD_EVENT, 7) => parse_design(parts, timestamp),
            (CMD_TIMING, 5) => parse_i64("elapsedMs", parts[4]).map(|elapsed| {
                Command::Send(
                    TimingEvent::new(parts[1], parts[2], parts[3], elapsed, timestamp).into(),
                )
            }),
            (CMD_PROGRESS, 6) => parse_progress(parts, timestamp),
            _ => return None,
        };
        Some(result)
    }

    /// Split and parse a pipe-delimited message.
    pub fn parse_message(message: &str, timestamp: Timestamp) -> Option<Result<Command>> {
        let parts = split_message(message);
        Self::parse(&parts, timestamp)
    }
}

/// Split a message into its fields. Empty fields are kept.
pub fn split_message(message: &str) -> Vec<&str> {
    message
        .trim_end_matches(['\r', '\n'])
        .split(MESSAGE_SEPARATOR)
        .collect()
}

fn parse_design(parts: &[&str], timestamp: Timestamp) -> Result<Command> {
    let value = parse_i64("value", parts[4])?;
    let dimension_index = parse_i32("dimensionIndex", parts[5])?;
    let event = DesignEvent::new(
        parts[1],
        parts[2],
        parts[3],
        value,
        dimension_index,
        parts[6],
        timestamp,
    );
    Ok(Command::Send(event.into()))
}

fn parse_progress(parts: &[&str], timestamp: Timestamp) -> Result<Command> {
    let status = ProgressionStatus::from_code(parse_i64("status", parts[1])?)?;
    let score = parse_i32("score", parts[5])?;
    let event = ProgressionEvent::new(status, parts[2], parts[3], parts[4], score, timestamp);
    Ok(Command::Send(event.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Error, EventKind};

    fn parse(message: &str) -> Option<Result<Command>> {
        Command::parse_message(message, 1000)
    }

    fn sent(message: &str) -> Event {
        match parse(message) {
            Some(Ok(Command::Send(event))) => event,
            other => panic!("expected an event from {:?}, got {:?}", message, other),
        }
    }

    #[test]
    fn initialize() {
        assert_eq!(
            parse("game-analytics-initialize|key|secret"),
            Some(Ok(Command::Initialize {
                game_key: "key".into(),
                secret_key: "secret".into()
            }))
        );
    }

    #[test]
    fn screen_view() {
        let event = sent("analytics-send-screen-view|shop");
        assert_eq!(event.kind(), EventKind::ScreenView);
        assert_eq!(event.event_id(), "screenView:shop");
        assert_eq!(event.timestamp(), 1000);
    }

    #[test]
    fn design_event() {
        let event = sent("analytics-send-event|ui|click|play|3|1|hard");
        assert_eq!(event.event_id(), "ui:click:play:dimension1.hard");
        assert_eq!(event.value(), Some(3.0));
    }

    #[test]
    fn timing_event() {
        let event = sent("analytics-send-timing|load|level|forest|1500");
        assert_eq!(event.event_id(), "timing:load:level:forest");
        assert_eq!(event.value(), Some(1500.0));
    }

    #[test]
    fn progress_event() {
        let event = sent("analytics-send-progress|2|w1|l3||900");
        assert_eq!(event.event_id(), "Complete:w1:l3");
        assert_eq!(event.value(), Some(900.0));
    }

    #[test]
    fn invalid_status_is_handled_but_rejected() {
        for code in ["3", "-1", "42"] {
            let message = format!("analytics-send-progress|{}|w|l|p|0", code);
            assert!(matches!(
                parse(&message),
                Some(Err(Error::InvalidStatus(_)))
            ));
        }
    }

    #[test]
    fn bad_numbers_are_handled_but_rejected() {
        assert_eq!(
            parse("analytics-send-timing|a|b|c|soon"),
            Some(Err(Error::InvalidNumber {
                field: "elapsedMs",
                value: "soon".into()
            }))
        );
        assert!(matches!(
            parse("analytics-send-event|a|b|c|1|x|v"),
            Some(Err(Error::InvalidNumber {
                field: "dimensionIndex",
                ..
            }))
        ));
    }

    #[test]
    fn unknown_or_wrong_arity_is_not_handled() {
        assert_eq!(parse("analytics-send-screen-view"), None);
        assert_eq!(parse("analytics-send-screen-view|a|b"), None);
        assert_eq!(parse("game-analytics-initialize|key"), None);
        assert_eq!(parse("ads-show-interstitial|now"), None);
        assert_eq!(parse(""), None);
        assert_eq!(Command::parse(&[], 0), None);
    }

    #[test]
    fn split_keeps_empty_fields() {
        assert_eq!(split_message("a||c\n"), ["a", "", "c"]);
    }
}
