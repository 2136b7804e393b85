//! Event payload produced by the clock or by echoing client input.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

/// An immutable delivery payload.
///
/// Only `message` goes on the wire; the timestamp is kept for ordering
/// checks and already appears inside the greeting texts.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub message: String,
    #[serde(skip)]
    pub timestamp: DateTime<Utc>,
}

impl Event {
    fn with_message(message: String, timestamp: DateTime<Utc>) -> Self {
        Self { message, timestamp }
    }

    /// Periodic greeting sent by the poll and stream strategies.
    pub fn hello() -> Self {
        let now = Utc::now();
        Self::with_message(format!("Hello at {}", iso8601(now)), now)
    }

    /// One-time greeting sent when a socket connection is established.
    pub fn welcome() -> Self {
        let now = Utc::now();
        Self::with_message(
            format!("Welcome! Connection established at {}", iso8601(now)),
            now,
        )
    }

    /// Deterministic echo reply for an inbound socket message.
    pub fn echo(text: &str) -> Self {
        Self::with_message(format!("You said: {text}"), Utc::now())
    }
}

/// ISO-8601 with millisecond precision and a `Z` suffix, matching the
/// format clients of the original endpoints expect.
pub fn iso8601(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hello_message_format() {
        let event = Event::hello();
        assert!(event.message.starts_with("Hello at "));
        assert!(event.message.ends_with('Z'));
    }

    #[test]
    fn test_welcome_message_format() {
        let event = Event::welcome();
        assert!(event
            .message
            .starts_with("Welcome! Connection established at "));
    }

    #[test]
    fn test_echo_transformation() {
        let event = Event::echo("ping");
        assert_eq!(event.message, "You said: ping");
    }

    #[test]
    fn test_wire_form_carries_message_only() {
        let event = Event::echo("ping");
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(json, r#"{"message":"You said: ping"}"#);
    }

    #[test]
    fn test_timestamp_embedded_in_greeting() {
        let event = Event::hello();
        let embedded = event.message.trim_start_matches("Hello at ");
        let parsed: DateTime<Utc> = embedded.parse().unwrap();
        // The wire form is truncated to millisecond precision.
        assert_eq!((event.timestamp - parsed).num_milliseconds(), 0);
    }
}
