// Copyright (c) 2025 - Cowboy AI, Inc.

//! Event record and timestamp helpers
//!
//! Events are immutable once published. The `ts_created` field is a decimal
//! string of milliseconds since the Unix epoch; string values are compared by
//! their numeric value everywhere in this crate.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{EventError, EventResult};

/// A typed, hierarchically-scoped notification
///
/// `event_type` is a discriminator within a flat taxonomy of event names,
/// `origin` identifies the entity the event is about, and `sub_type` is an
/// optional dot-separated refinement path (e.g. `"st1.a"`). Arbitrary
/// event-specific attributes ride along in `fields`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Repository-assigned identifier; `None` until the event is stored
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Event type discriminator (e.g. "ResourceEvent")
    pub event_type: String,

    /// Entity this event is about
    pub origin: String,

    /// Dot-separated sub-type path, possibly empty
    #[serde(default)]
    pub sub_type: String,

    /// Free-form payload text
    #[serde(default)]
    pub description: String,

    /// Milliseconds since epoch as a decimal string; assigned at publish
    /// time when empty
    #[serde(default)]
    pub ts_created: String,

    /// Open extension bag for event-specific attributes
    #[serde(flatten)]
    pub fields: serde_json::Map<String, Value>,
}

impl Event {
    /// Create a new event for the given type and origin
    pub fn new(event_type: impl Into<String>, origin: impl Into<String>) -> Self {
        Self {
            id: None,
            event_type: event_type.into(),
            origin: origin.into(),
            sub_type: String::new(),
            description: String::new(),
            ts_created: String::new(),
            fields: serde_json::Map::new(),
        }
    }

    /// Set the dot-separated sub-type path
    pub fn sub_type(mut self, sub_type: impl Into<String>) -> Self {
        self.sub_type = sub_type.into();
        self
    }

    /// Set the description payload
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set an explicit creation timestamp (decimal milliseconds)
    pub fn ts_created(mut self, ts: impl Into<String>) -> Self {
        self.ts_created = ts.into();
        self
    }

    /// Attach an event-specific attribute
    pub fn field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.fields.insert(key.into(), value);
        self
    }
}

/// Current wall-clock time as a decimal millisecond string
pub fn current_ts() -> String {
    Utc::now().timestamp_millis().to_string()
}

/// Parse a `ts_created` value for numeric comparison
pub fn parse_ts(ts: &str) -> EventResult<i64> {
    ts.parse::<i64>()
        .map_err(|_| EventError::Validation(format!("invalid timestamp: {ts:?}")))
}

/// Inclusive range check over decimal millisecond strings
///
/// An unparseable bound or value never matches.
pub fn ts_in_range(ts: &str, start_ts: Option<&str>, end_ts: Option<&str>) -> bool {
    let Ok(value) = parse_ts(ts) else {
        return false;
    };
    if let Some(start) = start_ts {
        match parse_ts(start) {
            Ok(start) if value >= start => {}
            _ => return false,
        }
    }
    if let Some(end) = end_ts {
        match parse_ts(end) {
            Ok(end) if value <= end => {}
            _ => return false,
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_event_builder() {
        let event = Event::new("ResourceModifiedEvent", "resource1")
            .sub_type("st1.a")
            .description("hello")
            .ts_created("1328680477138");

        assert_eq!(event.event_type, "ResourceModifiedEvent");
        assert_eq!(event.origin, "resource1");
        assert_eq!(event.sub_type, "st1.a");
        assert_eq!(event.description, "hello");
        assert_eq!(event.ts_created, "1328680477138");
        assert_eq!(event.id, None);
    }

    #[test]
    fn test_event_serde_round_trip_with_fields() {
        let event = Event::new("ResourceEvent", "specific")
            .description("hello")
            .field("severity", serde_json::json!(3));

        let json = serde_json::to_string(&event).unwrap();
        let back: Event = serde_json::from_str(&json).unwrap();

        assert_eq!(back, event);
        assert_eq!(back.fields["severity"], serde_json::json!(3));
    }

    #[test]
    fn test_current_ts_is_numeric() {
        let ts = current_ts();
        assert!(parse_ts(&ts).is_ok());
    }

    #[test]
    fn test_ts_in_range_inclusive_bounds() {
        assert!(ts_in_range("100", Some("100"), Some("100")));
        assert!(ts_in_range("100", Some("99"), None));
        assert!(ts_in_range("100", None, Some("101")));
        assert!(!ts_in_range("100", Some("101"), None));
        assert!(!ts_in_range("100", None, Some("99")));
        assert!(!ts_in_range("abc", None, None));
    }
}
