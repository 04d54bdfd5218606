// Copyright (c) 2025 - Cowboy AI, Inc.

//! Routing key codec, topic matcher, and subscription filters
//!
//! Every published event is addressed by a hierarchical routing key:
//!
//! ```text
//! {event_type}.{origin}[.{sub_type segments...}]
//! ```
//!
//! Subscriptions bind dot-segmented patterns against these keys. A `*`
//! segment matches exactly one key segment; a trailing `#` matches zero or
//! more remaining segments and only appears in binding patterns derived from
//! filters that leave the sub-type axis open.
//!
//! The matcher is deliberately broker-independent: subscribers re-run it
//! locally on every delivery, so the filtering rules hold even when the
//! underlying broker's server-side matching is coarser.
//!
//! # Examples
//!
//! ```rust
//! use cim_events::routing::{encode_routing_key, topic_matches, EventFilter};
//! use cim_events::Event;
//!
//! let key = encode_routing_key("ResourceModifiedEvent", "one", "st1.a");
//! assert_eq!(key, "ResourceModifiedEvent.one.st1.a");
//!
//! assert!(topic_matches("ResourceModifiedEvent.*.st1.a", &key));
//! assert!(!topic_matches("ResourceModifiedEvent.*.st1", &key));
//!
//! let filter = EventFilter::new().event_type("ResourceModifiedEvent").sub_type("st1.*");
//! let event = Event::new("ResourceModifiedEvent", "one").sub_type("st1.a");
//! assert!(filter.matches_event(&event));
//! ```

use serde::{Deserialize, Serialize};

use crate::errors::{EventError, EventResult};
use crate::event::Event;

/// Pattern token matching exactly one segment
pub const WILDCARD: &str = "*";

/// Pattern token matching zero or more trailing segments
pub const MULTI_WILDCARD: &str = "#";

/// Split a dot-path into segments; the empty path has zero segments
fn segments(path: &str) -> Vec<&str> {
    if path.is_empty() {
        Vec::new()
    } else {
        path.split('.').collect()
    }
}

/// Build the routing key for an event's type, origin, and sub-type
///
/// An empty `sub_type` contributes no trailing segments.
pub fn encode_routing_key(event_type: &str, origin: &str, sub_type: &str) -> String {
    if sub_type.is_empty() {
        format!("{event_type}.{origin}")
    } else {
        format!("{event_type}.{origin}.{sub_type}")
    }
}

/// Recover `(event_type, origin, sub_type)` from a routing key
///
/// Inverse of [`encode_routing_key`] for any key it produced.
pub fn decode_routing_key(key: &str) -> EventResult<(String, String, String)> {
    let segs = segments(key);
    if segs.len() < 2 {
        return Err(EventError::Validation(format!(
            "routing key must have at least two segments: {key:?}"
        )));
    }
    Ok((
        segs[0].to_string(),
        segs[1].to_string(),
        segs[2..].join("."),
    ))
}

/// Segment-wise topic match of a pattern against a routing key
///
/// Rules:
/// - segment counts must be exactly equal, unless the pattern ends in `#`
/// - a `*` pattern segment matches any single key segment
/// - a trailing `#` matches the remaining key segments, including none
pub fn topic_matches(pattern: &str, key: &str) -> bool {
    let pattern = segments(pattern);
    let key = segments(key);

    let (pattern, open_tail) = match pattern.split_last() {
        Some((&MULTI_WILDCARD, head)) => (head, true),
        _ => (&pattern[..], false),
    };

    if open_tail {
        if key.len() < pattern.len() {
            return false;
        }
    } else if key.len() != pattern.len() {
        return false;
    }

    pattern
        .iter()
        .zip(key.iter())
        .all(|(p, k)| *p == WILDCARD || p == k)
}

/// Partial-specificity subscription filter
///
/// Each axis left unset is a catch-all. Note the distinction on the
/// sub-type axis: an unset filter matches any sub-type regardless of
/// segment count, while an explicit pattern such as `"st1.*"` enforces
/// exact segment counts (it matches `"st1.a"` but not `"st1"`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventFilter {
    /// Exact event type to match, or any when unset
    pub event_type: Option<String>,

    /// Exact origin to match, or any when unset
    pub origin: Option<String>,

    /// Sub-type pattern (`*` per segment), or any when unset
    pub sub_type: Option<String>,
}

impl EventFilter {
    /// Create a filter matching every event
    pub fn new() -> Self {
        Self::default()
    }

    /// Require an exact event type
    pub fn event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = non_empty(event_type.into());
        self
    }

    /// Require an exact origin
    pub fn origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = non_empty(origin.into());
        self
    }

    /// Require a sub-type pattern; the empty string means "unset"
    pub fn sub_type(mut self, sub_type: impl Into<String>) -> Self {
        self.sub_type = non_empty(sub_type.into());
        self
    }

    /// Decide whether a delivered event passes this filter
    pub fn matches_event(&self, event: &Event) -> bool {
        if let Some(event_type) = &self.event_type {
            if *event_type != event.event_type {
                return false;
            }
        }
        if let Some(origin) = &self.origin {
            if *origin != event.origin {
                return false;
            }
        }
        match &self.sub_type {
            None => true,
            Some(pattern) => topic_matches(pattern, &event.sub_type),
        }
    }

    /// The pattern this filter binds against the transport
    ///
    /// Unset type/origin axes become `*`; an unset sub-type becomes a
    /// trailing `#` so events with any number of sub-type segments
    /// (including none) are delivered.
    pub fn binding_pattern(&self) -> String {
        let event_type = self.event_type.as_deref().unwrap_or(WILDCARD);
        let origin = self.origin.as_deref().unwrap_or(WILDCARD);
        let sub_type = self.sub_type.as_deref().unwrap_or(MULTI_WILDCARD);
        format!("{event_type}.{origin}.{sub_type}")
    }
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}
