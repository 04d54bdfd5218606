// Copyright (c) 2025 - Cowboy AI, Inc.

//! Event repository
//!
//! Durable, queryable log of every published event, layered over a
//! [`DocumentStore`]. Records are append-only: `put_event` always creates a
//! fresh record, nothing here mutates or deletes one.
//!
//! Query planning for [`EventRepository::find_events`]: the origin index is
//! preferred when an origin criterion is present, the event-type index
//! otherwise; criteria the chosen index cannot answer are filtered here
//! after the scan, and the limit is only pushed down to the store when no
//! such residual filter remains.

use std::sync::Arc;
use tracing::debug;

use crate::errors::{EventError, EventResult};
use crate::event::{current_ts, Event};
use crate::store::{DocumentStore, EventIndex};

/// Criteria for [`EventRepository::find_events`]
///
/// All provided criteria are conjunctive. Timestamp bounds are inclusive
/// and compared numerically. `limit == 0` means unbounded.
#[derive(Debug, Clone, Default)]
pub struct EventQuery {
    /// Exact origin to match
    pub origin: Option<String>,

    /// Exact stored event type to match
    pub event_type: Option<String>,

    /// Inclusive lower `ts_created` bound (decimal milliseconds)
    pub start_ts: Option<String>,

    /// Inclusive upper `ts_created` bound (decimal milliseconds)
    pub end_ts: Option<String>,

    /// Truncate the result after ordering; 0 is unbounded
    pub limit: usize,

    /// Reverse the default ascending `ts_created` order
    pub descending: bool,
}

impl EventQuery {
    /// Create an unconstrained query
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict to one origin
    pub fn origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    /// Restrict to one stored event type
    pub fn event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    /// Inclusive lower timestamp bound
    pub fn start_ts(mut self, start_ts: impl Into<String>) -> Self {
        self.start_ts = Some(start_ts.into());
        self
    }

    /// Inclusive upper timestamp bound
    pub fn end_ts(mut self, end_ts: impl Into<String>) -> Self {
        self.end_ts = Some(end_ts.into());
        self
    }

    /// Truncate the ordered result
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Return newest events first
    pub fn descending(mut self, descending: bool) -> Self {
        self.descending = descending;
        self
    }
}

/// Persists events and answers time-ranged queries
#[derive(Clone)]
pub struct EventRepository {
    store: Arc<dyn DocumentStore>,
}

impl EventRepository {
    /// Create a repository over a document store
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Store an event, returning its assigned `(id, rev)`
    ///
    /// Assigns `ts_created` when empty. The stored record keeps whatever id
    /// the store assigns; passing an event whose id already exists in the
    /// store is a storage error, never a silent overwrite.
    pub async fn put_event(&self, mut event: Event) -> EventResult<(String, String)> {
        if event.event_type.is_empty() {
            return Err(EventError::Validation(
                "event_type must not be empty".to_string(),
            ));
        }
        if event.ts_created.is_empty() {
            event.ts_created = current_ts();
        }

        let doc = serde_json::to_value(&event)?;
        let (id, rev) = self.store.create(doc).await?;
        debug!(event_id = %id, event_type = %event.event_type, origin = %event.origin, "Stored event");
        Ok((id, rev))
    }

    /// Fetch one event by id
    pub async fn get_event(&self, id: &str) -> EventResult<Event> {
        let doc = self.store.read(id).await?;
        let event: Event = serde_json::from_value(doc)?;
        Ok(event)
    }

    /// Query stored events
    ///
    /// Results are ordered by `ts_created` (ascending unless the query says
    /// otherwise) and truncated to the query's limit after ordering.
    pub async fn find_events(&self, query: EventQuery) -> EventResult<Vec<Event>> {
        // Residual filter is whichever equality criterion the chosen index
        // cannot answer; the limit moves client-side with it.
        let (index, key, residual) = match (&query.origin, &query.event_type) {
            (Some(origin), event_type) => (EventIndex::Origin, Some(origin), event_type.clone()),
            (None, event_type) => (EventIndex::EventType, event_type.as_ref(), None),
        };
        let scan_limit = if residual.is_some() { 0 } else { query.limit };

        let rows = self
            .store
            .range_scan(
                index,
                key.map(String::as_str),
                query.start_ts.as_deref(),
                query.end_ts.as_deref(),
                scan_limit,
                query.descending,
            )
            .await?;

        let mut events = Vec::with_capacity(rows.len());
        for row in rows {
            let event: Event = serde_json::from_value(row)?;
            if let Some(event_type) = &residual {
                if event.event_type != *event_type {
                    continue;
                }
            }
            events.push(event);
            if query.limit > 0 && events.len() == query.limit {
                break;
            }
        }

        debug!(count = events.len(), "find_events");
        Ok(events)
    }
}
