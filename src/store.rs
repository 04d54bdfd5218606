// Copyright (c) 2025 - Cowboy AI, Inc.

//! Document store seam for the event repository
//!
//! The repository persists events through a plain CRUD + range-scan
//! interface so the on-disk engine stays swappable. Two indexes are
//! assumed: `(origin, ts_created)` and `(event_type, ts_created)`; a scan
//! with no index key walks the whole log in timestamp order.
//!
//! [`MemoryDocumentStore`] is the reference implementation, used by tests
//! and single-process embedders.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use uuid::Uuid;

use crate::errors::{EventError, EventResult};
use crate::event::{parse_ts, ts_in_range};

/// Which secondary index a range scan walks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventIndex {
    /// `(origin, ts_created)`
    Origin,
    /// `(event_type, ts_created)`
    EventType,
}

impl EventIndex {
    fn doc_key(&self) -> &'static str {
        match self {
            EventIndex::Origin => "origin",
            EventIndex::EventType => "event_type",
        }
    }
}

/// Storage collaborator consumed by [`crate::repository::EventRepository`]
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Store a new document, assigning an id when the document has none
    ///
    /// Returns `(id, rev)`. Fails with a storage error if the document
    /// carries an id that already exists; existing records are never
    /// overwritten.
    async fn create(&self, doc: Value) -> EventResult<(String, String)>;

    /// Read a document by id; fails with [`EventError::NotFound`] on a miss
    async fn read(&self, id: &str) -> EventResult<Value>;

    /// Ordered range scan over one index
    ///
    /// Documents whose index field equals `key` (all documents when `key`
    /// is `None`) and whose `ts_created` lies inside the inclusive
    /// `start_ts..=end_ts` bounds, ordered by `ts_created` (reversed when
    /// `descending`), truncated to `limit` entries when `limit > 0`.
    async fn range_scan(
        &self,
        index: EventIndex,
        key: Option<&str>,
        start_ts: Option<&str>,
        end_ts: Option<&str>,
        limit: usize,
        descending: bool,
    ) -> EventResult<Vec<Value>>;
}

/// In-memory [`DocumentStore`]
#[derive(Clone, Default)]
pub struct MemoryDocumentStore {
    // id -> (rev, doc); the rev never advances, events are append-only
    docs: Arc<RwLock<HashMap<String, (String, Value)>>>,
}

impl MemoryDocumentStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn create(&self, mut doc: Value) -> EventResult<(String, String)> {
        let id = match doc.get("id").and_then(Value::as_str) {
            Some(id) => id.to_string(),
            None => Uuid::now_v7().to_string(),
        };
        let rev = format!("1-{}", Uuid::now_v7());

        let mut docs = self
            .docs
            .write()
            .map_err(|_| EventError::Storage("store lock poisoned".to_string()))?;
        if docs.contains_key(&id) {
            return Err(EventError::Storage(format!(
                "document already exists: {id}"
            )));
        }
        if let Some(map) = doc.as_object_mut() {
            map.insert("id".to_string(), Value::String(id.clone()));
        }
        docs.insert(id.clone(), (rev.clone(), doc));
        Ok((id, rev))
    }

    async fn read(&self, id: &str) -> EventResult<Value> {
        let docs = self
            .docs
            .read()
            .map_err(|_| EventError::Storage("store lock poisoned".to_string()))?;
        docs.get(id)
            .map(|(_, doc)| doc.clone())
            .ok_or_else(|| EventError::NotFound(format!("no document with id {id}")))
    }

    async fn range_scan(
        &self,
        index: EventIndex,
        key: Option<&str>,
        start_ts: Option<&str>,
        end_ts: Option<&str>,
        limit: usize,
        descending: bool,
    ) -> EventResult<Vec<Value>> {
        let docs = self
            .docs
            .read()
            .map_err(|_| EventError::Storage("store lock poisoned".to_string()))?;

        let mut rows: Vec<Value> = docs
            .values()
            .filter(|(_, doc)| match key {
                Some(key) => doc.get(index.doc_key()).and_then(Value::as_str) == Some(key),
                None => true,
            })
            .filter(|(_, doc)| {
                let ts = doc.get("ts_created").and_then(Value::as_str).unwrap_or("");
                (start_ts.is_none() && end_ts.is_none()) || ts_in_range(ts, start_ts, end_ts)
            })
            .map(|(_, doc)| doc.clone())
            .collect();

        // ts order, id as a stable tie-break
        rows.sort_by_key(|doc| {
            let ts = doc
                .get("ts_created")
                .and_then(Value::as_str)
                .and_then(|ts| parse_ts(ts).ok())
                .unwrap_or(0);
            let id = doc
                .get("id")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string();
            (ts, id)
        });
        if descending {
            rows.reverse();
        }
        if limit > 0 {
            rows.truncate(limit);
        }
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[tokio::test]
    async fn test_create_assigns_distinct_ids() {
        let store = MemoryDocumentStore::new();
        let (id1, rev1) = store.create(json!({"origin": "a"})).await.unwrap();
        let (id2, _) = store.create(json!({"origin": "a"})).await.unwrap();

        assert_ne!(id1, id2);
        assert!(rev1.starts_with("1-"));
    }

    #[tokio::test]
    async fn test_create_rejects_duplicate_id() {
        let store = MemoryDocumentStore::new();
        let (id, _) = store.create(json!({"origin": "a"})).await.unwrap();

        let err = store
            .create(json!({"id": id, "origin": "a"}))
            .await
            .unwrap_err();
        assert!(matches!(err, EventError::Storage(_)));
    }

    #[tokio::test]
    async fn test_read_miss_is_not_found() {
        let store = MemoryDocumentStore::new();
        let err = store.read("missing").await.unwrap_err();
        assert!(matches!(err, EventError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_range_scan_orders_by_ts() {
        let store = MemoryDocumentStore::new();
        for (origin, ts) in [("a", "300"), ("a", "100"), ("b", "200"), ("a", "200")] {
            store
                .create(json!({"origin": origin, "ts_created": ts}))
                .await
                .unwrap();
        }

        let rows = store
            .range_scan(EventIndex::Origin, Some("a"), None, None, 0, false)
            .await
            .unwrap();
        let ts: Vec<&str> = rows
            .iter()
            .map(|d| d["ts_created"].as_str().unwrap())
            .collect();
        assert_eq!(ts, vec!["100", "200", "300"]);

        let rows = store
            .range_scan(EventIndex::Origin, Some("a"), Some("150"), None, 1, true)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["ts_created"], "300");
    }
}
