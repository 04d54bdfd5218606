// Copyright (c) 2025 - Cowboy AI, Inc.

//! Event publisher
//!
//! Serializes an event, computes its routing key, and hands it to the
//! transport. Dispatch is fire-and-forget; no acknowledgement is awaited.
//! When a repository is attached, the event is also recorded there as a
//! best-effort side channel: a storage failure is logged, never surfaced,
//! and never blocks delivery.

use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, error};

use crate::errors::{EventError, EventResult};
use crate::event::{current_ts, Event};
use crate::repository::EventRepository;
use crate::routing::encode_routing_key;
use crate::transport::EventTransport;

/// Outcome of a publish
#[derive(Debug, Clone)]
pub struct PublishReceipt {
    /// Routing key the event went out under
    pub routing_key: String,

    /// Timestamp the event was published with
    pub ts_created: String,

    /// Repository-assigned event id, when a repository is attached and the
    /// write succeeded
    pub event_id: Option<String>,

    /// Storage revision of the repository record, alongside `event_id`
    pub rev: Option<String>,
}

/// Publishes events to the transport, optionally recording them
pub struct EventPublisher {
    transport: Arc<dyn EventTransport>,
    repository: Option<EventRepository>,
    default_event_type: Option<String>,
}

impl EventPublisher {
    /// Create a publisher over a transport
    pub fn new(transport: Arc<dyn EventTransport>) -> Self {
        Self {
            transport,
            repository: None,
            default_event_type: None,
        }
    }

    /// Default event type applied when a published event has none
    pub fn with_event_type(mut self, event_type: impl Into<String>) -> Self {
        self.default_event_type = Some(event_type.into());
        self
    }

    /// Record every published event in this repository (best-effort)
    pub fn with_repository(mut self, repository: EventRepository) -> Self {
        self.repository = Some(repository);
        self
    }

    /// Publish an event
    ///
    /// Exactly one transport send per call, at most one repository write.
    /// Fails with a validation error when no event type is available, and
    /// with a transport error when dispatch fails; a repository write
    /// failure is logged and reflected only as an empty `event_id`/`rev`.
    pub async fn publish_event(&self, mut event: Event) -> EventResult<PublishReceipt> {
        if event.event_type.is_empty() {
            match &self.default_event_type {
                Some(event_type) => event.event_type = event_type.clone(),
                None => {
                    return Err(EventError::Validation(
                        "event_type must not be empty".to_string(),
                    ))
                }
            }
        }
        if event.ts_created.is_empty() {
            event.ts_created = current_ts();
        }

        let routing_key = encode_routing_key(&event.event_type, &event.origin, &event.sub_type);
        let payload = Bytes::from(serde_json::to_vec(&event)?);

        self.transport.send(&routing_key, payload).await?;
        debug!(routing_key = %routing_key, "Dispatched event");

        let (event_id, rev) = match &self.repository {
            Some(repository) => match repository.put_event(event.clone()).await {
                Ok((id, rev)) => (Some(id), Some(rev)),
                Err(e) => {
                    error!(
                        error = %e,
                        routing_key = %routing_key,
                        "Best-effort event recording failed"
                    );
                    (None, None)
                }
            },
            None => (None, None),
        };

        Ok(PublishReceipt {
            routing_key,
            ts_created: event.ts_created,
            event_id,
            rev,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::EventQuery;
    use crate::store::MemoryDocumentStore;
    use crate::transport::MemoryTransport;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_publish_requires_event_type() {
        let publisher = EventPublisher::new(Arc::new(MemoryTransport::new()));
        let err = publisher
            .publish_event(Event::new("", "origin"))
            .await
            .unwrap_err();
        assert!(matches!(err, EventError::Validation(_)));
    }

    #[tokio::test]
    async fn test_publish_applies_default_event_type_and_ts() {
        let publisher =
            EventPublisher::new(Arc::new(MemoryTransport::new())).with_event_type("ResourceEvent");
        let receipt = publisher
            .publish_event(Event::new("", "specific"))
            .await
            .unwrap();

        assert_eq!(receipt.routing_key, "ResourceEvent.specific");
        assert!(!receipt.ts_created.is_empty());
        assert_eq!(receipt.event_id, None);
        assert_eq!(receipt.rev, None);
    }

    #[tokio::test]
    async fn test_publish_keeps_explicit_ts() {
        let publisher = EventPublisher::new(Arc::new(MemoryTransport::new()));
        let receipt = publisher
            .publish_event(Event::new("ResourceEvent", "o").ts_created("1328680477138"))
            .await
            .unwrap();
        assert_eq!(receipt.ts_created, "1328680477138");
    }

    #[tokio::test]
    async fn test_publish_writes_through_to_repository() {
        let repository = EventRepository::new(Arc::new(MemoryDocumentStore::new()));
        let publisher = EventPublisher::new(Arc::new(MemoryTransport::new()))
            .with_repository(repository.clone());

        let receipt = publisher
            .publish_event(Event::new("ResourceEvent", "specifics").description("hallo"))
            .await
            .unwrap();
        let event_id = receipt.event_id.expect("repository write should assign an id");
        assert!(receipt.rev.as_deref().unwrap().starts_with("1-"));

        let stored = repository.get_event(&event_id).await.unwrap();
        assert_eq!(stored.description, "hallo");

        let events = repository
            .find_events(EventQuery::new().origin("specifics"))
            .await
            .unwrap();
        assert_eq!(events.len(), 1);
    }
}
