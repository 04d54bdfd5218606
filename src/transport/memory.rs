// Copyright (c) 2025 - Cowboy AI, Inc.

//! In-process transport
//!
//! A single-process broker over tokio channels. It implements the full
//! `*`/`#` pattern language of [`crate::routing::topic_matches`], so its
//! server-side matching is exactly the crate's own matching. Used by the
//! integration tests and by embedders that want an event bus without a
//! broker.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::debug;

use crate::errors::{EventError, EventResult};
use crate::routing::topic_matches;
use crate::transport::{Delivery, EventTransport, Headers, ROUTING_KEY_HEADER};

struct Queue {
    patterns: Vec<String>,
    /// Dropped on `stop_consume` so the delivery stream ends
    sender: Option<mpsc::UnboundedSender<Delivery>>,
    /// Taken by `start_consume`
    receiver: Option<mpsc::UnboundedReceiver<Delivery>>,
}

/// In-process [`EventTransport`] over tokio channels
#[derive(Clone, Default)]
pub struct MemoryTransport {
    queues: Arc<Mutex<HashMap<String, Queue>>>,
}

impl MemoryTransport {
    /// Create an empty in-process broker
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventTransport for MemoryTransport {
    async fn send(&self, routing_key: &str, payload: Bytes) -> EventResult<()> {
        let mut headers = Headers::new();
        headers.insert(ROUTING_KEY_HEADER.to_string(), routing_key.to_string());
        let delivery = Delivery {
            routing_key: routing_key.to_string(),
            payload,
            headers,
        };

        let queues = self
            .queues
            .lock()
            .map_err(|_| EventError::Transport("memory broker poisoned".to_string()))?;
        for (name, queue) in queues.iter() {
            let matched = queue
                .patterns
                .iter()
                .any(|pattern| topic_matches(pattern, routing_key));
            if !matched {
                continue;
            }
            if let Some(sender) = &queue.sender {
                // Receiver side may already be gone; that is a drop, not an error
                let _ = sender.send(delivery.clone());
                debug!(queue = %name, routing_key = %routing_key, "Delivered message");
            }
        }
        Ok(())
    }

    async fn bind(&self, pattern: &str, queue: &str) -> EventResult<()> {
        let mut queues = self
            .queues
            .lock()
            .map_err(|_| EventError::Transport("memory broker poisoned".to_string()))?;
        let entry = queues.entry(queue.to_string()).or_insert_with(|| {
            let (sender, receiver) = mpsc::unbounded_channel();
            Queue {
                patterns: Vec::new(),
                sender: Some(sender),
                receiver: Some(receiver),
            }
        });
        entry.patterns.push(pattern.to_string());
        debug!(queue = %queue, pattern = %pattern, "Bound pattern");
        Ok(())
    }

    async fn start_consume(&self, queue: &str) -> EventResult<BoxStream<'static, Delivery>> {
        let mut queues = self
            .queues
            .lock()
            .map_err(|_| EventError::Transport("memory broker poisoned".to_string()))?;
        let entry = queues
            .get_mut(queue)
            .ok_or_else(|| EventError::Transport(format!("unknown queue: {queue}")))?;
        let receiver = entry
            .receiver
            .take()
            .ok_or_else(|| EventError::Transport(format!("queue already consumed: {queue}")))?;
        Ok(UnboundedReceiverStream::new(receiver).boxed())
    }

    async fn stop_consume(&self, queue: &str) -> EventResult<()> {
        let mut queues = self
            .queues
            .lock()
            .map_err(|_| EventError::Transport("memory broker poisoned".to_string()))?;
        if let Some(entry) = queues.get_mut(queue) {
            entry.sender = None;
        }
        Ok(())
    }

    async fn close(&self, queue: &str) -> EventResult<()> {
        let mut queues = self
            .queues
            .lock()
            .map_err(|_| EventError::Transport("memory broker poisoned".to_string()))?;
        queues.remove(queue);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_send_routes_by_pattern() {
        let transport = MemoryTransport::new();
        transport.bind("ResourceEvent.*.#", "q1").await.unwrap();
        transport.bind("OtherEvent.*.#", "q2").await.unwrap();

        let mut stream = transport.start_consume("q1").await.unwrap();
        transport
            .send("ResourceEvent.one", Bytes::from_static(b"{}"))
            .await
            .unwrap();

        let delivery = stream.next().await.unwrap();
        assert_eq!(delivery.routing_key, "ResourceEvent.one");
        assert_eq!(
            delivery.headers.get(ROUTING_KEY_HEADER).map(String::as_str),
            Some("ResourceEvent.one")
        );
    }

    #[tokio::test]
    async fn test_stop_consume_ends_stream() {
        let transport = MemoryTransport::new();
        transport.bind("*.*.#", "q").await.unwrap();
        let mut stream = transport.start_consume("q").await.unwrap();

        transport.stop_consume("q").await.unwrap();
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_double_consume_is_rejected() {
        let transport = MemoryTransport::new();
        transport.bind("*.*.#", "q").await.unwrap();
        let _stream = transport.start_consume("q").await.unwrap();

        assert!(transport.start_consume("q").await.is_err());
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let transport = MemoryTransport::new();
        transport.bind("*.*.#", "q").await.unwrap();
        transport.close("q").await.unwrap();
        transport.close("q").await.unwrap();
    }
}
