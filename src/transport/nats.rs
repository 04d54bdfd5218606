// Copyright (c) 2025 - Cowboy AI, Inc.

//! NATS-backed transport
//!
//! Routing keys are published under `{system_name}.events.{key}` and the
//! prefix is stripped again on delivery, so the wire contract between
//! publisher and subscriber stays the bare `event_type.origin[.sub_type]`
//! key.
//!
//! Pattern translation: `*` maps directly onto the NATS single-token
//! wildcard. A trailing `#` means "zero or more segments", which NATS cannot
//! express in one subject (`>` requires at least one trailing token), so the
//! bind subscribes both the bare subject and the `>` form and merges the
//! streams.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, info, warn};

use crate::config::EventBusConfig;
use crate::errors::{EventError, EventResult};
use crate::transport::{Delivery, EventTransport, Headers, ROUTING_KEY_HEADER};

struct NatsQueue {
    sender: Option<mpsc::UnboundedSender<Delivery>>,
    receiver: Option<mpsc::UnboundedReceiver<Delivery>>,
    forwarders: Vec<JoinHandle<()>>,
}

/// [`EventTransport`] over a NATS connection
#[derive(Clone)]
pub struct NatsTransport {
    client: async_nats::Client,
    subject_root: String,
    queues: Arc<Mutex<HashMap<String, NatsQueue>>>,
}

impl NatsTransport {
    /// Connect to NATS with the given configuration
    pub async fn connect(config: &EventBusConfig) -> EventResult<Self> {
        let options = async_nats::ConnectOptions::new()
            .name(&config.client_name)
            .connection_timeout(config.connect_timeout);

        let client = async_nats::connect_with_options(config.servers.join(","), options)
            .await
            .map_err(|e| EventError::Transport(e.to_string()))?;

        info!(servers = ?config.servers, "Connected to NATS");

        Ok(Self {
            client,
            subject_root: config.subject_root(),
            queues: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// Wrap an already-connected client
    pub fn with_client(client: async_nats::Client, config: &EventBusConfig) -> Self {
        Self {
            client,
            subject_root: config.subject_root(),
            queues: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn prefixed(&self, key: &str) -> String {
        format!("{}.{}", self.subject_root, key)
    }

}

/// NATS subjects covering a routing pattern under a subject root
///
/// A trailing `#` becomes two subjects: the bare head (zero extra segments)
/// and the `>` form (one or more).
fn subjects_for_pattern(subject_root: &str, pattern: &str) -> Vec<String> {
    match pattern.strip_suffix(".#") {
        Some(head) => vec![
            format!("{subject_root}.{head}"),
            format!("{subject_root}.{head}.>"),
        ],
        None => vec![format!("{subject_root}.{pattern}")],
    }
}

#[async_trait]
impl EventTransport for NatsTransport {
    async fn send(&self, routing_key: &str, payload: Bytes) -> EventResult<()> {
        let subject = self.prefixed(routing_key);
        self.client
            .publish(subject.clone(), payload)
            .await
            .map_err(|e| EventError::Transport(e.to_string()))?;
        debug!(subject = %subject, "Published message");
        Ok(())
    }

    async fn bind(&self, pattern: &str, queue: &str) -> EventResult<()> {
        let subjects = subjects_for_pattern(&self.subject_root, pattern);

        let mut subscribers = Vec::with_capacity(subjects.len());
        for subject in &subjects {
            let subscriber = self
                .client
                .subscribe(subject.clone())
                .await
                .map_err(|e| EventError::Transport(e.to_string()))?;
            subscribers.push(subscriber);
        }

        let mut queues = self
            .queues
            .lock()
            .map_err(|_| EventError::Transport("transport state poisoned".to_string()))?;
        let entry = queues.entry(queue.to_string()).or_insert_with(|| {
            let (sender, receiver) = mpsc::unbounded_channel();
            NatsQueue {
                sender: Some(sender),
                receiver: Some(receiver),
                forwarders: Vec::new(),
            }
        });
        let Some(sender) = entry.sender.clone() else {
            return Err(EventError::Transport(format!(
                "queue already stopped: {queue}"
            )));
        };

        for mut subscriber in subscribers {
            let sender = sender.clone();
            let root = self.subject_root.clone();
            entry.forwarders.push(tokio::spawn(async move {
                while let Some(message) = subscriber.next().await {
                    let routing_key = message
                        .subject
                        .as_str()
                        .strip_prefix(&root)
                        .and_then(|s| s.strip_prefix('.'))
                        .unwrap_or(message.subject.as_str())
                        .to_string();
                    let mut headers = Headers::new();
                    headers.insert(ROUTING_KEY_HEADER.to_string(), routing_key.clone());
                    let delivery = Delivery {
                        routing_key,
                        payload: message.payload,
                        headers,
                    };
                    if sender.send(delivery).is_err() {
                        break;
                    }
                }
            }));
        }

        info!(queue = %queue, pattern = %pattern, subjects = ?subjects, "Bound pattern");
        Ok(())
    }

    async fn start_consume(&self, queue: &str) -> EventResult<BoxStream<'static, Delivery>> {
        let mut queues = self
            .queues
            .lock()
            .map_err(|_| EventError::Transport("transport state poisoned".to_string()))?;
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
            .map_err(|_| EventError::Transport("transport state poisoned".to_string()))?;
        if let Some(entry) = queues.get_mut(queue) {
            entry.sender = None;
            // Aborting drops the NATS subscribers, which unsubscribes them
            for forwarder in entry.forwarders.drain(..) {
                forwarder.abort();
            }
        } else {
            warn!(queue = %queue, "stop_consume on unknown queue");
        }
        Ok(())
    }

    async fn close(&self, queue: &str) -> EventResult<()> {
        self.stop_consume(queue).await?;
        let mut queues = self
            .queues
            .lock()
            .map_err(|_| EventError::Transport("transport state poisoned".to_string()))?;
        queues.remove(queue);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_open_tail_pattern_binds_two_subjects() {
        assert_eq!(
            subjects_for_pattern("cim.events", "ResourceEvent.specific.#"),
            vec![
                "cim.events.ResourceEvent.specific".to_string(),
                "cim.events.ResourceEvent.specific.>".to_string(),
            ]
        );
    }

    #[test]
    fn test_explicit_pattern_binds_one_subject() {
        assert_eq!(
            subjects_for_pattern("cim.events", "ResourceModifiedEvent.*.st1.*"),
            vec!["cim.events.ResourceModifiedEvent.*.st1.*".to_string()]
        );
    }
}
