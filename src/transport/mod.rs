// Copyright (c) 2025 - Cowboy AI, Inc.

//! Transport seam between the event layer and a message broker
//!
//! The event layer depends on five broker operations and nothing else:
//! `send`, `bind`, `start_consume`, `stop_consume`, and `close`. The NATS
//! implementation is the production path; the in-memory implementation backs
//! tests and single-process embedders.
//!
//! A broker's server-side matching only has to be at least as permissive as
//! the crate's own topic matcher; subscribers re-check every delivery
//! locally, so an over-delivering broker is harmless.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use std::collections::HashMap;

use crate::errors::EventResult;

pub mod memory;
pub mod nats;

pub use memory::MemoryTransport;
pub use nats::NatsTransport;

/// Message headers delivered alongside a payload
pub type Headers = HashMap<String, String>;

/// Header carrying the routing key the message was published under
pub const ROUTING_KEY_HEADER: &str = "routing-key";

/// A message handed to a consuming subscriber
#[derive(Debug, Clone)]
pub struct Delivery {
    /// Routing key the message was published under
    pub routing_key: String,

    /// Serialized event payload
    pub payload: Bytes,

    /// Broker headers, including [`ROUTING_KEY_HEADER`]
    pub headers: Headers,
}

/// Broker operations consumed by publishers and subscribers
#[async_trait]
pub trait EventTransport: Send + Sync {
    /// Publish a payload under a routing key; fire-and-forget
    async fn send(&self, routing_key: &str, payload: Bytes) -> EventResult<()>;

    /// Bind a routing pattern to a named queue
    async fn bind(&self, pattern: &str, queue: &str) -> EventResult<()>;

    /// Begin consuming a queue, yielding deliveries in arrival order
    async fn start_consume(&self, queue: &str) -> EventResult<BoxStream<'static, Delivery>>;

    /// Stop consuming a queue; ends the delivery stream promptly
    async fn stop_consume(&self, queue: &str) -> EventResult<()>;

    /// Release the queue's broker resources; idempotent
    async fn close(&self, queue: &str) -> EventResult<()>;
}
