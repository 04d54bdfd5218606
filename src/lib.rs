//! Event notification and audit layer for the Composable Information Machine
//!
//! Components publish typed, hierarchically-scoped events; subscribers
//! register partial-specificity filters (event type, origin, dotted
//! sub-type pattern) without knowing publishers in advance. Every published
//! event can additionally be recorded in a queryable repository for audit
//! and replay.
//!
//! The transport and the repository's storage engine are collaborators
//! behind the [`transport::EventTransport`] and [`store::DocumentStore`]
//! seams; NATS and in-memory implementations ship with the crate.

pub mod config;
pub mod errors;
pub mod event;
pub mod publisher;
pub mod repository;
pub mod routing;
pub mod store;
pub mod subscriber;
pub mod transport;

// Re-export commonly used types
pub use config::EventBusConfig;
pub use errors::{EventError, EventResult};
pub use event::Event;
pub use publisher::{EventPublisher, PublishReceipt};
pub use repository::{EventQuery, EventRepository};
pub use routing::EventFilter;
pub use subscriber::{EventCallback, EventSubscriber, FnCallback, SubscriberState};
pub use transport::{Delivery, EventTransport, Headers, MemoryTransport, NatsTransport};
