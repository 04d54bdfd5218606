// Copyright (c) 2025 - Cowboy AI, Inc.

//! Event subscriber
//!
//! A subscriber binds its filter's routing pattern to the transport and
//! runs a receive loop, either on an internal worker task ([`activate`])
//! or inline on the caller's task ([`listen`]). Lifecycle:
//!
//! ```text
//! Created -> Active -> Inactive (terminal)
//! ```
//!
//! Transitions are guarded: double activation and deactivation before
//! activation are state errors, and a bind failure leaves the subscriber
//! in `Created` so the caller can retry.
//!
//! Every delivery is re-checked against the local [`EventFilter`] before
//! the callback runs; the transport's own matching only has to be at least
//! as permissive. Callback errors are logged and never terminate the loop.
//!
//! [`activate`]: EventSubscriber::activate
//! [`listen`]: EventSubscriber::listen

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::errors::{EventError, EventResult};
use crate::event::Event;
use crate::routing::EventFilter;
use crate::transport::{Delivery, EventTransport, Headers};

/// Subscriber lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriberState {
    /// Constructed, not yet bound
    Created,
    /// Bound and consuming
    Active,
    /// Stopped; terminal
    Inactive,
}

/// Callback invoked for each delivered event
#[async_trait]
pub trait EventCallback: Send + Sync {
    /// Handle one event; errors are logged by the receive loop
    async fn on_event(&self, event: Event, headers: Headers) -> EventResult<()>;
}

/// Adapter turning a plain closure into an [`EventCallback`]
pub struct FnCallback<F>
where
    F: Fn(Event, Headers) + Send + Sync,
{
    callback: F,
}

impl<F> FnCallback<F>
where
    F: Fn(Event, Headers) + Send + Sync,
{
    /// Wrap a closure
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

#[async_trait]
impl<F> EventCallback for FnCallback<F>
where
    F: Fn(Event, Headers) + Send + Sync,
{
    async fn on_event(&self, event: Event, headers: Headers) -> EventResult<()> {
        (self.callback)(event, headers);
        Ok(())
    }
}

/// Receives events matching a filter and dispatches them to a callback
pub struct EventSubscriber {
    transport: Arc<dyn EventTransport>,
    filter: EventFilter,
    callback: Arc<dyn EventCallback>,
    queue: String,
    state: Mutex<SubscriberState>,
    worker: Mutex<Option<JoinHandle<()>>>,
    ready_tx: watch::Sender<bool>,
    shutdown_tx: watch::Sender<bool>,
    stop_timeout: Duration,
}

impl EventSubscriber {
    /// Create a subscriber; nothing is bound until activation
    pub fn new(
        transport: Arc<dyn EventTransport>,
        filter: EventFilter,
        callback: Arc<dyn EventCallback>,
    ) -> Self {
        let (ready_tx, _) = watch::channel(false);
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            transport,
            filter,
            callback,
            queue: format!("evq-{}", Uuid::now_v7()),
            state: Mutex::new(SubscriberState::Created),
            worker: Mutex::new(None),
            ready_tx,
            shutdown_tx,
            stop_timeout: Duration::from_secs(5),
        }
    }

    /// Bound wait applied when joining the receive loop on deactivation
    pub fn with_stop_timeout(mut self, stop_timeout: Duration) -> Self {
        self.stop_timeout = stop_timeout;
        self
    }

    /// Current lifecycle state
    pub async fn state(&self) -> SubscriberState {
        *self.state.lock().await
    }

    /// The filter this subscriber applies locally
    pub fn filter(&self) -> &EventFilter {
        &self.filter
    }

    /// Bind the filter's pattern and consume on an internal worker task
    ///
    /// Fails with a state error unless the subscriber is `Created`; a bind
    /// failure leaves it `Created`.
    pub async fn activate(&self) -> EventResult<()> {
        let mut state = self.state.lock().await;
        let stream = self.bind_and_consume(&mut state).await?;

        let worker = tokio::spawn(receive_loop(
            stream,
            self.filter.clone(),
            Arc::clone(&self.callback),
            self.shutdown_tx.subscribe(),
            self.queue.clone(),
        ));
        *self.worker.lock().await = Some(worker);
        Ok(())
    }

    /// Bind the filter's pattern and run the receive loop on this task
    ///
    /// Blocks until the subscriber is deactivated from another task or the
    /// transport ends the stream. The ready signal fires once the bind has
    /// taken effect, before the first receive.
    pub async fn listen(&self) -> EventResult<()> {
        let stream = {
            let mut state = self.state.lock().await;
            self.bind_and_consume(&mut state).await?
        };

        receive_loop(
            stream,
            self.filter.clone(),
            Arc::clone(&self.callback),
            self.shutdown_tx.subscribe(),
            self.queue.clone(),
        )
        .await;
        Ok(())
    }

    async fn bind_and_consume(
        &self,
        state: &mut SubscriberState,
    ) -> EventResult<BoxStream<'static, Delivery>> {
        match *state {
            SubscriberState::Created => {}
            SubscriberState::Active => {
                return Err(EventError::State("subscriber already active".to_string()))
            }
            SubscriberState::Inactive => {
                return Err(EventError::State("subscriber already stopped".to_string()))
            }
        }

        let pattern = self.filter.binding_pattern();
        self.transport.bind(&pattern, &self.queue).await?;
        let stream = self.transport.start_consume(&self.queue).await?;

        *state = SubscriberState::Active;
        // send_replace stores the value even with no receiver subscribed
        // yet, so a wait_ready call after activation still sees it
        self.ready_tx.send_replace(true);
        info!(queue = %self.queue, pattern = %pattern, "Subscription active");
        Ok(stream)
    }

    /// Block until the subscription bind has taken effect
    ///
    /// A timeout is a setup failure, not a hang; callers should treat it as
    /// such and give up.
    pub async fn wait_ready(&self, timeout: Duration) -> EventResult<()> {
        let mut ready = self.ready_tx.subscribe();
        tokio::time::timeout(timeout, async move {
            while !*ready.borrow_and_update() {
                if ready.changed().await.is_err() {
                    break;
                }
            }
        })
        .await
        .map_err(|_| EventError::Timeout("subscription did not become ready".to_string()))
    }

    /// Stop consuming and end the receive loop promptly
    ///
    /// Safe to call from a task other than the one running [`listen`];
    /// fails with a state error if the subscriber was never activated.
    ///
    /// [`listen`]: EventSubscriber::listen
    pub async fn deactivate(&self) -> EventResult<()> {
        let mut state = self.state.lock().await;
        if *state != SubscriberState::Active {
            return Err(EventError::State(
                "subscriber is not active".to_string(),
            ));
        }

        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.transport.stop_consume(&self.queue).await {
            warn!(queue = %self.queue, error = %e, "stop_consume failed");
        }

        if let Some(worker) = self.worker.lock().await.take() {
            match tokio::time::timeout(self.stop_timeout, worker).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(queue = %self.queue, error = %e, "receive loop panicked"),
                Err(_) => warn!(queue = %self.queue, "receive loop did not stop in time"),
            }
        }

        *state = SubscriberState::Inactive;
        info!(queue = %self.queue, "Subscription deactivated");
        Ok(())
    }

    /// Release the transport queue, deactivating first if needed; idempotent
    pub async fn close(&self) -> EventResult<()> {
        if self.state().await == SubscriberState::Active {
            self.deactivate().await?;
        }
        self.transport.close(&self.queue).await?;
        *self.state.lock().await = SubscriberState::Inactive;
        Ok(())
    }
}

/// Consume deliveries until shutdown or end of stream
async fn receive_loop(
    mut stream: BoxStream<'static, Delivery>,
    filter: EventFilter,
    callback: Arc<dyn EventCallback>,
    mut shutdown: watch::Receiver<bool>,
    queue: String,
) {
    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            delivery = stream.next() => {
                match delivery {
                    Some(delivery) => dispatch(delivery, &filter, callback.as_ref()).await,
                    None => break,
                }
            }
        }
    }
    debug!(queue = %queue, "Receive loop exited");
}

async fn dispatch(delivery: Delivery, filter: &EventFilter, callback: &dyn EventCallback) {
    let event: Event = match serde_json::from_slice(&delivery.payload) {
        Ok(event) => event,
        Err(e) => {
            warn!(
                routing_key = %delivery.routing_key,
                error = %e,
                "Dropping undecodable delivery"
            );
            return;
        }
    };

    // Local re-check; the broker may match more coarsely than we do
    if !filter.matches_event(&event) {
        debug!(
            routing_key = %delivery.routing_key,
            event_type = %event.event_type,
            "Dropping non-matching delivery"
        );
        return;
    }

    if let Err(e) = callback.on_event(event, delivery.headers).await {
        error!(routing_key = %delivery.routing_key, error = %e, "Event callback failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryTransport;

    fn noop_subscriber(transport: Arc<MemoryTransport>) -> EventSubscriber {
        EventSubscriber::new(
            transport,
            EventFilter::new(),
            Arc::new(FnCallback::new(|_, _| {})),
        )
    }

    #[tokio::test]
    async fn test_activate_twice_is_a_state_error() {
        let sub = noop_subscriber(Arc::new(MemoryTransport::new()));
        sub.activate().await.unwrap();

        let err = sub.activate().await.unwrap_err();
        assert!(matches!(err, EventError::State(_)));
        sub.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_deactivate_before_activate_is_a_state_error() {
        let sub = noop_subscriber(Arc::new(MemoryTransport::new()));
        let err = sub.deactivate().await.unwrap_err();
        assert!(matches!(err, EventError::State(_)));
        assert_eq!(sub.state().await, SubscriberState::Created);
    }

    #[tokio::test]
    async fn test_lifecycle_is_terminal() {
        let sub = noop_subscriber(Arc::new(MemoryTransport::new()));
        sub.activate().await.unwrap();
        sub.deactivate().await.unwrap();
        assert_eq!(sub.state().await, SubscriberState::Inactive);

        let err = sub.activate().await.unwrap_err();
        assert!(matches!(err, EventError::State(_)));
    }

    #[tokio::test]
    async fn test_wait_ready_after_activation_returns_immediately() {
        let sub = noop_subscriber(Arc::new(MemoryTransport::new()));
        sub.activate().await.unwrap();
        assert_eq!(sub.state().await, SubscriberState::Active);

        // the ready value must be observable by receivers subscribing
        // only after the bind completed
        sub.wait_ready(Duration::from_millis(300)).await.unwrap();
        sub.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_wait_ready_times_out_before_activation() {
        let sub = noop_subscriber(Arc::new(MemoryTransport::new()));
        let err = sub
            .wait_ready(Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, EventError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let sub = noop_subscriber(Arc::new(MemoryTransport::new()));
        sub.activate().await.unwrap();
        sub.close().await.unwrap();
        sub.close().await.unwrap();
        assert_eq!(sub.state().await, SubscriberState::Inactive);
    }

    /// Transport whose bind always fails
    struct UnbindableTransport;

    #[async_trait]
    impl EventTransport for UnbindableTransport {
        async fn send(&self, _routing_key: &str, _payload: bytes::Bytes) -> EventResult<()> {
            Ok(())
        }

        async fn bind(&self, _pattern: &str, _queue: &str) -> EventResult<()> {
            Err(EventError::Transport("broker unreachable".to_string()))
        }

        async fn start_consume(
            &self,
            _queue: &str,
        ) -> EventResult<BoxStream<'static, Delivery>> {
            Ok(futures::stream::empty().boxed())
        }

        async fn stop_consume(&self, _queue: &str) -> EventResult<()> {
            Ok(())
        }

        async fn close(&self, _queue: &str) -> EventResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_bind_failure_leaves_created() {
        let sub = EventSubscriber::new(
            Arc::new(UnbindableTransport),
            EventFilter::new(),
            Arc::new(FnCallback::new(|_, _| {})),
        );

        let err = sub.activate().await.unwrap_err();
        assert!(matches!(err, EventError::Transport(_)));
        assert_eq!(sub.state().await, SubscriberState::Created);

        // Still retryable: bind failure must not half-activate
        let err = sub.deactivate().await.unwrap_err();
        assert!(matches!(err, EventError::State(_)));
    }
}
