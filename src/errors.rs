//! Error types for the event layer

use thiserror::Error;

/// Errors that can occur in event layer operations
#[derive(Debug, Error)]
pub enum EventError {
    /// Malformed publish arguments (e.g. missing event type)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Subscriber lifecycle misuse (double activate, stop before start)
    #[error("State error: {0}")]
    State(String),

    /// Repository lookup miss
    #[error("Not found: {0}")]
    NotFound(String),

    /// Transport send/bind/consume failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Repository read/write failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Payload serialization or deserialization failure
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Bounded wait expired
    #[error("Operation timed out: {0}")]
    Timeout(String),
}

/// Result type for event layer operations
pub type EventResult<T> = Result<T, EventError>;

impl From<serde_json::Error> for EventError {
    fn from(err: serde_json::Error) -> Self {
        EventError::Serialization(err.to_string())
    }
}
