// Copyright (c) 2025 - Cowboy AI, Inc.

//! Event bus configuration
//!
//! All names and addresses are supplied explicitly by the owning process;
//! nothing in this crate reads ambient globals.

use std::time::Duration;

/// Configuration for the event bus
#[derive(Debug, Clone)]
pub struct EventBusConfig {
    /// System name scoping every broker subject (`{system_name}.events.…`)
    pub system_name: String,

    /// Broker server URLs
    pub servers: Vec<String>,

    /// Client name reported to the broker
    pub client_name: String,

    /// Broker connection timeout
    pub connect_timeout: Duration,

    /// How long a caller waits for a subscription bind to take effect
    pub ready_timeout: Duration,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            system_name: "cim".to_string(),
            servers: vec!["nats://localhost:4222".to_string()],
            client_name: "cim-events".to_string(),
            connect_timeout: Duration::from_secs(10),
            ready_timeout: Duration::from_secs(5),
        }
    }
}

impl EventBusConfig {
    /// Root of the broker subject space for this system
    pub fn subject_root(&self) -> String {
        format!("{}.events", self.system_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subject_root() {
        let config = EventBusConfig {
            system_name: "ion".to_string(),
            ..Default::default()
        };
        assert_eq!(config.subject_root(), "ion.events");
    }
}
