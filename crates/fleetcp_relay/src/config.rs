//! Relay configuration.

use std::time::Duration;

/// Configuration for a relay node.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Identifier reported in acknowledgements and events.
    pub relay_id: String,
    /// Timeout handed to the executor for each directive.
    pub call_timeout: Duration,
}

impl RelayConfig {
    /// Creates a new relay configuration.
    pub fn new(relay_id: impl Into<String>) -> Self {
        Self {
            relay_id: relay_id.into(),
            call_timeout: Duration::from_secs(5),
        }
    }

    /// Sets the executor call timeout.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self::new("relay")
    }
}
