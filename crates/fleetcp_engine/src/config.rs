//! Barrier configuration.

use std::time::Duration;

/// How control events are counted towards completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CountingMode {
    /// Track which accepted participants pinged and finished.
    ///
    /// Duplicate events from one participant count once.
    #[default]
    Deduplicated,
    /// Plain counters: pings from accepted participants and every
    /// work or interrupt event.
    ///
    /// A participant that pings twice keeps the counters apart forever.
    Raw,
}

/// Configuration for the fleet sync barrier.
#[derive(Debug, Clone)]
pub struct BarrierConfig {
    /// How long to listen for events before giving up. `None` waits forever.
    pub deadline: Option<Duration>,
    /// How long to wait for relays to acknowledge the directive.
    ///
    /// When unset, the copy configuration's acceptance timeout is used.
    pub accept_timeout: Option<Duration>,
    /// Counting rule for the completion check.
    pub counting: CountingMode,
}

impl Default for BarrierConfig {
    fn default() -> Self {
        Self {
            deadline: Some(Duration::from_secs(300)),
            accept_timeout: None,
            counting: CountingMode::Deduplicated,
        }
    }
}

impl BarrierConfig {
    /// Creates a new barrier config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the listen deadline.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Listens until every participant finished, without a deadline.
    #[must_use]
    pub fn without_deadline(mut self) -> Self {
        self.deadline = None;
        self
    }

    /// Sets the acknowledgement timeout.
    #[must_use]
    pub fn with_accept_timeout(mut self, timeout: Duration) -> Self {
        self.accept_timeout = Some(timeout);
        self
    }

    /// Sets the counting mode.
    #[must_use]
    pub fn with_counting(mut self, counting: CountingMode) -> Self {
        self.counting = counting;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = BarrierConfig::default();
        assert_eq!(config.deadline, Some(Duration::from_secs(300)));
        assert_eq!(config.counting, CountingMode::Deduplicated);
        assert!(config.accept_timeout.is_none());
    }

    #[test]
    fn builder() {
        let config = BarrierConfig::new()
            .without_deadline()
            .with_accept_timeout(Duration::from_secs(2))
            .with_counting(CountingMode::Raw);
        assert!(config.deadline.is_none());
        assert_eq!(config.accept_timeout, Some(Duration::from_secs(2)));
        assert_eq!(config.counting, CountingMode::Raw);
    }
}
