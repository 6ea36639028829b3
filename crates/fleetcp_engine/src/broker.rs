//! Pub/sub broker abstraction used by the barrier.

use crate::error::EngineResult;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

/// A subscription to one topic.
///
/// Messages arrive in the order the broker delivered them. The stream ends
/// when the broker drops the sending side.
#[derive(Debug)]
pub struct Subscription {
    /// The subscribed topic.
    pub topic: String,
    /// Raw message payloads.
    pub receiver: UnboundedReceiver<Vec<u8>>,
}

impl Subscription {
    /// Creates a subscription.
    pub fn new(topic: impl Into<String>, receiver: UnboundedReceiver<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            receiver,
        }
    }

    /// Waits for the next message.
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        self.receiver.recv().await
    }
}

/// A publish/subscribe broker with a fan-out channel to relay nodes.
pub trait Broker: Send + Sync {
    /// Subscribes to `topic`.
    fn subscribe(&self, topic: &str) -> EngineResult<Subscription>;

    /// Publishes `payload` on the fan-out channel consumed by relays.
    fn publish_fanout(&self, payload: Vec<u8>) -> EngineResult<()>;

    /// Blocks until relays acknowledge the last publish or `timeout` elapses.
    ///
    /// Returns the ids of the relays that acknowledged.
    fn pull_accept(&self, timeout: Duration) -> EngineResult<Vec<String>>;

    /// Drops the subscription to `topic`.
    fn unsubscribe(&self, _topic: &str) {}
}
