//! In-process pub/sub broker.

use crate::error::{RelayError, RelayResult};
use fleetcp_engine::{Broker, EngineResult, Subscription};
use parking_lot::{Condvar, Mutex};
use std::collections::{BTreeMap, HashMap};
use std::sync::mpsc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};
use tracing::{debug, trace, warn};

struct RelayInbox {
    sender: mpsc::Sender<Vec<u8>>,
    online: bool,
}

/// Acknowledgements for the most recent fan-out publish.
#[derive(Default)]
struct AckState {
    expected: usize,
    acked: Vec<String>,
}

/// A broker that keeps every topic and relay inbox in memory.
///
/// Topic delivery is best-effort: a message published on a topic nobody
/// subscribed to is dropped.
#[derive(Default)]
pub struct MemoryBroker {
    topics: Mutex<HashMap<String, Vec<UnboundedSender<Vec<u8>>>>>,
    relays: Mutex<BTreeMap<String, RelayInbox>>,
    acks: Mutex<AckState>,
    ack_signal: Condvar,
}

impl MemoryBroker {
    /// Creates an empty broker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a relay and returns its inbox.
    pub fn register_relay(&self, relay_id: &str) -> RelayResult<mpsc::Receiver<Vec<u8>>> {
        let mut relays = self.relays.lock();
        if relays.contains_key(relay_id) {
            return Err(RelayError::DuplicateRelay(relay_id.to_string()));
        }
        let (sender, receiver) = mpsc::channel();
        relays.insert(
            relay_id.to_string(),
            RelayInbox {
                sender,
                online: true,
            },
        );
        debug!("Registered relay {}", relay_id);
        Ok(receiver)
    }

    /// Removes a relay; its inbox closes.
    pub fn deregister_relay(&self, relay_id: &str) {
        self.relays.lock().remove(relay_id);
    }

    /// Marks a relay as reachable or not. Offline relays receive nothing.
    pub fn set_online(&self, relay_id: &str, online: bool) {
        if let Some(inbox) = self.relays.lock().get_mut(relay_id) {
            inbox.online = online;
        }
    }

    /// Returns the registered relay ids.
    pub fn relays(&self) -> Vec<String> {
        self.relays.lock().keys().cloned().collect()
    }

    /// Records that `relay_id` received the last fan-out publish.
    pub fn ack(&self, relay_id: &str) {
        let mut acks = self.acks.lock();
        if !acks.acked.iter().any(|id| id == relay_id) {
            acks.acked.push(relay_id.to_string());
        }
        self.ack_signal.notify_all();
    }

    /// Publishes `payload` on `topic`. Returns the number of subscribers reached.
    pub fn publish(&self, topic: &str, payload: &[u8]) -> usize {
        let mut topics = self.topics.lock();
        let Some(subscribers) = topics.get_mut(topic) else {
            trace!("Dropping message for {} without subscribers", topic);
            return 0;
        };
        subscribers.retain(|sender| sender.send(payload.to_vec()).is_ok());
        subscribers.len()
    }

    /// Returns the number of live subscribers on `topic`.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics.lock().get(topic).map_or(0, Vec::len)
    }

    /// Closes every subscription on `topic`.
    pub fn close_topic(&self, topic: &str) {
        self.topics.lock().remove(topic);
    }
}

impl Broker for MemoryBroker {
    fn subscribe(&self, topic: &str) -> EngineResult<Subscription> {
        let (sender, receiver) = unbounded_channel();
        self.topics
            .lock()
            .entry(topic.to_string())
            .or_default()
            .push(sender);
        Ok(Subscription::new(topic, receiver))
    }

    fn publish_fanout(&self, payload: Vec<u8>) -> EngineResult<()> {
        // Reset before delivery so fast relays cannot ack into the old round.
        let mut acks = self.acks.lock();
        *acks = AckState::default();

        let mut relays = self.relays.lock();
        let mut delivered = 0;
        relays.retain(|id, inbox| {
            if !inbox.online {
                return true;
            }
            match inbox.sender.send(payload.clone()) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(_) => {
                    warn!("Relay {} is gone", id);
                    false
                }
            }
        });
        acks.expected = delivered;
        debug!("Fan-out delivered to {} relay(s)", delivered);
        Ok(())
    }

    fn pull_accept(&self, timeout: Duration) -> EngineResult<Vec<String>> {
        let deadline = Instant::now() + timeout;
        let mut acks = self.acks.lock();
        while acks.acked.len() < acks.expected {
            if self.ack_signal.wait_until(&mut acks, deadline).timed_out() {
                warn!(
                    "{} of {} relay(s) acknowledged before timeout",
                    acks.acked.len(),
                    acks.expected
                );
                break;
            }
        }
        Ok(std::mem::take(&mut acks.acked))
    }

    fn unsubscribe(&self, topic: &str) {
        self.close_topic(topic);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn publish_reaches_subscribers() {
        let broker = MemoryBroker::new();
        let mut subscription = broker.subscribe("cp_1").unwrap();
        assert_eq!(broker.publish("cp_1", b"hello"), 1);
        assert_eq!(broker.publish("cp_2", b"lost"), 0);
        assert_eq!(subscription.receiver.try_recv().unwrap(), b"hello");

        broker.unsubscribe("cp_1");
        assert_eq!(broker.subscriber_count("cp_1"), 0);
    }

    #[test]
    fn fanout_skips_offline_relays() {
        let broker = MemoryBroker::new();
        let online = broker.register_relay("r1").unwrap();
        let offline = broker.register_relay("r2").unwrap();
        broker.set_online("r2", false);

        broker.publish_fanout(b"directive".to_vec()).unwrap();
        assert_eq!(online.try_recv().unwrap(), b"directive");
        assert!(offline.try_recv().is_err());
    }

    #[test]
    fn duplicate_relay_is_rejected() {
        let broker = MemoryBroker::new();
        let _inbox = broker.register_relay("r1").unwrap();
        assert!(matches!(
            broker.register_relay("r1"),
            Err(RelayError::DuplicateRelay(_))
        ));
    }

    #[test]
    fn pull_accept_waits_for_acks() {
        let broker = Arc::new(MemoryBroker::new());
        let inbox = broker.register_relay("r1").unwrap();
        broker.publish_fanout(b"directive".to_vec()).unwrap();

        let relay_side = Arc::clone(&broker);
        let handle = thread::spawn(move || {
            inbox.recv().unwrap();
            relay_side.ack("r1");
            relay_side.ack("r1");
        });

        let accepted = broker.pull_accept(Duration::from_secs(5)).unwrap();
        handle.join().unwrap();
        assert_eq!(accepted, ["r1"]);
    }

    #[test]
    fn pull_accept_times_out_with_partial_acks() {
        let broker = MemoryBroker::new();
        let _r1 = broker.register_relay("r1").unwrap();
        let _r2 = broker.register_relay("r2").unwrap();
        broker.publish_fanout(b"directive".to_vec()).unwrap();
        broker.ack("r2");

        let accepted = broker.pull_accept(Duration::from_millis(50)).unwrap();
        assert_eq!(accepted, ["r2"]);
    }

    #[test]
    fn dropped_relay_is_forgotten() {
        let broker = MemoryBroker::new();
        drop(broker.register_relay("r1").unwrap());
        broker.publish_fanout(b"directive".to_vec()).unwrap();
        assert!(broker.relays().is_empty());
        assert!(broker.pull_accept(Duration::from_millis(10)).unwrap().is_empty());
    }
}
