//! Relay nodes.

use crate::broker::MemoryBroker;
use crate::config::RelayConfig;
use crate::error::RelayResult;
use fleetcp_engine::RemoteExecutor;
use fleetcp_protocol::{PublishEnvelope, SyncEvent};
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

/// A relay between the controller and a group of workers.
///
/// The relay receives directives from the broker's fan-out channel, runs
/// them through its executor and streams events back on the directive's
/// ephemeral topic.
pub struct Relay {
    config: RelayConfig,
    broker: Arc<MemoryBroker>,
    executor: Arc<dyn RemoteExecutor>,
}

impl Relay {
    /// Creates a relay.
    pub fn new(
        config: RelayConfig,
        broker: Arc<MemoryBroker>,
        executor: Arc<dyn RemoteExecutor>,
    ) -> Self {
        Self {
            config,
            broker,
            executor,
        }
    }

    /// Returns the relay id.
    pub fn id(&self) -> &str {
        &self.config.relay_id
    }

    /// Registers the relay with its broker and serves directives on a thread.
    ///
    /// The thread exits when the relay is deregistered from the broker.
    pub fn spawn(self) -> RelayResult<RelayHandle> {
        let inbox = self.broker.register_relay(&self.config.relay_id)?;
        let relay_id = self.config.relay_id.clone();
        let thread = thread::Builder::new()
            .name(format!("relay-{}", relay_id))
            .spawn(move || self.serve(inbox))?;
        Ok(RelayHandle { relay_id, thread })
    }

    fn serve(self, inbox: Receiver<Vec<u8>>) {
        info!("Relay {} started", self.id());
        while let Ok(payload) = inbox.recv() {
            if let Err(e) = self.handle(&payload) {
                warn!("Relay {} dropped a directive: {}", self.id(), e);
            }
        }
        info!("Relay {} stopped", self.id());
    }

    /// Handles one directive from the fan-out channel.
    pub fn handle(&self, payload: &[u8]) -> RelayResult<()> {
        let envelope = PublishEnvelope::decode(payload)?;
        self.broker.ack(self.id());

        let topic = envelope.ephemeral_topic.as_str();
        self.emit(topic, &SyncEvent::ping(self.id()))?;

        match self.executor.receive_files(
            &envelope.target,
            envelope.files(),
            envelope.dest(),
            self.config.call_timeout,
        ) {
            Ok(result) => {
                let data = if result.is_empty() { None } else { Some(result) };
                self.emit(topic, &SyncEvent::DataResult(data))?;
                self.emit(topic, &SyncEvent::work(self.id()))?;
            }
            Err(e) => {
                warn!("Relay {} failed directive on {}: {}", self.id(), topic, e);
                self.emit(topic, &SyncEvent::interrupt(self.id()))?;
            }
        }
        Ok(())
    }

    fn emit(&self, topic: &str, event: &SyncEvent) -> RelayResult<()> {
        let reached = self.broker.publish(topic, &event.encode()?);
        debug!("Relay {} emitted {:?} to {} subscriber(s)", self.id(), event, reached);
        Ok(())
    }
}

/// Handle to a running relay thread.
pub struct RelayHandle {
    relay_id: String,
    thread: JoinHandle<()>,
}

impl RelayHandle {
    /// Returns the relay id.
    pub fn id(&self) -> &str {
        &self.relay_id
    }

    /// Deregisters the relay and waits for its thread to finish.
    pub fn shutdown(self, broker: &MemoryBroker) {
        broker.deregister_relay(&self.relay_id);
        if self.thread.join().is_err() {
            warn!("Relay {} panicked", self.relay_id);
        }
    }
}
