//! Fleet-wide completion barrier over pub/sub.
//!
//! The barrier publishes one directive for the whole operation and then
//! listens on a per-operation topic until every relay that accepted the
//! directive has announced itself (`Ping`) and finished (`Work` or
//! `Interrupt`). Partial results (`DataResult`) are handed to a sink as
//! they arrive.
//!
//! ```text
//! Init -> Subscribed -> Published -> Accepted -> Listening -> Complete
//!                                                    |-> TimedOut
//!                                                    '-> Cancelled
//! ```

use crate::broker::{Broker, Subscription};
use crate::config::{BarrierConfig, CountingMode};
use crate::error::{EngineError, EngineResult};
use fleetcp_core::CopyConfig;
use fleetcp_protocol::{EventKind, FileMap, PublishEnvelope, SyncEvent, TransferResult};
use parking_lot::RwLock;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Phase of a barrier run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BarrierPhase {
    /// Nothing happened yet.
    #[default]
    Init,
    /// Subscribed to the ephemeral topic.
    Subscribed,
    /// The directive was published.
    Published,
    /// Relays acknowledged the directive.
    Accepted,
    /// Consuming events.
    Listening,
    /// Every accepted participant finished.
    Complete,
    /// The deadline elapsed first.
    TimedOut,
    /// The run was cancelled.
    Cancelled,
}

impl BarrierPhase {
    /// Returns true if the run has ended.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BarrierPhase::Complete | BarrierPhase::TimedOut | BarrierPhase::Cancelled
        )
    }
}

/// Completion bookkeeping, mutated only by the listen loop.
#[derive(Debug, Clone)]
pub struct BarrierState {
    counting: CountingMode,
    accepted: BTreeSet<String>,
    pinged: BTreeSet<String>,
    finished: BTreeSet<String>,
    interrupted: BTreeSet<String>,
    unannounced: BTreeSet<String>,
    ping_count: u64,
    work_count: u64,
    complete: bool,
}

impl BarrierState {
    /// Creates the state for a set of accepted participants.
    pub fn new(counting: CountingMode, accepted: impl IntoIterator<Item = String>) -> Self {
        let mut state = Self {
            counting,
            accepted: accepted.into_iter().collect(),
            pinged: BTreeSet::new(),
            finished: BTreeSet::new(),
            interrupted: BTreeSet::new(),
            unannounced: BTreeSet::new(),
            ping_count: 0,
            work_count: 0,
            complete: false,
        };
        state.complete = state.reconciled();
        state
    }

    /// Applies one control event.
    pub fn apply(&mut self, kind: EventKind, worker_id: &str) {
        let accepted = self.accepted.contains(worker_id);
        match kind {
            EventKind::Ping => {
                if accepted {
                    self.ping_count += 1;
                    self.pinged.insert(worker_id.to_string());
                }
            }
            EventKind::Work | EventKind::Interrupt => {
                self.work_count += 1;
                if accepted {
                    if self.pinged.contains(worker_id) {
                        self.finished.insert(worker_id.to_string());
                        if kind == EventKind::Interrupt {
                            self.interrupted.insert(worker_id.to_string());
                        }
                    } else {
                        warn!("{} finished before announcing itself", worker_id);
                        self.unannounced.insert(worker_id.to_string());
                    }
                }
                // Only a finishing event can end the barrier.
                self.complete = self.complete || self.reconciled();
            }
        }
    }

    /// Returns true once every accepted participant is accounted for.
    ///
    /// Completion is decided when a `Work` or `Interrupt` arrives; a late
    /// `Ping` never completes the barrier.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    fn reconciled(&self) -> bool {
        match self.counting {
            CountingMode::Deduplicated => {
                self.pinged == self.accepted && self.finished == self.accepted
            }
            CountingMode::Raw => {
                self.ping_count == self.work_count
                    && self.work_count == self.accepted.len() as u64
            }
        }
    }

    /// Returns the number of counted pings.
    pub fn ping_count(&self) -> u64 {
        self.ping_count
    }

    /// Returns the number of work and interrupt events.
    pub fn work_count(&self) -> u64 {
        self.work_count
    }
}

/// What a barrier run observed.
#[derive(Debug, Clone, Default)]
pub struct BarrierReport {
    /// Phase the run ended in.
    pub phase: BarrierPhase,
    /// Ephemeral topic of the run.
    pub topic: String,
    /// Relays that acknowledged the directive.
    pub accepted: BTreeSet<String>,
    /// Accepted participants that pinged.
    pub pinged: BTreeSet<String>,
    /// Accepted participants that finished or were interrupted.
    pub finished: BTreeSet<String>,
    /// Accepted participants that were interrupted.
    pub interrupted: BTreeSet<String>,
    /// Accepted participants that finished before they pinged.
    pub unannounced: BTreeSet<String>,
    /// Counted pings.
    pub ping_count: u64,
    /// Counted work and interrupt events.
    pub work_count: u64,
    /// Messages that could not be decoded.
    pub decode_errors: u64,
    /// Every result received, merged.
    pub results: TransferResult,
}

impl BarrierReport {
    fn absorb(&mut self, state: &BarrierState) {
        self.accepted = state.accepted.clone();
        self.pinged = state.pinged.clone();
        self.finished = state.finished.clone();
        self.interrupted = state.interrupted.clone();
        self.unannounced = state.unannounced.clone();
        self.ping_count = state.ping_count;
        self.work_count = state.work_count;
    }

    /// Returns the accepted participants that never finished.
    pub fn missing(&self) -> BTreeSet<String> {
        self.accepted.difference(&self.finished).cloned().collect()
    }
}

/// Publishes one directive and waits for the fleet to finish it.
pub struct FleetSyncBarrier<B: Broker> {
    broker: Arc<B>,
    config: BarrierConfig,
    phase: RwLock<BarrierPhase>,
    cancelled: AtomicBool,
    cancel_notify: Notify,
}

impl<B: Broker + 'static> FleetSyncBarrier<B> {
    /// Creates a barrier over a broker.
    pub fn new(broker: Arc<B>, config: BarrierConfig) -> Self {
        Self {
            broker,
            config,
            phase: RwLock::new(BarrierPhase::Init),
            cancelled: AtomicBool::new(false),
            cancel_notify: Notify::new(),
        }
    }

    /// Gets the configuration.
    pub fn config(&self) -> &BarrierConfig {
        &self.config
    }

    /// Gets the current phase.
    pub fn phase(&self) -> BarrierPhase {
        *self.phase.read()
    }

    fn set_phase(&self, phase: BarrierPhase) {
        debug!("Barrier phase {:?}", phase);
        *self.phase.write() = phase;
    }

    /// Cancels a running barrier.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.cancel_notify.notify_one();
    }

    /// Runs the barrier for one copy operation.
    ///
    /// Every `DataResult` is passed to `sink` when it arrives. On success the
    /// returned report holds all results; on deadline or a closed stream the
    /// error carries the partial report.
    pub async fn run<F>(
        &self,
        copy: &CopyConfig,
        files: FileMap,
        mut sink: F,
    ) -> EngineResult<BarrierReport>
    where
        F: FnMut(&TransferResult),
    {
        let current = self.phase();
        if current != BarrierPhase::Init && !current.is_terminal() {
            return Err(EngineError::InvalidStateTransition {
                from: format!("{:?}", current),
                to: "Subscribed".into(),
            });
        }
        self.cancelled.store(false, Ordering::SeqCst);

        let mut report = BarrierReport {
            topic: format!("cp_{}", Uuid::new_v4().simple()),
            ..BarrierReport::default()
        };

        // Subscribe before publishing so no event can be missed.
        let mut subscription = self.broker.subscribe(&report.topic)?;
        self.set_phase(BarrierPhase::Subscribed);

        let envelope = PublishEnvelope::file_copy(
            copy.target.clone(),
            copy,
            files,
            copy.dest.as_str(),
            report.topic.as_str(),
        )?;
        if let Err(e) = self.broker.publish_fanout(envelope.encode()?) {
            self.broker.unsubscribe(&report.topic);
            return Err(e);
        }
        self.set_phase(BarrierPhase::Published);

        let accept_timeout = self.config.accept_timeout.unwrap_or(copy.accept_timeout());
        let broker = Arc::clone(&self.broker);
        let accepted = tokio::task::spawn_blocking(move || broker.pull_accept(accept_timeout))
            .await
            .map_err(|e| EngineError::broker(format!("acceptance task failed: {e}")))
            .and_then(|accepted| accepted);
        let accepted = match accepted {
            Ok(accepted) => accepted,
            Err(e) => {
                self.broker.unsubscribe(&report.topic);
                return Err(e);
            }
        };
        info!(
            "{} relay(s) accepted the directive on {}",
            accepted.len(),
            report.topic
        );
        self.set_phase(BarrierPhase::Accepted);

        let mut state = BarrierState::new(self.config.counting, accepted);
        report.absorb(&state);
        self.set_phase(BarrierPhase::Listening);

        let outcome = self
            .listen(&mut subscription, &mut state, &mut report, &mut sink)
            .await;
        self.broker.unsubscribe(&report.topic);
        report.absorb(&state);

        match outcome {
            Listen::Complete => {
                report.phase = BarrierPhase::Complete;
                self.set_phase(BarrierPhase::Complete);
                info!(
                    "Barrier complete: {} participant(s), {} decode error(s)",
                    report.finished.len(),
                    report.decode_errors
                );
                Ok(report)
            }
            Listen::Deadline => {
                report.phase = BarrierPhase::TimedOut;
                self.set_phase(BarrierPhase::TimedOut);
                warn!("Barrier deadline elapsed; missing {:?}", report.missing());
                Err(EngineError::BarrierTimeout {
                    report: Box::new(report),
                })
            }
            Listen::Closed => {
                report.phase = BarrierPhase::TimedOut;
                self.set_phase(BarrierPhase::TimedOut);
                warn!("Event stream closed; missing {:?}", report.missing());
                Err(EngineError::StreamClosed {
                    report: Box::new(report),
                })
            }
            Listen::Cancelled => {
                report.phase = BarrierPhase::Cancelled;
                self.set_phase(BarrierPhase::Cancelled);
                Err(EngineError::Cancelled)
            }
        }
    }

    async fn listen<F>(
        &self,
        subscription: &mut Subscription,
        state: &mut BarrierState,
        report: &mut BarrierReport,
        sink: &mut F,
    ) -> Listen
    where
        F: FnMut(&TransferResult),
    {
        let deadline = self.config.deadline.map(|d| Instant::now() + d);

        loop {
            if state.is_complete() {
                return Listen::Complete;
            }
            if self.cancelled.load(Ordering::SeqCst) {
                return Listen::Cancelled;
            }

            let expiry = async {
                match deadline {
                    Some(deadline) => tokio::time::sleep_until(deadline).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                message = subscription.recv() => {
                    let Some(bytes) = message else {
                        return Listen::Closed;
                    };
                    match SyncEvent::decode(&bytes) {
                        Ok(SyncEvent::DataResult(Some(result))) => {
                            sink(&result);
                            report.results.merge(result);
                        }
                        Ok(SyncEvent::DataResult(None)) => {
                            debug!("Empty data result on {}", subscription.topic);
                        }
                        Ok(event) => {
                            if let Some((kind, worker_id)) = event.as_control() {
                                debug!("{:?} from {}", kind, worker_id);
                                state.apply(kind, worker_id);
                            }
                        }
                        Err(e) => {
                            report.decode_errors += 1;
                            warn!("Skipping undecodable event on {}: {}", subscription.topic, e);
                        }
                    }
                }
                _ = expiry => return Listen::Deadline,
                _ = self.cancel_notify.notified() => {}
            }
        }
    }
}

enum Listen {
    Complete,
    Deadline,
    Closed,
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetcp_protocol::{Outcome, TargetExpr};
    use parking_lot::Mutex;
    use proptest::prelude::*;
    use std::time::Duration;
    use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};

    /// Broker that replays scripted events on whatever topic is subscribed.
    struct ScriptedBroker {
        accepted: Vec<String>,
        events: Vec<Vec<u8>>,
        close_after: bool,
        published: Mutex<Vec<Vec<u8>>>,
        sender: Mutex<Option<UnboundedSender<Vec<u8>>>>,
    }

    impl ScriptedBroker {
        fn new(accepted: &[&str], events: Vec<Vec<u8>>) -> Self {
            Self {
                accepted: accepted.iter().map(|s| s.to_string()).collect(),
                events,
                close_after: false,
                published: Mutex::new(Vec::new()),
                sender: Mutex::new(None),
            }
        }
    }

    impl Broker for ScriptedBroker {
        fn subscribe(&self, topic: &str) -> EngineResult<Subscription> {
            let (tx, rx) = unbounded_channel();
            for event in &self.events {
                tx.send(event.clone()).unwrap();
            }
            if !self.close_after {
                *self.sender.lock() = Some(tx);
            }
            Ok(Subscription::new(topic, rx))
        }

        fn publish_fanout(&self, payload: Vec<u8>) -> EngineResult<()> {
            self.published.lock().push(payload);
            Ok(())
        }

        fn pull_accept(&self, _timeout: Duration) -> EngineResult<Vec<String>> {
            Ok(self.accepted.clone())
        }
    }

    fn ev(event: SyncEvent) -> Vec<u8> {
        event.encode().unwrap()
    }

    fn data(worker: &str) -> Vec<u8> {
        let mut result = TransferResult::new();
        result.record(worker, "/etc/a.txt", Outcome::Success);
        ev(SyncEvent::DataResult(Some(result)))
    }

    fn copy_config() -> CopyConfig {
        CopyConfig::new(vec!["/tmp/a.txt".into()], "/etc/a.txt", TargetExpr::glob("*"))
    }

    fn barrier(broker: ScriptedBroker, config: BarrierConfig) -> FleetSyncBarrier<ScriptedBroker> {
        FleetSyncBarrier::new(Arc::new(broker), config.with_deadline(Duration::from_millis(200)))
    }

    #[tokio::test]
    async fn terminates_exactly_at_last_work() {
        let events = vec![
            ev(SyncEvent::ping("w1")),
            ev(SyncEvent::ping("w2")),
            ev(SyncEvent::work("w1")),
            ev(SyncEvent::work("w2")),
            // Must not be consumed.
            data("w9"),
        ];
        for counting in [CountingMode::Raw, CountingMode::Deduplicated] {
            let barrier = barrier(
                ScriptedBroker::new(&["w1", "w2"], events.clone()),
                BarrierConfig::new().with_counting(counting),
            );
            let mut seen = 0;
            let report = barrier
                .run(&copy_config(), FileMap::new(), |_| seen += 1)
                .await
                .unwrap();
            assert_eq!(report.phase, BarrierPhase::Complete);
            assert_eq!(report.work_count, 2);
            assert_eq!(seen, 0);
            assert!(report.results.is_empty());
        }
    }

    #[tokio::test]
    async fn not_complete_before_last_work() {
        let events = vec![
            ev(SyncEvent::ping("w1")),
            ev(SyncEvent::ping("w2")),
            ev(SyncEvent::work("w1")),
            data("w1"),
        ];
        let barrier = barrier(ScriptedBroker::new(&["w1", "w2"], events), BarrierConfig::new());
        let err = barrier
            .run(&copy_config(), FileMap::new(), |_| {})
            .await
            .unwrap_err();
        let report = err.partial_report().unwrap();
        assert_eq!(report.phase, BarrierPhase::TimedOut);
        assert_eq!(report.missing().into_iter().collect::<Vec<_>>(), ["w2"]);
        assert_eq!(report.results.get("w1", "/etc/a.txt"), Some(&Outcome::Success));
        assert_eq!(barrier.phase(), BarrierPhase::TimedOut);
    }

    #[tokio::test]
    async fn raw_counting_stalls_on_duplicate_ping() {
        let events = vec![
            ev(SyncEvent::ping("w1")),
            ev(SyncEvent::ping("w1")),
            ev(SyncEvent::work("w1")),
        ];
        let barrier = barrier(
            ScriptedBroker::new(&["w1"], events),
            BarrierConfig::new().with_counting(CountingMode::Raw),
        );
        let err = barrier
            .run(&copy_config(), FileMap::new(), |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::BarrierTimeout { .. }));
        let report = err.partial_report().unwrap();
        assert_eq!(report.ping_count, 2);
        assert_eq!(report.work_count, 1);
    }

    #[tokio::test]
    async fn deduplicated_counting_survives_duplicate_ping() {
        let events = vec![
            ev(SyncEvent::ping("w1")),
            ev(SyncEvent::ping("w1")),
            ev(SyncEvent::work("w1")),
        ];
        let barrier = barrier(ScriptedBroker::new(&["w1"], events), BarrierConfig::new());
        let report = barrier
            .run(&copy_config(), FileMap::new(), |_| {})
            .await
            .unwrap();
        assert_eq!(report.phase, BarrierPhase::Complete);
        assert_eq!(report.ping_count, 2);
    }

    #[tokio::test]
    async fn decode_errors_are_counted_and_skipped() {
        let events = vec![
            b"not json".to_vec(),
            br#"{"type": "Shout", "worker_id": "w1"}"#.to_vec(),
            ev(SyncEvent::ping("w1")),
            data("w1"),
            ev(SyncEvent::interrupt("w1")),
        ];
        let barrier = barrier(ScriptedBroker::new(&["w1"], events), BarrierConfig::new());
        let mut streamed = Vec::new();
        let report = barrier
            .run(&copy_config(), FileMap::new(), |r| streamed.push(r.clone()))
            .await
            .unwrap();
        assert_eq!(report.decode_errors, 2);
        assert_eq!(streamed.len(), 1);
        assert!(report.interrupted.contains("w1"));
    }

    #[tokio::test]
    async fn unaccepted_pings_are_ignored() {
        let events = vec![
            ev(SyncEvent::ping("stranger")),
            ev(SyncEvent::ping("w1")),
            ev(SyncEvent::work("w1")),
        ];
        let barrier = barrier(ScriptedBroker::new(&["w1"], events), BarrierConfig::new());
        let report = barrier
            .run(&copy_config(), FileMap::new(), |_| {})
            .await
            .unwrap();
        assert_eq!(report.ping_count, 1);
        assert!(!report.pinged.contains("stranger"));
    }

    #[tokio::test]
    async fn empty_accepted_set_completes_immediately() {
        let barrier = barrier(ScriptedBroker::new(&[], Vec::new()), BarrierConfig::new());
        let report = barrier
            .run(&copy_config(), FileMap::new(), |_| {})
            .await
            .unwrap();
        assert_eq!(report.phase, BarrierPhase::Complete);
        assert!(report.accepted.is_empty());
    }

    #[tokio::test]
    async fn publishes_envelope_for_topic() {
        let broker = Arc::new(ScriptedBroker::new(&[], Vec::new()));
        let barrier = FleetSyncBarrier::new(Arc::clone(&broker), BarrierConfig::new());
        let mut files = FileMap::new();
        files.insert("/tmp/a.txt".into(), "hello".into());
        let report = barrier.run(&copy_config(), files, |_| {}).await.unwrap();

        let published = broker.published.lock();
        assert_eq!(published.len(), 1);
        let envelope = PublishEnvelope::decode(&published[0]).unwrap();
        assert_eq!(envelope.ephemeral_topic, report.topic);
        assert!(report.topic.starts_with("cp_"));
        assert_eq!(envelope.dest(), "/etc/a.txt");
        assert_eq!(envelope.files()["/tmp/a.txt"], "hello");
    }

    #[tokio::test]
    async fn closed_stream_returns_partial_report() {
        let mut broker = ScriptedBroker::new(&["w1"], vec![ev(SyncEvent::ping("w1"))]);
        broker.close_after = true;
        let barrier = FleetSyncBarrier::new(Arc::new(broker), BarrierConfig::new().without_deadline());
        let err = barrier
            .run(&copy_config(), FileMap::new(), |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::StreamClosed { .. }));
        assert!(err.partial_report().unwrap().pinged.contains("w1"));
    }

    #[tokio::test]
    async fn cancel_stops_listening() {
        let broker = ScriptedBroker::new(&["w1"], Vec::new());
        let barrier = Arc::new(FleetSyncBarrier::new(
            Arc::new(broker),
            BarrierConfig::new().without_deadline(),
        ));

        let canceller = Arc::clone(&barrier);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let err = barrier
            .run(&copy_config(), FileMap::new(), |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Cancelled));
        assert_eq!(barrier.phase(), BarrierPhase::Cancelled);
    }

    #[test]
    fn work_before_ping_never_completes() {
        for counting in [CountingMode::Raw, CountingMode::Deduplicated] {
            let mut state = BarrierState::new(counting, ["w1".to_string()]);
            state.apply(EventKind::Work, "w1");
            assert!(!state.is_complete(), "{counting:?} after Work");
            state.apply(EventKind::Ping, "w1");
            assert!(!state.is_complete(), "{counting:?} after late Ping");
        }
    }

    #[tokio::test]
    async fn unannounced_finish_times_out() {
        let events = vec![ev(SyncEvent::work("w1")), ev(SyncEvent::ping("w1"))];
        let barrier = barrier(ScriptedBroker::new(&["w1"], events), BarrierConfig::new());
        let err = barrier
            .run(&copy_config(), FileMap::new(), |_| {})
            .await
            .unwrap_err();
        let report = err.partial_report().unwrap();
        assert!(matches!(err, EngineError::BarrierTimeout { .. }));
        assert!(report.unannounced.contains("w1"));
        assert_eq!(report.missing().into_iter().collect::<Vec<_>>(), ["w1"]);
    }

    fn event_kind() -> impl Strategy<Value = EventKind> {
        prop_oneof![
            Just(EventKind::Ping),
            Just(EventKind::Work),
            Just(EventKind::Interrupt),
        ]
    }

    proptest! {
        #[test]
        fn deduplicated_completion_matches_membership(
            events in prop::collection::vec((event_kind(), 0usize..4), 0..40)
        ) {
            let ids = ["w0", "w1", "w2", "w3"];
            let accepted: Vec<String> = ids[..3].iter().map(|s| s.to_string()).collect();
            let mut state = BarrierState::new(CountingMode::Deduplicated, accepted.clone());

            let mut pinged = BTreeSet::new();
            let mut finished = BTreeSet::new();
            let mut complete = false;
            for (kind, i) in events {
                let id = ids[i];
                state.apply(kind, id);
                if kind == EventKind::Ping {
                    if i < 3 {
                        pinged.insert(id);
                    }
                } else {
                    if i < 3 && pinged.contains(id) {
                        finished.insert(id);
                    }
                    complete = complete || (pinged.len() == 3 && finished.len() == 3);
                }
                prop_assert_eq!(state.is_complete(), complete);
            }
        }
    }
}
