//! Property-based test generators using proptest.

use fleetcp_protocol::{EventKind, SyncEvent};
use proptest::prelude::*;

/// Strategy for worker ids such as `web3`.
pub fn worker_id_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z]{1,6}[0-9]{0,2}").expect("Invalid regex")
}

/// Strategy for a roster of distinct worker ids.
pub fn roster_strategy(max: usize) -> impl Strategy<Value = Vec<String>> {
    prop::collection::btree_set(worker_id_strategy(), 0..=max)
        .prop_map(|ids| ids.into_iter().collect())
}

/// Strategy for file contents.
pub fn file_contents_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..4096)
}

/// Strategy for chunk sizes, small enough to produce several chunks.
pub fn chunk_size_strategy() -> impl Strategy<Value = usize> {
    1usize..512
}

/// Strategy for control event kinds.
pub fn event_kind_strategy() -> impl Strategy<Value = EventKind> {
    prop_oneof![
        Just(EventKind::Ping),
        Just(EventKind::Work),
        Just(EventKind::Interrupt),
    ]
}

/// Strategy for a well-behaved event stream over `roster`.
///
/// Every worker pings before it finishes; workers interleave freely and
/// some events are duplicated.
pub fn event_stream_strategy(roster: Vec<String>) -> impl Strategy<Value = Vec<SyncEvent>> {
    let n = roster.len();
    (
        Just(roster),
        prop::collection::vec(any::<bool>(), n),
        prop::collection::vec(any::<bool>(), n),
        any::<u64>(),
    )
        .prop_map(|(roster, interrupted, duplicated, seed)| {
            let mut queues: Vec<Vec<SyncEvent>> = roster
                .iter()
                .enumerate()
                .map(|(i, id)| {
                    let mut queue = vec![SyncEvent::ping(id.as_str())];
                    if duplicated[i] {
                        queue.push(SyncEvent::ping(id.as_str()));
                    }
                    queue.push(if interrupted[i] {
                        SyncEvent::interrupt(id.as_str())
                    } else {
                        SyncEvent::work(id.as_str())
                    });
                    queue.reverse();
                    queue
                })
                .collect();

            // Deterministic interleave driven by the seed.
            let mut events = Vec::new();
            let mut state = seed | 1;
            while queues.iter().any(|q| !q.is_empty()) {
                state ^= state << 13;
                state ^= state >> 7;
                state ^= state << 17;
                let live: Vec<usize> = (0..queues.len()).filter(|&i| !queues[i].is_empty()).collect();
                let pick = live[(state % live.len() as u64) as usize];
                if let Some(event) = queues[pick].pop() {
                    events.push(event);
                }
            }
            events
        })
}
