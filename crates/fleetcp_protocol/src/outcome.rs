//! Per-worker outcomes and the aggregate transfer result.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// Result of one remote call on one worker.
///
/// On the wire a success is the JSON literal `true` and a failure is the
/// error description as a string. Any other reply shape is read as a
/// failure carrying its JSON text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The worker applied the call.
    Success,
    /// The worker (or the controller on its behalf) reported an error.
    Failure(String),
}

impl Outcome {
    /// Creates a failure outcome.
    pub fn failure(message: impl Into<String>) -> Self {
        Outcome::Failure(message.into())
    }

    /// Returns true for `Outcome::Success`.
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success)
    }

    /// Returns the error description of a failure.
    pub fn error(&self) -> Option<&str> {
        match self {
            Outcome::Success => None,
            Outcome::Failure(message) => Some(message),
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Success => f.write_str("True"),
            Outcome::Failure(message) => f.write_str(message),
        }
    }
}

impl Serialize for Outcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Outcome::Success => serializer.serialize_bool(true),
            Outcome::Failure(message) => serializer.serialize_str(message),
        }
    }
}

impl<'de> Deserialize<'de> for Outcome {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Flag(bool),
            Message(String),
            // Structured error replies are kept verbatim.
            Other(serde_json::Value),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Flag(true) => Outcome::Success,
            Raw::Flag(false) => Outcome::failure("false"),
            Raw::Message(message) => Outcome::Failure(message),
            Raw::Other(value) => Outcome::Failure(value.to_string()),
        })
    }
}

/// Replies of one remote call, keyed by worker id.
pub type WorkerReplies = BTreeMap<String, Outcome>;

/// Aggregate result of an operation: `worker_id -> (remote_path -> outcome)`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransferResult {
    workers: BTreeMap<String, BTreeMap<String, Outcome>>,
}

impl TransferResult {
    /// Creates an empty result.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records (or replaces) the outcome for a worker and remote path.
    pub fn record(
        &mut self,
        worker_id: impl Into<String>,
        remote_path: impl Into<String>,
        outcome: Outcome,
    ) {
        self.workers
            .entry(worker_id.into())
            .or_default()
            .insert(remote_path.into(), outcome);
    }

    /// Returns the outcome recorded for a worker and remote path.
    pub fn get(&self, worker_id: &str, remote_path: &str) -> Option<&Outcome> {
        self.workers.get(worker_id)?.get(remote_path)
    }

    /// Returns all outcomes recorded for a worker.
    pub fn worker(&self, worker_id: &str) -> Option<&BTreeMap<String, Outcome>> {
        self.workers.get(worker_id)
    }

    /// Iterates over worker ids in order.
    pub fn workers(&self) -> impl Iterator<Item = &str> {
        self.workers.keys().map(String::as_str)
    }

    /// Iterates over `(worker, outcomes)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &BTreeMap<String, Outcome>)> {
        self.workers.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Iterates over every failure as `(worker, remote_path, message)`.
    pub fn failures(&self) -> impl Iterator<Item = (&str, &str, &str)> {
        self.workers.iter().flat_map(|(worker, paths)| {
            paths.iter().filter_map(move |(path, outcome)| {
                outcome
                    .error()
                    .map(|message| (worker.as_str(), path.as_str(), message))
            })
        })
    }

    /// Returns true if no failure was recorded.
    pub fn all_succeeded(&self) -> bool {
        self.failures().next().is_none()
    }

    /// Merges another result into this one; entries from `other` win.
    pub fn merge(&mut self, other: TransferResult) {
        for (worker, paths) in other.workers {
            self.workers.entry(worker).or_default().extend(paths);
        }
    }

    /// Returns the number of workers with at least one entry.
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    /// Returns true if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }
}
