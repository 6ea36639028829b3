//! Completion-barrier events streamed back on the ephemeral topic.
//!
//! Two shapes travel on the topic:
//!
//! ```text
//! {"type": "Ping" | "Work" | "Interrupt", "worker_id": "<id>"}   control event
//! {"dataResult": {<worker>: {<path>: true | "<error>"}} | null}  data event
//! ```
//!
//! Raw messages are decoded exactly once, here, into `SyncEvent`. Anything
//! else is a `ProtocolError` for the caller to count and skip.

use crate::error::{ProtocolError, ProtocolResult};
use crate::outcome::TransferResult;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

const TYPE_KEY: &str = "type";
const WORKER_KEY: &str = "worker_id";
const DATA_KEY: &str = "dataResult";

/// Kind of a control event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// A participant announced its presence.
    Ping,
    /// A participant finished its work.
    Work,
    /// A participant stopped before finishing.
    Interrupt,
}

/// A decoded barrier event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// Liveness announcement.
    Ping {
        /// Announcing participant.
        worker_id: String,
    },
    /// Completion announcement.
    Work {
        /// Finished participant.
        worker_id: String,
    },
    /// Interrupted participant; counts toward completion.
    Interrupt {
        /// Interrupted participant.
        worker_id: String,
    },
    /// Partial results; `None` when the sender had nothing to report.
    DataResult(Option<TransferResult>),
}

impl SyncEvent {
    /// Creates a ping event.
    pub fn ping(worker_id: impl Into<String>) -> Self {
        SyncEvent::Ping {
            worker_id: worker_id.into(),
        }
    }

    /// Creates a work event.
    pub fn work(worker_id: impl Into<String>) -> Self {
        SyncEvent::Work {
            worker_id: worker_id.into(),
        }
    }

    /// Creates an interrupt event.
    pub fn interrupt(worker_id: impl Into<String>) -> Self {
        SyncEvent::Interrupt {
            worker_id: worker_id.into(),
        }
    }

    /// Creates a control event of the given kind.
    pub fn control(kind: EventKind, worker_id: impl Into<String>) -> Self {
        match kind {
            EventKind::Ping => Self::ping(worker_id),
            EventKind::Work => Self::work(worker_id),
            EventKind::Interrupt => Self::interrupt(worker_id),
        }
    }

    /// Returns the control kind and participant, or `None` for data events.
    pub fn as_control(&self) -> Option<(EventKind, &str)> {
        match self {
            SyncEvent::Ping { worker_id } => Some((EventKind::Ping, worker_id)),
            SyncEvent::Work { worker_id } => Some((EventKind::Work, worker_id)),
            SyncEvent::Interrupt { worker_id } => Some((EventKind::Interrupt, worker_id)),
            SyncEvent::DataResult(_) => None,
        }
    }

    /// Encodes the event as JSON.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        let value = match self {
            SyncEvent::DataResult(result) => json!({ "dataResult": result }),
            other => {
                let (kind, worker_id) = other
                    .as_control()
                    .ok_or_else(|| ProtocolError::invalid_structure("not a control event"))?;
                json!({ "type": kind, "worker_id": worker_id })
            }
        };
        Ok(serde_json::to_vec(&value)?)
    }

    /// Decodes a raw topic message.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        let value: Value = serde_json::from_slice(bytes)?;
        let map = value
            .as_object()
            .ok_or_else(|| ProtocolError::invalid_structure("expected object"))?;

        if let Some(kind) = map.get(TYPE_KEY) {
            let kind = match kind.as_str() {
                Some("Ping") => EventKind::Ping,
                Some("Work") => EventKind::Work,
                Some("Interrupt") => EventKind::Interrupt,
                Some(other) => return Err(ProtocolError::UnknownEventType(other.to_string())),
                None => return Err(ProtocolError::invalid_structure("type must be a string")),
            };
            let worker_id = map
                .get(WORKER_KEY)
                .and_then(Value::as_str)
                .ok_or_else(|| ProtocolError::invalid_structure("missing worker_id"))?;
            return Ok(Self::control(kind, worker_id));
        }

        match map.get(DATA_KEY) {
            Some(Value::Null) => Ok(SyncEvent::DataResult(None)),
            Some(data) => Ok(SyncEvent::DataResult(Some(
                TransferResult::deserialize(data)?,
            ))),
            None => Err(ProtocolError::invalid_structure(
                "expected type or dataResult key",
            )),
        }
    }
}
