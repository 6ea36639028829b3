//! # fleetcp protocol
//!
//! Wire types shared by the fleetcp controller, relays and workers.
//!
//! This crate provides:
//! - `TransferChunk` and the `ChunkCall` arguments of the receive-chunk function
//! - `Outcome` and the aggregate `TransferResult`
//! - `SyncEvent` for the completion barrier, decoded once at the boundary
//! - `PublishEnvelope` for the fan-out channel
//! - `TargetExpr`, the unresolved target specification
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod chunk;
mod envelope;
mod error;
mod event;
mod outcome;
mod target;

pub use chunk::{ChunkCall, TransferChunk};
pub use envelope::{FileMap, OperationKind, PublishEnvelope};
pub use error::{ProtocolError, ProtocolResult};
pub use event::{EventKind, SyncEvent};
pub use outcome::{Outcome, TransferResult, WorkerReplies};
pub use target::{Selection, TargetExpr};
