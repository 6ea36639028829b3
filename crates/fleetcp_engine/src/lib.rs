//! # fleetcp Engine
//!
//! Dispatch of file-copy operations to a fleet of workers.
//!
//! This crate provides:
//! - The remote executor abstraction (plus a scripted mock and a loopback
//!   executor that writes into per-worker directories)
//! - The chunked transfer engine (ordered per-file chunks, sticky first
//!   failure per worker)
//! - One-shot (non-chunked) dispatch
//! - The pub/sub broker abstraction
//! - The fleet sync barrier (publish once, count ping/work events)
//!
//! ## Dispatch modes
//!
//! A controller picks one of two paths per operation:
//! 1. `ChunkedTransferEngine`: synchronous call/response per chunk
//! 2. `FleetSyncBarrier`: one directive through a broker, completion
//!    detected from events on an ephemeral topic
//!
//! The two are never combined.
//!
//! ## Key Invariants
//!
//! - Chunks of one file are sent in index order, one at a time
//! - A worker's first failure for a path is never overwritten
//! - Publish failures are recorded per target, never raised
//! - Undecodable events are counted and skipped

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod barrier;
mod broker;
mod config;
mod error;
mod executor;
mod loopback;
mod transfer;

pub use barrier::{BarrierPhase, BarrierReport, BarrierState, FleetSyncBarrier};
pub use broker::{Broker, Subscription};
pub use config::{BarrierConfig, CountingMode};
pub use error::{EngineError, EngineResult};
pub use executor::{one_shot_remote_path, MockExecutor, RecordedCall, RemoteExecutor};
pub use loopback::LoopbackExecutor;
pub use transfer::{
    publish_failure_message, send_files, ChunkedTransferEngine, TransferState, TransferStats,
};
