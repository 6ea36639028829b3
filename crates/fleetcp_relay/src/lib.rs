//! # fleetcp Relay
//!
//! In-process pub/sub broker and relay nodes.
//!
//! This crate provides:
//! - `MemoryBroker`, a broker with named topics and a fan-out channel
//! - `Relay`, a node that executes published directives against its
//!   workers and reports back on the directive's ephemeral topic
//!
//! # Protocol
//!
//! For every directive it receives a relay:
//! 1. Acknowledges it, so the controller counts the relay as accepted
//! 2. Publishes `Ping`
//! 3. Executes the copy and publishes the result as `DataResult`
//! 4. Publishes `Work`, or `Interrupt` when execution failed

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod broker;
mod config;
mod error;
mod relay;

pub use broker::MemoryBroker;
pub use config::RelayConfig;
pub use error::{RelayError, RelayResult};
pub use relay::{Relay, RelayHandle};
