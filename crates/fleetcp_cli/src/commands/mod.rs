//! CLI command implementations.

pub mod barrier;
pub mod copy;
