//! # fleetcp Testkit
//!
//! Test utilities for fleetcp.
//!
//! This crate provides:
//! - Temporary source trees and loopback fleet directories
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use fleetcp_testkit::prelude::*;
//!
//! let src = SourceTree::new();
//! let conf = src.file("conf/app.ini", "port = 80\n");
//! let fleet = FleetDir::with_workers(["web1", "web2"]);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use fixtures::*;
pub use generators::*;
