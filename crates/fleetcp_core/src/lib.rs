//! # fleetcp core
//!
//! The controller's local side of a fleet copy.
//!
//! This crate provides:
//! - `CopyConfig`, the explicit configuration of one operation
//! - Source path collection into files and empty directories
//! - Remote path resolution against the destination
//! - Lazy chunking of file streams, optionally gzip-compressed
//! - File loading for one-shot transfers
//! - Target-list files and static target resolution
//!
//! ## Example
//!
//! ```rust,ignore
//! use fleetcp_core::{collect_paths, RemotePathResolver};
//!
//! let collected = collect_paths(&config.sources)?;
//! let resolver = RemotePathResolver::new(&config.sources, &config.dest, &collected);
//! for file in &collected.files {
//!     println!("{} -> {}", file.path.display(), resolver.resolve(&file.path)?);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod chunker;
mod collect;
mod config;
mod error;
mod files;
mod resolve;
mod target;

pub use chunker::ChunkReader;
pub use collect::{collect_paths, file_mode, CollectedPaths, FileEntry};
pub use config::{CopyConfig, DEFAULT_CHUNK_SIZE};
pub use error::{CoreError, CoreResult};
pub use files::load_files;
pub use resolve::{dest_is_dir, RemotePathResolver};
pub use target::{load_target_file, wildcard_match, StaticResolver, TargetResolver, TargetSet};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
