//! Operation configuration.

use crate::error::{CoreError, CoreResult};
use fleetcp_protocol::TargetExpr;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default chunk size in bytes.
pub const DEFAULT_CHUNK_SIZE: usize = 98_304;

/// Configuration for one copy operation.
///
/// Built once by the caller and passed by reference to every component
/// that takes part in the operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CopyConfig {
    /// Local source paths, in the order given.
    pub sources: Vec<PathBuf>,
    /// Destination path on the workers.
    pub dest: String,
    /// Workers to address.
    pub target: TargetExpr,
    /// Whether to use chunked transfer (required for directories).
    pub chunked: bool,
    /// Whether to gzip file streams in chunked mode.
    pub compress: bool,
    /// Size of one chunk in bytes.
    pub chunk_size: usize,
    /// Timeout handed to every remote call.
    pub timeout: Duration,
    /// Minimum time to wait for relays to acknowledge a published directive.
    pub sub_timeout: Duration,
}

impl CopyConfig {
    /// Creates a configuration with default transfer settings.
    pub fn new(sources: Vec<PathBuf>, dest: impl Into<String>, target: TargetExpr) -> Self {
        Self {
            sources,
            dest: dest.into(),
            target,
            chunked: false,
            compress: true,
            chunk_size: DEFAULT_CHUNK_SIZE,
            timeout: Duration::from_secs(5),
            sub_timeout: Duration::from_secs(30),
        }
    }

    /// Enables or disables chunked mode.
    #[must_use]
    pub fn with_chunked(mut self, chunked: bool) -> Self {
        self.chunked = chunked;
        self
    }

    /// Enables or disables gzip compression.
    #[must_use]
    pub fn with_compression(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    /// Sets the chunk size.
    #[must_use]
    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size;
        self
    }

    /// Sets the remote call timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the acknowledgement timeout floor.
    #[must_use]
    pub fn with_sub_timeout(mut self, timeout: Duration) -> Self {
        self.sub_timeout = timeout;
        self
    }

    /// Returns how long to wait for relay acknowledgements.
    pub fn accept_timeout(&self) -> Duration {
        self.timeout.max(self.sub_timeout)
    }

    /// Checks the configuration for values that can never work.
    pub fn validate(&self) -> CoreResult<()> {
        if self.sources.is_empty() {
            return Err(CoreError::invalid_config("at least one source path is required"));
        }
        if self.dest.is_empty() {
            return Err(CoreError::invalid_config("destination must not be empty"));
        }
        if self.chunk_size == 0 {
            return Err(CoreError::invalid_config("chunk size must be positive"));
        }
        if self.target.targets.iter().all(|t| t.trim().is_empty()) {
            return Err(CoreError::invalid_config("target must not be empty"));
        }
        Ok(())
    }
}
