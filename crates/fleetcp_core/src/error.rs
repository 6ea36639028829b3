//! Error types for fleetcp core.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised while preparing an operation on the controller.
///
/// Every variant except `UnattributedPath` and `Io` is a fatal input error:
/// the operation aborts before anything is sent.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A top-level source path does not exist.
    #[error("{} does not exist", path.display())]
    MissingSource {
        /// The missing path.
        path: PathBuf,
    },

    /// A directory was given without chunked mode.
    #[error(
        "{} is a directory, only files are supported in non-chunked mode. Use \"--chunked\" command line argument.",
        path.display()
    )]
    DirectoryWithoutChunked {
        /// The directory.
        path: PathBuf,
    },

    /// The target-list file contained no targets.
    #[error("found empty target list in {}, please check", path.display())]
    EmptyTargetList {
        /// The target-list file.
        path: PathBuf,
    },

    /// The target-list file could not be read.
    #[error("cannot read target list {}: {source}", path.display())]
    TargetList {
        /// The target-list file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// A collected path lies under none of the source roots.
    #[error("failed to find remote path for {}", path.display())]
    UnattributedPath {
        /// The local path.
        path: PathBuf,
    },

    /// Invalid configuration value.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the problem.
        message: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl CoreError {
    /// Creates an invalid configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Returns the process exit code the controller uses for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            CoreError::MissingSource { .. } | CoreError::EmptyTargetList { .. } => 42,
            CoreError::TargetList { .. } => 2,
            CoreError::DirectoryWithoutChunked { .. }
            | CoreError::UnattributedPath { .. }
            | CoreError::InvalidConfig { .. }
            | CoreError::Io(_) => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes() {
        let missing = CoreError::MissingSource {
            path: "/nope".into(),
        };
        assert_eq!(missing.exit_code(), 42);
        assert_eq!(missing.to_string(), "/nope does not exist");

        let dir = CoreError::DirectoryWithoutChunked { path: "/etc".into() };
        assert_eq!(dir.exit_code(), 1);

        let io = CoreError::TargetList {
            path: "/t".into(),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        };
        assert_eq!(io.exit_code(), 2);

        let empty = CoreError::EmptyTargetList { path: "/t".into() };
        assert_eq!(empty.exit_code(), 42);
    }
}
