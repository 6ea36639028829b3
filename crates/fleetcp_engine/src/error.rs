//! Error types for the engine.

use crate::barrier::BarrierReport;
use fleetcp_core::CoreError;
use fleetcp_protocol::ProtocolError;
use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that can occur while dispatching an operation.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The remote call could not be delivered at all.
    #[error("publish failed: {0}")]
    Publish(String),

    /// Local preparation failed.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A message could not be encoded or decoded.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The pub/sub broker rejected a request.
    #[error("broker error: {0}")]
    Broker(String),

    /// The barrier deadline elapsed before every participant finished.
    #[error(
        "barrier deadline elapsed with {}/{} participants finished",
        report.finished.len(),
        report.accepted.len()
    )]
    BarrierTimeout {
        /// State and results gathered before the deadline.
        report: Box<BarrierReport>,
    },

    /// The event stream ended before every participant finished.
    #[error(
        "event stream closed with {}/{} participants finished",
        report.finished.len(),
        report.accepted.len()
    )]
    StreamClosed {
        /// State and results gathered before the stream closed.
        report: Box<BarrierReport>,
    },

    /// The operation was cancelled.
    #[error("operation cancelled")]
    Cancelled,

    /// Invalid state transition.
    #[error("invalid state transition from {from:?} to {to:?}")]
    InvalidStateTransition {
        /// Current state.
        from: String,
        /// Attempted target state.
        to: String,
    },

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Creates a publish failure.
    pub fn publish(message: impl Into<String>) -> Self {
        Self::Publish(message.into())
    }

    /// Creates a broker error.
    pub fn broker(message: impl Into<String>) -> Self {
        Self::Broker(message.into())
    }

    /// Returns true if retrying the whole operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::Publish(_)
                | EngineError::Broker(_)
                | EngineError::BarrierTimeout { .. }
                | EngineError::StreamClosed { .. }
        )
    }

    /// Returns the partial barrier report carried by the error, if any.
    pub fn partial_report(&self) -> Option<&BarrierReport> {
        match self {
            EngineError::BarrierTimeout { report } | EngineError::StreamClosed { report } => {
                Some(report)
            }
            _ => None,
        }
    }

    /// Returns the process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            EngineError::Core(err) => err.exit_code(),
            _ => 1,
        }
    }
}
