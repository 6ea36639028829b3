//! Error types for relays and the in-process broker.

use fleetcp_engine::EngineError;
use fleetcp_protocol::ProtocolError;
use thiserror::Error;

/// Result type for relay operations.
pub type RelayResult<T> = Result<T, RelayError>;

/// Errors that can occur in a relay.
#[derive(Error, Debug)]
pub enum RelayError {
    /// A directive or event could not be encoded or decoded.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The executor failed the directive as a whole.
    #[error("execution failed: {0}")]
    Execution(#[from] EngineError),

    /// A relay with this id is already registered.
    #[error("relay already registered: {0}")]
    DuplicateRelay(String),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl RelayError {
    /// Returns true if the failure was caused by the received message.
    pub fn is_message_error(&self) -> bool {
        matches!(self, RelayError::Protocol(_))
    }
}
