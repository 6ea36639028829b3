//! CLI error type and exit codes.

use fleetcp_core::CoreError;
use fleetcp_engine::{BarrierReport, EngineError};
use fleetcp_relay::RelayError;
use thiserror::Error;

/// Result type for CLI commands.
pub type CliResult<T> = Result<T, CliError>;

/// Errors surfaced by the `fleetcp` binary.
#[derive(Error, Debug)]
pub enum CliError {
    /// Input, transfer or barrier failure.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// A relay could not be started.
    #[error("relay error: {0}")]
    Relay(#[from] RelayError),

    /// Output could not be rendered.
    #[error("output error: {0}")]
    Output(#[from] serde_json::Error),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        CliError::Engine(EngineError::from(err))
    }
}

impl CliError {
    /// Returns the process exit code.
    pub fn exit_code(&self) -> u8 {
        match self {
            CliError::Engine(err) => u8::try_from(err.exit_code()).unwrap_or(1),
            _ => 1,
        }
    }

    /// Returns the partial barrier report, if the barrier gave up.
    pub fn partial_report(&self) -> Option<&BarrierReport> {
        match self {
            CliError::Engine(err) => err.partial_report(),
            _ => None,
        }
    }
}
