//! Crate-level error type.

use crate::config::ConfigError;
use crate::hw_trait::HwError;
use crate::notify::TransportError;

/// Errors that can end the agent.
///
/// Inside a running session almost nothing is fatal: transport failures and
/// input read faults are logged and absorbed where they happen. What reaches
/// this type is startup failure or a shutdown command that did not run.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("hardware error: {0}")]
    Hardware(#[from] HwError),

    #[error("notification transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("host shutdown failed: {0}")]
    Shutdown(String),
}

pub type Result<T> = std::result::Result<T, Error>;
