//! Controller-specific error types.

use file_informer::WatchError;
use thiserror::Error;

/// Errors that can occur in the Operator Config Controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// File informer could not be created
    #[error("Informer error: {0}")]
    Informer(#[from] WatchError),

    /// Reconciliation failed
    #[error("Reconciliation failed: {0}")]
    Reconciliation(String),

    /// Config watch failed
    #[error("Config watch failed: {0}")]
    Watch(String),
}
