//! Update graph errors

use thiserror::Error;

/// Errors that can occur while building or loading an update graph
#[derive(Debug, Error)]
pub enum GraphError {
    /// A version range could not be parsed
    #[error("Invalid version range '{range}': {reason}")]
    InvalidRange {
        /// The offending range text
        range: String,
        /// Why it was rejected
        reason: String,
    },

    /// A release id is not a (optionally `v`-prefixed) semantic version
    #[error("Invalid release version '{0}'")]
    InvalidVersion(String),

    /// YAML serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_yaml::Error),
}

/// Result alias for update graph operations
pub type Result<T> = std::result::Result<T, GraphError>;
