//! File informer errors

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by a watch primitive or surfaced on its error stream.
///
/// None of these stop a running informer: registration and stream errors are
/// reported through [`crate::runtime::handle_error`] and the loop continues.
/// Only [`WatchError::Init`] is fatal, and only at informer construction time.
#[derive(Debug, Error)]
pub enum WatchError {
    /// The watch primitive could not be constructed
    #[error("failed to initialize file watcher: {0}")]
    Init(String),

    /// A path could not be registered with the watch primitive
    #[error("cannot watch {path}: {reason}")]
    Add {
        /// Path that was being registered
        path: PathBuf,
        /// Underlying failure
        reason: String,
    },

    /// A path could not be unregistered from the watch primitive
    #[error("cannot stop watching {path}: {reason}")]
    Remove {
        /// Path that was being unregistered
        path: PathBuf,
        /// Underlying failure
        reason: String,
    },

    /// Error delivered on the watch primitive's error stream
    #[error("error watching file: {0}")]
    Event(String),
}

impl From<notify::Error> for WatchError {
    fn from(e: notify::Error) -> Self {
        WatchError::Init(e.to_string())
    }
}
