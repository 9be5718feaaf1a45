//! Process-wide reporting for recoverable errors.
//!
//! Informers never hand errors to their observers. Anything that goes wrong
//! while a watch is running is logged here and the caller carries on.

use std::fmt::Display;
use tracing::error;

/// Logs a recoverable error.
pub fn report_error(err: &impl Display) {
    error!("{}", err);
}

/// Logs the error of a failed result and discards it.
///
/// Returns `true` when the result was `Ok`.
pub fn handle_error<E: Display>(result: Result<(), E>) -> bool {
    match result {
        Ok(()) => true,
        Err(e) => {
            report_error(&e);
            false
        }
    }
}
