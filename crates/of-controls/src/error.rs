//! Error types for breakpoint scheduling.

use of_core::OfError;
use thiserror::Error;

/// Result type for scheduling operations.
pub type ControlResult<T> = Result<T, ControlError>;

/// Errors that can occur while building a breakpoint schedule.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ControlError {
    /// Invalid argument provided to a scheduling function.
    #[error("Invalid argument: {what}")]
    InvalidArg { what: &'static str },

    /// Two update periods that must divide one another do not.
    #[error("Update periods {a} and {b} must be multiples of each other")]
    Incommensurate { a: f64, b: f64 },

    #[error(transparent)]
    Core(#[from] OfError),
}
