//! Error types for trajectory integration.

use crate::trajectory::Trajectory;
use thiserror::Error;

/// Errors encountered while integrating a trajectory.
#[derive(Error, Debug)]
pub enum SimError {
    /// Malformed breakpoints, initial state, or options. Raised before any
    /// dynamics evaluation.
    #[error("Invalid input: {what}")]
    InvalidInput { what: String },

    /// Step-size control could not meet the tolerance.
    ///
    /// `partial` holds every breakpoint sample completed before the failure;
    /// `interval` is the index of the breakpoint being approached.
    #[error(
        "Integration diverged approaching breakpoint {interval} at t={t} (dt={dt}): {reason}"
    )]
    IntegrationDivergence {
        interval: usize,
        t: f64,
        dt: f64,
        reason: &'static str,
        partial: Box<Trajectory>,
    },

    /// The dynamics callback failed at stage time `t` and stage state `state`.
    #[error("Dynamics evaluation failed at t={t}: {message}")]
    DynamicsEvaluation {
        t: f64,
        state: Vec<f64>,
        message: String,
    },
}

pub type SimResult<T> = Result<T, SimError>;

impl SimError {
    pub(crate) fn invalid(what: impl Into<String>) -> Self {
        SimError::InvalidInput { what: what.into() }
    }
}

impl From<of_core::OfError> for SimError {
    fn from(e: of_core::OfError) -> Self {
        SimError::InvalidInput {
            what: e.to_string(),
        }
    }
}
