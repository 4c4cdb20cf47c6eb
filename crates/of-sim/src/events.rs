//! Breakpoint validation and step clipping.

use crate::error::{SimError, SimResult};
use crate::model::State;

/// Check that `times` is non-empty, finite, strictly increasing and does not
/// start before `initial_time`.
pub(crate) fn validate_breakpoints(initial_time: f64, times: &[f64]) -> SimResult<()> {
    if !initial_time.is_finite() {
        return Err(SimError::invalid("initial time must be finite"));
    }
    let Some(&first) = times.first() else {
        return Err(SimError::invalid("breakpoint sequence is empty"));
    };
    for (i, t) in times.iter().enumerate() {
        if !t.is_finite() {
            return Err(SimError::invalid(format!("breakpoint {i} is not finite")));
        }
    }
    if first < initial_time {
        return Err(SimError::invalid(format!(
            "first breakpoint {first} precedes initial time {initial_time}"
        )));
    }
    if let Some(i) = times.windows(2).position(|w| w[1] <= w[0]) {
        return Err(SimError::invalid(format!(
            "breakpoints must be strictly increasing: times[{}]={} <= times[{}]={}",
            i + 1,
            times[i + 1],
            i,
            times[i]
        )));
    }
    Ok(())
}

pub(crate) fn validate_state(x: &State) -> SimResult<()> {
    if let Some(i) = x.iter().position(|v| !v.is_finite()) {
        return Err(SimError::invalid(format!("initial state[{i}] is not finite")));
    }
    Ok(())
}

/// Step size to try next, clipped to the upcoming breakpoint.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct PlannedStep {
    pub dt: f64,
    /// The step ends exactly on the breakpoint.
    pub reaches_target: bool,
    /// The breakpoint forced a smaller step than requested.
    pub clipped: bool,
}

/// Clip `dt` so that `t + dt` never overshoots `target`.
///
/// A remaining gap narrower than `min_step` after the step would force a
/// sliver step later, so the step is stretched onto the breakpoint instead.
pub(crate) fn plan_step(t: f64, target: f64, dt: f64, min_step: f64) -> PlannedStep {
    let remaining = target - t;
    if dt >= remaining || remaining - dt < min_step {
        PlannedStep {
            dt: remaining,
            reaches_target: true,
            clipped: remaining < dt,
        }
    } else {
        PlannedStep {
            dt,
            reaches_target: false,
            clipped: false,
        }
    }
}
