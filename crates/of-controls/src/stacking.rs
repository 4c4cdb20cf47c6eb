//! Observation stacking aligned on the simulation step.
//!
//! An environment stepping every `step_dt` keeps a history of observations
//! refreshed every `stack_dt = (skip_frames_ratio + 1) * step_dt`. Stacking
//! breakpoints are step boundaries, so their times are derived from the step
//! index and coincide bit for bit with the corresponding step times.

use crate::error::{ControlError, ControlResult};
use of_core::{STEPPER_MIN_TIMESTEP, gcd};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StackingGrid {
    step_dt: f64,
    skip_frames_ratio: u32,
    steps_per_breakpoint: u64,
}

impl StackingGrid {
    pub fn new(step_dt: f64, skip_frames_ratio: u32) -> ControlResult<Self> {
        if !step_dt.is_finite() || step_dt < STEPPER_MIN_TIMESTEP {
            return Err(ControlError::InvalidArg {
                what: "step duration must be finite and above the stepper time resolution",
            });
        }
        let stack_dt = (f64::from(skip_frames_ratio) + 1.0) * step_dt;
        let g = gcd(step_dt, stack_dt)?;
        let steps_per_breakpoint = (stack_dt / g).round() as u64;
        Ok(Self {
            step_dt,
            skip_frames_ratio,
            steps_per_breakpoint: steps_per_breakpoint.max(1),
        })
    }

    pub fn step_dt(&self) -> f64 {
        self.step_dt
    }

    pub fn skip_frames_ratio(&self) -> u32 {
        self.skip_frames_ratio
    }

    /// Stacking period.
    pub fn stack_dt(&self) -> f64 {
        (f64::from(self.skip_frames_ratio) + 1.0) * self.step_dt
    }

    /// Number of environment steps between two stacking breakpoints.
    pub fn steps_per_breakpoint(&self) -> u64 {
        self.steps_per_breakpoint
    }

    /// Simulation time at the end of `step`.
    pub fn step_time(&self, step: u64) -> f64 {
        step as f64 * self.step_dt
    }

    pub fn is_breakpoint(&self, step: u64) -> bool {
        step % self.steps_per_breakpoint == 0
    }

    /// Step indices in `1..=n_steps` at which the stack is refreshed.
    pub fn breakpoint_steps(&self, n_steps: u64) -> impl Iterator<Item = u64> + '_ {
        (1..=n_steps / self.steps_per_breakpoint).map(move |k| k * self.steps_per_breakpoint)
    }

    /// Stacking breakpoint times within the first `n_steps` steps.
    pub fn breakpoints(&self, n_steps: u64) -> Vec<f64> {
        self.breakpoint_steps(n_steps)
            .map(|step| self.step_time(step))
            .collect()
    }

    /// Timestamps of the stacked observations visible at `step`, newest
    /// first: `t_step - i * stack_dt` for `i < depth`, stopping at time zero.
    pub fn history_times(&self, step: u64, depth: usize) -> Vec<f64> {
        (0..depth as u64)
            .map_while(|i| step.checked_sub(i * self.steps_per_breakpoint))
            .map(|s| self.step_time(s))
            .collect()
    }
}
