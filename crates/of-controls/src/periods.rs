//! Sensor and controller update periods.
//!
//! A period of zero means continuous update (every dynamics evaluation). When
//! both periods are discrete, one must be a multiple of the other and the
//! stepper breaks at the smaller one.

use crate::error::{ControlError, ControlResult};
use of_core::{STEPPER_MIN_TIMESTEP, gcd, is_multiple_of};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdatePeriods {
    /// Sensor refresh period in seconds (0 = continuous)
    pub sensors: f64,
    /// Controller update period in seconds (0 = continuous)
    pub controller: f64,
}

impl UpdatePeriods {
    pub fn new(sensors: f64, controller: f64) -> ControlResult<Self> {
        let periods = Self {
            sensors,
            controller,
        };
        periods.validate()?;
        Ok(periods)
    }

    pub fn validate(&self) -> ControlResult<()> {
        for period in [self.sensors, self.controller] {
            if !period.is_finite() || period < 0.0 {
                return Err(ControlError::InvalidArg {
                    what: "update period must be finite and non-negative",
                });
            }
            if period > 0.0 && period < STEPPER_MIN_TIMESTEP {
                return Err(ControlError::InvalidArg {
                    what: "update period is below the stepper time resolution",
                });
            }
        }
        self.stepper_period().map(|_| ())
    }

    /// Period at which the integrator must stop, or `None` when both updates
    /// are continuous.
    pub fn stepper_period(&self) -> ControlResult<Option<f64>> {
        match (self.sensors > 0.0, self.controller > 0.0) {
            (false, false) => Ok(None),
            (true, false) => Ok(Some(self.sensors)),
            (false, true) => Ok(Some(self.controller)),
            (true, true) => {
                let (small, large) = if self.sensors <= self.controller {
                    (self.sensors, self.controller)
                } else {
                    (self.controller, self.sensors)
                };
                if !is_multiple_of(large, small) {
                    return Err(ControlError::Incommensurate {
                        a: self.sensors,
                        b: self.controller,
                    });
                }
                // Equal to `small` up to tolerance; gcd also validates both.
                Ok(Some(gcd(small, large)?.min(small)))
            }
        }
    }

    /// Breakpoints from `start` to `end` inclusive, one per stepper period.
    ///
    /// Continuous updates need no intermediate stops, so the result is just
    /// `[start, end]`. The last discrete breakpoint is replaced by `end` when
    /// the two are closer than [`STEPPER_MIN_TIMESTEP`].
    pub fn breakpoints(&self, start: f64, end: f64) -> ControlResult<Vec<f64>> {
        if !start.is_finite() || !end.is_finite() || end < start {
            return Err(ControlError::InvalidArg {
                what: "breakpoint window must be finite and ordered",
            });
        }
        let mut times = vec![start];
        if let Some(period) = self.stepper_period()? {
            let mut k = 1u64;
            loop {
                let t = start + k as f64 * period;
                if t >= end - STEPPER_MIN_TIMESTEP {
                    break;
                }
                times.push(t);
                k += 1;
            }
        }
        if end > start {
            times.push(end);
        }
        Ok(times)
    }
}

/// Whether a quantity refreshed every `period` seconds is due at time `t`.
///
/// Continuous quantities (`period <= 0`) are always due.
pub fn is_update_due(t: f64, period: f64) -> bool {
    if period <= 0.0 {
        return true;
    }
    let until_next = period - t.rem_euclid(period);
    until_next < STEPPER_MIN_TIMESTEP || period - until_next < STEPPER_MIN_TIMESTEP
}
