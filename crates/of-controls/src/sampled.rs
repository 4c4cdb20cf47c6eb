//! Sampled execution primitives for digital controllers.
//!
//! A controller runs at discrete sample times `t0 + k * dt` and its output is
//! held constant in between (zero-order hold). Sample times are computed from
//! the sample index rather than by repeated addition, so the k-th sample time
//! does not drift however long the run.

use crate::error::{ControlError, ControlResult};
use of_core::STEPPER_MIN_TIMESTEP;
use serde::{Deserialize, Serialize};

/// Sample configuration for a controller.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SampleConfig {
    /// Sample period in seconds.
    pub dt: f64,
}

impl SampleConfig {
    /// Create a sample configuration with period `dt` (seconds).
    pub fn new(dt: f64) -> ControlResult<Self> {
        if !dt.is_finite() || dt <= 0.0 {
            return Err(ControlError::InvalidArg {
                what: "sample period must be positive and finite",
            });
        }
        Ok(Self { dt })
    }

    /// Create a sample configuration from a frequency in Hz.
    pub fn from_frequency(freq_hz: f64) -> ControlResult<Self> {
        if !freq_hz.is_finite() || freq_hz <= 0.0 {
            return Err(ControlError::InvalidArg {
                what: "sample frequency must be positive and finite",
            });
        }
        Self::new(1.0 / freq_hz)
    }

    pub fn frequency(&self) -> f64 {
        1.0 / self.dt
    }
}

/// Tracks when a sampled controller should execute next.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleClock {
    pub config: SampleConfig,
    /// Time of sample zero.
    pub origin: f64,
    /// Index of the next scheduled sample.
    pub next_index: u64,
}

impl SampleClock {
    /// Create a clock whose first sample is due one period after
    /// `initial_time`.
    pub fn new(config: SampleConfig, initial_time: f64) -> Self {
        Self {
            config,
            origin: initial_time,
            next_index: 1,
        }
    }

    /// Time of the `k`-th sample.
    pub fn sample_time(&self, k: u64) -> f64 {
        self.origin + k as f64 * self.config.dt
    }

    pub fn next_sample_time(&self) -> f64 {
        self.sample_time(self.next_index)
    }

    /// Whether the next sample is due at `current_time`.
    ///
    /// Times within [`STEPPER_MIN_TIMESTEP`] of the sample time count as due.
    pub fn should_sample(&self, current_time: f64) -> bool {
        current_time >= self.next_sample_time() - STEPPER_MIN_TIMESTEP
    }

    /// Move to the next sample. Call after a sample has been executed.
    pub fn advance(&mut self) {
        self.next_index += 1;
    }

    /// Skip every sample that is due at `current_time`.
    pub fn advance_past(&mut self, current_time: f64) {
        let elapsed = (current_time - self.origin + STEPPER_MIN_TIMESTEP) / self.config.dt;
        if elapsed.is_finite() && elapsed >= 0.0 {
            self.next_index = self.next_index.max(elapsed.floor() as u64 + 1);
        }
    }

    /// Restart the clock at `current_time`.
    pub fn reset(&mut self, current_time: f64) {
        self.origin = current_time;
        self.next_index = 1;
    }

    pub fn time_until_sample(&self, current_time: f64) -> f64 {
        (self.next_sample_time() - current_time).max(0.0)
    }

    /// Sample times strictly after the current one, up to and including
    /// `end_time`.
    pub fn upcoming(&self, end_time: f64) -> impl Iterator<Item = f64> + '_ {
        (self.next_index..)
            .map(|k| self.sample_time(k))
            .take_while(move |&t| t <= end_time + STEPPER_MIN_TIMESTEP)
    }
}

/// Holds the last sampled value between samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZeroOrderHold {
    pub value: f64,
    pub clock: SampleClock,
}

impl ZeroOrderHold {
    pub fn new(config: SampleConfig, initial_time: f64, initial_value: f64) -> Self {
        Self {
            value: initial_value,
            clock: SampleClock::new(config, initial_time),
        }
    }

    pub fn get(&self) -> f64 {
        self.value
    }

    /// Latch `new_value` if a sample is due at `current_time`.
    ///
    /// Returns `true` if the value was updated. Samples missed since the last
    /// update are skipped, not replayed.
    pub fn update(&mut self, current_time: f64, new_value: f64) -> bool {
        if !self.clock.should_sample(current_time) {
            return false;
        }
        self.value = new_value;
        self.clock.advance_past(current_time);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_config_creation() {
        let config = SampleConfig::new(0.1).unwrap();
        assert_eq!(config.dt, 0.1);
        assert!((config.frequency() - 10.0).abs() < 1e-10);

        let config = SampleConfig::from_frequency(10.0).unwrap();
        assert!((config.dt - 0.1).abs() < 1e-10);
    }

    #[test]
    fn sample_config_rejects_bad_periods() {
        assert!(SampleConfig::new(0.0).is_err());
        assert!(SampleConfig::new(-0.1).is_err());
        assert!(SampleConfig::new(f64::NAN).is_err());
        assert!(SampleConfig::from_frequency(0.0).is_err());
    }

    #[test]
    fn sample_clock_basic() {
        let mut clock = SampleClock::new(SampleConfig::new(0.1).unwrap(), 0.0);

        assert!(!clock.should_sample(0.0));
        assert!(clock.should_sample(0.1));

        clock.advance();
        assert!(!clock.should_sample(0.1));
        assert!(clock.should_sample(0.2));
    }

    #[test]
    fn sample_clock_tolerates_rounding() {
        let clock = SampleClock::new(SampleConfig::new(0.1).unwrap(), 0.0);
        assert!(clock.should_sample(0.1 - 1e-12));
        assert!(!clock.should_sample(0.1 - 1e-6));
    }

    #[test]
    fn sample_times_do_not_drift() {
        let mut clock = SampleClock::new(SampleConfig::new(0.01).unwrap(), 0.0);
        let mut summed = 0.0;
        for _ in 0..100_000 {
            clock.advance();
            summed += 0.01;
        }
        assert_eq!(clock.sample_time(100_000), 1000.0);
        assert_ne!(summed, 1000.0);
    }

    #[test]
    fn upcoming_lists_remaining_samples() {
        let clock = SampleClock::new(SampleConfig::new(0.25).unwrap(), 1.0);
        let times: Vec<f64> = clock.upcoming(2.0).collect();
        assert_eq!(times, vec![1.25, 1.5, 1.75, 2.0]);
    }

    #[test]
    fn zero_order_hold_basic() {
        let mut zoh = ZeroOrderHold::new(SampleConfig::new(0.1).unwrap(), 0.0, 0.5);
        assert_eq!(zoh.get(), 0.5);

        assert!(!zoh.update(0.05, 1.0));
        assert_eq!(zoh.get(), 0.5);

        assert!(zoh.update(0.1, 1.0));
        assert_eq!(zoh.get(), 1.0);
        assert!(!zoh.update(0.15, 2.0));
    }

    #[test]
    fn zero_order_hold_skips_missed_samples() {
        let mut zoh = ZeroOrderHold::new(SampleConfig::new(0.1).unwrap(), 0.0, 0.0);
        assert!(zoh.update(0.35, 1.0));
        assert_eq!(zoh.clock.next_sample_time(), 0.4);
        assert!(!zoh.update(0.39, 2.0));
        assert!(zoh.update(0.4, 2.0));
    }

    #[test]
    fn time_until_sample() {
        let clock = SampleClock::new(SampleConfig::new(0.1).unwrap(), 0.0);
        assert!((clock.time_until_sample(0.0) - 0.1).abs() < 1e-10);
        assert!((clock.time_until_sample(0.05) - 0.05).abs() < 1e-10);
        assert_eq!(clock.time_until_sample(0.15), 0.0);
    }
}
