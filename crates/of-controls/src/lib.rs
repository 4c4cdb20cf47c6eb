//! Caller-side timing for breakpoint-driven integration.
//!
//! The integrator stops exactly at the times it is given. This crate decides
//! which times those are:
//! - sampled controllers with a zero-order hold between samples
//! - sensor and controller update periods reduced to a single stepper period
//! - observation stacking grids aligned on the simulation step

pub mod error;
pub mod periods;
pub mod sampled;
pub mod stacking;

pub use error::{ControlError, ControlResult};
pub use periods::{UpdatePeriods, is_update_due};
pub use sampled::{SampleClock, SampleConfig, ZeroOrderHold};
pub use stacking::StackingGrid;
