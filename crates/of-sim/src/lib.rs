//! Trajectory integration for black-box dynamics.
//!
//! Provides:
//! - `Dynamics` trait for `(t, x) -> dx/dt` callbacks, with optional context
//! - Explicit steppers: Dormand-Prince 5(4), classical RK4, explicit Euler
//! - Error-controlled sub-stepping between caller breakpoints
//! - Exact stops at every requested time, recorded into a `Trajectory`

pub mod error;
pub mod integrator;
pub mod model;
pub mod sim;
pub mod trajectory;

// Internal modules
mod events;

// Re-exports for public API
pub use error::{SimError, SimResult};
pub use integrator::{
    Dopri5, EulerExplicit, RungeKutta4, StepAttempt, StepController, StepMethod, Stepper,
};
pub use model::{Dynamics, DynamicsFault, Evaluator, FromFn, State, WithContext, from_fn};
pub use sim::{
    IntegratorOptions, NullObserver, StepEvent, StepObserver, integrate, integrate_with_observer,
};
pub use trajectory::{IntegrationStats, Trajectory};
