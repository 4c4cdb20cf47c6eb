//! Dynamics trait for pluggable dynamic systems.

use crate::error::{SimError, SimResult};
use nalgebra::DVector;
use thiserror::Error;

/// State vector. Position and velocity blocks are stored back to back when a
/// system has both.
pub type State = DVector<f64>;

/// Failure reported by a dynamics callback.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message}")]
pub struct DynamicsFault {
    pub message: String,
}

impl DynamicsFault {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Trait for dynamic systems `dx/dt = f(t, x)`.
///
/// The integrator may call `rhs` several times per requested interval, at
/// stage times that are non-decreasing within one step attempt. A rejected
/// attempt restarts from the last accepted time, so implementations must not
/// assume one call per breakpoint or globally increasing time.
pub trait Dynamics {
    /// Compute the state derivative at `(t, x)`. The result must have the
    /// same dimension as `x`.
    fn rhs(&mut self, t: f64, x: &State) -> Result<State, DynamicsFault>;
}

impl<F> Dynamics for F
where
    F: FnMut(f64, &State) -> Result<State, DynamicsFault>,
{
    fn rhs(&mut self, t: f64, x: &State) -> Result<State, DynamicsFault> {
        self(t, x)
    }
}

/// Adapter for closures that cannot fail.
pub struct FromFn<F>(F);

/// Wrap an infallible `(t, x) -> dx/dt` closure.
pub fn from_fn<F>(f: F) -> FromFn<F>
where
    F: FnMut(f64, &State) -> State,
{
    FromFn(f)
}

impl<F> Dynamics for FromFn<F>
where
    F: FnMut(f64, &State) -> State,
{
    fn rhs(&mut self, t: f64, x: &State) -> Result<State, DynamicsFault> {
        Ok((self.0)(t, x))
    }
}

/// Dynamics that read an explicit context (sensor data, held commands, ...)
/// alongside `(t, x)`.
///
/// The context is immutable during an integration call. Callers update it
/// between calls, typically at controller breakpoints.
pub struct WithContext<C, F> {
    context: C,
    f: F,
}

impl<C, F> WithContext<C, F>
where
    F: FnMut(f64, &State, &C) -> Result<State, DynamicsFault>,
{
    pub fn new(context: C, f: F) -> Self {
        Self { context, f }
    }

    pub fn context(&self) -> &C {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut C {
        &mut self.context
    }

    pub fn into_context(self) -> C {
        self.context
    }
}

impl<C, F> Dynamics for WithContext<C, F>
where
    F: FnMut(f64, &State, &C) -> Result<State, DynamicsFault>,
{
    fn rhs(&mut self, t: f64, x: &State) -> Result<State, DynamicsFault> {
        (self.f)(t, x, &self.context)
    }
}

/// Counts dynamics evaluations and turns callback failures into
/// [`SimError::DynamicsEvaluation`].
pub struct Evaluator<'a, D: ?Sized> {
    dynamics: &'a mut D,
    evals: usize,
}

impl<'a, D: Dynamics + ?Sized> Evaluator<'a, D> {
    pub fn new(dynamics: &'a mut D) -> Self {
        Self { dynamics, evals: 0 }
    }

    /// Number of `rhs` calls made so far.
    pub fn evals(&self) -> usize {
        self.evals
    }

    pub fn eval(&mut self, t: f64, x: &State) -> SimResult<State> {
        self.evals += 1;
        let dxdt = self
            .dynamics
            .rhs(t, x)
            .map_err(|fault| SimError::DynamicsEvaluation {
                t,
                state: x.as_slice().to_vec(),
                message: fault.message,
            })?;
        if dxdt.len() != x.len() {
            return Err(SimError::DynamicsEvaluation {
                t,
                state: x.as_slice().to_vec(),
                message: format!(
                    "derivative has dimension {} but state has dimension {}",
                    dxdt.len(),
                    x.len()
                ),
            });
        }
        Ok(dxdt)
    }
}
