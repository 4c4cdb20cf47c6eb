//! Breakpoint-driven integration runner.

use crate::error::{SimError, SimResult};
use crate::events::{plan_step, validate_breakpoints, validate_state};
use crate::integrator::{
    Dopri5, EulerExplicit, RungeKutta4, StepController, StepMethod, Stepper, initial_step,
};
use crate::model::{Dynamics, Evaluator, State};
use crate::trajectory::{IntegrationStats, Trajectory};
use of_core::{STEPPER_MIN_TIMESTEP, Tolerances};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

/// Options for integration calls.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegratorOptions {
    /// Step method (default: Dormand-Prince 5(4))
    pub method: StepMethod,
    /// Relative tolerance
    pub rel_tol: f64,
    /// Absolute tolerance
    pub abs_tol: f64,
    /// Smallest step the adaptive controller may request before giving up
    pub min_step: f64,
    /// Largest internal step; the step size of fixed-step methods
    pub max_step: f64,
    /// First step guess; estimated from the dynamics when absent
    pub initial_step: Option<f64>,
    /// Maximum number of accepted steps per call (safety limit)
    pub max_steps: usize,
    /// Consecutive rejected attempts tolerated before giving up
    pub max_successive_failures: usize,
    /// Step-size controller factors
    pub controller: StepController,
}

impl Default for IntegratorOptions {
    fn default() -> Self {
        Self {
            method: StepMethod::default(),
            rel_tol: 1e-8,
            abs_tol: 1e-8,
            min_step: STEPPER_MIN_TIMESTEP,
            max_step: 1e-3,
            initial_step: None,
            max_steps: 10_000_000,
            max_successive_failures: 1000,
            controller: StepController::default(),
        }
    }
}

impl IntegratorOptions {
    pub fn tolerances(&self) -> Tolerances {
        Tolerances {
            abs: self.abs_tol,
            rel: self.rel_tol,
        }
    }

    pub fn validate(&self) -> SimResult<()> {
        if !self.abs_tol.is_finite() || self.abs_tol <= 0.0 {
            return Err(SimError::invalid("abs_tol must be positive and finite"));
        }
        if !self.rel_tol.is_finite() || self.rel_tol < 0.0 {
            return Err(SimError::invalid("rel_tol must be non-negative and finite"));
        }
        if !self.min_step.is_finite() || self.min_step <= 0.0 {
            return Err(SimError::invalid("min_step must be positive and finite"));
        }
        if !self.max_step.is_finite() || self.max_step < self.min_step {
            return Err(SimError::invalid("max_step must be finite and >= min_step"));
        }
        if let Some(h) = self.initial_step {
            if !h.is_finite() || h <= 0.0 {
                return Err(SimError::invalid("initial_step must be positive and finite"));
            }
        }
        if self.max_steps == 0 {
            return Err(SimError::invalid("max_steps must be positive"));
        }
        let c = &self.controller;
        if !(c.safety > 0.0 && c.safety <= 1.0) {
            return Err(SimError::invalid("controller safety must be in (0, 1]"));
        }
        if !(c.min_factor > 0.0 && c.min_factor < 1.0 && c.max_factor >= 1.0) {
            return Err(SimError::invalid(
                "controller factors must satisfy 0 < min_factor < 1 <= max_factor",
            ));
        }
        Ok(())
    }
}

/// One accepted internal step.
#[derive(Clone, Copy, Debug)]
pub struct StepEvent<'a> {
    /// Index of the breakpoint being approached.
    pub interval: usize,
    /// Time reached by the step.
    pub t: f64,
    /// Size of the step.
    pub dt: f64,
    /// State reached by the step.
    pub x: &'a State,
    /// Scaled local error estimate (0 for fixed-step methods).
    pub error: f64,
}

/// Receives every accepted internal step, in order.
pub trait StepObserver {
    fn on_step(&mut self, event: &StepEvent<'_>);
}

/// Observer that ignores every step.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullObserver;

impl StepObserver for NullObserver {
    fn on_step(&mut self, _event: &StepEvent<'_>) {}
}

impl<F> StepObserver for F
where
    F: FnMut(&StepEvent<'_>),
{
    fn on_step(&mut self, event: &StepEvent<'_>) {
        self(event)
    }
}

/// Integrate `dynamics` from `(initial_time, initial_state)` and sample the
/// state at each of `times`.
///
/// Every requested time is an exact stop of the integrator: the returned
/// trajectory has `t[i] == times[i]` and one state per breakpoint.
pub fn integrate<D: Dynamics + ?Sized>(
    dynamics: &mut D,
    initial_time: f64,
    initial_state: &State,
    times: &[f64],
    options: &IntegratorOptions,
) -> SimResult<Trajectory> {
    integrate_with_observer(
        dynamics,
        initial_time,
        initial_state,
        times,
        options,
        &mut NullObserver,
    )
}

/// Same as [`integrate`], also reporting each accepted internal step.
pub fn integrate_with_observer<D, O>(
    dynamics: &mut D,
    initial_time: f64,
    initial_state: &State,
    times: &[f64],
    options: &IntegratorOptions,
    observer: &mut O,
) -> SimResult<Trajectory>
where
    D: Dynamics + ?Sized,
    O: StepObserver + ?Sized,
{
    options.validate()?;
    validate_breakpoints(initial_time, times)?;
    validate_state(initial_state)?;

    debug!(
        method = ?options.method,
        breakpoints = times.len(),
        dim = initial_state.len(),
        "integrating trajectory"
    );

    let run = Run {
        dynamics,
        initial_time,
        initial_state,
        times,
        options,
        observer,
    };
    match options.method {
        StepMethod::Dopri5 => run.execute(&Dopri5),
        StepMethod::RungeKutta4 => run.execute(&RungeKutta4),
        StepMethod::EulerExplicit => run.execute(&EulerExplicit),
    }
}

struct Run<'a, D: ?Sized, O: ?Sized> {
    dynamics: &'a mut D,
    initial_time: f64,
    initial_state: &'a State,
    times: &'a [f64],
    options: &'a IntegratorOptions,
    observer: &'a mut O,
}

impl<D, O> Run<'_, D, O>
where
    D: Dynamics + ?Sized,
    O: StepObserver + ?Sized,
{
    fn execute<S: Stepper>(self, stepper: &S) -> SimResult<Trajectory> {
        let Run {
            dynamics,
            initial_time,
            initial_state,
            times,
            options,
            observer,
        } = self;

        let tol = options.tolerances();
        let order = stepper.error_order();
        let mut eval = Evaluator::new(dynamics);
        let mut traj = Trajectory::with_capacity(times.len());

        let mut t = initial_time;
        let mut x = initial_state.clone();
        // Derivative at (t, x); evaluated lazily so an empty first interval
        // never calls the dynamics.
        let mut dxdt: Option<State> = None;
        let mut dt: Option<f64> = match order {
            None => Some(options.max_step),
            Some(_) => options.initial_step.map(|h| h.min(options.max_step)),
        };

        let mut accepted = 0usize;
        let mut rejected = 0usize;
        let mut successive_failures = 0usize;

        for (interval, &target) in times.iter().enumerate() {
            let mut substeps = 0usize;
            while t < target {
                let f0 = match dxdt.take() {
                    Some(f0) => f0,
                    None => eval.eval(t, &x)?,
                };
                let dt_req = match dt {
                    Some(h) => h,
                    None => initial_step(
                        &mut eval,
                        t,
                        &x,
                        &f0,
                        order.unwrap_or(1),
                        tol,
                        options.max_step,
                    )?,
                };

                let plan = plan_step(t, target, dt_req, options.min_step);
                // `h` is the exact increment between the representable times
                // `t` and `t_next`.
                let (t_next, h) = if plan.reaches_target {
                    (target, plan.dt)
                } else {
                    let t_end = t + plan.dt;
                    if t_end >= target {
                        (target, target - t)
                    } else {
                        (t_end, t_end - t)
                    }
                };
                if h <= 0.0 {
                    traj.stats = stats(&eval, accepted, rejected);
                    return Err(diverged(
                        traj,
                        interval,
                        t,
                        plan.dt,
                        "step size below time resolution",
                    ));
                }

                let attempt = stepper.try_step(&mut eval, t, &x, &f0, h, tol)?;
                let factor = options.controller.factor(attempt.error, order);

                if attempt.error <= 1.0 {
                    t = t_next;
                    x = attempt.x;
                    dxdt = Some(attempt.dxdt);
                    accepted += 1;
                    substeps += 1;
                    successive_failures = 0;

                    observer.on_step(&StepEvent {
                        interval,
                        t,
                        dt: h,
                        x: &x,
                        error: attempt.error,
                    });

                    let mut next = match order {
                        Some(_) => h * factor,
                        None => options.max_step,
                    };
                    // A step shortened by the breakpoint says nothing about the
                    // achievable step size: resume from the pre-clip estimate.
                    if plan.clipped {
                        next = next.max(dt_req);
                    }
                    if next < options.min_step {
                        traj.stats = stats(&eval, accepted, rejected);
                        return Err(diverged(
                            traj,
                            interval,
                            t,
                            next,
                            "step size fell below min_step",
                        ));
                    }
                    dt = Some(next.min(options.max_step));

                    if accepted > options.max_steps {
                        traj.stats = stats(&eval, accepted, rejected);
                        return Err(diverged(
                            traj,
                            interval,
                            t,
                            h,
                            "maximum number of steps exceeded",
                        ));
                    }
                } else {
                    rejected += 1;
                    successive_failures += 1;
                    dxdt = Some(f0);
                    let next = h * factor;
                    trace!(
                        interval,
                        t,
                        dt = h,
                        error = attempt.error,
                        "step rejected"
                    );

                    if next < options.min_step {
                        traj.stats = stats(&eval, accepted, rejected);
                        return Err(diverged(
                            traj,
                            interval,
                            t,
                            next,
                            "step size fell below min_step",
                        ));
                    }
                    if successive_failures > options.max_successive_failures {
                        traj.stats = stats(&eval, accepted, rejected);
                        return Err(diverged(
                            traj,
                            interval,
                            t,
                            next,
                            "too many successive step failures",
                        ));
                    }
                    dt = Some(next);
                }
            }

            traj.push(target, x.clone());
            debug!(interval, t = target, substeps, "breakpoint reached");
        }

        traj.stats = stats(&eval, accepted, rejected);
        debug!(
            dynamics_evals = traj.stats.dynamics_evals,
            accepted_steps = accepted,
            rejected_steps = rejected,
            "integration complete"
        );
        Ok(traj)
    }
}

fn stats<D: Dynamics + ?Sized>(
    eval: &Evaluator<'_, D>,
    accepted: usize,
    rejected: usize,
) -> IntegrationStats {
    IntegrationStats {
        dynamics_evals: eval.evals(),
        accepted_steps: accepted,
        rejected_steps: rejected,
    }
}

fn diverged(
    partial: Trajectory,
    interval: usize,
    t: f64,
    dt: f64,
    reason: &'static str,
) -> SimError {
    warn!(
        interval,
        t,
        dt,
        reason,
        completed = partial.len(),
        "integration diverged"
    );
    SimError::IntegrationDivergence {
        interval,
        t,
        dt,
        reason,
        partial: Box::new(partial),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_defaults() {
        let opts = IntegratorOptions::default();
        assert_eq!(opts.method, StepMethod::Dopri5);
        assert_eq!(opts.rel_tol, 1e-8);
        assert_eq!(opts.abs_tol, 1e-8);
        assert_eq!(opts.min_step, STEPPER_MIN_TIMESTEP);
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn options_invalid() {
        let bad = [
            IntegratorOptions {
                abs_tol: 0.0,
                ..Default::default()
            },
            IntegratorOptions {
                rel_tol: f64::NAN,
                ..Default::default()
            },
            IntegratorOptions {
                max_step: 1e-12,
                ..Default::default()
            },
            IntegratorOptions {
                initial_step: Some(-1.0),
                ..Default::default()
            },
            IntegratorOptions {
                max_steps: 0,
                ..Default::default()
            },
        ];
        for opts in &bad {
            assert!(
                matches!(opts.validate(), Err(SimError::InvalidInput { .. })),
                "{opts:?} should be rejected"
            );
        }
    }

    #[test]
    fn options_from_yaml_fill_defaults() {
        let yaml = "method: runge_kutta_4\nmax_step: 0.002\ncontroller:\n  safety: 0.8\n";
        let opts: IntegratorOptions = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(opts.method, StepMethod::RungeKutta4);
        assert_eq!(opts.max_step, 0.002);
        assert_eq!(opts.controller.safety, 0.8);
        assert_eq!(opts.controller.max_factor, 5.0);
        assert_eq!(opts.rel_tol, 1e-8);
    }
}
