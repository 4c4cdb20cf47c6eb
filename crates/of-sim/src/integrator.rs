//! Explicit one-step methods and step-size control.

use crate::error::SimResult;
use crate::model::{Dynamics, Evaluator, State};
use of_core::Tolerances;
use serde::{Deserialize, Serialize};

/// Outcome of one step attempt from `(t, x)` over `dt`.
#[derive(Clone, Debug)]
pub struct StepAttempt {
    /// Candidate state at `t + dt`.
    pub x: State,
    /// Derivative at `(t + dt, x)`, reused as the first stage of the next step.
    pub dxdt: State,
    /// Scaled local error; the step is acceptable iff `error <= 1`.
    pub error: f64,
}

/// Trait for explicit one-step methods.
pub trait Stepper {
    /// Order of the embedded error estimate, or `None` for fixed-step schemes.
    fn error_order(&self) -> Option<u32>;

    /// Attempt one step. `dxdt` must be the derivative at `(t, x)`.
    fn try_step<D: Dynamics + ?Sized>(
        &self,
        eval: &mut Evaluator<'_, D>,
        t: f64,
        x: &State,
        dxdt: &State,
        dt: f64,
        tol: Tolerances,
    ) -> SimResult<StepAttempt>;
}

/// `x + dt * sum(c_i * k_i)`, skipping zero coefficients.
fn combine(x: &State, dt: f64, terms: &[(f64, &State)]) -> State {
    let mut out = x.clone();
    for &(c, k) in terms {
        if c != 0.0 {
            out.axpy(dt * c, k, 1.0);
        }
    }
    out
}

/// Fixed-step schemes have no error estimate: a finite result is always
/// acceptable and anything else forces a cutback.
fn fixed_step_error(x: &State) -> f64 {
    if x.iter().all(|v| v.is_finite()) {
        0.0
    } else {
        f64::INFINITY
    }
}

/// Classical RK4 (Runge-Kutta 4th order) integrator.
#[derive(Clone, Debug)]
pub struct RungeKutta4;

impl Stepper for RungeKutta4 {
    fn error_order(&self) -> Option<u32> {
        None
    }

    fn try_step<D: Dynamics + ?Sized>(
        &self,
        eval: &mut Evaluator<'_, D>,
        t: f64,
        x: &State,
        dxdt: &State,
        dt: f64,
        _tol: Tolerances,
    ) -> SimResult<StepAttempt> {
        let k1 = dxdt;

        let x2 = combine(x, dt, &[(0.5, k1)]);
        let k2 = eval.eval(t + 0.5 * dt, &x2)?;

        let x3 = combine(x, dt, &[(0.5, &k2)]);
        let k3 = eval.eval(t + 0.5 * dt, &x3)?;

        let x4 = combine(x, dt, &[(1.0, &k3)]);
        let k4 = eval.eval(t + dt, &x4)?;

        // x_new = x + (dt/6) * (k1 + 2*k2 + 2*k3 + k4)
        let x_new = combine(
            x,
            dt,
            &[(1.0 / 6.0, k1), (1.0 / 3.0, &k2), (1.0 / 3.0, &k3), (1.0 / 6.0, &k4)],
        );
        let error = fixed_step_error(&x_new);
        if !error.is_finite() {
            return Ok(StepAttempt {
                dxdt: x_new.clone(),
                x: x_new,
                error,
            });
        }
        let dxdt_new = eval.eval(t + dt, &x_new)?;

        Ok(StepAttempt {
            x: x_new,
            dxdt: dxdt_new,
            error,
        })
    }
}

/// Forward Euler (explicit, 1st order).
/// Calls rhs() once per step, to refresh the derivative at the new state.
#[derive(Clone, Debug)]
pub struct EulerExplicit;

impl Stepper for EulerExplicit {
    fn error_order(&self) -> Option<u32> {
        None
    }

    fn try_step<D: Dynamics + ?Sized>(
        &self,
        eval: &mut Evaluator<'_, D>,
        t: f64,
        x: &State,
        dxdt: &State,
        dt: f64,
        _tol: Tolerances,
    ) -> SimResult<StepAttempt> {
        let x_new = combine(x, dt, &[(1.0, dxdt)]);
        let error = fixed_step_error(&x_new);
        if !error.is_finite() {
            return Ok(StepAttempt {
                dxdt: x_new.clone(),
                x: x_new,
                error,
            });
        }
        let dxdt_new = eval.eval(t + dt, &x_new)?;
        Ok(StepAttempt {
            x: x_new,
            dxdt: dxdt_new,
            error,
        })
    }
}

// Dormand-Prince 5(4) tableau.
const C2: f64 = 1.0 / 5.0;
const C3: f64 = 3.0 / 10.0;
const C4: f64 = 4.0 / 5.0;
const C5: f64 = 8.0 / 9.0;

const A21: f64 = 1.0 / 5.0;
const A31: f64 = 3.0 / 40.0;
const A32: f64 = 9.0 / 40.0;
const A41: f64 = 44.0 / 45.0;
const A42: f64 = -56.0 / 15.0;
const A43: f64 = 32.0 / 9.0;
const A51: f64 = 19372.0 / 6561.0;
const A52: f64 = -25360.0 / 2187.0;
const A53: f64 = 64448.0 / 6561.0;
const A54: f64 = -212.0 / 729.0;
const A61: f64 = 9017.0 / 3168.0;
const A62: f64 = -355.0 / 33.0;
const A63: f64 = 46732.0 / 5247.0;
const A64: f64 = 49.0 / 176.0;
const A65: f64 = -5103.0 / 18656.0;
const A71: f64 = 35.0 / 384.0;
const A73: f64 = 500.0 / 1113.0;
const A74: f64 = 125.0 / 192.0;
const A75: f64 = -2187.0 / 6784.0;
const A76: f64 = 11.0 / 84.0;

// b - b_hat (5th order minus embedded 4th order weights)
const E1: f64 = 71.0 / 57600.0;
const E3: f64 = -71.0 / 16695.0;
const E4: f64 = 71.0 / 1920.0;
const E5: f64 = -17253.0 / 339200.0;
const E6: f64 = 22.0 / 525.0;
const E7: f64 = -1.0 / 40.0;

/// Embedded Dormand-Prince 5(4) with FSAL.
///
/// Propagates the 5th order solution; the difference with the embedded 4th
/// order solution gives the local error estimate. The last stage is the
/// derivative at the new point, so an accepted step costs six evaluations.
#[derive(Clone, Debug)]
pub struct Dopri5;

impl Stepper for Dopri5 {
    fn error_order(&self) -> Option<u32> {
        Some(5)
    }

    fn try_step<D: Dynamics + ?Sized>(
        &self,
        eval: &mut Evaluator<'_, D>,
        t: f64,
        x: &State,
        dxdt: &State,
        dt: f64,
        tol: Tolerances,
    ) -> SimResult<StepAttempt> {
        let k1 = dxdt;

        let x2 = combine(x, dt, &[(A21, k1)]);
        let k2 = eval.eval(t + C2 * dt, &x2)?;

        let x3 = combine(x, dt, &[(A31, k1), (A32, &k2)]);
        let k3 = eval.eval(t + C3 * dt, &x3)?;

        let x4 = combine(x, dt, &[(A41, k1), (A42, &k2), (A43, &k3)]);
        let k4 = eval.eval(t + C4 * dt, &x4)?;

        let x5 = combine(x, dt, &[(A51, k1), (A52, &k2), (A53, &k3), (A54, &k4)]);
        let k5 = eval.eval(t + C5 * dt, &x5)?;

        let x6 = combine(
            x,
            dt,
            &[(A61, k1), (A62, &k2), (A63, &k3), (A64, &k4), (A65, &k5)],
        );
        let k6 = eval.eval(t + dt, &x6)?;

        let x_new = combine(
            x,
            dt,
            &[(A71, k1), (A73, &k3), (A74, &k4), (A75, &k5), (A76, &k6)],
        );
        let k7 = eval.eval(t + dt, &x_new)?;

        let mut error: f64 = 0.0;
        for i in 0..x.len() {
            let err_i = dt
                * (E1 * k1[i] + E3 * k3[i] + E4 * k4[i] + E5 * k5[i] + E6 * k6[i] + E7 * k7[i]);
            let scale = tol.abs + tol.rel * x[i].abs().max(x_new[i].abs());
            let scaled = err_i.abs() / scale;
            // NaN must not be swallowed by f64::max.
            if scaled.is_nan() {
                error = f64::INFINITY;
                break;
            }
            error = error.max(scaled);
        }

        Ok(StepAttempt {
            x: x_new,
            dxdt: k7,
            error,
        })
    }
}

/// Step-size controller using an I-controller
///
/// dt_new = safety * dt * error^(-1/p)
/// where p is the order of the error estimate.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StepController {
    /// Safety factor (0.8-0.9 typical)
    pub safety: f64,
    /// Minimum reduction factor per step
    pub min_factor: f64,
    /// Maximum growth factor per step
    pub max_factor: f64,
}

impl Default for StepController {
    fn default() -> Self {
        Self {
            safety: 0.9,
            min_factor: 0.2,
            max_factor: 5.0,
        }
    }
}

impl StepController {
    /// Factor applied to the attempted step size to get the next one.
    ///
    /// Never grows the step after a rejection. Fixed-step schemes (`order`
    /// of `None`) keep their size when accepted and cut back by
    /// `min_factor` otherwise.
    pub fn factor(&self, error: f64, order: Option<u32>) -> f64 {
        let accepted = error <= 1.0;
        let Some(order) = order else {
            return if accepted { 1.0 } else { self.min_factor };
        };
        if error == 0.0 {
            return self.max_factor;
        }
        if !error.is_finite() {
            return self.min_factor;
        }
        let factor = (self.safety * error.powf(-1.0 / f64::from(order)))
            .clamp(self.min_factor, self.max_factor);
        if accepted { factor } else { factor.min(1.0) }
    }
}

/// Initial step guess for an adaptive method of the given order.
///
/// Hairer, Nørsett & Wanner, "Solving ODEs I", section II.4: balance the
/// Euler step against the scale of the state and the estimated second
/// derivative. Costs one dynamics evaluation.
pub(crate) fn initial_step<D: Dynamics + ?Sized>(
    eval: &mut Evaluator<'_, D>,
    t0: f64,
    x0: &State,
    f0: &State,
    order: u32,
    tol: Tolerances,
    max_step: f64,
) -> SimResult<f64> {
    let scaled_norm = |v: &State| -> f64 {
        v.iter()
            .zip(x0.iter())
            .map(|(vi, xi)| (vi / (tol.abs + tol.rel * xi.abs())).abs())
            .fold(0.0, f64::max)
    };

    let d0 = scaled_norm(x0);
    let d1 = scaled_norm(f0);
    let h0 = if d0 < 1e-5 || d1 < 1e-5 {
        1e-6
    } else {
        0.01 * d0 / d1
    };
    let h0 = h0.min(max_step);

    let x1 = combine(x0, h0, &[(1.0, f0)]);
    let f1 = eval.eval(t0 + h0, &x1)?;
    let d2 = scaled_norm(&(f1 - f0)) / h0;

    let dmax = d1.max(d2);
    let h1 = if dmax <= 1e-15 {
        (h0 * 1e-3).max(1e-6)
    } else {
        (0.01 / dmax).powf(1.0 / f64::from(order))
    };

    let h = (100.0 * h0).min(h1).min(max_step);
    if h.is_finite() && h > 0.0 {
        Ok(h)
    } else {
        Ok(h0)
    }
}

/// Integrator selection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepMethod {
    /// Adaptive Dormand-Prince 5(4) (default, error controlled).
    #[default]
    #[serde(rename = "runge_kutta_dopri5")]
    Dopri5,
    /// Classical RK4 at a fixed `max_step`.
    #[serde(rename = "runge_kutta_4")]
    RungeKutta4,
    /// Explicit Euler at a fixed `max_step`.
    #[serde(rename = "euler_explicit")]
    EulerExplicit,
}
