use crate::{OfError, OfResult};

/// Floating point type used throughout system
pub type Real = f64;

/// Smallest time increment the integrator will attempt.
///
/// Gaps narrower than this between a step end and a breakpoint are closed by
/// snapping onto the breakpoint.
pub const STEPPER_MIN_TIMESTEP: Real = 1e-10;

/// One tolerance for everything
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Tolerances {
    pub abs: Real,
    pub rel: Real,
}

impl Default for Tolerances {
    fn default() -> Self {
        Self {
            abs: 1e-12,
            rel: 1e-9,
        }
    }
}

/// Tolerance used when reducing update periods.
pub const PERIOD_TOLERANCES: Tolerances = Tolerances {
    abs: 1e-8,
    rel: 1e-5,
};

pub fn nearly_equal(a: Real, b: Real, tol: Tolerances) -> bool {
    let diff = (a - b).abs();
    if diff <= tol.abs {
        return true;
    }
    diff <= tol.rel * a.abs().max(b.abs())
}

pub fn ensure_finite(v: Real, what: &'static str) -> Result<Real, OfError> {
    if v.is_finite() {
        Ok(v)
    } else {
        Err(OfError::NonFinite { what, value: v })
    }
}

fn ensure_period(v: Real, what: &'static str) -> OfResult<Real> {
    let v = ensure_finite(v, what)?;
    if v <= 0.0 {
        return Err(OfError::InvalidArg {
            what: "period must be positive",
        });
    }
    Ok(v)
}

/// Greatest common divisor of two positive reals.
///
/// Euclid's algorithm on `fmod`, stopping once the remainder is negligible
/// relative to the smaller input (see [`PERIOD_TOLERANCES`]). Periods such as
/// `0.04` and `0.12` are not exactly representable, so an exact remainder of
/// zero is never reached.
pub fn gcd(a: Real, b: Real) -> OfResult<Real> {
    let mut a = ensure_period(a, "gcd lhs")?;
    let mut b = ensure_period(b, "gcd rhs")?;
    let threshold = PERIOD_TOLERANCES.rel * a.min(b) + PERIOD_TOLERANCES.abs;
    while b > threshold {
        let r = a % b;
        a = b;
        b = r;
    }
    Ok(a)
}

/// Least common multiple of two positive reals, `a * b / gcd(a, b)`.
pub fn lcm(a: Real, b: Real) -> OfResult<Real> {
    let g = gcd(a, b)?;
    Ok(a * b / g)
}

/// Whether `value` is an integer multiple of `period`, up to
/// [`PERIOD_TOLERANCES`].
pub fn is_multiple_of(value: Real, period: Real) -> bool {
    if !value.is_finite() || !period.is_finite() || period <= 0.0 {
        return false;
    }
    let threshold = PERIOD_TOLERANCES.rel * period + PERIOD_TOLERANCES.abs;
    let r = value.abs() % period;
    r <= threshold || period - r <= threshold
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nearly_equal_basic() {
        let tol = Tolerances {
            abs: 1e-12,
            rel: 1e-9,
        };
        assert!(nearly_equal(1.0, 1.0 + 1e-12, tol));
        assert!(nearly_equal(0.0, 1e-13, tol));
        assert!(!nearly_equal(1.0, 1.0 + 1e-6, tol));
    }

    #[test]
    fn ensure_finite_detects_nan() {
        let err = ensure_finite(Real::NAN, "test").unwrap_err();
        let msg = format!("{err}");
        assert!(msg.contains("Non-finite"));
    }

    #[test]
    fn gcd_of_step_and_stack_period() {
        let step_dt = 0.04;
        let stack_dt = 3.0 * step_dt;
        let g = gcd(step_dt, stack_dt).unwrap();
        assert!(nearly_equal(g, 0.04, PERIOD_TOLERANCES));
        assert_eq!((stack_dt / g).round() as usize, 3);
    }

    #[test]
    fn gcd_is_symmetric() {
        let a = gcd(0.005, 0.002).unwrap();
        let b = gcd(0.002, 0.005).unwrap();
        assert!(nearly_equal(a, 0.001, PERIOD_TOLERANCES));
        assert!(nearly_equal(a, b, PERIOD_TOLERANCES));
    }

    #[test]
    fn lcm_of_coprime_periods() {
        let l = lcm(0.02, 0.03).unwrap();
        assert!(nearly_equal(l, 0.06, PERIOD_TOLERANCES));
    }

    #[test]
    fn gcd_rejects_non_positive() {
        assert!(gcd(0.0, 1.0).is_err());
        assert!(gcd(1.0, -0.5).is_err());
        assert!(matches!(
            gcd(Real::INFINITY, 1.0),
            Err(OfError::NonFinite { .. })
        ));
    }

    #[test]
    fn multiple_of_handles_rounding() {
        assert!(is_multiple_of(0.12, 0.04));
        assert!(is_multiple_of(0.3, 0.1));
        assert!(!is_multiple_of(0.05, 0.04));
        assert!(!is_multiple_of(1.0, 0.0));
    }
}
