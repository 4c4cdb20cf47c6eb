//! Breakpoint alignment, determinism and step reporting.

use of_sim::{
    IntegratorOptions, State, StepEvent, StepMethod, from_fn, integrate, integrate_with_observer,
};
use proptest::prelude::*;

fn forced_oscillator() -> impl of_sim::Dynamics {
    from_fn(|t: f64, x: &State| State::from_vec(vec![x[1], -4.0 * x[0] + (3.0 * t).sin()]))
}

#[test]
fn single_initial_breakpoint_returns_initial_state() {
    let mut calls = 0usize;
    let mut dynamics = |_t: f64, x: &State| -> Result<State, of_sim::DynamicsFault> {
        calls += 1;
        Ok(-x)
    };
    let x0 = State::from_vec(vec![0.3, -1.2]);

    let traj = integrate(&mut dynamics, 2.0, &x0, &[2.0], &IntegratorOptions::default()).unwrap();

    assert_eq!(traj.t, vec![2.0]);
    assert_eq!(traj.x[0], x0);
    assert_eq!(traj.stats.dynamics_evals, 0);
    assert_eq!(calls, 0);
}

#[test]
fn repeated_calls_are_bit_identical() {
    let x0 = State::from_vec(vec![1.0, 0.0]);
    let times: Vec<f64> = (0..50).map(|i| 0.037 * f64::from(i)).collect();
    let opts = IntegratorOptions {
        max_step: 0.5,
        ..Default::default()
    };

    let a = integrate(&mut forced_oscillator(), 0.0, &x0, &times, &opts).unwrap();
    let b = integrate(&mut forced_oscillator(), 0.0, &x0, &times, &opts).unwrap();

    assert_eq!(a.t, b.t);
    assert_eq!(a.x, b.x);
    assert_eq!(a.stats, b.stats);
}

#[test]
fn observer_sees_every_accepted_step() {
    let x0 = State::from_vec(vec![1.0, 0.0]);
    let times = [0.0, 0.1, 0.45, 1.0];
    let opts = IntegratorOptions {
        max_step: 0.05,
        ..Default::default()
    };

    let mut seen: Vec<(usize, f64)> = Vec::new();
    let mut observer = |event: &StepEvent<'_>| seen.push((event.interval, event.t));
    let traj = integrate_with_observer(
        &mut forced_oscillator(),
        0.0,
        &x0,
        &times,
        &opts,
        &mut observer,
    )
    .unwrap();

    assert_eq!(seen.len(), traj.stats.accepted_steps);
    assert!(seen.windows(2).all(|w| w[0].1 < w[1].1));
    assert!(seen.iter().all(|(_, t)| *t <= 1.0));
    // Every breakpoint after the first is an exact integration stop.
    for (i, &t) in times.iter().enumerate().skip(1) {
        assert!(seen.iter().any(|&(interval, ts)| interval == i && ts == t));
    }
    // Internal steps never exceed max_step.
    assert!(traj.stats.accepted_steps >= 20);
}

#[test]
fn closely_spaced_breakpoints_are_kept_apart() {
    let x0 = State::from_vec(vec![1.0]);
    let times = [0.0, 1e-9, 2e-9, 0.5];
    let traj = integrate(
        &mut from_fn(|_t, x: &State| -x),
        0.0,
        &x0,
        &times,
        &IntegratorOptions::default(),
    )
    .unwrap();
    assert_eq!(traj.t, times);
    assert!((traj.x[3][0] - (-0.5_f64).exp()).abs() < 1e-8);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn trajectory_times_equal_requested_times(
        t0 in -1.0_f64..1.0,
        gaps in prop::collection::vec(1e-3_f64..0.5, 1..15),
        rk4 in any::<bool>(),
    ) {
        let mut times = Vec::with_capacity(gaps.len());
        let mut t = t0;
        for gap in gaps {
            t += gap;
            times.push(t);
        }
        let opts = IntegratorOptions {
            method: if rk4 { StepMethod::RungeKutta4 } else { StepMethod::Dopri5 },
            max_step: 0.05,
            ..Default::default()
        };
        let x0 = State::from_vec(vec![1.0, 0.0]);

        let traj = integrate(&mut forced_oscillator(), t0, &x0, &times, &opts).unwrap();

        prop_assert_eq!(traj.len(), times.len());
        prop_assert_eq!(&traj.t, &times);
    }
}
