//! Reference scenarios for the odeflow integrator.
//!
//! Each scenario integrates a small system with a known answer over a grid of
//! breakpoints and records step counters, wall time and the deviation from
//! the reference solution.

pub mod error;

pub use error::{BenchError, BenchResult};

use of_controls::{SampleConfig, StackingGrid, UpdatePeriods, ZeroOrderHold};
use of_core::timing::{AccumulatingTimer, Timer};
use of_sim::{
    DynamicsFault, IntegrationStats, IntegratorOptions, State, Trajectory, WithContext, from_fn,
    integrate,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// System integrated by a scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScenarioKind {
    /// `dx/dt = -rate * x`
    Decay { rate: f64, x0: f64 },
    /// `q'' = -omega^2 q` from `q = 1, q' = 0`
    Oscillator { omega: f64 },
    /// Damped spring driven by a sampled proportional controller.
    ///
    /// The command is held between controller samples and the integrator
    /// restarts at every environment step of the stepper period.
    ControlledSpring {
        stiffness: f64,
        damping: f64,
        gain: f64,
        setpoint: f64,
        periods: UpdatePeriods,
        #[serde(default)]
        skip_frames_ratio: u32,
    },
}

/// A benchmark scenario definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkScenario {
    /// Unique identifier for this benchmark.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    pub kind: ScenarioKind,
    /// End of the simulated window, starting from zero.
    pub t_end_s: f64,
    /// Output sample spacing for open-loop scenarios.
    pub dt_s: f64,
    #[serde(default)]
    pub options: IntegratorOptions,
    pub notes: Option<String>,
}

impl BenchmarkScenario {
    pub fn validate(&self) -> BenchResult<()> {
        let invalid = |what: &str| BenchError::InvalidScenario {
            id: self.id.clone(),
            what: what.to_string(),
        };
        if !self.t_end_s.is_finite() || self.t_end_s <= 0.0 {
            return Err(invalid("t_end_s must be positive and finite"));
        }
        if !self.dt_s.is_finite() || self.dt_s <= 0.0 {
            return Err(invalid("dt_s must be positive and finite"));
        }
        if let ScenarioKind::ControlledSpring { periods, .. } = &self.kind {
            periods.validate()?;
            if periods.controller <= 0.0 {
                return Err(invalid("controlled spring needs a discrete controller period"));
            }
        }
        self.options.validate()?;
        Ok(())
    }
}

/// A single run's measurements.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunMetrics {
    /// Wall time of the whole run; present only when timing is enabled.
    pub wall_time_s: Option<f64>,
    /// Average wall time of one `integrate` call.
    pub integrate_time_avg_s: Option<f64>,
    pub integrate_calls: usize,
    pub dynamics_evals: usize,
    pub accepted_steps: usize,
    pub rejected_steps: usize,
    pub breakpoints: usize,
    /// Observation stack refreshes (controlled scenarios only).
    pub stacked_observations: usize,
    /// Largest deviation from the reference solution.
    pub reference_error: f64,
    pub final_state: Vec<f64>,
}

/// Aggregated statistics for multiple runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateMetrics {
    pub run_count: usize,
    pub wall_time_median_s: Option<f64>,
    pub wall_time_min_s: Option<f64>,
    pub wall_time_max_s: Option<f64>,
    pub dynamics_evals_median: usize,
    pub rejected_steps_total: usize,
    pub reference_error_max: f64,
}

/// Complete benchmark result for a scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkResult {
    pub scenario: BenchmarkScenario,
    pub runs: Vec<RunMetrics>,
    pub aggregate: AggregateMetrics,
}

/// Collection of benchmark results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkSuite {
    pub timestamp: String,
    pub results: Vec<BenchmarkResult>,
}

/// Parse a YAML list of scenarios.
pub fn load_scenarios(yaml: &str) -> BenchResult<Vec<BenchmarkScenario>> {
    let scenarios: Vec<BenchmarkScenario> = serde_yaml::from_str(yaml)?;
    for scenario in &scenarios {
        scenario.validate()?;
    }
    Ok(scenarios)
}

/// Run a single benchmark scenario N times.
pub fn run_scenario(scenario: &BenchmarkScenario, times: usize) -> BenchResult<BenchmarkResult> {
    scenario.validate()?;
    let runs = (0..times)
        .map(|_| run_once(scenario))
        .collect::<BenchResult<Vec<_>>>()?;
    let aggregate = compute_aggregates(&runs);
    Ok(BenchmarkResult {
        scenario: scenario.clone(),
        runs,
        aggregate,
    })
}

/// Run a scenario once.
pub fn run_once(scenario: &BenchmarkScenario) -> BenchResult<RunMetrics> {
    let timer = Timer::start("scenario");
    let calls = AccumulatingTimer::new();

    let mut metrics = match &scenario.kind {
        ScenarioKind::Decay { rate, x0 } => run_decay(scenario, *rate, *x0, &calls)?,
        ScenarioKind::Oscillator { omega } => run_oscillator(scenario, *omega, &calls)?,
        ScenarioKind::ControlledSpring {
            stiffness,
            damping,
            gain,
            setpoint,
            periods,
            skip_frames_ratio,
        } => run_controlled_spring(
            scenario,
            SpringParams {
                stiffness: *stiffness,
                damping: *damping,
                gain: *gain,
                setpoint: *setpoint,
            },
            periods,
            *skip_frames_ratio,
            &calls,
        )?,
    };

    metrics.wall_time_s = timer.stop();
    if calls.count() > 0 {
        metrics.integrate_time_avg_s = Some(calls.average_seconds());
    }
    debug!(
        scenario = %scenario.id,
        evals = metrics.dynamics_evals,
        error = metrics.reference_error,
        "scenario finished"
    );
    Ok(metrics)
}

fn timed_integrate<D: of_sim::Dynamics + ?Sized>(
    calls: &AccumulatingTimer,
    dynamics: &mut D,
    t0: f64,
    x0: &State,
    times: &[f64],
    options: &IntegratorOptions,
) -> BenchResult<Trajectory> {
    let timer = Timer::start("integrate");
    let traj = integrate(dynamics, t0, x0, times, options)?;
    if let Some(elapsed) = timer.stop() {
        calls.record(elapsed);
    }
    Ok(traj)
}

fn open_loop_metrics(traj: &Trajectory, reference: impl Fn(f64) -> State) -> RunMetrics {
    let reference_error = traj
        .samples()
        .map(|(t, x)| (x - reference(t)).amax())
        .fold(0.0, f64::max);
    RunMetrics {
        integrate_calls: 1,
        dynamics_evals: traj.stats.dynamics_evals,
        accepted_steps: traj.stats.accepted_steps,
        rejected_steps: traj.stats.rejected_steps,
        breakpoints: traj.len(),
        reference_error,
        final_state: traj
            .last()
            .map(|(_, x)| x.as_slice().to_vec())
            .unwrap_or_default(),
        ..Default::default()
    }
}

fn output_grid(scenario: &BenchmarkScenario) -> BenchResult<Vec<f64>> {
    let periods = UpdatePeriods::new(scenario.dt_s, 0.0)?;
    Ok(periods.breakpoints(0.0, scenario.t_end_s)?)
}

fn run_decay(
    scenario: &BenchmarkScenario,
    rate: f64,
    x0: f64,
    calls: &AccumulatingTimer,
) -> BenchResult<RunMetrics> {
    let times = output_grid(scenario)?;
    let mut dynamics = from_fn(move |_t, x: &State| x * -rate);
    let traj = timed_integrate(
        calls,
        &mut dynamics,
        0.0,
        &State::from_vec(vec![x0]),
        &times,
        &scenario.options,
    )?;
    Ok(open_loop_metrics(&traj, |t| {
        State::from_vec(vec![x0 * (-rate * t).exp()])
    }))
}

fn run_oscillator(
    scenario: &BenchmarkScenario,
    omega: f64,
    calls: &AccumulatingTimer,
) -> BenchResult<RunMetrics> {
    let times = output_grid(scenario)?;
    let w2 = omega * omega;
    let mut dynamics = from_fn(move |_t, x: &State| State::from_vec(vec![x[1], -w2 * x[0]]));
    let traj = timed_integrate(
        calls,
        &mut dynamics,
        0.0,
        &State::from_vec(vec![1.0, 0.0]),
        &times,
        &scenario.options,
    )?;
    Ok(open_loop_metrics(&traj, |t| {
        State::from_vec(vec![(omega * t).cos(), -omega * (omega * t).sin()])
    }))
}

#[derive(Debug, Clone, Copy)]
struct SpringParams {
    stiffness: f64,
    damping: f64,
    gain: f64,
    setpoint: f64,
}

impl SpringParams {
    fn command(&self, q: f64) -> f64 {
        self.gain * (self.setpoint - q)
    }

    /// Rest position under the proportional command.
    fn equilibrium(&self) -> f64 {
        self.gain * self.setpoint / (self.stiffness + self.gain)
    }
}

fn run_controlled_spring(
    scenario: &BenchmarkScenario,
    params: SpringParams,
    periods: &UpdatePeriods,
    skip_frames_ratio: u32,
    calls: &AccumulatingTimer,
) -> BenchResult<RunMetrics> {
    let step_dt = periods.stepper_period()?.unwrap_or(scenario.dt_s);
    let grid = StackingGrid::new(step_dt, skip_frames_ratio)?;
    let n_steps = (scenario.t_end_s / step_dt).round() as u64;

    let mut x = State::from_vec(vec![0.0, 0.0]);
    let mut hold = ZeroOrderHold::new(
        SampleConfig::new(periods.controller)?,
        0.0,
        params.command(x[0]),
    );
    let SpringParams {
        stiffness,
        damping,
        ..
    } = params;
    let mut dynamics = WithContext::new(
        hold.get(),
        move |_t: f64, x: &State, u: &f64| -> Result<State, DynamicsFault> {
            Ok(State::from_vec(vec![
                x[1],
                -stiffness * x[0] - damping * x[1] + *u,
            ]))
        },
    );

    let mut stats = IntegrationStats::default();
    let mut metrics = RunMetrics::default();
    let mut t = 0.0;
    for step in 1..=n_steps {
        let t_next = grid.step_time(step);
        let traj = timed_integrate(calls, &mut dynamics, t, &x, &[t_next], &scenario.options)?;
        stats.dynamics_evals += traj.stats.dynamics_evals;
        stats.accepted_steps += traj.stats.accepted_steps;
        stats.rejected_steps += traj.stats.rejected_steps;
        if let Some((_, last)) = traj.last() {
            x = last.clone();
        }
        t = t_next;

        if hold.update(t, params.command(x[0])) {
            *dynamics.context_mut() = hold.get();
        }
        if grid.is_breakpoint(step) {
            metrics.stacked_observations += 1;
        }
        metrics.integrate_calls += 1;
        metrics.breakpoints += 1;
    }

    metrics.dynamics_evals = stats.dynamics_evals;
    metrics.accepted_steps = stats.accepted_steps;
    metrics.rejected_steps = stats.rejected_steps;
    metrics.reference_error = (x[0] - params.equilibrium()).abs();
    metrics.final_state = x.as_slice().to_vec();
    Ok(metrics)
}

fn median(values: &mut [f64]) -> Option<f64> {
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    values.get(values.len() / 2).copied()
}

fn compute_aggregates(runs: &[RunMetrics]) -> AggregateMetrics {
    if runs.is_empty() {
        return AggregateMetrics::default();
    }

    let mut wall_times: Vec<f64> = runs.iter().filter_map(|r| r.wall_time_s).collect();
    let wall_time_median_s = median(&mut wall_times);

    let mut evals: Vec<usize> = runs.iter().map(|r| r.dynamics_evals).collect();
    evals.sort_unstable();

    AggregateMetrics {
        run_count: runs.len(),
        wall_time_median_s,
        wall_time_min_s: wall_times.first().copied(),
        wall_time_max_s: wall_times.last().copied(),
        dynamics_evals_median: evals[evals.len() / 2],
        rejected_steps_total: runs.iter().map(|r| r.rejected_steps).sum(),
        reference_error_max: runs
            .iter()
            .map(|r| r.reference_error)
            .fold(0.0, f64::max),
    }
}

/// Default set of benchmark scenarios.
pub fn default_benchmarks() -> Vec<BenchmarkScenario> {
    vec![
        BenchmarkScenario {
            id: "01_decay".to_string(),
            name: "Exponential decay".to_string(),
            kind: ScenarioKind::Decay {
                rate: 1.0,
                x0: 1.0,
            },
            t_end_s: 5.0,
            dt_s: 0.1,
            options: IntegratorOptions {
                max_step: 1.0,
                ..Default::default()
            },
            notes: Some("Scalar linear decay; adaptive step grows to the sample spacing".to_string()),
        },
        BenchmarkScenario {
            id: "02_oscillator".to_string(),
            name: "Harmonic oscillator".to_string(),
            kind: ScenarioKind::Oscillator { omega: 2.0 },
            t_end_s: 10.0,
            dt_s: 0.05,
            options: IntegratorOptions::default(),
            notes: Some("Energy-conserving system; phase error accumulates".to_string()),
        },
        BenchmarkScenario {
            id: "03_oscillator_rk4".to_string(),
            name: "Harmonic oscillator (RK4)".to_string(),
            kind: ScenarioKind::Oscillator { omega: 2.0 },
            t_end_s: 10.0,
            dt_s: 0.05,
            options: IntegratorOptions {
                method: of_sim::StepMethod::RungeKutta4,
                ..Default::default()
            },
            notes: Some("Fixed-step reference at max_step".to_string()),
        },
        BenchmarkScenario {
            id: "04_controlled_spring".to_string(),
            name: "Sampled spring controller".to_string(),
            kind: ScenarioKind::ControlledSpring {
                stiffness: 4.0,
                damping: 2.0,
                gain: 4.0,
                setpoint: 1.0,
                periods: UpdatePeriods {
                    sensors: 0.01,
                    controller: 0.01,
                },
                skip_frames_ratio: 2,
            },
            t_end_s: 10.0,
            dt_s: 0.01,
            options: IntegratorOptions::default(),
            notes: Some("Zero-order hold command; integrator restarts every step".to_string()),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario(id: &str) -> BenchmarkScenario {
        default_benchmarks()
            .into_iter()
            .find(|s| s.id == id)
            .expect("scenario exists")
    }

    #[test]
    fn default_benchmarks_are_defined() {
        let benchmarks = default_benchmarks();
        assert!(!benchmarks.is_empty());
        assert!(benchmarks.iter().all(|b| !b.id.is_empty()));
        assert!(benchmarks.iter().all(|b| b.validate().is_ok()));
    }

    #[test]
    fn decay_matches_closed_form() {
        let metrics = run_once(&scenario("01_decay")).unwrap();
        assert_eq!(metrics.breakpoints, 51);
        assert!(metrics.reference_error < 1e-6, "{}", metrics.reference_error);
        assert!((metrics.final_state[0] - (-5.0_f64).exp()).abs() < 1e-6);
        assert_eq!(metrics.integrate_calls, 1);
    }

    #[test]
    fn oscillator_stays_on_reference() {
        for id in ["02_oscillator", "03_oscillator_rk4"] {
            let metrics = run_once(&scenario(id)).unwrap();
            assert_eq!(metrics.breakpoints, 201);
            assert!(metrics.reference_error < 1e-6, "{id}: {}", metrics.reference_error);
        }
    }

    #[test]
    fn controlled_spring_settles_on_equilibrium() {
        let metrics = run_once(&scenario("04_controlled_spring")).unwrap();
        assert_eq!(metrics.integrate_calls, 1000);
        assert_eq!(metrics.stacked_observations, 333);
        assert!(metrics.reference_error < 1e-3, "{}", metrics.reference_error);
        assert!(metrics.dynamics_evals > 0);
    }

    #[test]
    fn scenarios_load_from_yaml() {
        let yaml = r#"
- id: decay
  name: Decay
  t_end_s: 1.0
  dt_s: 0.25
  kind:
    type: decay
    rate: 2.0
    x0: 3.0
  options:
    method: runge_kutta_4
    max_step: 0.01
  notes: ~
- id: spring
  name: Spring
  t_end_s: 1.0
  dt_s: 0.01
  kind:
    type: controlled_spring
    stiffness: 1.0
    damping: 0.5
    gain: 2.0
    setpoint: 0.5
    periods:
      controller: 0.02
      sensors: 0.01
"#;
        let scenarios = load_scenarios(yaml).unwrap();
        assert_eq!(scenarios.len(), 2);
        assert_eq!(scenarios[0].options.method, of_sim::StepMethod::RungeKutta4);
        assert_eq!(scenarios[0].options.rel_tol, 1e-8);
        match &scenarios[1].kind {
            ScenarioKind::ControlledSpring {
                periods,
                skip_frames_ratio,
                ..
            } => {
                assert_eq!(periods.stepper_period().unwrap(), Some(0.01));
                assert_eq!(*skip_frames_ratio, 0);
            }
            other => panic!("unexpected kind {other:?}"),
        }

        let metrics = run_once(&scenarios[1]).unwrap();
        assert_eq!(metrics.integrate_calls, 100);
    }

    #[test]
    fn invalid_scenarios_are_rejected() {
        let mut bad = scenario("01_decay");
        bad.dt_s = 0.0;
        assert!(matches!(
            run_scenario(&bad, 1),
            Err(BenchError::InvalidScenario { .. })
        ));

        let yaml = "- id: x\n  name: x\n  t_end_s: 1.0\n  dt_s: 0.1\n  kind:\n    type: controlled_spring\n    stiffness: 1.0\n    damping: 1.0\n    gain: 1.0\n    setpoint: 1.0\n    periods:\n      sensors: 0.004\n      controller: 0.01\n  notes: ~\n";
        assert!(matches!(load_scenarios(yaml), Err(BenchError::Control(_))));
    }

    #[test]
    fn aggregate_metrics_compute_correctly() {
        let runs = vec![
            RunMetrics {
                wall_time_s: Some(1.0),
                dynamics_evals: 30,
                rejected_steps: 1,
                reference_error: 1e-7,
                ..Default::default()
            },
            RunMetrics {
                wall_time_s: Some(3.0),
                dynamics_evals: 10,
                reference_error: 2e-7,
                ..Default::default()
            },
            RunMetrics {
                wall_time_s: Some(2.0),
                dynamics_evals: 20,
                rejected_steps: 2,
                ..Default::default()
            },
        ];

        let agg = compute_aggregates(&runs);
        assert_eq!(agg.run_count, 3);
        assert_eq!(agg.wall_time_median_s, Some(2.0));
        assert_eq!(agg.wall_time_min_s, Some(1.0));
        assert_eq!(agg.wall_time_max_s, Some(3.0));
        assert_eq!(agg.dynamics_evals_median, 20);
        assert_eq!(agg.rejected_steps_total, 3);
        assert_eq!(agg.reference_error_max, 2e-7);
    }

    #[test]
    fn aggregate_handles_empty_runs() {
        let agg = compute_aggregates(&[]);
        assert_eq!(agg.run_count, 0);
        assert_eq!(agg.wall_time_median_s, None);
    }

    #[test]
    fn benchmark_result_serializes() {
        let result = run_scenario(&scenario("01_decay"), 2).unwrap();
        assert_eq!(result.runs.len(), 2);
        assert_eq!(result.runs[0].final_state, result.runs[1].final_state);

        let suite = BenchmarkSuite {
            timestamp: "test_timestamp".to_string(),
            results: vec![result],
        };
        let json = serde_json::to_string(&suite).expect("should serialize");
        let back: BenchmarkSuite = serde_json::from_str(&json).expect("should deserialize");
        assert_eq!(back.results[0].scenario, suite.results[0].scenario);
        assert_eq!(back.results[0].aggregate.run_count, 2);
    }
}
