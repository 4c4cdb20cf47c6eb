//! Standalone benchmark runner for odeflow.
//!
//! Usage: `of-bench [scenarios.yaml]`. Without an argument the built-in
//! scenarios are run. Set `RUST_LOG=of_sim=debug` for per-breakpoint logs.

use of_bench::{BenchmarkSuite, default_benchmarks, load_scenarios, run_scenario};
use std::fs;
use std::path::PathBuf;
use std::time::SystemTime;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const RUNS_PER_SCENARIO: usize = 5;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    of_core::timing::enable_timing();

    let crate_path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    let repo_root = crate_path
        .parent()
        .and_then(|p| p.parent())
        .ok_or("Could not determine repo root")?
        .to_path_buf();

    let benchmarks = match std::env::args().nth(1) {
        Some(path) => {
            info!(%path, "loading scenarios");
            load_scenarios(&fs::read_to_string(&path)?)?
        }
        None => default_benchmarks(),
    };

    println!("odeflow Benchmark Suite");
    println!("=======================\n");
    println!(
        "Running {} benchmarks, {} runs each...\n",
        benchmarks.len(),
        RUNS_PER_SCENARIO
    );

    let mut results = Vec::new();
    for (idx, scenario) in benchmarks.iter().enumerate() {
        print!("[{}/{}] {} ... ", idx + 1, benchmarks.len(), scenario.name);
        std::io::Write::flush(&mut std::io::stdout())?;

        match run_scenario(scenario, RUNS_PER_SCENARIO) {
            Ok(result) => {
                match result.aggregate.wall_time_median_s {
                    Some(median) => println!("OK ({median:.4}s median)"),
                    None => println!("OK"),
                }
                results.push(result);
            }
            Err(e) => {
                println!("FAILED");
                warn!(scenario = %scenario.id, error = %e, "benchmark failed");
            }
        }
    }

    println!("\n=======================");
    println!("Benchmark Results Summary");
    println!("=======================\n");

    for result in &results {
        let agg = &result.aggregate;
        println!("{}", result.scenario.name);
        println!("  Method:      {:?}", result.scenario.options.method);
        if let (Some(median), Some(min), Some(max)) =
            (agg.wall_time_median_s, agg.wall_time_min_s, agg.wall_time_max_s)
        {
            println!("  Wall time:   {median:.4}s (median), min: {min:.4}s, max: {max:.4}s");
        }
        println!("  RHS evals:   {} (median)", agg.dynamics_evals_median);
        if agg.rejected_steps_total > 0 {
            println!("  Rejections:  {} (total)", agg.rejected_steps_total);
        }
        println!("  Ref. error:  {:.3e}", agg.reference_error_max);
        println!();
    }

    let timestamp = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)?
        .as_secs();
    let baseline_json = serde_json::to_string_pretty(&BenchmarkSuite {
        timestamp: format!("timestamp_{timestamp}"),
        results,
    })?;

    let baseline_dir = repo_root.join("benchmarks");
    fs::create_dir_all(&baseline_dir)?;
    let baseline_path = baseline_dir.join("baseline.json");
    fs::write(&baseline_path, baseline_json)?;

    println!("Baseline saved to: {}", baseline_path.display());
    Ok(())
}
