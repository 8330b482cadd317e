//! TrackPilot simulation CLI.
//!
//! Run deterministic pipeline tests against a simulated track.

use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use trackpilot_sim::{ScenarioId, ScenarioResult, ScenarioRunner};

#[derive(Parser, Debug)]
#[command(name = "trackpilot-sim", about = "Deterministic track simulation harness")]
struct Args {
    /// Scenario to run (defaults to open-corridor)
    #[arg(long, value_enum)]
    scenario: Option<ScenarioId>,

    /// Run every scenario
    #[arg(long)]
    all: bool,

    /// Master seed; identical seeds replay identically
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Simulated duration per scenario, seconds
    #[arg(long, default_value_t = 30.0)]
    duration: f64,

    /// Control tick rate, Hz
    #[arg(long, default_value_t = 50)]
    tick_rate: u32,

    /// Write per-tick frames and results as JSON
    #[arg(long)]
    export: Option<PathBuf>,
}

fn main() {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let scenarios: Vec<ScenarioId> = if args.all {
        ScenarioId::all().to_vec()
    } else {
        vec![args.scenario.unwrap_or(ScenarioId::OpenCorridor)]
    };

    let runner = ScenarioRunner::new(args.seed)
        .with_tick_rate(args.tick_rate)
        .with_duration(args.duration)
        .with_export(args.export.is_some());

    let mut results: Vec<ScenarioResult> = Vec::new();
    let mut failures = 0usize;

    for scenario in scenarios {
        info!(
            scenario = scenario.name(),
            goal = scenario.description(),
            "running"
        );
        let result = runner.run(scenario);
        print_result(&result);
        if !result.passed {
            failures += 1;
        }
        results.push(result);
    }

    if let Some(path) = &args.export {
        match serde_json::to_string_pretty(&results) {
            Ok(json) => {
                if let Err(e) = std::fs::write(path, json) {
                    error!(path = %path.display(), error = %e, "export failed");
                } else {
                    info!(path = %path.display(), "results exported");
                }
            }
            Err(e) => error!(error = %e, "serialization failed"),
        }
    }

    if failures > 0 {
        error!(failures, "scenario failures");
        std::process::exit(1);
    }
}

fn print_result(result: &ScenarioResult) {
    println!(
        "{:<20} {}  state={:?} laps={} ticks={} corners={} pillars={} clearance={:.0}mm",
        result.scenario,
        if result.passed { "PASS" } else { "FAIL" },
        result.final_state,
        result.lap_count,
        result.metrics.ticks,
        result.metrics.corners_mapped,
        result.metrics.pillars_mapped,
        result.metrics.min_clearance_mm,
    );
    for violation in &result.violations {
        println!("    violation: {violation}");
    }
}
