// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Epoch Engine - Monte Carlo Runner
//
// Usage:
//   cargo run --release --bin montecarlo                       # 30 runs, 120 steps each
//   cargo run --release --bin montecarlo -- --runs 5           # Quick mode
//   cargo run --release --bin montecarlo -- --seed 42          # Custom base seed
//   cargo run --release --bin montecarlo -- --steps 600        # Fifty-year horizon
//   cargo run --release --bin montecarlo -- --serial           # Single-threaded
//   cargo run --release --bin montecarlo -- --time-series      # Per-step JSONL
//   cargo run --release --bin montecarlo -- --config engine.json
//   RUST_LOG=epoch_engine=debug cargo run --bin montecarlo -- --runs 1

mod report;
mod time_series;

use std::error::Error;
use std::path::{Path, PathBuf};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use tracing::warn;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use epoch_engine::batch::{run_batch, BatchConfig, CancelToken};
use epoch_engine::demo::{reference_simulation, DemoWorld};
use epoch_engine::{EngineConfig, EventRetention};

use report::*;
use time_series::TimeSeriesRecorder;

const RESULTS_DIR: &str = "montecarlo-results";

// ─── CLI Parsing ────────────────────────────────────────────────────────────

struct CliArgs {
    batch: BatchConfig,
    time_series: bool,
    climate: bool,
    config: Option<PathBuf>,
}

fn parse_args() -> CliArgs {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut cli = CliArgs {
        batch: BatchConfig::default(),
        time_series: false,
        climate: true,
        config: None,
    };

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--runs" => {
                i += 1;
                if let Some(v) = args.get(i) {
                    cli.batch.runs = v.parse().unwrap_or(30);
                }
            }
            "--seed" => {
                i += 1;
                if let Some(v) = args.get(i) {
                    cli.batch.base_seed = v.parse().unwrap_or(0);
                }
            }
            "--steps" => {
                i += 1;
                if let Some(v) = args.get(i) {
                    cli.batch.max_steps = v.parse().unwrap_or(120);
                }
            }
            "--config" => {
                i += 1;
                cli.config = args.get(i).map(PathBuf::from);
            }
            "--serial" => cli.batch.parallel = false,
            "--abort-on-error" => cli.batch.abort_on_error = true,
            "--full-events" => cli.batch.retain_events = EventRetention::Full,
            "--no-climate" => cli.climate = false,
            "--time-series" => cli.time_series = true,
            other => eprintln!("Unknown argument: {}", other),
        }
        i += 1;
    }

    cli
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn load_engine_config(path: Option<&Path>) -> Result<EngineConfig, Box<dyn Error>> {
    match path {
        Some(p) => {
            let raw = std::fs::read_to_string(p)?;
            Ok(EngineConfig::from_json_str(&raw)?)
        }
        None => Ok(EngineConfig::default()),
    }
}

fn initial_world(climate: bool) -> DemoWorld {
    if climate {
        DemoWorld::default()
    } else {
        DemoWorld::default().without_climate()
    }
}

/// Replay each seed serially and write one JSONL file per seed.
/// Runs are deterministic, so replays match the batch exactly.
fn write_time_series(cli: &CliArgs, engine: &EngineConfig, seeds: &[u64], dir: &Path) -> Result<(), Box<dyn Error>> {
    for &seed in seeds {
        let mut sim = reference_simulation(initial_world(cli.climate), seed, engine.clone())?;
        let mut recorder = TimeSeriesRecorder::new();
        sim.run_until(
            cli.batch.max_steps,
            EventRetention::Summary,
            || false,
            |report, world| recorder.record(report, world),
        )?;
        let path = dir.join(format!("seed-{}.jsonl", seed));
        recorder.write_jsonl(&path)?;
        tracing::debug!(seed, steps = recorder.len(), path = %path.display(), "time series written");
    }
    Ok(())
}

// ─── Main ───────────────────────────────────────────────────────────────────

fn run(cli: CliArgs) -> Result<bool, Box<dyn Error>> {
    let engine = load_engine_config(cli.config.as_deref())?;

    println!("\n  Epoch Engine Monte Carlo Runner v{}", env!("CARGO_PKG_VERSION"));
    println!(
        "  PRNG: ChaCha8Rng | Runs: {} | Base seed: {} | Steps: {} | {}",
        cli.batch.runs,
        cli.batch.base_seed,
        cli.batch.max_steps,
        if cli.batch.parallel { "parallel" } else { "serial" },
    );

    let started = Instant::now();
    let cancel = CancelToken::new();
    let climate = cli.climate;
    let batch = run_batch(&cli.batch, &cancel, |seed| {
        reference_simulation(initial_world(climate), seed, engine.clone())
    })?;
    let elapsed = started.elapsed();

    let overview = batch.overview();
    let world = WorldStats::from_report(&batch);

    println!("\n  {:<18} {:>22}", "Metric", "Mean ±95% CI");
    println!("  {}", "-".repeat(42));
    println!("  {:<18} {:>22}", "Steps", fmt_stat(&overview.steps, 1));
    println!("  {:<18} {:>22}", "Events", fmt_stat(&overview.events, 1));
    println!("  {:<18} {:>22}", "Population (M)", fmt_stat(&world.population, 1));
    println!("  {:<18} {:>22}", "Resources", fmt_stat(&world.resources, 3));
    println!("  {:<18} {:>22}", "Stability", fmt_stat(&world.mean_stability, 3));
    println!("  {:<18} {:>22}", "Treaties", fmt_stat(&world.treaties, 2));
    println!("  {:<18} {:>22}", "Cyber defence", fmt_stat(&world.cyber_defense, 3));
    println!("  {}", "-".repeat(42));
    println!(
        "  Completed: {}  Failed: {}  Cancelled: {}  Collapsed: {}  Time: {:.2}s\n",
        overview.completed,
        overview.failed,
        overview.cancelled,
        overview.terminated_early,
        elapsed.as_secs_f64(),
    );
    for failure in &overview.failures {
        println!("  FAILED seed {}: {}", failure.seed, failure.cause);
    }

    let dir = Path::new(RESULTS_DIR);
    if cli.time_series {
        let seeds: Vec<u64> = batch.completed.iter().map(|r| r.summary.seed).collect();
        write_time_series(&cli, &engine, &seeds, &dir.join("time-series"))?;
    }

    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
        .to_string();
    let all_completed = overview.failed == 0 && overview.cancelled == 0;
    let report = MonteCarloReport {
        timestamp: timestamp.clone(),
        version: env!("CARGO_PKG_VERSION"),
        prng: "ChaCha8Rng",
        climate: cli.climate,
        batch: cli.batch.clone(),
        engine,
        overview,
        world,
        runs: batch.completed.iter().map(RunRow::from_run).collect(),
    };

    std::fs::create_dir_all(dir)?;
    let path = dir.join(format!("montecarlo-{}.json", timestamp));
    std::fs::write(&path, serde_json::to_string_pretty(&report)?)?;
    println!("  Results saved to: {}\n", path.display());

    Ok(all_completed)
}

fn main() {
    init_tracing();
    match run(parse_args()) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            warn!(error = %e, "montecarlo run failed");
            eprintln!("  Error: {}", e);
            std::process::exit(2);
        }
    }
}
