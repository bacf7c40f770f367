// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Epoch Engine - Monte Carlo Report Types

use serde::Serialize;

use epoch_engine::batch::{BatchConfig, BatchOverview, BatchReport, CompletedRun, Stats};
use epoch_engine::demo::DemoWorld;
use epoch_engine::EngineConfig;

// ─── Single-Run Row ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct RunRow {
    pub seed: u64,
    pub steps: u64,
    pub final_step: u64,
    pub terminal: Option<String>,
    pub event_count: u64,
    pub summaries: usize,
    pub rng_draws: u64,
    pub population: f64,
    pub resources: f64,
    pub mean_stability: f64,
    pub treaties: usize,
    pub cyber_defense: f64,
}

impl RunRow {
    pub fn from_run(run: &CompletedRun<DemoWorld>) -> Self {
        let w = &run.world;
        Self {
            seed: run.summary.seed,
            steps: run.summary.steps,
            final_step: run.summary.final_step,
            terminal: run.summary.terminal.clone(),
            event_count: run.summary.event_count,
            summaries: run.summary.summaries.len(),
            rng_draws: run.summary.rng_draws,
            population: w.population,
            resources: w.resources,
            mean_stability: w.mean_stability(),
            treaties: w.treaties.len(),
            cyber_defense: w.cyber_defense,
        }
    }
}

// ─── Metric Aggregation ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct WorldStats {
    pub population: Stats,
    pub resources: Stats,
    pub mean_stability: Stats,
    pub treaties: Stats,
    pub cyber_defense: Stats,
}

impl WorldStats {
    pub fn from_report(report: &BatchReport<DemoWorld>) -> Self {
        Self {
            population: report.stats(|r| r.world.population),
            resources: report.stats(|r| r.world.resources),
            mean_stability: report.stats(|r| r.world.mean_stability()),
            treaties: report.stats(|r| r.world.treaties.len() as f64),
            cyber_defense: report.stats(|r| r.world.cyber_defense),
        }
    }
}

// ─── Top-Level Report ────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct MonteCarloReport {
    pub timestamp: String,
    pub version: &'static str,
    pub prng: &'static str,
    pub climate: bool,
    pub batch: BatchConfig,
    pub engine: EngineConfig,
    pub overview: BatchOverview,
    pub world: WorldStats,
    pub runs: Vec<RunRow>,
}

/// `mean ±ci` with the CI half-width.
pub fn fmt_stat(s: &Stats, precision: usize) -> String {
    let half = (s.ci_upper - s.ci_lower) / 2.0;
    format!("{:.*} ±{:.*}", precision, s.mean, precision, half)
}
