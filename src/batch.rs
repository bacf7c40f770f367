// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Epoch Engine - Monte Carlo Batch Driver

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[cfg(not(target_arch = "wasm32"))]
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::EventRetention;
use crate::error::EngineError;
use crate::simulation::Simulation;
use crate::types::{RunSummary, Step};
use crate::world::World;

// ─── Config ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BatchConfig {
    pub runs: usize,
    /// Run `i` is seeded with `base_seed + i`.
    pub base_seed: u64,
    pub max_steps: u64,
    pub parallel: bool,
    /// Stop the whole batch on the first failed run instead of discarding it.
    pub abort_on_error: bool,
    pub retain_events: EventRetention,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            runs: 30,
            base_seed: 0,
            max_steps: 120,
            parallel: true,
            abort_on_error: false,
            retain_events: EventRetention::Summary,
        }
    }
}

impl BatchConfig {
    pub fn seeds(&self) -> impl Iterator<Item = u64> + '_ {
        (0..self.runs as u64).map(move |i| self.base_seed.wrapping_add(i))
    }
}

// ─── Statistics (per-metric aggregation) ─────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Stats {
    pub mean: f64,
    pub std_dev: f64,
    pub ci_lower: f64,
    pub ci_upper: f64,
    pub min: f64,
    pub max: f64,
    pub n: usize,
}

impl Stats {
    /// Sample mean, sample std-dev and a normal-approximation 95% CI.
    pub fn from_samples(samples: &[f64]) -> Self {
        let n = samples.len();
        if n == 0 {
            return Self { mean: 0.0, std_dev: 0.0, ci_lower: 0.0, ci_upper: 0.0, min: 0.0, max: 0.0, n: 0 };
        }
        let mean = samples.iter().sum::<f64>() / n as f64;
        let variance = if n > 1 {
            samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1) as f64
        } else {
            0.0
        };
        let std_dev = variance.sqrt();
        let half_width = 1.96 * std_dev / (n as f64).sqrt();
        Self {
            mean,
            std_dev,
            ci_lower: mean - half_width,
            ci_upper: mean + half_width,
            min: samples.iter().copied().fold(f64::INFINITY, f64::min),
            max: samples.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            n,
        }
    }
}

// ─── Cancellation ────────────────────────────────────────────────────────────

/// Shared stop flag. Once set, no new run starts and in-flight runs stop
/// before their next step and are discarded.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ─── Run records ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct CompletedRun<W> {
    pub summary: RunSummary,
    /// Terminal world state.
    pub world: W,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunFailure {
    pub seed: u64,
    pub phase_id: Option<String>,
    pub step: Option<Step>,
    pub cause: String,
}

impl RunFailure {
    fn from_error(seed: u64, err: &EngineError) -> Self {
        Self {
            seed,
            phase_id: err.phase_id().map(str::to_string),
            step: err.step(),
            cause: err.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum RunOutcome<W> {
    Completed(CompletedRun<W>),
    Failed(RunFailure),
    Cancelled { seed: u64 },
}

#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    #[error("could not set up run with seed {seed}: {source}")]
    Setup {
        seed: u64,
        #[source]
        source: EngineError,
    },

    #[error("batch aborted: run with seed {seed} failed: {source}")]
    Aborted {
        seed: u64,
        #[source]
        source: EngineError,
    },
}

// ─── Report ──────────────────────────────────────────────────────────────────

/// Surviving runs of a batch plus the record of what was discarded.
#[derive(Debug, Clone)]
pub struct BatchReport<W> {
    pub completed: Vec<CompletedRun<W>>,
    pub failures: Vec<RunFailure>,
    pub cancelled: Vec<u64>,
}

impl<W> BatchReport<W> {
    fn from_outcomes(outcomes: Vec<RunOutcome<W>>) -> Self {
        let mut report = Self {
            completed: Vec::new(),
            failures: Vec::new(),
            cancelled: Vec::new(),
        };
        for outcome in outcomes {
            match outcome {
                RunOutcome::Completed(run) => report.completed.push(run),
                RunOutcome::Failed(failure) => report.failures.push(failure),
                RunOutcome::Cancelled { seed } => report.cancelled.push(seed),
            }
        }
        report
    }

    pub fn attempted(&self) -> usize {
        self.completed.len() + self.failures.len() + self.cancelled.len()
    }

    pub fn completion_rate(&self) -> f64 {
        match self.attempted() {
            0 => 0.0,
            n => self.completed.len() as f64 / n as f64,
        }
    }

    /// Statistics of a caller-selected metric over completed runs.
    pub fn stats<F>(&self, metric: F) -> Stats
    where
        F: Fn(&CompletedRun<W>) -> f64,
    {
        let samples: Vec<f64> = self.completed.iter().map(metric).collect();
        Stats::from_samples(&samples)
    }

    pub fn step_stats(&self) -> Stats {
        self.stats(|r| r.summary.steps as f64)
    }

    pub fn event_stats(&self) -> Stats {
        self.stats(|r| r.summary.event_count as f64)
    }

    /// Serializable overview without the terminal worlds.
    pub fn overview(&self) -> BatchOverview {
        BatchOverview {
            attempted: self.attempted(),
            completed: self.completed.len(),
            failed: self.failures.len(),
            cancelled: self.cancelled.len(),
            terminated_early: self
                .completed
                .iter()
                .filter(|r| r.summary.terminal.is_some())
                .count(),
            steps: self.step_stats(),
            events: self.event_stats(),
            failures: self.failures.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchOverview {
    pub attempted: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub terminated_early: usize,
    pub steps: Stats,
    pub events: Stats,
    pub failures: Vec<RunFailure>,
}

// ─── Driver ──────────────────────────────────────────────────────────────────

/// Run `config.runs` independent simulations built by `factory`.
///
/// Every run gets its own world, scheduler, log, cache and aggregator from
/// the factory; nothing is shared but the cancel token.
pub fn run_batch<W, F>(
    config: &BatchConfig,
    cancel: &CancelToken,
    factory: F,
) -> Result<BatchReport<W>, BatchError>
where
    W: World + Send,
    F: Fn(u64) -> Result<Simulation<W>, EngineError> + Sync,
{
    let seeds: Vec<u64> = config.seeds().collect();
    let run = |seed: u64| execute_run(config, cancel, &factory, seed);

    #[cfg(not(target_arch = "wasm32"))]
    let outcomes: Result<Vec<RunOutcome<W>>, BatchError> = if config.parallel {
        seeds.par_iter().map(|&seed| run(seed)).collect()
    } else {
        seeds.iter().map(|&seed| run(seed)).collect()
    };
    #[cfg(target_arch = "wasm32")]
    let outcomes: Result<Vec<RunOutcome<W>>, BatchError> =
        seeds.iter().map(|&seed| run(seed)).collect();

    let report = BatchReport::from_outcomes(outcomes?);
    info!(
        runs = config.runs,
        completed = report.completed.len(),
        failed = report.failures.len(),
        cancelled = report.cancelled.len(),
        "batch finished"
    );
    Ok(report)
}

fn execute_run<W, F>(
    config: &BatchConfig,
    cancel: &CancelToken,
    factory: &F,
    seed: u64,
) -> Result<RunOutcome<W>, BatchError>
where
    W: World,
    F: Fn(u64) -> Result<Simulation<W>, EngineError>,
{
    if cancel.is_cancelled() {
        return Ok(RunOutcome::Cancelled { seed });
    }

    let mut sim = factory(seed).map_err(|source| {
        cancel.cancel();
        BatchError::Setup { seed, source }
    })?;

    match sim.run_until(config.max_steps, config.retain_events, || cancel.is_cancelled(), |_, _| {}) {
        Ok(summary) if summary.cancelled => Ok(RunOutcome::Cancelled { seed }),
        Ok(summary) => Ok(RunOutcome::Completed(CompletedRun {
            summary,
            world: sim.into_world(),
        })),
        Err(source) if config.abort_on_error => {
            cancel.cancel();
            Err(BatchError::Aborted { seed, source })
        }
        Err(err) => {
            let failure = RunFailure::from_error(seed, &err);
            warn!(
                seed,
                phase = failure.phase_id.as_deref().unwrap_or("-"),
                step = ?failure.step,
                cause = %failure.cause,
                "discarding failed run"
            );
            Ok(RunOutcome::Failed(failure))
        }
    }
}
