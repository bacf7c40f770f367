// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Epoch Engine - Deterministic Step Engine for Agent-Based World Simulation

pub mod types;
pub mod error;
pub mod config;
pub mod rng;
pub mod world;
pub mod events;
pub mod aggregator;
pub mod interaction;
pub mod phase;
pub mod scheduler;
pub mod simulation;
pub mod batch;
pub mod demo;

pub use aggregator::{AggregateSummary, AggregatorConfig, AttackOutcome, DetectionOutcome, EventAggregator};
pub use batch::{run_batch, BatchConfig, BatchError, BatchReport, CancelToken, RunFailure, Stats};
pub use config::{EngineConfig, EventRetention, TiePolicy};
pub use error::{EngineError, PhaseError};
pub use events::{EventLog, EventLogError, LogBounds};
pub use interaction::{pairwise_value, InteractionCache, PairKey, NEUTRAL_PAIRWISE};
pub use phase::{AdvanceTimePhase, FnPhase, HarvestPhase, Phase, PhaseKind, PhaseOrder, StepContext};
pub use rng::SimRng;
pub use scheduler::Scheduler;
pub use simulation::Simulation;
pub use types::*;
pub use world::{Actor, MonitoredField, NoActor, SimClock, SubsystemStatus, World};

use serde::Serialize;
use wasm_bindgen::prelude::*;

use crate::demo::{reference_simulation, DemoWorld};

// ─── WASM Interface ──────────────────────────────────────────────────────────

/// Browser handle over one run of the reference world.
#[wasm_bindgen]
pub struct DemoRun {
    seed: u64,
    sim: Simulation<DemoWorld>,
}

#[derive(Serialize)]
struct DemoSummary<'a> {
    seed: u64,
    step: Step,
    population: f64,
    resources: f64,
    mean_stability: f64,
    treaties: usize,
    log_len: usize,
    attacks: u64,
    terminal: Option<String>,
    summaries: &'a [AggregateSummary],
}

fn js_err(err: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&err.to_string())
}

#[wasm_bindgen]
impl DemoRun {
    #[wasm_bindgen(constructor)]
    pub fn new(seed: u32) -> Result<DemoRun, JsValue> {
        #[cfg(target_arch = "wasm32")]
        std::panic::set_hook(Box::new(console_error_panic_hook::hook));

        let seed = u64::from(seed);
        let sim = reference_simulation(DemoWorld::default(), seed, EngineConfig::default()).map_err(js_err)?;
        Ok(Self { seed, sim })
    }

    /// Execute one step and return its report.
    pub fn step(&mut self) -> Result<JsValue, JsValue> {
        let report = self.sim.step().map_err(js_err)?;
        serde_wasm_bindgen::to_value(&report).map_err(js_err)
    }

    /// Run up to `steps` steps without returning reports. Returns how many ran.
    pub fn run_batch(&mut self, steps: u32) -> Result<u32, JsValue> {
        let summary = self.sim.run(u64::from(steps), EventRetention::Summary).map_err(js_err)?;
        Ok(summary.steps as u32)
    }

    pub fn get_state(&self) -> JsValue {
        serde_wasm_bindgen::to_value(self.sim.world()).unwrap_or(JsValue::NULL)
    }

    pub fn get_summary(&self) -> JsValue {
        let world = self.sim.world();
        let summary = DemoSummary {
            seed: self.seed,
            step: self.sim.current_step(),
            population: world.population,
            resources: world.resources,
            mean_stability: world.mean_stability(),
            treaties: world.treaties.len(),
            log_len: self.sim.log().len(),
            attacks: self.sim.aggregator().category_total("attacks"),
            terminal: world.terminal(),
            summaries: self.sim.summaries(),
        };
        serde_wasm_bindgen::to_value(&summary).unwrap_or(JsValue::NULL)
    }

    /// Restart from step 0 with the same seed.
    pub fn reset(&mut self) -> Result<(), JsValue> {
        self.sim = reference_simulation(DemoWorld::default(), self.seed, EngineConfig::default()).map_err(js_err)?;
        Ok(())
    }
}
