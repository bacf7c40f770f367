// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Epoch Engine - Reference World

//! A small world that exercises every engine service: an economy and a
//! population coupled through resources, an optional climate subsystem, a
//! roster of nations feeding the interaction cache, and a cyber stream that
//! is only ever counted by the aggregator.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::aggregator::{AttackOutcome, DetectionOutcome};
use crate::config::EngineConfig;
use crate::error::{EngineError, PhaseError};
use crate::interaction::PairKey;
use crate::phase::{AdvanceTimePhase, HarvestPhase, Phase, PhaseOrder, StepContext};
use crate::rng::SimRng;
use crate::simulation::Simulation;
use crate::types::{Event, PhaseOutcome, Severity};
use crate::world::{Actor, MonitoredField, SimClock, SubsystemStatus, World};

pub const CLIMATE: &str = "climate";

const SCARCITY_RATIO: f64 = 0.5;
const HEATWAVE_ANOMALY: f64 = 2.0;
const TREATY_AFFINITY: f64 = 0.7;
const UNREST_STABILITY: f64 = 0.2;

// ─── World ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Nation {
    pub code: String,
    pub power: f64,
    pub stability: f64,
}

impl Nation {
    pub fn new(code: &str, power: f64, stability: f64) -> Self {
        Self { code: code.to_string(), power, stability }
    }
}

impl Actor for Nation {
    fn key(&self) -> &str {
        &self.code
    }

    fn primary_metric(&self) -> f64 {
        self.power
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClimateState {
    /// Degrees above the pre-industrial baseline.
    pub temperature_anomaly: f64,
    /// Mean warming per step.
    pub warming_rate: f64,
}

impl Default for ClimateState {
    fn default() -> Self {
        Self {
            temperature_anomaly: 1.2,
            warming_rate: 0.002,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemoWorld {
    pub clock: SimClock,
    /// Millions.
    pub population: f64,
    /// Resource stock in per-capita units.
    pub resources: f64,
    pub nations: Vec<Nation>,
    pub tensions: BTreeMap<PairKey, f64>,
    pub treaties: BTreeSet<PairKey>,
    pub climate: Option<ClimateState>,
    /// Probability an attack is blocked.
    pub cyber_defense: f64,
    /// Population below which the run ends.
    pub collapse_threshold: f64,
}

impl Default for DemoWorld {
    fn default() -> Self {
        let nations = vec![
            Nation::new("usa", 0.90, 0.75),
            Nation::new("chn", 0.85, 0.70),
            Nation::new("eu", 0.70, 0.80),
            Nation::new("ind", 0.55, 0.65),
            Nation::new("bra", 0.40, 0.60),
        ];
        let tensions = [
            (("usa", "chn"), 0.7),
            (("usa", "eu"), 0.1),
            (("chn", "ind"), 0.5),
            (("eu", "chn"), 0.4),
            (("bra", "usa"), 0.2),
        ]
        .into_iter()
        .map(|((a, b), t)| (PairKey::new(a, b), t))
        .collect();

        Self {
            clock: SimClock::new(),
            population: 8000.0,
            resources: 1.0,
            nations,
            tensions,
            treaties: BTreeSet::new(),
            climate: Some(ClimateState::default()),
            cyber_defense: 0.7,
            collapse_threshold: 1000.0,
        }
    }
}

impl DemoWorld {
    pub fn without_climate(mut self) -> Self {
        self.climate = None;
        self
    }

    pub fn mean_stability(&self) -> f64 {
        if self.nations.is_empty() {
            return 0.0;
        }
        self.nations.iter().map(|n| n.stability).sum::<f64>() / self.nations.len() as f64
    }

    fn nation_mut(&mut self, code: &str) -> Option<&mut Nation> {
        self.nations.iter_mut().find(|n| n.code == code)
    }
}

impl World for DemoWorld {
    type Actor = Nation;

    fn clock(&self) -> &SimClock {
        &self.clock
    }

    fn clock_mut(&mut self) -> &mut SimClock {
        &mut self.clock
    }

    fn actors(&self) -> &[Nation] {
        &self.nations
    }

    fn tension(&self, a: &str, b: &str) -> Option<f64> {
        self.tensions.get(&PairKey::new(a, b)).copied()
    }

    fn monitored_fields(&self) -> Vec<MonitoredField> {
        let mut fields = vec![
            MonitoredField::new("population", self.population),
            MonitoredField::new("resources", self.resources),
            MonitoredField::new("cyber_defense", self.cyber_defense),
        ];
        if let Some(c) = &self.climate {
            fields.push(MonitoredField::new("climate.temperature_anomaly", c.temperature_anomaly));
        }
        for n in &self.nations {
            fields.push(MonitoredField::new(format!("nations.{}.power", n.code), n.power));
            fields.push(MonitoredField::new(format!("nations.{}.stability", n.code), n.stability));
        }
        fields
    }

    fn subsystems(&self) -> Vec<SubsystemStatus> {
        vec![SubsystemStatus::new(CLIMATE, self.climate.is_some())]
    }

    fn terminal(&self) -> Option<String> {
        if self.population < self.collapse_threshold {
            Some(format!("population collapse below {}", self.collapse_threshold))
        } else {
            None
        }
    }
}

type Ctx<'a> = StepContext<'a, Nation>;

// ─── Phases ──────────────────────────────────────────────────────────────────

/// Regenerates and consumes the resource stock.
pub struct ResourcePhase;

impl Phase<DemoWorld> for ResourcePhase {
    fn id(&self) -> &str {
        "resources"
    }
    fn name(&self) -> &str {
        "Resource Economy"
    }
    fn order(&self) -> PhaseOrder {
        PhaseOrder::new(10.0)
    }

    fn execute(&mut self, w: &mut DemoWorld, rng: &mut SimRng, ctx: &mut Ctx<'_>) -> Result<PhaseOutcome, PhaseError> {
        let regen = 0.01 + rng.range(-0.005, 0.01);
        let heat_drag = w.climate.as_ref().map_or(0.0, |c| (c.temperature_anomaly - 1.0).max(0.0) * 0.004);
        let draw = 0.012 * (w.population / 8000.0);
        w.resources = (w.resources * (1.0 + regen - heat_drag) - draw * w.resources).max(0.0);

        if w.resources < SCARCITY_RATIO {
            ctx.aggregator().record_crisis("scarcity");
            ctx.emit(
                Event::new("scarcity", format!("resource stock at {:.2}", w.resources))
                    .with_severity(Severity::High),
            );
        }
        Ok(PhaseOutcome::empty().metadata(json!({ "resources": w.resources })))
    }
}

/// Grows or shrinks the population with resource availability.
pub struct PopulationPhase;

impl Phase<DemoWorld> for PopulationPhase {
    fn id(&self) -> &str {
        "population"
    }
    fn name(&self) -> &str {
        "Population"
    }
    fn order(&self) -> PhaseOrder {
        PhaseOrder::new(20.0)
    }
    fn depends_on(&self) -> &[&'static str] {
        &["resources"]
    }

    fn execute(&mut self, w: &mut DemoWorld, rng: &mut SimRng, ctx: &mut Ctx<'_>) -> Result<PhaseOutcome, PhaseError> {
        let pressure = w.resources - SCARCITY_RATIO;
        let growth = 0.001 + pressure * 0.01 + rng.normal(0.0, 0.0005);
        let before = w.population;
        w.population = (w.population * (1.0 + growth)).max(0.0);

        if growth < -0.005 {
            ctx.emit(
                Event::new("famine", format!("population fell {:.1}M", before - w.population))
                    .with_severity(Severity::Critical),
            );
        }
        Ok(PhaseOutcome::empty().metadata(json!({ "growth": growth })))
    }
}

/// Warms the climate. No-op when the climate subsystem is absent.
pub struct ClimatePhase;

impl Phase<DemoWorld> for ClimatePhase {
    fn id(&self) -> &str {
        CLIMATE
    }
    fn name(&self) -> &str {
        "Climate"
    }
    fn order(&self) -> PhaseOrder {
        PhaseOrder::new(25.0)
    }

    fn execute(&mut self, w: &mut DemoWorld, rng: &mut SimRng, ctx: &mut Ctx<'_>) -> Result<PhaseOutcome, PhaseError> {
        if !ctx.has_subsystem(CLIMATE) {
            return Ok(PhaseOutcome::empty());
        }
        let Some(climate) = w.climate.as_mut() else {
            return Err(PhaseError::invalid_state(CLIMATE, "reported present but missing"));
        };
        climate.temperature_anomaly += climate.warming_rate + rng.normal(0.0, 0.01);

        let anomaly = climate.temperature_anomaly;
        if anomaly > HEATWAVE_ANOMALY && rng.chance(0.1) {
            ctx.aggregator().record_crisis("heatwave");
            ctx.emit(
                Event::new("heatwave", format!("anomaly {:.2}C", anomaly))
                    .with_severity(Severity::Medium)
                    .with_details(json!({ "anomaly": anomaly })),
            );
        }
        Ok(PhaseOutcome::empty().metadata(json!({ "anomaly": anomaly })))
    }
}

/// Signs treaties between the most compatible partners in the cache.
pub struct DiplomacyPhase;

impl Phase<DemoWorld> for DiplomacyPhase {
    fn id(&self) -> &str {
        "diplomacy"
    }
    fn name(&self) -> &str {
        "Diplomacy"
    }
    fn order(&self) -> PhaseOrder {
        PhaseOrder::new(30.0)
    }

    fn execute(&mut self, w: &mut DemoWorld, rng: &mut SimRng, ctx: &mut Ctx<'_>) -> Result<PhaseOutcome, PhaseError> {
        let mut signed = Vec::new();
        for nation in ctx.cache().actors() {
            let Some((partner, affinity)) = ctx.cache().best_partner(nation.key()) else {
                continue;
            };
            let pair = PairKey::new(nation.key(), partner.key());
            if affinity < TREATY_AFFINITY || w.treaties.contains(&pair) {
                continue;
            }
            if rng.chance(affinity * 0.1) {
                signed.push((pair, affinity));
            }
        }

        let count = signed.len();
        for (pair, affinity) in signed {
            if !w.treaties.insert(pair.clone()) {
                continue;
            }
            if let Some(t) = w.tensions.get_mut(&pair) {
                *t = (*t - 0.1).max(0.0);
            }
            ctx.aggregator().record("diplomacy", "treaty");
            ctx.emit(
                Event::new("treaty", format!("treaty signed {}", pair))
                    .with_details(json!({ "pair": pair.to_string(), "affinity": affinity })),
            );
        }
        Ok(PhaseOutcome::empty().metadata(json!({ "treaties": w.treaties.len(), "signed": count })))
    }
}

/// Drifts national power and stability; tension erodes stability.
pub struct StabilityPhase;

impl Phase<DemoWorld> for StabilityPhase {
    fn id(&self) -> &str {
        "stability"
    }
    fn name(&self) -> &str {
        "National Stability"
    }
    fn order(&self) -> PhaseOrder {
        PhaseOrder::new(35.0)
    }
    fn depends_on(&self) -> &[&'static str] {
        &["diplomacy"]
    }

    fn execute(&mut self, w: &mut DemoWorld, rng: &mut SimRng, ctx: &mut Ctx<'_>) -> Result<PhaseOutcome, PhaseError> {
        let codes: Vec<String> = w.nations.iter().map(|n| n.code.clone()).collect();
        for code in codes {
            let tension: f64 = w
                .tensions
                .iter()
                .filter(|(k, _)| k.contains(&code))
                .map(|(_, t)| *t)
                .sum();
            let treaties = w.treaties.iter().filter(|k| k.contains(&code)).count() as f64;
            let scarcity = (SCARCITY_RATIO - w.resources).max(0.0);
            let drift = rng.normal(0.0, 0.01);

            let Some(nation) = w.nation_mut(&code) else {
                continue;
            };
            nation.power = (nation.power * (1.0 + drift)).clamp(0.0, 1.0);
            nation.stability =
                (nation.stability - 0.005 * tension - 0.02 * scarcity + 0.003 * treaties + drift).clamp(0.0, 1.0);

            if nation.stability < UNREST_STABILITY {
                ctx.aggregator().record_crisis("unrest");
                ctx.emit(
                    Event::new("unrest", format!("{} stability {:.2}", code, nation.stability))
                        .with_severity(Severity::High),
                );
            }
        }
        Ok(PhaseOutcome::empty().metadata(json!({ "mean_stability": w.mean_stability() })))
    }
}

/// Background cyber activity. Too frequent to log; only counted.
pub struct CyberPhase;

impl Phase<DemoWorld> for CyberPhase {
    fn id(&self) -> &str {
        "cyber"
    }
    fn name(&self) -> &str {
        "Cyber Operations"
    }
    fn order(&self) -> PhaseOrder {
        PhaseOrder::new(40.0)
    }

    fn execute(&mut self, w: &mut DemoWorld, rng: &mut SimRng, ctx: &mut Ctx<'_>) -> Result<PhaseOutcome, PhaseError> {
        let mut succeeded = 0u32;
        for _ in 0..w.nations.len() {
            if !rng.chance(0.4) {
                continue;
            }
            if rng.chance(w.cyber_defense) {
                ctx.aggregator().record_attack(AttackOutcome::Blocked);
                ctx.aggregator().record_detection(DetectionOutcome::Detected);
            } else {
                succeeded += 1;
                ctx.aggregator().record_attack(AttackOutcome::Succeeded);
                let detection = if rng.chance(0.5) {
                    DetectionOutcome::Detected
                } else {
                    DetectionOutcome::Missed
                };
                ctx.aggregator().record_detection(detection);
            }
        }
        // defenders learn from breaches
        w.cyber_defense = (w.cyber_defense + 0.002 * f64::from(succeeded)).min(0.95);
        Ok(PhaseOutcome::empty())
    }
}

// ─── Wiring ──────────────────────────────────────────────────────────────────

/// Register the reference phases plus harvest and time advancement.
pub fn register_reference_phases(sim: &mut Simulation<DemoWorld>) -> Result<(), EngineError> {
    sim.register(ResourcePhase)?;
    sim.register(PopulationPhase)?;
    sim.register(ClimatePhase)?;
    sim.register(DiplomacyPhase)?;
    sim.register(StabilityPhase)?;
    sim.register(CyberPhase)?;
    sim.register(HarvestPhase::new())?;
    sim.register(AdvanceTimePhase::new())?;
    Ok(())
}

pub fn reference_simulation(
    world: DemoWorld,
    seed: u64,
    config: EngineConfig,
) -> Result<Simulation<DemoWorld>, EngineError> {
    let mut sim = Simulation::new(world, seed, config)?;
    register_reference_phases(&mut sim)?;
    Ok(sim)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EventRetention;

    fn sim(seed: u64) -> Simulation<DemoWorld> {
        reference_simulation(DemoWorld::default(), seed, EngineConfig::default()).unwrap()
    }

    #[test]
    fn test_phase_order() {
        let mut s = sim(1);
        s.step().unwrap();
        assert_eq!(
            s.scheduler().phase_ids(),
            vec!["resources", "population", "climate", "diplomacy", "stability", "cyber", "collect_events", "time_advancement"]
        );
    }

    #[test]
    fn test_runs_a_decade() {
        let mut s = sim(7);
        let summary = s.run(120, EventRetention::Full).unwrap();
        assert!(summary.steps > 0);
        assert_eq!(summary.final_step, summary.steps);
        assert!(summary.rng_draws > 0);
        // cyber activity is counted but never logged
        assert!(s.aggregator().category_total("attacks") > 0);
        assert!(summary.events.iter().all(|e| e.kind != "attack"));
    }

    #[test]
    fn test_absent_climate_is_noop() {
        let mut s = reference_simulation(DemoWorld::default().without_climate(), 3, EngineConfig::default()).unwrap();
        let report = s.step().unwrap();
        assert_eq!(report.absent_subsystems, vec![CLIMATE.to_string()]);
        assert!(!report.metadata.contains_key(CLIMATE));
        assert!(s.world().climate.is_none());
    }

    #[test]
    fn test_tension_lookup_is_symmetric() {
        let w = DemoWorld::default();
        assert_eq!(w.tension("usa", "chn"), w.tension("chn", "usa"));
        assert_eq!(w.tension("usa", "chn"), Some(0.7));
        assert_eq!(w.tension("ind", "bra"), None);
    }

    #[test]
    fn test_collapse_is_terminal() {
        let mut w = DemoWorld::default();
        w.population = 10.0;
        assert!(w.terminal().is_some());
        let mut s = reference_simulation(w, 1, EngineConfig::default()).unwrap();
        let summary = s.run(50, EventRetention::Summary).unwrap();
        assert_eq!(summary.steps, 0);
        assert!(summary.terminal.is_some());
    }

    #[test]
    fn test_world_round_trips_through_json() {
        let mut s = sim(11);
        s.run(24, EventRetention::Summary).unwrap();
        let world = s.snapshot();
        let json = serde_json::to_string(&world).unwrap();
        let back: DemoWorld = serde_json::from_str(&json).unwrap();
        assert_eq!(back, world);
    }
}
