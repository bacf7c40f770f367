// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Epoch Engine - Phase Contract

use std::cmp::Ordering;
use std::fmt;
use std::marker::PhantomData;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;

use crate::aggregator::EventAggregator;
use crate::error::PhaseError;
use crate::events::EventLog;
use crate::interaction::InteractionCache;
use crate::rng::SimRng;
use crate::types::{Event, PhaseOutcome, Step};
use crate::world::World;

/// Default order of the built-in event collection phase.
pub const HARVEST_ORDER: f64 = 990.0;
/// Default order of the built-in time-advance phase.
pub const ADVANCE_ORDER: f64 = 1000.0;

// ─── PhaseOrder ──────────────────────────────────────────────────────────────

/// Execution-order key. Compared with `f64::total_cmp`; the scheduler
/// refuses non-finite keys at registration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PhaseOrder(f64);

impl PhaseOrder {
    pub const fn new(value: f64) -> Self {
        Self(value)
    }

    pub fn value(self) -> f64 {
        self.0
    }

    pub fn is_finite(self) -> bool {
        self.0.is_finite()
    }
}

impl From<f64> for PhaseOrder {
    fn from(v: f64) -> Self {
        Self(v)
    }
}

impl PartialEq for PhaseOrder {
    fn eq(&self, other: &Self) -> bool {
        self.0.total_cmp(&other.0) == Ordering::Equal
    }
}

impl Eq for PhaseOrder {}

impl PartialOrd for PhaseOrder {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PhaseOrder {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl fmt::Display for PhaseOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ─── PhaseKind ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum PhaseKind {
    /// Ordinary domain update.
    Update,
    /// Harvests this step's events from the log. At most one per scheduler.
    Harvest,
    /// Advances the world clock. At most one, and strictly last.
    Advance,
}

// ─── StepContext ─────────────────────────────────────────────────────────────

/// Per-step services handed to every phase.
pub struct StepContext<'a, A> {
    step: Step,
    log: &'a mut EventLog,
    cache: &'a InteractionCache<A>,
    aggregator: &'a mut EventAggregator,
    absent: &'a [String],
    emitted: Vec<Event>,
    harvested: Option<Vec<Event>>,
}

impl<'a, A> StepContext<'a, A> {
    pub fn new(
        step: Step,
        log: &'a mut EventLog,
        cache: &'a InteractionCache<A>,
        aggregator: &'a mut EventAggregator,
        absent: &'a [String],
    ) -> Self {
        Self {
            step,
            log,
            cache,
            aggregator,
            absent,
            emitted: Vec::new(),
            harvested: None,
        }
    }

    /// The step being executed. Fixed for the whole step, even after the
    /// time-advance phase moves the world clock.
    pub fn step(&self) -> Step {
        self.step
    }

    /// Deposit an event into the run's log, tagging it with this step.
    pub fn emit(&mut self, mut event: Event) {
        event.step.get_or_insert(self.step);
        if self.harvested.is_some() {
            warn!(step = self.step, kind = %event.kind, "event emitted after harvest; it will not be collected");
        }
        if self.log.append(event.clone()) {
            self.emitted.push(event);
        }
    }

    pub fn cache(&self) -> &InteractionCache<A> {
        self.cache
    }

    pub fn aggregator(&mut self) -> &mut EventAggregator {
        self.aggregator
    }

    pub fn log(&self) -> &EventLog {
        self.log
    }

    /// Whether an optional world subsystem is present this step.
    pub fn has_subsystem(&self, name: &str) -> bool {
        !self.absent.iter().any(|n| n == name)
    }

    pub fn absent_subsystems(&self) -> &[String] {
        self.absent
    }

    /// Collect this step's events from the log. Repeated calls within the
    /// step return the first harvest.
    pub fn harvest(&mut self) -> &[Event] {
        let step = self.step;
        let log = &*self.log;
        self.harvested.get_or_insert_with(|| log.collect(step))
    }

    pub fn is_harvested(&self) -> bool {
        self.harvested.is_some()
    }

    pub fn emitted(&self) -> &[Event] {
        &self.emitted
    }

    /// Consume the context: (events emitted, harvest if one ran).
    pub fn finish(self) -> (Vec<Event>, Option<Vec<Event>>) {
        (self.emitted, self.harvested)
    }
}

// ─── Phase ───────────────────────────────────────────────────────────────────

/// A unit of per-step work.
///
/// Given the same world and the same RNG draws, a phase must make the same
/// mutations and emit the same events. A phase that needs another phase's
/// output from this step declares it in `depends_on` and takes a strictly
/// larger order.
pub trait Phase<W: World>: Send {
    fn id(&self) -> &str;
    fn name(&self) -> &str;
    fn order(&self) -> PhaseOrder;

    fn kind(&self) -> PhaseKind {
        PhaseKind::Update
    }

    /// Ids of phases that must run earlier in the same step.
    fn depends_on(&self) -> &[&'static str] {
        &[]
    }

    fn execute(
        &mut self,
        world: &mut W,
        rng: &mut SimRng,
        ctx: &mut StepContext<'_, W::Actor>,
    ) -> Result<PhaseOutcome, PhaseError>;
}

/// Static description of a registered phase.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhaseDescriptor {
    pub id: String,
    pub name: String,
    pub order: PhaseOrder,
    pub kind: PhaseKind,
    pub depends_on: Vec<String>,
}

impl PhaseDescriptor {
    pub fn of<W: World>(phase: &dyn Phase<W>) -> Self {
        Self {
            id: phase.id().to_string(),
            name: phase.name().to_string(),
            order: phase.order(),
            kind: phase.kind(),
            depends_on: phase.depends_on().iter().map(|d| d.to_string()).collect(),
        }
    }
}

// ─── FnPhase ─────────────────────────────────────────────────────────────────

/// Phase backed by a closure.
pub struct FnPhase<W, F> {
    id: String,
    name: String,
    order: PhaseOrder,
    kind: PhaseKind,
    depends_on: Vec<&'static str>,
    f: F,
    _world: PhantomData<fn() -> W>,
}

impl<W, F> FnPhase<W, F>
where
    W: World,
    F: FnMut(&mut W, &mut SimRng, &mut StepContext<'_, W::Actor>) -> Result<PhaseOutcome, PhaseError>
        + Send,
{
    pub fn new(id: impl Into<String>, name: impl Into<String>, order: f64, f: F) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            order: PhaseOrder::new(order),
            kind: PhaseKind::Update,
            depends_on: Vec::new(),
            f,
            _world: PhantomData,
        }
    }

    pub fn with_kind(mut self, kind: PhaseKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn after(mut self, dependency: &'static str) -> Self {
        self.depends_on.push(dependency);
        self
    }
}

impl<W, F> Phase<W> for FnPhase<W, F>
where
    W: World,
    F: FnMut(&mut W, &mut SimRng, &mut StepContext<'_, W::Actor>) -> Result<PhaseOutcome, PhaseError>
        + Send,
{
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn order(&self) -> PhaseOrder {
        self.order
    }

    fn kind(&self) -> PhaseKind {
        self.kind
    }

    fn depends_on(&self) -> &[&'static str] {
        &self.depends_on
    }

    fn execute(
        &mut self,
        world: &mut W,
        rng: &mut SimRng,
        ctx: &mut StepContext<'_, W::Actor>,
    ) -> Result<PhaseOutcome, PhaseError> {
        (self.f)(world, rng, ctx)
    }
}

// ─── Built-in phases ─────────────────────────────────────────────────────────

/// Harvests exactly the events tagged with the current step.
#[derive(Debug, Clone, Copy)]
pub struct HarvestPhase {
    order: PhaseOrder,
}

impl HarvestPhase {
    pub fn new() -> Self {
        Self::at(HARVEST_ORDER)
    }

    pub fn at(order: f64) -> Self {
        Self { order: PhaseOrder::new(order) }
    }
}

impl Default for HarvestPhase {
    fn default() -> Self { Self::new() }
}

impl<W: World> Phase<W> for HarvestPhase {
    fn id(&self) -> &str {
        "collect_events"
    }

    fn name(&self) -> &str {
        "Event Collection"
    }

    fn order(&self) -> PhaseOrder {
        self.order
    }

    fn kind(&self) -> PhaseKind {
        PhaseKind::Harvest
    }

    fn execute(
        &mut self,
        _world: &mut W,
        _rng: &mut SimRng,
        ctx: &mut StepContext<'_, W::Actor>,
    ) -> Result<PhaseOutcome, PhaseError> {
        let harvested = ctx.harvest().len();
        Ok(PhaseOutcome::empty().metadata(json!({ "harvested": harvested })))
    }
}

/// Moves the world clock forward one step. Registered last.
#[derive(Debug, Clone, Copy)]
pub struct AdvanceTimePhase {
    order: PhaseOrder,
}

impl AdvanceTimePhase {
    pub fn new() -> Self {
        Self::at(ADVANCE_ORDER)
    }

    pub fn at(order: f64) -> Self {
        Self { order: PhaseOrder::new(order) }
    }
}

impl Default for AdvanceTimePhase {
    fn default() -> Self { Self::new() }
}

impl<W: World> Phase<W> for AdvanceTimePhase {
    fn id(&self) -> &str {
        "time_advancement"
    }

    fn name(&self) -> &str {
        "Time Advancement"
    }

    fn order(&self) -> PhaseOrder {
        self.order
    }

    fn kind(&self) -> PhaseKind {
        PhaseKind::Advance
    }

    fn execute(
        &mut self,
        world: &mut W,
        _rng: &mut SimRng,
        _ctx: &mut StepContext<'_, W::Actor>,
    ) -> Result<PhaseOutcome, PhaseError> {
        let next = world.clock_mut().advance();
        Ok(PhaseOutcome::empty().metadata(json!({ "next_step": next })))
    }
}
