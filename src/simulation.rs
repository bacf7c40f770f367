// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Epoch Engine - Simulation Core

use std::collections::BTreeSet;

use tracing::{debug, info, warn};

use crate::aggregator::{AggregateSummary, EventAggregator};
use crate::config::{EngineConfig, EventRetention};
use crate::error::EngineError;
use crate::events::EventLog;
use crate::interaction::InteractionCache;
use crate::phase::{Phase, PhaseKind, StepContext};
use crate::rng::SimRng;
use crate::scheduler::Scheduler;
use crate::types::{Event, RunSummary, Step, StepReport};
use crate::world::World;

// ─── Simulation ──────────────────────────────────────────────────────────────

/// One seeded run: a world plus everything the engine keeps beside it.
///
/// Nothing here is shared between runs, so independent runs can be driven
/// from separate threads.
pub struct Simulation<W: World> {
    world: W,
    rng: SimRng,
    scheduler: Scheduler<W>,
    log: EventLog,
    aggregator: EventAggregator,
    cache: InteractionCache<W::Actor>,
    config: EngineConfig,
    steps_run: u64,
    absent_warned: BTreeSet<String>,
    summaries: Vec<AggregateSummary>,
}

impl<W: World> Simulation<W> {
    pub fn new(world: W, seed: u64, config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self {
            world,
            rng: SimRng::new(seed),
            scheduler: Scheduler::new(config.tie_policy),
            log: EventLog::new(config.log),
            aggregator: EventAggregator::new(config.aggregator),
            cache: InteractionCache::default(),
            config,
            steps_run: 0,
            absent_warned: BTreeSet::new(),
            summaries: Vec::new(),
        })
    }

    pub fn with_defaults(world: W, seed: u64) -> Self {
        Self {
            world,
            rng: SimRng::new(seed),
            scheduler: Scheduler::default(),
            log: EventLog::default(),
            aggregator: EventAggregator::default(),
            cache: InteractionCache::default(),
            config: EngineConfig::default(),
            steps_run: 0,
            absent_warned: BTreeSet::new(),
            summaries: Vec::new(),
        }
    }

    /// Add a phase. Only valid before the first step.
    pub fn register<P: Phase<W> + 'static>(&mut self, phase: P) -> Result<(), EngineError> {
        self.scheduler.register(phase)
    }

    pub fn register_boxed(&mut self, phase: Box<dyn Phase<W>>) -> Result<(), EngineError> {
        self.scheduler.register_boxed(phase)
    }

    /// Execute one step.
    ///
    /// The interaction cache is rebuilt from the world first. If no
    /// [`PhaseKind::Advance`] phase is registered the clock is advanced here
    /// once the phases have run.
    ///
    /// On error the world keeps whatever the phases before the failing one
    /// wrote; callers that need atomic steps snapshot the world first.
    pub fn step(&mut self) -> Result<StepReport, EngineError> {
        self.scheduler.seal()?;
        let step = self.world.clock().step();
        let absent = self.absent_subsystems(step);

        self.cache = InteractionCache::from_world(&self.world);

        let mut ctx = StepContext::new(
            step,
            &mut self.log,
            &self.cache,
            &mut self.aggregator,
            &absent,
        );
        let metadata = self
            .scheduler
            .run_step(&mut self.world, &mut self.rng, &mut ctx)?;
        let (events, harvested) = ctx.finish();
        if !self.scheduler.has_kind(PhaseKind::Advance) {
            self.world.clock_mut().advance();
        }

        // Without a harvest phase the run still hands consumers this step's events.
        let harvested = harvested.unwrap_or_else(|| self.log.collect(step));
        let pruned = self.log.prune(step);
        if pruned > 0 {
            debug!(step, pruned, remaining = self.log.len(), "event log pruned");
        }

        let summary = self
            .aggregator
            .report_summary(step)
            .filter(|s| !s.is_empty());
        if let Some(s) = &summary {
            self.summaries.push(s.clone());
        }

        if self.config.check_finite {
            self.check_finite(step)?;
        }
        self.steps_run += 1;

        debug!(step, events = events.len(), harvested = harvested.len(), "step complete");
        Ok(StepReport {
            step,
            events,
            harvested,
            metadata,
            summary,
            absent_subsystems: absent,
            pruned,
            log_len: self.log.len(),
        })
    }

    /// Step until `max_steps` have run or the world reaches a terminal state.
    pub fn run(&mut self, max_steps: u64, retention: EventRetention) -> Result<RunSummary, EngineError> {
        self.run_until(max_steps, retention, || false, |_, _| {})
    }

    /// [`run`](Self::run) with a cancellation callback checked before every step
    /// and an observer called after every step.
    pub fn run_until<C, O>(
        &mut self,
        max_steps: u64,
        retention: EventRetention,
        mut cancelled: C,
        mut observe: O,
    ) -> Result<RunSummary, EngineError>
    where
        C: FnMut() -> bool,
        O: FnMut(&StepReport, &W),
    {
        let mut events: Vec<Event> = Vec::new();
        let mut summaries = Vec::new();
        let mut event_count = 0u64;
        let mut steps = 0u64;
        let mut terminal = None;
        let mut was_cancelled = false;

        loop {
            if let Some(reason) = self.world.terminal() {
                terminal = Some(reason);
                break;
            }
            if steps >= max_steps {
                break;
            }
            if cancelled() {
                was_cancelled = true;
                break;
            }

            let mut report = self.step()?;
            steps += 1;
            observe(&report, &self.world);

            event_count += report.harvested.len() as u64;
            if let Some(s) = report.summary.take() {
                summaries.push(s);
            }
            if retention == EventRetention::Full {
                events.append(&mut report.harvested);
            }
        }

        if let Some(reason) = &terminal {
            info!(seed = self.rng.seed(), step = self.current_step(), reason = %reason, "run reached terminal state");
        }
        Ok(RunSummary {
            seed: self.rng.seed(),
            steps,
            final_step: self.current_step(),
            terminal,
            cancelled: was_cancelled,
            event_count,
            events,
            summaries,
            rng_draws: self.rng.draws(),
        })
    }

    fn absent_subsystems(&mut self, step: Step) -> Vec<String> {
        let absent: Vec<String> = self
            .world
            .subsystems()
            .into_iter()
            .filter(|s| !s.present)
            .map(|s| s.name.to_string())
            .collect();
        for name in &absent {
            if self.absent_warned.insert(name.clone()) {
                warn!(step, subsystem = %name, "optional subsystem absent; its phases will no-op");
            }
        }
        absent
    }

    fn check_finite(&self, step: Step) -> Result<(), EngineError> {
        match self
            .world
            .monitored_fields()
            .into_iter()
            .find(|f| !f.value.is_finite())
        {
            Some(field) => Err(EngineError::NonFiniteField {
                step,
                field: field.path,
                value: field.value,
            }),
            None => Ok(()),
        }
    }

    // ─── Accessors ───────────────────────────────────────────────────────

    pub fn world(&self) -> &W {
        &self.world
    }

    /// Mutable world access between steps (scenario setup, shocks).
    pub fn world_mut(&mut self) -> &mut W {
        &mut self.world
    }

    pub fn into_world(self) -> W {
        self.world
    }

    pub fn snapshot(&self) -> W
    where
        W: Clone,
    {
        self.world.clone()
    }

    pub fn current_step(&self) -> Step {
        self.world.clock().step()
    }

    pub fn seed(&self) -> u64 {
        self.rng.seed()
    }

    pub fn rng(&self) -> &SimRng {
        &self.rng
    }

    pub fn scheduler(&self) -> &Scheduler<W> {
        &self.scheduler
    }

    pub fn log(&self) -> &EventLog {
        &self.log
    }

    pub fn aggregator(&self) -> &EventAggregator {
        &self.aggregator
    }

    pub fn cache(&self) -> &InteractionCache<W::Actor> {
        &self.cache
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn steps_run(&self) -> u64 {
        self.steps_run
    }

    /// Non-empty aggregator summaries emitted so far.
    pub fn summaries(&self) -> &[AggregateSummary] {
        &self.summaries
    }
}
