// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Epoch Engine - Phase Scheduler

use tracing::{debug, trace};

use crate::config::TiePolicy;
use crate::error::EngineError;
use crate::phase::{Phase, PhaseDescriptor, PhaseKind, StepContext};
use crate::rng::SimRng;
use crate::types::PhaseMetadata;
use crate::world::World;

// ─── Scheduler ───────────────────────────────────────────────────────────────

/// Owns the registered phases and runs them once per step in ascending
/// order. Ties run in registration order.
///
/// Registration is setup-time only: the first step (or an explicit
/// [`seal`](Self::seal)) validates the whole set and closes registration.
pub struct Scheduler<W: World> {
    phases: Vec<Box<dyn Phase<W>>>,
    tie_policy: TiePolicy,
    sealed: bool,
}

impl<W: World> Default for Scheduler<W> {
    fn default() -> Self {
        Self::new(TiePolicy::Stable)
    }
}

impl<W: World> Scheduler<W> {
    pub fn new(tie_policy: TiePolicy) -> Self {
        Self {
            phases: Vec::new(),
            tie_policy,
            sealed: false,
        }
    }

    pub fn register<P: Phase<W> + 'static>(&mut self, phase: P) -> Result<(), EngineError> {
        self.register_boxed(Box::new(phase))
    }

    pub fn register_boxed(&mut self, phase: Box<dyn Phase<W>>) -> Result<(), EngineError> {
        let id = phase.id().to_string();
        if self.sealed {
            return Err(EngineError::RegistrationClosed { id });
        }
        if self.phases.iter().any(|p| p.id() == id) {
            return Err(EngineError::DuplicatePhaseId { id });
        }

        let order = phase.order();
        if !order.is_finite() {
            return Err(EngineError::InvalidOrder { id, order: order.value() });
        }

        if self.tie_policy == TiePolicy::Reject {
            if let Some(other) = self.phases.iter().find(|p| p.order() == order) {
                return Err(EngineError::OrderCollision {
                    id,
                    other: other.id().to_string(),
                    order,
                });
            }
        }

        let kind = phase.kind();
        if kind != PhaseKind::Update {
            if let Some(existing) = self.phases.iter().find(|p| p.kind() == kind) {
                return Err(EngineError::DuplicateRole {
                    role: kind,
                    id,
                    existing: existing.id().to_string(),
                });
            }
        }

        // Fail fast on anything already known; seal() re-checks the full set.
        check_advance_last(self.phases.iter().map(|p| &**p).chain(std::iter::once(&*phase)))?;
        for dep in phase.depends_on() {
            if let Some(dep_phase) = self.phases.iter().find(|p| p.id() == *dep) {
                check_dependency_order(&*phase, &**dep_phase)?;
            }
        }

        debug!(phase = %id, order = %order, kind = ?kind, "phase registered");
        self.phases.push(phase);
        Ok(())
    }

    /// Validate dependencies and fix the execution order. Idempotent.
    pub fn seal(&mut self) -> Result<(), EngineError> {
        if self.sealed {
            return Ok(());
        }
        for phase in &self.phases {
            for dep in phase.depends_on() {
                let dep_phase = self
                    .phases
                    .iter()
                    .find(|p| p.id() == *dep)
                    .ok_or_else(|| EngineError::UnknownDependency {
                        id: phase.id().to_string(),
                        dependency: dep.to_string(),
                    })?;
                check_dependency_order(&**phase, &**dep_phase)?;
            }
        }
        check_advance_last(self.phases.iter().map(|p| &**p))?;

        // sort_by is stable: equal orders keep registration order
        self.phases.sort_by(|a, b| a.order().cmp(&b.order()));
        self.sealed = true;
        debug!(phases = self.phases.len(), "scheduler sealed");
        Ok(())
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub fn len(&self) -> usize {
        self.phases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }

    pub fn has_kind(&self, kind: PhaseKind) -> bool {
        self.phases.iter().any(|p| p.kind() == kind)
    }

    /// Phase descriptors, in execution order once sealed.
    pub fn descriptors(&self) -> Vec<PhaseDescriptor> {
        self.phases.iter().map(|p| PhaseDescriptor::of(&**p)).collect()
    }

    pub fn phase_ids(&self) -> Vec<&str> {
        self.phases.iter().map(|p| p.id()).collect()
    }

    /// Run every phase once, in order.
    ///
    /// Events land in `ctx`; metadata is merged by phase id. The first
    /// failing phase aborts the step. Mutations made by phases that already
    /// ran are kept.
    pub fn run_step(
        &mut self,
        world: &mut W,
        rng: &mut SimRng,
        ctx: &mut StepContext<'_, W::Actor>,
    ) -> Result<PhaseMetadata, EngineError> {
        self.seal()?;
        let step = ctx.step();
        let mut metadata = PhaseMetadata::new();

        for phase in self.phases.iter_mut() {
            let before = ctx.emitted().len();
            trace!(step, phase = phase.id(), "phase start");

            let outcome = phase.execute(world, rng, ctx).map_err(|source| {
                EngineError::PhaseExecution {
                    phase_id: phase.id().to_string(),
                    step,
                    source,
                }
            })?;

            for event in outcome.events {
                ctx.emit(event);
            }
            if let Some(meta) = outcome.metadata {
                metadata.insert(phase.id().to_string(), meta);
            }
            debug!(step, phase = phase.id(), events = ctx.emitted().len() - before, "phase complete");
        }

        Ok(metadata)
    }
}

fn check_dependency_order<W: World>(
    phase: &dyn Phase<W>,
    dep: &dyn Phase<W>,
) -> Result<(), EngineError> {
    if dep.order() >= phase.order() {
        return Err(EngineError::DependencyOrder {
            id: phase.id().to_string(),
            dependency: dep.id().to_string(),
            order: phase.order(),
            dependency_order: dep.order(),
        });
    }
    Ok(())
}

fn check_advance_last<'a, W, I>(phases: I) -> Result<(), EngineError>
where
    W: World + 'a,
    I: Iterator<Item = &'a (dyn Phase<W> + 'static)> + Clone,
{
    let Some(advance) = phases.clone().find(|p| p.kind() == PhaseKind::Advance) else {
        return Ok(());
    };
    for other in phases {
        if other.id() != advance.id() && other.order() >= advance.order() {
            return Err(EngineError::AdvanceNotLast {
                id: advance.id().to_string(),
                order: advance.order(),
                other: other.id().to_string(),
                other_order: other.order(),
            });
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
