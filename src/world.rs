// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Epoch Engine - World State Boundary

use serde::{Deserialize, Serialize};

use crate::types::Step;

// ─── SimClock ────────────────────────────────────────────────────────────────

/// Simulation time. Only the time-advance phase moves it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimClock {
    pub step: Step,
}

impl SimClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(step: Step) -> Self {
        Self { step }
    }

    pub fn step(&self) -> Step {
        self.step
    }

    /// Advance one step and return the new step.
    pub fn advance(&mut self) -> Step {
        self.step += 1;
        self.step
    }

    /// Month within the year, 0-based.
    pub fn month(&self) -> u64 {
        self.step % 12
    }

    pub fn year(&self) -> u64 {
        self.step / 12
    }
}

// ─── Actor ───────────────────────────────────────────────────────────────────

/// A member of the bounded roster the interaction cache indexes.
pub trait Actor {
    /// Stable identity, unique within the roster.
    fn key(&self) -> &str;
    /// The metric pairwise similarity and the leader pointer are computed from.
    fn primary_metric(&self) -> f64;
}

/// Roster type for worlds without actors.
#[derive(Debug, Clone, PartialEq)]
pub enum NoActor {}

impl Actor for NoActor {
    fn key(&self) -> &str {
        match *self {}
    }

    fn primary_metric(&self) -> f64 {
        match *self {}
    }
}

// ─── Monitoring ──────────────────────────────────────────────────────────────

/// A numeric field that must stay finite after every step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonitoredField {
    pub path: String,
    pub value: f64,
}

impl MonitoredField {
    pub fn new(path: impl Into<String>, value: f64) -> Self {
        Self { path: path.into(), value }
    }
}

/// Presence of an optional subsystem inside the world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SubsystemStatus {
    pub name: &'static str,
    pub present: bool,
}

impl SubsystemStatus {
    pub fn new(name: &'static str, present: bool) -> Self {
        Self { name, present }
    }
}

// ─── World ───────────────────────────────────────────────────────────────────

/// The shared mutable aggregate every phase reads and writes.
///
/// A world is owned by exactly one run. Domain modules keep their own
/// sub-structures inside it as plain nested data so a run can be cloned or
/// serialized for history capture.
pub trait World {
    type Actor: Actor + Clone;

    fn clock(&self) -> &SimClock;
    fn clock_mut(&mut self) -> &mut SimClock;

    /// Roster indexed by the interaction cache.
    fn actors(&self) -> &[Self::Actor] {
        &[]
    }

    /// Bilateral tension between two actors in [0, 1], if tracked.
    fn tension(&self, _a: &str, _b: &str) -> Option<f64> {
        None
    }

    fn monitored_fields(&self) -> Vec<MonitoredField> {
        Vec::new()
    }

    fn subsystems(&self) -> Vec<SubsystemStatus> {
        Vec::new()
    }

    /// Absorbing outcome that ends the run, if reached.
    fn terminal(&self) -> Option<String> {
        None
    }
}
