// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Epoch Engine - Type Definitions

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::aggregator::AggregateSummary;

/// One discrete advancement of simulation time (a "month").
pub type Step = u64;

/// Per-phase metadata produced during one step, keyed by phase id.
pub type PhaseMetadata = BTreeMap<String, Value>;

// ─── Severity ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info = 0,
    Low = 1,
    Medium = 2,
    High = 3,
    Critical = 4,
}

impl Default for Severity {
    fn default() -> Self { Severity::Info }
}

// ─── Event ───────────────────────────────────────────────────────────────────

/// A notable occurrence emitted by a phase.
///
/// `step` is `None` until the event is deposited through a [`StepContext`],
/// which tags it with the step the phase ran in. The event log refuses
/// untagged events.
///
/// [`StepContext`]: crate::phase::StepContext
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub step: Option<Step>,
    pub description: String,
    #[serde(default)]
    pub severity: Option<Severity>,
    #[serde(default)]
    pub details: Option<Value>,
}

impl Event {
    pub fn new(kind: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            step: None,
            description: description.into(),
            severity: None,
            details: None,
        }
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Tag the event with an explicit step.
    pub fn at(mut self, step: Step) -> Self {
        self.step = Some(step);
        self
    }

    pub fn is_tagged(&self) -> bool {
        self.step.is_some()
    }
}

// ─── PhaseOutcome ────────────────────────────────────────────────────────────

/// What a phase hands back to the scheduler after `execute`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PhaseOutcome {
    pub events: Vec<Event>,
    pub metadata: Option<Value>,
}

impl PhaseOutcome {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_events(events: Vec<Event>) -> Self {
        Self { events, metadata: None }
    }

    pub fn metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn push(&mut self, event: Event) {
        self.events.push(event);
    }
}

// ─── StepReport ──────────────────────────────────────────────────────────────

/// Everything one step produced, handed to history/reporting consumers.
#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    /// The step the phases ran in (before time advancement).
    pub step: Step,
    /// Every event emitted this step, in phase order then emission order.
    pub events: Vec<Event>,
    /// Events harvested from the log for this step.
    pub harvested: Vec<Event>,
    pub metadata: PhaseMetadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<AggregateSummary>,
    pub absent_subsystems: Vec<String>,
    pub pruned: usize,
    pub log_len: usize,
}

// ─── RunSummary ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub seed: u64,
    /// Number of steps executed in this run.
    pub steps: u64,
    /// World clock at the end of the run.
    pub final_step: Step,
    /// Absorbing outcome that ended the run early, if any.
    pub terminal: Option<String>,
    pub cancelled: bool,
    pub event_count: u64,
    /// Full harvested event stream (empty when only summaries are retained).
    pub events: Vec<Event>,
    pub summaries: Vec<AggregateSummary>,
    pub rng_draws: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_builder() {
        let e = Event::new("crisis", "grain shortage")
            .with_severity(Severity::High)
            .with_details(json!({ "region": "north" }))
            .at(7);
        assert_eq!(e.kind, "crisis");
        assert_eq!(e.step, Some(7));
        assert_eq!(e.severity, Some(Severity::High));
        assert!(e.is_tagged());
    }

    #[test]
    fn test_event_serializes_kind_as_type() {
        let e = Event::new("treaty_signed", "A and B").at(3);
        let v = serde_json::to_value(&e).unwrap();
        assert_eq!(v["type"], "treaty_signed");
        assert_eq!(v["step"], 3);
    }

    #[test]
    fn test_event_missing_step_deserializes_untagged() {
        let e: Event = serde_json::from_str(r#"{"type":"x","description":"y"}"#).unwrap();
        assert!(!e.is_tagged());
        assert!(e.severity.is_none());
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Critical > Severity::High);
        assert_eq!(Severity::default(), Severity::Info);
    }
}
