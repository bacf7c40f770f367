// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Epoch Engine - Event Aggregator

use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::types::Step;

type Counters = BTreeMap<String, BTreeMap<String, u64>>;

const ATTACKS: &str = "attacks";
const DETECTIONS: &str = "detections";
const CRISES: &str = "crises";
const BREAKTHROUGHS: &str = "breakthroughs";

// ─── Config ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AggregatorConfig {
    /// Minimum steps between two summaries.
    pub report_interval: u64,
    /// Clear running totals whenever a summary is emitted.
    pub reset_totals_on_report: bool,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            report_interval: 12,
            reset_totals_on_report: false,
        }
    }
}

// ─── Outcomes ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AttackOutcome {
    Blocked,
    Succeeded,
}

impl AttackOutcome {
    fn label(&self) -> &'static str {
        match self {
            Self::Blocked => "blocked",
            Self::Succeeded => "succeeded",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DetectionOutcome {
    Detected,
    Missed,
}

impl DetectionOutcome {
    fn label(&self) -> &'static str {
        match self {
            Self::Detected => "detected",
            Self::Missed => "missed",
        }
    }
}

// ─── Summary ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryGroup {
    pub category: String,
    /// Counts recorded since the previous summary.
    pub window: BTreeMap<String, u64>,
    /// Counts since the last reset.
    pub total: BTreeMap<String, u64>,
}

/// One periodic report covering steps `window_start..=step`. The first
/// summary starts at step 0; later ones start just after the previous report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateSummary {
    pub step: Step,
    pub window_start: Step,
    pub groups: Vec<SummaryGroup>,
}

impl AggregateSummary {
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// One line per category, e.g. `attacks: blocked=5 succeeded=2 (total 40)`.
    pub fn render(&self) -> String {
        let mut out = format!("steps {}-{}", self.window_start, self.step);
        for g in &self.groups {
            let _ = write!(out, "\n  {}:", g.category);
            for (label, n) in &g.window {
                let _ = write!(out, " {}={}", label, n);
            }
            let total: u64 = g.total.values().sum();
            let _ = write!(out, " (total {})", total);
        }
        out
    }
}

// ─── EventAggregator ─────────────────────────────────────────────────────────

/// Categorized counters for high-frequency occurrences, reported periodically
/// instead of per occurrence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventAggregator {
    config: AggregatorConfig,
    totals: Counters,
    window: Counters,
    last_report: Step,
    window_start: Step,
    reports: u64,
}

impl Default for EventAggregator {
    fn default() -> Self {
        Self::new(AggregatorConfig::default())
    }
}

impl EventAggregator {
    pub fn new(config: AggregatorConfig) -> Self {
        Self {
            config,
            totals: Counters::new(),
            window: Counters::new(),
            last_report: 0,
            window_start: 0,
            reports: 0,
        }
    }

    /// Increment `category/label` by one.
    pub fn record(&mut self, category: &str, label: &str) {
        self.record_n(category, label, 1);
    }

    pub fn record_n(&mut self, category: &str, label: &str, n: u64) {
        if n == 0 {
            return;
        }
        for counters in [&mut self.totals, &mut self.window] {
            *counters
                .entry(category.to_string())
                .or_default()
                .entry(label.to_string())
                .or_insert(0) += n;
        }
    }

    pub fn record_attack(&mut self, outcome: AttackOutcome) {
        self.record(ATTACKS, outcome.label());
    }

    pub fn record_detection(&mut self, outcome: DetectionOutcome) {
        self.record(DETECTIONS, outcome.label());
    }

    pub fn record_crisis(&mut self, kind: &str) {
        self.record(CRISES, kind);
    }

    pub fn record_breakthrough(&mut self, domain: &str) {
        self.record(BREAKTHROUGHS, domain);
    }

    /// Running total for `category/label`.
    pub fn count(&self, category: &str, label: &str) -> u64 {
        lookup(&self.totals, category, label)
    }

    /// Count recorded since the last summary.
    pub fn window_count(&self, category: &str, label: &str) -> u64 {
        lookup(&self.window, category, label)
    }

    pub fn category_total(&self, category: &str) -> u64 {
        self.totals.get(category).map_or(0, |m| m.values().sum())
    }

    pub fn is_due(&self, step: Step) -> bool {
        step.saturating_sub(self.last_report) >= self.config.report_interval
    }

    pub fn last_report(&self) -> Step {
        self.last_report
    }

    pub fn reports_emitted(&self) -> u64 {
        self.reports
    }

    /// Emit a summary if at least `report_interval` steps passed since the
    /// previous one; otherwise a no-op returning `None`.
    ///
    /// The window counters are cleared on every summary so consecutive
    /// summaries never share a count.
    pub fn report_summary(&mut self, step: Step) -> Option<AggregateSummary> {
        if !self.is_due(step) {
            return None;
        }

        let groups: Vec<SummaryGroup> = self
            .window
            .iter()
            .filter(|(_, labels)| labels.values().any(|&n| n > 0))
            .map(|(category, labels)| SummaryGroup {
                category: category.clone(),
                window: labels.clone(),
                total: self.totals.get(category).cloned().unwrap_or_default(),
            })
            .collect();

        let summary = AggregateSummary {
            step,
            window_start: self.window_start,
            groups,
        };

        self.window.clear();
        self.last_report = step;
        self.window_start = step + 1;
        self.reports += 1;
        if self.config.reset_totals_on_report {
            self.totals.clear();
        }

        if !summary.is_empty() {
            info!(step, groups = summary.groups.len(), "{}", summary.render());
        }
        Some(summary)
    }

    /// Clear every counter. The window marker is kept.
    pub fn reset(&mut self) {
        self.totals.clear();
        self.window.clear();
    }
}

fn lookup(counters: &Counters, category: &str, label: &str) -> u64 {
    counters
        .get(category)
        .and_then(|m| m.get(label))
        .copied()
        .unwrap_or(0)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
