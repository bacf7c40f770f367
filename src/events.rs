// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Epoch Engine - Event Collection & Memory Bounding

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::types::{Event, Step};

// ---------------------------------------------------------------------------
// Bounds
// ---------------------------------------------------------------------------

/// Size ceiling and lookback window of the event log.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LogBounds {
    /// Once the log holds more than this many events, it is pruned.
    pub prune_threshold: usize,
    /// Steps of history kept behind the current step when pruning.
    pub lookback_steps: u64,
}

impl Default for LogBounds {
    fn default() -> Self {
        Self {
            prune_threshold: 5000,
            lookback_steps: 12,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EventLogError {
    #[error("event `{kind}` has no step tag")]
    Untagged { kind: String },
}

// ---------------------------------------------------------------------------
// EventLog
// ---------------------------------------------------------------------------

/// Append-only log of step-tagged events, bounded by periodic pruning.
///
/// Harvesting filters on the step tag, never on log position, so pruning
/// old entries cannot change what a harvest returns for the current step.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventLog {
    events: Vec<Event>,
    bounds: LogBounds,
    dropped_untagged: u64,
    pruned_total: u64,
}

impl EventLog {
    pub fn new(bounds: LogBounds) -> Self {
        Self {
            events: Vec::new(),
            bounds,
            dropped_untagged: 0,
            pruned_total: 0,
        }
    }

    /// Append a tagged event, rejecting untagged ones.
    pub fn try_append(&mut self, event: Event) -> Result<(), EventLogError> {
        if event.step.is_none() {
            return Err(EventLogError::Untagged { kind: event.kind });
        }
        self.events.push(event);
        Ok(())
    }

    /// Append an event; untagged events are dropped and counted.
    /// Returns whether the event was kept.
    pub fn append(&mut self, event: Event) -> bool {
        match self.try_append(event) {
            Ok(()) => true,
            Err(EventLogError::Untagged { kind }) => {
                self.dropped_untagged += 1;
                warn!(kind = %kind, dropped = self.dropped_untagged, "dropping untagged event");
                false
            }
        }
    }

    /// Events tagged with exactly `step`, in append order.
    pub fn collect(&self, step: Step) -> Vec<Event> {
        self.events
            .iter()
            .filter(|e| e.step == Some(step))
            .cloned()
            .collect()
    }

    /// Enforce the size ceiling. Returns the number of events removed.
    ///
    /// Below the threshold this is a no-op. Above it, events older than the
    /// lookback window are dropped first; if the log is still over the
    /// threshold, the oldest remaining events not tagged with `current` go
    /// next. Events of the current step are never pruned, so a single step
    /// that emits more than the threshold survives until the next prune.
    pub fn prune(&mut self, current: Step) -> usize {
        if self.events.len() <= self.bounds.prune_threshold {
            return 0;
        }
        let before = self.events.len();
        let horizon = current.saturating_sub(self.bounds.lookback_steps);
        self.events.retain(|e| e.step.map_or(false, |s| s >= horizon));

        if self.events.len() > self.bounds.prune_threshold {
            let mut excess = self.events.len() - self.bounds.prune_threshold;
            self.events.retain(|e| {
                if excess > 0 && e.step != Some(current) {
                    excess -= 1;
                    false
                } else {
                    true
                }
            });
        }

        let removed = before - self.events.len();
        self.pruned_total += removed as u64;
        removed
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.iter()
    }

    pub fn bounds(&self) -> LogBounds {
        self.bounds
    }

    pub fn dropped_untagged(&self) -> u64 {
        self.dropped_untagged
    }

    pub fn pruned_total(&self) -> u64 {
        self.pruned_total
    }

    /// Clear all events and counters (new run).
    pub fn clear(&mut self) {
        self.events.clear();
        self.dropped_untagged = 0;
        self.pruned_total = 0;
    }
}

/// Harvest the events produced at `step`.
pub fn collect(log: &EventLog, step: Step) -> Vec<Event> {
    log.collect(step)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn ev(step: Step, n: usize) -> Event {
        Event::new("tick", format!("event {} at {}", n, step)).at(step)
    }

    fn bounded(threshold: usize, lookback: u64) -> EventLog {
        EventLog::new(LogBounds { prune_threshold: threshold, lookback_steps: lookback })
    }

    #[test]
    fn test_collect_filters_by_step_tag() {
        let mut log = bounded(100, 5);
        log.append(ev(1, 0));
        log.append(ev(2, 0));
        log.append(ev(1, 1));
        let got = collect(&log, 1);
        assert_eq!(got.len(), 2);
        assert!(got.iter().all(|e| e.step == Some(1)));
        assert_eq!(got[1].description, "event 1 at 1");
        assert!(collect(&log, 3).is_empty());
    }

    #[test]
    fn test_collect_is_repeatable() {
        let mut log = bounded(100, 5);
        log.append(ev(4, 0));
        assert_eq!(log.collect(4), log.collect(4));
    }

    #[test]
    fn test_untagged_rejected_and_counted() {
        let mut log = bounded(100, 5);
        let err = log.try_append(Event::new("x", "no step")).unwrap_err();
        assert!(err.to_string().contains("no step tag"));
        assert!(!log.append(Event::new("x", "no step")));
        assert_eq!(log.dropped_untagged(), 1);
        assert!(log.is_empty());
    }

    #[test]
    fn test_prune_noop_below_threshold() {
        let mut log = bounded(10, 1);
        for s in 0..5 {
            log.append(ev(s, 0));
        }
        assert_eq!(log.prune(100), 0);
        assert_eq!(log.len(), 5);
    }

    #[test]
    fn test_prune_drops_outside_lookback() {
        let mut log = bounded(5, 2);
        for s in 0..10 {
            log.append(ev(s, 0));
        }
        let removed = log.prune(9);
        // keeps steps 7, 8, 9
        assert_eq!(removed, 7);
        assert_eq!(log.len(), 3);
        assert!(log.iter().all(|e| e.step.unwrap() >= 7));
        assert_eq!(log.pruned_total(), 7);
    }

    #[test]
    fn test_prune_enforces_ceiling_inside_lookback() {
        let mut log = bounded(10, 100);
        for s in 0..5 {
            for n in 0..4 {
                log.append(ev(s, n));
            }
        }
        log.prune(4);
        assert_eq!(log.len(), 10);
        // current step survives whole
        assert_eq!(log.collect(4).len(), 4);
    }

    #[test]
    fn test_prune_keeps_oversized_current_step() {
        let mut log = bounded(3, 1);
        log.append(ev(0, 0));
        for n in 0..6 {
            log.append(ev(1, n));
        }
        log.prune(1);
        assert_eq!(log.len(), 6);
        assert_eq!(log.collect(1).len(), 6);
    }

    #[test]
    fn test_clear() {
        let mut log = bounded(1, 0);
        log.append(ev(0, 0));
        log.append(ev(0, 1));
        log.append(Event::new("bad", "untagged"));
        log.clear();
        assert!(log.is_empty());
        assert_eq!(log.dropped_untagged(), 0);
    }
}
