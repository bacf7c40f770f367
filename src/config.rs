// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Epoch Engine - Configuration

use serde::{Deserialize, Serialize};

use crate::aggregator::AggregatorConfig;
use crate::error::EngineError;
use crate::events::LogBounds;

// ─── Tie Policy ──────────────────────────────────────────────────────────────

/// How the scheduler treats two phases with the same order key.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TiePolicy {
    /// Ties run in registration order.
    Stable,
    /// Ties are a registration error.
    Reject,
}

impl Default for TiePolicy {
    fn default() -> Self { TiePolicy::Stable }
}

// ─── Event Retention ─────────────────────────────────────────────────────────

/// What a finished run hands back to the batch driver.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventRetention {
    /// Every harvested event.
    Full,
    /// Aggregator summaries and counts only.
    Summary,
}

impl Default for EventRetention {
    fn default() -> Self { EventRetention::Summary }
}

// ─── EngineConfig ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    pub log: LogBounds,
    pub aggregator: AggregatorConfig,
    pub tie_policy: TiePolicy,
    /// Fail the step when a monitored field holds NaN or infinity.
    pub check_finite: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            log: LogBounds::default(),
            aggregator: AggregatorConfig::default(),
            tie_policy: TiePolicy::Stable,
            check_finite: true,
        }
    }
}

impl EngineConfig {
    /// Parse a JSON config; missing keys fall back to defaults.
    pub fn from_json_str(json: &str) -> Result<Self, EngineError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| EngineError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.log.prune_threshold == 0 {
            return Err(EngineError::Config("log.prune_threshold must be > 0".into()));
        }
        if self.aggregator.report_interval == 0 {
            return Err(EngineError::Config("aggregator.report_interval must be > 0".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let c = EngineConfig::default();
        assert_eq!(c.log.prune_threshold, 5000);
        assert_eq!(c.log.lookback_steps, 12);
        assert_eq!(c.aggregator.report_interval, 12);
        assert!(!c.aggregator.reset_totals_on_report);
        assert_eq!(c.tie_policy, TiePolicy::Stable);
        assert!(c.check_finite);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let c = EngineConfig::from_json_str(
            r#"{ "log": { "prune_threshold": 200 }, "tie_policy": "reject" }"#,
        )
        .unwrap();
        assert_eq!(c.log.prune_threshold, 200);
        assert_eq!(c.log.lookback_steps, 12);
        assert_eq!(c.tie_policy, TiePolicy::Reject);
        assert!(c.check_finite);
    }

    #[test]
    fn test_zero_threshold_rejected() {
        let err = EngineConfig::from_json_str(r#"{ "log": { "prune_threshold": 0 } }"#)
            .unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }

    #[test]
    fn test_zero_interval_rejected() {
        let err = EngineConfig::from_json_str(r#"{ "aggregator": { "report_interval": 0 } }"#)
            .unwrap_err();
        assert!(err.to_string().contains("report_interval"));
    }

    #[test]
    fn test_malformed_json() {
        assert!(EngineConfig::from_json_str("{ not json").is_err());
    }
}
