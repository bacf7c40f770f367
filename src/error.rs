// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Epoch Engine - Error Types

use crate::phase::{PhaseKind, PhaseOrder};
use crate::types::Step;

// ---------------------------------------------------------------------------
// Phase errors
// ---------------------------------------------------------------------------

/// Failure raised by a phase's `execute`.
#[derive(Debug, thiserror::Error)]
pub enum PhaseError {
    #[error("{0}")]
    Failed(String),

    #[error("invalid state at `{field}`: {reason}")]
    InvalidState { field: String, reason: String },

    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl PhaseError {
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }

    pub fn invalid_state(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidState { field: field.into(), reason: reason.into() }
    }
}

// ---------------------------------------------------------------------------
// Engine errors
// ---------------------------------------------------------------------------

/// Registration, execution and configuration errors surfaced by the engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("phase `{id}` is already registered")]
    DuplicatePhaseId { id: String },

    #[error("phase `{id}` has a non-finite order key {order}")]
    InvalidOrder { id: String, order: f64 },

    #[error("phase `{id}` shares order {order} with `{other}` and ties are rejected")]
    OrderCollision { id: String, other: String, order: PhaseOrder },

    #[error("phase `{id}` depends on unregistered phase `{dependency}`")]
    UnknownDependency { id: String, dependency: String },

    #[error("phase `{id}` (order {order}) must run after `{dependency}` (order {dependency_order})")]
    DependencyOrder {
        id: String,
        dependency: String,
        order: PhaseOrder,
        dependency_order: PhaseOrder,
    },

    #[error("phase `{id}` is a second {role:?} phase (already `{existing}`)")]
    DuplicateRole { role: PhaseKind, id: String, existing: String },

    #[error("time-advance phase `{id}` (order {order}) must be strictly last, but `{other}` has order {other_order}")]
    AdvanceNotLast {
        id: String,
        order: PhaseOrder,
        other: String,
        other_order: PhaseOrder,
    },

    #[error("cannot register `{id}`: registration closes before the first step")]
    RegistrationClosed { id: String },

    #[error("phase `{phase_id}` failed at step {step}: {source}")]
    PhaseExecution {
        phase_id: String,
        step: Step,
        #[source]
        source: PhaseError,
    },

    #[error("monitored field `{field}` is non-finite ({value}) after step {step}")]
    NonFiniteField { step: Step, field: String, value: f64 },

    #[error("invalid engine configuration: {0}")]
    Config(String),
}

impl EngineError {
    /// Id of the failing phase, for execution errors.
    pub fn phase_id(&self) -> Option<&str> {
        match self {
            Self::PhaseExecution { phase_id, .. } => Some(phase_id),
            _ => None,
        }
    }

    /// Step at which a run-time error occurred.
    pub fn step(&self) -> Option<Step> {
        match self {
            Self::PhaseExecution { step, .. } | Self::NonFiniteField { step, .. } => Some(*step),
            _ => None,
        }
    }

    /// Registration and configuration errors are fatal to a batch setup.
    pub fn is_setup_error(&self) -> bool {
        !matches!(self, Self::PhaseExecution { .. } | Self::NonFiniteField { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_execution_display_carries_id_and_step() {
        let err = EngineError::PhaseExecution {
            phase_id: "climate".into(),
            step: 42,
            source: PhaseError::failed("ice sheet model diverged"),
        };
        let msg = err.to_string();
        assert!(msg.contains("climate"));
        assert!(msg.contains("42"));
        assert!(msg.contains("ice sheet model diverged"));
        assert_eq!(err.phase_id(), Some("climate"));
        assert_eq!(err.step(), Some(42));
        assert!(!err.is_setup_error());
    }

    #[test]
    fn test_source_chain_preserved() {
        use std::error::Error;
        let err = EngineError::PhaseExecution {
            phase_id: "p".into(),
            step: 1,
            source: PhaseError::invalid_state("population", "negative"),
        };
        let source = err.source().expect("source should be attached");
        assert!(source.to_string().contains("population"));
    }

    #[test]
    fn test_boxed_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk");
        let boxed: Box<dyn std::error::Error + Send + Sync> = Box::new(io);
        let err: PhaseError = boxed.into();
        assert_eq!(err.to_string(), "disk");
    }

    #[test]
    fn test_duplicate_is_setup_error() {
        let err = EngineError::DuplicatePhaseId { id: "x".into() };
        assert!(err.is_setup_error());
        assert!(err.phase_id().is_none());
    }
}
