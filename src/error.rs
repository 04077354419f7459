//! Error types for the berth planning engine
//!
//! Every failure surfaced at the engine boundary is a variant of
//! [`EngineError`] with a stable machine code and a short operator-facing
//! message. Errors are values, never control flow.

use thiserror::Error;

use crate::domain::ScheduleId;

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Boundary errors of the engine
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// Referenced entity does not exist
    #[error("{0} not found")]
    NotFound(String),

    /// Input failed structural validation
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A hard constraint disqualified the request
    #[error("Hard constraint violated: {rule}: {message}")]
    ConstraintViolationHard {
        /// Stable rule code, e.g. `V-DIM-001`
        rule: String,
        /// Operator-facing description
        message: String,
    },

    /// A soft constraint was breached; never fatal, carried in suggestions
    #[error("Soft constraint breached: {rule}: {message}")]
    ConstraintViolationSoft { rule: String, message: String },

    /// Requested window overlaps existing non-terminal schedules
    #[error("Berth window conflicts with {} existing schedule(s)", conflicts.len())]
    TimeConflict {
        /// Schedules occupying the requested window
        conflicts: Vec<ScheduleId>,
    },

    /// No active berth satisfies the vessel's hard physical constraints
    #[error("No compatible berth for vessel")]
    NoCompatibleBerth,

    /// No free window inside the search horizon
    #[error("No slot found within {horizon_days} day horizon")]
    NoSlotFound { horizon_days: u32 },

    /// Operation exceeded its deadline; no partial state was persisted
    #[error("Operation timed out")]
    Timeout,

    /// Retryable store failure
    #[error("Transient store failure: {0}")]
    TransientStore(String),

    /// External position feed is unreachable
    #[error("Upstream feed unavailable: {0}")]
    UpstreamUnavailable(String),

    /// Status advanced out of order
    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    /// Administrative operation rejected by configuration
    #[error("Operation forbidden: {0}")]
    Forbidden(String),
}

impl EngineError {
    /// Stable machine code carried on the wire and in logs
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::Validation(_) => "VALIDATION",
            Self::ConstraintViolationHard { .. } => "CONSTRAINT_HARD",
            Self::ConstraintViolationSoft { .. } => "CONSTRAINT_SOFT",
            Self::TimeConflict { .. } => "TIME_CONFLICT",
            Self::NoCompatibleBerth => "NO_COMPATIBLE_BERTH",
            Self::NoSlotFound { .. } => "NO_SLOT_FOUND",
            Self::Timeout => "TIMEOUT",
            Self::TransientStore(_) => "TRANSIENT_STORE",
            Self::UpstreamUnavailable(_) => "UPSTREAM_UNAVAILABLE",
            Self::InvalidTransition { .. } => "INVALID_TRANSITION",
            Self::Forbidden(_) => "FORBIDDEN",
        }
    }

    /// Whether the caller may retry the operation unchanged
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientStore(_) | Self::Timeout)
    }

    /// Convenience constructor for missing entities
    pub fn not_found(entity: &str, id: impl std::fmt::Display) -> Self {
        Self::NotFound(format!("{} {}", entity, id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(EngineError::NoCompatibleBerth.code(), "NO_COMPATIBLE_BERTH");
        assert_eq!(
            EngineError::TimeConflict { conflicts: vec![] }.code(),
            "TIME_CONFLICT"
        );
        assert_eq!(EngineError::Timeout.code(), "TIMEOUT");
    }

    #[test]
    fn only_store_and_timeout_are_retryable() {
        assert!(EngineError::TransientStore("io".into()).is_retryable());
        assert!(!EngineError::NoCompatibleBerth.is_retryable());
    }
}
