//! Detected schedule conflicts

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ConflictId, ScheduleId};

/// Conflict category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    BerthOverlap,
    TidalConstraint,
    ResourceUnavailable,
    Overstay,
    EtaDeviation,
    ConstraintViolation,
    CascadeConflict,
}

/// Conflict severity, ordered most severe first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictSeverity {
    Critical,
    High,
    Medium,
    Low,
}

/// A persisted conflict row; produced only by the detector
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conflict {
    pub id: ConflictId,
    pub kind: ConflictKind,
    /// Primary affected schedule
    pub schedule_id1: ScheduleId,
    /// Counterparty schedule for pairwise conflicts
    pub schedule_id2: Option<ScheduleId>,
    pub severity: ConflictSeverity,
    pub detected_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub description: String,
    /// Applied resolution, recorded structurally
    pub resolution: Option<serde_json::Value>,
}

impl Conflict {
    /// Unresolved conflicts are active
    pub fn is_active(&self) -> bool {
        self.resolved_at.is_none()
    }
}
