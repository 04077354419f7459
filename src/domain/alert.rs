//! Operator alerts
//!
//! Alerts are the user-visible channel for non-fatal operational conditions.
//! They are append-only; `read` is a terminal transition.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{AlertId, BerthId, ScheduleId, VesselId};

/// Alert severity, ordered least severe first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Info,
    Warning,
    High,
    Critical,
}

/// An operator-facing notification
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub id: AlertId,
    /// Alert family, e.g. `eta_update`, `overstay`, `approaching_departure`
    pub alert_type: String,
    pub severity: AlertSeverity,
    pub message: String,
    pub schedule_id: Option<ScheduleId>,
    pub vessel_id: Option<VesselId>,
    pub berth_id: Option<BerthId>,
    pub created_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
    /// Client-side auto-dismiss hint
    pub auto_dismiss_ms: Option<u64>,
}

impl Alert {
    /// Unread alerts are active
    pub fn is_active(&self) -> bool {
        self.read_at.is_none()
    }

    /// Mark read; idempotent, the first timestamp sticks
    pub fn mark_read(&mut self, at: DateTime<Utc>) {
        if self.read_at.is_none() {
            self.read_at = Some(at);
        }
    }
}
