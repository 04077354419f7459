//! Operational resources: pilots, tugs, cranes, gangs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{windows_overlap, ResourceId, ScheduleId};

/// Resource category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Pilot,
    Tug,
    Crane,
    Gang,
}

/// A pooled operational resource
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    pub id: ResourceId,
    pub kind: ResourceKind,
    pub name: String,
    /// Concurrent allocations this resource supports
    pub capacity: u32,
    /// Class designation (e.g. tug class, pilot grade)
    pub class: Option<String>,
    /// Tug bollard pull, tonnes
    pub bollard_pull: Option<f64>,
    /// Held certifications (DG handling, LNG, deep-sea pilotage)
    pub certifications: Vec<String>,
    /// Out-of-service resources never count toward availability
    pub is_available: bool,
}

/// Allocation lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AllocationStatus {
    Allocated,
    InUse,
    Released,
}

/// A resource committed to a schedule over a window
///
/// Same temporal-exclusivity invariant as berth occupancy, per resource and
/// bounded by its capacity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceAllocation {
    pub schedule_id: ScheduleId,
    pub resource_id: ResourceId,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub quantity: u32,
    pub status: AllocationStatus,
}

impl ResourceAllocation {
    /// Released allocations no longer consume capacity
    pub fn is_active(&self) -> bool {
        !matches!(self.status, AllocationStatus::Released)
    }

    /// Half-open overlap against `[from, to)`
    pub fn overlaps(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> bool {
        windows_overlap(self.from, self.to, from, to)
    }
}
