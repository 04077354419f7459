//! Domain model
//!
//! Entity records keyed by integer surrogate ids. Times are UTC instants;
//! dimensions are meters; scores are 0-100 with two fractional digits at the
//! presentation boundary. All mutation goes through the store.

mod alert;
mod berth;
mod conflict;
mod port;
mod position;
mod resource;
mod schedule;
mod tide;
mod vessel;

pub use alert::{Alert, AlertSeverity};
pub use berth::{Berth, BerthType, MaintenanceStatus, MaintenanceWindow};
pub use conflict::{Conflict, ConflictKind, ConflictSeverity};
pub use port::{Port, Terminal, VesselHistory};
pub use position::PositionReport;
pub use resource::{AllocationStatus, Resource, ResourceAllocation, ResourceKind};
pub use schedule::{Schedule, ScheduleStatus};
pub use tide::{nearest_reading, TidalReading, TideType};
pub use vessel::{CargoType, PriorityClass, Vessel, VesselType};

use serde::{Deserialize, Serialize};

macro_rules! surrogate_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(raw: u64) -> Self {
                Self(raw)
            }
        }
    };
}

surrogate_id!(
    /// Unique identifier for a vessel
    VesselId
);
surrogate_id!(
    /// Unique identifier for a berth
    BerthId
);
surrogate_id!(
    /// Unique identifier for a schedule (a ship call)
    ScheduleId
);
surrogate_id!(
    /// Unique identifier for a terminal
    TerminalId
);
surrogate_id!(
    /// Unique identifier for a port
    PortId
);
surrogate_id!(
    /// Unique identifier for an operational resource
    ResourceId
);
surrogate_id!(
    /// Unique identifier for a detected conflict
    ConflictId
);
surrogate_id!(
    /// Unique identifier for an alert
    AlertId
);
surrogate_id!(
    /// Unique identifier for a vessel-history row
    HistoryId
);
surrogate_id!(
    /// Unique identifier for a maintenance window
    MaintenanceId
);

/// Half-open interval overlap: `[a0, a1)` intersects `[b0, b1)`
///
/// Schedules touching exactly at endpoints do not overlap.
pub fn windows_overlap(
    a0: chrono::DateTime<chrono::Utc>,
    a1: chrono::DateTime<chrono::Utc>,
    b0: chrono::DateTime<chrono::Utc>,
    b1: chrono::DateTime<chrono::Utc>,
) -> bool {
    a0 < b1 && b0 < a1
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn touching_endpoints_do_not_overlap() {
        let t = |h| Utc.with_ymd_and_hms(2025, 3, 1, h, 0, 0).unwrap();
        assert!(!windows_overlap(t(10), t(14), t(14), t(18)));
        assert!(windows_overlap(t(10), t(14), t(13), t(17)));
        assert!(windows_overlap(t(10), t(14), t(9), t(11)));
    }
}
