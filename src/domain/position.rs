//! AIS position reports

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::VesselId;

/// One normalized AIS sample; append-only
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionReport {
    /// Resolved vessel, when the MMSI is known to the registry
    pub vessel_id: Option<VesselId>,
    pub mmsi: u64,
    pub lat: f64,
    pub lon: f64,
    /// Speed over ground, knots
    pub sog: f64,
    /// Course over ground, degrees
    pub cog: f64,
    /// True heading, degrees; 511 means unavailable on the wire
    pub heading: Option<f64>,
    pub nav_status: Option<String>,
    /// Timestamp claimed by the transponder
    pub recorded_at: DateTime<Utc>,
    /// Timestamp we accepted the sample
    pub ingested_at: DateTime<Utc>,
}
