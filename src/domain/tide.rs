//! Tidal readings and nearest-sample queries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::PortId;

/// Tide extremum type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TideType {
    High,
    Low,
}

/// One point in the tidal time series for a port
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TidalReading {
    pub port_id: PortId,
    pub tide_time: DateTime<Utc>,
    pub tide_type: TideType,
    pub height_meters: f64,
}

/// Reading closest in time to `at`; ties resolve to the earlier sample
pub fn nearest_reading(readings: &[TidalReading], at: DateTime<Utc>) -> Option<&TidalReading> {
    readings.iter().min_by_key(|r| {
        let delta = (r.tide_time - at).num_seconds().abs();
        (delta, r.tide_time)
    })
}
