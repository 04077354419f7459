//! Ports, terminals, and completed-call history

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{BerthId, HistoryId, PortId, ScheduleId, TerminalId, VesselId};
use crate::error::{EngineError, EngineResult};

/// A port; anchor for tidal series, rooms, and ETA distance math
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Port {
    pub id: PortId,
    /// Unique port code, e.g. `NLRTM`
    pub code: String,
    pub name: String,
    pub lat: f64,
    pub lon: f64,
}

impl Port {
    pub fn validate(&self) -> EngineResult<()> {
        if self.code.trim().is_empty() {
            return Err(EngineError::Validation("port code is empty".into()));
        }
        if !(-90.0..=90.0).contains(&self.lat) || !(-180.0..=180.0).contains(&self.lon) {
            return Err(EngineError::Validation(format!(
                "port position out of range: {}, {}",
                self.lat, self.lon
            )));
        }
        Ok(())
    }
}

/// A terminal grouping berths within a port
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Terminal {
    pub id: TerminalId,
    pub port_id: PortId,
    pub code: String,
    pub name: String,
}

/// One completed call; appended exactly once by departure recording
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VesselHistory {
    pub id: HistoryId,
    pub vessel_id: VesselId,
    pub schedule_id: ScheduleId,
    pub berth_id: BerthId,
    pub ata: Option<DateTime<Utc>>,
    pub atb: DateTime<Utc>,
    pub atd: DateTime<Utc>,
    pub waiting_minutes: i64,
    /// `atd - atb`, never negative
    pub actual_dwell_minutes: i64,
    /// 0-100, how close the declared ETA was to the actual arrival
    pub eta_accuracy_pct: Option<f64>,
}
