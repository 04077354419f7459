//! Request and response shapes for the HTTP surface
//!
//! Times are RFC-3339 UTC on the wire; identifiers are bare integers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{
    BerthId, BerthType, CargoType, PortId, PriorityClass, ScheduleId, TerminalId, VesselId,
    VesselType,
};

/// Body for `POST /vessels`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateVesselRequest {
    pub name: String,
    pub imo: Option<u32>,
    pub mmsi: Option<u64>,
    #[serde(rename = "type")]
    pub vessel_type: VesselType,
    pub loa: f64,
    pub beam: f64,
    pub draft: f64,
    pub air_draft: Option<f64>,
    pub gross_tonnage: Option<u64>,
    pub cargo_type: CargoType,
    pub cargo_volume: Option<f64>,
    #[serde(default)]
    pub priority_class: PriorityClass,
    pub hazmat_class: Option<String>,
    pub reefer_demand: Option<u32>,
}

/// Body for `POST /berths`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBerthRequest {
    pub terminal_id: TerminalId,
    pub name: String,
    pub code: String,
    pub length: f64,
    pub max_draft: f64,
    pub max_loa: Option<f64>,
    pub max_beam: Option<f64>,
    pub max_air_draft: Option<f64>,
    pub max_gt: Option<u64>,
    pub charted_depth: Option<f64>,
    pub berth_type: BerthType,
    pub cargo_types_allowed: Vec<CargoType>,
    pub number_of_cranes: u32,
    pub crane_max_outreach: Option<f64>,
    pub reefer_plugs: Option<u32>,
    #[serde(default)]
    pub dg_certified: bool,
}

/// Body for `POST /terminals`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTerminalRequest {
    pub port_id: PortId,
    pub code: String,
    pub name: String,
}

/// Body for `POST /ports`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePortRequest {
    pub code: String,
    pub name: String,
    pub lat: f64,
    pub lon: f64,
}

/// Body for `POST /schedules/allocate`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocateScheduleRequest {
    pub vessel_id: VesselId,
    pub berth_id: BerthId,
    pub eta: DateTime<Utc>,
    pub etd: DateTime<Utc>,
    /// Explicit Government/Emergency override of a Window claim
    #[serde(default)]
    pub priority_override: bool,
    pub notes: Option<String>,
}

/// Response for a committed allocation
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocatedResponse {
    pub schedule_id: ScheduleId,
}

/// Body for `PUT /schedules/{id}/eta`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EtaUpdateRequest {
    pub eta: DateTime<Utc>,
    pub predicted_eta: Option<DateTime<Utc>>,
}

/// Body for the arrival/berthing/departure transitions
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActualTimeRequest {
    pub time: DateTime<Utc>,
}

/// Query for `GET /suggestions/berth/{vesselId}`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestQuery {
    pub preferred_eta: Option<DateTime<Utc>>,
    pub top_n: Option<usize>,
}

/// Query filtering by terminal
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminalQuery {
    pub terminal_id: Option<TerminalId>,
}

/// Body for `POST /conflicts/{id}/resolve`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveConflictRequest {
    /// Omitted: respond with the enumerated options instead of applying
    pub option: Option<crate::conflicts::ResolutionKind>,
}

/// One row of `GET /predictions/eta/active`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EtaPrediction {
    pub schedule_id: ScheduleId,
    pub vessel_id: VesselId,
    pub berth_id: BerthId,
    pub eta: DateTime<Utc>,
    pub predicted_eta: DateTime<Utc>,
    pub deviation_minutes: i64,
}

/// Response for `GET /dashboard/metrics`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardMetrics {
    pub active_schedules: usize,
    pub berths_total: usize,
    pub berths_occupied: usize,
    pub utilization_pct: f64,
    pub avg_waiting_minutes: f64,
    pub active_conflicts: usize,
    pub active_alerts: usize,
}

/// One row of `GET /dashboard/berth-status`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BerthStatusRow {
    pub berth_id: BerthId,
    pub code: String,
    pub name: String,
    pub status: BerthOccupancy,
    pub current_schedule: Option<ScheduleId>,
    pub next_eta: Option<DateTime<Utc>>,
}

/// Occupancy state of a berth right now
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BerthOccupancy {
    Free,
    Occupied,
    Maintenance,
    Inactive,
}

/// Inbound WebSocket frame
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientFrame {
    pub action: ClientAction,
    pub room: String,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ClientAction {
    Subscribe,
    Unsubscribe,
}
