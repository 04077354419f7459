//! Berth records and maintenance windows

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{BerthId, CargoType, MaintenanceId, TerminalId};
use crate::error::{EngineError, EngineResult};

/// Physical berth category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BerthType {
    Container,
    Bulk,
    Liquid,
    RoRo,
    General,
    Multipurpose,
}

/// A physical slot along the quay
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Berth {
    /// Unique berth identifier
    pub id: BerthId,
    /// Owning terminal
    pub terminal_id: TerminalId,
    /// Berth name
    pub name: String,
    /// Unique berth code, e.g. `K1`
    pub code: String,
    /// Quay length, meters
    pub length: f64,
    /// Maximum permissible draft, meters
    pub max_draft: f64,
    /// Maximum length overall (often equals `length`), meters
    pub max_loa: f64,
    /// Maximum beam, meters
    pub max_beam: Option<f64>,
    /// Maximum air draft (bridge/crane clearance), meters
    pub max_air_draft: Option<f64>,
    /// Maximum gross tonnage
    pub max_gt: Option<u64>,
    /// Charted seabed depth at the berth pocket, meters; `max_draft` when unset
    pub charted_depth: Option<f64>,
    /// Berth category
    pub berth_type: BerthType,
    /// Cargo categories this berth may work
    pub cargo_types_allowed: Vec<CargoType>,
    /// Quay cranes installed
    pub number_of_cranes: u32,
    /// Crane outreach, meters
    pub crane_max_outreach: Option<f64>,
    /// Fender energy capacity, kNm
    pub fender_capacity: Option<f64>,
    /// Bollard safe working load, tonnes
    pub bollard_swl: Option<f64>,
    /// Reefer plugs available
    pub reefer_plugs: Option<u32>,
    /// Certified for dangerous goods
    pub dg_certified: bool,
    /// Inactive berths never enter allocation candidate sets
    pub active: bool,
}

impl Berth {
    /// Validate structural invariants: positive physical caps, non-empty code
    pub fn validate(&self) -> EngineResult<()> {
        if self.code.trim().is_empty() {
            return Err(EngineError::Validation("berth code is empty".into()));
        }
        for (name, value) in [
            ("length", self.length),
            ("max_draft", self.max_draft),
            ("max_loa", self.max_loa),
        ] {
            if value <= 0.0 {
                return Err(EngineError::Validation(format!(
                    "berth {} must be positive, got {}",
                    name, value
                )));
            }
        }
        if let Some(beam) = self.max_beam {
            if beam <= 0.0 {
                return Err(EngineError::Validation(
                    "berth max_beam must be positive".into(),
                ));
            }
        }
        Ok(())
    }

    /// Charted depth, falling back to the draft cap when not surveyed
    pub fn charted_depth(&self) -> f64 {
        self.charted_depth.unwrap_or(self.max_draft)
    }

    /// Whether this berth may work the given cargo
    pub fn accepts_cargo(&self, cargo: CargoType) -> bool {
        self.cargo_types_allowed.contains(&cargo)
    }
}

/// Maintenance window status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaintenanceStatus {
    Scheduled,
    InProgress,
    Completed,
    Cancelled,
}

/// A planned outage blocking the berth; opaque to the slot finder
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceWindow {
    pub id: MaintenanceId,
    pub berth_id: BerthId,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub status: MaintenanceStatus,
}

impl MaintenanceWindow {
    /// Completed or cancelled windows no longer block the berth
    pub fn blocks(&self) -> bool {
        matches!(
            self.status,
            MaintenanceStatus::Scheduled | MaintenanceStatus::InProgress
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn berth() -> Berth {
        Berth {
            id: BerthId(1),
            terminal_id: TerminalId(1),
            name: "North Quay 1".into(),
            code: "NQ1".into(),
            length: 350.0,
            max_draft: 13.0,
            max_loa: 350.0,
            max_beam: Some(48.0),
            max_air_draft: None,
            max_gt: None,
            charted_depth: None,
            berth_type: BerthType::Container,
            cargo_types_allowed: vec![CargoType::Container, CargoType::GeneralCargo],
            number_of_cranes: 4,
            crane_max_outreach: Some(55.0),
            fender_capacity: None,
            bollard_swl: Some(100.0),
            reefer_plugs: Some(200),
            dg_certified: false,
            active: true,
        }
    }

    #[test]
    fn charted_depth_falls_back_to_max_draft() {
        let mut b = berth();
        assert_eq!(b.charted_depth(), 13.0);
        b.charted_depth = Some(16.0);
        assert_eq!(b.charted_depth(), 16.0);
    }

    #[test]
    fn rejects_non_positive_caps() {
        let mut b = berth();
        b.max_draft = -1.0;
        assert!(b.validate().is_err());
    }

    #[test]
    fn cargo_acceptance() {
        let b = berth();
        assert!(b.accepts_cargo(CargoType::Container));
        assert!(!b.accepts_cargo(CargoType::LiquidBulk));
    }
}
