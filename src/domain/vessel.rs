//! Vessel records and commercial priority classes

use serde::{Deserialize, Serialize};

use super::VesselId;
use crate::error::{EngineError, EngineResult};

/// Broad vessel category, drives type matching and turnaround buffers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VesselType {
    Container,
    Bulk,
    Tanker,
    RoRo,
    General,
    Lng,
}

/// Cargo category carried by a vessel and permitted at a berth
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CargoType {
    Container,
    DryBulk,
    LiquidBulk,
    Vehicles,
    GeneralCargo,
    Lng,
}

/// Commercial priority class with its fixed weight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriorityClass {
    Government,
    Emergency,
    Window,
    Perishable,
    Transshipment,
    Strategic,
    Fcfs,
    Low,
}

impl PriorityClass {
    /// Numeric weight used for ordering and preemption decisions
    pub fn weight(self) -> u32 {
        match self {
            Self::Government => 100,
            Self::Emergency => 95,
            Self::Window => 90,
            Self::Perishable => 80,
            Self::Transshipment => 75,
            Self::Strategic => 70,
            Self::Fcfs => 50,
            Self::Low => 30,
        }
    }

    /// Classes allowed to displace a Window claim when the request carries
    /// an explicit override flag
    pub fn may_override_window(self) -> bool {
        matches!(self, Self::Government | Self::Emergency)
    }
}

impl Default for PriorityClass {
    fn default() -> Self {
        Self::Fcfs
    }
}

/// A ship call candidate
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vessel {
    /// Unique vessel identifier
    pub id: VesselId,
    /// Vessel name
    pub name: String,
    /// IMO number, globally unique when present
    pub imo: Option<u32>,
    /// Maritime Mobile Service Identity (radio identifier)
    pub mmsi: Option<u64>,
    /// Vessel category
    pub vessel_type: VesselType,
    /// Length overall, meters
    pub loa: f64,
    /// Beam (width), meters
    pub beam: f64,
    /// Draft below waterline, meters
    pub draft: f64,
    /// Highest point above water, meters
    pub air_draft: Option<f64>,
    /// Gross tonnage
    pub gross_tonnage: Option<u64>,
    /// Cargo carried
    pub cargo_type: CargoType,
    /// Cargo volume in type-specific units (TEU for container, MT for bulk)
    pub cargo_volume: Option<f64>,
    /// Commercial priority
    pub priority_class: PriorityClass,
    /// IMDG hazmat class when carrying dangerous goods
    pub hazmat_class: Option<String>,
    /// Reefer plug demand
    pub reefer_demand: Option<u32>,
}

impl Vessel {
    /// Validate structural invariants: positive dimensions, non-empty name
    pub fn validate(&self) -> EngineResult<()> {
        if self.name.trim().is_empty() {
            return Err(EngineError::Validation("vessel name is empty".into()));
        }
        if self.loa <= 0.0 {
            return Err(EngineError::Validation(format!(
                "vessel loa must be positive, got {}",
                self.loa
            )));
        }
        if self.beam <= 0.0 {
            return Err(EngineError::Validation(format!(
                "vessel beam must be positive, got {}",
                self.beam
            )));
        }
        if self.draft <= 0.0 {
            return Err(EngineError::Validation(format!(
                "vessel draft must be positive, got {}",
                self.draft
            )));
        }
        Ok(())
    }

    /// Priority weight, shorthand for `priority_class.weight()`
    pub fn priority_weight(&self) -> u32 {
        self.priority_class.weight()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vessel() -> Vessel {
        Vessel {
            id: VesselId(1),
            name: "Ever Given".into(),
            imo: Some(9811000),
            mmsi: Some(353136000),
            vessel_type: VesselType::Container,
            loa: 399.9,
            beam: 58.8,
            draft: 14.5,
            air_draft: Some(65.0),
            gross_tonnage: Some(220_940),
            cargo_type: CargoType::Container,
            cargo_volume: Some(20_124.0),
            priority_class: PriorityClass::Window,
            hazmat_class: None,
            reefer_demand: None,
        }
    }

    #[test]
    fn weights_follow_the_contract_table() {
        assert_eq!(PriorityClass::Government.weight(), 100);
        assert_eq!(PriorityClass::Window.weight(), 90);
        assert_eq!(PriorityClass::Fcfs.weight(), 50);
        assert_eq!(PriorityClass::Low.weight(), 30);
    }

    #[test]
    fn rejects_non_positive_dimensions() {
        let mut v = vessel();
        v.draft = 0.0;
        assert!(matches!(v.validate(), Err(EngineError::Validation(_))));
        assert!(vessel().validate().is_ok());
    }

    #[test]
    fn only_government_and_emergency_override_window() {
        assert!(PriorityClass::Government.may_override_window());
        assert!(PriorityClass::Emergency.may_override_window());
        assert!(!PriorityClass::Perishable.may_override_window());
    }
}
