//! Shared fixtures for the integration suites

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};

use quayside::allocation::AllocationService;
use quayside::clock::ManualClock;
use quayside::config::{SchedulerConfig, ScoringWeights, TideConfig, UkcConfig};
use quayside::domain::{
    Berth, BerthId, BerthType, CargoType, Port, PortId, PriorityClass, Resource, ResourceId,
    ResourceKind, Terminal, TerminalId, TidalReading, TideType, Vessel, VesselId, VesselType,
};
use quayside::events::EventBus;
use quayside::store::Store;

/// 2025-03-01 at the given time
pub fn t(h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, h, m, 0).unwrap()
}

pub struct Harness {
    pub clock: Arc<ManualClock>,
    pub store: Arc<Store>,
    pub bus: Arc<EventBus>,
    pub service: AllocationService,
    pub port: Port,
    pub terminal: Terminal,
}

/// In-memory engine parts with one port and terminal, default tuning,
/// and enough pilots and tugs that resources never get in the way
pub fn harness() -> Harness {
    let clock = Arc::new(ManualClock::new(t(0, 0)));
    let store = Arc::new(Store::in_memory(clock.clone()));
    let bus = Arc::new(EventBus::new(clock.clone(), 1024));
    let service = AllocationService::new(
        store.clone(),
        bus.clone(),
        clock.clone(),
        SchedulerConfig::default(),
        UkcConfig::default(),
        TideConfig::default(),
        ScoringWeights::default(),
    );
    let port = store
        .create_port(Port {
            id: PortId(0),
            code: "NLRTM".into(),
            name: "Rotterdam".into(),
            lat: 51.95,
            lon: 4.14,
        })
        .unwrap();
    let terminal = store
        .create_terminal(Terminal {
            id: TerminalId(0),
            port_id: port.id,
            code: "T1".into(),
            name: "Delta Terminal".into(),
        })
        .unwrap();
    for i in 0..2 {
        store
            .create_resource(Resource {
                id: ResourceId(0),
                kind: ResourceKind::Pilot,
                name: format!("Pilot {}", i + 1),
                capacity: 1,
                class: None,
                bollard_pull: None,
                certifications: vec![],
                is_available: true,
            })
            .unwrap();
    }
    for i in 0..4 {
        store
            .create_resource(Resource {
                id: ResourceId(0),
                kind: ResourceKind::Tug,
                name: format!("Tug {}", i + 1),
                capacity: 1,
                class: None,
                bollard_pull: Some(60.0),
                certifications: vec![],
                is_available: true,
            })
            .unwrap();
    }
    Harness {
        clock,
        store,
        bus,
        service,
        port,
        terminal,
    }
}

/// Container berth with sensible defaults
pub fn berth(h: &Harness, code: &str, length: f64, max_draft: f64) -> Berth {
    h.store
        .create_berth(Berth {
            id: BerthId(0),
            terminal_id: h.terminal.id,
            name: format!("Berth {}", code),
            code: code.into(),
            length,
            max_draft,
            max_loa: length,
            max_beam: Some(60.0),
            max_air_draft: None,
            max_gt: None,
            charted_depth: None,
            berth_type: BerthType::Container,
            cargo_types_allowed: vec![CargoType::Container, CargoType::GeneralCargo],
            number_of_cranes: 3,
            crane_max_outreach: Some(55.0),
            fender_capacity: None,
            bollard_swl: Some(100.0),
            reefer_plugs: Some(100),
            dg_certified: false,
            active: true,
        })
        .unwrap()
}

/// Container vessel with sensible defaults
pub fn vessel(h: &Harness, name: &str, loa: f64, draft: f64) -> Vessel {
    vessel_with_priority(h, name, loa, draft, PriorityClass::Fcfs)
}

pub fn vessel_with_priority(
    h: &Harness,
    name: &str,
    loa: f64,
    draft: f64,
    priority: PriorityClass,
) -> Vessel {
    h.store
        .create_vessel(Vessel {
            id: VesselId(0),
            name: name.into(),
            imo: None,
            mmsi: None,
            vessel_type: VesselType::Container,
            loa,
            beam: 40.0,
            draft,
            air_draft: None,
            gross_tonnage: Some(60_000),
            cargo_type: CargoType::Container,
            cargo_volume: Some(4_000.0),
            priority_class: priority,
            hazmat_class: None,
            reefer_demand: None,
        })
        .unwrap()
}

/// High/low tide samples for the harness port
pub fn tides(h: &Harness, samples: &[(u32, f64)]) {
    for (hour, height) in samples {
        h.store
            .add_tidal_reading(TidalReading {
                port_id: h.port.id,
                tide_time: t(*hour, 0),
                tide_type: if *height > 1.0 {
                    TideType::High
                } else {
                    TideType::Low
                },
                height_meters: *height,
            })
            .unwrap();
    }
}
