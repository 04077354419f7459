//! REST route handlers
//!
//! Thin adapters: decode, call the engine, encode. Domain errors map to
//! status codes in `super::error_response`.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use crate::allocation::{AllocateRequest, AllocationOutcome};
use crate::domain::{
    AlertId, Berth, BerthId, ConflictId, MaintenanceStatus, Port, ScheduleId, ScheduleStatus,
    Terminal, TerminalId, Vessel, VesselId,
};
use crate::engine::Engine;
use crate::error::EngineError;

use super::error_response;
use super::models::{
    ActualTimeRequest, AllocateScheduleRequest, AllocatedResponse, BerthOccupancy, BerthStatusRow,
    CreateBerthRequest, CreatePortRequest, CreateTerminalRequest, CreateVesselRequest,
    DashboardMetrics, EtaPrediction, EtaUpdateRequest, ResolveConflictRequest, SuggestQuery,
    TerminalQuery,
};

type AppState = State<Arc<Engine>>;

fn ok<T: serde::Serialize>(value: T) -> Response {
    (StatusCode::OK, Json(value)).into_response()
}

fn created<T: serde::Serialize>(value: T) -> Response {
    (StatusCode::CREATED, Json(value)).into_response()
}

/// Health probe
pub async fn health(State(engine): AppState) -> Response {
    ok(serde_json::json!({
        "status": "healthy",
        "service": "quayside",
        "version": env!("CARGO_PKG_VERSION"),
        "feed": engine.ingestor.state(),
        "subscribers": engine.bus.subscriber_count(),
    }))
}

// ---- registry ----------------------------------------------------------

pub async fn list_vessels(State(engine): AppState) -> Response {
    ok(engine.store.list_vessels())
}

pub async fn get_vessel(State(engine): AppState, Path(id): Path<u64>) -> Response {
    match engine.store.get_vessel(VesselId(id)) {
        Ok(vessel) => ok(vessel),
        Err(e) => error_response(e),
    }
}

pub async fn create_vessel(
    State(engine): AppState,
    Json(request): Json<CreateVesselRequest>,
) -> Response {
    let vessel = Vessel {
        id: VesselId(0),
        name: request.name,
        imo: request.imo,
        mmsi: request.mmsi,
        vessel_type: request.vessel_type,
        loa: request.loa,
        beam: request.beam,
        draft: request.draft,
        air_draft: request.air_draft,
        gross_tonnage: request.gross_tonnage,
        cargo_type: request.cargo_type,
        cargo_volume: request.cargo_volume,
        priority_class: request.priority_class,
        hazmat_class: request.hazmat_class,
        reefer_demand: request.reefer_demand,
    };
    match engine.store.create_vessel(vessel) {
        Ok(vessel) => created(vessel),
        Err(e) => error_response(e),
    }
}

pub async fn list_berths(State(engine): AppState, Query(query): Query<TerminalQuery>) -> Response {
    ok(engine.store.list_berths(query.terminal_id))
}

pub async fn get_berth(State(engine): AppState, Path(id): Path<u64>) -> Response {
    match engine.store.get_berth(BerthId(id)) {
        Ok(berth) => ok(berth),
        Err(e) => error_response(e),
    }
}

pub async fn create_berth(
    State(engine): AppState,
    Json(request): Json<CreateBerthRequest>,
) -> Response {
    let berth = Berth {
        id: BerthId(0),
        terminal_id: request.terminal_id,
        name: request.name,
        code: request.code,
        length: request.length,
        max_draft: request.max_draft,
        max_loa: request.max_loa.unwrap_or(request.length),
        max_beam: request.max_beam,
        max_air_draft: request.max_air_draft,
        max_gt: request.max_gt,
        charted_depth: request.charted_depth,
        berth_type: request.berth_type,
        cargo_types_allowed: request.cargo_types_allowed,
        number_of_cranes: request.number_of_cranes,
        crane_max_outreach: request.crane_max_outreach,
        fender_capacity: None,
        bollard_swl: None,
        reefer_plugs: request.reefer_plugs,
        dg_certified: request.dg_certified,
        active: true,
    };
    match engine.store.create_berth(berth) {
        Ok(berth) => created(berth),
        Err(e) => error_response(e),
    }
}

pub async fn list_terminals(State(engine): AppState) -> Response {
    ok(engine.store.list_terminals())
}

pub async fn create_terminal(
    State(engine): AppState,
    Json(request): Json<CreateTerminalRequest>,
) -> Response {
    let terminal = Terminal {
        id: TerminalId(0),
        port_id: request.port_id,
        code: request.code,
        name: request.name,
    };
    match engine.store.create_terminal(terminal) {
        Ok(terminal) => created(terminal),
        Err(e) => error_response(e),
    }
}

pub async fn list_ports(State(engine): AppState) -> Response {
    ok(engine.store.list_ports())
}

pub async fn create_port(
    State(engine): AppState,
    Json(request): Json<CreatePortRequest>,
) -> Response {
    let port = Port {
        id: crate::domain::PortId(0),
        code: request.code,
        name: request.name,
        lat: request.lat,
        lon: request.lon,
    };
    match engine.store.create_port(port) {
        Ok(port) => created(port),
        Err(e) => error_response(e),
    }
}

// ---- schedules ---------------------------------------------------------

pub async fn active_schedules(
    State(engine): AppState,
    Query(query): Query<TerminalQuery>,
) -> Response {
    ok(engine.store.get_active_schedules(query.terminal_id))
}

pub async fn allocate_schedule(
    State(engine): AppState,
    Json(request): Json<AllocateScheduleRequest>,
) -> Response {
    let outcome = engine
        .allocation
        .allocate(AllocateRequest {
            vessel_id: request.vessel_id,
            berth_id: request.berth_id,
            eta: request.eta,
            etd: request.etd,
            priority_override: request.priority_override,
            notes: request.notes,
        })
        .await;
    match outcome {
        Ok(AllocationOutcome::Committed(schedule)) => created(AllocatedResponse {
            schedule_id: schedule.id,
        }),
        Ok(AllocationOutcome::WindowOptions(options)) => (
            StatusCode::CONFLICT,
            Json(serde_json::json!({
                "code": "WINDOW_STANDOFF",
                "message": "berth is claimed across a window contract",
                "options": options,
            })),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn update_eta(
    State(engine): AppState,
    Path(id): Path<u64>,
    Json(request): Json<EtaUpdateRequest>,
) -> Response {
    match engine
        .allocation
        .update_eta(ScheduleId(id), request.eta, request.predicted_eta)
    {
        Ok(schedule) => ok(schedule),
        Err(e) => error_response(e),
    }
}

pub async fn record_arrival(
    State(engine): AppState,
    Path(id): Path<u64>,
    Json(request): Json<ActualTimeRequest>,
) -> Response {
    match engine.allocation.record_arrival(ScheduleId(id), request.time) {
        Ok(schedule) => ok(schedule),
        Err(e) => error_response(e),
    }
}

pub async fn record_berthing(
    State(engine): AppState,
    Path(id): Path<u64>,
    Json(request): Json<ActualTimeRequest>,
) -> Response {
    match engine.allocation.record_berthing(ScheduleId(id), request.time) {
        Ok(schedule) => ok(schedule),
        Err(e) => error_response(e),
    }
}

pub async fn record_departure(
    State(engine): AppState,
    Path(id): Path<u64>,
    Json(request): Json<ActualTimeRequest>,
) -> Response {
    match engine
        .allocation
        .record_departure(ScheduleId(id), request.time)
    {
        Ok(schedule) => ok(schedule),
        Err(e) => error_response(e),
    }
}

pub async fn cancel_schedule(State(engine): AppState, Path(id): Path<u64>) -> Response {
    match engine.allocation.cancel(ScheduleId(id)) {
        Ok(schedule) => ok(schedule),
        Err(e) => error_response(e),
    }
}

/// Administrative truncation, guarded by configuration
pub async fn clear_all(State(engine): AppState) -> Response {
    if !engine.config.server.allow_clear_all {
        return error_response(EngineError::Forbidden(
            "clear-all is disabled by configuration".into(),
        ));
    }
    match engine.store.clear_all() {
        Ok(()) => ok(serde_json::json!({ "cleared": true })),
        Err(e) => error_response(e),
    }
}

// ---- suggestions and predictions ---------------------------------------

pub async fn suggest_berths(
    State(engine): AppState,
    Path(vessel_id): Path<u64>,
    Query(query): Query<SuggestQuery>,
) -> Response {
    match engine
        .allocation
        .suggest(
            VesselId(vessel_id),
            query.preferred_eta,
            query.top_n.unwrap_or(5),
        )
        .await
    {
        Ok(suggestions) => ok(suggestions),
        Err(e) => error_response(e),
    }
}

pub async fn active_eta_predictions(State(engine): AppState) -> Response {
    let rows: Vec<EtaPrediction> = engine
        .store
        .get_active_schedules(None)
        .into_iter()
        .map(|s| EtaPrediction {
            schedule_id: s.id,
            vessel_id: s.vessel_id,
            berth_id: s.berth_id,
            eta: s.eta,
            predicted_eta: s.predicted_eta,
            deviation_minutes: (s.predicted_eta - s.eta).num_minutes(),
        })
        .collect();
    ok(rows)
}

// ---- dashboard ---------------------------------------------------------

pub async fn dashboard_metrics(
    State(engine): AppState,
    Query(query): Query<TerminalQuery>,
) -> Response {
    let schedules = engine.store.get_active_schedules(query.terminal_id);
    let berths = engine.store.list_berths(query.terminal_id);
    let now = engine.clock.now();

    let occupied = berths
        .iter()
        .filter(|b| {
            schedules
                .iter()
                .any(|s| s.berth_id == b.id && s.eta <= now && now < s.etd)
        })
        .count();
    let active_berths = berths.iter().filter(|b| b.active).count();
    let waits: Vec<i64> = schedules.iter().filter_map(|s| s.waiting_minutes).collect();
    let avg_waiting = if waits.is_empty() {
        0.0
    } else {
        waits.iter().sum::<i64>() as f64 / waits.len() as f64
    };

    ok(DashboardMetrics {
        active_schedules: schedules.len(),
        berths_total: berths.len(),
        berths_occupied: occupied,
        utilization_pct: if active_berths == 0 {
            0.0
        } else {
            crate::scoring::round2(occupied as f64 * 100.0 / active_berths as f64)
        },
        avg_waiting_minutes: crate::scoring::round2(avg_waiting),
        active_conflicts: engine.store.get_active_conflicts().len(),
        active_alerts: engine.store.get_active_alerts().len(),
    })
}

pub async fn dashboard_berth_status(
    State(engine): AppState,
    Query(query): Query<TerminalQuery>,
) -> Response {
    let now = engine.clock.now();
    let rows: Vec<BerthStatusRow> = engine
        .store
        .list_berths(query.terminal_id)
        .into_iter()
        .map(|berth| {
            let schedules = engine.store.schedules_for_berth(berth.id);
            let current = schedules
                .iter()
                .find(|s| s.eta <= now && now < s.etd && s.status == ScheduleStatus::Berthed);
            let in_maintenance = engine
                .store
                .maintenance_for(berth.id)
                .iter()
                .any(|w| w.status == MaintenanceStatus::InProgress && w.start <= now && now < w.end);
            let status = if !berth.active {
                BerthOccupancy::Inactive
            } else if in_maintenance {
                BerthOccupancy::Maintenance
            } else if current.is_some() {
                BerthOccupancy::Occupied
            } else {
                BerthOccupancy::Free
            };
            let next_eta = schedules
                .iter()
                .filter(|s| s.eta > now)
                .map(|s| s.eta)
                .min();
            BerthStatusRow {
                berth_id: berth.id,
                code: berth.code,
                name: berth.name,
                status,
                current_schedule: current.map(|s| s.id),
                next_eta,
            }
        })
        .collect();
    ok(rows)
}

pub async fn dashboard_alerts(State(engine): AppState) -> Response {
    ok(engine.store.get_active_alerts())
}

pub async fn mark_alert_read(State(engine): AppState, Path(id): Path<u64>) -> Response {
    match engine.store.mark_alert_read(AlertId(id)) {
        Ok(alert) => ok(alert),
        Err(e) => error_response(e),
    }
}

// ---- conflicts ---------------------------------------------------------

pub async fn list_conflicts(State(engine): AppState) -> Response {
    ok(engine.store.get_active_conflicts())
}

pub async fn resolve_conflict(
    State(engine): AppState,
    Path(id): Path<u64>,
    Json(request): Json<ResolveConflictRequest>,
) -> Response {
    let conflict_id = ConflictId(id);
    match request.option {
        None => match engine.detector.resolution_options(conflict_id) {
            Ok(options) => ok(serde_json::json!({ "options": options })),
            Err(e) => error_response(e),
        },
        Some(kind) => match engine.detector.apply_resolution(conflict_id, kind) {
            Ok(conflict) => ok(conflict),
            Err(e) => error_response(e),
        },
    }
}
