//! Transactional entity store
//!
//! Owns every entity of the domain. In-memory indexes answer the temporal
//! queries: per-berth schedules ordered by eta, walked over a range bounded
//! by the queried window and the longest dwell on record, so overlap checks
//! resolve in O(log N + K) rather than scanning the berth. Sled is the cold
//! write-through layer, reloaded at startup (the knhk state-store
//! arrangement). A single writer lock makes every read-then-write operation
//! serializable, which subsumes the per-berth linearizability the occupancy
//! invariant needs.
//!
//! The store never emits events; callers publish after a successful commit.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use crate::clock::SharedClock;
use crate::domain::{
    Alert, AlertId, AlertSeverity, Berth, BerthId, Conflict, ConflictId, ConflictKind,
    ConflictSeverity, HistoryId, MaintenanceId, MaintenanceWindow, Port, PortId, PositionReport,
    Resource, ResourceAllocation, ResourceId, ResourceKind, Schedule, ScheduleId, ScheduleStatus,
    Terminal, TerminalId, TidalReading, Vessel, VesselHistory, VesselId,
};
use crate::error::{EngineError, EngineResult};

/// Rolling retention for position reports
const POSITION_RETENTION_DAYS: i64 = 90;

/// Scale for ETA accuracy: an 8-hour miss scores zero
const ETA_ACCURACY_SCALE_MINUTES: f64 = 480.0;

/// Verdict of a berth-availability probe
#[derive(Debug, Clone)]
pub struct BerthAvailability {
    pub available: bool,
    /// Non-terminal schedules overlapping the probe window
    pub conflicting_schedules: Vec<ScheduleId>,
    /// Blocking maintenance windows overlapping the probe window
    pub blocking_maintenance: Vec<MaintenanceId>,
}

/// Parameters for creating a schedule
#[derive(Debug, Clone)]
pub struct ScheduleDraft {
    pub vessel_id: VesselId,
    pub berth_id: BerthId,
    pub eta: DateTime<Utc>,
    pub etd: DateTime<Utc>,
    pub optimization_score: Option<f64>,
    pub priority_weight: u32,
    pub notes: Option<String>,
}

/// Outcome of an ETA update
#[derive(Debug, Clone)]
pub struct EtaUpdateOutcome {
    pub schedule: Schedule,
    /// Raised when the deviation exceeds 30 minutes
    pub alert: Option<Alert>,
    /// Inserted when the shifted window now overlaps a neighbour
    pub conflict: Option<Conflict>,
}

/// Aggregated history for the scoring engine
#[derive(Debug, Clone, Copy, Default)]
pub struct HistorySummary {
    pub visits: u32,
    pub avg_eta_accuracy_pct: f64,
}

#[derive(Default)]
struct State {
    ports: HashMap<PortId, Port>,
    terminals: HashMap<TerminalId, Terminal>,
    vessels: HashMap<VesselId, Vessel>,
    berths: HashMap<BerthId, Berth>,
    schedules: HashMap<ScheduleId, Schedule>,
    /// Non-terminal schedules per berth, ordered by eta
    berth_index: HashMap<BerthId, BTreeMap<(DateTime<Utc>, ScheduleId), ScheduleId>>,
    maintenance: HashMap<BerthId, Vec<MaintenanceWindow>>,
    tides: HashMap<PortId, Vec<TidalReading>>,
    resources: HashMap<ResourceId, Resource>,
    resource_allocations: Vec<ResourceAllocation>,
    positions: HashMap<u64, Vec<PositionReport>>,
    history: Vec<VesselHistory>,
    conflicts: HashMap<ConflictId, Conflict>,
    alerts: HashMap<AlertId, Alert>,
    imo_index: HashMap<u32, VesselId>,
    mmsi_index: HashMap<u64, VesselId>,
    berth_code_index: HashMap<String, BerthId>,
    port_code_index: HashMap<String, PortId>,
    /// Longest planned dwell ever indexed, minutes; bounds how far back an
    /// overlap walk must start
    max_dwell_minutes: i64,
    next_id: u64,
}

impl State {
    fn fresh_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn note_dwell(&mut self, minutes: i64) {
        if minutes > self.max_dwell_minutes {
            self.max_dwell_minutes = minutes;
        }
    }

    /// Non-terminal schedules on `berth` overlapping `[from, to)`
    ///
    /// Walks the eta-ordered index over the only span that can overlap: a
    /// key at or past `to` starts too late, and one earlier than `from`
    /// minus the longest dwell on record ends too early. Resolves in
    /// O(log N + K) for K candidates instead of scanning the whole berth.
    fn overlapping_on_berth(
        &self,
        berth: BerthId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Vec<ScheduleId> {
        let Some(idx) = self.berth_index.get(&berth) else {
            return Vec::new();
        };
        let lower = (from - Duration::minutes(self.max_dwell_minutes), ScheduleId(0));
        let upper = (to, ScheduleId(0));
        idx.range(lower..upper)
            .filter_map(|(_, id)| self.schedules.get(id))
            .filter(|s| s.overlaps(from, to))
            .map(|s| s.id)
            .collect()
    }
}

/// The process-wide entity store
pub struct Store {
    db: Option<sled::Db>,
    clock: SharedClock,
    state: RwLock<State>,
}

impl Store {
    /// In-memory store without cold storage
    pub fn in_memory(clock: SharedClock) -> Self {
        Self {
            db: None,
            clock,
            state: RwLock::new(State::default()),
        }
    }

    /// Open (or create) a sled-backed store and reload persisted entities
    pub fn open<P: AsRef<Path>>(path: P, clock: SharedClock) -> EngineResult<Self> {
        let db = sled::open(path)
            .map_err(|e| EngineError::TransientStore(format!("open database: {}", e)))?;
        let store = Self {
            db: Some(db),
            clock,
            state: RwLock::new(State::default()),
        };
        store.reload()?;
        Ok(store)
    }

    fn persist<T: Serialize>(&self, key: String, value: &T) -> EngineResult<()> {
        if let Some(db) = &self.db {
            let bytes = serde_json::to_vec(value)
                .map_err(|e| EngineError::TransientStore(format!("serialize {}: {}", key, e)))?;
            db.insert(key.as_bytes(), bytes)
                .map_err(|e| EngineError::TransientStore(format!("write {}: {}", key, e)))?;
        }
        Ok(())
    }

    fn unpersist(&self, key: String) -> EngineResult<()> {
        if let Some(db) = &self.db {
            db.remove(key.as_bytes())
                .map_err(|e| EngineError::TransientStore(format!("delete {}: {}", key, e)))?;
        }
        Ok(())
    }

    fn scan_prefix<T: DeserializeOwned>(&self, prefix: &str) -> EngineResult<Vec<T>> {
        let mut out = Vec::new();
        if let Some(db) = &self.db {
            for entry in db.scan_prefix(prefix.as_bytes()) {
                let (_, value) = entry
                    .map_err(|e| EngineError::TransientStore(format!("scan {}: {}", prefix, e)))?;
                let item: T = serde_json::from_slice(value.as_ref()).map_err(|e| {
                    EngineError::TransientStore(format!("deserialize {}: {}", prefix, e))
                })?;
                out.push(item);
            }
        }
        Ok(out)
    }

    fn reload(&self) -> EngineResult<()> {
        let ports: Vec<Port> = self.scan_prefix("port:")?;
        let terminals: Vec<Terminal> = self.scan_prefix("terminal:")?;
        let vessels: Vec<Vessel> = self.scan_prefix("vessel:")?;
        let berths: Vec<Berth> = self.scan_prefix("berth:")?;
        let schedules: Vec<Schedule> = self.scan_prefix("schedule:")?;
        let maintenance: Vec<MaintenanceWindow> = self.scan_prefix("maintenance:")?;
        let tides: Vec<TidalReading> = self.scan_prefix("tide:")?;
        let resources: Vec<Resource> = self.scan_prefix("resource:")?;
        let conflicts: Vec<Conflict> = self.scan_prefix("conflict:")?;
        let alerts: Vec<Alert> = self.scan_prefix("alert:")?;
        let history: Vec<VesselHistory> = self.scan_prefix("history:")?;

        let mut state = self.state.write();
        let mut max_id = 0u64;
        for p in ports {
            max_id = max_id.max(p.id.0);
            state.port_code_index.insert(p.code.clone(), p.id);
            state.ports.insert(p.id, p);
        }
        for t in terminals {
            max_id = max_id.max(t.id.0);
            state.terminals.insert(t.id, t);
        }
        for v in vessels {
            max_id = max_id.max(v.id.0);
            if let Some(imo) = v.imo {
                state.imo_index.insert(imo, v.id);
            }
            if let Some(mmsi) = v.mmsi {
                state.mmsi_index.insert(mmsi, v.id);
            }
            state.vessels.insert(v.id, v);
        }
        for b in berths {
            max_id = max_id.max(b.id.0);
            state.berth_code_index.insert(b.code.clone(), b.id);
            state.berths.insert(b.id, b);
        }
        for s in schedules {
            max_id = max_id.max(s.id.0);
            if s.occupies_berth() {
                state.note_dwell((s.etd - s.eta).num_minutes());
                state
                    .berth_index
                    .entry(s.berth_id)
                    .or_default()
                    .insert((s.eta, s.id), s.id);
            }
            state.schedules.insert(s.id, s);
        }
        for m in maintenance {
            max_id = max_id.max(m.id.0);
            state.maintenance.entry(m.berth_id).or_default().push(m);
        }
        for t in tides {
            state.tides.entry(t.port_id).or_default().push(t);
        }
        for series in state.tides.values_mut() {
            series.sort_by_key(|r| r.tide_time);
        }
        for r in resources {
            max_id = max_id.max(r.id.0);
            state.resources.insert(r.id, r);
        }
        for c in conflicts {
            max_id = max_id.max(c.id.0);
            state.conflicts.insert(c.id, c);
        }
        for a in alerts {
            max_id = max_id.max(a.id.0);
            state.alerts.insert(a.id, a);
        }
        for h in history {
            max_id = max_id.max(h.id.0);
            state.history.push(h);
        }
        state.next_id = max_id;
        debug!(entities = state.next_id, "store reloaded");
        Ok(())
    }

    // ---- registry -------------------------------------------------------

    /// Register a port
    pub fn create_port(&self, mut port: Port) -> EngineResult<Port> {
        port.validate()?;
        let mut state = self.state.write();
        if state.port_code_index.contains_key(&port.code) {
            return Err(EngineError::Validation(format!(
                "port code {} already registered",
                port.code
            )));
        }
        port.id = PortId(state.fresh_id());
        state.port_code_index.insert(port.code.clone(), port.id);
        state.ports.insert(port.id, port.clone());
        drop(state);
        self.persist(format!("port:{}", port.id), &port)?;
        Ok(port)
    }

    /// Register a terminal
    pub fn create_terminal(&self, mut terminal: Terminal) -> EngineResult<Terminal> {
        let mut state = self.state.write();
        if !state.ports.contains_key(&terminal.port_id) {
            return Err(EngineError::not_found("port", terminal.port_id));
        }
        terminal.id = TerminalId(state.fresh_id());
        state.terminals.insert(terminal.id, terminal.clone());
        drop(state);
        self.persist(format!("terminal:{}", terminal.id), &terminal)?;
        Ok(terminal)
    }

    /// Register a vessel; IMO numbers are nullable-unique
    pub fn create_vessel(&self, mut vessel: Vessel) -> EngineResult<Vessel> {
        vessel.validate()?;
        let mut state = self.state.write();
        if let Some(imo) = vessel.imo {
            if state.imo_index.contains_key(&imo) {
                return Err(EngineError::Validation(format!(
                    "imo {} already registered",
                    imo
                )));
            }
        }
        vessel.id = VesselId(state.fresh_id());
        if let Some(imo) = vessel.imo {
            state.imo_index.insert(imo, vessel.id);
        }
        if let Some(mmsi) = vessel.mmsi {
            state.mmsi_index.insert(mmsi, vessel.id);
        }
        state.vessels.insert(vessel.id, vessel.clone());
        drop(state);
        self.persist(format!("vessel:{}", vessel.id), &vessel)?;
        Ok(vessel)
    }

    /// Register a berth; codes are unique
    pub fn create_berth(&self, mut berth: Berth) -> EngineResult<Berth> {
        berth.validate()?;
        let mut state = self.state.write();
        if !state.terminals.contains_key(&berth.terminal_id) {
            return Err(EngineError::not_found("terminal", berth.terminal_id));
        }
        if state.berth_code_index.contains_key(&berth.code) {
            return Err(EngineError::Validation(format!(
                "berth code {} already registered",
                berth.code
            )));
        }
        berth.id = BerthId(state.fresh_id());
        state.berth_code_index.insert(berth.code.clone(), berth.id);
        state.berths.insert(berth.id, berth.clone());
        drop(state);
        self.persist(format!("berth:{}", berth.id), &berth)?;
        Ok(berth)
    }

    /// Record a maintenance window
    pub fn add_maintenance_window(
        &self,
        mut window: MaintenanceWindow,
    ) -> EngineResult<MaintenanceWindow> {
        if window.start >= window.end {
            return Err(EngineError::Validation(
                "maintenance window is empty or inverted".into(),
            ));
        }
        let mut state = self.state.write();
        if !state.berths.contains_key(&window.berth_id) {
            return Err(EngineError::not_found("berth", window.berth_id));
        }
        window.id = MaintenanceId(state.fresh_id());
        state
            .maintenance
            .entry(window.berth_id)
            .or_default()
            .push(window.clone());
        drop(state);
        self.persist(format!("maintenance:{}", window.id), &window)?;
        Ok(window)
    }

    /// Append a tidal reading, keeping the series ordered
    pub fn add_tidal_reading(&self, reading: TidalReading) -> EngineResult<()> {
        let mut state = self.state.write();
        if !state.ports.contains_key(&reading.port_id) {
            return Err(EngineError::not_found("port", reading.port_id));
        }
        let key = format!(
            "tide:{}:{}",
            reading.port_id,
            reading.tide_time.timestamp()
        );
        let series = state.tides.entry(reading.port_id).or_default();
        series.push(reading.clone());
        series.sort_by_key(|r| r.tide_time);
        drop(state);
        self.persist(key, &reading)?;
        Ok(())
    }

    /// Register an operational resource
    pub fn create_resource(&self, mut resource: Resource) -> EngineResult<Resource> {
        let mut state = self.state.write();
        resource.id = ResourceId(state.fresh_id());
        state.resources.insert(resource.id, resource.clone());
        drop(state);
        self.persist(format!("resource:{}", resource.id), &resource)?;
        Ok(resource)
    }

    // ---- lookups --------------------------------------------------------

    pub fn get_vessel(&self, id: VesselId) -> EngineResult<Vessel> {
        self.state
            .read()
            .vessels
            .get(&id)
            .cloned()
            .ok_or_else(|| EngineError::not_found("vessel", id))
    }

    pub fn get_berth(&self, id: BerthId) -> EngineResult<Berth> {
        self.state
            .read()
            .berths
            .get(&id)
            .cloned()
            .ok_or_else(|| EngineError::not_found("berth", id))
    }

    pub fn get_schedule(&self, id: ScheduleId) -> EngineResult<Schedule> {
        self.state
            .read()
            .schedules
            .get(&id)
            .cloned()
            .ok_or_else(|| EngineError::not_found("schedule", id))
    }

    pub fn get_terminal(&self, id: TerminalId) -> EngineResult<Terminal> {
        self.state
            .read()
            .terminals
            .get(&id)
            .cloned()
            .ok_or_else(|| EngineError::not_found("terminal", id))
    }

    pub fn get_port(&self, id: PortId) -> EngineResult<Port> {
        self.state
            .read()
            .ports
            .get(&id)
            .cloned()
            .ok_or_else(|| EngineError::not_found("port", id))
    }

    pub fn vessel_by_mmsi(&self, mmsi: u64) -> Option<Vessel> {
        let state = self.state.read();
        let id = state.mmsi_index.get(&mmsi)?;
        state.vessels.get(id).cloned()
    }

    pub fn list_vessels(&self) -> Vec<Vessel> {
        let mut v: Vec<_> = self.state.read().vessels.values().cloned().collect();
        v.sort_by_key(|x| x.id);
        v
    }

    pub fn list_berths(&self, terminal: Option<TerminalId>) -> Vec<Berth> {
        let mut v: Vec<_> = self
            .state
            .read()
            .berths
            .values()
            .filter(|b| terminal.map(|t| b.terminal_id == t).unwrap_or(true))
            .cloned()
            .collect();
        v.sort_by_key(|x| x.id);
        v
    }

    pub fn list_terminals(&self) -> Vec<Terminal> {
        let mut v: Vec<_> = self.state.read().terminals.values().cloned().collect();
        v.sort_by_key(|x| x.id);
        v
    }

    pub fn list_ports(&self) -> Vec<Port> {
        let mut v: Vec<_> = self.state.read().ports.values().cloned().collect();
        v.sort_by_key(|x| x.id);
        v
    }

    pub fn port_by_code(&self, code: &str) -> Option<Port> {
        let state = self.state.read();
        let id = state.port_code_index.get(code)?;
        state.ports.get(id).cloned()
    }

    /// Active berths that physically fit the vessel
    pub fn get_compatible_berths(&self, loa: f64, draft: f64) -> Vec<Berth> {
        let mut v: Vec<_> = self
            .state
            .read()
            .berths
            .values()
            .filter(|b| b.active && b.length >= loa && b.max_draft >= draft)
            .cloned()
            .collect();
        v.sort_by_key(|x| x.id);
        v
    }

    /// Tidal series for a port, ordered by time
    pub fn tidal_readings(&self, port: PortId) -> Vec<TidalReading> {
        self.state
            .read()
            .tides
            .get(&port)
            .cloned()
            .unwrap_or_default()
    }

    /// Blocking maintenance windows for a berth
    pub fn maintenance_for(&self, berth: BerthId) -> Vec<MaintenanceWindow> {
        self.state
            .read()
            .maintenance
            .get(&berth)
            .map(|ws| ws.iter().filter(|w| w.blocks()).cloned().collect())
            .unwrap_or_default()
    }

    /// Non-terminal schedules on a berth, ordered by eta
    pub fn schedules_for_berth(&self, berth: BerthId) -> Vec<Schedule> {
        let state = self.state.read();
        state
            .berth_index
            .get(&berth)
            .map(|idx| {
                idx.values()
                    .filter_map(|id| state.schedules.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Probe a berth window for schedule and maintenance blockers
    pub fn check_berth_availability(
        &self,
        berth: BerthId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> EngineResult<BerthAvailability> {
        let state = self.state.read();
        if !state.berths.contains_key(&berth) {
            return Err(EngineError::not_found("berth", berth));
        }
        let conflicting_schedules = state.overlapping_on_berth(berth, from, to);
        let blocking_maintenance: Vec<MaintenanceId> = state
            .maintenance
            .get(&berth)
            .map(|ws| {
                ws.iter()
                    .filter(|w| w.blocks() && crate::domain::windows_overlap(w.start, w.end, from, to))
                    .map(|w| w.id)
                    .collect()
            })
            .unwrap_or_default();
        Ok(BerthAvailability {
            available: conflicting_schedules.is_empty() && blocking_maintenance.is_empty(),
            conflicting_schedules,
            blocking_maintenance,
        })
    }

    /// Available resources of a kind over a window, respecting capacity
    pub fn available_resources(
        &self,
        kind: ResourceKind,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Vec<Resource> {
        let state = self.state.read();
        state
            .resources
            .values()
            .filter(|r| r.kind == kind && r.is_available)
            .filter(|r| {
                let committed: u32 = state
                    .resource_allocations
                    .iter()
                    .filter(|a| a.resource_id == r.id && a.is_active() && a.overlaps(from, to))
                    .map(|a| a.quantity)
                    .sum();
                committed < r.capacity
            })
            .cloned()
            .collect()
    }

    /// Commit a resource to a schedule window
    pub fn allocate_resource(&self, allocation: ResourceAllocation) -> EngineResult<()> {
        let mut state = self.state.write();
        if !state.resources.contains_key(&allocation.resource_id) {
            return Err(EngineError::not_found("resource", allocation.resource_id));
        }
        if !state.schedules.contains_key(&allocation.schedule_id) {
            return Err(EngineError::not_found("schedule", allocation.schedule_id));
        }
        state.resource_allocations.push(allocation);
        Ok(())
    }

    // ---- schedule write path -------------------------------------------

    /// Create a schedule, enforcing berth-occupancy exclusivity
    ///
    /// Fails with `TimeConflict` when any non-terminal schedule on the berth
    /// overlaps `[eta, etd)`. The check and the insert happen under one
    /// writer lock, so concurrent allocations serialize.
    pub fn allocate(&self, draft: ScheduleDraft) -> EngineResult<Schedule> {
        if draft.eta >= draft.etd {
            return Err(EngineError::Validation(format!(
                "schedule window is empty or inverted: eta {} >= etd {}",
                draft.eta, draft.etd
            )));
        }
        let now = self.clock.now();
        let mut state = self.state.write();
        if !state.vessels.contains_key(&draft.vessel_id) {
            return Err(EngineError::not_found("vessel", draft.vessel_id));
        }
        let berth = state
            .berths
            .get(&draft.berth_id)
            .ok_or_else(|| EngineError::not_found("berth", draft.berth_id))?;
        if !berth.active {
            return Err(EngineError::Validation(format!(
                "berth {} is inactive",
                berth.code
            )));
        }
        let conflicts = state.overlapping_on_berth(draft.berth_id, draft.eta, draft.etd);
        if !conflicts.is_empty() {
            return Err(EngineError::TimeConflict { conflicts });
        }
        state.note_dwell((draft.etd - draft.eta).num_minutes());
        let schedule = Schedule {
            id: ScheduleId(state.fresh_id()),
            vessel_id: draft.vessel_id,
            berth_id: draft.berth_id,
            eta: draft.eta,
            predicted_eta: draft.eta,
            etd: draft.etd,
            ata: None,
            atb: None,
            atd: None,
            status: ScheduleStatus::Scheduled,
            dwell_minutes: (draft.etd - draft.eta).num_minutes(),
            waiting_minutes: None,
            optimization_score: draft.optimization_score,
            priority_weight: draft.priority_weight,
            notes: draft.notes,
            created_at: now,
        };
        state
            .berth_index
            .entry(schedule.berth_id)
            .or_default()
            .insert((schedule.eta, schedule.id), schedule.id);
        state.schedules.insert(schedule.id, schedule.clone());
        drop(state);
        self.persist(format!("schedule:{}", schedule.id), &schedule)?;
        Ok(schedule)
    }

    fn with_schedule<F>(&self, id: ScheduleId, f: F) -> EngineResult<Schedule>
    where
        F: FnOnce(&mut Schedule) -> EngineResult<()>,
    {
        let mut state = self.state.write();
        let schedule = state
            .schedules
            .get_mut(&id)
            .ok_or_else(|| EngineError::not_found("schedule", id))?;
        f(schedule)?;
        let updated = schedule.clone();
        if !updated.occupies_berth() {
            if let Some(idx) = state.berth_index.get_mut(&updated.berth_id) {
                idx.remove(&(updated.eta, updated.id));
            }
        }
        drop(state);
        self.persist(format!("schedule:{}", id), &updated)?;
        Ok(updated)
    }

    /// Record actual arrival
    pub fn record_arrival(&self, id: ScheduleId, ata: DateTime<Utc>) -> EngineResult<Schedule> {
        self.with_schedule(id, |s| s.record_arrival(ata))
    }

    /// Record actual berthing
    ///
    /// A vessel is alongside at most one berth at any instant; a second
    /// berthing while another call is still `Berthed` is rejected.
    pub fn record_berthing(&self, id: ScheduleId, atb: DateTime<Utc>) -> EngineResult<Schedule> {
        let mut state = self.state.write();
        let vessel_id = state
            .schedules
            .get(&id)
            .ok_or_else(|| EngineError::not_found("schedule", id))?
            .vessel_id;
        let elsewhere = state.schedules.values().any(|s| {
            s.vessel_id == vessel_id && s.id != id && s.status == ScheduleStatus::Berthed
        });
        if elsewhere {
            return Err(EngineError::Validation(format!(
                "vessel {} is already berthed elsewhere",
                vessel_id
            )));
        }
        let schedule = state
            .schedules
            .get_mut(&id)
            .ok_or_else(|| EngineError::not_found("schedule", id))?;
        schedule.record_berthing(atb)?;
        let updated = schedule.clone();
        drop(state);
        self.persist(format!("schedule:{}", id), &updated)?;
        Ok(updated)
    }

    /// Record actual departure and append exactly one history row
    pub fn record_departure(&self, id: ScheduleId, atd: DateTime<Utc>) -> EngineResult<Schedule> {
        let mut state = self.state.write();
        let schedule = state
            .schedules
            .get_mut(&id)
            .ok_or_else(|| EngineError::not_found("schedule", id))?;
        let already_departed = schedule.atd == Some(atd);
        schedule.record_departure(atd)?;
        let updated = schedule.clone();
        if let Some(idx) = state.berth_index.get_mut(&updated.berth_id) {
            idx.remove(&(updated.eta, updated.id));
        }
        let mut history_row = None;
        if !already_departed {
            let atb = updated.atb.unwrap_or(atd);
            let miss_minutes = updated
                .ata
                .map(|ata| (ata - updated.eta).num_minutes().abs() as f64)
                .unwrap_or(0.0);
            let accuracy =
                (100.0 - miss_minutes * 100.0 / ETA_ACCURACY_SCALE_MINUTES).clamp(0.0, 100.0);
            let row = VesselHistory {
                id: HistoryId(state.fresh_id()),
                vessel_id: updated.vessel_id,
                schedule_id: updated.id,
                berth_id: updated.berth_id,
                ata: updated.ata,
                atb,
                atd,
                waiting_minutes: updated.waiting_minutes.unwrap_or(0),
                actual_dwell_minutes: updated.dwell_minutes,
                eta_accuracy_pct: Some(accuracy),
            };
            state.history.push(row.clone());
            history_row = Some(row);
        }
        drop(state);
        self.persist(format!("schedule:{}", id), &updated)?;
        if let Some(row) = history_row {
            self.persist(format!("history:{}", row.id), &row)?;
        }
        Ok(updated)
    }

    /// Cancel a schedule
    pub fn cancel_schedule(&self, id: ScheduleId) -> EngineResult<Schedule> {
        self.with_schedule(id, |s| s.cancel())
    }

    /// Cancel and re-create in one transaction, preserving exclusivity
    ///
    /// If the new window conflicts, the original schedule is left untouched.
    pub fn reschedule(
        &self,
        id: ScheduleId,
        new_berth: BerthId,
        new_eta: DateTime<Utc>,
        new_etd: DateTime<Utc>,
    ) -> EngineResult<Schedule> {
        if new_eta >= new_etd {
            return Err(EngineError::Validation(
                "schedule window is empty or inverted".into(),
            ));
        }
        let now = self.clock.now();
        let mut state = self.state.write();
        let old = state
            .schedules
            .get(&id)
            .cloned()
            .ok_or_else(|| EngineError::not_found("schedule", id))?;
        if old.status.is_terminal() {
            return Err(EngineError::InvalidTransition {
                from: old.status.to_string(),
                to: "scheduled".into(),
            });
        }
        if !state.berths.contains_key(&new_berth) {
            return Err(EngineError::not_found("berth", new_berth));
        }
        let conflicts: Vec<ScheduleId> = state
            .overlapping_on_berth(new_berth, new_eta, new_etd)
            .into_iter()
            .filter(|sid| *sid != id)
            .collect();
        if !conflicts.is_empty() {
            return Err(EngineError::TimeConflict { conflicts });
        }
        state.note_dwell((new_etd - new_eta).num_minutes());

        // Commit point: cancel the old call and create its replacement.
        if let Some(s) = state.schedules.get_mut(&id) {
            s.status = ScheduleStatus::Cancelled;
        }
        if let Some(idx) = state.berth_index.get_mut(&old.berth_id) {
            idx.remove(&(old.eta, old.id));
        }
        let replacement = Schedule {
            id: ScheduleId(state.fresh_id()),
            vessel_id: old.vessel_id,
            berth_id: new_berth,
            eta: new_eta,
            predicted_eta: new_eta,
            etd: new_etd,
            ata: None,
            atb: None,
            atd: None,
            status: ScheduleStatus::Scheduled,
            dwell_minutes: (new_etd - new_eta).num_minutes(),
            waiting_minutes: None,
            optimization_score: old.optimization_score,
            priority_weight: old.priority_weight,
            notes: old.notes.clone(),
            created_at: now,
        };
        state
            .berth_index
            .entry(new_berth)
            .or_default()
            .insert((new_eta, replacement.id), replacement.id);
        state.schedules.insert(replacement.id, replacement.clone());
        let cancelled = state.schedules.get(&id).cloned();
        drop(state);
        if let Some(c) = cancelled {
            self.persist(format!("schedule:{}", id), &c)?;
        }
        self.persist(format!("schedule:{}", replacement.id), &replacement)?;
        Ok(replacement)
    }

    /// Exchange the windows (and berths) of two non-terminal schedules in
    /// one transaction, validating only against third parties
    pub fn swap_schedules(&self, a: ScheduleId, b: ScheduleId) -> EngineResult<()> {
        let mut state = self.state.write();
        let first = state
            .schedules
            .get(&a)
            .cloned()
            .ok_or_else(|| EngineError::not_found("schedule", a))?;
        let second = state
            .schedules
            .get(&b)
            .cloned()
            .ok_or_else(|| EngineError::not_found("schedule", b))?;
        if first.status.is_terminal() || second.status.is_terminal() {
            return Err(EngineError::Validation(
                "cannot swap terminal schedules".into(),
            ));
        }
        // Each schedule must fit the other's window among third parties.
        for target in [&second, &first] {
            let conflicts: Vec<ScheduleId> = state
                .overlapping_on_berth(target.berth_id, target.eta, target.etd)
                .into_iter()
                .filter(|sid| *sid != a && *sid != b)
                .collect();
            if !conflicts.is_empty() {
                return Err(EngineError::TimeConflict { conflicts });
            }
        }
        // Remove both index entries, rewrite, reinsert.
        if let Some(idx) = state.berth_index.get_mut(&first.berth_id) {
            idx.remove(&(first.eta, first.id));
        }
        if let Some(idx) = state.berth_index.get_mut(&second.berth_id) {
            idx.remove(&(second.eta, second.id));
        }
        let mut new_first = first.clone();
        new_first.berth_id = second.berth_id;
        new_first.eta = second.eta;
        new_first.etd = second.etd;
        new_first.predicted_eta = second.eta;
        new_first.dwell_minutes = (second.etd - second.eta).num_minutes();
        let mut new_second = second.clone();
        new_second.berth_id = first.berth_id;
        new_second.eta = first.eta;
        new_second.etd = first.etd;
        new_second.predicted_eta = first.eta;
        new_second.dwell_minutes = (first.etd - first.eta).num_minutes();
        state
            .berth_index
            .entry(new_first.berth_id)
            .or_default()
            .insert((new_first.eta, new_first.id), new_first.id);
        state
            .berth_index
            .entry(new_second.berth_id)
            .or_default()
            .insert((new_second.eta, new_second.id), new_second.id);
        state.schedules.insert(a, new_first.clone());
        state.schedules.insert(b, new_second.clone());
        drop(state);
        self.persist(format!("schedule:{}", a), &new_first)?;
        self.persist(format!("schedule:{}", b), &new_second)?;
        Ok(())
    }

    /// Update the live ETA prediction
    ///
    /// The committed window stays; only `predicted_eta` shifts. Deviations
    /// over 30 minutes raise an alert (Warning, High over 60, Critical over
    /// 120); if the predicted window now overlaps a neighbour on the same
    /// berth, one `BerthOverlap` conflict is inserted.
    pub fn update_eta(
        &self,
        id: ScheduleId,
        new_eta: DateTime<Utc>,
        new_predicted: Option<DateTime<Utc>>,
    ) -> EngineResult<EtaUpdateOutcome> {
        let now = self.clock.now();
        let mut state = self.state.write();
        let schedule = state
            .schedules
            .get_mut(&id)
            .ok_or_else(|| EngineError::not_found("schedule", id))?;
        if schedule.status.is_terminal() {
            return Err(EngineError::InvalidTransition {
                from: schedule.status.to_string(),
                to: "eta update".into(),
            });
        }
        let predicted = new_predicted.unwrap_or(new_eta);
        schedule.predicted_eta = predicted;
        let updated = schedule.clone();
        let deviation_minutes = (predicted - updated.eta).num_minutes();

        let alert = if deviation_minutes.abs() > 30 {
            let severity = if deviation_minutes.abs() > 120 {
                AlertSeverity::Critical
            } else if deviation_minutes.abs() > 60 {
                AlertSeverity::High
            } else {
                AlertSeverity::Warning
            };
            let alert = Alert {
                id: AlertId(state.fresh_id()),
                alert_type: "eta_update".into(),
                severity,
                message: format!(
                    "ETA for schedule {} deviates by {} minutes",
                    id, deviation_minutes
                ),
                schedule_id: Some(id),
                vessel_id: Some(updated.vessel_id),
                berth_id: Some(updated.berth_id),
                created_at: now,
                read_at: None,
                auto_dismiss_ms: None,
            };
            state.alerts.insert(alert.id, alert.clone());
            Some(alert)
        } else {
            None
        };

        // Predicted occupancy drift: probe the same berth for overlap.
        let predicted_etd = predicted + Duration::minutes(updated.dwell_minutes);
        let overlapping: Option<ScheduleId> = state
            .overlapping_on_berth(updated.berth_id, predicted, predicted_etd)
            .into_iter()
            .find(|sid| *sid != id);
        // One active conflict row per pair, however often the ETA drifts.
        let already_logged = |state: &State, other: ScheduleId| {
            state.conflicts.values().any(|c| {
                c.kind == ConflictKind::BerthOverlap
                    && c.is_active()
                    && c.schedule_id1 == id
                    && c.schedule_id2 == Some(other)
            })
        };
        let conflict = overlapping.filter(|other| !already_logged(&state, *other)).map(|other| {
            let conflict = Conflict {
                id: ConflictId(state.fresh_id()),
                kind: ConflictKind::BerthOverlap,
                schedule_id1: id,
                schedule_id2: Some(other),
                severity: ConflictSeverity::High,
                detected_at: now,
                resolved_at: None,
                description: format!(
                    "Predicted window of schedule {} overlaps schedule {} on berth {}",
                    id, other, updated.berth_id
                ),
                resolution: None,
            };
            state.conflicts.insert(conflict.id, conflict.clone());
            conflict
        });
        drop(state);

        self.persist(format!("schedule:{}", id), &updated)?;
        if let Some(a) = &alert {
            self.persist(format!("alert:{}", a.id), a)?;
        }
        if let Some(c) = &conflict {
            self.persist(format!("conflict:{}", c.id), c)?;
        }
        Ok(EtaUpdateOutcome {
            schedule: updated,
            alert,
            conflict,
        })
    }

    /// Administrative truncation of schedules, conflicts, and alerts
    pub fn clear_all(&self) -> EngineResult<()> {
        let mut state = self.state.write();
        let schedule_ids: Vec<ScheduleId> = state.schedules.keys().copied().collect();
        let conflict_ids: Vec<ConflictId> = state.conflicts.keys().copied().collect();
        let alert_ids: Vec<AlertId> = state.alerts.keys().copied().collect();
        state.schedules.clear();
        state.berth_index.clear();
        state.conflicts.clear();
        state.alerts.clear();
        drop(state);
        for id in schedule_ids {
            self.unpersist(format!("schedule:{}", id))?;
        }
        for id in conflict_ids {
            self.unpersist(format!("conflict:{}", id))?;
        }
        for id in alert_ids {
            self.unpersist(format!("alert:{}", id))?;
        }
        warn!("all schedules, conflicts, and alerts cleared");
        Ok(())
    }

    // ---- active views ---------------------------------------------------

    /// Non-terminal schedules, optionally filtered by terminal
    pub fn get_active_schedules(&self, terminal: Option<TerminalId>) -> Vec<Schedule> {
        let state = self.state.read();
        let mut out: Vec<Schedule> = state
            .schedules
            .values()
            .filter(|s| s.occupies_berth())
            .filter(|s| {
                terminal
                    .map(|t| {
                        state
                            .berths
                            .get(&s.berth_id)
                            .map(|b| b.terminal_id == t)
                            .unwrap_or(false)
                    })
                    .unwrap_or(true)
            })
            .cloned()
            .collect();
        out.sort_by_key(|s| (s.eta, s.id));
        out
    }

    /// Non-terminal schedules of one vessel
    pub fn active_schedules_for_vessel(&self, vessel: VesselId) -> Vec<Schedule> {
        let state = self.state.read();
        let mut out: Vec<Schedule> = state
            .schedules
            .values()
            .filter(|s| s.vessel_id == vessel && s.occupies_berth())
            .cloned()
            .collect();
        out.sort_by_key(|s| (s.eta, s.id));
        out
    }

    /// Unread alerts, newest first
    pub fn get_active_alerts(&self) -> Vec<Alert> {
        let mut out: Vec<Alert> = self
            .state
            .read()
            .alerts
            .values()
            .filter(|a| a.is_active())
            .cloned()
            .collect();
        out.sort_by_key(|a| std::cmp::Reverse((a.created_at, a.id)));
        out
    }

    /// Unresolved conflicts, newest first
    pub fn get_active_conflicts(&self) -> Vec<Conflict> {
        let mut out: Vec<Conflict> = self
            .state
            .read()
            .conflicts
            .values()
            .filter(|c| c.is_active())
            .cloned()
            .collect();
        out.sort_by_key(|c| std::cmp::Reverse((c.detected_at, c.id)));
        out
    }

    /// Insert a detector-produced conflict
    pub fn insert_conflict(
        &self,
        kind: ConflictKind,
        schedule_id1: ScheduleId,
        schedule_id2: Option<ScheduleId>,
        severity: ConflictSeverity,
        description: String,
    ) -> EngineResult<Conflict> {
        let now = self.clock.now();
        let mut state = self.state.write();
        let conflict = Conflict {
            id: ConflictId(state.fresh_id()),
            kind,
            schedule_id1,
            schedule_id2,
            severity,
            detected_at: now,
            resolved_at: None,
            description,
            resolution: None,
        };
        state.conflicts.insert(conflict.id, conflict.clone());
        drop(state);
        self.persist(format!("conflict:{}", conflict.id), &conflict)?;
        Ok(conflict)
    }

    /// Mark a conflict resolved, recording the applied option
    pub fn resolve_conflict(
        &self,
        id: ConflictId,
        resolution: serde_json::Value,
    ) -> EngineResult<Conflict> {
        let now = self.clock.now();
        let mut state = self.state.write();
        let conflict = state
            .conflicts
            .get_mut(&id)
            .ok_or_else(|| EngineError::not_found("conflict", id))?;
        conflict.resolved_at = Some(now);
        conflict.resolution = Some(resolution);
        let updated = conflict.clone();
        drop(state);
        self.persist(format!("conflict:{}", id), &updated)?;
        Ok(updated)
    }

    /// Insert an ingestor- or detector-produced alert
    pub fn insert_alert(
        &self,
        alert_type: &str,
        severity: AlertSeverity,
        message: String,
        schedule_id: Option<ScheduleId>,
        vessel_id: Option<VesselId>,
        berth_id: Option<BerthId>,
    ) -> EngineResult<Alert> {
        let now = self.clock.now();
        let mut state = self.state.write();
        let alert = Alert {
            id: AlertId(state.fresh_id()),
            alert_type: alert_type.into(),
            severity,
            message,
            schedule_id,
            vessel_id,
            berth_id,
            created_at: now,
            read_at: None,
            auto_dismiss_ms: None,
        };
        state.alerts.insert(alert.id, alert.clone());
        drop(state);
        self.persist(format!("alert:{}", alert.id), &alert)?;
        Ok(alert)
    }

    /// Terminal read transition for an alert
    pub fn mark_alert_read(&self, id: AlertId) -> EngineResult<Alert> {
        let now = self.clock.now();
        let mut state = self.state.write();
        let alert = state
            .alerts
            .get_mut(&id)
            .ok_or_else(|| EngineError::not_found("alert", id))?;
        alert.mark_read(now);
        let updated = alert.clone();
        drop(state);
        self.persist(format!("alert:{}", id), &updated)?;
        Ok(updated)
    }

    // ---- positions and history -----------------------------------------

    /// Append a position report; stale samples (older than the latest for
    /// the same transponder) are dropped
    pub fn append_position(&self, report: PositionReport) -> EngineResult<bool> {
        let mut state = self.state.write();
        let series = state.positions.entry(report.mmsi).or_default();
        if let Some(latest) = series.last() {
            if report.recorded_at <= latest.recorded_at {
                return Ok(false);
            }
        }
        series.push(report.clone());
        let cutoff = report.ingested_at - Duration::days(POSITION_RETENTION_DAYS);
        series.retain(|r| r.recorded_at >= cutoff);
        drop(state);
        self.persist(format!("position:{}", report.mmsi), &report)?;
        Ok(true)
    }

    /// Most recent samples for a transponder, oldest first
    pub fn recent_positions(&self, mmsi: u64, limit: usize) -> Vec<PositionReport> {
        let state = self.state.read();
        state
            .positions
            .get(&mmsi)
            .map(|series| {
                series
                    .iter()
                    .rev()
                    .take(limit)
                    .cloned()
                    .collect::<Vec<_>>()
                    .into_iter()
                    .rev()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Completed-call summary feeding the scoring engine
    pub fn history_summary(&self, vessel: VesselId) -> Option<HistorySummary> {
        let state = self.state.read();
        let rows: Vec<&VesselHistory> = state
            .history
            .iter()
            .filter(|h| h.vessel_id == vessel)
            .collect();
        if rows.is_empty() {
            return None;
        }
        let visits = rows.len() as u32;
        let accuracies: Vec<f64> = rows.iter().filter_map(|h| h.eta_accuracy_pct).collect();
        let avg = if accuracies.is_empty() {
            50.0
        } else {
            accuracies.iter().sum::<f64>() / accuracies.len() as f64
        };
        Some(HistorySummary {
            visits,
            avg_eta_accuracy_pct: avg,
        })
    }

    /// History rows for a vessel, most recent call last
    pub fn history_for_vessel(&self, vessel: VesselId) -> Vec<VesselHistory> {
        self.state
            .read()
            .history
            .iter()
            .filter(|h| h.vessel_id == vessel)
            .cloned()
            .collect()
    }
}

/// Shared handle used across services
pub type SharedStore = Arc<Store>;
