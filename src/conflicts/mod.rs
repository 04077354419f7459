//! Conflict detector
//!
//! Watches active schedules in two modes: reactively on bus events touching
//! a berth, and periodically on a fixed tick. Emissions are edge-triggered:
//! an in-memory debounce set keyed by `(schedule, condition)` suppresses
//! duplicates until the condition ceases or escalates to a new band.
//!
//! Resolution suggestions are structural; impact scores are waiting-minute
//! units. Nothing is auto-applied unless `auto_resolve` is configured.

use std::sync::Arc;

use chrono::Duration;
use dashmap::DashSet;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::clock::SharedClock;
use crate::config::{ConflictConfig, SchedulerConfig, TideConfig, UkcConfig};
use crate::constraints::ConstraintValidator;
use crate::domain::{
    AlertSeverity, Conflict, ConflictId, ConflictKind, ConflictSeverity, Schedule, ScheduleId,
    ScheduleStatus,
};
use crate::error::{EngineError, EngineResult};
use crate::events::{EventBus, EventPayload, Room};
use crate::slots::{SlotFinder, SlotQuery};
use crate::store::SharedStore;

/// Flat surcharge for options that force a re-allocation, minutes
const REALLOCATION_OVERHEAD_MINUTES: i64 = 30;

/// Structural resolution moves for a berth overlap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionKind {
    /// Push the lower-priority schedule past the other's departure
    DelaySecond,
    /// Re-run suggestion for the lower-priority party elsewhere
    ShiftToAlternateBerth,
    /// Exchange the two berth assignments
    SwapSchedules,
}

/// One suggested resolution
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionOption {
    pub kind: ResolutionKind,
    /// Waiting-minute units
    pub impact_score: i64,
    pub description: String,
}

/// The detector; owns its debounce memory
pub struct ConflictDetector {
    store: SharedStore,
    bus: Arc<EventBus>,
    clock: SharedClock,
    config: ConflictConfig,
    validator: ConstraintValidator,
    slots: SlotFinder,
    port_room: Room,
    debounce: DashSet<(ScheduleId, String)>,
}

impl ConflictDetector {
    pub fn new(
        store: SharedStore,
        bus: Arc<EventBus>,
        clock: SharedClock,
        config: ConflictConfig,
        scheduler: SchedulerConfig,
        ukc: UkcConfig,
        tide: TideConfig,
        default_port_code: String,
    ) -> Self {
        Self {
            store,
            bus,
            clock,
            config,
            validator: ConstraintValidator::new(ukc, tide),
            slots: SlotFinder::new(scheduler),
            port_room: Room::Port(default_port_code),
            debounce: DashSet::new(),
        }
    }

    /// Long-lived task: periodic scans plus reactive re-scans on schedule
    /// and ETA events. A stop signal ends the loop after the current pass.
    pub async fn run(self: Arc<Self>, mut stop: watch::Receiver<bool>) {
        let subscription = self.bus.subscribe();
        subscription.join(self.port_room.clone());
        let mut tick =
            tokio::time::interval(std::time::Duration::from_secs(self.config.scan_interval_seconds));
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        info!(interval = self.config.scan_interval_seconds, "conflict detector started");
        loop {
            tokio::select! {
                _ = tick.tick() => {
                    self.scan_cycle();
                }
                event = subscription.recv() => {
                    match event.payload {
                        EventPayload::ScheduleChanged { schedule, .. } => {
                            self.scan_berth_overlaps(&schedule);
                        }
                        EventPayload::EtaUpdated { schedule_id, .. } => {
                            if let Ok(schedule) = self.store.get_schedule(schedule_id) {
                                self.scan_berth_overlaps(&schedule);
                            }
                        }
                        _ => {}
                    }
                }
                _ = stop.changed() => {
                    if *stop.borrow() {
                        info!("conflict detector stopping");
                        break;
                    }
                }
            }
        }
    }

    /// One periodic pass over every active schedule
    pub fn scan_cycle(&self) {
        let now = self.clock.now();
        let active = self.store.get_active_schedules(None);
        for schedule in &active {
            self.check_overstay(schedule);
            self.check_approaching_departure(schedule);
            self.check_tidal_shift(schedule);
        }
        // Release debounce keys whose schedules left the active set.
        let active_ids: std::collections::HashSet<ScheduleId> =
            active.iter().map(|s| s.id).collect();
        self.debounce.retain(|(id, _)| active_ids.contains(id));
        debug!(active = active.len(), at = %now, "conflict scan cycle complete");
    }

    /// Re-scan one berth for pairwise overlaps after a change event
    ///
    /// Committed windows cannot overlap (the store enforces exclusivity);
    /// overlaps surface through predicted-ETA drift, so the scan compares
    /// the effective windows `[predicted_eta, predicted_eta + dwell)`.
    pub fn scan_berth_overlaps(&self, changed: &Schedule) {
        let schedules = self.store.schedules_for_berth(changed.berth_id);
        let active = self.store.get_active_conflicts();
        let effective = |s: &Schedule| {
            (
                s.predicted_eta,
                s.predicted_eta + Duration::minutes(s.dwell_minutes),
            )
        };
        for (i, a) in schedules.iter().enumerate() {
            for b in schedules.iter().skip(i + 1) {
                let (a0, a1) = effective(a);
                let (b0, b1) = effective(b);
                if !crate::domain::windows_overlap(a0, a1, b0, b1) {
                    continue;
                }
                let pair = (a.id.min(b.id), a.id.max(b.id));
                let logged = active.iter().any(|c| {
                    c.kind == ConflictKind::BerthOverlap
                        && ((c.schedule_id1 == pair.0 && c.schedule_id2 == Some(pair.1))
                            || (c.schedule_id1 == pair.1 && c.schedule_id2 == Some(pair.0)))
                });
                if logged {
                    continue;
                }
                let key = (pair.0, format!("overlap:{}", pair.1));
                if !self.debounce.insert(key) {
                    continue;
                }
                match self.store.insert_conflict(
                    ConflictKind::BerthOverlap,
                    a.id.min(b.id),
                    Some(a.id.max(b.id)),
                    ConflictSeverity::High,
                    format!(
                        "schedules {} and {} overlap on berth {}",
                        a.id, b.id, changed.berth_id
                    ),
                ) {
                    Ok(conflict) => {
                        self.publish_conflict(&conflict, a);
                        if self.config.auto_resolve {
                            self.auto_resolve(conflict.id);
                        }
                    }
                    Err(e) => warn!(error = %e, "failed to persist overlap conflict"),
                }
            }
        }
    }

    fn check_overstay(&self, schedule: &Schedule) {
        if schedule.status != ScheduleStatus::Berthed {
            return;
        }
        let now = self.clock.now();
        if now <= schedule.etd {
            return;
        }
        let overdue = (now - schedule.etd).num_minutes();
        let band = match overdue {
            m if m >= 60 => Some(("critical", AlertSeverity::Critical, ConflictSeverity::Critical)),
            m if m >= 30 => Some(("high", AlertSeverity::High, ConflictSeverity::High)),
            m if m >= 15 => Some(("warning", AlertSeverity::Warning, ConflictSeverity::Medium)),
            _ => None,
        };
        let Some((band_name, alert_severity, conflict_severity)) = band else {
            return;
        };
        let key = (schedule.id, format!("overstay:{}", band_name));
        if !self.debounce.insert(key) {
            return;
        }
        let description = format!(
            "vessel {} overstaying berth {} by {} minutes",
            schedule.vessel_id, schedule.berth_id, overdue
        );
        if let Ok(conflict) = self.store.insert_conflict(
            ConflictKind::Overstay,
            schedule.id,
            None,
            conflict_severity,
            description.clone(),
        ) {
            self.publish_conflict(&conflict, schedule);
        }
        match self.store.insert_alert(
            "overstay",
            alert_severity,
            description,
            Some(schedule.id),
            Some(schedule.vessel_id),
            Some(schedule.berth_id),
        ) {
            Ok(alert) => {
                self.bus
                    .publish(EventPayload::AlertRaised { alert }, self.rooms(schedule));
            }
            Err(e) => warn!(error = %e, "failed to persist overstay alert"),
        }
    }

    fn check_approaching_departure(&self, schedule: &Schedule) {
        if schedule.status != ScheduleStatus::Berthed {
            return;
        }
        let now = self.clock.now();
        let remaining = schedule.etd - now;
        if remaining <= Duration::zero() || remaining > Duration::hours(2) {
            return;
        }
        let key = (schedule.id, "approaching_departure".to_string());
        if !self.debounce.insert(key) {
            return;
        }
        match self.store.insert_alert(
            "approaching_departure",
            AlertSeverity::Info,
            format!(
                "vessel {} departs berth {} in {} minutes",
                schedule.vessel_id,
                schedule.berth_id,
                remaining.num_minutes()
            ),
            Some(schedule.id),
            Some(schedule.vessel_id),
            Some(schedule.berth_id),
        ) {
            Ok(alert) => {
                self.bus
                    .publish(EventPayload::AlertRaised { alert }, self.rooms(schedule));
            }
            Err(e) => warn!(error = %e, "failed to persist departure alert"),
        }
    }

    /// Deep-draft arrivals whose tidal window no longer covers the eta
    fn check_tidal_shift(&self, schedule: &Schedule) {
        if !matches!(
            schedule.status,
            ScheduleStatus::Scheduled | ScheduleStatus::Approaching
        ) {
            return;
        }
        let Ok(vessel) = self.store.get_vessel(schedule.vessel_id) else {
            return;
        };
        let Ok(berth) = self.store.get_berth(schedule.berth_id) else {
            return;
        };
        if !self.validator.needs_tide(&vessel, &berth) {
            return;
        }
        let Ok(terminal) = self.store.get_terminal(berth.terminal_id) else {
            return;
        };
        let tides = self.store.tidal_readings(terminal.port_id);
        let windows = self.validator.tidal_windows(&vessel, &berth, &tides);
        let eta = schedule.predicted_eta;
        let covered = windows.iter().any(|(from, to)| eta >= *from && eta <= *to);
        if covered {
            self.debounce.remove(&(schedule.id, "tidal".to_string()));
            return;
        }
        let key = (schedule.id, "tidal".to_string());
        if !self.debounce.insert(key) {
            return;
        }
        if let Ok(conflict) = self.store.insert_conflict(
            ConflictKind::TidalConstraint,
            schedule.id,
            None,
            ConflictSeverity::High,
            format!(
                "predicted arrival of schedule {} falls outside every tidal window at berth {}",
                schedule.id, berth.code
            ),
        ) {
            self.publish_conflict(&conflict, schedule);
        }
    }

    /// Structural options for a berth overlap, cheapest first
    pub fn resolution_options(&self, conflict_id: ConflictId) -> EngineResult<Vec<ResolutionOption>> {
        let conflict = self
            .store
            .get_active_conflicts()
            .into_iter()
            .find(|c| c.id == conflict_id)
            .ok_or_else(|| EngineError::not_found("conflict", conflict_id))?;
        if conflict.kind != ConflictKind::BerthOverlap {
            return Ok(Vec::new());
        }
        let first = self.store.get_schedule(conflict.schedule_id1)?;
        let second_id = conflict
            .schedule_id2
            .ok_or_else(|| EngineError::Validation("overlap conflict lacks a counterparty".into()))?;
        let second = self.store.get_schedule(second_id)?;

        // The lower-priority party moves; ties move the later arrival.
        let (keeper, mover) = if first.priority_weight >= second.priority_weight {
            (&first, &second)
        } else {
            (&second, &first)
        };

        let mut options = Vec::new();

        let delay_wait = (keeper.etd - mover.eta).num_minutes().max(0);
        options.push(ResolutionOption {
            kind: ResolutionKind::DelaySecond,
            impact_score: delay_wait,
            description: format!(
                "delay schedule {} until schedule {} departs",
                mover.id, keeper.id
            ),
        });

        if let Some(shift_wait) = self.shift_wait(mover)? {
            options.push(ResolutionOption {
                kind: ResolutionKind::ShiftToAlternateBerth,
                impact_score: shift_wait + REALLOCATION_OVERHEAD_MINUTES,
                description: format!("move schedule {} to an alternate berth", mover.id),
            });
        }

        options.push(ResolutionOption {
            kind: ResolutionKind::SwapSchedules,
            impact_score: 2 * REALLOCATION_OVERHEAD_MINUTES,
            description: format!("swap berths of schedules {} and {}", keeper.id, mover.id),
        });

        options.sort_by_key(|o| o.impact_score);
        Ok(options)
    }

    /// Apply one option and mark the conflict resolved
    pub fn apply_resolution(
        &self,
        conflict_id: ConflictId,
        kind: ResolutionKind,
    ) -> EngineResult<Conflict> {
        let conflict = self
            .store
            .get_active_conflicts()
            .into_iter()
            .find(|c| c.id == conflict_id)
            .ok_or_else(|| EngineError::not_found("conflict", conflict_id))?;
        let first = self.store.get_schedule(conflict.schedule_id1)?;
        let second_id = conflict
            .schedule_id2
            .ok_or_else(|| EngineError::Validation("conflict is not resolvable by move".into()))?;
        let second = self.store.get_schedule(second_id)?;
        let (keeper, mover) = if first.priority_weight >= second.priority_weight {
            (first, second)
        } else {
            (second, first)
        };

        match kind {
            ResolutionKind::DelaySecond => {
                let Ok(vessel) = self.store.get_vessel(mover.vessel_id) else {
                    return Err(EngineError::not_found("vessel", mover.vessel_id));
                };
                let buffer = Duration::minutes(self.slots.buffer_minutes(vessel.vessel_type));
                let new_eta = keeper.etd + buffer;
                let new_etd = new_eta + (mover.etd - mover.eta);
                let moved =
                    self.store
                        .reschedule(mover.id, mover.berth_id, new_eta, new_etd)?;
                self.bus.publish(
                    EventPayload::ScheduleChanged {
                        schedule: moved.clone(),
                        change: crate::events::ScheduleChange::Rescheduled,
                    },
                    self.rooms(&moved),
                );
            }
            ResolutionKind::ShiftToAlternateBerth => {
                let vessel = self.store.get_vessel(mover.vessel_id)?;
                let dwell = (mover.etd - mover.eta).num_minutes();
                let mut done = false;
                for berth in self.store.get_compatible_berths(vessel.loa, vessel.draft) {
                    if berth.id == mover.berth_id
                        || !self.validator.screen(&vessel, &berth).hard_passed
                    {
                        continue;
                    }
                    let schedules = self.store.schedules_for_berth(berth.id);
                    let maintenance = self.store.maintenance_for(berth.id);
                    let query = SlotQuery {
                        schedules: &schedules,
                        maintenance: &maintenance,
                        tidal_windows: None,
                    };
                    if let Ok(slot) = self.slots.find(&vessel, mover.eta, dwell, &query) {
                        let moved =
                            self.store.reschedule(mover.id, berth.id, slot.eta, slot.etd)?;
                        self.bus.publish(
                            EventPayload::ScheduleChanged {
                                schedule: moved.clone(),
                                change: crate::events::ScheduleChange::Rescheduled,
                            },
                            self.rooms(&moved),
                        );
                        done = true;
                        break;
                    }
                }
                if !done {
                    return Err(EngineError::NoCompatibleBerth);
                }
            }
            ResolutionKind::SwapSchedules => {
                self.store.swap_schedules(keeper.id, mover.id)?;
                for id in [keeper.id, mover.id] {
                    if let Ok(schedule) = self.store.get_schedule(id) {
                        self.bus.publish(
                            EventPayload::ScheduleChanged {
                                schedule: schedule.clone(),
                                change: crate::events::ScheduleChange::Rescheduled,
                            },
                            self.rooms(&schedule),
                        );
                    }
                }
            }
        }

        let resolved = self.store.resolve_conflict(
            conflict_id,
            serde_json::json!({ "applied": kind, "resolved_by": "detector" }),
        )?;
        self.bus.publish(
            EventPayload::ConflictResolved {
                conflict: resolved.clone(),
            },
            vec![self.port_room.clone()],
        );
        Ok(resolved)
    }

    /// Apply the cheapest option without asking; configured deployments only
    fn auto_resolve(&self, conflict_id: ConflictId) {
        let options = match self.resolution_options(conflict_id) {
            Ok(options) => options,
            Err(e) => {
                warn!(error = %e, "auto-resolve enumeration failed");
                return;
            }
        };
        let Some(best) = options.first() else {
            return;
        };
        match self.apply_resolution(conflict_id, best.kind) {
            Ok(_) => info!(conflict = %conflict_id, kind = ?best.kind, "conflict auto-resolved"),
            Err(e) => warn!(error = %e, "auto-resolve failed"),
        }
    }

    fn shift_wait(&self, mover: &Schedule) -> EngineResult<Option<i64>> {
        let vessel = self.store.get_vessel(mover.vessel_id)?;
        let dwell = (mover.etd - mover.eta).num_minutes();
        for berth in self.store.get_compatible_berths(vessel.loa, vessel.draft) {
            if berth.id == mover.berth_id || !self.validator.screen(&vessel, &berth).hard_passed {
                continue;
            }
            let schedules = self.store.schedules_for_berth(berth.id);
            let maintenance = self.store.maintenance_for(berth.id);
            let query = SlotQuery {
                schedules: &schedules,
                maintenance: &maintenance,
                tidal_windows: None,
            };
            if let Ok(slot) = self.slots.find(&vessel, mover.eta, dwell, &query) {
                return Ok(Some(slot.waiting_minutes));
            }
        }
        Ok(None)
    }

    fn rooms(&self, schedule: &Schedule) -> Vec<Room> {
        let mut rooms = vec![
            Room::Vessel(schedule.vessel_id),
            self.port_room.clone(),
        ];
        if let Ok(berth) = self.store.get_berth(schedule.berth_id) {
            rooms.push(Room::Terminal(berth.terminal_id));
        }
        rooms
    }

    fn publish_conflict(&self, conflict: &Conflict, schedule: &Schedule) {
        self.bus.publish(
            EventPayload::ConflictDetected {
                conflict: conflict.clone(),
            },
            self.rooms(schedule),
        );
    }
}
