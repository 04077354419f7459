//! Berth suggestion and allocation service
//!
//! The write path of the engine: filter compatible berths through the
//! validator, plan a window with the slot finder, rescore at the planned
//! window, rank, and commit atomically through the store. Committed changes
//! are published on the event bus after the store write succeeds.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::clock::SharedClock;
use crate::config::{SchedulerConfig, ScoringWeights, TideConfig, UkcConfig};
use crate::constraints::{
    ConstraintValidator, ValidationContext, ValidationMode, Violation,
};
use crate::domain::{
    Berth, PriorityClass, ResourceKind, Schedule, ScheduleId, TidalReading, Vessel, VesselId,
    VesselType,
};
use crate::error::{EngineError, EngineResult};
use crate::events::{EventBus, EventPayload, Room, ScheduleChange};
use crate::scoring::{rank_candidates, round2, ScoreBreakdown, ScoringEngine, SlotContext};
use crate::slots::{Slot, SlotFinder, SlotQuery};
use crate::store::{ScheduleDraft, SharedStore};

/// Fixed overhead charged when an option forces a re-allocation, minutes
const REALLOCATION_OVERHEAD_MINUTES: i64 = 30;

/// Direction of a reasoning factor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Impact {
    Positive,
    Negative,
    Neutral,
}

/// One structured explanation entry; never free prose
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReasoningFactor {
    pub factor: String,
    pub impact: Impact,
    pub weight: f64,
    pub message: String,
}

/// Suggestion confidence band
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

/// One ranked candidate
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Suggestion {
    pub rank: u32,
    pub berth_id: crate::domain::BerthId,
    pub berth_name: String,
    pub terminal_name: String,
    pub score: f64,
    pub confidence: Confidence,
    pub proposed_eta: DateTime<Utc>,
    pub proposed_etd: DateTime<Utc>,
    pub estimated_wait_minutes: i64,
    pub reasoning: Vec<ReasoningFactor>,
    /// Soft breaches only; hard failures never reach a suggestion
    pub violations: Vec<Violation>,
}

/// How a window-vessel standoff could be resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreemptionKind {
    /// Keep both; the incoming call waits for the occupant to finish
    Expedite,
    /// Move the occupant to its next-best berth
    ShiftCurrent,
    /// Truncate the occupant's departure to the window start
    TruncateCurrent,
}

/// One enumerated option, cheapest first in the returned list
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreemptionOption {
    pub kind: PreemptionKind,
    /// Waiting-minute units; no currency
    pub cost_minutes: i64,
    pub occupant: ScheduleId,
    pub description: String,
}

/// Result of an allocation request
#[derive(Debug, Clone)]
pub enum AllocationOutcome {
    /// Schedule committed
    Committed(Schedule),
    /// A window-vessel standoff; the caller picks an option
    WindowOptions(Vec<PreemptionOption>),
}

/// Allocation request parameters
#[derive(Debug, Clone)]
pub struct AllocateRequest {
    pub vessel_id: VesselId,
    pub berth_id: crate::domain::BerthId,
    pub eta: DateTime<Utc>,
    pub etd: DateTime<Utc>,
    /// Explicit Government/Emergency override of a Window claim
    pub priority_override: bool,
    pub notes: Option<String>,
}

/// The suggestion and allocation service
pub struct AllocationService {
    store: SharedStore,
    bus: Arc<EventBus>,
    validator: ConstraintValidator,
    scorer: ScoringEngine,
    slots: SlotFinder,
    clock: SharedClock,
    config: SchedulerConfig,
}

impl AllocationService {
    pub fn new(
        store: SharedStore,
        bus: Arc<EventBus>,
        clock: SharedClock,
        scheduler: SchedulerConfig,
        ukc: UkcConfig,
        tide: TideConfig,
        weights: ScoringWeights,
    ) -> Self {
        Self {
            store,
            bus,
            validator: ConstraintValidator::new(ukc, tide),
            scorer: ScoringEngine::new(weights),
            slots: SlotFinder::new(scheduler.clone()),
            clock,
            config: scheduler,
        }
    }

    /// Planned dwell for a vessel class, minutes
    pub fn estimate_dwell_minutes(vessel: &Vessel) -> i64 {
        match vessel.vessel_type {
            VesselType::Container => 1_080,
            VesselType::Bulk => 2_160,
            VesselType::Tanker => 1_440,
            VesselType::RoRo => 480,
            VesselType::General => 1_440,
            VesselType::Lng => 1_200,
        }
    }

    /// Ranked top-N berth suggestions for a vessel
    #[instrument(skip(self), fields(vessel = %vessel_id))]
    pub async fn suggest(
        &self,
        vessel_id: VesselId,
        preferred_eta: Option<DateTime<Utc>>,
        top_n: usize,
    ) -> EngineResult<Vec<Suggestion>> {
        let deadline = StdDuration::from_secs(self.config.suggest_deadline_secs);
        tokio::time::timeout(deadline, async {
            self.suggest_inner(vessel_id, preferred_eta, top_n)
        })
        .await
        .map_err(|_| EngineError::Timeout)?
    }

    fn suggest_inner(
        &self,
        vessel_id: VesselId,
        preferred_eta: Option<DateTime<Utc>>,
        top_n: usize,
    ) -> EngineResult<Vec<Suggestion>> {
        let vessel = self.store.get_vessel(vessel_id)?;
        let preferred = preferred_eta.unwrap_or_else(|| self.clock.now());
        let dwell = Self::estimate_dwell_minutes(&vessel);

        let candidates = self.store.get_compatible_berths(vessel.loa, vessel.draft);
        let screened: Vec<Berth> = candidates
            .into_iter()
            .filter(|b| self.validator.screen(&vessel, b).hard_passed)
            .collect();
        if screened.is_empty() {
            return Err(EngineError::NoCompatibleBerth);
        }

        let mut ranked: Vec<(Suggestion, ScoreBreakdown)> = Vec::new();
        for berth in &screened {
            match self.evaluate_candidate(&vessel, berth, preferred, dwell) {
                Ok(Some(entry)) => ranked.push(entry),
                Ok(None) => {}
                Err(e) => {
                    warn!(berth = %berth.code, error = %e, "candidate evaluation failed");
                }
            }
        }

        ranked.sort_by(|a, b| {
            rank_candidates(
                (&a.1, a.0.estimated_wait_minutes, a.0.berth_id.0),
                (&b.1, b.0.estimated_wait_minutes, b.0.berth_id.0),
            )
        });
        ranked.truncate(top_n);
        Ok(ranked
            .into_iter()
            .enumerate()
            .map(|(i, (mut s, _))| {
                s.rank = i as u32 + 1;
                s
            })
            .collect())
    }

    fn evaluate_candidate(
        &self,
        vessel: &Vessel,
        berth: &Berth,
        preferred: DateTime<Utc>,
        dwell: i64,
    ) -> EngineResult<Option<(Suggestion, ScoreBreakdown)>> {
        let schedules = self.store.schedules_for_berth(berth.id);
        let maintenance = self.store.maintenance_for(berth.id);
        let tides = self.tides_for_berth(berth)?;
        let tidal_windows = if self.validator.needs_tide(vessel, berth) {
            Some(self.validator.tidal_windows(vessel, berth, &tides))
        } else {
            None
        };

        let query = SlotQuery {
            schedules: &schedules,
            maintenance: &maintenance,
            tidal_windows: tidal_windows.as_deref(),
        };
        let slot = match self.slots.find(vessel, preferred, dwell, &query) {
            Ok(slot) => slot,
            Err(EngineError::NoSlotFound { .. }) => return Ok(None),
            Err(e) => return Err(e),
        };

        let report = self.validate_window(vessel, berth, slot.eta, slot.etd, &schedules, None)?;
        if !report.hard_passed {
            return Ok(None);
        }

        let history = self.store.history_summary(vessel.id);
        let breakdown = self.scorer.score(
            vessel,
            berth,
            &SlotContext {
                waiting_minutes: slot.waiting_minutes,
                eta: slot.eta,
                tides: &tides,
                history,
            },
        );

        let terminal = self.store.get_terminal(berth.terminal_id)?;
        let suggestion = Suggestion {
            rank: 0,
            berth_id: berth.id,
            berth_name: berth.name.clone(),
            terminal_name: terminal.name,
            score: breakdown.total,
            confidence: confidence(breakdown.total),
            proposed_eta: slot.eta,
            proposed_etd: slot.etd,
            estimated_wait_minutes: slot.waiting_minutes,
            reasoning: reasoning(&breakdown, self.scorer.weights()),
            violations: report.soft_violations(),
        };
        Ok(Some((suggestion, breakdown)))
    }

    /// Commit an allocation at an exact window
    ///
    /// Hard constraints are re-validated at the window as a race guard. A
    /// `TimeConflict` from the store is retried once with a fresh slot from
    /// the finder; a standoff with a Window-class claim yields enumerated
    /// preemption options instead.
    #[instrument(skip(self, request), fields(vessel = %request.vessel_id, berth = %request.berth_id))]
    pub async fn allocate(&self, request: AllocateRequest) -> EngineResult<AllocationOutcome> {
        let deadline = StdDuration::from_secs(self.config.allocate_deadline_secs);
        tokio::time::timeout(deadline, async { self.allocate_inner(request) })
            .await
            .map_err(|_| EngineError::Timeout)?
    }

    fn allocate_inner(&self, request: AllocateRequest) -> EngineResult<AllocationOutcome> {
        let vessel = self.store.get_vessel(request.vessel_id)?;
        let berth = self.store.get_berth(request.berth_id)?;
        let schedules = self.store.schedules_for_berth(berth.id);

        let report =
            self.validate_window(&vessel, &berth, request.eta, request.etd, &schedules, None)?;
        let non_availability_hard = report
            .violations
            .iter()
            .find(|v| v.hard && v.layer != 2);
        if let Some(v) = non_availability_hard {
            return Err(EngineError::ConstraintViolationHard {
                rule: v.rule.to_string(),
                message: v.message.clone(),
            });
        }

        let draft = ScheduleDraft {
            vessel_id: vessel.id,
            berth_id: berth.id,
            eta: request.eta,
            etd: request.etd,
            optimization_score: None,
            priority_weight: vessel.priority_weight(),
            notes: request.notes.clone(),
        };

        match self.store.allocate(draft.clone()) {
            Ok(schedule) => {
                self.publish_schedule(&schedule, ScheduleChange::Created);
                info!(schedule = %schedule.id, "allocation committed");
                Ok(AllocationOutcome::Committed(schedule))
            }
            Err(EngineError::TimeConflict { conflicts }) => {
                if let Some(options) =
                    self.window_standoff(&vessel, &request, &conflicts)?
                {
                    if self.config.auto_choose_cheapest {
                        if let Some(cheapest) = options.first().cloned() {
                            return self
                                .commit_preemption(&vessel, &request, &cheapest)
                                .map(AllocationOutcome::Committed);
                        }
                    }
                    return Ok(AllocationOutcome::WindowOptions(options));
                }
                self.retry_allocation(&vessel, &berth, draft, conflicts)
            }
            Err(e) => Err(e),
        }
    }

    /// One retry as a race guard: re-run the slot finder and commit only if
    /// it hands back the requested window (the earlier conflict was stale)
    fn retry_allocation(
        &self,
        vessel: &Vessel,
        berth: &Berth,
        draft: ScheduleDraft,
        first_conflicts: Vec<ScheduleId>,
    ) -> EngineResult<AllocationOutcome> {
        let preferred = draft.eta.max(self.clock.now());
        let dwell = (draft.etd - draft.eta).num_minutes();
        let schedules = self.store.schedules_for_berth(berth.id);
        let maintenance = self.store.maintenance_for(berth.id);
        let tides = self.tides_for_berth(berth)?;
        let tidal_windows = if self.validator.needs_tide(vessel, berth) {
            Some(self.validator.tidal_windows(vessel, berth, &tides))
        } else {
            None
        };
        let query = SlotQuery {
            schedules: &schedules,
            maintenance: &maintenance,
            tidal_windows: tidal_windows.as_deref(),
        };
        let slot: Slot = match self.slots.find(vessel, preferred, dwell, &query) {
            Ok(slot) => slot,
            Err(_) => {
                return Err(EngineError::TimeConflict {
                    conflicts: first_conflicts,
                })
            }
        };
        if slot.eta != draft.eta {
            // The window is genuinely taken; surface the conflict.
            return Err(EngineError::TimeConflict {
                conflicts: first_conflicts,
            });
        }
        let retry = ScheduleDraft {
            eta: slot.eta,
            etd: slot.etd,
            ..draft
        };
        match self.store.allocate(retry) {
            Ok(schedule) => {
                self.publish_schedule(&schedule, ScheduleChange::Created);
                info!(schedule = %schedule.id, "allocation committed on retry");
                Ok(AllocationOutcome::Committed(schedule))
            }
            Err(e) => Err(e),
        }
    }

    /// Detect a Window-class standoff and enumerate its options
    fn window_standoff(
        &self,
        vessel: &Vessel,
        request: &AllocateRequest,
        conflicts: &[ScheduleId],
    ) -> EngineResult<Option<Vec<PreemptionOption>>> {
        let occupant_id = match conflicts.first() {
            Some(id) => *id,
            None => return Ok(None),
        };
        let occupant = self.store.get_schedule(occupant_id)?;
        let window_weight = PriorityClass::Window.weight();

        let incoming_window_claim = vessel.priority_class == PriorityClass::Window
            && occupant.priority_weight < window_weight;
        let override_claim = request.priority_override
            && vessel.priority_class.may_override_window()
            && occupant.priority_weight == window_weight;
        if !incoming_window_claim && !override_claim {
            return Ok(None);
        }

        let mut options = Vec::new();

        // Expedite: no schedule change; the incoming call absorbs the wait.
        let wait = (occupant.etd - request.eta).num_minutes().max(0);
        options.push(PreemptionOption {
            kind: PreemptionKind::Expedite,
            cost_minutes: wait,
            occupant: occupant.id,
            description: format!("hold arrival until schedule {} departs", occupant.id),
        });

        // Shift: move the occupant to its next-best berth.
        if let Ok(Some(shift_cost)) = self.shift_cost(&occupant, request) {
            options.push(PreemptionOption {
                kind: PreemptionKind::ShiftCurrent,
                cost_minutes: shift_cost + REALLOCATION_OVERHEAD_MINUTES,
                occupant: occupant.id,
                description: format!("re-berth schedule {} at an alternate berth", occupant.id),
            });
        }

        // Truncate: cut the occupant's stay at the window start.
        let cut = (occupant.etd - request.eta).num_minutes().max(0);
        if request.eta > occupant.eta {
            options.push(PreemptionOption {
                kind: PreemptionKind::TruncateCurrent,
                cost_minutes: cut,
                occupant: occupant.id,
                description: format!(
                    "truncate schedule {} to depart by {}",
                    occupant.id, request.eta
                ),
            });
        }

        options.sort_by_key(|o| o.cost_minutes);
        Ok(Some(options))
    }

    /// Added waiting a shift would impose on the occupant
    fn shift_cost(
        &self,
        occupant: &Schedule,
        request: &AllocateRequest,
    ) -> EngineResult<Option<i64>> {
        let occupant_vessel = self.store.get_vessel(occupant.vessel_id)?;
        let dwell = (occupant.etd - occupant.eta).num_minutes();
        for berth in self
            .store
            .get_compatible_berths(occupant_vessel.loa, occupant_vessel.draft)
        {
            if berth.id == request.berth_id {
                continue;
            }
            if !self.validator.screen(&occupant_vessel, &berth).hard_passed {
                continue;
            }
            let schedules = self.store.schedules_for_berth(berth.id);
            let maintenance = self.store.maintenance_for(berth.id);
            let tides = self.tides_for_berth(&berth)?;
            let tidal_windows = if self.validator.needs_tide(&occupant_vessel, &berth) {
                Some(
                    self.validator
                        .tidal_windows(&occupant_vessel, &berth, &tides),
                )
            } else {
                None
            };
            let query = SlotQuery {
                schedules: &schedules,
                maintenance: &maintenance,
                tidal_windows: tidal_windows.as_deref(),
            };
            if let Ok(slot) = self
                .slots
                .find(&occupant_vessel, occupant.eta, dwell, &query)
            {
                return Ok(Some(slot.waiting_minutes));
            }
        }
        Ok(None)
    }

    /// Apply one preemption option and commit the incoming allocation
    fn commit_preemption(
        &self,
        vessel: &Vessel,
        request: &AllocateRequest,
        option: &PreemptionOption,
    ) -> EngineResult<Schedule> {
        let occupant = self.store.get_schedule(option.occupant)?;
        match option.kind {
            PreemptionKind::Expedite => {
                let eta = occupant.etd;
                let etd = eta + (request.etd - request.eta);
                let schedule = self.store.allocate(ScheduleDraft {
                    vessel_id: vessel.id,
                    berth_id: request.berth_id,
                    eta,
                    etd,
                    optimization_score: None,
                    priority_weight: vessel.priority_weight(),
                    notes: request.notes.clone(),
                })?;
                self.publish_schedule(&schedule, ScheduleChange::Created);
                Ok(schedule)
            }
            PreemptionKind::ShiftCurrent => {
                let occupant_vessel = self.store.get_vessel(occupant.vessel_id)?;
                let dwell = (occupant.etd - occupant.eta).num_minutes();
                let mut shifted = None;
                for berth in self
                    .store
                    .get_compatible_berths(occupant_vessel.loa, occupant_vessel.draft)
                {
                    if berth.id == request.berth_id
                        || !self.validator.screen(&occupant_vessel, &berth).hard_passed
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
                    if let Ok(slot) = self
                        .slots
                        .find(&occupant_vessel, occupant.eta, dwell, &query)
                    {
                        shifted = Some((berth.id, slot));
                        break;
                    }
                }
                let (alt_berth, slot) = shifted.ok_or(EngineError::NoCompatibleBerth)?;
                let moved = self
                    .store
                    .reschedule(occupant.id, alt_berth, slot.eta, slot.etd)?;
                self.publish_schedule(&moved, ScheduleChange::Rescheduled);
                let schedule = self.store.allocate(ScheduleDraft {
                    vessel_id: vessel.id,
                    berth_id: request.berth_id,
                    eta: request.eta,
                    etd: request.etd,
                    optimization_score: None,
                    priority_weight: vessel.priority_weight(),
                    notes: request.notes.clone(),
                })?;
                self.publish_schedule(&schedule, ScheduleChange::Created);
                Ok(schedule)
            }
            PreemptionKind::TruncateCurrent => {
                let truncated = self.store.reschedule(
                    occupant.id,
                    occupant.berth_id,
                    occupant.eta,
                    request.eta,
                )?;
                self.publish_schedule(&truncated, ScheduleChange::Rescheduled);
                let schedule = self.store.allocate(ScheduleDraft {
                    vessel_id: vessel.id,
                    berth_id: request.berth_id,
                    eta: request.eta,
                    etd: request.etd,
                    optimization_score: None,
                    priority_weight: vessel.priority_weight(),
                    notes: request.notes.clone(),
                })?;
                self.publish_schedule(&schedule, ScheduleChange::Created);
                Ok(schedule)
            }
        }
    }

    /// Cancel and re-create in one store transaction
    pub fn reschedule(
        &self,
        schedule_id: ScheduleId,
        new_berth: crate::domain::BerthId,
        new_eta: DateTime<Utc>,
        new_etd: DateTime<Utc>,
    ) -> EngineResult<Schedule> {
        let moved = self
            .store
            .reschedule(schedule_id, new_berth, new_eta, new_etd)?;
        self.publish_schedule(&moved, ScheduleChange::Rescheduled);
        Ok(moved)
    }

    /// Record actual arrival and publish the change
    pub fn record_arrival(&self, id: ScheduleId, ata: DateTime<Utc>) -> EngineResult<Schedule> {
        let schedule = self.store.record_arrival(id, ata)?;
        self.publish_schedule(&schedule, ScheduleChange::Updated);
        Ok(schedule)
    }

    /// Record actual berthing and publish the change
    pub fn record_berthing(&self, id: ScheduleId, atb: DateTime<Utc>) -> EngineResult<Schedule> {
        let schedule = self.store.record_berthing(id, atb)?;
        self.publish_schedule(&schedule, ScheduleChange::Updated);
        Ok(schedule)
    }

    /// Record actual departure and publish the change
    pub fn record_departure(&self, id: ScheduleId, atd: DateTime<Utc>) -> EngineResult<Schedule> {
        let schedule = self.store.record_departure(id, atd)?;
        self.publish_schedule(&schedule, ScheduleChange::Updated);
        Ok(schedule)
    }

    /// Cancel a schedule and publish the change
    pub fn cancel(&self, id: ScheduleId) -> EngineResult<Schedule> {
        let schedule = self.store.cancel_schedule(id)?;
        self.publish_schedule(&schedule, ScheduleChange::Cancelled);
        Ok(schedule)
    }

    /// Update the live ETA; publishes `eta.updated` plus any raised alert
    pub fn update_eta(
        &self,
        id: ScheduleId,
        new_eta: DateTime<Utc>,
        new_predicted: Option<DateTime<Utc>>,
    ) -> EngineResult<Schedule> {
        let outcome = self.store.update_eta(id, new_eta, new_predicted)?;
        let schedule = outcome.schedule.clone();
        let rooms = self.rooms_for(&schedule);
        self.bus.publish(
            EventPayload::EtaUpdated {
                schedule_id: schedule.id,
                predicted_eta: schedule.predicted_eta,
                deviation_minutes: (schedule.predicted_eta - schedule.eta).num_minutes(),
            },
            rooms.clone(),
        );
        if let Some(alert) = outcome.alert {
            self.bus
                .publish(EventPayload::AlertRaised { alert }, rooms.clone());
        }
        if let Some(conflict) = outcome.conflict {
            self.bus
                .publish(EventPayload::ConflictDetected { conflict }, rooms);
        }
        Ok(schedule)
    }

    fn validate_window(
        &self,
        vessel: &Vessel,
        berth: &Berth,
        eta: DateTime<Utc>,
        etd: DateTime<Utc>,
        schedules: &[Schedule],
        ignore: Option<ScheduleId>,
    ) -> EngineResult<crate::constraints::ValidationReport> {
        let maintenance = self.store.maintenance_for(berth.id);
        let tides = self.tides_for_berth(berth)?;
        let pilots = self
            .store
            .available_resources(ResourceKind::Pilot, eta, etd)
            .len() as u32;
        let tugs = self.store.available_resources(ResourceKind::Tug, eta, etd);
        let ctx = ValidationContext {
            berth_schedules: schedules,
            maintenance: &maintenance,
            tides: &tides,
            pilots_available: pilots,
            tugs_available: &tugs,
            weather: None,
            ignore_schedule: ignore,
        };
        Ok(self
            .validator
            .validate(vessel, berth, eta, etd, &ctx, ValidationMode::Exhaustive))
    }

    fn tides_for_berth(&self, berth: &Berth) -> EngineResult<Vec<TidalReading>> {
        let terminal = self.store.get_terminal(berth.terminal_id)?;
        Ok(self.store.tidal_readings(terminal.port_id))
    }

    fn rooms_for(&self, schedule: &Schedule) -> Vec<Room> {
        let mut rooms = vec![Room::Vessel(schedule.vessel_id)];
        if let Ok(berth) = self.store.get_berth(schedule.berth_id) {
            rooms.push(Room::Terminal(berth.terminal_id));
            if let Ok(terminal) = self.store.get_terminal(berth.terminal_id) {
                if let Ok(port) = self.store.get_port(terminal.port_id) {
                    rooms.push(Room::Port(port.code));
                }
            }
        }
        rooms
    }

    fn publish_schedule(&self, schedule: &Schedule, change: ScheduleChange) {
        let rooms = self.rooms_for(schedule);
        self.bus.publish(
            EventPayload::ScheduleChanged {
                schedule: schedule.clone(),
                change,
            },
            rooms,
        );
    }
}

fn confidence(total: f64) -> Confidence {
    if total >= 80.0 {
        Confidence::High
    } else if total >= 60.0 {
        Confidence::Medium
    } else {
        Confidence::Low
    }
}

fn impact_of(sub_score: f64) -> Impact {
    if sub_score >= 0.85 {
        Impact::Positive
    } else if sub_score <= 0.5 {
        Impact::Negative
    } else {
        Impact::Neutral
    }
}

/// Structured factor list for one scored candidate
fn reasoning(breakdown: &ScoreBreakdown, weights: &ScoringWeights) -> Vec<ReasoningFactor> {
    vec![
        ReasoningFactor {
            factor: "physical_fit".into(),
            impact: impact_of(breakdown.physical_fit),
            weight: weights.physical,
            message: format!("fit margin score {}", round2(breakdown.physical_fit)),
        },
        ReasoningFactor {
            factor: "type_match".into(),
            impact: impact_of(breakdown.type_match),
            weight: weights.type_match,
            message: format!("berth type affinity {}", round2(breakdown.type_match)),
        },
        ReasoningFactor {
            factor: "waiting_time".into(),
            impact: impact_of(breakdown.waiting),
            weight: weights.waiting,
            message: format!("waiting score {}", round2(breakdown.waiting)),
        },
        ReasoningFactor {
            factor: "crane_adequacy".into(),
            impact: impact_of(breakdown.crane_adequacy),
            weight: weights.cranes,
            message: format!("crane coverage {}", round2(breakdown.crane_adequacy)),
        },
        ReasoningFactor {
            factor: "historical_performance".into(),
            impact: impact_of(breakdown.history),
            weight: weights.history,
            message: format!("history score {}", round2(breakdown.history)),
        },
        ReasoningFactor {
            factor: "tidal_compatibility".into(),
            impact: impact_of(breakdown.tide),
            weight: weights.tide,
            message: format!("tidal score {}", round2(breakdown.tide)),
        },
    ]
}
