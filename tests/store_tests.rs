//! Store invariants and lifecycle laws

mod common;

use common::{berth, harness, t, vessel};
use quayside::domain::{ScheduleStatus, VesselId};
use quayside::error::EngineError;
use quayside::store::ScheduleDraft;

fn draft(
    vessel_id: VesselId,
    berth_id: quayside::domain::BerthId,
    eta: chrono::DateTime<chrono::Utc>,
    etd: chrono::DateTime<chrono::Utc>,
) -> ScheduleDraft {
    ScheduleDraft {
        vessel_id,
        berth_id,
        eta,
        etd,
        optimization_score: None,
        priority_weight: 50,
        notes: None,
    }
}

#[test]
fn berth_occupancy_windows_stay_pairwise_disjoint() {
    let h = harness();
    let b = berth(&h, "B1", 300.0, 12.0);
    let v1 = vessel(&h, "One", 250.0, 10.0);
    let v2 = vessel(&h, "Two", 250.0, 10.0);

    h.store.allocate(draft(v1.id, b.id, t(10, 0), t(14, 0))).unwrap();

    for (eta, etd) in [
        (t(9, 0), t(11, 0)),
        (t(11, 0), t(13, 0)),
        (t(13, 0), t(17, 0)),
        (t(9, 0), t(18, 0)),
    ] {
        let result = h.store.allocate(draft(v2.id, b.id, eta, etd));
        assert!(
            matches!(result, Err(EngineError::TimeConflict { .. })),
            "window {} - {} must conflict",
            eta,
            etd
        );
    }

    // Touching at either endpoint is clean.
    h.store.allocate(draft(v2.id, b.id, t(8, 0), t(10, 0))).unwrap();
    h.store.allocate(draft(v2.id, b.id, t(14, 0), t(16, 0))).unwrap();
    assert_eq!(h.store.schedules_for_berth(b.id).len(), 3);
}

#[test]
fn cancelled_schedules_free_their_window() {
    let h = harness();
    let b = berth(&h, "B1", 300.0, 12.0);
    let v1 = vessel(&h, "One", 250.0, 10.0);
    let v2 = vessel(&h, "Two", 250.0, 10.0);

    let s = h.store.allocate(draft(v1.id, b.id, t(10, 0), t(14, 0))).unwrap();
    h.store.cancel_schedule(s.id).unwrap();
    h.store.allocate(draft(v2.id, b.id, t(10, 0), t(14, 0))).unwrap();
}

#[test]
fn departure_appends_exactly_one_history_row() {
    let h = harness();
    let b = berth(&h, "B1", 300.0, 12.0);
    let v = vessel(&h, "Caller", 250.0, 10.0);

    let s = h.store.allocate(draft(v.id, b.id, t(10, 0), t(20, 0))).unwrap();
    h.store.record_arrival(s.id, t(10, 5)).unwrap();
    h.store.record_berthing(s.id, t(10, 50)).unwrap();
    let departed = h.store.record_departure(s.id, t(19, 50)).unwrap();
    assert_eq!(departed.status, ScheduleStatus::Departed);
    assert_eq!(departed.dwell_minutes, 540);

    let history = h.store.history_for_vessel(v.id);
    assert_eq!(history.len(), 1);
    let row = &history[0];
    assert_eq!(row.schedule_id, s.id);
    assert_eq!(row.actual_dwell_minutes, 540);
    assert!(row.actual_dwell_minutes >= 0);
    assert_eq!(row.waiting_minutes, 50);

    // Recording the same departure again leaves everything unchanged.
    h.store.record_departure(s.id, t(19, 50)).unwrap();
    assert_eq!(h.store.history_for_vessel(v.id).len(), 1);
}

#[test]
fn status_only_advances_forward() {
    let h = harness();
    let b = berth(&h, "B1", 300.0, 12.0);
    let v = vessel(&h, "Caller", 250.0, 10.0);
    let s = h.store.allocate(draft(v.id, b.id, t(10, 0), t(20, 0))).unwrap();

    // Skipping arrival is rejected.
    assert!(matches!(
        h.store.record_berthing(s.id, t(10, 30)),
        Err(EngineError::InvalidTransition { .. })
    ));
    h.store.record_arrival(s.id, t(10, 0)).unwrap();
    // Going back to arrival with a different time is rejected.
    assert!(matches!(
        h.store.record_arrival(s.id, t(11, 0)),
        Err(EngineError::InvalidTransition { .. })
    ));
    h.store.record_berthing(s.id, t(10, 30)).unwrap();
    h.store.record_departure(s.id, t(19, 0)).unwrap();
    // Departed is terminal, even for cancel.
    assert!(h.store.cancel_schedule(s.id).is_err());
}

#[test]
fn at_most_one_berthed_schedule_per_vessel() {
    let h = harness();
    let b1 = berth(&h, "B1", 300.0, 12.0);
    let b2 = berth(&h, "B2", 300.0, 12.0);
    let v = vessel(&h, "Caller", 250.0, 10.0);

    let s1 = h.store.allocate(draft(v.id, b1.id, t(8, 0), t(12, 0))).unwrap();
    let s2 = h.store.allocate(draft(v.id, b2.id, t(13, 0), t(18, 0))).unwrap();
    h.store.record_arrival(s1.id, t(8, 0)).unwrap();
    h.store.record_berthing(s1.id, t(8, 10)).unwrap();
    h.store.record_arrival(s2.id, t(13, 0)).unwrap();

    // The first stay must complete before the vessel is alongside again.
    assert!(matches!(
        h.store.record_berthing(s2.id, t(13, 5)),
        Err(EngineError::Validation(_))
    ));
    h.store.record_departure(s1.id, t(12, 0)).unwrap();
    h.store.record_berthing(s2.id, t(13, 5)).unwrap();
    let berthed = h
        .store
        .active_schedules_for_vessel(v.id)
        .into_iter()
        .filter(|s| s.status == ScheduleStatus::Berthed)
        .count();
    assert_eq!(berthed, 1);
}

#[test]
fn reschedule_is_atomic_under_conflict() {
    let h = harness();
    let b1 = berth(&h, "B1", 300.0, 12.0);
    let b2 = berth(&h, "B2", 300.0, 12.0);
    let v1 = vessel(&h, "Mover", 250.0, 10.0);
    let v2 = vessel(&h, "Blocker", 250.0, 10.0);

    let s = h.store.allocate(draft(v1.id, b1.id, t(10, 0), t(14, 0))).unwrap();
    h.store.allocate(draft(v2.id, b2.id, t(10, 0), t(14, 0))).unwrap();

    // Target window is taken: nothing changes, the original stays live.
    let result = h.store.reschedule(s.id, b2.id, t(11, 0), t(15, 0));
    assert!(matches!(result, Err(EngineError::TimeConflict { .. })));
    let unchanged = h.store.get_schedule(s.id).unwrap();
    assert_eq!(unchanged.status, ScheduleStatus::Scheduled);
    assert_eq!(unchanged.berth_id, b1.id);

    // A free window moves it and cancels the original.
    let moved = h.store.reschedule(s.id, b2.id, t(14, 0), t(18, 0)).unwrap();
    assert_eq!(h.store.get_schedule(s.id).unwrap().status, ScheduleStatus::Cancelled);
    assert_eq!(moved.berth_id, b2.id);
}

#[test]
fn eta_update_shifts_prediction_only_and_rechecks_overlap() {
    let h = harness();
    let b = berth(&h, "B1", 300.0, 12.0);
    let v1 = vessel(&h, "Drifter", 250.0, 10.0);
    let v2 = vessel(&h, "Neighbour", 250.0, 10.0);

    let s1 = h.store.allocate(draft(v1.id, b.id, t(10, 0), t(14, 0))).unwrap();
    h.store.allocate(draft(v2.id, b.id, t(14, 0), t(18, 0))).unwrap();

    let outcome = h.store.update_eta(s1.id, s1.eta, Some(t(11, 15))).unwrap();
    // The committed window is untouched; only the prediction moves.
    assert_eq!(outcome.schedule.eta, t(10, 0));
    assert_eq!(outcome.schedule.etd, t(14, 0));
    assert_eq!(outcome.schedule.predicted_eta, t(11, 15));
    // +75 minutes: a high-severity alert and one overlap conflict.
    assert_eq!(
        outcome.alert.map(|a| a.severity),
        Some(quayside::domain::AlertSeverity::High)
    );
    assert!(outcome.conflict.is_some());
}

#[test]
fn small_eta_drift_raises_no_alert() {
    let h = harness();
    let b = berth(&h, "B1", 300.0, 12.0);
    let v = vessel(&h, "Steady", 250.0, 10.0);
    let s = h.store.allocate(draft(v.id, b.id, t(10, 0), t(14, 0))).unwrap();

    let outcome = h.store.update_eta(s.id, s.eta, Some(t(10, 20))).unwrap();
    assert!(outcome.alert.is_none());
    assert!(outcome.conflict.is_none());
}

#[test]
fn clear_all_truncates_schedules_conflicts_and_alerts() {
    let h = harness();
    let b = berth(&h, "B1", 300.0, 12.0);
    let v1 = vessel(&h, "One", 250.0, 10.0);
    let v2 = vessel(&h, "Two", 250.0, 10.0);

    let s1 = h.store.allocate(draft(v1.id, b.id, t(10, 0), t(14, 0))).unwrap();
    h.store.allocate(draft(v2.id, b.id, t(14, 0), t(18, 0))).unwrap();
    h.store.update_eta(s1.id, s1.eta, Some(t(11, 15))).unwrap();
    assert!(!h.store.get_active_alerts().is_empty());
    assert!(!h.store.get_active_conflicts().is_empty());

    h.store.clear_all().unwrap();
    assert!(h.store.get_active_schedules(None).is_empty());
    assert!(h.store.get_active_alerts().is_empty());
    assert!(h.store.get_active_conflicts().is_empty());
    // The registry survives.
    assert_eq!(h.store.list_vessels().len(), 2);
    assert_eq!(h.store.list_berths(None).len(), 1);
}

#[test]
fn duplicate_imo_is_rejected() {
    let h = harness();
    let template = vessel(&h, "Template", 250.0, 10.0);
    let v = quayside::domain::Vessel {
        id: VesselId(0),
        name: "Original".into(),
        imo: Some(9_811_000),
        ..template.clone()
    };
    h.store.create_vessel(v.clone()).unwrap();
    let dup = quayside::domain::Vessel {
        id: VesselId(0),
        name: "Impostor".into(),
        ..v
    };
    assert!(matches!(
        h.store.create_vessel(dup),
        Err(EngineError::Validation(_))
    ));
}

#[test]
fn compatible_berths_filter_on_length_draft_and_active() {
    let h = harness();
    let fits = berth(&h, "FIT", 350.0, 13.0);
    berth(&h, "SHORT", 250.0, 13.0);
    berth(&h, "SHALLOW", 350.0, 9.0);

    let found = h.store.get_compatible_berths(300.0, 11.0);
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, fits.id);
}

#[test]
fn availability_probe_reports_blockers_and_verdict() {
    let h = harness();
    let b = berth(&h, "B1", 300.0, 12.0);
    let v = vessel(&h, "Caller", 250.0, 10.0);
    let s = h.store.allocate(draft(v.id, b.id, t(10, 0), t(14, 0))).unwrap();
    h.store
        .add_maintenance_window(quayside::domain::MaintenanceWindow {
            id: quayside::domain::MaintenanceId(0),
            berth_id: b.id,
            start: t(16, 0),
            end: t(18, 0),
            status: quayside::domain::MaintenanceStatus::Scheduled,
        })
        .unwrap();

    let probe = h.store.check_berth_availability(b.id, t(13, 0), t(17, 0)).unwrap();
    assert!(!probe.available);
    assert_eq!(probe.conflicting_schedules, vec![s.id]);
    assert_eq!(probe.blocking_maintenance.len(), 1);

    let clear = h.store.check_berth_availability(b.id, t(14, 0), t(16, 0)).unwrap();
    assert!(clear.available);
}

#[test]
fn resource_capacity_bounds_concurrent_allocations() {
    let h = harness();
    let b = berth(&h, "B1", 300.0, 12.0);
    let v = vessel(&h, "Caller", 250.0, 10.0);
    let s = h.store.allocate(draft(v.id, b.id, t(10, 0), t(14, 0))).unwrap();

    let tugs = h
        .store
        .available_resources(quayside::domain::ResourceKind::Tug, t(10, 0), t(12, 0));
    assert_eq!(tugs.len(), 4);

    // Committing one tug removes it from the window, but not from a
    // disjoint later window.
    h.store
        .allocate_resource(quayside::domain::ResourceAllocation {
            schedule_id: s.id,
            resource_id: tugs[0].id,
            from: t(10, 0),
            to: t(12, 0),
            quantity: 1,
            status: quayside::domain::AllocationStatus::Allocated,
        })
        .unwrap();
    let during = h
        .store
        .available_resources(quayside::domain::ResourceKind::Tug, t(11, 0), t(12, 0));
    assert_eq!(during.len(), 3);
    let after = h
        .store
        .available_resources(quayside::domain::ResourceKind::Tug, t(12, 0), t(14, 0));
    assert_eq!(after.len(), 4);
}

#[test]
fn long_dwell_blocker_is_found_by_a_late_window_probe() {
    // The overlap walk starts from the probe window minus the longest dwell
    // on record; a stay much longer than the probe must still be visited.
    let h = harness();
    let b = berth(&h, "B1", 300.0, 12.0);
    let v1 = vessel(&h, "Long Stay", 250.0, 10.0);
    let v2 = vessel(&h, "Late Caller", 250.0, 10.0);

    let long_stay = h.store.allocate(draft(v1.id, b.id, t(6, 0), t(20, 0))).unwrap();

    let probe = h.store.check_berth_availability(b.id, t(19, 0), t(21, 0)).unwrap();
    assert!(!probe.available);
    assert_eq!(probe.conflicting_schedules, vec![long_stay.id]);

    let result = h.store.allocate(draft(v2.id, b.id, t(19, 0), t(21, 0)));
    assert!(matches!(result, Err(EngineError::TimeConflict { .. })));

    // Past the long stay's departure the same walk finds nothing.
    let clear = h.store.check_berth_availability(b.id, t(20, 0), t(22, 0)).unwrap();
    assert!(clear.available);
}
