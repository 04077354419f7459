//! Conflict detection scenarios

mod common;

use std::sync::Arc;

use common::{berth, harness, t, vessel, Harness};
use quayside::config::{ConflictConfig, SchedulerConfig, TideConfig, UkcConfig};
use quayside::conflicts::{ConflictDetector, ResolutionKind};
use quayside::domain::{
    AlertSeverity, ConflictKind, ConflictSeverity, Schedule, ScheduleStatus,
};
use quayside::store::ScheduleDraft;

fn detector(h: &Harness) -> Arc<ConflictDetector> {
    Arc::new(ConflictDetector::new(
        h.store.clone(),
        h.bus.clone(),
        h.clock.clone(),
        ConflictConfig::default(),
        SchedulerConfig::default(),
        UkcConfig::default(),
        TideConfig::default(),
        "NLRTM".into(),
    ))
}

/// Allocate and drive a schedule into the berthed state
fn berthed_schedule(h: &Harness, berth_id: quayside::domain::BerthId) -> Schedule {
    let v = vessel(h, "Overstayer", 250.0, 10.0);
    let schedule = h
        .store
        .allocate(ScheduleDraft {
            vessel_id: v.id,
            berth_id,
            eta: t(8, 0),
            etd: t(12, 0),
            optimization_score: None,
            priority_weight: v.priority_weight(),
            notes: None,
        })
        .unwrap();
    h.store.record_arrival(schedule.id, t(8, 0)).unwrap();
    h.store.record_berthing(schedule.id, t(8, 10)).unwrap()
}

#[tokio::test]
async fn overstay_escalates_through_bands_without_duplicates() {
    let h = harness();
    let b1 = berth(&h, "B1", 300.0, 12.0);
    let schedule = berthed_schedule(&h, b1.id);
    let d = detector(&h);

    let overstay_alerts = |h: &Harness| {
        let mut alerts: Vec<AlertSeverity> = h
            .store
            .get_active_alerts()
            .into_iter()
            .filter(|a| a.alert_type == "overstay")
            .map(|a| a.severity)
            .collect();
        alerts.sort();
        alerts
    };

    // 20 minutes past etd: one warning.
    h.clock.set(t(12, 20));
    d.scan_cycle();
    assert_eq!(overstay_alerts(&h), vec![AlertSeverity::Warning]);

    // A second pass in the same band emits nothing new.
    d.scan_cycle();
    assert_eq!(overstay_alerts(&h).len(), 1);

    // 35 minutes past: high.
    h.clock.set(t(12, 35));
    d.scan_cycle();
    assert_eq!(
        overstay_alerts(&h),
        vec![AlertSeverity::Warning, AlertSeverity::High]
    );

    // 65 minutes past: critical, exactly once.
    h.clock.set(t(13, 5));
    d.scan_cycle();
    d.scan_cycle();
    assert_eq!(
        overstay_alerts(&h),
        vec![AlertSeverity::Warning, AlertSeverity::High, AlertSeverity::Critical]
    );

    // The conflict log mirrors the escalation.
    let overstays: Vec<ConflictSeverity> = h
        .store
        .get_active_conflicts()
        .into_iter()
        .filter(|c| c.kind == ConflictKind::Overstay && c.schedule_id1 == schedule.id)
        .map(|c| c.severity)
        .collect();
    assert_eq!(overstays.len(), 3);
}

#[tokio::test]
async fn departure_reminder_fires_once_inside_two_hours() {
    let h = harness();
    let b1 = berth(&h, "B1", 300.0, 12.0);
    berthed_schedule(&h, b1.id);
    let d = detector(&h);

    // More than two hours out: silent.
    h.clock.set(t(9, 0));
    d.scan_cycle();
    let count = |h: &Harness| {
        h.store
            .get_active_alerts()
            .iter()
            .filter(|a| a.alert_type == "approaching_departure")
            .count()
    };
    assert_eq!(count(&h), 0);

    // 90 minutes out: one info alert, never a duplicate.
    h.clock.set(t(10, 30));
    d.scan_cycle();
    d.scan_cycle();
    assert_eq!(count(&h), 1);
}

#[tokio::test]
async fn predicted_eta_drift_raises_one_overlap_conflict() {
    let h = harness();
    let b1 = berth(&h, "B1", 300.0, 12.0);
    let first = vessel(&h, "First", 250.0, 10.0);
    let second = vessel(&h, "Second", 250.0, 10.0);

    let s1 = h
        .store
        .allocate(ScheduleDraft {
            vessel_id: first.id,
            berth_id: b1.id,
            eta: t(10, 0),
            etd: t(14, 0),
            optimization_score: None,
            priority_weight: first.priority_weight(),
            notes: None,
        })
        .unwrap();
    h.store
        .allocate(ScheduleDraft {
            vessel_id: second.id,
            berth_id: b1.id,
            eta: t(14, 0),
            etd: t(18, 0),
            optimization_score: None,
            priority_weight: second.priority_weight(),
            notes: None,
        })
        .unwrap();

    // A 75-minute slip pushes the predicted window into the neighbour.
    let outcome = h
        .store
        .update_eta(s1.id, s1.eta, Some(t(11, 15)))
        .unwrap();
    assert!(outcome.alert.is_some());
    assert_eq!(outcome.alert.unwrap().severity, AlertSeverity::High);
    assert!(outcome.conflict.is_some());

    // Updating again does not duplicate the conflict row.
    let outcome = h
        .store
        .update_eta(s1.id, s1.eta, Some(t(11, 20)))
        .unwrap();
    assert!(outcome.conflict.is_none());
    let overlaps = h
        .store
        .get_active_conflicts()
        .into_iter()
        .filter(|c| c.kind == ConflictKind::BerthOverlap)
        .count();
    assert_eq!(overlaps, 1);
}

#[tokio::test]
async fn overlap_resolution_options_are_ordered_and_applicable() {
    let h = harness();
    let b1 = berth(&h, "B1", 300.0, 12.0);
    berth(&h, "B2", 300.0, 12.0);
    let first = vessel(&h, "First", 250.0, 10.0);
    let second = vessel(&h, "Second", 250.0, 10.0);

    let s1 = h
        .store
        .allocate(ScheduleDraft {
            vessel_id: first.id,
            berth_id: b1.id,
            eta: t(10, 0),
            etd: t(14, 0),
            optimization_score: None,
            priority_weight: first.priority_weight(),
            notes: None,
        })
        .unwrap();
    let s2 = h
        .store
        .allocate(ScheduleDraft {
            vessel_id: second.id,
            berth_id: b1.id,
            eta: t(14, 0),
            etd: t(18, 0),
            optimization_score: None,
            priority_weight: second.priority_weight(),
            notes: None,
        })
        .unwrap();
    let conflict = h
        .store
        .update_eta(s1.id, s1.eta, Some(t(11, 15)))
        .unwrap()
        .conflict
        .expect("drift must log a conflict");

    let d = detector(&h);
    let options = d.resolution_options(conflict.id).unwrap();
    assert!(!options.is_empty());
    for pair in options.windows(2) {
        assert!(pair[0].impact_score <= pair[1].impact_score);
    }

    // Apply the shift: the lower-priority (later) schedule moves off B1.
    let resolved = d
        .apply_resolution(conflict.id, ResolutionKind::ShiftToAlternateBerth)
        .unwrap();
    assert!(resolved.resolved_at.is_some());
    let remaining = h.store.schedules_for_berth(b1.id);
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, s1.id);
    assert_eq!(
        h.store.get_schedule(s2.id).unwrap().status,
        ScheduleStatus::Cancelled
    );
}

#[tokio::test]
async fn departed_schedules_release_their_debounce_keys() {
    let h = harness();
    let b1 = berth(&h, "B1", 300.0, 12.0);
    let schedule = berthed_schedule(&h, b1.id);
    let d = detector(&h);

    h.clock.set(t(12, 20));
    d.scan_cycle();
    assert_eq!(h.store.get_active_alerts().len(), 1);

    // Departure ends the stay; the next cycle must stay silent and the
    // schedule must leave the berth index.
    h.store.record_departure(schedule.id, t(12, 25)).unwrap();
    h.clock.set(t(12, 40));
    d.scan_cycle();
    let overstays = h
        .store
        .get_active_alerts()
        .into_iter()
        .filter(|a| a.alert_type == "overstay")
        .count();
    assert_eq!(overstays, 1);
    assert!(h.store.schedules_for_berth(b1.id).is_empty());
}
