//! Compatibility scoring
//!
//! Produces a weighted 0-100 score for a (vessel, berth, proposed window)
//! triple from six sub-scores: physical fit, type match, waiting time,
//! crane adequacy, historical performance, tidal compatibility. Weights are
//! configurable and must sum to 100. Ties inside half a point resolve
//! deterministically: physical fit, then waiting, then berth id.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::ScoringWeights;
use crate::domain::{Berth, BerthType, TidalReading, Vessel, VesselType};
use crate::store::HistorySummary;

/// Draft at or below which tide never constrains a call, meters
const TIDE_FREE_DRAFT: f64 = 10.0;

/// Sub-scores (0-1) and the weighted total (0-100)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub physical_fit: f64,
    pub type_match: f64,
    pub waiting: f64,
    pub crane_adequacy: f64,
    pub history: f64,
    pub tide: f64,
    /// Weighted total, rounded to two fractional digits
    pub total: f64,
}

/// Inputs that vary per candidate slot
#[derive(Debug, Clone, Copy)]
pub struct SlotContext<'a> {
    /// Waiting imposed by the proposed slot, minutes
    pub waiting_minutes: i64,
    /// Proposed arrival, for the tidal sample lookup
    pub eta: DateTime<Utc>,
    /// Tidal series of the port
    pub tides: &'a [TidalReading],
    /// Completed-call summary, when the vessel has called before
    pub history: Option<HistorySummary>,
}

/// The scoring engine
#[derive(Debug, Clone)]
pub struct ScoringEngine {
    weights: ScoringWeights,
}

impl ScoringEngine {
    pub fn new(weights: ScoringWeights) -> Self {
        Self { weights }
    }

    /// Score a candidate; every sub-score lands in [0, 1]
    pub fn score(&self, vessel: &Vessel, berth: &Berth, slot: &SlotContext<'_>) -> ScoreBreakdown {
        let physical_fit = physical_fit(vessel, berth);
        let type_match = type_match(vessel.vessel_type, berth.berth_type);
        let waiting = waiting_score(slot.waiting_minutes);
        let crane_adequacy = crane_adequacy(vessel, berth);
        let history = history_score(slot.history);
        let tide = tidal_score(vessel, slot.eta, slot.tides);

        let total = self.weights.physical * physical_fit
            + self.weights.type_match * type_match
            + self.weights.waiting * waiting
            + self.weights.cranes * crane_adequacy
            + self.weights.history * history
            + self.weights.tide * tide;

        ScoreBreakdown {
            physical_fit,
            type_match,
            waiting,
            crane_adequacy,
            history,
            tide,
            total: round2(total),
        }
    }

    /// Weights in effect
    pub fn weights(&self) -> &ScoringWeights {
        &self.weights
    }
}

/// Deterministic candidate ordering: score desc; within half a point,
/// physical fit desc, then waiting asc, then berth id asc
pub fn rank_candidates(
    a: (&ScoreBreakdown, i64, u64),
    b: (&ScoreBreakdown, i64, u64),
) -> Ordering {
    let (sa, wait_a, berth_a) = a;
    let (sb, wait_b, berth_b) = b;
    if (sa.total - sb.total).abs() > 0.5 {
        return sb.total.total_cmp(&sa.total);
    }
    sb.physical_fit
        .total_cmp(&sa.physical_fit)
        .then(wait_a.cmp(&wait_b))
        .then(berth_a.cmp(&berth_b))
}

/// Margin band for one axis: ideal 10-25 %, tight below, loose above
fn margin_score(margin: f64) -> f64 {
    if margin < 0.0 {
        0.0
    } else if margin < 0.05 {
        0.70
    } else if margin < 0.10 {
        0.85
    } else if margin <= 0.25 {
        1.0
    } else if margin <= 0.40 {
        0.9
    } else {
        0.8
    }
}

fn physical_fit(vessel: &Vessel, berth: &Berth) -> f64 {
    let length_margin = (berth.max_loa - vessel.loa) / berth.max_loa;
    let draft_margin = (berth.max_draft - vessel.draft) / berth.max_draft;
    if length_margin < 0.0 || draft_margin < 0.0 {
        return 0.0;
    }
    (margin_score(length_margin) + margin_score(draft_margin)) / 2.0
}

fn type_match(vessel: VesselType, berth: BerthType) -> f64 {
    use BerthType as B;
    use VesselType as V;
    match (vessel, berth) {
        (V::Container, B::Container)
        | (V::Bulk, B::Bulk)
        | (V::Tanker, B::Liquid)
        | (V::Lng, B::Liquid)
        | (V::RoRo, B::RoRo)
        | (V::General, B::General) => 1.0,
        (_, B::Multipurpose) => 0.8,
        (V::Container, B::General) | (V::General, B::Container) => 0.6,
        (V::Bulk, B::General) | (V::General, B::Bulk) | (V::RoRo, B::General) => 0.5,
        (V::Tanker, B::Bulk) | (V::Bulk, B::Liquid) => 0.3,
        _ => 0.4,
    }
}

/// Step function over imposed waiting minutes
fn waiting_score(waiting_minutes: i64) -> f64 {
    match waiting_minutes {
        m if m <= 0 => 1.0,
        m if m <= 30 => 0.95,
        m if m <= 60 => 0.85,
        m if m <= 120 => 0.70,
        m if m <= 240 => 0.50,
        m if m <= 480 => 0.30,
        _ => 0.10,
    }
}

/// Cranes the call is estimated to need, from type and cargo volume
pub fn cranes_required(vessel: &Vessel) -> u32 {
    match vessel.vessel_type {
        VesselType::Container => match vessel.cargo_volume {
            Some(teu) if teu > 5_000.0 => 3,
            Some(teu) if teu > 2_000.0 => 2,
            _ => 1,
        },
        VesselType::Bulk => match vessel.cargo_volume {
            Some(mt) if mt > 50_000.0 => 2,
            _ => 1,
        },
        _ => 1,
    }
}

fn crane_adequacy(vessel: &Vessel, berth: &Berth) -> f64 {
    let required = cranes_required(vessel) as f64;
    (berth.number_of_cranes as f64 / required).min(1.0)
}

fn history_score(history: Option<HistorySummary>) -> f64 {
    match history {
        Some(h) => {
            0.4 * (h.visits as f64 / 10.0).min(1.0) + 0.6 * (h.avg_eta_accuracy_pct / 100.0)
        }
        None => 0.5,
    }
}

fn tidal_score(vessel: &Vessel, eta: DateTime<Utc>, tides: &[TidalReading]) -> f64 {
    if vessel.draft <= TIDE_FREE_DRAFT {
        return 1.0;
    }
    match crate::domain::nearest_reading(tides, eta) {
        Some(reading) => {
            let height = reading.height_meters;
            if height >= vessel.draft + 1.0 {
                1.0
            } else if height > vessel.draft {
                0.5 + 0.5 * (height - vessel.draft)
            } else {
                0.0
            }
        }
        // No samples: neither confirmed nor ruled out.
        None => 0.5,
    }
}

/// Round half away from zero to two fractional digits
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BerthId, CargoType, PriorityClass, TerminalId, VesselId};
    use test_case::test_case;

    fn vessel(loa: f64, draft: f64) -> Vessel {
        Vessel {
            id: VesselId(1),
            name: "Test".into(),
            imo: None,
            mmsi: None,
            vessel_type: VesselType::Container,
            loa,
            beam: 32.0,
            draft,
            air_draft: None,
            gross_tonnage: Some(60_000),
            cargo_type: CargoType::Container,
            cargo_volume: Some(4_000.0),
            priority_class: PriorityClass::Fcfs,
            hazmat_class: None,
            reefer_demand: None,
        }
    }

    fn berth(id: u64, max_loa: f64, max_draft: f64, cranes: u32) -> Berth {
        Berth {
            id: BerthId(id),
            terminal_id: TerminalId(1),
            name: format!("B{}", id),
            code: format!("B{}", id),
            length: max_loa,
            max_draft,
            max_loa,
            max_beam: None,
            max_air_draft: None,
            max_gt: None,
            charted_depth: None,
            berth_type: BerthType::Container,
            cargo_types_allowed: vec![CargoType::Container],
            number_of_cranes: cranes,
            crane_max_outreach: None,
            fender_capacity: None,
            bollard_swl: None,
            reefer_plugs: None,
            dg_certified: false,
            active: true,
        }
    }

    fn slot(waiting: i64) -> SlotContext<'static> {
        SlotContext {
            waiting_minutes: waiting,
            eta: chrono::Utc::now(),
            tides: &[],
            history: None,
        }
    }

    #[test_case(-0.1, 0.0; "negative margin disqualifies")]
    #[test_case(0.02, 0.70; "very tight")]
    #[test_case(0.07, 0.85; "tight")]
    #[test_case(0.15, 1.0; "ideal")]
    #[test_case(0.30, 0.9; "loose")]
    #[test_case(0.55, 0.8; "very loose")]
    fn margin_bands(margin: f64, expected: f64) {
        assert_eq!(margin_score(margin), expected);
    }

    #[test_case(0, 1.0)]
    #[test_case(30, 0.95)]
    #[test_case(45, 0.85)]
    #[test_case(120, 0.70)]
    #[test_case(240, 0.50)]
    #[test_case(480, 0.30)]
    #[test_case(481, 0.10)]
    fn waiting_steps(minutes: i64, expected: f64) {
        assert_eq!(waiting_score(minutes), expected);
    }

    #[test]
    fn waiting_dominates_when_all_else_equal() {
        // Three identical berths, waits 0 / 45 / 120 minutes.
        let engine = ScoringEngine::new(ScoringWeights::default());
        let v = vessel(300.0, 11.0);
        let b = berth(1, 350.0, 13.0, 3);
        let totals: Vec<f64> = [0, 45, 120]
            .into_iter()
            .map(|w| engine.score(&v, &b, &slot(w)).total)
            .collect();
        assert!(totals[0] > totals[1] && totals[1] > totals[2]);
        assert!(totals[0] - totals[1] >= 2.0);
        assert!(totals[1] - totals[2] >= 2.0);
    }

    #[test]
    fn crane_demand_tiers() {
        let mut v = vessel(300.0, 11.0);
        v.cargo_volume = Some(6_000.0);
        assert_eq!(cranes_required(&v), 3);
        v.cargo_volume = Some(3_000.0);
        assert_eq!(cranes_required(&v), 2);
        v.vessel_type = VesselType::Bulk;
        v.cargo_volume = Some(80_000.0);
        assert_eq!(cranes_required(&v), 2);
    }

    #[test]
    fn tie_break_prefers_fit_then_waiting_then_id() {
        let a = ScoreBreakdown {
            physical_fit: 1.0,
            type_match: 1.0,
            waiting: 1.0,
            crane_adequacy: 1.0,
            history: 0.5,
            tide: 1.0,
            total: 90.0,
        };
        let mut b = a.clone();
        b.total = 90.3; // within the 0.5 tie band
        b.physical_fit = 0.9;
        // Same band: higher physical fit wins despite the lower total.
        assert_eq!(
            rank_candidates((&a, 10, 2), (&b, 0, 1)),
            Ordering::Less
        );
        // Identical breakdowns: lower berth id wins.
        assert_eq!(rank_candidates((&a, 10, 2), (&a, 10, 1)), Ordering::Greater);
    }

    #[test]
    fn shallow_draft_ignores_tide() {
        let v = vessel(300.0, 9.5);
        assert_eq!(tidal_score(&v, chrono::Utc::now(), &[]), 1.0);
    }
}
