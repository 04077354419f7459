//! Constraint validator
//!
//! Evaluates the six-layer hard/soft rule hierarchy for a
//! (vessel, berth, window) triple. Failing any HARD rule disqualifies the
//! pair; soft breaches are carried as warnings. Rule codes are stable and
//! surface unchanged through the API.
//!
//! Layer order: vessel physical and cargo fit, berth availability,
//! resources, temporal/environmental, priority/commercial, navigation
//! safety.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{TideConfig, UkcConfig};
use crate::domain::{
    windows_overlap, Berth, MaintenanceWindow, PriorityClass, Resource, Schedule, TidalReading,
    TideType, Vessel,
};

/// Squat allowance as a fraction of static draft
const SQUAT_FACTOR: f64 = 0.05;
/// Heel allowance as a fraction of static draft
const HEEL_FACTOR: f64 = 0.02;
/// Wave response allowance as a fraction of static draft
const WAVE_FACTOR: f64 = 0.03;

/// Crane wind shutdown limit, m/s
const WIND_SHUTDOWN_MS: f64 = 20.0;
/// Minimum pilotage visibility, meters
const MIN_VISIBILITY_M: f64 = 1_000.0;
/// Soft wind advisory threshold, m/s
const WIND_ADVISORY_MS: f64 = 14.0;

/// Violation severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViolationSeverity {
    Critical,
    High,
    Medium,
    Low,
}

/// One rule breach
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Violation {
    /// Stable rule code, e.g. `V-DIM-001`
    pub rule: String,
    /// Constraint layer 1-6
    pub layer: u8,
    pub severity: ViolationSeverity,
    /// Hard violations disqualify the pair
    pub hard: bool,
    pub message: String,
}

/// Validation outcome
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationReport {
    pub violations: Vec<Violation>,
    pub hard_passed: bool,
}

impl ValidationReport {
    /// Soft breaches only, for suggestion payloads
    pub fn soft_violations(&self) -> Vec<Violation> {
        self.violations.iter().filter(|v| !v.hard).cloned().collect()
    }
}

/// Evaluation mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationMode {
    /// Stop at the first critical violation
    FastReject,
    /// Collect every violation
    Exhaustive,
}

/// Observed weather at the berth, when a feed provides one
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WeatherSample {
    /// Sustained wind, m/s
    pub wind_ms: f64,
    /// Visibility, meters
    pub visibility_m: f64,
}

/// Time-dependent context for a full validation
pub struct ValidationContext<'a> {
    /// Non-terminal schedules on the candidate berth
    pub berth_schedules: &'a [Schedule],
    /// Blocking maintenance windows on the candidate berth
    pub maintenance: &'a [MaintenanceWindow],
    /// Tidal series for the port
    pub tides: &'a [TidalReading],
    /// Pilots free over the window
    pub pilots_available: u32,
    /// Tugs free over the window
    pub tugs_available: &'a [Resource],
    /// Live weather, if any
    pub weather: Option<WeatherSample>,
    /// Schedule to ignore during availability checks (re-validation)
    pub ignore_schedule: Option<crate::domain::ScheduleId>,
}

/// The validator; holds clearance and tidal policy
#[derive(Debug, Clone)]
pub struct ConstraintValidator {
    ukc: UkcConfig,
    tide: TideConfig,
}

impl ConstraintValidator {
    pub fn new(ukc: UkcConfig, tide: TideConfig) -> Self {
        Self { ukc, tide }
    }

    /// Required under-keel clearance for a vessel, meters
    pub fn required_ukc(&self, vessel: &Vessel) -> f64 {
        self.ukc.required_for_gt(vessel.gross_tonnage)
    }

    /// Whether the vessel needs a tidal window at this berth
    pub fn needs_tide(&self, vessel: &Vessel, berth: &Berth) -> bool {
        vessel.draft + self.required_ukc(vessel) > berth.charted_depth()
    }

    /// Qualifying tidal windows: high-tide samples deep enough for the
    /// vessel, widened by the configured half-width
    pub fn tidal_windows(
        &self,
        vessel: &Vessel,
        berth: &Berth,
        tides: &[TidalReading],
    ) -> Vec<(DateTime<Utc>, DateTime<Utc>)> {
        let need = vessel.draft + self.required_ukc(vessel);
        let half = Duration::minutes(self.tide.window_half_width_minutes);
        tides
            .iter()
            .filter(|r| r.tide_type == TideType::High)
            .filter(|r| berth.charted_depth() + r.height_meters >= need)
            .map(|r| (r.tide_time - half, r.tide_time + half))
            .collect()
    }

    /// Time-insensitive screen over layer 1, used to pre-filter candidates
    /// before the slot finder has chosen a window
    pub fn screen(&self, vessel: &Vessel, berth: &Berth) -> ValidationReport {
        let mut violations = Vec::new();
        self.layer1_physical(vessel, berth, &mut violations);
        self.layer1_cargo(vessel, berth, &mut violations);
        finish(violations)
    }

    /// Full six-layer evaluation at an exact window
    pub fn validate(
        &self,
        vessel: &Vessel,
        berth: &Berth,
        eta: DateTime<Utc>,
        etd: DateTime<Utc>,
        ctx: &ValidationContext<'_>,
        mode: ValidationMode,
    ) -> ValidationReport {
        let mut violations = Vec::new();

        self.layer1_physical(vessel, berth, &mut violations);
        if short_circuit(&violations, mode) {
            return finish(violations);
        }
        self.layer1_cargo(vessel, berth, &mut violations);
        if short_circuit(&violations, mode) {
            return finish(violations);
        }
        self.layer2_availability(eta, etd, ctx, &mut violations);
        if short_circuit(&violations, mode) {
            return finish(violations);
        }
        self.layer3_resources(vessel, ctx, &mut violations);
        if short_circuit(&violations, mode) {
            return finish(violations);
        }
        self.layer4_environment(vessel, berth, eta, ctx, &mut violations);
        if short_circuit(&violations, mode) {
            return finish(violations);
        }
        self.layer5_priority(vessel, etd, ctx, &mut violations);
        self.layer6_navigation(vessel, berth, eta, ctx, &mut violations);
        finish(violations)
    }

    fn layer1_physical(&self, vessel: &Vessel, berth: &Berth, out: &mut Vec<Violation>) {
        if vessel.loa > berth.max_loa {
            out.push(hard(
                "V-DIM-001",
                1,
                format!(
                    "LOA {:.1} m exceeds berth limit {:.1} m",
                    vessel.loa, berth.max_loa
                ),
            ));
        }
        if let Some(max_beam) = berth.max_beam {
            if vessel.beam > max_beam {
                out.push(hard(
                    "V-DIM-002",
                    1,
                    format!("beam {:.1} m exceeds berth limit {:.1} m", vessel.beam, max_beam),
                ));
            }
        }
        if vessel.draft > berth.max_draft {
            out.push(hard(
                "V-DIM-003",
                1,
                format!(
                    "draft {:.1} m exceeds berth limit {:.1} m",
                    vessel.draft, berth.max_draft
                ),
            ));
        }
        if let (Some(air), Some(max_air)) = (vessel.air_draft, berth.max_air_draft) {
            if air > max_air {
                out.push(hard(
                    "V-DIM-004",
                    1,
                    format!("air draft {:.1} m exceeds clearance {:.1} m", air, max_air),
                ));
            }
        }
        if let (Some(gt), Some(max_gt)) = (vessel.gross_tonnage, berth.max_gt) {
            if gt > max_gt {
                out.push(hard(
                    "V-DIM-005",
                    1,
                    format!("gross tonnage {} exceeds berth limit {}", gt, max_gt),
                ));
            }
        }
    }

    fn layer1_cargo(&self, vessel: &Vessel, berth: &Berth, out: &mut Vec<Violation>) {
        if !berth.accepts_cargo(vessel.cargo_type) {
            out.push(hard(
                "V-CGO-001",
                1,
                format!("cargo {:?} not worked at berth {}", vessel.cargo_type, berth.code),
            ));
        }
        if vessel.hazmat_class.is_some() && !berth.dg_certified {
            out.push(hard(
                "V-CGO-002",
                1,
                format!("berth {} is not certified for dangerous goods", berth.code),
            ));
        }
        if let Some(demand) = vessel.reefer_demand {
            let plugs = berth.reefer_plugs.unwrap_or(0);
            if demand > plugs {
                out.push(hard(
                    "V-CGO-003",
                    1,
                    format!("reefer demand {} exceeds {} plugs", demand, plugs),
                ));
            }
        }
    }

    fn layer2_availability(
        &self,
        eta: DateTime<Utc>,
        etd: DateTime<Utc>,
        ctx: &ValidationContext<'_>,
        out: &mut Vec<Violation>,
    ) {
        for s in ctx.berth_schedules {
            if Some(s.id) == ctx.ignore_schedule {
                continue;
            }
            if s.occupies_berth() && s.overlaps(eta, etd) {
                out.push(hard(
                    "V-AVL-001",
                    2,
                    format!("window overlaps schedule {}", s.id),
                ));
            }
        }
        for w in ctx.maintenance {
            if w.blocks() && windows_overlap(w.start, w.end, eta, etd) {
                out.push(hard(
                    "V-AVL-002",
                    2,
                    format!("window overlaps maintenance {}", w.id),
                ));
            }
        }
    }

    fn layer3_resources(
        &self,
        vessel: &Vessel,
        ctx: &ValidationContext<'_>,
        out: &mut Vec<Violation>,
    ) {
        let pilots_required = pilots_required(vessel.gross_tonnage);
        if ctx.pilots_available < pilots_required {
            out.push(Violation {
                rule: "V-RES-001".into(),
                layer: 3,
                severity: ViolationSeverity::High,
                hard: true,
                message: format!(
                    "{} pilot(s) required, {} available",
                    pilots_required, ctx.pilots_available
                ),
            });
        }
        let tugs_required = tugs_required(vessel.gross_tonnage);
        if (ctx.tugs_available.len() as u32) < tugs_required {
            out.push(Violation {
                rule: "V-RES-002".into(),
                layer: 3,
                severity: ViolationSeverity::High,
                hard: true,
                message: format!(
                    "{} tug(s) required, {} available",
                    tugs_required,
                    ctx.tugs_available.len()
                ),
            });
        } else if tugs_required > 0 {
            let pull_required = bollard_pull_required(vessel.gross_tonnage);
            let mut pulls: Vec<f64> = ctx
                .tugs_available
                .iter()
                .filter_map(|t| t.bollard_pull)
                .collect();
            pulls.sort_by(|a, b| b.total_cmp(a));
            let pull_sum: f64 = pulls.iter().take(tugs_required as usize).sum();
            if pull_sum < pull_required {
                out.push(Violation {
                    rule: "V-RES-003".into(),
                    layer: 3,
                    severity: ViolationSeverity::High,
                    hard: true,
                    message: format!(
                        "combined bollard pull {:.0} t below required {:.0} t",
                        pull_sum, pull_required
                    ),
                });
            }
        }
    }

    fn layer4_environment(
        &self,
        vessel: &Vessel,
        berth: &Berth,
        eta: DateTime<Utc>,
        ctx: &ValidationContext<'_>,
        out: &mut Vec<Violation>,
    ) {
        if self.needs_tide(vessel, berth) {
            let windows = self.tidal_windows(vessel, berth, ctx.tides);
            let inside = windows.iter().any(|(from, to)| eta >= *from && eta <= *to);
            if !inside {
                out.push(hard(
                    "V-TDE-001",
                    4,
                    format!(
                        "draft {:.1} m plus {:.1} m clearance needs a tidal window at berth {}",
                        vessel.draft,
                        self.required_ukc(vessel),
                        berth.code
                    ),
                ));
            }
        }
        if let Some(weather) = ctx.weather {
            if weather.wind_ms > WIND_SHUTDOWN_MS {
                out.push(hard(
                    "V-WTH-001",
                    4,
                    format!("wind {:.0} m/s above crane shutdown", weather.wind_ms),
                ));
            } else if weather.wind_ms > WIND_ADVISORY_MS {
                out.push(Violation {
                    rule: "V-WTH-003".into(),
                    layer: 4,
                    severity: ViolationSeverity::Low,
                    hard: false,
                    message: format!("wind {:.0} m/s, reduced crane productivity", weather.wind_ms),
                });
            }
            if weather.visibility_m < MIN_VISIBILITY_M {
                out.push(hard(
                    "V-WTH-002",
                    4,
                    format!("visibility {:.0} m below pilotage minimum", weather.visibility_m),
                ));
            }
        }
    }

    fn layer5_priority(
        &self,
        vessel: &Vessel,
        etd: DateTime<Utc>,
        ctx: &ValidationContext<'_>,
        out: &mut Vec<Violation>,
    ) {
        // A Window-class call following closely on this berth narrows the
        // vacation margin; flag it so planners see the contract exposure.
        if vessel.priority_class != PriorityClass::Window {
            let exposure = ctx.berth_schedules.iter().any(|s| {
                Some(s.id) != ctx.ignore_schedule
                    && s.occupies_berth()
                    && s.priority_weight == PriorityClass::Window.weight()
                    && s.eta >= etd
                    && s.eta - etd < Duration::hours(2)
            });
            if exposure {
                out.push(Violation {
                    rule: "V-PRI-001".into(),
                    layer: 5,
                    severity: ViolationSeverity::Medium,
                    hard: false,
                    message: "window-vessel contract starts within 2 h of departure".into(),
                });
            }
        }
    }

    fn layer6_navigation(
        &self,
        vessel: &Vessel,
        berth: &Berth,
        eta: DateTime<Utc>,
        ctx: &ValidationContext<'_>,
        out: &mut Vec<Violation>,
    ) {
        let dynamic_draft = vessel.draft * (1.0 + SQUAT_FACTOR + HEEL_FACTOR + WAVE_FACTOR);
        let tide = crate::domain::nearest_reading(ctx.tides, eta)
            .map(|r| r.height_meters)
            .unwrap_or(0.0);
        let available = berth.charted_depth() + tide;
        if dynamic_draft > available {
            out.push(hard(
                "V-NAV-001",
                6,
                format!(
                    "dynamic draft {:.2} m exceeds available depth {:.2} m",
                    dynamic_draft, available
                ),
            ));
        }
    }
}

fn hard(rule: &str, layer: u8, message: String) -> Violation {
    Violation {
        rule: rule.to_string(),
        layer,
        severity: ViolationSeverity::Critical,
        hard: true,
        message,
    }
}

fn short_circuit(violations: &[Violation], mode: ValidationMode) -> bool {
    mode == ValidationMode::FastReject
        && violations
            .iter()
            .any(|v| v.severity == ViolationSeverity::Critical)
}

fn finish(violations: Vec<Violation>) -> ValidationReport {
    let hard_passed = !violations.iter().any(|v| v.hard);
    ValidationReport {
        violations,
        hard_passed,
    }
}

/// Pilot requirement by gross tonnage
pub fn pilots_required(gross_tonnage: Option<u64>) -> u32 {
    match gross_tonnage {
        Some(gt) if gt > 150_000 => 2,
        _ => 1,
    }
}

/// Tug count tier by gross tonnage
pub fn tugs_required(gross_tonnage: Option<u64>) -> u32 {
    match gross_tonnage {
        Some(gt) if gt > 200_000 => 4,
        Some(gt) if gt > 100_000 => 3,
        Some(gt) if gt > 30_000 => 2,
        _ => 1,
    }
}

/// Combined bollard pull requirement, tonnes
pub fn bollard_pull_required(gross_tonnage: Option<u64>) -> f64 {
    gross_tonnage.map(|gt| gt as f64 / 3_000.0).unwrap_or(10.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        BerthId, BerthType, CargoType, PortId, ResourceId, ResourceKind, TerminalId, VesselId,
        VesselType,
    };
    use chrono::TimeZone;

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

    fn berth(length: f64, max_draft: f64) -> Berth {
        Berth {
            id: BerthId(1),
            terminal_id: TerminalId(1),
            name: "A1".into(),
            code: "A1".into(),
            length,
            max_draft,
            max_loa: length,
            max_beam: Some(50.0),
            max_air_draft: None,
            max_gt: None,
            charted_depth: None,
            berth_type: BerthType::Container,
            cargo_types_allowed: vec![CargoType::Container],
            number_of_cranes: 3,
            crane_max_outreach: None,
            fender_capacity: None,
            bollard_swl: None,
            reefer_plugs: None,
            dg_certified: false,
            active: true,
        }
    }

    fn tug(id: u64, pull: f64) -> Resource {
        Resource {
            id: ResourceId(id),
            kind: ResourceKind::Tug,
            name: format!("Tug {}", id),
            capacity: 1,
            class: None,
            bollard_pull: Some(pull),
            certifications: vec![],
            is_available: true,
        }
    }

    fn ctx<'a>(tugs: &'a [Resource], tides: &'a [TidalReading]) -> ValidationContext<'a> {
        ValidationContext {
            berth_schedules: &[],
            maintenance: &[],
            tides,
            pilots_available: 2,
            tugs_available: tugs,
            weather: None,
            ignore_schedule: None,
        }
    }

    #[test]
    fn oversized_vessel_is_disqualified_by_dimension_rule() {
        // Berth A1: length 350, max draft 13. Vessel LOA 366, draft 11.
        let v = vessel(366.0, 11.0);
        let b = berth(350.0, 13.0);
        let validator = ConstraintValidator::new(UkcConfig::default(), TideConfig::default());
        let report = validator.screen(&v, &b);
        assert!(!report.hard_passed);
        assert!(report.violations.iter().any(|x| x.rule == "V-DIM-001"));
    }

    #[test]
    fn loa_equal_to_cap_is_accepted() {
        let v = vessel(350.0, 11.0);
        let b = berth(350.0, 13.0);
        let validator = ConstraintValidator::new(UkcConfig::default(), TideConfig::default());
        assert!(validator.screen(&v, &b).hard_passed);

        let over = vessel(350.01, 11.0);
        assert!(!validator.screen(&over, &b).hard_passed);
    }

    #[test]
    fn fast_reject_stops_at_the_first_failing_layer() {
        // LOA fails in the physical layer; the cargo mismatch would fail in
        // the next check of the same layer group.
        let mut v = vessel(366.0, 11.0);
        v.cargo_type = CargoType::LiquidBulk;
        let b = berth(350.0, 13.0);
        let validator = ConstraintValidator::new(UkcConfig::default(), TideConfig::default());
        let tugs = [tug(1, 40.0), tug(2, 40.0)];
        let eta = Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap();
        let report = validator.validate(
            &v,
            &b,
            eta,
            eta + Duration::hours(8),
            &ctx(&tugs, &[]),
            ValidationMode::FastReject,
        );
        assert_eq!(report.violations.len(), 1);
        assert_eq!(report.violations[0].rule, "V-DIM-001");

        let full = validator.validate(
            &v,
            &b,
            eta,
            eta + Duration::hours(8),
            &ctx(&tugs, &[]),
            ValidationMode::Exhaustive,
        );
        assert!(full.violations.iter().any(|x| x.rule == "V-CGO-001"));
        assert!(full.violations.len() > 1);
    }

    #[test]
    fn deep_draft_requires_qualifying_tide() {
        let mut v = vessel(300.0, 17.5);
        v.gross_tonnage = Some(90_000); // ukc 1.5
        let mut b = berth(350.0, 18.0);
        b.charted_depth = Some(16.0);
        let validator = ConstraintValidator::new(UkcConfig::default(), TideConfig::default());
        let tides: Vec<TidalReading> = [(6, 0.2, TideType::Low), (12, 3.5, TideType::High), (18, 0.3, TideType::Low)]
            .into_iter()
            .map(|(h, height, tide_type)| TidalReading {
                port_id: PortId(1),
                tide_time: Utc.with_ymd_and_hms(2025, 3, 1, h, 0, 0).unwrap(),
                tide_type,
                height_meters: height,
            })
            .collect();
        let tugs = [tug(1, 40.0), tug(2, 40.0)];

        // 09:00 is outside the 12:00 +/- 90 min window.
        let early = Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap();
        let report = validator.validate(
            &v,
            &b,
            early,
            early + Duration::hours(4),
            &ctx(&tugs, &tides),
            ValidationMode::Exhaustive,
        );
        assert!(report.violations.iter().any(|x| x.rule == "V-TDE-001"));

        // 10:30 is the earliest qualifying instant.
        let in_window = Utc.with_ymd_and_hms(2025, 3, 1, 10, 30, 0).unwrap();
        let report = validator.validate(
            &v,
            &b,
            in_window,
            in_window + Duration::hours(2),
            &ctx(&tugs, &tides),
            ValidationMode::Exhaustive,
        );
        assert!(report.hard_passed, "violations: {:?}", report.violations);
    }

    #[test]
    fn tide_exactly_at_requirement_is_accepted() {
        let mut v = vessel(300.0, 17.5);
        v.gross_tonnage = Some(90_000);
        let mut b = berth(350.0, 18.0);
        b.charted_depth = Some(16.0);
        let validator = ConstraintValidator::new(UkcConfig::default(), TideConfig::default());
        // charted 16.0 + tide 3.0 == draft 17.5 + ukc 1.5 exactly.
        let exact = vec![TidalReading {
            port_id: PortId(1),
            tide_time: Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap(),
            tide_type: TideType::High,
            height_meters: 3.0,
        }];
        assert_eq!(validator.tidal_windows(&v, &b, &exact).len(), 1);

        let below = vec![TidalReading {
            height_meters: 2.99,
            ..exact[0].clone()
        }];
        assert!(validator.tidal_windows(&v, &b, &below).is_empty());
    }

    #[test]
    fn insufficient_tugs_fail_hard() {
        let mut v = vessel(300.0, 11.0);
        v.gross_tonnage = Some(120_000); // three tugs required
        let b = berth(350.0, 13.0);
        let validator = ConstraintValidator::new(UkcConfig::default(), TideConfig::default());
        let tugs = [tug(1, 60.0), tug(2, 60.0)];
        let eta = Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap();
        let report = validator.validate(
            &v,
            &b,
            eta,
            eta + Duration::hours(8),
            &ctx(&tugs, &[]),
            ValidationMode::Exhaustive,
        );
        assert!(report.violations.iter().any(|x| x.rule == "V-RES-002"));
        assert!(!report.hard_passed);
    }

    #[test]
    fn hazmat_needs_dg_certification() {
        let mut v = vessel(200.0, 10.0);
        v.hazmat_class = Some("3".into());
        let b = berth(350.0, 13.0);
        let validator = ConstraintValidator::new(UkcConfig::default(), TideConfig::default());
        let report = validator.screen(&v, &b);
        assert!(report.violations.iter().any(|x| x.rule == "V-CGO-002"));
    }
}
