//! Slot finder
//!
//! For a berth and a dwell estimate, finds the earliest non-overlapping
//! `[eta, etd)` at or after the preferred arrival, honoring turnaround
//! buffers, maintenance windows, and (for deep-draft vessels) qualifying
//! tidal windows. Search stops at the configured horizon.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::config::SchedulerConfig;
use crate::domain::{windows_overlap, MaintenanceWindow, Schedule, Vessel, VesselType};
use crate::error::{EngineError, EngineResult};

/// Shift handovers at the port: 06:00, 14:00, 22:00
const HANDOVER_HOURS: [u32; 3] = [6, 14, 22];
/// Soft no-berth zone around a handover, minutes
const HANDOVER_HALF_WIDTH_MINUTES: i64 = 15;

/// A found window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub eta: DateTime<Utc>,
    pub etd: DateTime<Utc>,
    /// Wait imposed relative to the preferred arrival, minutes
    pub waiting_minutes: i64,
}

/// Search context for one berth
pub struct SlotQuery<'a> {
    /// Non-terminal schedules on the berth, ordered by eta
    pub schedules: &'a [Schedule],
    /// Blocking maintenance windows
    pub maintenance: &'a [MaintenanceWindow],
    /// Qualifying tidal windows; `None` when the vessel is not
    /// tide-constrained at this berth
    pub tidal_windows: Option<&'a [(DateTime<Utc>, DateTime<Utc>)]>,
}

/// The slot finder; holds buffer and horizon policy
#[derive(Debug, Clone)]
pub struct SlotFinder {
    config: SchedulerConfig,
}

impl SlotFinder {
    pub fn new(config: SchedulerConfig) -> Self {
        Self { config }
    }

    /// Turnaround buffer after a vessel of this class, minutes
    pub fn buffer_minutes(&self, vessel_type: VesselType) -> i64 {
        match vessel_type {
            VesselType::Container => self.config.buffer_container_minutes,
            VesselType::Bulk => self.config.buffer_bulk_minutes,
            VesselType::Tanker | VesselType::Lng => self.config.buffer_liquid_minutes,
            VesselType::RoRo => self.config.buffer_roro_minutes,
            VesselType::General => self.config.buffer_container_minutes,
        }
    }

    /// Earliest feasible window at or after `preferred_eta`
    pub fn find(
        &self,
        vessel: &Vessel,
        preferred_eta: DateTime<Utc>,
        dwell_minutes: i64,
        query: &SlotQuery<'_>,
    ) -> EngineResult<Slot> {
        if dwell_minutes <= 0 {
            return Err(EngineError::Validation(format!(
                "dwell must be positive, got {} minutes",
                dwell_minutes
            )));
        }
        let buffer = Duration::minutes(self.buffer_minutes(vessel.vessel_type));
        let dwell = Duration::minutes(dwell_minutes);
        let horizon_end = preferred_eta + Duration::days(i64::from(self.config.slot_horizon_days));

        let eta = self.walk(preferred_eta, dwell, buffer, horizon_end, query)?;

        // Soft: dodge shift handovers when the dodge is nearly free.
        let eta = match self.handover_nudge(eta) {
            Some(nudged) if nudged <= horizon_end => {
                match self.walk(nudged, dwell, buffer, horizon_end, query) {
                    Ok(candidate) if candidate == nudged => candidate,
                    _ => eta,
                }
            }
            _ => eta,
        };

        Ok(Slot {
            eta,
            etd: eta + dwell,
            waiting_minutes: (eta - preferred_eta).num_minutes().max(0),
        })
    }

    /// Advance past every blocker; each step moves strictly forward
    fn walk(
        &self,
        start: DateTime<Utc>,
        dwell: Duration,
        buffer: Duration,
        horizon_end: DateTime<Utc>,
        query: &SlotQuery<'_>,
    ) -> EngineResult<DateTime<Utc>> {
        let mut eta = start;
        loop {
            if eta > horizon_end {
                return Err(EngineError::NoSlotFound {
                    horizon_days: self.config.slot_horizon_days,
                });
            }
            let etd = eta + dwell;

            if let Some(windows) = query.tidal_windows {
                let inside = windows.iter().any(|(from, to)| eta >= *from && eta <= *to);
                if !inside {
                    let next_start = windows
                        .iter()
                        .filter(|(from, _)| *from > eta)
                        .map(|(from, _)| *from)
                        .min();
                    match next_start {
                        Some(next) => {
                            eta = next;
                            continue;
                        }
                        None => {
                            return Err(EngineError::NoSlotFound {
                                horizon_days: self.config.slot_horizon_days,
                            })
                        }
                    }
                }
            }

            if let Some(blocking) = query
                .schedules
                .iter()
                .filter(|s| s.occupies_berth() && s.overlaps(eta, etd))
                .max_by_key(|s| s.etd)
            {
                eta = blocking.etd + buffer;
                continue;
            }

            if let Some(window) = query
                .maintenance
                .iter()
                .filter(|w| w.blocks() && windows_overlap(w.start, w.end, eta, etd))
                .max_by_key(|w| w.end)
            {
                eta = window.end;
                continue;
            }

            return Ok(eta);
        }
    }

    /// Next instant clear of a handover zone, when `eta` falls inside one
    /// and leaving costs under 15 minutes
    fn handover_nudge(&self, eta: DateTime<Utc>) -> Option<DateTime<Utc>> {
        for hour in HANDOVER_HOURS {
            let center = eta
                .date_naive()
                .and_hms_opt(hour, 0, 0)?
                .and_utc();
            let zone_start = center - Duration::minutes(HANDOVER_HALF_WIDTH_MINUTES);
            let zone_end = center + Duration::minutes(HANDOVER_HALF_WIDTH_MINUTES);
            if eta >= zone_start && eta < zone_end {
                let cost = zone_end - eta;
                if cost < Duration::minutes(HANDOVER_HALF_WIDTH_MINUTES) {
                    return Some(zone_end);
                }
            }
        }
        None
    }
}
