//! Schedule records and the status state machine
//!
//! Status only advances `Scheduled -> Approaching -> Berthed -> Departed`;
//! `Cancelled` is terminal from any non-departed state. Recording an actual
//! time twice with the same timestamp is a no-op; any other out-of-order
//! transition is rejected.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{windows_overlap, BerthId, ScheduleId, VesselId};
use crate::error::{EngineError, EngineResult};

/// Lifecycle state of a ship call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleStatus {
    /// Planned, vessel not yet arrived
    Scheduled,
    /// Actual arrival recorded, waiting for the berth
    Approaching,
    /// Alongside and working
    Berthed,
    /// Departed; terminal
    Departed,
    /// Cancelled; terminal
    Cancelled,
}

impl ScheduleStatus {
    /// Terminal schedules no longer occupy their berth window
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Departed | Self::Cancelled)
    }
}

impl std::fmt::Display for ScheduleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Scheduled => "scheduled",
            Self::Approaching => "approaching",
            Self::Berthed => "berthed",
            Self::Departed => "departed",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

/// A proposed or executed vessel stay at a berth
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    /// Unique schedule identifier
    pub id: ScheduleId,
    /// Vessel making the call
    pub vessel_id: VesselId,
    /// Allocated berth
    pub berth_id: BerthId,
    /// Estimated time of arrival (window start)
    pub eta: DateTime<Utc>,
    /// Live prediction from the position feed
    pub predicted_eta: DateTime<Utc>,
    /// Estimated time of departure (window end, exclusive)
    pub etd: DateTime<Utc>,
    /// Actual time of arrival
    pub ata: Option<DateTime<Utc>>,
    /// Actual time of berthing
    pub atb: Option<DateTime<Utc>>,
    /// Actual time of departure
    pub atd: Option<DateTime<Utc>>,
    /// Lifecycle state
    pub status: ScheduleStatus,
    /// Planned dwell, minutes
    pub dwell_minutes: i64,
    /// `max(0, atb - eta)` once berthed, minutes
    pub waiting_minutes: Option<i64>,
    /// Compatibility score at allocation time
    pub optimization_score: Option<f64>,
    /// Priority weight frozen at allocation time
    pub priority_weight: u32,
    /// Free-form operator notes
    pub notes: Option<String>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Schedule {
    /// Validate the window invariant `eta < etd`
    pub fn validate(&self) -> EngineResult<()> {
        if self.eta >= self.etd {
            return Err(EngineError::Validation(format!(
                "schedule window is empty or inverted: eta {} >= etd {}",
                self.eta, self.etd
            )));
        }
        Ok(())
    }

    /// Whether this schedule still occupies its berth window
    pub fn occupies_berth(&self) -> bool {
        !self.status.is_terminal()
    }

    /// Half-open overlap against `[from, to)`
    pub fn overlaps(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> bool {
        windows_overlap(self.eta, self.etd, from, to)
    }

    /// Record actual arrival; advances `Scheduled -> Approaching`
    pub fn record_arrival(&mut self, ata: DateTime<Utc>) -> EngineResult<()> {
        if self.ata == Some(ata) {
            return Ok(());
        }
        match self.status {
            ScheduleStatus::Scheduled => {
                self.ata = Some(ata);
                self.status = ScheduleStatus::Approaching;
                Ok(())
            }
            other => Err(EngineError::InvalidTransition {
                from: other.to_string(),
                to: "approaching".into(),
            }),
        }
    }

    /// Record actual berthing; advances `Approaching -> Berthed` and fixes
    /// `waiting_minutes = max(0, atb - eta)`
    pub fn record_berthing(&mut self, atb: DateTime<Utc>) -> EngineResult<()> {
        if self.atb == Some(atb) {
            return Ok(());
        }
        match self.status {
            ScheduleStatus::Approaching => {
                self.atb = Some(atb);
                self.waiting_minutes = Some((atb - self.eta).num_minutes().max(0));
                self.status = ScheduleStatus::Berthed;
                Ok(())
            }
            other => Err(EngineError::InvalidTransition {
                from: other.to_string(),
                to: "berthed".into(),
            }),
        }
    }

    /// Record actual departure; advances `Berthed -> Departed` and fixes the
    /// actual dwell
    pub fn record_departure(&mut self, atd: DateTime<Utc>) -> EngineResult<()> {
        if self.atd == Some(atd) {
            return Ok(());
        }
        match self.status {
            ScheduleStatus::Berthed => {
                let atb = self.atb.ok_or_else(|| {
                    EngineError::Validation("berthed schedule has no atb".into())
                })?;
                if atd < atb {
                    return Err(EngineError::Validation(format!(
                        "atd {} precedes atb {}",
                        atd, atb
                    )));
                }
                self.atd = Some(atd);
                self.dwell_minutes = (atd - atb).num_minutes();
                self.status = ScheduleStatus::Departed;
                Ok(())
            }
            other => Err(EngineError::InvalidTransition {
                from: other.to_string(),
                to: "departed".into(),
            }),
        }
    }

    /// Cancel the call; terminal from any non-departed state
    pub fn cancel(&mut self) -> EngineResult<()> {
        match self.status {
            ScheduleStatus::Departed => Err(EngineError::InvalidTransition {
                from: "departed".into(),
                to: "cancelled".into(),
            }),
            ScheduleStatus::Cancelled => Ok(()),
            _ => {
                self.status = ScheduleStatus::Cancelled;
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn schedule() -> Schedule {
        let eta = Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap();
        Schedule {
            id: ScheduleId(1),
            vessel_id: VesselId(1),
            berth_id: BerthId(1),
            eta,
            predicted_eta: eta,
            etd: Utc.with_ymd_and_hms(2025, 3, 1, 22, 0, 0).unwrap(),
            ata: None,
            atb: None,
            atd: None,
            status: ScheduleStatus::Scheduled,
            dwell_minutes: 720,
            waiting_minutes: None,
            optimization_score: None,
            priority_weight: 50,
            notes: None,
            created_at: eta,
        }
    }

    #[test]
    fn full_lifecycle_advances_in_order() {
        let mut s = schedule();
        let t = |h, m| Utc.with_ymd_and_hms(2025, 3, 1, h, m, 0).unwrap();
        s.record_arrival(t(10, 5)).unwrap();
        s.record_berthing(t(10, 45)).unwrap();
        assert_eq!(s.waiting_minutes, Some(45));
        s.record_departure(t(21, 45)).unwrap();
        assert_eq!(s.dwell_minutes, 660);
        assert_eq!(s.status, ScheduleStatus::Departed);
    }

    #[test]
    fn skipping_a_state_is_rejected() {
        let mut s = schedule();
        let atb = Utc.with_ymd_and_hms(2025, 3, 1, 10, 30, 0).unwrap();
        assert!(matches!(
            s.record_berthing(atb),
            Err(EngineError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn recording_twice_with_same_timestamp_is_idempotent() {
        let mut s = schedule();
        let ata = Utc.with_ymd_and_hms(2025, 3, 1, 10, 5, 0).unwrap();
        s.record_arrival(ata).unwrap();
        let snapshot = s.clone();
        s.record_arrival(ata).unwrap();
        assert_eq!(s.status, snapshot.status);
        assert_eq!(s.ata, snapshot.ata);
    }

    #[test]
    fn cancel_is_terminal_and_rejected_after_departure() {
        let mut s = schedule();
        s.cancel().unwrap();
        assert_eq!(s.status, ScheduleStatus::Cancelled);
        assert!(!s.occupies_berth());

        let mut done = schedule();
        let t = |h, m| Utc.with_ymd_and_hms(2025, 3, 1, h, m, 0).unwrap();
        done.record_arrival(t(10, 0)).unwrap();
        done.record_berthing(t(10, 30)).unwrap();
        done.record_departure(t(20, 0)).unwrap();
        assert!(done.cancel().is_err());
    }

    #[test]
    fn waiting_is_never_negative() {
        let mut s = schedule();
        let t = |h, m| Utc.with_ymd_and_hms(2025, 3, 1, h, m, 0).unwrap();
        s.record_arrival(t(9, 0)).unwrap();
        s.record_berthing(t(9, 30)).unwrap();
        assert_eq!(s.waiting_minutes, Some(0));
    }
}
