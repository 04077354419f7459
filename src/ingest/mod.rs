//! AIS position ingestor
//!
//! Maintains one long-lived WebSocket connection to the external position
//! feed. After connecting it sends a JSON subscription (API key, bounding
//! boxes, optional MMSI list) and consumes `PositionReport` /
//! `ShipStaticData` envelopes. Accepted reports are persisted, coalesced to
//! at most one write per vessel per interval, and drive the predicted-ETA
//! pipeline.
//!
//! The ingestor never propagates failures upward: on any error it degrades,
//! logs, and reconnects with exponential backoff and full jitter.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use parking_lot::RwLock;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::clock::SharedClock;
use crate::config::AisConfig;
use crate::domain::{AlertSeverity, PositionReport, Schedule, ScheduleId, VesselId};
use crate::error::{EngineError, EngineResult};
use crate::events::{EventBus, EventPayload, Room};
use crate::store::SharedStore;

/// Earth radius in nautical miles
const EARTH_RADIUS_NM: f64 = 3_440.065;
/// EMA smoothing factor for speed over ground
const SPEED_EMA_ALPHA: f64 = 0.3;
/// Samples in the speed smoothing window
const SPEED_EMA_WINDOW: usize = 6;
/// Below this smoothed speed the ETA projection is meaningless, knots
const MIN_PROJECTION_SPEED_KN: f64 = 0.5;
/// Connect handshake timeout, seconds
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Connection lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestorState {
    Disconnected,
    Connecting,
    Subscribed,
    Running,
    Degraded,
}

/// Outbound subscription frame
#[derive(Debug, Serialize)]
struct SubscriptionMessage<'a> {
    #[serde(rename = "APIKey")]
    api_key: &'a str,
    #[serde(rename = "BoundingBoxes")]
    bounding_boxes: &'a [[[f64; 2]; 2]],
    #[serde(rename = "FiltersShipMMSI", skip_serializing_if = "Vec::is_empty")]
    mmsi_filter: Vec<String>,
}

/// Inbound envelope; tolerant of unknown fields
#[derive(Debug, Deserialize)]
struct FeedEnvelope {
    #[serde(rename = "MessageType")]
    message_type: String,
    #[serde(rename = "MetaData")]
    meta: FeedMetaData,
    #[serde(rename = "Message", default)]
    message: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct FeedMetaData {
    #[serde(rename = "MMSI")]
    mmsi: u64,
    #[serde(rename = "latitude", default)]
    latitude: f64,
    #[serde(rename = "longitude", default)]
    longitude: f64,
    #[serde(rename = "time_utc", default)]
    time_utc: String,
}

#[derive(Debug, Deserialize, Default)]
struct PositionBody {
    #[serde(rename = "Sog", default)]
    sog: f64,
    #[serde(rename = "Cog", default)]
    cog: f64,
    #[serde(rename = "TrueHeading", default)]
    true_heading: Option<f64>,
    #[serde(rename = "NavigationalStatus", default)]
    nav_status: Option<u8>,
}

/// The ingestor
pub struct PositionIngestor {
    store: SharedStore,
    bus: Arc<EventBus>,
    clock: SharedClock,
    config: AisConfig,
    /// Port reference position for distance-to-port projections
    port_position: (f64, f64),
    port_code: String,
    state: RwLock<IngestorState>,
    last_write: DashMap<u64, DateTime<Utc>>,
    speed_window: DashMap<u64, VecDeque<f64>>,
    /// Last deviation band signalled per schedule, for edge triggering
    deviation_band: DashMap<ScheduleId, u8>,
}

impl PositionIngestor {
    pub fn new(
        store: SharedStore,
        bus: Arc<EventBus>,
        clock: SharedClock,
        config: AisConfig,
        port_code: String,
        port_position: (f64, f64),
    ) -> Self {
        Self {
            store,
            bus,
            clock,
            config,
            port_position,
            port_code,
            state: RwLock::new(IngestorState::Disconnected),
            last_write: DashMap::new(),
            speed_window: DashMap::new(),
            deviation_band: DashMap::new(),
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> IngestorState {
        *self.state.read()
    }

    /// One connection attempt, for startup probes (`--require-ais`)
    pub async fn probe(&self) -> EngineResult<()> {
        let timeout = std::time::Duration::from_secs(CONNECT_TIMEOUT_SECS);
        match tokio::time::timeout(timeout, connect_async(self.config.endpoint_url.as_str())).await {
            Ok(Ok((mut ws, _))) => {
                let _ = ws.close(None).await;
                Ok(())
            }
            Ok(Err(e)) => Err(EngineError::UpstreamUnavailable(e.to_string())),
            Err(_) => Err(EngineError::UpstreamUnavailable(
                "connect timed out".into(),
            )),
        }
    }

    /// Long-lived task: connect, subscribe, pump, reconnect on failure.
    /// The stop signal finishes the in-flight frame and closes the socket.
    pub async fn run(self: Arc<Self>, mut stop: watch::Receiver<bool>) {
        if self.config.api_key.is_empty() {
            info!("ais api key not configured; ingestor idle");
            return;
        }
        let mut attempt: u32 = 0;
        loop {
            if *stop.borrow() {
                break;
            }
            *self.state.write() = IngestorState::Connecting;
            match self.connect_and_pump(&mut stop).await {
                Ok(()) => {
                    // Clean shutdown via stop signal.
                    break;
                }
                Err(e) => {
                    *self.state.write() = IngestorState::Degraded;
                    attempt = attempt.saturating_add(1);
                    let backoff = self.backoff_with_jitter(attempt);
                    warn!(error = %e, attempt, backoff_secs = backoff.as_secs(), "feed connection lost");
                    tokio::select! {
                        _ = tokio::time::sleep(backoff) => {}
                        _ = stop.changed() => {
                            if *stop.borrow() { break; }
                        }
                    }
                }
            }
        }
        *self.state.write() = IngestorState::Disconnected;
        info!("position ingestor stopped");
    }

    /// Full jitter over an exponential base, capped
    fn backoff_with_jitter(&self, attempt: u32) -> std::time::Duration {
        let base = self.config.backoff_base_secs.max(1);
        let cap = self.config.backoff_cap_secs.max(base);
        let exp = base.saturating_mul(1u64 << attempt.min(16)).min(cap);
        let jittered = rand::thread_rng().gen_range(0..=exp.max(1));
        std::time::Duration::from_secs(jittered)
    }

    async fn connect_and_pump(&self, stop: &mut watch::Receiver<bool>) -> EngineResult<()> {
        let timeout = std::time::Duration::from_secs(CONNECT_TIMEOUT_SECS);
        let (mut ws, _) = tokio::time::timeout(timeout, connect_async(self.config.endpoint_url.as_str()))
            .await
            .map_err(|_| EngineError::UpstreamUnavailable("connect timed out".into()))?
            .map_err(|e| EngineError::UpstreamUnavailable(e.to_string()))?;

        let subscription = SubscriptionMessage {
            api_key: &self.config.api_key,
            bounding_boxes: &self.config.bounding_boxes,
            mmsi_filter: self
                .config
                .mmsi_filter
                .iter()
                .map(|m| m.to_string())
                .collect(),
        };
        let frame = serde_json::to_string(&subscription)
            .map_err(|e| EngineError::UpstreamUnavailable(format!("subscription encode: {}", e)))?;
        ws.send(Message::Text(frame))
            .await
            .map_err(|e| EngineError::UpstreamUnavailable(e.to_string()))?;
        *self.state.write() = IngestorState::Subscribed;
        info!(endpoint = %self.config.endpoint_url, "subscribed to position feed");

        loop {
            tokio::select! {
                frame = ws.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            *self.state.write() = IngestorState::Running;
                            self.handle_frame(&text);
                        }
                        Some(Ok(Message::Ping(payload))) => {
                            let _ = ws.send(Message::Pong(payload)).await;
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            return Err(EngineError::UpstreamUnavailable("feed closed".into()));
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            return Err(EngineError::UpstreamUnavailable(e.to_string()));
                        }
                    }
                }
                _ = stop.changed() => {
                    if *stop.borrow() {
                        let _ = ws.close(None).await;
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Decode and apply one feed frame; malformed frames are logged and
    /// dropped
    pub fn handle_frame(&self, text: &str) {
        let envelope: FeedEnvelope = match serde_json::from_str(text) {
            Ok(e) => e,
            Err(e) => {
                debug!(error = %e, "undecodable feed frame");
                return;
            }
        };
        match envelope.message_type.as_str() {
            "PositionReport" => {
                let body: PositionBody = envelope
                    .message
                    .get("PositionReport")
                    .cloned()
                    .and_then(|v| serde_json::from_value(v).ok())
                    .unwrap_or_default();
                self.apply_report(&envelope.meta, &body);
            }
            "ShipStaticData" => {
                // Static data keeps the registry fresh; dimensions are
                // authoritative from the registry, so only log here.
                debug!(mmsi = envelope.meta.mmsi, "static data frame");
            }
            other => {
                debug!(message_type = other, "ignored feed frame");
            }
        }
    }

    fn apply_report(&self, meta: &FeedMetaData, body: &PositionBody) {
        let now = self.clock.now();

        // Per-vessel coalescing: at most one write per interval.
        let coalesce = Duration::milliseconds(self.config.position_writes_coalesce_ms as i64);
        if let Some(last) = self.last_write.get(&meta.mmsi) {
            if now - *last < coalesce {
                return;
            }
        }

        let recorded_at = DateTime::parse_from_rfc3339(&meta.time_utc)
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or(now);
        let vessel = self.store.vessel_by_mmsi(meta.mmsi);
        let report = PositionReport {
            vessel_id: vessel.as_ref().map(|v| v.id),
            mmsi: meta.mmsi,
            lat: meta.latitude,
            lon: meta.longitude,
            sog: body.sog,
            cog: body.cog,
            heading: body.true_heading.filter(|h| *h < 511.0),
            nav_status: body.nav_status.map(|s| s.to_string()),
            recorded_at,
            ingested_at: now,
        };

        match self.store.append_position(report.clone()) {
            Ok(true) => {}
            Ok(false) => return, // stale sample
            Err(e) => {
                warn!(error = %e, mmsi = meta.mmsi, "position write failed");
                return;
            }
        }
        self.last_write.insert(meta.mmsi, now);

        let mut rooms = vec![Room::Port(self.port_code.clone())];
        if let Some(id) = report.vessel_id {
            rooms.push(Room::Vessel(id));
        }
        self.bus.publish(
            EventPayload::PositionUpdated {
                report: report.clone(),
            },
            rooms,
        );

        if let Some(vessel) = vessel {
            self.project_eta(vessel.id, &report);
        }
    }

    /// Smooth speed, project arrival, and push deviations through the store
    fn project_eta(&self, vessel_id: VesselId, report: &PositionReport) {
        let smoothed = {
            let mut window = self
                .speed_window
                .entry(report.mmsi)
                .or_insert_with(VecDeque::new);
            if window.len() == SPEED_EMA_WINDOW {
                window.pop_front();
            }
            window.push_back(report.sog);
            ema(window.iter().copied())
        };
        if smoothed < MIN_PROJECTION_SPEED_KN {
            return;
        }

        let schedules = self.store.active_schedules_for_vessel(vessel_id);
        let Some(schedule) = schedules
            .iter()
            .find(|s| s.atb.is_none())
        else {
            return;
        };

        let distance_nm = haversine_nm(
            (report.lat, report.lon),
            self.port_position,
        );
        let hours = distance_nm / smoothed;
        let predicted = self.clock.now() + Duration::seconds((hours * 3_600.0) as i64);
        let deviation = (predicted - schedule.eta).num_minutes().abs();

        let band = match deviation {
            d if d >= 120 => 3,
            d if d >= 60 => 2,
            d if d >= 15 => 1,
            _ => 0,
        };
        let previous = self
            .deviation_band
            .insert(schedule.id, band)
            .unwrap_or(0);
        if band == previous {
            // No threshold crossed since the last sample.
            if band > 0 {
                let _ = self
                    .store
                    .update_eta(schedule.id, schedule.eta, Some(predicted));
            }
            return;
        }
        if band == 0 {
            return;
        }

        let severity = match band {
            3 => AlertSeverity::Critical,
            2 => AlertSeverity::Warning,
            _ => AlertSeverity::Info,
        };
        self.raise_deviation(schedule, predicted, deviation, severity);
    }

    fn raise_deviation(
        &self,
        schedule: &Schedule,
        predicted: DateTime<Utc>,
        deviation_minutes: i64,
        severity: AlertSeverity,
    ) {
        let rooms = vec![
            Room::Port(self.port_code.clone()),
            Room::Vessel(schedule.vessel_id),
        ];
        match self.store.insert_alert(
            "eta_deviation",
            severity,
            format!(
                "predicted arrival of schedule {} deviates by {} minutes",
                schedule.id, deviation_minutes
            ),
            Some(schedule.id),
            Some(schedule.vessel_id),
            Some(schedule.berth_id),
        ) {
            Ok(alert) => {
                self.bus
                    .publish(EventPayload::AlertRaised { alert }, rooms.clone());
            }
            Err(e) => warn!(error = %e, "failed to persist deviation alert"),
        }
        match self
            .store
            .update_eta(schedule.id, schedule.eta, Some(predicted))
        {
            Ok(outcome) => {
                self.bus.publish(
                    EventPayload::EtaUpdated {
                        schedule_id: schedule.id,
                        predicted_eta: outcome.schedule.predicted_eta,
                        deviation_minutes,
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
            }
            Err(e) => warn!(error = %e, "eta update failed"),
        }
    }
}

/// Exponential moving average, oldest sample first
fn ema(samples: impl Iterator<Item = f64>) -> f64 {
    let mut value: Option<f64> = None;
    for sample in samples {
        value = Some(match value {
            None => sample,
            Some(prev) => SPEED_EMA_ALPHA * sample + (1.0 - SPEED_EMA_ALPHA) * prev,
        });
    }
    value.unwrap_or(0.0)
}

/// Great-circle distance in nautical miles
fn haversine_nm(a: (f64, f64), b: (f64, f64)) -> f64 {
    let (lat1, lon1) = (a.0.to_radians(), a.1.to_radians());
    let (lat2, lon2) = (b.0.to_radians(), b.1.to_radians());
    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_NM * h.sqrt().asin()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ema_weights_recent_samples() {
        let flat = ema([10.0, 10.0, 10.0].into_iter());
        assert!((flat - 10.0).abs() < 1e-9);

        let rising = ema([10.0, 10.0, 20.0].into_iter());
        assert!(rising > 10.0 && rising < 20.0);
        // alpha = 0.3: one fresh sample moves the average by 30 %.
        assert!((rising - 13.0).abs() < 1e-9);
    }

    #[test]
    fn haversine_matches_known_distance() {
        // Rotterdam to Felixstowe is roughly 110 nm.
        let rotterdam = (51.95, 4.14);
        let felixstowe = (51.95, 1.35);
        let d = haversine_nm(rotterdam, felixstowe);
        assert!((100.0..125.0).contains(&d), "got {}", d);
    }

    #[test]
    fn subscription_frame_shape() {
        let boxes = [[[-1.0, -2.0], [3.0, 4.0]]];
        let msg = SubscriptionMessage {
            api_key: "key",
            bounding_boxes: &boxes,
            mmsi_filter: vec!["123456789".into()],
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["APIKey"], "key");
        assert!(json["BoundingBoxes"].is_array());
        assert_eq!(json["FiltersShipMMSI"][0], "123456789");
    }

    #[test]
    fn envelope_decodes_position_report() {
        let raw = r#"{
            "MessageType": "PositionReport",
            "MetaData": {"MMSI": 244615000, "latitude": 51.9, "longitude": 4.1, "time_utc": "2025-03-01T10:00:00Z"},
            "Message": {"PositionReport": {"Sog": 12.5, "Cog": 87.0, "TrueHeading": 85, "NavigationalStatus": 0}}
        }"#;
        let envelope: FeedEnvelope = serde_json::from_str(raw).unwrap();
        assert_eq!(envelope.message_type, "PositionReport");
        assert_eq!(envelope.meta.mmsi, 244615000);
        let body: PositionBody = serde_json::from_value(
            envelope.message.get("PositionReport").cloned().unwrap(),
        )
        .unwrap();
        assert!((body.sog - 12.5).abs() < 1e-9);
        assert_eq!(body.true_heading, Some(85.0));
    }
}
