//! Configuration management
//!
//! Layered loading: built-in defaults, then an optional file, then
//! `QUAYSIDE_`-prefixed environment overrides. Every section validates
//! itself; an invalid configuration is a startup error (exit code 1).

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// HTTP server configuration
    pub server: ServerConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
    /// Persistence configuration
    pub store: StoreConfig,
    /// External AIS feed configuration
    pub ais: AisConfig,
    /// Port identity
    pub port: PortConfig,
    /// Slot search and allocation tuning
    pub scheduler: SchedulerConfig,
    /// Under-keel clearance policy, meters
    pub ukc: UkcConfig,
    /// Scoring weights, must sum to 100
    pub scoring: ScoringWeights,
    /// Tidal window policy
    pub tide: TideConfig,
    /// Conflict detector tuning
    pub conflict: ConflictConfig,
    /// Event bus tuning
    pub events: EventsConfig,
}

impl AppConfig {
    /// Load defaults, merge an optional file, then environment overrides
    /// (`QUAYSIDE_SERVER__BIND_ADDR` style)
    pub fn load(path: Option<&Path>) -> EngineResult<Self> {
        let mut builder = config::Config::builder().add_source(
            config::Config::try_from(&AppConfig::default())
                .map_err(|e| EngineError::Validation(format!("config defaults: {}", e)))?,
        );
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("QUAYSIDE")
                .separator("__")
                .try_parsing(true),
        );
        let config: AppConfig = builder
            .build()
            .map_err(|e| EngineError::Validation(format!("config load: {}", e)))?
            .try_deserialize()
            .map_err(|e| EngineError::Validation(format!("config shape: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate every section
    pub fn validate(&self) -> EngineResult<()> {
        self.server.validate()?;
        self.logging.validate()?;
        self.scheduler.validate()?;
        self.ukc.validate()?;
        self.scoring.validate()?;
        self.conflict.validate()?;
        self.events.validate()?;
        Ok(())
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address, host:port
    pub bind_addr: String,
    /// Per-IP request budget per minute
    pub rate_limit_per_ip_per_minute: u32,
    /// Guard for the administrative clear-all path
    pub allow_clear_all: bool,
}

impl ServerConfig {
    pub fn validate(&self) -> EngineResult<()> {
        if self.bind_addr.trim().is_empty() {
            return Err(EngineError::Validation("server bind_addr is empty".into()));
        }
        if self.rate_limit_per_ip_per_minute == 0 {
            return Err(EngineError::Validation(
                "rate_limit_per_ip_per_minute must be positive".into(),
            ));
        }
        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".into(),
            rate_limit_per_ip_per_minute: 300,
            allow_clear_all: false,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,
    /// Enable structured logging
    pub structured: bool,
    /// Enable JSON output
    pub json: bool,
}

impl LoggingConfig {
    pub fn validate(&self) -> EngineResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.level.as_str()) {
            return Err(EngineError::Validation(format!(
                "invalid log level: {}",
                self.level
            )));
        }
        Ok(())
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            structured: true,
            json: false,
        }
    }
}

/// Persistence configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Sled data directory; `None` keeps state in memory only
    pub data_dir: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: Some("./quayside-data".into()),
        }
    }
}

/// External AIS feed configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AisConfig {
    /// Feed API key; empty disables the ingestor
    pub api_key: String,
    /// WebSocket endpoint
    pub endpoint_url: String,
    /// Bounding boxes as [[lat1, lon1], [lat2, lon2]] pairs
    pub bounding_boxes: Vec<[[f64; 2]; 2]>,
    /// Optional MMSI allow-list
    pub mmsi_filter: Vec<u64>,
    /// Coalesce position writes per vessel to one per this interval
    pub position_writes_coalesce_ms: u64,
    /// Reconnect backoff base, seconds
    pub backoff_base_secs: u64,
    /// Reconnect backoff cap, seconds
    pub backoff_cap_secs: u64,
}

impl Default for AisConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            endpoint_url: "wss://stream.aisstream.io/v0/stream".into(),
            bounding_boxes: vec![[[-90.0, -180.0], [90.0, 180.0]]],
            mmsi_filter: Vec::new(),
            position_writes_coalesce_ms: 5_000,
            backoff_base_secs: 1,
            backoff_cap_secs: 60,
        }
    }
}

/// Port identity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortConfig {
    /// Code of the port this engine plans for
    pub default_port_code: String,
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            default_port_code: "NLRTM".into(),
        }
    }
}

/// Slot search and allocation tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Turnaround buffer after a container vessel, minutes
    pub buffer_container_minutes: i64,
    /// Turnaround buffer after a bulk vessel, minutes
    pub buffer_bulk_minutes: i64,
    /// Turnaround buffer after a liquid-cargo vessel, minutes
    pub buffer_liquid_minutes: i64,
    /// Turnaround buffer after a ro-ro vessel, minutes
    pub buffer_roro_minutes: i64,
    /// Slot search horizon, days
    pub slot_horizon_days: u32,
    /// Suggestion deadline, seconds
    pub suggest_deadline_secs: u64,
    /// Allocation deadline, seconds
    pub allocate_deadline_secs: u64,
    /// Commit the cheapest window-preemption option without asking
    pub auto_choose_cheapest: bool,
}

impl SchedulerConfig {
    pub fn validate(&self) -> EngineResult<()> {
        if self.slot_horizon_days == 0 {
            return Err(EngineError::Validation(
                "slot_horizon_days must be positive".into(),
            ));
        }
        for (name, v) in [
            ("buffer_container_minutes", self.buffer_container_minutes),
            ("buffer_bulk_minutes", self.buffer_bulk_minutes),
            ("buffer_liquid_minutes", self.buffer_liquid_minutes),
            ("buffer_roro_minutes", self.buffer_roro_minutes),
        ] {
            if v < 0 {
                return Err(EngineError::Validation(format!(
                    "{} must be non-negative, got {}",
                    name, v
                )));
            }
        }
        Ok(())
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            buffer_container_minutes: 60,
            buffer_bulk_minutes: 90,
            buffer_liquid_minutes: 45,
            buffer_roro_minutes: 30,
            slot_horizon_days: 14,
            suggest_deadline_secs: 5,
            allocate_deadline_secs: 10,
            auto_choose_cheapest: false,
        }
    }
}

/// Under-keel clearance policy, meters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UkcConfig {
    /// Standard requirement
    pub default_meters: f64,
    /// Vessels over 100 000 GT
    pub large_meters: f64,
    /// Vessels over 200 000 GT
    pub vlcc_meters: f64,
}

impl UkcConfig {
    pub fn validate(&self) -> EngineResult<()> {
        if self.default_meters <= 0.0 || self.large_meters <= 0.0 || self.vlcc_meters <= 0.0 {
            return Err(EngineError::Validation(
                "ukc requirements must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Required clearance for a vessel of the given gross tonnage
    pub fn required_for_gt(&self, gross_tonnage: Option<u64>) -> f64 {
        match gross_tonnage {
            Some(gt) if gt > 200_000 => self.vlcc_meters,
            Some(gt) if gt > 100_000 => self.large_meters,
            _ => self.default_meters,
        }
    }
}

impl Default for UkcConfig {
    fn default() -> Self {
        Self {
            default_meters: 1.5,
            large_meters: 2.0,
            vlcc_meters: 2.5,
        }
    }
}

/// Scoring weights; must sum to 100
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringWeights {
    pub physical: f64,
    pub type_match: f64,
    pub waiting: f64,
    pub cranes: f64,
    pub history: f64,
    pub tide: f64,
}

impl ScoringWeights {
    pub fn validate(&self) -> EngineResult<()> {
        let sum =
            self.physical + self.type_match + self.waiting + self.cranes + self.history + self.tide;
        if (sum - 100.0).abs() > 1e-6 {
            return Err(EngineError::Validation(format!(
                "scoring weights must sum to 100, got {}",
                sum
            )));
        }
        Ok(())
    }
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            physical: 25.0,
            type_match: 20.0,
            waiting: 20.0,
            cranes: 15.0,
            history: 10.0,
            tide: 10.0,
        }
    }
}

/// Tidal window policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TideConfig {
    /// Half-width of the qualifying window around a high-tide sample, minutes
    pub window_half_width_minutes: i64,
}

impl Default for TideConfig {
    fn default() -> Self {
        Self {
            window_half_width_minutes: 90,
        }
    }
}

/// Conflict detector tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictConfig {
    /// Periodic scan interval, seconds
    pub scan_interval_seconds: u64,
    /// Apply the cheapest resolution automatically
    pub auto_resolve: bool,
}

impl ConflictConfig {
    pub fn validate(&self) -> EngineResult<()> {
        if self.scan_interval_seconds == 0 {
            return Err(EngineError::Validation(
                "scan_interval_seconds must be positive".into(),
            ));
        }
        Ok(())
    }
}

impl Default for ConflictConfig {
    fn default() -> Self {
        Self {
            scan_interval_seconds: 30,
            auto_resolve: false,
        }
    }
}

/// Event bus tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsConfig {
    /// Per-subscriber queue depth before oldest events are dropped
    pub queue_depth: usize,
}

impl EventsConfig {
    pub fn validate(&self) -> EngineResult<()> {
        if self.queue_depth == 0 {
            return Err(EngineError::Validation(
                "event queue_depth must be positive".into(),
            ));
        }
        Ok(())
    }
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self { queue_depth: 1024 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        AppConfig::default().validate().unwrap();
    }

    #[test]
    fn ukc_tiers_follow_gross_tonnage() {
        let ukc = UkcConfig::default();
        assert_eq!(ukc.required_for_gt(None), 1.5);
        assert_eq!(ukc.required_for_gt(Some(90_000)), 1.5);
        assert_eq!(ukc.required_for_gt(Some(150_000)), 2.0);
        assert_eq!(ukc.required_for_gt(Some(250_000)), 2.5);
    }

    #[test]
    fn unbalanced_weights_are_rejected() {
        let mut w = ScoringWeights::default();
        w.physical = 30.0;
        assert!(w.validate().is_err());
    }

    #[test]
    fn invalid_log_level_is_rejected() {
        let mut c = LoggingConfig::default();
        c.level = "verbose".into();
        assert!(c.validate().is_err());
    }
}
