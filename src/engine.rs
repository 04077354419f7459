//! Process assembly
//!
//! Wires the store, event bus, and services together, owns the lifecycle of
//! the long-lived tasks (position ingestor, conflict detector), and exposes
//! one shutdown signal. Each subsystem owns a stop-channel receiver and
//! finishes its in-flight work before exiting.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use crate::allocation::AllocationService;
use crate::clock::SharedClock;
use crate::config::AppConfig;
use crate::conflicts::ConflictDetector;
use crate::error::EngineResult;
use crate::events::EventBus;
use crate::ingest::PositionIngestor;
use crate::store::{SharedStore, Store};

/// The assembled engine
pub struct Engine {
    pub config: AppConfig,
    pub clock: SharedClock,
    pub store: SharedStore,
    pub bus: Arc<EventBus>,
    pub allocation: AllocationService,
    pub detector: Arc<ConflictDetector>,
    pub ingestor: Arc<PositionIngestor>,
    stop_tx: watch::Sender<bool>,
}

impl Engine {
    /// Build every subsystem from one configuration and clock
    pub fn new(config: AppConfig, clock: SharedClock) -> EngineResult<Arc<Self>> {
        let store: SharedStore = match &config.store.data_dir {
            Some(dir) => Arc::new(Store::open(Path::new(dir), clock.clone())?),
            None => Arc::new(Store::in_memory(clock.clone())),
        };
        let bus = Arc::new(EventBus::new(clock.clone(), config.events.queue_depth));

        let allocation = AllocationService::new(
            store.clone(),
            bus.clone(),
            clock.clone(),
            config.scheduler.clone(),
            config.ukc.clone(),
            config.tide.clone(),
            config.scoring.clone(),
        );

        let detector = Arc::new(ConflictDetector::new(
            store.clone(),
            bus.clone(),
            clock.clone(),
            config.conflict.clone(),
            config.scheduler.clone(),
            config.ukc.clone(),
            config.tide.clone(),
            config.port.default_port_code.clone(),
        ));

        let port_position = store
            .port_by_code(&config.port.default_port_code)
            .map(|p| (p.lat, p.lon))
            .unwrap_or((0.0, 0.0));
        let ingestor = Arc::new(PositionIngestor::new(
            store.clone(),
            bus.clone(),
            clock.clone(),
            config.ais.clone(),
            config.port.default_port_code.clone(),
            port_position,
        ));

        let (stop_tx, _) = watch::channel(false);
        Ok(Arc::new(Self {
            config,
            clock,
            store,
            bus,
            allocation,
            detector,
            ingestor,
            stop_tx,
        }))
    }

    /// Spawn the long-lived subsystems
    pub fn spawn_background(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();
        handles.push(tokio::spawn(
            self.detector.clone().run(self.stop_tx.subscribe()),
        ));
        handles.push(tokio::spawn(
            self.ingestor.clone().run(self.stop_tx.subscribe()),
        ));
        info!("background subsystems started");
        handles
    }

    /// Signal every subsystem to finish and stop
    pub fn shutdown(&self) {
        let _ = self.stop_tx.send(true);
    }
}
