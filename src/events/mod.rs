//! Event bus and room broadcaster
//!
//! Process-wide fan-out of domain events to room-keyed subscribers. Every
//! subscriber owns a bounded queue; publishers never block. When a slow
//! subscriber's queue exceeds the configured depth, the oldest events are
//! dropped and a `lag` marker is delivered in their place. Events reflect
//! post-commit state and are enqueued in publish order.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tracing::debug;
use uuid::Uuid;

use crate::clock::SharedClock;
use crate::domain::{
    Alert, Conflict, PositionReport, Schedule, ScheduleId, TerminalId, VesselId,
};

/// A subscription room
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Room {
    /// `port:<code>`
    Port(String),
    /// `terminal:<id>`
    Terminal(TerminalId),
    /// `vessel:<id>`
    Vessel(VesselId),
}

impl From<Room> for String {
    fn from(room: Room) -> Self {
        match room {
            Room::Port(code) => format!("port:{}", code),
            Room::Terminal(id) => format!("terminal:{}", id),
            Room::Vessel(id) => format!("vessel:{}", id),
        }
    }
}

impl TryFrom<String> for Room {
    type Error = String;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        match raw.split_once(':') {
            Some(("port", code)) if !code.is_empty() => Ok(Room::Port(code.to_string())),
            Some(("terminal", id)) => id
                .parse::<u64>()
                .map(|n| Room::Terminal(TerminalId(n)))
                .map_err(|_| format!("invalid terminal room: {}", raw)),
            Some(("vessel", id)) => id
                .parse::<u64>()
                .map(|n| Room::Vessel(VesselId(n)))
                .map_err(|_| format!("invalid vessel room: {}", raw)),
            _ => Err(format!("unknown room: {}", raw)),
        }
    }
}

/// What changed about a schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleChange {
    Created,
    Updated,
    Rescheduled,
    Cancelled,
}

/// Typed event payload; the wire `type` tag uses dotted names
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum EventPayload {
    #[serde(rename = "schedule.changed")]
    ScheduleChanged {
        schedule: Schedule,
        change: ScheduleChange,
    },
    #[serde(rename = "conflict.detected")]
    ConflictDetected { conflict: Conflict },
    #[serde(rename = "conflict.resolved")]
    ConflictResolved { conflict: Conflict },
    #[serde(rename = "alert.raised")]
    AlertRaised { alert: Alert },
    #[serde(rename = "position.updated")]
    PositionUpdated { report: PositionReport },
    #[serde(rename = "eta.updated")]
    EtaUpdated {
        schedule_id: ScheduleId,
        predicted_eta: DateTime<Utc>,
        deviation_minutes: i64,
    },
    #[serde(rename = "lag")]
    Lag { dropped: u64 },
}

/// One delivered event
#[derive(Debug, Clone, Serialize)]
pub struct BusEvent {
    #[serde(skip)]
    pub id: Uuid,
    #[serde(flatten)]
    pub payload: EventPayload,
    pub ts: DateTime<Utc>,
    #[serde(skip)]
    pub rooms: Vec<Room>,
}

struct SubscriberState {
    rooms: RwLock<HashSet<Room>>,
    queue: Mutex<VecDeque<BusEvent>>,
    dropped: AtomicU64,
    notify: Notify,
}

/// The process-wide bus
pub struct EventBus {
    clock: SharedClock,
    queue_depth: usize,
    subscribers: RwLock<HashMap<Uuid, Arc<SubscriberState>>>,
}

impl EventBus {
    pub fn new(clock: SharedClock, queue_depth: usize) -> Self {
        Self {
            clock,
            queue_depth,
            subscribers: RwLock::new(HashMap::new()),
        }
    }

    /// Register a subscriber with no rooms yet
    pub fn subscribe(self: &Arc<Self>) -> Subscription {
        let id = Uuid::new_v4();
        let state = Arc::new(SubscriberState {
            rooms: RwLock::new(HashSet::new()),
            queue: Mutex::new(VecDeque::new()),
            dropped: AtomicU64::new(0),
            notify: Notify::new(),
        });
        self.subscribers.write().insert(id, state.clone());
        Subscription {
            id,
            bus: Arc::clone(self),
            state,
        }
    }

    /// Fan an event out to every subscriber joined to one of its rooms
    pub fn publish(&self, payload: EventPayload, rooms: Vec<Room>) {
        let event = BusEvent {
            id: Uuid::new_v4(),
            payload,
            ts: self.clock.now(),
            rooms,
        };
        let subscribers = self.subscribers.read();
        for state in subscribers.values() {
            let joined = {
                let joined_rooms = state.rooms.read();
                event.rooms.iter().any(|r| joined_rooms.contains(r))
            };
            if !joined {
                continue;
            }
            let mut queue = state.queue.lock();
            queue.push_back(event.clone());
            while queue.len() > self.queue_depth {
                queue.pop_front();
                state.dropped.fetch_add(1, Ordering::Relaxed);
            }
            drop(queue);
            state.notify.notify_one();
        }
    }

    /// Subscribers currently registered
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    fn unsubscribe(&self, id: Uuid) {
        self.subscribers.write().remove(&id);
        debug!(subscriber = %id, "subscriber removed");
    }
}

/// A live subscription; dropped subscriptions unregister themselves
pub struct Subscription {
    id: Uuid,
    bus: Arc<EventBus>,
    state: Arc<SubscriberState>,
}

impl Subscription {
    /// Join a room
    pub fn join(&self, room: Room) {
        self.state.rooms.write().insert(room);
    }

    /// Leave a room
    pub fn leave(&self, room: &Room) {
        self.state.rooms.write().remove(room);
    }

    /// Next event; a `lag` marker precedes the first event after drops
    pub async fn recv(&self) -> BusEvent {
        loop {
            let dropped = self.state.dropped.swap(0, Ordering::Relaxed);
            if dropped > 0 {
                return BusEvent {
                    id: Uuid::new_v4(),
                    payload: EventPayload::Lag { dropped },
                    ts: self.bus.clock.now(),
                    rooms: Vec::new(),
                };
            }
            if let Some(event) = self.state.queue.lock().pop_front() {
                return event;
            }
            self.state.notify.notified().await;
        }
    }

    /// Non-blocking pop, for drain loops and tests
    pub fn try_recv(&self) -> Option<BusEvent> {
        let dropped = self.state.dropped.swap(0, Ordering::Relaxed);
        if dropped > 0 {
            return Some(BusEvent {
                id: Uuid::new_v4(),
                payload: EventPayload::Lag { dropped },
                ts: self.bus.clock.now(),
                rooms: Vec::new(),
            });
        }
        self.state.queue.lock().pop_front()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.bus.unsubscribe(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{ManualClock, SystemClock};
    use chrono::TimeZone;

    fn bus(depth: usize) -> Arc<EventBus> {
        Arc::new(EventBus::new(Arc::new(SystemClock), depth))
    }

    fn eta_event(schedule: u64) -> EventPayload {
        EventPayload::EtaUpdated {
            schedule_id: ScheduleId(schedule),
            predicted_eta: Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap(),
            deviation_minutes: 45,
        }
    }

    #[tokio::test]
    async fn events_reach_joined_rooms_only() {
        let bus = bus(16);
        let sub = bus.subscribe();
        sub.join(Room::Vessel(VesselId(1)));

        bus.publish(eta_event(1), vec![Room::Vessel(VesselId(1))]);
        bus.publish(eta_event(2), vec![Room::Vessel(VesselId(2))]);

        let got = sub.recv().await;
        assert!(matches!(
            got.payload,
            EventPayload::EtaUpdated { schedule_id, .. } if schedule_id == ScheduleId(1)
        ));
        assert!(sub.try_recv().is_none());
    }

    #[tokio::test]
    async fn slow_subscriber_drops_oldest_and_sees_lag() {
        let bus = bus(2);
        let sub = bus.subscribe();
        sub.join(Room::Port("NLRTM".into()));

        for i in 0..5 {
            bus.publish(eta_event(i), vec![Room::Port("NLRTM".into())]);
        }

        // Three oldest were dropped; the marker arrives first.
        let first = sub.recv().await;
        assert!(matches!(first.payload, EventPayload::Lag { dropped: 3 }));
        let second = sub.recv().await;
        assert!(matches!(
            second.payload,
            EventPayload::EtaUpdated { schedule_id, .. } if schedule_id == ScheduleId(3)
        ));
    }

    #[tokio::test]
    async fn delivery_preserves_publish_order() {
        let bus = bus(64);
        let sub = bus.subscribe();
        sub.join(Room::Vessel(VesselId(7)));
        for i in 0..10 {
            bus.publish(eta_event(i), vec![Room::Vessel(VesselId(7))]);
        }
        for i in 0..10 {
            let event = sub.recv().await;
            assert!(matches!(
                event.payload,
                EventPayload::EtaUpdated { schedule_id, .. } if schedule_id == ScheduleId(i)
            ));
        }
    }

    #[test]
    fn dropped_subscription_unregisters() {
        let bus = bus(4);
        let sub = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);
        drop(sub);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn room_round_trips_through_strings() {
        let room: Room = "terminal:3".to_string().try_into().unwrap();
        assert_eq!(room, Room::Terminal(TerminalId(3)));
        assert_eq!(String::from(Room::Port("NLRTM".into())), "port:NLRTM");
        assert!(Room::try_from("gibberish".to_string()).is_err());
    }

    #[test]
    fn wire_frame_shape() {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap(),
        ));
        let bus = Arc::new(EventBus::new(clock, 8));
        let sub = bus.subscribe();
        sub.join(Room::Vessel(VesselId(1)));
        bus.publish(eta_event(1), vec![Room::Vessel(VesselId(1))]);
        let event = sub.try_recv().unwrap();
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "eta.updated");
        assert!(json["payload"]["schedule_id"].is_number());
        assert!(json["ts"].is_string());
    }
}
