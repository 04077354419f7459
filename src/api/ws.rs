//! WebSocket push transport
//!
//! Clients join rooms with `{"action":"subscribe","room":"port:NLRTM"}`
//! frames; the server pushes `{type, payload, ts}` frames for every event
//! reaching a joined room, including `lag` markers after queue overflow.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tracing::{debug, warn};

use crate::engine::Engine;
use crate::events::Room;

use super::models::{ClientAction, ClientFrame};

/// Upgrade handler for `GET /ws`
pub async fn websocket(State(engine): State<Arc<Engine>>, upgrade: WebSocketUpgrade) -> Response {
    upgrade.on_upgrade(move |socket| run(engine, socket))
}

async fn run(engine: Arc<Engine>, socket: WebSocket) {
    let subscription = engine.bus.subscribe();
    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            event = subscription.recv() => {
                let frame = match serde_json::to_string(&event) {
                    Ok(frame) => frame,
                    Err(e) => {
                        warn!(error = %e, "event encode failed");
                        continue;
                    }
                };
                if sink.send(Message::Text(frame)).await.is_err() {
                    break;
                }
            }
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        handle_client_frame(&subscription, &text);
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        if sink.send(Message::Pong(payload)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(error = %e, "client socket error");
                        break;
                    }
                }
            }
        }
    }
    debug!("push subscriber disconnected");
}

fn handle_client_frame(subscription: &crate::events::Subscription, text: &str) {
    let frame: ClientFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            debug!(error = %e, "undecodable client frame");
            return;
        }
    };
    let room: Room = match frame.room.clone().try_into() {
        Ok(room) => room,
        Err(e) => {
            debug!(error = %e, "unknown room");
            return;
        }
    };
    match frame.action {
        ClientAction::Subscribe => subscription.join(room),
        ClientAction::Unsubscribe => subscription.leave(&room),
    }
}
