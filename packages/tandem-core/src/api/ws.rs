//! WebSocket event stream: the push alternative to snapshot polling.
//!
//! A client receives the list of active sessions on connect, then every
//! broadcast event. Sending `SUBSCRIBE` narrows the stream to one group.
//! Version ordering still applies on the client; events are a hint, never a
//! substitute for the version check.

use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::sink::SinkExt;
use futures::stream::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;

use crate::api::AppState;
use crate::events::BroadcastEvent;
use crate::protocol_constants::{WS_HEARTBEAT_CHECK_INTERVAL_SECS, WS_HEARTBEAT_TIMEOUT_SECS};
use crate::session::SessionSnapshot;

// ─────────────────────────────────────────────────────────────────────────────
// WebSocket Message Types
// ─────────────────────────────────────────────────────────────────────────────

/// Incoming WebSocket message envelope.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
enum WsIncoming {
    Heartbeat,
    /// `groupId: null` restores the unfiltered stream.
    Subscribe {
        #[serde(default)]
        payload: SubscribePayload,
    },
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubscribePayload {
    #[serde(default)]
    group_id: Option<String>,
}

/// Outgoing control messages; events are forwarded as [`BroadcastEvent`] JSON.
#[derive(Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
enum WsOutgoing {
    Sessions { payload: SessionsPayload },
    HeartbeatAck,
    Subscribed { payload: SubscribedPayload },
    Error { message: String },
}

#[derive(Serialize)]
struct SessionsPayload {
    sessions: Vec<SessionSnapshot>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SubscribedPayload {
    group_id: Option<String>,
}

impl WsOutgoing {
    fn to_message(&self) -> Option<Message> {
        serde_json::to_string(self)
            .ok()
            .map(|s| Message::Text(s.into()))
    }
}

/// Whether `event` passes the connection's group filter.
fn should_forward(filter: Option<&str>, event: &BroadcastEvent) -> bool {
    match filter {
        None => true,
        Some(group) => event.group_id() == Some(group),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Connection Handler
// ─────────────────────────────────────────────────────────────────────────────

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(socket, state))
}

async fn handle_ws(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let mut events = BroadcastStream::new(state.event_bridge.subscribe());
    let mut last_activity = Instant::now();
    let mut filter: Option<String> = None;

    let conn_guard = state.ws_manager.register();
    let cancel_token = conn_guard.cancel_token().clone();

    let initial = WsOutgoing::Sessions {
        payload: SessionsPayload {
            sessions: state.registry.list(),
        },
    };
    if let Some(msg) = initial.to_message() {
        if sender.send(msg).await.is_err() {
            log::warn!("[WS] Client gone before initial state: {}", conn_guard.id());
            return;
        }
    }

    let mut heartbeat_interval =
        tokio::time::interval(Duration::from_secs(WS_HEARTBEAT_CHECK_INTERVAL_SECS));
    heartbeat_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => {
                log::info!("[WS] Connection force-closed: {}", conn_guard.id());
                break;
            }
            msg = receiver.next() => {
                last_activity = Instant::now();
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let reply = match serde_json::from_str::<WsIncoming>(&text) {
                            Ok(WsIncoming::Heartbeat) => WsOutgoing::HeartbeatAck,
                            Ok(WsIncoming::Subscribe { payload }) => {
                                log::debug!(
                                    "[WS] {} subscribed to {:?}",
                                    conn_guard.id(),
                                    payload.group_id
                                );
                                filter = payload.group_id;
                                WsOutgoing::Subscribed {
                                    payload: SubscribedPayload { group_id: filter.clone() },
                                }
                            }
                            Err(e) => WsOutgoing::Error {
                                message: format!("Invalid message: {}", e),
                            },
                        };
                        if let Some(msg) = reply.to_message() {
                            if sender.send(msg).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    _ => {}
                }
            }
            received = events.next() => {
                match received {
                    Some(Ok(event)) => {
                        if !should_forward(filter.as_deref(), &event) {
                            continue;
                        }
                        if let Ok(json) = serde_json::to_string(&event) {
                            if sender.send(Message::Text(json.into())).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Err(BroadcastStreamRecvError::Lagged(skipped))) => {
                        // Clients recover by pulling a snapshot; nothing to replay.
                        log::warn!("[WS] {} lagged, skipped {} event(s)", conn_guard.id(), skipped);
                    }
                    None => break,
                }
            }
            _ = heartbeat_interval.tick() => {
                if last_activity.elapsed() > Duration::from_secs(WS_HEARTBEAT_TIMEOUT_SECS) {
                    log::warn!("[WS] Heartbeat timeout: {}", conn_guard.id());
                    break;
                }
            }
        }
    }
}
