//! WebSocket handler streaming broadcast events to clients.
//!
//! On connect the client receives a `snapshot` message with every known
//! device, then one JSON message per [`BroadcastEvent`](crate::events::BroadcastEvent).
//! Incoming messages are ignored apart from close frames.

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::sink::SinkExt;
use futures::stream::StreamExt;
use serde_json::json;
use tokio::sync::broadcast::error::RecvError;

use crate::api::AppState;
use crate::utils::now_millis;

/// WebSocket upgrade handler.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(socket, state))
}

fn build_snapshot(state: &AppState) -> Option<Message> {
    let zones = state.roon.zones.as_ref();
    let devices: Vec<_> = state
        .registry
        .ids()
        .iter()
        .filter_map(|id| state.registry.describe(id, zones))
        .collect();
    let body = json!({
        "category": "snapshot",
        "devices": devices,
        "timestamp": now_millis(),
    });
    serde_json::to_string(&body)
        .ok()
        .map(|s| Message::Text(s.into()))
}

async fn handle_ws(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let mut events = state.event_bridge.subscribe();

    let conn_guard = state.ws_manager.register();
    let cancel_token = conn_guard.cancel_token().clone();

    if let Some(msg) = build_snapshot(&state) {
        if sender.send(msg).await.is_err() {
            log::warn!("[WS] Failed to send snapshot, client disconnected");
            return;
        }
    }

    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => {
                log::info!("[WS] Connection force-closed: ws-{}", conn_guard.id());
                let _ = sender.send(Message::Close(None)).await;
                break;
            }
            msg = receiver.next() => match msg {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                _ => {}
            },
            event = events.recv() => match event {
                Ok(event) => {
                    let Ok(json) = serde_json::to_string(&event) else {
                        continue;
                    };
                    if sender.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    log::warn!("[WS] ws-{} lagged, skipped {} events", conn_guard.id(), skipped);
                }
                Err(RecvError::Closed) => break,
            },
        }
    }
}
