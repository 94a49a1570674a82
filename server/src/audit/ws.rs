//! Live Audit WebSocket
//!
//! Streams every audit record as `{"type": "log", "data": {...}}`.

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tracing::{error, info};

use super::types::AuditRecord;
use super::LogBroadcaster;
use crate::api::AppState;

/// Server-to-client events.
#[derive(Debug, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum LiveEvent<'a> {
    /// A new audit record was written
    Log(&'a AuditRecord),
}

/// WebSocket upgrade handler.
pub async fn handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let broadcaster = state.audit.broadcaster().clone();
    ws.on_upgrade(move |socket| handle_socket(socket, broadcaster))
}

/// Forward audit records to one WebSocket until either side goes away.
async fn handle_socket(socket: WebSocket, broadcaster: LogBroadcaster) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let mut subscription = broadcaster.subscribe();
    let subscriber_id = subscription.id();

    info!(subscriber_id = %subscriber_id, "Live log WebSocket connected");

    loop {
        tokio::select! {
            record = subscription.recv() => {
                let Some(record) = record else { break };
                let msg = match serde_json::to_string(&LiveEvent::Log(&record)) {
                    Ok(json) => json,
                    Err(e) => {
                        error!("Failed to serialize audit record: {}", e);
                        continue;
                    }
                };
                if ws_sender.send(Message::Text(msg.into())).await.is_err() {
                    break;
                }
            }
            incoming = ws_receiver.next() => {
                match incoming {
                    Some(Ok(Message::Ping(data))) => {
                        if ws_sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    info!(subscriber_id = %subscriber_id, "Live log WebSocket disconnected");
}
