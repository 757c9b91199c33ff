//! Real-time channel upgrade handling.
//!
//! # Responsibilities
//! - Complete the upgrade handshake on the real-time path
//! - Send the connection confirmation, answer `ping` with `pong`
//! - Keep the peer alive with protocol pings
//!
//! # Data Flow
//! ```text
//! Client frames ──→ reader loop ──→ respond() ──→ hub queue ──→ writer task ──→ Client
//!                                                     ▲
//!                                   broadcast ────────┘
//! ```
//!
//! # Design Decisions
//! - Everything sent to the peer goes through the hub queue, so the reader
//!   and broadcasts never await a slow socket
//! - The handler keeps only the connection ID; once the hub forgets the
//!   connection the queue closes and the writer sends a close frame

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::{IntoResponse, Response},
};
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::http::error::GatewayError;
use crate::http::server::AppState;
use crate::realtime::{message, ConnectionId, RealtimeHub, ServerMessage};

pub async fn realtime_handler(
    State(state): State<AppState>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => {
            tracing::debug!(reason = %rejection.body_text(), "Real-time upgrade rejected");
            return GatewayError::UpgradeRejected {
                status: rejection.status(),
                reason: rejection.body_text(),
            }
            .into_response();
        }
    };
    let keepalive = Duration::from_secs(state.config.realtime.keepalive_secs);
    let hub = Arc::clone(&state.hub);
    ws.on_upgrade(move |socket| handle_socket(socket, hub, keepalive))
}

async fn handle_socket(socket: WebSocket, hub: Arc<RealtimeHub>, keepalive: Duration) {
    let (connection, outbound) = hub.register();
    let id = connection.id;
    let confirmation = ServerMessage::connected(id, connection.established_at);
    drop(connection);

    tracing::info!(connection = %id, peers = hub.len(), "Real-time client connected");
    hub.send_to(id, confirmation.to_json());

    let (sender, receiver) = socket.split();
    let mut writer = tokio::spawn(write_loop(sender, outbound, keepalive, id));
    let mut reader = tokio::spawn(read_loop(receiver, Arc::clone(&hub), id));

    tokio::select! {
        _ = &mut writer => reader.abort(),
        _ = &mut reader => writer.abort(),
    }

    hub.unregister(id);
    tracing::info!(connection = %id, peers = hub.len(), "Real-time client disconnected");
}

async fn write_loop(
    mut sender: futures_util::stream::SplitSink<WebSocket, Message>,
    mut outbound: mpsc::Receiver<String>,
    keepalive: Duration,
    id: ConnectionId,
) {
    let mut ticker = tokio::time::interval(keepalive);
    // First tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            queued = outbound.recv() => match queued {
                Some(text) => {
                    if let Err(e) = sender.send(Message::Text(text.into())).await {
                        tracing::debug!(connection = %id, error = %e, "Failed to write to real-time client");
                        break;
                    }
                }
                None => {
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
            },
            _ = ticker.tick() => {
                if sender.send(Message::Ping(Bytes::new())).await.is_err() {
                    break;
                }
            }
        }
    }
}

async fn read_loop(mut receiver: futures_util::stream::SplitStream<WebSocket>, hub: Arc<RealtimeHub>, id: ConnectionId) {
    while let Some(frame) = receiver.next().await {
        let reply = match frame {
            Ok(Message::Text(text)) => message::respond(text.as_str(), Utc::now()),
            Ok(Message::Binary(_)) => Some(ServerMessage::Error {
                message: "Invalid message format".to_string(),
            }),
            Ok(Message::Close(_)) => break,
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => None,
            Err(e) => {
                tracing::debug!(connection = %id, error = %e, "Real-time read failed");
                break;
            }
        };

        if let Some(reply) = reply {
            if !hub.send_to(id, reply.to_json()) {
                tracing::debug!(connection = %id, "Reply dropped");
            }
        }
    }
}
