//! Real-time channel message envelope.
//!
//! Every message is a JSON object with a `type` field. Clients may send
//! `ping`; the server sends `connection`, `pong`, `error` and `shutdown`.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::realtime::hub::ConnectionId;

/// Inbound envelope. Only `type` is interpreted.
#[derive(Debug, Deserialize)]
pub struct ClientEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
}

/// Messages the server sends.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerMessage {
    #[serde(rename_all = "camelCase")]
    Connection {
        status: &'static str,
        connection_id: String,
        timestamp: String,
    },
    Pong {
        timestamp: String,
    },
    Error {
        message: String,
    },
    Shutdown {
        timestamp: String,
    },
}

impl ServerMessage {
    pub fn connected(id: ConnectionId, at: DateTime<Utc>) -> Self {
        ServerMessage::Connection {
            status: "connected",
            connection_id: id.to_string(),
            timestamp: iso8601(at),
        }
    }

    pub fn shutdown(at: DateTime<Utc>) -> Self {
        ServerMessage::Shutdown { timestamp: iso8601(at) }
    }

    pub fn to_json(&self) -> String {
        // Serializing plain strings cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}

fn iso8601(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Reply to one inbound text frame, if any.
///
/// Unknown but well-formed message types are ignored.
pub fn respond(raw: &str, now: DateTime<Utc>) -> Option<ServerMessage> {
    match serde_json::from_str::<ClientEnvelope>(raw) {
        Ok(envelope) if envelope.kind == "ping" => Some(ServerMessage::Pong { timestamp: iso8601(now) }),
        Ok(envelope) => {
            tracing::debug!(kind = %envelope.kind, "Ignoring unsupported real-time message type");
            None
        }
        Err(_) => Some(ServerMessage::Error {
            message: "Invalid message format".to_string(),
        }),
    }
}
