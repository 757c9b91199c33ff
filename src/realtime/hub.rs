//! Real-time connection tracking and fan-out.
//!
//! # Responsibilities
//! - Assign connection IDs and remember when each peer connected
//! - Hand out the bounded outbound queue of each connection
//! - Fan a message out to every peer without blocking on any one of them
//!
//! # Design Decisions
//! - Each connection owns a bounded `mpsc` queue drained by its writer task
//! - `try_send` only: a full queue drops the message for that peer, a closed
//!   queue removes the peer

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::mpsc;

use crate::observability::metrics;

static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a real-time connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn next() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// One accepted upgrade.
#[derive(Debug, Clone)]
pub struct ChannelConnection {
    pub id: ConnectionId,
    pub established_at: DateTime<Utc>,
    outbound: mpsc::Sender<String>,
}

/// Outcome of a fan-out.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub dropped: usize,
    pub closed: usize,
}

/// Registry of live real-time connections.
#[derive(Debug)]
pub struct RealtimeHub {
    connections: DashMap<ConnectionId, ChannelConnection>,
    buffer: usize,
}

impl RealtimeHub {
    pub fn new(buffer: usize) -> Self {
        Self {
            connections: DashMap::new(),
            buffer: buffer.max(1),
        }
    }

    /// Track a new connection and return it with the receiving end of its queue.
    pub fn register(&self) -> (ChannelConnection, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(self.buffer);
        let connection = ChannelConnection {
            id: ConnectionId::next(),
            established_at: Utc::now(),
            outbound: tx,
        };
        self.connections.insert(connection.id, connection.clone());
        metrics::set_realtime_connections(self.connections.len());
        (connection, rx)
    }

    pub fn unregister(&self, id: ConnectionId) {
        if self.connections.remove(&id).is_some() {
            metrics::set_realtime_connections(self.connections.len());
        }
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Queue a message for one peer. Returns false if it could not be queued.
    pub fn send_to(&self, id: ConnectionId, message: String) -> bool {
        // Clone the sender so the shard lock is not held across the send.
        let sender = match self.connections.get(&id) {
            Some(conn) => conn.outbound.clone(),
            None => return false,
        };
        sender.try_send(message).is_ok()
    }

    /// Queue a message for every peer.
    pub fn broadcast(&self, message: &str) -> BroadcastReport {
        let mut report = BroadcastReport::default();
        let mut gone = Vec::new();

        for entry in self.connections.iter() {
            match entry.outbound.try_send(message.to_string()) {
                Ok(()) => report.delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::debug!(connection = %entry.id, "Outbound queue full, dropping message");
                    report.dropped += 1;
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    report.closed += 1;
                    gone.push(entry.id);
                }
            }
        }

        for id in gone {
            self.unregister(id);
        }
        report
    }

    /// Forget every connection. Writers flush what is queued, then close.
    pub fn close_all(&self) {
        self.connections.clear();
        metrics::set_realtime_connections(0);
    }
}
