//! Real-time channel.
//!
//! A persistent WebSocket connection on its own path, independent of the
//! proxy. The hub tracks peers for diagnostics and fan-out; `message` defines
//! the JSON envelope both sides speak.

pub mod hub;
pub mod message;

pub use hub::{BroadcastReport, ChannelConnection, ConnectionId, RealtimeHub};
pub use message::{respond, ServerMessage};
