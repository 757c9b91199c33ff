//! Edge gateway library.
//!
//! One network-facing process in front of the dashboard backends: resolves
//! `/api/<service>` against a static registry, forwards with per-service
//! isolation, and hosts a real-time WebSocket channel on the same port.

// Core subsystems
pub mod config;
pub mod http;
pub mod pipeline;
pub mod realtime;
pub mod routing;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;
pub mod security;

pub use config::GatewayConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
