//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, layers)
//!     → pipeline (origin, rate limit, correlation ID)
//!     → proxy.rs (registry lookup, rewrite, forward)      /api/*
//!       websocket.rs (real-time upgrade)                  /ws
//!       handlers.rs (health, version, fallback)           everything else
//!     → response.rs (strip hop-by-hop, tag gateway)
//!     → error.rs (structured JSON for every gateway-made failure)
//! ```

pub mod error;
pub mod handlers;
pub mod proxy;
pub mod request;
pub mod response;
pub mod server;
pub mod websocket;

pub use error::GatewayError;
pub use request::{CorrelationId, RequestContext, X_REQUEST_ID};
pub use server::{AppState, HttpServer};
