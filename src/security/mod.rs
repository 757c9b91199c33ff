//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → origin.rs (CORS policy per execution mode)
//!     → rate_limit.rs (per-IP window counters)
//!     → limits.rs (request body ceiling)
//!     → headers.rs (client IP resolution, hop-by-hop stripping, X-Forwarded-*)
//!     → Pass to dispatch
//! ```
//!
//! # Design Decisions
//! - Fail closed: reject on any security check failure
//! - Forwarding headers are only trusted for the configured proxy depth

pub mod headers;
pub mod limits;
pub mod origin;
pub mod rate_limit;

pub use origin::OriginPolicy;
pub use rate_limit::{RateDecision, RateLimiter};
