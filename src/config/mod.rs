//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize, GATEWAY_* env overrides)
//!     → validation.rs (semantic checks, all errors collected)
//!     → GatewayConfig (validated, immutable)
//!     → shared via Arc to all subsystems
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    CorsConfig, ExecutionMode, ForwardingConfig, GatewayConfig, LimitsConfig, ListenerConfig,
    LogFormat, ObservabilityConfig, RateLimitConfig, RealtimeConfig, ServiceConfig, TimeoutConfig,
};
pub use validation::{validate_config, ValidationError};
