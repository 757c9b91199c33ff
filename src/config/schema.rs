//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the edge gateway.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Execution mode (controls CORS strictness and error verbosity).
    pub mode: ExecutionMode,

    /// Origin allow-list.
    pub cors: CorsConfig,

    /// Per-client request ceiling.
    pub rate_limit: RateLimitConfig,

    /// Upstream timeouts.
    pub timeouts: TimeoutConfig,

    /// Request size limits.
    pub limits: LimitsConfig,

    /// Forwarding behaviour (trusted proxies, forwarded-by marker).
    pub proxy: ForwardingConfig,

    /// Real-time channel settings.
    pub realtime: RealtimeConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Registered backend services.
    pub services: Vec<ServiceConfig>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listener: ListenerConfig::default(),
            mode: ExecutionMode::default(),
            cors: CorsConfig::default(),
            rate_limit: RateLimitConfig::default(),
            timeouts: TimeoutConfig::default(),
            limits: LimitsConfig::default(),
            proxy: ForwardingConfig::default(),
            realtime: RealtimeConfig::default(),
            observability: ObservabilityConfig::default(),
            services: default_services(),
        }
    }
}

/// Development vs production behaviour toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    #[default]
    Development,
    Production,
}

impl ExecutionMode {
    pub fn is_production(self) -> bool {
        self == ExecutionMode::Production
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionMode::Development => "development",
            ExecutionMode::Production => "production",
        }
    }
}

impl std::str::FromStr for ExecutionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(ExecutionMode::Development),
            "production" | "prod" => Ok(ExecutionMode::Production),
            other => Err(format!("unknown execution mode '{}'", other)),
        }
    }
}

impl std::fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:3000").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3000".to_string(),
        }
    }
}

/// Origin allow-list used in production mode.
///
/// In development mode loopback origins are accepted in addition to this list.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Window length in seconds.
    pub window_secs: u64,

    /// Maximum requests per client within one window.
    pub max_requests: u32,

    /// How often expired windows are purged, in seconds.
    pub sweep_interval_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window_secs: 15 * 60,
            max_requests: 100,
            sweep_interval_secs: 60,
        }
    }
}

/// Timeout configuration for upstream calls.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Connect + response-head deadline for each upstream call, in seconds.
    pub upstream_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { upstream_secs: 30 }
    }
}

/// Request size limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: 10 * 1024 * 1024, // 10MB
        }
    }
}

/// Forwarding configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ForwardingConfig {
    /// Number of reverse proxies in front of the gateway whose
    /// `X-Forwarded-*` headers are trusted. Zero trusts none.
    pub trust_proxy_hops: usize,

    /// Value of the `x-forwarded-by` header sent upstream.
    pub forwarded_by: String,
}

impl Default for ForwardingConfig {
    fn default() -> Self {
        Self {
            trust_proxy_hops: 0,
            forwarded_by: "edge-gateway".to_string(),
        }
    }
}

/// Real-time channel configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RealtimeConfig {
    /// Upgrade path. Must live outside the `/api` prefix space.
    pub path: String,

    /// Interval between server-initiated ping frames, in seconds.
    pub keepalive_secs: u64,

    /// Outbound queue depth per connection; messages beyond it are dropped.
    pub outbound_buffer: usize,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            path: "/ws".to_string(),
            keepalive_secs: 30,
            outbound_buffer: 32,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable the Prometheus endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// One registered backend service.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
    /// Route prefix segment: requests to `/api/<key>/...` belong to this service.
    pub key: String,

    /// Human-readable label used in diagnostics.
    pub name: String,

    /// Upstream origin (e.g., "http://localhost:3001").
    pub base_address: String,

    /// Sub-paths this backend owns. Informational; routing is by key only.
    #[serde(default)]
    pub routes: Vec<String>,

    /// Remove `/api/<key>` before forwarding.
    #[serde(default)]
    pub strip_prefix: bool,
}

impl ServiceConfig {
    pub fn new(key: &str, name: &str, base_address: &str, strip_prefix: bool) -> Self {
        Self {
            key: key.to_string(),
            name: name.to_string(),
            base_address: base_address.to_string(),
            routes: Vec::new(),
            strip_prefix,
        }
    }

    pub fn with_routes(mut self, routes: &[&str]) -> Self {
        self.routes = routes.iter().map(|r| r.to_string()).collect();
        self
    }
}

/// The dashboard backends on their development ports.
pub fn default_services() -> Vec<ServiceConfig> {
    vec![
        ServiceConfig::new("user-management", "User Management Service", "http://localhost:3001", true)
            .with_routes(&["/auth", "/users", "/profile"]),
        ServiceConfig::new("water-management", "Water Management Service", "http://localhost:3002", true)
            .with_routes(&["/meters", "/readings", "/consumption"]),
        ServiceConfig::new("notification", "Notification Service", "http://localhost:3003", true)
            .with_routes(&["/notifications", "/templates"]),
        ServiceConfig::new("complaint-management", "Complaint Management Service", "http://localhost:3004", true)
            .with_routes(&["/complaints", "/categories"]),
        ServiceConfig::new("payment-management", "Payment Management Service", "http://localhost:3006", false)
            .with_routes(&["/bills", "/payments", "/invoices"]),
    ]
}
