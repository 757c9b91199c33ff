//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate service keys and upstream origins
//! - Validate value ranges (timeouts > 0, windows > 0)
//! - Detect conflicting paths (duplicate keys, real-time path inside `/api`)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use thiserror::Error;
use url::Url;

use crate::config::schema::GatewayConfig;
use crate::routing::{self, descriptor};

/// A single semantic problem found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("listener.bind_address '{0}' is not a socket address")]
    BindAddress(String),

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("cors.allowed_origins entry '{0}' is not an origin")]
    Origin(String),

    #[error("realtime.path '{0}' must start with '/', live outside /api and not shadow /health or /version")]
    RealtimePath(String),

    #[error("observability.metrics_address '{0}' is not a socket address")]
    MetricsAddress(String),

    #[error("no services registered")]
    NoServices,

    #[error("service key '{0}' is invalid (expected lowercase letters, digits, '-' or '_')")]
    ServiceKey(String),

    #[error("service key '{0}' is registered more than once")]
    DuplicateKey(String),

    #[error("service '{key}' base_address '{address}': {reason}")]
    BaseAddress {
        key: String,
        address: String,
        reason: String,
    },

    #[error("service '{key}' route '{route}' must start with '/'")]
    ServiceRoute { key: String, route: String },
}

/// Validate a deserialized configuration.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(config.listener.bind_address.clone()));
    }

    if config.timeouts.upstream_secs == 0 {
        errors.push(ValidationError::Zero { field: "timeouts.upstream_secs" });
    }
    if config.limits.max_body_bytes == 0 {
        errors.push(ValidationError::Zero { field: "limits.max_body_bytes" });
    }
    if config.rate_limit.enabled {
        if config.rate_limit.window_secs == 0 {
            errors.push(ValidationError::Zero { field: "rate_limit.window_secs" });
        }
        if config.rate_limit.max_requests == 0 {
            errors.push(ValidationError::Zero { field: "rate_limit.max_requests" });
        }
        if config.rate_limit.sweep_interval_secs == 0 {
            errors.push(ValidationError::Zero { field: "rate_limit.sweep_interval_secs" });
        }
    }
    if config.realtime.keepalive_secs == 0 {
        errors.push(ValidationError::Zero { field: "realtime.keepalive_secs" });
    }
    if config.realtime.outbound_buffer == 0 {
        errors.push(ValidationError::Zero { field: "realtime.outbound_buffer" });
    }

    for origin in &config.cors.allowed_origins {
        let valid = Url::parse(origin)
            .map(|url| url.has_host() && matches!(url.scheme(), "http" | "https"))
            .unwrap_or(false);
        if !valid {
            errors.push(ValidationError::Origin(origin.clone()));
        }
    }

    let rt_path = &config.realtime.path;
    let reserved = matches!(rt_path.as_str(), "/health" | "/version");
    if !rt_path.starts_with('/') || reserved || routing::is_under_api_root(rt_path) {
        errors.push(ValidationError::RealtimePath(rt_path.clone()));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::MetricsAddress(config.observability.metrics_address.clone()));
    }

    if config.services.is_empty() {
        errors.push(ValidationError::NoServices);
    }

    let mut seen = HashSet::new();
    for service in &config.services {
        if !descriptor::is_valid_key(&service.key) {
            errors.push(ValidationError::ServiceKey(service.key.clone()));
        }
        if !seen.insert(service.key.as_str()) {
            errors.push(ValidationError::DuplicateKey(service.key.clone()));
        }
        if let Err(e) = descriptor::parse_origin(&service.base_address) {
            errors.push(ValidationError::BaseAddress {
                key: service.key.clone(),
                address: service.base_address.clone(),
                reason: e.to_string(),
            });
        }
        for route in &service.routes {
            if !route.starts_with('/') {
                errors.push(ValidationError::ServiceRoute {
                    key: service.key.clone(),
                    route: route.clone(),
                });
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
