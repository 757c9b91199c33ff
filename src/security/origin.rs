//! Origin validation.
//!
//! # Responsibilities
//! - Decide whether a browser `Origin` may call the gateway
//! - Build the CORS response layer from the same decision
//!
//! # Design Decisions
//! - Development: any loopback origin on any port, plus the allow-list
//! - Production: the allow-list only
//! - Missing `Origin` (same-origin, non-browser) is always allowed

use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::{header, HeaderName, HeaderValue, Method};
use tower_http::cors::{AllowHeaders, AllowOrigin, CorsLayer};
use url::{Host, Url};

use crate::config::{CorsConfig, ExecutionMode};
use crate::http::request::X_REQUEST_ID;

/// Origin decision shared by the pipeline stage and the CORS layer.
#[derive(Debug, Clone)]
pub struct OriginPolicy {
    mode: ExecutionMode,
    allowed: HashSet<String>,
}

impl OriginPolicy {
    pub fn new(mode: ExecutionMode, config: &CorsConfig) -> Self {
        Self {
            mode,
            allowed: config
                .allowed_origins
                .iter()
                .map(|o| normalize(o).to_string())
                .collect(),
        }
    }

    /// Whether `origin` (an `Origin` header value) is allowed.
    pub fn is_allowed(&self, origin: &str) -> bool {
        let origin = normalize(origin);
        if self.allowed.contains(origin) {
            return true;
        }
        !self.mode.is_production() && is_loopback_origin(origin)
    }

    /// CORS response headers for allowed origins, and preflight answers.
    pub fn cors_layer(self: &Arc<Self>) -> CorsLayer {
        let policy = Arc::clone(self);
        CorsLayer::new()
            .allow_origin(AllowOrigin::predicate(move |origin: &HeaderValue, _| {
                origin.to_str().map(|o| policy.is_allowed(o)).unwrap_or(false)
            }))
            .allow_credentials(true)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::PATCH,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers(AllowHeaders::list([
                header::CONTENT_TYPE,
                header::AUTHORIZATION,
                header::ACCEPT,
                HeaderName::from_static("x-requested-with"),
                X_REQUEST_ID,
            ]))
            .expose_headers([X_REQUEST_ID])
            .max_age(Duration::from_secs(24 * 60 * 60))
    }
}

fn normalize(origin: &str) -> &str {
    origin.trim().trim_end_matches('/')
}

/// `http(s)://localhost`, `127.0.0.0/8` or `[::1]`, any port.
fn is_loopback_origin(origin: &str) -> bool {
    let Ok(url) = Url::parse(origin) else {
        return false;
    };
    if !matches!(url.scheme(), "http" | "https") {
        return false;
    }
    match url.host() {
        Some(Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
        Some(Host::Ipv4(ip)) => IpAddr::V4(ip).is_loopback(),
        Some(Host::Ipv6(ip)) => IpAddr::V6(ip).is_loopback(),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(mode: ExecutionMode, allowed: &[&str]) -> OriginPolicy {
        OriginPolicy::new(
            mode,
            &CorsConfig {
                allowed_origins: allowed.iter().map(|o| o.to_string()).collect(),
            },
        )
    }

    #[test]
    fn test_development_accepts_loopback_on_any_port() {
        let p = policy(ExecutionMode::Development, &[]);
        assert!(p.is_allowed("http://localhost:4173"));
        assert!(p.is_allowed("http://localhost:5173"));
        assert!(p.is_allowed("http://127.0.0.1:8080"));
        assert!(p.is_allowed("http://[::1]:3000"));
        assert!(p.is_allowed("https://LOCALHOST"));
        assert!(!p.is_allowed("http://evil.example.com"));
        assert!(!p.is_allowed("http://localhost.evil.example.com"));
        assert!(!p.is_allowed("null"));
    }

    #[test]
    fn test_production_uses_allow_list_only() {
        let p = policy(ExecutionMode::Production, &["https://admin.example.com/"]);
        assert!(p.is_allowed("https://admin.example.com"));
        assert!(!p.is_allowed("http://localhost:4173"));
        assert!(!p.is_allowed("https://other.example.com"));
    }

    #[test]
    fn test_development_also_honours_allow_list() {
        let p = policy(ExecutionMode::Development, &["https://admin.example.com"]);
        assert!(p.is_allowed("https://admin.example.com"));
    }
}
