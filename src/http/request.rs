//! Per-request context.
//!
//! # Responsibilities
//! - Carry the correlation ID, resolved client address and matched service
//! - Travel with the request as an extension, never shared across requests
//!
//! # Design Decisions
//! - Correlation ID is always freshly generated; inbound values are ignored
//! - Fields are filled in by pipeline stages, in order

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Instant;

use axum::http::{HeaderName, HeaderValue};
use uuid::Uuid;

use crate::routing::ServiceDescriptor;
use crate::security::rate_limit::RateDecision;

pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Opaque per-request token used for cross-service tracing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn header_value(&self) -> HeaderValue {
        // A hyphenated UUID is always a valid header value.
        HeaderValue::from_str(&self.0.to_string()).unwrap_or_else(|_| HeaderValue::from_static("invalid"))
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// State accumulated for one inbound request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub correlation_id: Option<CorrelationId>,
    pub client_ip: IpAddr,
    pub matched_service: Option<Arc<ServiceDescriptor>>,
    pub rate_limit: Option<RateDecision>,
    pub received_at: Instant,
}

impl RequestContext {
    pub fn new(client_ip: IpAddr) -> Self {
        Self {
            correlation_id: None,
            client_ip,
            matched_service: None,
            rate_limit: None,
            received_at: Instant::now(),
        }
    }

    /// Context for a request that bypassed the pipeline.
    pub fn detached() -> Self {
        let mut ctx = Self::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        ctx.correlation_id = Some(CorrelationId::generate());
        ctx
    }

    /// Correlation ID, generating one if no stage assigned it.
    pub fn correlation_id(&mut self) -> CorrelationId {
        *self.correlation_id.get_or_insert_with(CorrelationId::generate)
    }
}

/// Key of the service that handled a request, attached to its response.
#[derive(Debug, Clone)]
pub struct MatchedService(pub String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_correlation_ids_are_unique() {
        let a = CorrelationId::generate();
        let b = CorrelationId::generate();
        assert_ne!(a, b);
        assert_eq!(a.header_value().to_str().unwrap(), a.to_string());
    }

    #[test]
    fn test_correlation_id_is_stable_once_assigned() {
        let mut ctx = RequestContext::new(IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert!(ctx.correlation_id.is_none());
        let first = ctx.correlation_id();
        assert_eq!(ctx.correlation_id(), first);
    }
}
