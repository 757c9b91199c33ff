//! Request pipeline.
//!
//! # Responsibilities
//! - Run every inbound request through a fixed, ordered list of stages
//! - Short-circuit with a gateway error as soon as one stage rejects
//! - Decorate every response (request ID, rate-limit headers) and write the
//!   access log line
//!
//! # Data Flow
//! ```text
//! Request → resolve client IP → origin → rate_limit → correlation_id
//!     ├─ Reject(err) ──────────────────────────────┐
//!     └─ Continue → compression → handler          │
//!                                                  ▼
//!                                decorate response → access log → Client
//! ```
//!
//! # Design Decisions
//! - Stages are synchronous functions of (request head, context); no stage
//!   awaits, so the loop never yields before dispatch
//! - Compression is a `tower-http` layer around the HTTP routes, applied
//!   between stage evaluation and the handler

pub mod stages;

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{request::Parts, HeaderMap, HeaderName, HeaderValue, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::config::GatewayConfig;
use crate::http::error::GatewayError;
use crate::http::request::{MatchedService, RequestContext, X_REQUEST_ID};
use crate::observability::{logging::ACCESS_LOG_TARGET, metrics};
use crate::security::{headers, OriginPolicy, RateDecision, RateLimiter};

pub use stages::{CorrelationStage, OriginStage, RateLimitStage};

pub const RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("ratelimit-limit");
pub const RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("ratelimit-remaining");
pub const RATELIMIT_RESET: HeaderName = HeaderName::from_static("ratelimit-reset");

/// Result of one stage.
#[derive(Debug)]
pub enum Outcome {
    Continue,
    Reject(GatewayError),
}

/// A cross-cutting check applied before dispatch.
pub trait Stage: Send + Sync {
    fn name(&self) -> &'static str;

    fn apply(&self, request: &Parts, ctx: &mut RequestContext) -> Outcome;
}

/// Ordered list of stages.
pub struct RequestPipeline {
    stages: Vec<Box<dyn Stage>>,
    trust_proxy_hops: usize,
}

impl RequestPipeline {
    pub fn new(trust_proxy_hops: usize) -> Self {
        Self {
            stages: Vec::new(),
            trust_proxy_hops,
        }
    }

    pub fn with_stage(mut self, stage: impl Stage + 'static) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    /// The standard gateway pipeline.
    ///
    /// A disabled rate limiter leaves its stage out.
    pub fn from_config(config: &GatewayConfig, policy: Arc<OriginPolicy>, limiter: Option<Arc<RateLimiter>>) -> Self {
        let mut pipeline = Self::new(config.proxy.trust_proxy_hops).with_stage(OriginStage::new(policy));
        if let Some(limiter) = limiter {
            pipeline = pipeline.with_stage(RateLimitStage::new(limiter));
        }
        pipeline.with_stage(CorrelationStage)
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Apply the stages in order, stopping at the first rejection.
    pub fn evaluate(&self, request: &Parts, ctx: &mut RequestContext) -> Result<(), GatewayError> {
        for stage in &self.stages {
            if let Outcome::Reject(err) = stage.apply(request, ctx) {
                tracing::debug!(stage = stage.name(), code = err.code(), "Request rejected by pipeline");
                return Err(err);
            }
        }
        Ok(())
    }

    pub fn client_ip(&self, headers: &HeaderMap, peer: IpAddr) -> IpAddr {
        headers::resolve_client_ip(headers, peer, self.trust_proxy_hops)
    }
}

/// Middleware entry point wrapping the whole router.
pub async fn run_pipeline(State(pipeline): State<Arc<RequestPipeline>>, request: Request<Body>, next: Next) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));

    let (parts, body) = request.into_parts();
    let mut ctx = RequestContext::new(pipeline.client_ip(&parts.headers, peer));
    let method = parts.method.clone();
    let path = parts.uri.path().to_string();

    let mut response = match pipeline.evaluate(&parts, &mut ctx) {
        Ok(()) => {
            let mut request = Request::from_parts(parts, body);
            request.extensions_mut().insert(ctx.clone());
            next.run(request).await
        }
        Err(err) => {
            if matches!(err, GatewayError::RateLimited { .. }) {
                metrics::record_rate_limited();
            }
            err.into_response()
        }
    };

    decorate(&mut response, &mut ctx);

    let request_id = ctx.correlation_id();
    let status = response.status().as_u16();
    let service = response
        .extensions()
        .get::<MatchedService>()
        .map(|m| m.0.clone())
        .unwrap_or_else(|| "none".to_string());

    tracing::info!(
        target: ACCESS_LOG_TARGET,
        request_id = %request_id,
        method = %method,
        path = %path,
        status,
        latency_ms = ctx.received_at.elapsed().as_millis() as u64,
        client_ip = %ctx.client_ip,
        service = %service,
        "request completed"
    );
    metrics::record_request(method.as_str(), status, &service, ctx.received_at);

    response
}

fn decorate(response: &mut Response, ctx: &mut RequestContext) {
    let headers = response.headers_mut();
    headers.insert(X_REQUEST_ID, ctx.correlation_id().header_value());

    match ctx.rate_limit {
        Some(RateDecision::Allowed {
            limit,
            remaining,
            reset_after,
        }) => {
            headers.insert(RATELIMIT_LIMIT, HeaderValue::from(limit));
            headers.insert(RATELIMIT_REMAINING, HeaderValue::from(remaining));
            headers.insert(RATELIMIT_RESET, HeaderValue::from(ceil_secs(reset_after)));
        }
        Some(RateDecision::Limited { limit, retry_after }) => {
            headers.insert(RATELIMIT_LIMIT, HeaderValue::from(limit));
            headers.insert(RATELIMIT_REMAINING, HeaderValue::from(0u32));
            headers.insert(RATELIMIT_RESET, HeaderValue::from(ceil_secs(retry_after)));
        }
        None => {}
    }
}

/// Whole seconds, rounded up, as advertised in rate-limit headers.
pub(crate) fn ceil_secs(d: std::time::Duration) -> u64 {
    d.as_secs() + u64::from(d.subsec_nanos() > 0)
}
