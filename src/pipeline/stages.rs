//! Built-in pipeline stages.

use std::sync::Arc;

use axum::http::{header, request::Parts};

use crate::http::error::GatewayError;
use crate::http::request::RequestContext;
use crate::pipeline::{ceil_secs, Outcome, Stage};
use crate::security::{OriginPolicy, RateDecision, RateLimiter};

/// Rejects browser requests from origins the policy does not accept.
///
/// Requests without an `Origin` header always pass.
pub struct OriginStage {
    policy: Arc<OriginPolicy>,
}

impl OriginStage {
    pub fn new(policy: Arc<OriginPolicy>) -> Self {
        Self { policy }
    }
}

impl Stage for OriginStage {
    fn name(&self) -> &'static str {
        "origin"
    }

    fn apply(&self, request: &Parts, _ctx: &mut RequestContext) -> Outcome {
        let Some(origin) = request.headers.get(header::ORIGIN) else {
            return Outcome::Continue;
        };
        let origin = String::from_utf8_lossy(origin.as_bytes()).into_owned();
        if self.policy.is_allowed(&origin) {
            Outcome::Continue
        } else {
            tracing::warn!(origin = %origin, "Origin rejected");
            Outcome::Reject(GatewayError::CorsRejected { origin })
        }
    }
}

/// Counts the request against its client's window.
pub struct RateLimitStage {
    limiter: Arc<RateLimiter>,
}

impl RateLimitStage {
    pub fn new(limiter: Arc<RateLimiter>) -> Self {
        Self { limiter }
    }
}

impl Stage for RateLimitStage {
    fn name(&self) -> &'static str {
        "rate_limit"
    }

    fn apply(&self, _request: &Parts, ctx: &mut RequestContext) -> Outcome {
        let decision = self.limiter.check(ctx.client_ip);
        ctx.rate_limit = Some(decision);
        match decision {
            RateDecision::Allowed { .. } => Outcome::Continue,
            RateDecision::Limited { retry_after, .. } => {
                tracing::warn!(client_ip = %ctx.client_ip, "Rate limit exceeded");
                Outcome::Reject(GatewayError::RateLimited {
                    retry_after_secs: ceil_secs(retry_after).max(1),
                })
            }
        }
    }
}

/// Assigns a fresh correlation ID.
pub struct CorrelationStage;

impl Stage for CorrelationStage {
    fn name(&self) -> &'static str {
        "correlation_id"
    }

    fn apply(&self, _request: &Parts, ctx: &mut RequestContext) -> Outcome {
        ctx.correlation_id = Some(crate::http::request::CorrelationId::generate());
        Outcome::Continue
    }
}
