//! Gateway-generated error responses.
//!
//! Every failure on the request path resolves here into a JSON envelope:
//!
//! ```text
//! { "status": "error", "message": "...", "code": "SERVICE_UNAVAILABLE", ...context }
//! ```
//!
//! Context depends on the class: valid prefixes for 404s, service and hint for
//! 503s, retry delay for 429s, error and stack for 500s outside production.

use std::any::Any;
use std::backtrace::{Backtrace, BacktraceStatus};

use axum::{
    body::Body,
    http::{header, HeaderValue, Response as HttpResponse, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Map, Value};
use thiserror::Error;
use tower_http::catch_panic::ResponseForPanic;

use crate::config::ExecutionMode;
use crate::routing::ServiceDescriptor;

/// Why an upstream could not be reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamFailure {
    Timeout { secs: u64 },
    Connect(String),
}

/// Errors resolved into responses at the gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Origin {origin} is not allowed by CORS policy")]
    CorsRejected { origin: String },

    #[error("Too many requests from this IP, please try again later")]
    RateLimited { retry_after_secs: u64 },

    #[error("API endpoint {path} not found")]
    EndpointNotFound { path: String, available: Vec<String> },

    #[error("Route {path} not found")]
    RouteNotFound { path: String },

    #[error("Method {method} is not allowed on {path}")]
    MethodNotAllowed { method: String, path: String },

    #[error("WebSocket upgrade rejected: {reason}")]
    UpgradeRejected { status: StatusCode, reason: String },

    #[error("{name} is temporarily unavailable")]
    ServiceUnavailable {
        key: String,
        name: String,
        base_address: String,
        failure: UpstreamFailure,
        /// Raw client error text, kept outside production only.
        detail: Option<String>,
    },

    #[error("Request body exceeds the {limit} byte limit")]
    PayloadTooLarge { limit: usize },

    #[error("Internal server error")]
    Internal {
        /// Raw message and stack, kept outside production only.
        detail: Option<InternalDetail>,
    },
}

#[derive(Debug)]
pub struct InternalDetail {
    pub error: String,
    pub stack: Option<String>,
}

impl GatewayError {
    pub fn service_unavailable(service: &ServiceDescriptor, failure: UpstreamFailure, mode: ExecutionMode) -> Self {
        let detail = match (&failure, mode.is_production()) {
            (UpstreamFailure::Connect(raw), false) => Some(raw.clone()),
            _ => None,
        };
        GatewayError::ServiceUnavailable {
            key: service.key.clone(),
            name: service.display_name.clone(),
            base_address: service.origin.to_string(),
            failure,
            detail,
        }
    }

    pub fn internal(error: impl std::fmt::Display, mode: ExecutionMode) -> Self {
        if mode.is_production() {
            return GatewayError::Internal { detail: None };
        }
        let backtrace = Backtrace::capture();
        let stack = match backtrace.status() {
            BacktraceStatus::Captured => Some(backtrace.to_string()),
            _ => None,
        };
        GatewayError::Internal {
            detail: Some(InternalDetail {
                error: error.to_string(),
                stack,
            }),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::CorsRejected { .. } => StatusCode::FORBIDDEN,
            GatewayError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::EndpointNotFound { .. } | GatewayError::RouteNotFound { .. } => StatusCode::NOT_FOUND,
            GatewayError::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            GatewayError::UpgradeRejected { status, .. } => *status,
            GatewayError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            GatewayError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::CorsRejected { .. } => "CORS_REJECTED",
            GatewayError::RateLimited { .. } => "RATE_LIMIT_EXCEEDED",
            GatewayError::EndpointNotFound { .. } => "ENDPOINT_NOT_FOUND",
            GatewayError::RouteNotFound { .. } => "ROUTE_NOT_FOUND",
            GatewayError::MethodNotAllowed { .. } => "METHOD_NOT_ALLOWED",
            GatewayError::UpgradeRejected { .. } => "UPGRADE_REQUIRED",
            GatewayError::ServiceUnavailable { .. } => "SERVICE_UNAVAILABLE",
            GatewayError::PayloadTooLarge { .. } => "PAYLOAD_TOO_LARGE",
            GatewayError::Internal { .. } => "INTERNAL_ERROR",
        }
    }

    /// The JSON envelope.
    pub fn body(&self) -> Value {
        let mut body = Map::new();
        body.insert("status".into(), json!("error"));
        body.insert("message".into(), json!(self.to_string()));
        body.insert("code".into(), json!(self.code()));

        match self {
            GatewayError::CorsRejected { origin } => {
                body.insert("origin".into(), json!(origin));
            }
            GatewayError::RateLimited { retry_after_secs } => {
                body.insert("retryAfter".into(), json!(retry_after_secs));
            }
            GatewayError::EndpointNotFound { available, .. } => {
                body.insert("availableEndpoints".into(), json!(available));
            }
            GatewayError::RouteNotFound { path } => {
                body.insert("path".into(), json!(path));
            }
            GatewayError::MethodNotAllowed { method, path } => {
                body.insert("method".into(), json!(method));
                body.insert("path".into(), json!(path));
            }
            GatewayError::UpgradeRejected { .. } => {}
            GatewayError::ServiceUnavailable {
                key,
                name,
                base_address,
                failure,
                detail,
            } => {
                body.insert("service".into(), json!(key));
                body.insert(
                    "hint".into(),
                    json!(format!("Ensure {} is running at {}", name, base_address)),
                );
                if let UpstreamFailure::Timeout { secs } = failure {
                    body.insert("timeoutSecs".into(), json!(secs));
                }
                if let Some(detail) = detail {
                    body.insert("error".into(), json!(detail));
                }
            }
            GatewayError::PayloadTooLarge { limit } => {
                body.insert("limit".into(), json!(limit));
            }
            GatewayError::Internal { detail } => {
                if let Some(detail) = detail {
                    body.insert("error".into(), json!(detail.error));
                    if let Some(stack) = &detail.stack {
                        body.insert("stack".into(), json!(stack));
                    }
                }
            }
        }
        Value::Object(body)
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut response = (status, Json(self.body())).into_response();
        if let GatewayError::RateLimited { retry_after_secs } = &self {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(*retry_after_secs));
        }
        response
    }
}

/// Turns a handler panic into an `INTERNAL_ERROR` response.
#[derive(Debug, Clone, Copy)]
pub struct PanicResponder {
    mode: ExecutionMode,
}

impl PanicResponder {
    pub fn new(mode: ExecutionMode) -> Self {
        Self { mode }
    }
}

impl ResponseForPanic for PanicResponder {
    type ResponseBody = Body;

    fn response_for_panic(&mut self, err: Box<dyn Any + Send + 'static>) -> HttpResponse<Self::ResponseBody> {
        let message = if let Some(s) = err.downcast_ref::<String>() {
            s.clone()
        } else if let Some(s) = err.downcast_ref::<&str>() {
            s.to_string()
        } else {
            "unknown panic payload".to_string()
        };
        tracing::error!(error = %message, "Unhandled panic in request handler");
        GatewayError::internal(message, self.mode).into_response()
    }
}
