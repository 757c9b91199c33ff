//! Proxy dispatcher.
//!
//! # Responsibilities
//! - Resolve `/api/<key>` through the service registry
//! - Rewrite the path per the descriptor and build the upstream request
//! - Forward with a fixed deadline, relay the response as a stream
//! - Confine upstream failure to the one request that hit it
//!
//! # Design Decisions
//! - One HTTP client (and connection pool) per service, so a stalled backend
//!   cannot exhaust connections used for another
//! - The upstream future is owned by the handler: a client disconnect drops it
//! - No retries; every upstream call happens at most once

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::{header, uri::PathAndQuery, HeaderValue, Request, Uri},
    response::{IntoResponse, Response},
};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};

use crate::config::{ExecutionMode, GatewayConfig};
use crate::http::error::{GatewayError, UpstreamFailure};
use crate::http::request::{RequestContext, X_REQUEST_ID};
use crate::http::response;
use crate::http::server::AppState;
use crate::observability::metrics;
use crate::routing::{self, ServiceDescriptor, ServiceRegistry};
use crate::security::{headers, limits};

type UpstreamClient = Client<HttpConnector, Body>;

/// Forwards requests to registered services.
pub struct ProxyDispatcher {
    registry: Arc<ServiceRegistry>,
    clients: HashMap<String, UpstreamClient>,
    timeout: Duration,
    max_body_bytes: usize,
    trust_proxy_hops: usize,
    forwarded_by: HeaderValue,
    mode: ExecutionMode,
}

impl ProxyDispatcher {
    pub fn new(registry: Arc<ServiceRegistry>, config: &GatewayConfig) -> Self {
        let timeout = Duration::from_secs(config.timeouts.upstream_secs);

        let clients = registry
            .services()
            .iter()
            .map(|service| {
                let mut connector = HttpConnector::new();
                connector.set_connect_timeout(Some(timeout));
                connector.set_nodelay(true);
                let client = Client::builder(TokioExecutor::new()).build(connector);
                (service.key.clone(), client)
            })
            .collect();

        let forwarded_by = HeaderValue::from_str(&config.proxy.forwarded_by)
            .unwrap_or_else(|_| HeaderValue::from_static("edge-gateway"));

        Self {
            registry,
            clients,
            timeout,
            max_body_bytes: config.limits.max_body_bytes,
            trust_proxy_hops: config.proxy.trust_proxy_hops,
            forwarded_by,
            mode: config.mode,
        }
    }

    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    /// Resolve and forward one request.
    pub async fn dispatch(&self, request: Request<Body>, ctx: &mut RequestContext) -> Result<Response, GatewayError> {
        let path = request.uri().path().to_string();

        let service = routing::split_api_path(&path)
            .and_then(|(key, _)| self.registry.resolve(key))
            .cloned()
            .ok_or_else(|| GatewayError::EndpointNotFound {
                path: path.clone(),
                available: self.registry.prefixes(),
            })?;
        ctx.matched_service = Some(Arc::clone(&service));

        let client = self
            .clients
            .get(&service.key)
            .ok_or_else(|| GatewayError::internal(format!("no client for service '{}'", service.key), self.mode))?;

        if limits::exceeds_declared(request.headers(), self.max_body_bytes) {
            return Err(GatewayError::PayloadTooLarge {
                limit: self.max_body_bytes,
            });
        }

        let upstream_request = self.build_upstream_request(&service, request, ctx)?;

        tracing::debug!(
            request_id = ?ctx.correlation_id,
            service = %service.key,
            upstream = %upstream_request.uri(),
            "Forwarding request"
        );

        match tokio::time::timeout(self.timeout, client.request(upstream_request)).await {
            Ok(Ok(upstream_response)) => Ok(response::relay(upstream_response, &service.key)),
            Ok(Err(e)) => {
                if limits::is_length_limit(&e) {
                    return Err(GatewayError::PayloadTooLarge {
                        limit: self.max_body_bytes,
                    });
                }
                tracing::warn!(
                    request_id = ?ctx.correlation_id,
                    service = %service.key,
                    upstream = %service.origin,
                    error = %e,
                    "Upstream request failed"
                );
                metrics::record_upstream_failure(&service.key, "connect");
                Err(GatewayError::service_unavailable(
                    &service,
                    UpstreamFailure::Connect(e.to_string()),
                    self.mode,
                ))
            }
            Err(_) => {
                tracing::warn!(
                    request_id = ?ctx.correlation_id,
                    service = %service.key,
                    upstream = %service.origin,
                    timeout_secs = self.timeout.as_secs(),
                    "Upstream request timed out"
                );
                metrics::record_upstream_failure(&service.key, "timeout");
                Err(GatewayError::service_unavailable(
                    &service,
                    UpstreamFailure::Timeout {
                        secs: self.timeout.as_secs(),
                    },
                    self.mode,
                ))
            }
        }
    }

    fn build_upstream_request(
        &self,
        service: &ServiceDescriptor,
        request: Request<Body>,
        ctx: &mut RequestContext,
    ) -> Result<Request<Body>, GatewayError> {
        let (parts, body) = request.into_parts();

        let inbound_path = parts.uri.path();
        if let Some((_, rest)) = routing::split_api_path(inbound_path) {
            if !service.declares(rest) {
                tracing::debug!(service = %service.key, path = %rest, "Path outside declared sub-paths");
            }
        }

        let forwarded_path = service.forward_path(inbound_path);
        let path_and_query = match parts.uri.query() {
            Some(query) => format!("{}?{}", forwarded_path, query),
            None => forwarded_path.into_owned(),
        };
        let path_and_query = path_and_query
            .parse::<PathAndQuery>()
            .map_err(|e| GatewayError::internal(e, self.mode))?;

        let uri = Uri::builder()
            .scheme(service.origin.scheme.clone())
            .authority(service.origin.authority.clone())
            .path_and_query(path_and_query)
            .build()
            .map_err(|e| GatewayError::internal(e, self.mode))?;

        let mut headers = parts.headers.clone();
        headers::strip_hop_by_hop(&mut headers);
        headers.remove(header::HOST);

        let client_ip = HeaderValue::from_str(&ctx.client_ip.to_string())
            .map_err(|e| GatewayError::internal(e, self.mode))?;
        let proto = headers::forwarded_proto(&parts.headers, self.trust_proxy_hops);

        headers.insert(X_REQUEST_ID, ctx.correlation_id().header_value());
        headers.insert(headers::X_FORWARDED_FOR, client_ip);
        headers.insert(headers::X_FORWARDED_PROTO, HeaderValue::from_static(proto));
        headers.insert(headers::X_FORWARDED_BY, self.forwarded_by.clone());

        let mut builder = Request::builder().method(parts.method).uri(uri);
        if let Some(h) = builder.headers_mut() {
            *h = headers;
        }
        builder
            .body(limits::limit_body(body, self.max_body_bytes))
            .map_err(|e| GatewayError::internal(e, self.mode))
    }
}

/// Handler for everything under `/api/`.
pub async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let mut ctx = request
        .extensions()
        .get::<RequestContext>()
        .cloned()
        .unwrap_or_else(RequestContext::detached);

    match state.dispatcher.dispatch(request, &mut ctx).await {
        Ok(response) => response,
        Err(err) => {
            let mut response = err.into_response();
            if let Some(service) = &ctx.matched_service {
                response
                    .extensions_mut()
                    .insert(crate::http::request::MatchedService(service.key.clone()));
            }
            response
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServiceConfig;
    use std::net::IpAddr;

    fn dispatcher(services: Vec<ServiceConfig>) -> ProxyDispatcher {
        let mut config = GatewayConfig::default();
        config.services = services;
        let registry = Arc::new(ServiceRegistry::from_config(&config.services).unwrap());
        ProxyDispatcher::new(registry, &config)
    }

    fn ctx() -> RequestContext {
        let mut ctx = RequestContext::new("198.51.100.4".parse::<IpAddr>().unwrap());
        ctx.correlation_id();
        ctx
    }

    #[test]
    fn test_upstream_request_strips_prefix() {
        let d = dispatcher(vec![ServiceConfig::new("user-management", "Users", "http://localhost:3001", true)]);
        let service = d.registry().resolve("user-management").unwrap().clone();
        let request = Request::get("/api/user-management/profile?tab=security")
            .header(header::AUTHORIZATION, "Bearer token-1")
            .header(header::HOST, "gateway.local")
            .header(header::CONNECTION, "keep-alive")
            .body(Body::empty())
            .unwrap();

        let mut ctx = ctx();
        let upstream = d.build_upstream_request(&service, request, &mut ctx).unwrap();

        assert_eq!(upstream.uri(), "http://localhost:3001/profile?tab=security");
        let h = upstream.headers();
        assert_eq!(h[header::AUTHORIZATION], "Bearer token-1");
        assert!(h.get(header::HOST).is_none());
        assert!(h.get(header::CONNECTION).is_none());
        assert_eq!(h[X_REQUEST_ID], ctx.correlation_id.unwrap().to_string().as_str());
        assert_eq!(h[headers::X_FORWARDED_FOR], "198.51.100.4");
        assert_eq!(h[headers::X_FORWARDED_PROTO], "http");
        assert_eq!(h[headers::X_FORWARDED_BY], "edge-gateway");
    }

    #[test]
    fn test_upstream_request_preserves_prefix() {
        let d = dispatcher(vec![ServiceConfig::new(
            "payment-management",
            "Payments",
            "http://localhost:3006",
            false,
        )]);
        let service = d.registry().resolve("payment-management").unwrap().clone();
        let request = Request::get("/api/payment-management/bills/42/")
            .body(Body::empty())
            .unwrap();

        let upstream = d.build_upstream_request(&service, request, &mut ctx()).unwrap();
        assert_eq!(upstream.uri(), "http://localhost:3006/api/payment-management/bills/42/");
    }

    #[tokio::test]
    async fn test_unknown_prefix_never_reaches_upstream() {
        let d = dispatcher(vec![ServiceConfig::new("user-management", "Users", "http://localhost:3001", true)]);
        let request = Request::get("/api/billing/invoices").body(Body::empty()).unwrap();
        let mut ctx = ctx();

        let err = d.dispatch(request, &mut ctx).await.unwrap_err();
        assert_eq!(err.code(), "ENDPOINT_NOT_FOUND");
        assert!(ctx.matched_service.is_none());
    }

    #[tokio::test]
    async fn test_declared_oversize_body_rejected() {
        let mut config = GatewayConfig::default();
        config.limits.max_body_bytes = 8;
        config.services = vec![ServiceConfig::new("user-management", "Users", "http://localhost:3001", true)];
        let registry = Arc::new(ServiceRegistry::from_config(&config.services).unwrap());
        let d = ProxyDispatcher::new(registry, &config);

        let request = Request::post("/api/user-management/users")
            .header(header::CONTENT_LENGTH, "64")
            .body(Body::from(vec![0u8; 64]))
            .unwrap();
        let err = d.dispatch(request, &mut ctx()).await.unwrap_err();
        assert_eq!(err.code(), "PAYLOAD_TOO_LARGE");
    }
}
