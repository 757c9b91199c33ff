//! Response handling and transformation.
//!
//! # Responsibilities
//! - Turn an upstream response into the client response
//! - Strip hop-by-hop headers, tag the gateway identity
//!
//! # Design Decisions
//! - Streaming responses avoid buffering entire body
//! - Status and end-to-end headers relayed verbatim

use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, Response as HttpResponse},
    response::Response,
};
use hyper::body::Incoming;

use crate::http::request::MatchedService;
use crate::security::headers::strip_hop_by_hop;

pub const X_GATEWAY: HeaderName = HeaderName::from_static("x-gateway");
pub const GATEWAY_IDENTITY: &str = concat!("edge-gateway/", env!("CARGO_PKG_VERSION"));

/// Relay an upstream response to the client.
pub fn relay(upstream: HttpResponse<Incoming>, service_key: &str) -> Response {
    let (mut parts, body) = upstream.into_parts();
    strip_hop_by_hop(&mut parts.headers);
    parts
        .headers
        .insert(X_GATEWAY, HeaderValue::from_static(GATEWAY_IDENTITY));
    parts.extensions.insert(MatchedService(service_key.to_string()));
    Response::from_parts(parts, Body::new(body))
}
