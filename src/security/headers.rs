//! Header manipulation for forwarded traffic.
//!
//! # Responsibilities
//! - Resolve the real client IP through trusted proxies
//! - Strip hop-by-hop headers in both directions
//!
//! # Design Decisions
//! - `X-Forwarded-*` is only believed for the configured number of hops
//! - Headers named in `Connection` are hop-by-hop too

use std::net::IpAddr;

use axum::http::{header, HeaderMap, HeaderName};

pub const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
pub const X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");
pub const X_FORWARDED_BY: HeaderName = HeaderName::from_static("x-forwarded-by");

/// Headers that describe one transport hop and must not be relayed.
pub const HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// Remove hop-by-hop headers, including any listed in `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let named: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in named.iter().chain(HOP_BY_HOP.iter()) {
        headers.remove(name);
    }
    // Legacy proxies still send this one.
    headers.remove("proxy-connection");
}

/// Resolve the client address.
///
/// The chain is every `X-Forwarded-For` entry followed by the socket peer.
/// Trusting `hops` proxies means skipping that many entries from the right;
/// the walk stops early at the first unparseable entry.
pub fn resolve_client_ip(headers: &HeaderMap, peer: IpAddr, hops: usize) -> IpAddr {
    if hops == 0 {
        return peer;
    }

    let forwarded: Vec<&str> = headers
        .get_all(&X_FORWARDED_FOR)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();

    let mut client = peer;
    for entry in forwarded.iter().rev().take(hops) {
        match entry.parse::<IpAddr>() {
            Ok(ip) => client = ip,
            Err(_) => break,
        }
    }
    client
}

/// Scheme the client used, as far as trusted proxies report it.
pub fn forwarded_proto(headers: &HeaderMap, hops: usize) -> &'static str {
    if hops == 0 {
        return "http";
    }
    let reported = headers
        .get(&X_FORWARDED_PROTO)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_ascii_lowercase());
    match reported.as_deref() {
        Some("https") => "https",
        _ => "http",
    }
}
