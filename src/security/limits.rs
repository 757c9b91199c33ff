//! Request body limits.
//!
//! # Responsibilities
//! - Reject a declared `Content-Length` above the maximum before dispatch
//! - Bound streamed bodies without buffering them
//! - Recognize a limit breach inside an upstream client error
//!
//! # Design Decisions
//! - Limits checked before any upstream connection is made (early rejection)
//! - Chunked bodies are wrapped, so the breach surfaces mid-stream

use axum::body::Body;
use axum::http::{header, HeaderMap};
use http_body_util::{LengthLimitError, Limited};

/// Declared body length, when present and parseable.
pub fn declared_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

/// Whether the declared length exceeds `max`.
pub fn exceeds_declared(headers: &HeaderMap, max: usize) -> bool {
    declared_length(headers).is_some_and(|len| len > max as u64)
}

/// Wrap `body` so reading more than `max` bytes fails.
pub fn limit_body(body: Body, max: usize) -> Body {
    Body::new(Limited::new(body, max))
}

/// Whether `err` (or anything in its source chain) is a body limit breach.
pub fn is_length_limit(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        if e.is::<LengthLimitError>() {
            return true;
        }
        current = e.source();
    }
    false
}
