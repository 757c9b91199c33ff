//! Service descriptors.
//!
//! # Responsibilities
//! - Represent a single registered backend
//! - Validate the upstream origin once, at construction
//! - Compute the forwarded path (strip or preserve the registry prefix)

use axum::http::uri::{Authority, Scheme};
use thiserror::Error;
use url::Url;

use crate::config::ServiceConfig;
use crate::routing::API_ROOT;

/// Why a base address is not a usable upstream origin.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OriginError {
    #[error("not a URL: {0}")]
    Malformed(String),
    #[error("scheme '{0}' is not supported (expected http)")]
    Scheme(String),
    #[error("missing host")]
    MissingHost,
    #[error("an origin carries no path, query or fragment")]
    NotAnOrigin,
}

/// A validated upstream origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamOrigin {
    pub scheme: Scheme,
    pub authority: Authority,
}

impl std::fmt::Display for UpstreamOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}://{}", self.scheme, self.authority)
    }
}

/// Parse a base address into an origin.
///
/// Only plain `http` origins are accepted; a trailing `/` is tolerated.
pub fn parse_origin(raw: &str) -> Result<UpstreamOrigin, OriginError> {
    let url = Url::parse(raw).map_err(|e| OriginError::Malformed(e.to_string()))?;
    if url.scheme() != "http" {
        return Err(OriginError::Scheme(url.scheme().to_string()));
    }
    let host = url.host_str().ok_or(OriginError::MissingHost)?;
    if url.path() != "/" || url.query().is_some() || url.fragment().is_some() {
        return Err(OriginError::NotAnOrigin);
    }
    if !url.username().is_empty() || url.password().is_some() {
        return Err(OriginError::NotAnOrigin);
    }

    // Url strips default ports; keep the authority as written.
    let authority = match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    };
    let authority = authority
        .parse::<Authority>()
        .map_err(|e| OriginError::Malformed(e.to_string()))?;

    Ok(UpstreamOrigin {
        scheme: Scheme::HTTP,
        authority,
    })
}

/// Keys are single path segments: lowercase ASCII letters, digits, `-`, `_`.
pub fn is_valid_key(key: &str) -> bool {
    !key.is_empty()
        && key
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-' || b == b'_')
}

/// One registered backend.
#[derive(Debug, Clone)]
pub struct ServiceDescriptor {
    pub key: String,
    pub display_name: String,
    pub origin: UpstreamOrigin,
    pub matched_subpaths: Vec<String>,
    pub strip_prefix: bool,
}

impl ServiceDescriptor {
    pub fn from_config(config: &ServiceConfig) -> Result<Self, OriginError> {
        Ok(Self {
            key: config.key.clone(),
            display_name: config.name.clone(),
            origin: parse_origin(&config.base_address)?,
            matched_subpaths: config.routes.clone(),
            strip_prefix: config.strip_prefix,
        })
    }

    /// The public prefix this service answers on, e.g. `/api/user-management`.
    pub fn prefix(&self) -> String {
        format!("{}/{}", API_ROOT, self.key)
    }

    /// Path to request upstream for an inbound path owned by this service.
    ///
    /// With `strip_prefix` the `/api/<key>` prefix is removed (an empty
    /// remainder becomes `/`); otherwise the path is forwarded unchanged.
    pub fn forward_path<'a>(&self, inbound_path: &'a str) -> std::borrow::Cow<'a, str> {
        if !self.strip_prefix {
            return inbound_path.into();
        }
        let rest = inbound_path
            .strip_prefix(API_ROOT)
            .and_then(|p| p.strip_prefix('/'))
            .and_then(|p| p.strip_prefix(self.key.as_str()))
            .unwrap_or(inbound_path);
        if rest.is_empty() {
            "/".into()
        } else {
            rest.into()
        }
    }

    /// Whether `rest` (the path below the prefix) falls under a declared sub-path.
    ///
    /// Services that declare nothing own everything.
    pub fn declares(&self, rest: &str) -> bool {
        self.matched_subpaths.is_empty()
            || self.matched_subpaths.iter().any(|sub| {
                rest.strip_prefix(sub.as_str())
                    .map(|tail| tail.is_empty() || tail.starts_with('/'))
                    .unwrap_or(false)
            })
    }
}
