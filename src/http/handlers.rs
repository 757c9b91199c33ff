//! Gateway-local endpoints and the terminal fallback.

use axum::{
    extract::State,
    http::{Method, Uri},
    response::IntoResponse,
    Json,
};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;

use crate::http::error::GatewayError;
use crate::http::server::AppState;
use crate::routing;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatus {
    pub status: &'static str,
    pub timestamp: String,
    pub uptime: f64,
    pub environment: &'static str,
    pub services: usize,
    pub realtime_connections: usize,
}

#[derive(Serialize)]
pub struct VersionInfo {
    pub name: &'static str,
    pub version: &'static str,
    pub description: &'static str,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "OK",
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        uptime: state.started_at.elapsed().as_secs_f64(),
        environment: state.config.mode.as_str(),
        services: state.dispatcher.registry().len(),
        realtime_connections: state.hub.len(),
    })
}

pub async fn version() -> Json<VersionInfo> {
    Json(VersionInfo {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        description: env!("CARGO_PKG_DESCRIPTION"),
    })
}

/// Anything no route claimed.
pub async fn fallback(State(state): State<AppState>, uri: Uri) -> impl IntoResponse {
    let path = uri.path().to_string();
    if routing::is_under_api_root(&path) {
        GatewayError::EndpointNotFound {
            path,
            available: state.dispatcher.registry().prefixes(),
        }
    } else {
        GatewayError::RouteNotFound { path }
    }
}

/// A known path hit with a method it does not serve.
pub async fn method_not_allowed(method: Method, uri: Uri) -> GatewayError {
    GatewayError::MethodNotAllowed {
        method: method.to_string(),
        path: uri.path().to_string(),
    }
}
