//! HTTP server setup.
//!
//! # Responsibilities
//! - Build the service registry, dispatcher, pipeline and real-time hub
//! - Create the Axum router and wire the layers
//! - Serve until shutdown, then notify real-time peers and drain
//!
//! # Layering (outermost first)
//! ```text
//! CORS → request pipeline → panic catcher → routes
//!                                           ├─ /ws           (real-time upgrade)
//!                                           └─ compression → /health, /version, /api/*, fallback
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    middleware,
    routing::{any, get},
    Router,
};
use chrono::Utc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{catch_panic::CatchPanicLayer, compression::CompressionLayer};

use crate::config::{validate_config, ConfigError, GatewayConfig};
use crate::http::error::PanicResponder;
use crate::http::proxy::{proxy_handler, ProxyDispatcher};
use crate::http::{handlers, websocket};
use crate::lifecycle::StartupError;
use crate::pipeline::{run_pipeline, RequestPipeline};
use crate::realtime::{RealtimeHub, ServerMessage};
use crate::routing::ServiceRegistry;
use crate::security::{OriginPolicy, RateLimiter};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<ProxyDispatcher>,
    pub hub: Arc<RealtimeHub>,
    pub config: Arc<GatewayConfig>,
    pub started_at: Instant,
}

/// HTTP server for the gateway.
pub struct HttpServer {
    config: Arc<GatewayConfig>,
    state: AppState,
    policy: Arc<OriginPolicy>,
    pipeline: Arc<RequestPipeline>,
    limiter: Option<Arc<RateLimiter>>,
}

impl HttpServer {
    /// Validate the configuration and build every subsystem.
    pub fn new(config: GatewayConfig) -> Result<Self, StartupError> {
        validate_config(&config).map_err(ConfigError::Validation)?;
        let config = Arc::new(config);

        let registry = Arc::new(ServiceRegistry::from_config(&config.services)?);
        let dispatcher = Arc::new(ProxyDispatcher::new(registry, &config));
        let hub = Arc::new(RealtimeHub::new(config.realtime.outbound_buffer));

        let policy = Arc::new(OriginPolicy::new(config.mode, &config.cors));
        let limiter = config
            .rate_limit
            .enabled
            .then(|| Arc::new(RateLimiter::from_config(&config.rate_limit)));
        let pipeline = Arc::new(RequestPipeline::from_config(&config, Arc::clone(&policy), limiter.clone()));

        let state = AppState {
            dispatcher,
            hub,
            config: Arc::clone(&config),
            started_at: Instant::now(),
        };

        Ok(Self {
            config,
            state,
            policy,
            pipeline,
            limiter,
        })
    }

    /// Build the Axum router with all layers.
    pub fn router(&self) -> Router {
        let http_routes = Router::new()
            .route("/health", get(handlers::health))
            .route("/version", get(handlers::version))
            .route("/api/{*path}", any(proxy_handler))
            .fallback(handlers::fallback)
            .layer(CompressionLayer::new());

        Router::new()
            .route(&self.config.realtime.path, get(websocket::realtime_handler))
            .merge(http_routes)
            .method_not_allowed_fallback(handlers::method_not_allowed)
            .with_state(self.state.clone())
            .layer(CatchPanicLayer::custom(PanicResponder::new(self.config.mode)))
            .layer(middleware::from_fn_with_state(Arc::clone(&self.pipeline), run_pipeline))
            .layer(self.policy.cors_layer())
    }

    pub fn hub(&self) -> Arc<RealtimeHub> {
        Arc::clone(&self.state.hub)
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Serve on `listener` until `shutdown` fires.
    pub async fn run(self, listener: TcpListener, mut shutdown: broadcast::Receiver<()>) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            mode = %self.config.mode,
            services = self.state.dispatcher.registry().len(),
            realtime_path = %self.config.realtime.path,
            "HTTP server starting"
        );

        if let Some(limiter) = &self.limiter {
            let interval = Duration::from_secs(self.config.rate_limit.sweep_interval_secs);
            tokio::spawn(Arc::clone(limiter).run_sweeper(interval, shutdown.resubscribe()));
        }

        let hub = self.hub();
        let app = self.router().into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                let report = hub.broadcast(&ServerMessage::shutdown(Utc::now()).to_json());
                tracing::info!(
                    notified = report.delivered,
                    dropped = report.dropped,
                    "Shutdown signal received, draining connections"
                );
                hub.close_all();
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, StatusCode},
    };
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::config::{ExecutionMode, ServiceConfig};

    fn server(mode: ExecutionMode) -> HttpServer {
        let mut config = GatewayConfig::default();
        config.mode = mode;
        config.services = vec![ServiceConfig::new(
            "user-management",
            "User Management Service",
            "http://127.0.0.1:3001",
            true,
        )];
        HttpServer::new(config).unwrap()
    }

    async fn json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_unknown_api_prefix_lists_endpoints() {
        let app = server(ExecutionMode::Development).router();
        let response = app
            .oneshot(Request::get("/api/billing/invoices").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response.headers().contains_key(crate::http::X_REQUEST_ID));
        let body = json(response).await;
        assert_eq!(body["code"], "ENDPOINT_NOT_FOUND");
        assert_eq!(body["availableEndpoints"][0], "/api/user-management");
    }

    #[tokio::test]
    async fn test_api_root_itself_is_endpoint_not_found() {
        let app = server(ExecutionMode::Development).router();
        let response = app.oneshot(Request::get("/api/").body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(json(response).await["code"], "ENDPOINT_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_unknown_route_echoes_path() {
        let app = server(ExecutionMode::Development).router();
        let response = app.oneshot(Request::get("/nowhere").body(Body::empty()).unwrap()).await.unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = json(response).await;
        assert_eq!(body["code"], "ROUTE_NOT_FOUND");
        assert_eq!(body["path"], "/nowhere");
    }

    #[tokio::test]
    async fn test_health_reports_mode_and_services() {
        let app = server(ExecutionMode::Production).router();
        let response = app.oneshot(Request::get("/health").body(Body::empty()).unwrap()).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json(response).await;
        assert_eq!(body["status"], "OK");
        assert_eq!(body["environment"], "production");
        assert_eq!(body["services"], 1);
        assert_eq!(body["realtimeConnections"], 0);
    }

    #[tokio::test]
    async fn test_production_rejects_unlisted_origin_before_dispatch() {
        let app = server(ExecutionMode::Production).router();
        let response = app
            .oneshot(
                Request::get("/api/user-management/profile")
                    .header(header::ORIGIN, "http://localhost:4173")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(json(response).await["code"], "CORS_REJECTED");
    }

    #[tokio::test]
    async fn test_wrong_method_on_local_endpoint_uses_envelope() {
        let app = server(ExecutionMode::Development).router();
        let response = app.oneshot(Request::post("/health").body(Body::empty()).unwrap()).await.unwrap();

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert!(response.headers().contains_key(crate::http::X_REQUEST_ID));
        let body = json(response).await;
        assert_eq!(body["status"], "error");
        assert_eq!(body["code"], "METHOD_NOT_ALLOWED");
        assert_eq!(body["method"], "POST");
        assert_eq!(body["path"], "/health");
    }

    #[tokio::test]
    async fn test_plain_get_on_realtime_path_uses_envelope() {
        let app = server(ExecutionMode::Development).router();
        let response = app.oneshot(Request::get("/ws").body(Body::empty()).unwrap()).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(response.headers()[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("application/json"));
        let body = json(response).await;
        assert_eq!(body["status"], "error");
        assert_eq!(body["code"], "UPGRADE_REQUIRED");
        assert!(body["message"].as_str().unwrap().contains("upgrade"));
    }

    #[test]
    fn test_invalid_config_fails_fast() {
        let mut config = GatewayConfig::default();
        config.services.push(config.services[0].clone());
        assert!(matches!(HttpServer::new(config), Err(StartupError::Config(_))));
    }
}
