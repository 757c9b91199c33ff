//! Origin validation and rate limiting over real connections.

use edge_gateway::config::{ExecutionMode, ServiceConfig};
use reqwest::StatusCode;
use serde_json::Value;

mod common;

fn users(backend: &common::EchoBackend) -> Vec<ServiceConfig> {
    vec![ServiceConfig::new(
        "user-management",
        "User Management Service",
        &backend.url(),
        true,
    )]
}

#[tokio::test]
async fn test_loopback_origin_accepted_in_development() {
    let backend = common::start_echo_backend().await;
    let gateway = common::start_gateway(common::gateway_config(users(&backend))).await;

    let res = common::client()
        .get(gateway.url("/api/user-management/profile"))
        .header("origin", "http://localhost:4173")
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()["access-control-allow-origin"], "http://localhost:4173");
    assert_eq!(res.headers()["access-control-allow-credentials"], "true");
    assert_eq!(backend.hits(), 1);
}

#[tokio::test]
async fn test_unlisted_origin_rejected_in_production() {
    let backend = common::start_echo_backend().await;
    let mut config = common::gateway_config(users(&backend));
    config.mode = ExecutionMode::Production;
    config.cors.allowed_origins = vec!["https://dashboard.example.com".to_string()];
    let gateway = common::start_gateway(config).await;
    let client = common::client();

    let res = client
        .get(gateway.url("/api/user-management/profile"))
        .header("origin", "http://localhost:4173")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    assert!(res.headers().contains_key("x-request-id"));
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["code"], "CORS_REJECTED");
    // Raw internals never leak in production.
    assert!(body.get("stack").is_none());
    assert_eq!(backend.hits(), 0);

    let res = client
        .get(gateway.url("/api/user-management/profile"))
        .header("origin", "https://dashboard.example.com")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(backend.hits(), 1);
}

#[tokio::test]
async fn test_request_without_origin_always_passes() {
    let backend = common::start_echo_backend().await;
    let mut config = common::gateway_config(users(&backend));
    config.mode = ExecutionMode::Production;
    let gateway = common::start_gateway(config).await;

    let res = common::client()
        .get(gateway.url("/api/user-management/profile"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_preflight_answered_by_gateway() {
    let backend = common::start_echo_backend().await;
    let gateway = common::start_gateway(common::gateway_config(users(&backend))).await;

    let res = common::client()
        .request(reqwest::Method::OPTIONS, gateway.url("/api/user-management/users"))
        .header("origin", "http://127.0.0.1:5173")
        .header("access-control-request-method", "PATCH")
        .header("access-control-request-headers", "authorization,content-type")
        .send()
        .await
        .unwrap();

    assert!(res.status().is_success());
    assert_eq!(res.headers()["access-control-allow-origin"], "http://127.0.0.1:5173");
    assert!(res.headers()["access-control-allow-methods"]
        .to_str()
        .unwrap()
        .contains("PATCH"));
    assert_eq!(backend.hits(), 0);
}

#[tokio::test]
async fn test_rate_limit_rejects_after_ceiling() {
    let backend = common::start_echo_backend().await;
    let mut config = common::gateway_config(users(&backend));
    config.rate_limit.max_requests = 3;
    let gateway = common::start_gateway(config).await;
    let client = common::client();

    for expected_remaining in ["2", "1", "0"] {
        let res = client
            .get(gateway.url("/api/user-management/profile"))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers()["ratelimit-limit"], "3");
        assert_eq!(res.headers()["ratelimit-remaining"], expected_remaining);
    }

    let res = client
        .get(gateway.url("/api/user-management/profile"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
    let retry_after: u64 = res.headers()["retry-after"].to_str().unwrap().parse().unwrap();
    assert!(retry_after > 0 && retry_after <= 900);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["code"], "RATE_LIMIT_EXCEEDED");
    assert_eq!(backend.hits(), 3);
}

#[tokio::test]
async fn test_rate_limit_keys_on_resolved_client_ip() {
    let backend = common::start_echo_backend().await;
    let mut config = common::gateway_config(users(&backend));
    config.rate_limit.max_requests = 1;
    config.proxy.trust_proxy_hops = 1;
    let gateway = common::start_gateway(config).await;
    let client = common::client();

    for ip in ["198.51.100.1", "198.51.100.2"] {
        let res = client
            .get(gateway.url("/api/user-management/profile"))
            .header("x-forwarded-for", ip)
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK, "{ip}");
    }

    let res = client
        .get(gateway.url("/api/user-management/profile"))
        .header("x-forwarded-for", "198.51.100.1")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_rotating_forwarded_for_does_not_evade_limit_by_default() {
    let backend = common::start_echo_backend().await;
    let mut config = common::gateway_config(users(&backend));
    config.rate_limit.max_requests = 5;
    let gateway = common::start_gateway(config).await;
    let client = common::client();

    let mut admitted = 0;
    for i in 0..10 {
        let res = client
            .get(gateway.url("/api/user-management/profile"))
            .header("x-forwarded-for", format!("198.51.100.{}", i + 1))
            .send()
            .await
            .unwrap();
        if res.status() == StatusCode::OK {
            admitted += 1;
        } else {
            assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
        }
    }

    assert_eq!(admitted, 5);
    assert_eq!(backend.hits(), 5);
}

#[tokio::test]
async fn test_disabled_rate_limit_sets_no_headers() {
    let backend = common::start_echo_backend().await;
    let mut config = common::gateway_config(users(&backend));
    config.rate_limit.enabled = false;
    config.rate_limit.max_requests = 1;
    let gateway = common::start_gateway(config).await;
    let client = common::client();

    for _ in 0..3 {
        let res = client.get(gateway.url("/health")).send().await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert!(!res.headers().contains_key("ratelimit-limit"));
    }
}
