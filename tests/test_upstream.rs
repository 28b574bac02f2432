//! Tests for the standalone reverse-proxy server.
//!
//! These tests use wiremock as the upstream and drive the full router built
//! by `build_router`, verifying:
//! - Request and response transformation through the upstream hop
//! - Server endpoints bypass the transform
//! - Upstream failures map to gateway errors

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use body_transform::{
    api::{build_router, ProxyState},
    core::{init_metrics, BodyTransform, TransformConfig, TransformMode, UpstreamConfig},
};
use serde_json::json;
use std::sync::Arc;
use tower::ServiceExt;
use wiremock::{
    matchers::{body_string, header, method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

// ============================================================================
// Test Helpers
// ============================================================================

fn create_proxy_app(upstream_url: &str, script: &str, mode: TransformMode) -> Router {
    init_metrics();

    let transform = BodyTransform::provision(&TransformConfig::inline(script, mode)).unwrap();
    let proxy_state = ProxyState::new(&UpstreamConfig {
        url: upstream_url.to_string(),
        timeout_secs: 5,
        verify_ssl: true,
    })
    .unwrap();

    build_router(Arc::new(transform), Arc::new(proxy_state))
}

async fn body_text(response: axum::response::Response) -> String {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(body.to_vec()).unwrap()
}

// ============================================================================
// Transformation Through The Proxy
// ============================================================================

#[tokio::test]
async fn test_response_mode_transforms_upstream_body() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/items"))
        .and(query_param("limit", "5"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("x-upstream", "mock")
                .set_body_string("hello upstream"),
        )
        .mount(&mock_server)
        .await;

    let app = create_proxy_app(
        &mock_server.uri(),
        "function transform(body) return string.upper(body) end",
        TransformMode::Response,
    );

    let request = Request::builder()
        .uri("/v1/items?limit=5")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-upstream"], "mock");
    assert_eq!(response.headers()["content-length"], "14");
    assert_eq!(body_text(response).await, "HELLO UPSTREAM");
}

#[tokio::test]
async fn test_response_mode_keeps_upstream_error_status() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
        .mount(&mock_server)
        .await;

    let app = create_proxy_app(
        &mock_server.uri(),
        "function transform(body) return string.upper(body) end",
        TransformMode::Response,
    );

    let request = Request::builder().uri("/gone").body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_text(response).await, "NOT FOUND");
}

#[tokio::test]
async fn test_request_mode_sends_transformed_json_upstream() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/submit"))
        .and(header("content-type", "application/json"))
        .and(body_string(r#"{"name":"widget","tagged":true}"#))
        .respond_with(ResponseTemplate::new(201).set_body_string("created"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let app = create_proxy_app(
        &mock_server.uri(),
        r#"
        function transform(body)
            local doc = json.decode(body)
            return '{"name":' .. json.encode(doc.name) .. ',"tagged":true}'
        end
        "#,
        TransformMode::Request,
    );

    let request = Request::builder()
        .uri("/submit")
        .method("POST")
        .header("content-type", "application/json")
        .body(Body::from(json!({"name": "widget"}).to_string()))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(body_text(response).await, "created");
}

#[tokio::test]
async fn test_request_mode_failure_never_reaches_upstream() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let app = create_proxy_app(
        &mock_server.uri(),
        "function transform(body) error('rejected payload') end",
        TransformMode::Request,
    );

    let request = Request::builder()
        .uri("/submit")
        .method("POST")
        .body(Body::from("payload"))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(body["error"]["type"], "transform_error");
}

// ============================================================================
// Server Endpoints
// ============================================================================

#[tokio::test]
async fn test_health_endpoint_is_not_transformed() {
    let app = create_proxy_app(
        "http://127.0.0.1:1",
        "function transform(body) return 'transformed' end",
        TransformMode::Response,
    );

    let request = Request::builder()
        .uri("/-/health")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let app = create_proxy_app(
        "http://127.0.0.1:1",
        "function transform(body) return body end",
        TransformMode::Response,
    );

    let request = Request::builder()
        .uri("/-/metrics")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
}

// ============================================================================
// Upstream Failures
// ============================================================================

#[tokio::test]
async fn test_unreachable_upstream_is_bad_gateway() {
    // Port 1 is reserved and nothing listens there
    let app = create_proxy_app(
        "http://127.0.0.1:1",
        "function transform(body) return body end",
        TransformMode::Request,
    );

    let request = Request::builder()
        .uri("/anything")
        .method("POST")
        .body(Body::from("payload"))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(body["error"]["type"], "api_error");
    assert_eq!(body["error"]["code"], 502);
}

#[tokio::test]
async fn test_unreachable_upstream_skips_response_transform() {
    let app = create_proxy_app(
        "http://127.0.0.1:1",
        "function transform(body) return 'TRANSFORMED:' .. string.upper(body) end",
        TransformMode::Response,
    );

    let request = Request::builder()
        .uri("/anything")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let text = body_text(response).await;
    assert!(!text.starts_with("TRANSFORMED:"), "{text}");

    let body: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(body["error"]["type"], "api_error");
    assert_eq!(body["error"]["code"], 502);
}
