//! End-to-end tests for the request pipeline.
//!
//! Each test drives the full router with `oneshot` against a wiremock
//! backend standing in for the service fleet.

mod common;

use axum::http::{Method, StatusCode};
use common::*;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::time::Duration;
use tower::ServiceExt;
use wiremock::{
    matchers::{body_string, header, method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

#[tokio::test]
async fn test_forwards_protected_request_with_identity_headers() {
    let backend = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/core/crm/leads"))
        .and(header("x-tenant-id", "acme"))
        .and(header("x-user-id", "u-1"))
        .and(header("x-user-role", "admin"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"leads": []})))
        .expect(1)
        .mount(&backend)
        .await;

    let app = test_gateway(&backend.uri(), &[]);
    let token = mint_token(&claims("u-1", "acme", "admin"));

    let response = app
        .router
        .oneshot(
            request(Method::GET, "/api/v1/core/crm/leads")
                .header("authorization", format!("Bearer {}", token))
                // Spoofed identity must be replaced by the verified one
                .header("x-tenant-id", "other-tenant")
                .header("x-user-id", "attacker")
                .body(empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get("x-gateway-service").unwrap(), "crm-service");
    assert!(response.headers().contains_key("x-gateway-response-time"));
    assert!(response.headers().contains_key("x-request-id"));
    assert_eq!(body_json(response).await, json!({"leads": []}));
}

#[tokio::test]
async fn test_public_route_forwards_tenant_hint_without_user() {
    let backend = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/auth/login"))
        .and(header("x-tenant-id", "acme"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "t"})))
        .expect(1)
        .mount(&backend)
        .await;

    let app = test_gateway(&backend.uri(), &[]);
    let response = app
        .router
        .oneshot(
            request(Method::POST, "/api/v1/auth/login")
                .header("x-tenant-id", "acme")
                .header("x-user-id", "spoofed")
                .header("content-type", "application/json")
                .body::<axum::body::Body>(r#"{"email":"a@b.c"}"#.into())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let received = backend.received_requests().await.unwrap();
    assert_eq!(received.len(), 1);
    assert!(!received[0].headers.contains_key("x-user-id"));
    assert_eq!(received[0].body, br#"{"email":"a@b.c"}"#.to_vec());
}

#[tokio::test]
async fn test_strips_hop_by_hop_headers() {
    let backend = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&backend)
        .await;

    let app = test_gateway(&backend.uri(), &[]);
    let token = mint_token(&claims("u-1", "acme", "member"));

    let response = app
        .router
        .oneshot(
            request(Method::GET, "/api/v1/core/finance/invoices")
                .header("authorization", format!("Bearer {}", token))
                .header("connection", "keep-alive, x-drop-me")
                .header("keep-alive", "timeout=5")
                .header("proxy-authorization", "Basic abc")
                .header("x-drop-me", "1")
                .header("x-custom", "kept")
                .body(empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let received = backend.received_requests().await.unwrap();
    let headers = &received[0].headers;
    assert!(!headers.contains_key("keep-alive"));
    assert!(!headers.contains_key("proxy-authorization"));
    assert!(!headers.contains_key("x-drop-me"));
    assert_eq!(headers.get("x-custom").unwrap(), "kept");
    assert_eq!(headers.get("x-forwarded-for").unwrap(), "203.0.113.7");
    assert_eq!(headers.get("x-forwarded-proto").unwrap(), "http");
    assert!(headers.contains_key("x-gateway-version"));
    assert!(headers.contains_key("x-request-id"));
    if let Some(connection) = headers.get("connection") {
        assert!(!connection.to_str().unwrap().contains("x-drop-me"));
    }
}

#[tokio::test]
async fn test_user_path_and_query_are_preserved() {
    let backend = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/users/42"))
        .and(query_param("fields", "name,email"))
        .respond_with(ResponseTemplate::new(200).set_body_string("user 42"))
        .expect(1)
        .mount(&backend)
        .await;

    let app = test_gateway(&backend.uri(), &[]);
    let token = mint_token(&claims("u-1", "acme", "admin"));

    let response = app
        .router
        .oneshot(
            request(Method::GET, "/api/v1/users/42?fields=name,email")
                .header("authorization", format!("Bearer {}", token))
                .body(empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "user 42");
}

#[tokio::test]
async fn test_request_body_is_relayed() {
    let backend = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/api/v1/users/7"))
        .and(body_string(r#"{"name":"Ada"}"#))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&backend)
        .await;

    let app = test_gateway(&backend.uri(), &[]);
    let token = mint_token(&claims("u-7", "acme", "member"));

    let response = app
        .router
        .oneshot(
            request(Method::PUT, "/api/v1/users/7")
                .header("authorization", format!("Bearer {}", token))
                .header("content-type", "application/json")
                .body::<axum::body::Body>(r#"{"name":"Ada"}"#.into())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_backend_status_and_headers_are_relayed() {
    let backend = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(404)
                .insert_header("x-backend-trace", "abc")
                .set_body_json(json!({"error": "lead not found"})),
        )
        .mount(&backend)
        .await;

    let app = test_gateway(&backend.uri(), &[]);
    let token = mint_token(&claims("u-1", "acme", "admin"));

    let response = app
        .router
        .oneshot(
            request(Method::GET, "/api/v1/core/crm/leads/999")
                .header("authorization", format!("Bearer {}", token))
                .body(empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(response.headers().get("x-backend-trace").unwrap(), "abc");
    assert_eq!(body_json(response).await, json!({"error": "lead not found"}));
}

#[tokio::test]
async fn test_unknown_path_returns_404() {
    let backend = MockServer::start().await;
    let app = test_gateway(&backend.uri(), &[]);

    let response = app
        .router
        .oneshot(request(Method::GET, "/api/v2/nowhere").body(empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["error"], "endpoint_not_found");
    assert_eq!(body["path"], "/api/v2/nowhere");
    assert_eq!(body["method"], "GET");
    assert!(backend.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_method_not_in_route_returns_404() {
    let backend = MockServer::start().await;
    let app = test_gateway(&backend.uri(), &[]);

    let response = app
        .router
        .oneshot(request(Method::GET, "/api/v1/auth/login").body(empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unreachable_backend_returns_502() {
    // Port 1 is never listening in the test environment
    let app = test_gateway("http://127.0.0.1:1", &[]);

    let response = app
        .router
        .oneshot(
            request(Method::POST, "/api/v1/auth/login")
                .body(empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(body_json(response).await["error"], "bad_gateway");
}

#[tokio::test]
async fn test_slow_backend_returns_504() {
    let backend = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
        .mount(&backend)
        .await;

    let app = test_gateway_with(&backend.uri(), &[], |config| {
        config.upstream.timeout = Duration::from_millis(200);
    });

    let response = app
        .router
        .oneshot(
            request(Method::POST, "/api/v1/auth/login")
                .body(empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(body_json(response).await["error"], "gateway_timeout");
}

#[tokio::test]
async fn test_oversized_body_returns_413() {
    let backend = MockServer::start().await;
    let app = test_gateway(&backend.uri(), &[("MAX_BODY_BYTES", "16")]);

    let response = app
        .router
        .oneshot(
            request(Method::POST, "/api/v1/auth/register")
                .header("content-length", "64")
                .body::<axum::body::Body>(vec![b'x'; 64].into())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert!(backend.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_inbound_request_id_is_echoed_and_forwarded() {
    let backend = MockServer::start().await;
    Mock::given(method("POST"))
        .and(header("x-request-id", "trace-123"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&backend)
        .await;

    let app = test_gateway(&backend.uri(), &[]);
    let response = app
        .router
        .oneshot(
            request(Method::POST, "/api/v1/auth/refresh")
                .header("x-request-id", "trace-123")
                .body(empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get("x-request-id").unwrap(), "trace-123");
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = test_gateway("http://127.0.0.1:1", &[]);

    let response = app
        .router
        .oneshot(request(Method::GET, "/health").body(empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "api-gateway");
    assert_eq!(body["revocation_store"]["backend"], "memory");
    assert_eq!(body["revocation_store"]["status"], "ok");
}

#[tokio::test]
async fn test_metrics_endpoint_reports_requests() {
    let backend = MockServer::start().await;
    let app = test_gateway(&backend.uri(), &[]);

    let response = app
        .router
        .clone()
        .oneshot(request(Method::GET, "/api/v2/nowhere").body(empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .router
        .oneshot(request(Method::GET, "/metrics").body(empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let text = body_text(response).await;
    assert!(text.contains("gateway_requests_total"));
    assert!(text.contains("route=\"unmatched\""));
    assert!(text.contains("status=\"404\""));
    assert!(text.contains("gateway_active_requests 0"));
}

#[tokio::test]
async fn test_tenant_hint_from_subdomain() {
    let backend = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/public/templates/popular"))
        .and(header("x-tenant-id", "acme"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&backend)
        .await;

    let app = test_gateway(&backend.uri(), &[]);
    let response = app
        .router
        .oneshot(
            request(Method::GET, "/api/v1/public/templates/popular")
                .header("host", "acme.erp.example.com")
                .body(empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}
