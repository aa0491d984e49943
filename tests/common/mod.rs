//! Shared fixtures for integration tests.
#![allow(dead_code)]

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{Method, Request},
    Router,
};
use jsonwebtoken::{encode, EncodingKey, Header};
use std::net::SocketAddr;
use std::sync::Arc;
use tenant_gateway::{
    api::{create_http_client, Authenticator, Claims},
    build_router, AppState, Gateway, GatewayConfig, GatewayMetrics, InMemoryRevocationStore,
    RouteTable,
};

pub const TEST_SECRET: &str = "integration-test-secret";

pub struct TestGateway {
    pub router: Router,
    pub gateway: Arc<Gateway>,
    pub revocation: Arc<InMemoryRevocationStore>,
}

/// Build a gateway whose every route group points at `backend`.
pub fn test_gateway(backend: &str, overrides: &[(&str, &str)]) -> TestGateway {
    test_gateway_with(backend, overrides, |_| {})
}

/// Like [`test_gateway`], with a hook to adjust the loaded config.
pub fn test_gateway_with<F>(backend: &str, overrides: &[(&str, &str)], adjust: F) -> TestGateway
where
    F: FnOnce(&mut GatewayConfig),
{
    let mut vars: Vec<(String, String)> = vec![("JWT_SECRET".to_string(), TEST_SECRET.to_string())];
    vars.extend(overrides.iter().map(|(k, v)| (k.to_string(), v.to_string())));

    let mut config = GatewayConfig::from_lookup(|key| {
        vars.iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    })
    .expect("Failed to load test config");
    adjust(&mut config);

    let backend = backend.to_string();
    let routes = RouteTable::from_lookup(|_| Some(backend.clone())).expect("Failed to build routes");

    let revocation = Arc::new(InMemoryRevocationStore::new());
    let metrics = Arc::new(GatewayMetrics::new().expect("Failed to create metrics"));
    let authenticator = Arc::new(Authenticator::new(&config.auth, revocation.clone()));
    let http_client = create_http_client(&config.upstream).expect("Failed to build HTTP client");
    let gateway = Arc::new(Gateway::new(
        &config,
        routes,
        authenticator,
        metrics.clone(),
        http_client,
    ));

    let state = AppState {
        gateway: gateway.clone(),
        metrics,
        revocation: revocation.clone(),
    };

    TestGateway {
        router: build_router(state, config.enable_cors),
        gateway,
        revocation,
    }
}

/// Claims valid for the next hour.
pub fn claims(user_id: &str, tenant_id: &str, role: &str) -> Claims {
    let now = chrono::Utc::now().timestamp();
    Claims {
        user_id: user_id.to_string(),
        tenant_id: tenant_id.to_string(),
        role: role.to_string(),
        iss: None,
        sub: Some(user_id.to_string()),
        iat: Some(now),
        nbf: None,
        exp: now + 3600,
    }
}

pub fn mint_token(claims: &Claims) -> String {
    encode(
        &Header::default(),
        claims,
        &EncodingKey::from_secret(TEST_SECRET.as_bytes()),
    )
    .expect("Failed to sign token")
}

/// Request builder that carries the peer address the server would see.
pub fn request_from(ip: [u8; 4], method: Method, uri: &str) -> axum::http::request::Builder {
    Request::builder()
        .method(method)
        .uri(uri)
        .extension(ConnectInfo(SocketAddr::from((ip, 40000))))
}

pub fn request(method: Method, uri: &str) -> axum::http::request::Builder {
    request_from([203, 0, 113, 7], method, uri)
}

pub fn empty() -> Body {
    Body::empty()
}

pub async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Failed to read body");
    serde_json::from_slice(&bytes).expect("Body is not JSON")
}

pub async fn body_text(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Failed to read body");
    String::from_utf8(bytes.to_vec()).expect("Body is not UTF-8")
}
