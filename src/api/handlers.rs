//! HTTP handlers and router assembly.

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::api::pipeline::Gateway;
use crate::core::metrics::GatewayMetrics;
use crate::core::middleware::request_id_middleware;
use crate::services::revocation::RevocationStore;
use crate::GATEWAY_VERSION;

const HEALTH_PING_TIMEOUT: Duration = Duration::from_secs(2);

/// Shared state for all handlers.
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<Gateway>,
    pub metrics: Arc<GatewayMetrics>,
    pub revocation: Arc<dyn RevocationStore>,
}

/// Every non-operational request goes through the gateway pipeline.
pub async fn gateway_handler(State(state): State<AppState>, request: Request) -> Response {
    state.gateway.handle(request).await
}

/// Gateway liveness plus revocation store reachability.
pub async fn health_handler(State(state): State<AppState>) -> Response {
    let store_status =
        match tokio::time::timeout(HEALTH_PING_TIMEOUT, state.revocation.ping()).await {
            Ok(Ok(())) => "ok",
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Revocation store health check failed");
                "unavailable"
            }
            Err(_) => {
                tracing::warn!("Revocation store health check timed out");
                "timeout"
            }
        };

    let healthy = store_status == "ok";
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(json!({
            "status": if healthy { "healthy" } else { "degraded" },
            "service": "api-gateway",
            "version": GATEWAY_VERSION,
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "revocation_store": {
                "backend": state.revocation.backend_name(),
                "status": store_status,
            },
        })),
    )
        .into_response()
}

/// Prometheus metrics endpoint.
pub async fn metrics_handler(State(state): State<AppState>) -> Response {
    match state.metrics.render() {
        Ok(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode metrics").into_response()
        }
    }
}

/// Build the application router.
pub fn build_router(state: AppState, enable_cors: bool) -> Router {
    let router = Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .fallback(gateway_handler)
        .with_state(state)
        .layer(axum::middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http());

    if enable_cors {
        router.layer(CorsLayer::permissive())
    } else {
        router
    }
}
