//! Error types and handling for the gateway.
//!
//! This module provides a unified error type [`GatewayError`] covering every
//! terminal outcome of the request pipeline, and implements the HTTP response
//! conversion used when a stage short-circuits.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::core::error_types::{
    ERROR_CODE_BAD_GATEWAY, ERROR_CODE_GATEWAY_TIMEOUT, ERROR_CODE_INTERNAL,
    ERROR_CODE_NOT_FOUND, ERROR_CODE_PAYLOAD_TOO_LARGE, ERROR_CODE_RATE_LIMIT,
    ERROR_CODE_SERVICE_UNAVAILABLE, ERROR_CODE_UNAUTHORIZED,
};

/// Bearer token authentication failures. All map to 401.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Authorization header is required")]
    MissingHeader,

    #[error("Invalid authorization header format")]
    MalformedHeader,

    #[error("Invalid token")]
    InvalidSignature,

    #[error("Token has expired")]
    Expired,

    #[error("Token is not yet valid")]
    NotYetValid,

    #[error("Token has been revoked")]
    Revoked,
}

/// Transport-level failures while forwarding to a backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProxyError {
    /// The backend did not answer within the forward timeout
    #[error("Service request timed out")]
    Timeout,

    /// Connection refused, reset, DNS failure and similar
    #[error("Failed to connect to service")]
    ConnectionFailed,

    /// The configured backend URL could not be combined with the request path
    #[error("Invalid target URL: {0}")]
    BadTargetUrl(String),
}

impl ProxyError {
    /// Whether this failure is charged against the backend's circuit breaker.
    pub fn counts_as_backend_failure(&self) -> bool {
        matches!(self, ProxyError::Timeout | ProxyError::ConnectionFailed)
    }
}

/// Failures that indicate a gateway bug rather than a client or backend fault.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InternalError {
    #[error("Failed to read body: {0}")]
    BodyReadFailure(String),

    #[error("Failed to create request: {0}")]
    RequestConstructionFailure(String),
}

/// Main error type for the gateway.
///
/// Every pipeline stage short-circuits with one of these; the variant decides
/// the status code and the JSON error body.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Unauthorized: {0}")]
    Auth(#[from] AuthError),

    #[error("Rate limit of {limit_per_minute} requests per minute exceeded")]
    RateLimitExceeded { limit_per_minute: u32 },

    #[error("Service {service} is temporarily unavailable")]
    CircuitOpen { service: String },

    #[error("Endpoint not found: {method} {path}")]
    RouteNotFound { method: String, path: String },

    #[error("Request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    #[error("Proxy error: {0}")]
    Proxy(#[from] ProxyError),

    #[error("Internal server error: {0}")]
    Internal(#[from] InternalError),
}

impl GatewayError {
    /// HTTP status this error is surfaced with.
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::Auth(_) => StatusCode::UNAUTHORIZED,
            GatewayError::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::CircuitOpen { .. } => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::RouteNotFound { .. } => StatusCode::NOT_FOUND,
            GatewayError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            GatewayError::Proxy(ProxyError::Timeout) => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::Proxy(ProxyError::ConnectionFailed) => StatusCode::BAD_GATEWAY,
            GatewayError::Proxy(ProxyError::BadTargetUrl(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable error code placed in the `error` field.
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::Auth(_) => ERROR_CODE_UNAUTHORIZED,
            GatewayError::RateLimitExceeded { .. } => ERROR_CODE_RATE_LIMIT,
            GatewayError::CircuitOpen { .. } => ERROR_CODE_SERVICE_UNAVAILABLE,
            GatewayError::RouteNotFound { .. } => ERROR_CODE_NOT_FOUND,
            GatewayError::PayloadTooLarge { .. } => ERROR_CODE_PAYLOAD_TOO_LARGE,
            GatewayError::Proxy(ProxyError::Timeout) => ERROR_CODE_GATEWAY_TIMEOUT,
            GatewayError::Proxy(ProxyError::ConnectionFailed) => ERROR_CODE_BAD_GATEWAY,
            GatewayError::Proxy(ProxyError::BadTargetUrl(_)) | GatewayError::Internal(_) => {
                ERROR_CODE_INTERNAL
            }
        }
    }

    /// Human-readable message. Internal failures get a generic text so that
    /// gateway details never leak to clients.
    pub fn message(&self) -> String {
        match self {
            GatewayError::Auth(e) => e.to_string(),
            GatewayError::Proxy(ProxyError::BadTargetUrl(_)) | GatewayError::Internal(_) => {
                "Failed to process request".to_string()
            }
            GatewayError::Proxy(e) => e.to_string(),
            GatewayError::RouteNotFound { .. } => {
                "The requested endpoint does not exist".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();

        let body = match &self {
            GatewayError::RouteNotFound { method, path } => json!({
                "error": self.code(),
                "message": self.message(),
                "path": path,
                "method": method,
            }),
            _ => json!({
                "error": self.code(),
                "message": self.message(),
            }),
        };

        (status, Json(body)).into_response()
    }
}

/// Convenience type alias for Results using [`GatewayError`].
pub type Result<T, E = GatewayError> = std::result::Result<T, E>;
