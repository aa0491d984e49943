//! Core functionality for the gateway.
//!
//! This module contains the building blocks the request pipeline is made of:
//! - Configuration management
//! - Error handling
//! - Admission control and circuit breaking
//! - Header rewriting rules
//! - Metrics, logging and HTTP middleware

pub mod circuit_breaker;
pub mod config;
pub mod error;
pub mod error_types;
pub mod header_policy;
pub mod logging;
pub mod metrics;
pub mod middleware;
pub mod rate_limiter;

// Re-export commonly used types
pub use circuit_breaker::{CircuitBreaker, CircuitStatus};
pub use config::{GatewayConfig, RateLimitKey, ServerConfig};
pub use error::{AuthError, GatewayError, InternalError, ProxyError, Result};
pub use logging::{get_request_id, REQUEST_ID};
pub use metrics::GatewayMetrics;
pub use middleware::request_id_middleware;
pub use rate_limiter::RateLimiter;
