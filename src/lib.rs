//! Tenant Gateway - a tenant-aware API gateway for a fleet of backend services
//!
//! Every inbound request is run through an ordered pipeline:
//!
//! - **Route Table**: map the path to a backend and its authentication rule
//! - **Admission Control**: per-identity token buckets with per-tenant plans
//! - **Authentication**: HMAC-signed bearer tokens plus a shared revocation list
//! - **Circuit Breaking**: fail fast while a backend keeps failing
//! - **Forwarding**: relay the request with hop-by-hop headers stripped and
//!   identity headers injected
//!
//! # Architecture
//!
//! - [`core`]: config, errors, admission control, circuit breaker, metrics, middleware
//! - [`api`]: route table, pipeline stages, proxy forwarder, handlers
//! - [`services`]: external collaborators (token revocation store)
//!
//! # Configuration
//!
//! The server requires the following environment variable:
//! - `JWT_SECRET`: HMAC secret shared with the auth service
//!
//! Optional environment variables:
//! - `HOST`: Server bind address (default: 0.0.0.0)
//! - `PORT`: Server port (default: 3004)
//! - `REDIS_URL`: Revocation store (default: in-process store)
//! - `RATE_LIMIT_PER_MINUTE`: Default per-identity limit (default: 60)
//! - `<NAME>_SERVICE`: Backend base URL per route group

pub mod api;
pub mod core;
pub mod services;

/// Value of the `X-Gateway-Version` header.
pub const GATEWAY_VERSION: &str = env!("CARGO_PKG_VERSION");

// Re-export commonly used types for convenience
pub use api::{build_router, AppState, Gateway, RouteTable};
pub use core::{GatewayConfig, GatewayError, GatewayMetrics, Result};
pub use services::{InMemoryRevocationStore, RedisRevocationStore, RevocationStore};
