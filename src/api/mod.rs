//! API layer for the gateway.
//!
//! This module contains the route table, the pipeline stages, the reverse
//! proxy, the HTTP handlers that tie them together and the server loop.

pub mod auth;
pub mod context;
pub mod handlers;
pub mod pipeline;
pub mod proxy;
pub mod routes;
pub mod server;

// Re-export commonly used types
pub use auth::{Authenticator, Claims};
pub use context::{Identity, RequestContext};
pub use handlers::{build_router, gateway_handler, health_handler, metrics_handler, AppState};
pub use pipeline::{Gateway, PipelineStage, StageOutcome};
pub use proxy::{create_http_client, ProxyForwarder};
pub use routes::{PathRewrite, RouteDescriptor, RouteMatch, RouteTable};
pub use server::{serve_with_grace, ShutdownOutcome};
