//! Typed per-request state threaded through the pipeline stages.

use axum::http::{HeaderMap, Method};
use tokio::time::Instant;

use crate::api::routes::RouteMatch;
use crate::core::header_policy::X_TENANT_ID;

/// Verified caller identity, set by the authentication stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub tenant_id: String,
    pub user_id: String,
    pub role: String,
    pub token: String,
}

#[derive(Debug)]
pub struct RequestContext {
    pub request_id: String,
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub client_ip: String,
    /// Unverified tenant from `X-Tenant-ID` or the Host subdomain
    pub tenant_hint: Option<String>,
    pub route: Option<RouteMatch>,
    pub identity: Option<Identity>,
    pub started_at: Instant,
}

impl RequestContext {
    pub fn new(
        request_id: String,
        method: Method,
        path: String,
        query: Option<String>,
        client_ip: String,
        headers: &HeaderMap,
    ) -> Self {
        Self {
            request_id,
            method,
            path,
            query,
            client_ip,
            tenant_hint: tenant_hint(headers),
            route: None,
            identity: None,
            started_at: Instant::now(),
        }
    }

    /// Verified tenant if authenticated, else the hint.
    pub fn tenant(&self) -> Option<&str> {
        self.identity
            .as_ref()
            .map(|i| i.tenant_id.as_str())
            .or(self.tenant_hint.as_deref())
    }

    /// Metric label for the tenant.
    pub fn tenant_label(&self) -> &str {
        self.tenant().unwrap_or("unknown")
    }

    /// Metric label for the route, the matched pattern or `unmatched`.
    pub fn route_label(&self) -> &str {
        self.route
            .as_ref()
            .map(|m| m.route.pattern.as_str())
            .unwrap_or("unmatched")
    }

    pub fn service(&self) -> Option<&str> {
        self.route.as_ref().map(|m| m.route.service.as_str())
    }
}

/// Tenant hint: `X-Tenant-ID`, else the first label of a multi-label Host
/// that is not `www` or `api`.
pub fn tenant_hint(headers: &HeaderMap) -> Option<String> {
    if let Some(tenant) = headers
        .get(X_TENANT_ID)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        return Some(tenant.to_string());
    }

    let host = headers.get(axum::http::header::HOST)?.to_str().ok()?;
    let host = host.split(':').next().unwrap_or(host);
    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() > 2 {
        let first = labels[0];
        if !first.is_empty() && first != "www" && first != "api" {
            return Some(first.to_string());
        }
    }
    None
}
