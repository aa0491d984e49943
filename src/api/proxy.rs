//! Reverse-proxy forwarding to backend services.
//!
//! Requests are relayed at most once: transport failures are classified and
//! surfaced, never retried, since many proxied operations are not idempotent.
//! The inbound body is fully buffered before forwarding and the backend
//! response body is read in full and relayed once.
//!
//! reqwest 0.11 sits on `http` 0.2 while axum uses `http` 1, so statuses,
//! methods and headers cross the boundary by their wire representation.

use axum::{
    body::{Body, Bytes},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::Response,
};

use crate::api::context::RequestContext;
use crate::api::routes::RouteMatch;
use crate::core::config::UpstreamConfig;
use crate::core::error::{GatewayError, InternalError, ProxyError, Result};
use crate::core::header_policy::{
    apply_identity_headers, forwardable_headers, set_header, strip_identity_headers, X_FORWARDED_FOR,
    X_FORWARDED_PROTO, X_GATEWAY_RESPONSE_TIME, X_GATEWAY_SERVICE, X_GATEWAY_VERSION, X_TENANT_ID,
};
use crate::core::logging::REQUEST_ID_HEADER;
use crate::GATEWAY_VERSION;

/// Create the shared outbound HTTP client with connection pooling.
pub fn create_http_client(config: &UpstreamConfig) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(config.timeout)
        .pool_max_idle_per_host(config.pool_max_idle_per_host)
        .pool_idle_timeout(config.pool_idle_timeout)
        .tcp_keepalive(std::time::Duration::from_secs(60))
        .redirect(reqwest::redirect::Policy::none())
        .build()
}

/// Combine a backend base URL, a backend path and the raw query string.
///
/// A path component on the base URL is kept as a mount point.
pub fn build_target_url(
    backend_url: &str,
    target_path: &str,
    query: Option<&str>,
) -> Result<reqwest::Url, ProxyError> {
    let mut url = reqwest::Url::parse(backend_url)
        .map_err(|e| ProxyError::BadTargetUrl(format!("{}: {}", backend_url, e)))?;
    if url.host_str().is_none() {
        return Err(ProxyError::BadTargetUrl(backend_url.to_string()));
    }

    let base = url.path().trim_end_matches('/').to_string();
    url.set_path(&format!("{}{}", base, target_path));
    url.set_query(query.filter(|q| !q.is_empty()));
    url.set_fragment(None);
    Ok(url)
}

fn classify_transport_error(error: &reqwest::Error) -> ProxyError {
    if error.is_timeout() || error.to_string().to_ascii_lowercase().contains("timeout") {
        ProxyError::Timeout
    } else {
        ProxyError::ConnectionFailed
    }
}

pub struct ProxyForwarder {
    client: reqwest::Client,
    forwarded_proto: String,
}

impl ProxyForwarder {
    pub fn new(client: reqwest::Client, config: &UpstreamConfig) -> Self {
        Self {
            client,
            forwarded_proto: config.forwarded_proto.clone(),
        }
    }

    /// Headers sent to the backend: inbound headers minus hop-by-hop ones,
    /// plus forwarding and identity headers set by the gateway.
    pub fn outbound_headers(&self, inbound: &HeaderMap, ctx: &RequestContext) -> HeaderMap {
        let mut headers = forwardable_headers(inbound);

        set_header(&mut headers, X_FORWARDED_FOR, &ctx.client_ip);
        set_header(&mut headers, X_FORWARDED_PROTO, &self.forwarded_proto);
        set_header(&mut headers, X_GATEWAY_VERSION, GATEWAY_VERSION);
        set_header(&mut headers, REQUEST_ID_HEADER, &ctx.request_id);

        match (&ctx.identity, &ctx.tenant_hint) {
            (Some(identity), _) => apply_identity_headers(
                &mut headers,
                &identity.tenant_id,
                &identity.user_id,
                &identity.role,
            ),
            (None, Some(hint)) => {
                strip_identity_headers(&mut headers);
                set_header(&mut headers, X_TENANT_ID, hint);
            }
            (None, None) => strip_identity_headers(&mut headers),
        }

        headers
    }

    /// Relay one request to the matched backend.
    pub async fn forward(
        &self,
        ctx: &RequestContext,
        route: &RouteMatch,
        inbound_headers: &HeaderMap,
        body: Bytes,
    ) -> Result<Response> {
        let url = build_target_url(
            &route.route.backend_url,
            &route.target_path(),
            ctx.query.as_deref(),
        )?;

        let method = reqwest::Method::from_bytes(ctx.method.as_str().as_bytes())
            .map_err(|e| InternalError::RequestConstructionFailure(e.to_string()))?;

        tracing::debug!(
            method = %ctx.method,
            path = %ctx.path,
            target = %url,
            service = %route.route.service,
            "Proxying request"
        );

        let mut builder = self.client.request(method, url.clone());
        for (name, value) in self.outbound_headers(inbound_headers, ctx).iter() {
            builder = builder.header(name.as_str(), value.as_bytes());
        }
        let request = builder
            .body(body)
            .build()
            .map_err(|e| InternalError::RequestConstructionFailure(e.to_string()))?;

        let upstream = self.client.execute(request).await.map_err(|e| {
            let classified = classify_transport_error(&e);
            tracing::error!(
                service = %route.route.service,
                url = %url,
                error = %e,
                is_timeout = e.is_timeout(),
                is_connect = e.is_connect(),
                "Failed to proxy request"
            );
            GatewayError::Proxy(classified)
        })?;

        let status = StatusCode::from_u16(upstream.status().as_u16())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let mut relayed = HeaderMap::with_capacity(upstream.headers().len());
        for (name, value) in upstream.headers().iter() {
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_str().as_bytes()),
                HeaderValue::from_bytes(value.as_bytes()),
            ) {
                relayed.append(name, value);
            }
        }

        let bytes = upstream.bytes().await.map_err(|e| {
            tracing::error!(
                service = %route.route.service,
                error = %e,
                "Failed to read backend response body"
            );
            InternalError::BodyReadFailure(e.to_string())
        })?;

        let mut response = Response::new(Body::from(bytes));
        *response.status_mut() = status;
        *response.headers_mut() = forwardable_headers(&relayed);
        set_header(response.headers_mut(), X_GATEWAY_SERVICE, &route.route.service);
        set_header(
            response.headers_mut(),
            X_GATEWAY_RESPONSE_TIME,
            &chrono::Utc::now().to_rfc3339(),
        );

        Ok(response)
    }
}
