//! The request pipeline.
//!
//! A request goes through route lookup, then an ordered list of stages, then
//! the forwarder. Any stage may end the request early with a
//! [`GatewayError`]; the error decides the response. After forwarding, the
//! outcome is charged to the backend's circuit breaker and the request is
//! recorded in metrics and the access log.
//!
//! Stage order depends on how admission control is keyed: with client-IP
//! keying, admission runs first so that rejected traffic never reaches token
//! verification; with identity keying, authentication runs first so the
//! verified tenant is known when picking the bucket.

use async_trait::async_trait;
use axum::{
    body::{Body, Bytes},
    extract::{ConnectInfo, Request},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use prometheus::IntGauge;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::api::auth::Authenticator;
use crate::api::context::RequestContext;
use crate::api::proxy::ProxyForwarder;
use crate::api::routes::RouteTable;
use crate::core::circuit_breaker::CircuitBreaker;
use crate::core::config::{GatewayConfig, RateLimitConfig, RateLimitKey};
use crate::core::error::{GatewayError, InternalError, ProxyError, Result};
use crate::core::error_types::UpstreamErrorKind;
use crate::core::header_policy::forwarded_client_ip;
use crate::core::logging::generate_request_id;
use crate::core::metrics::GatewayMetrics;
use crate::core::middleware::RequestId;
use crate::core::rate_limiter::RateLimiter;

/// Result of running one stage.
#[derive(Debug)]
pub enum StageOutcome {
    Continue,
    ShortCircuit(GatewayError),
}

#[async_trait]
pub trait PipelineStage: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run(&self, ctx: &mut RequestContext, headers: &HeaderMap) -> StageOutcome;
}

/// Token-bucket admission control.
pub struct AdmissionStage {
    limiter: Arc<RateLimiter>,
    policy: RateLimitConfig,
    metrics: Arc<GatewayMetrics>,
}

impl AdmissionStage {
    pub fn new(
        limiter: Arc<RateLimiter>,
        policy: RateLimitConfig,
        metrics: Arc<GatewayMetrics>,
    ) -> Self {
        Self {
            limiter,
            policy,
            metrics,
        }
    }

    /// Bucket key and per-minute limit for this request.
    pub fn admission_key(&self, ctx: &RequestContext) -> (String, u32) {
        match (self.policy.key, &ctx.identity) {
            (RateLimitKey::Identity, Some(identity)) if !identity.tenant_id.is_empty() => (
                format!("tenant:{}", identity.tenant_id),
                self.policy.limit_for_tenant(Some(&identity.tenant_id)),
            ),
            (RateLimitKey::Identity, Some(identity)) => (
                format!("user:{}", identity.user_id),
                self.policy.default_per_minute,
            ),
            _ => (
                format!("ip:{}", ctx.client_ip),
                self.policy.default_per_minute,
            ),
        }
    }

    /// Charge a request whose credentials were rejected to its client IP
    /// bucket, the same one anonymous traffic from that address uses.
    pub fn admit_unverified(&self, ctx: &RequestContext) -> Result<()> {
        let key = format!("ip:{}", ctx.client_ip);
        self.charge(ctx, &key, self.policy.default_per_minute)
    }

    fn charge(&self, ctx: &RequestContext, key: &str, limit: u32) -> Result<()> {
        self.limiter.check_rate_limit(key, limit).map_err(|err| {
            self.metrics
                .rate_limited_total
                .with_label_values(&[ctx.route_label()])
                .inc();
            err
        })
    }
}

#[async_trait]
impl PipelineStage for AdmissionStage {
    fn name(&self) -> &'static str {
        "admission"
    }

    async fn run(&self, ctx: &mut RequestContext, _headers: &HeaderMap) -> StageOutcome {
        let (key, limit) = self.admission_key(ctx);
        match self.charge(ctx, &key, limit) {
            Ok(()) => StageOutcome::Continue,
            Err(err) => StageOutcome::ShortCircuit(err),
        }
    }
}

/// Bearer token verification for protected routes.
pub struct AuthenticationStage {
    authenticator: Arc<Authenticator>,
    unverified_admission: Option<Arc<AdmissionStage>>,
}

impl AuthenticationStage {
    pub fn new(authenticator: Arc<Authenticator>) -> Self {
        Self {
            authenticator,
            unverified_admission: None,
        }
    }

    /// Rate limit rejected credentials by client IP. Needed whenever
    /// admission runs after authentication.
    pub fn with_unverified_admission(mut self, admission: Arc<AdmissionStage>) -> Self {
        self.unverified_admission = Some(admission);
        self
    }
}

#[async_trait]
impl PipelineStage for AuthenticationStage {
    fn name(&self) -> &'static str {
        "authentication"
    }

    async fn run(&self, ctx: &mut RequestContext, headers: &HeaderMap) -> StageOutcome {
        let required = ctx.route.as_ref().map_or(true, |m| m.route.auth_required);
        if !required {
            return StageOutcome::Continue;
        }

        match self.authenticator.authenticate(headers).await {
            Ok(identity) => {
                ctx.identity = Some(identity);
                StageOutcome::Continue
            }
            Err(err) => {
                tracing::warn!(
                    path = %ctx.path,
                    client_ip = %ctx.client_ip,
                    reason = %err,
                    "Authentication failed"
                );
                if let Some(admission) = &self.unverified_admission {
                    if let Err(limited) = admission.admit_unverified(ctx) {
                        return StageOutcome::ShortCircuit(limited);
                    }
                }
                StageOutcome::ShortCircuit(err.into())
            }
        }
    }
}

/// Fail fast when the target backend's circuit is open.
pub struct CircuitStage {
    breaker: Arc<CircuitBreaker>,
    metrics: Arc<GatewayMetrics>,
}

impl CircuitStage {
    pub fn new(breaker: Arc<CircuitBreaker>, metrics: Arc<GatewayMetrics>) -> Self {
        Self { breaker, metrics }
    }
}

#[async_trait]
impl PipelineStage for CircuitStage {
    fn name(&self) -> &'static str {
        "circuit"
    }

    async fn run(&self, ctx: &mut RequestContext, _headers: &HeaderMap) -> StageOutcome {
        let Some(service) = ctx.service() else {
            return StageOutcome::Continue;
        };

        match self.breaker.check(service) {
            Ok(()) => StageOutcome::Continue,
            Err(err) => {
                self.metrics
                    .circuit_rejections_total
                    .with_label_values(&[service])
                    .inc();
                tracing::warn!(service = %service, path = %ctx.path, "Circuit open, rejecting request");
                StageOutcome::ShortCircuit(err)
            }
        }
    }
}

/// Keeps the in-flight gauge accurate even when the request future is
/// dropped on client disconnect.
struct ActiveRequestGuard(IntGauge);

impl ActiveRequestGuard {
    fn new(gauge: &IntGauge) -> Self {
        gauge.inc();
        Self(gauge.clone())
    }
}

impl Drop for ActiveRequestGuard {
    fn drop(&mut self) {
        self.0.dec();
    }
}

pub struct Gateway {
    routes: Arc<RouteTable>,
    stages: Vec<Arc<dyn PipelineStage>>,
    breaker: Arc<CircuitBreaker>,
    limiter: Arc<RateLimiter>,
    forwarder: ProxyForwarder,
    metrics: Arc<GatewayMetrics>,
    max_body_bytes: usize,
    trust_forwarded_headers: bool,
}

impl Gateway {
    pub fn new(
        config: &GatewayConfig,
        routes: RouteTable,
        authenticator: Arc<Authenticator>,
        metrics: Arc<GatewayMetrics>,
        client: reqwest::Client,
    ) -> Self {
        let limiter = Arc::new(RateLimiter::new());
        let breaker = Arc::new(CircuitBreaker::new(config.circuit_breaker.clone()));

        let admission = Arc::new(AdmissionStage::new(
            limiter.clone(),
            config.rate_limit.clone(),
            metrics.clone(),
        ));
        let admission_stage: Arc<dyn PipelineStage> = admission.clone();
        let circuit: Arc<dyn PipelineStage> =
            Arc::new(CircuitStage::new(breaker.clone(), metrics.clone()));

        let stages: Vec<Arc<dyn PipelineStage>> = match config.rate_limit.key {
            RateLimitKey::ClientIp => {
                let authentication: Arc<dyn PipelineStage> =
                    Arc::new(AuthenticationStage::new(authenticator));
                vec![admission_stage, authentication, circuit]
            }
            RateLimitKey::Identity => {
                let authentication: Arc<dyn PipelineStage> = Arc::new(
                    AuthenticationStage::new(authenticator)
                        .with_unverified_admission(admission.clone()),
                );
                vec![authentication, admission_stage, circuit]
            }
        };

        Self {
            routes: Arc::new(routes),
            stages,
            breaker,
            limiter,
            forwarder: ProxyForwarder::new(client, &config.upstream),
            metrics,
            max_body_bytes: config.upstream.max_body_bytes,
            trust_forwarded_headers: config.trust_forwarded_headers,
        }
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    pub fn circuit_breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    fn client_ip(&self, request: &Request) -> String {
        if self.trust_forwarded_headers {
            if let Some(ip) = forwarded_client_ip(request.headers()) {
                return ip;
            }
        }
        request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string())
            .unwrap_or_else(|| "unknown".to_string())
    }

    /// Run one request through the whole pipeline.
    pub async fn handle(&self, request: Request) -> Response {
        let request_id = request
            .extensions()
            .get::<RequestId>()
            .map(|id| id.0.clone())
            .unwrap_or_else(generate_request_id);
        let client_ip = self.client_ip(&request);

        let (parts, body) = request.into_parts();
        let mut ctx = RequestContext::new(
            request_id,
            parts.method.clone(),
            parts.uri.path().to_string(),
            parts.uri.query().map(str::to_string),
            client_ip,
            &parts.headers,
        );

        let _active = ActiveRequestGuard::new(&self.metrics.active_requests);

        let response = match self.process(&mut ctx, &parts.headers, body).await {
            Ok(response) => response,
            Err(err) => err.into_response(),
        };

        self.tap(&ctx, response.status());
        response
    }

    async fn process(
        &self,
        ctx: &mut RequestContext,
        headers: &HeaderMap,
        body: Body,
    ) -> Result<Response> {
        let route = self.routes.resolve(&ctx.method, &ctx.path)?;
        ctx.route = Some(route.clone());

        for stage in &self.stages {
            if let StageOutcome::ShortCircuit(err) = stage.run(ctx, headers).await {
                return Err(err);
            }
        }

        let body = self.read_body(headers, body).await?;

        let result = self.forwarder.forward(ctx, &route, headers, body).await;
        self.record_outcome(&route.route.service, &result);
        result
    }

    /// Buffer the inbound body, refusing anything above the configured cap.
    async fn read_body(&self, headers: &HeaderMap, body: Body) -> Result<Bytes> {
        let declared = headers
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<usize>().ok());
        if declared.map_or(false, |len| len > self.max_body_bytes) {
            return Err(GatewayError::PayloadTooLarge {
                limit: self.max_body_bytes,
            });
        }

        axum::body::to_bytes(body, self.max_body_bytes)
            .await
            .map_err(|e| {
                if e.to_string().contains("length limit") {
                    GatewayError::PayloadTooLarge {
                        limit: self.max_body_bytes,
                    }
                } else {
                    tracing::error!(error = %e, "Failed to read request body");
                    InternalError::BodyReadFailure(e.to_string()).into()
                }
            })
    }

    /// Charge the forwarding outcome to the backend's breaker.
    fn record_outcome(&self, service: &str, result: &Result<Response>) {
        let failure = match result {
            Ok(response) => {
                self.breaker.record_status(service, response.status());
                response
                    .status()
                    .is_server_error()
                    .then_some(UpstreamErrorKind::Server5xx)
            }
            Err(GatewayError::Proxy(err)) if err.counts_as_backend_failure() => {
                self.breaker.record_failure(service);
                Some(match err {
                    ProxyError::Timeout => UpstreamErrorKind::Timeout,
                    _ => UpstreamErrorKind::Connect,
                })
            }
            Err(GatewayError::Internal(InternalError::BodyReadFailure(_))) => {
                self.breaker.record_failure(service);
                Some(UpstreamErrorKind::BodyRead)
            }
            Err(_) => None,
        };

        if let Some(kind) = failure {
            self.metrics
                .upstream_errors_total
                .with_label_values(&[service, kind.as_str()])
                .inc();
        }
    }

    /// Metrics and access log for a finished request.
    fn tap(&self, ctx: &RequestContext, status: StatusCode) {
        let duration = ctx.started_at.elapsed().as_secs_f64();
        let method = ctx.method.as_str();
        let route = ctx.route_label();
        let tenant = ctx.tenant_label();

        self.metrics
            .requests_total
            .with_label_values(&[method, route, status.as_str(), tenant])
            .inc();
        self.metrics
            .request_duration
            .with_label_values(&[method, route, tenant])
            .observe(duration);

        tracing::info!(
            request_id = %ctx.request_id,
            client_ip = %ctx.client_ip,
            "{} {} - status={} route={} service={} tenant={} duration={:.3}s",
            method,
            ctx.path,
            status.as_u16(),
            route,
            ctx.service().unwrap_or("-"),
            tenant,
            duration
        );
    }
}
