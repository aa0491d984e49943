//! Static route table.
//!
//! Maps request paths to backend descriptors. Patterns are made of literal
//! segments, `:name` parameters and an optional trailing `*name` wildcard that
//! captures the rest of the path (possibly empty). When several routes match,
//! the most specific one wins: more fixed segments first, then more literal
//! segments. A route may restrict the methods it serves; a path that only
//! matches routes for other methods is treated as unknown.
//!
//! The table is built once at startup and only read afterwards.

use axum::http::Method;
use std::cmp::Ordering;
use std::sync::Arc;
use thiserror::Error;

use crate::core::error::{GatewayError, Result};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RouteError {
    #[error("invalid route pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("invalid backend URL for {service}: {url}")]
    InvalidBackend { service: String, url: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
    Wildcard(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePattern {
    raw: String,
    segments: Vec<Segment>,
}

fn split_path(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

impl RoutePattern {
    pub fn parse(pattern: &str) -> Result<Self, RouteError> {
        let invalid = |reason: &str| RouteError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: reason.to_string(),
        };

        if !pattern.starts_with('/') {
            return Err(invalid("must start with '/'"));
        }

        let raw: Vec<&str> = split_path(pattern).collect();
        let mut segments = Vec::with_capacity(raw.len());
        for (i, part) in raw.iter().enumerate() {
            let segment = if let Some(name) = part.strip_prefix(':') {
                if name.is_empty() {
                    return Err(invalid("empty parameter name"));
                }
                Segment::Param(name.to_string())
            } else if let Some(name) = part.strip_prefix('*') {
                if name.is_empty() {
                    return Err(invalid("empty wildcard name"));
                }
                if i + 1 != raw.len() {
                    return Err(invalid("wildcard must be the last segment"));
                }
                Segment::Wildcard(name.to_string())
            } else {
                Segment::Literal(part.to_string())
            };
            segments.push(segment);
        }

        Ok(Self {
            raw: pattern.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Bind the pattern against a concrete path.
    fn bind(&self, path: &str) -> Option<Vec<(String, String)>> {
        let parts: Vec<&str> = split_path(path).collect();
        let mut params = Vec::new();

        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Literal(lit) => {
                    if parts.get(i) != Some(&lit.as_str()) {
                        return None;
                    }
                }
                Segment::Param(name) => {
                    let value = parts.get(i)?;
                    params.push((name.clone(), (*value).to_string()));
                }
                Segment::Wildcard(name) => {
                    let rest = parts.get(i..).unwrap_or_default().join("/");
                    params.push((name.clone(), format!("/{}", rest)));
                    return Some(params);
                }
            }
        }

        if parts.len() == self.segments.len() {
            Some(params)
        } else {
            None
        }
    }

    /// Ranking used to pick among several matching patterns.
    fn specificity(&self) -> (usize, usize) {
        let fixed = self
            .segments
            .iter()
            .filter(|s| !matches!(s, Segment::Wildcard(_)))
            .count();
        let literal = self
            .segments
            .iter()
            .filter(|s| matches!(s, Segment::Literal(_)))
            .count();
        (fixed, literal)
    }
}

/// How the inbound path becomes the backend path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathRewrite {
    /// Forward the inbound path unchanged
    Preserve,
    /// Remove a leading prefix when present
    StripPrefix(String),
    /// Build the path from a template with `:name` / `*name` placeholders
    Template(String),
}

/// Immutable description of one proxied route.
#[derive(Debug, Clone)]
pub struct RouteDescriptor {
    pub pattern: RoutePattern,
    /// Backend identity, used for the breaker key and `X-Gateway-Service`
    pub service: String,
    pub backend_url: String,
    pub auth_required: bool,
    pub methods: Option<Vec<Method>>,
    pub rewrite: PathRewrite,
}

impl RouteDescriptor {
    /// Protected route serving every method, forwarding the path unchanged.
    pub fn new(
        pattern: &str,
        service: impl Into<String>,
        backend_url: impl Into<String>,
    ) -> Result<Self, RouteError> {
        let service = service.into();
        let backend_url = backend_url.into();
        if reqwest::Url::parse(&backend_url)
            .ok()
            .and_then(|url| url.host_str().map(|_| ()))
            .is_none()
        {
            return Err(RouteError::InvalidBackend {
                service,
                url: backend_url,
            });
        }

        Ok(Self {
            pattern: RoutePattern::parse(pattern)?,
            service,
            backend_url,
            auth_required: true,
            methods: None,
            rewrite: PathRewrite::Preserve,
        })
    }

    pub fn public(mut self) -> Self {
        self.auth_required = false;
        self
    }

    pub fn methods(mut self, methods: &[Method]) -> Self {
        self.methods = Some(methods.to_vec());
        self
    }

    pub fn rewrite(mut self, rewrite: PathRewrite) -> Self {
        self.rewrite = rewrite;
        self
    }

    fn allows(&self, method: &Method) -> bool {
        self.methods
            .as_ref()
            .map_or(true, |methods| methods.contains(method))
    }
}

/// Result of a successful lookup.
#[derive(Debug, Clone)]
pub struct RouteMatch {
    pub route: Arc<RouteDescriptor>,
    pub params: Vec<(String, String)>,
    pub path: String,
}

impl RouteMatch {
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Backend path after applying the route's rewrite rule.
    pub fn target_path(&self) -> String {
        let path = match &self.route.rewrite {
            PathRewrite::Preserve => self.path.clone(),
            PathRewrite::StripPrefix(prefix) => self
                .path
                .strip_prefix(prefix.as_str())
                .unwrap_or(&self.path)
                .to_string(),
            PathRewrite::Template(template) => {
                let mut out = String::with_capacity(template.len());
                for part in split_path(template) {
                    let bound = part
                        .strip_prefix(':')
                        .or_else(|| part.strip_prefix('*'))
                        .and_then(|name| self.param(name));
                    match bound {
                        Some(value) => {
                            let value = value.trim_start_matches('/');
                            if !value.is_empty() {
                                out.push('/');
                                out.push_str(value);
                            }
                        }
                        None => {
                            out.push('/');
                            out.push_str(part);
                        }
                    }
                }
                out
            }
        };

        if path.starts_with('/') {
            path
        } else {
            format!("/{}", path)
        }
    }
}

/// Read-only route table.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<Arc<RouteDescriptor>>,
}

impl RouteTable {
    pub fn new(routes: Vec<RouteDescriptor>) -> Self {
        Self {
            routes: routes.into_iter().map(Arc::new).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn routes(&self) -> impl Iterator<Item = &RouteDescriptor> {
        self.routes.iter().map(|r| r.as_ref())
    }

    /// Find the most specific route for `method` and `path`.
    pub fn resolve(&self, method: &Method, path: &str) -> Result<RouteMatch> {
        let mut best: Option<(&Arc<RouteDescriptor>, Vec<(String, String)>)> = None;

        for route in self.routes.iter().filter(|r| r.allows(method)) {
            let Some(params) = route.pattern.bind(path) else {
                continue;
            };
            let better = match &best {
                None => true,
                Some((current, _)) => {
                    route.pattern.specificity().cmp(&current.pattern.specificity())
                        == Ordering::Greater
                }
            };
            if better {
                best = Some((route, params));
            }
        }

        best.map(|(route, params)| RouteMatch {
            route: Arc::clone(route),
            params,
            path: path.to_string(),
        })
        .ok_or_else(|| GatewayError::RouteNotFound {
            method: method.to_string(),
            path: path.to_string(),
        })
    }

    /// Build the full route surface, resolving each backend URL through
    /// `lookup` and falling back to its default.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, RouteError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let backend = |env: &str, default: &str| {
            lookup(env)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let auth_url = backend("AUTH_SERVICE", "http://localhost:3008");
        let user_url = backend("USER_SERVICE", "http://localhost:3009");

        let mut routes = vec![
            RouteDescriptor::new("/api/v1/auth/login", "auth-service", &auth_url)?
                .public()
                .methods(&[Method::POST]),
            RouteDescriptor::new("/api/v1/auth/register", "auth-service", &auth_url)?
                .public()
                .methods(&[Method::POST]),
            RouteDescriptor::new("/api/v1/auth/refresh", "auth-service", &auth_url)?
                .public()
                .methods(&[Method::POST]),
            RouteDescriptor::new("/api/v1/auth/logout", "auth-service", &auth_url)?
                .methods(&[Method::POST]),
            RouteDescriptor::new("/api/v1/auth/profile", "auth-service", &auth_url)?
                .methods(&[Method::GET]),
            RouteDescriptor::new("/api/v1/auth/groups/*path", "auth-service", &auth_url)?.public(),
            RouteDescriptor::new("/api/v1/auth/primary-group/*path", "auth-service", &auth_url)?
                .public(),
            RouteDescriptor::new("/api/v1/auth/primary-role/*path", "auth-service", &auth_url)?
                .public(),
            RouteDescriptor::new("/api/v1/users", "user-service", &user_url)?
                .methods(&[Method::GET])
                .rewrite(PathRewrite::StripPrefix("/api/v1/users".to_string())),
            RouteDescriptor::new("/api/v1/users/:id", "user-service", &user_url)?
                .methods(&[Method::GET, Method::PUT, Method::DELETE])
                .rewrite(PathRewrite::Template("/api/v1/users/:id".to_string())),
        ];

        for (prefix, env, default) in PROTECTED_GROUPS {
            routes.push(RouteDescriptor::new(
                &format!("/api/v1/{}/*path", prefix),
                service_name(env),
                backend(env, default),
            )?);
        }

        for (prefix, env, default) in PUBLIC_GROUPS {
            routes.push(
                RouteDescriptor::new(
                    &format!("/api/v1/public/{}/*path", prefix),
                    service_name(env),
                    backend(env, default),
                )?
                .public(),
            );
        }

        Ok(Self::new(routes))
    }

    pub fn from_env() -> Result<Self, RouteError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }
}

/// `FINANCE_SERVICE` -> `finance-service`
pub fn service_name(env_var: &str) -> String {
    env_var.to_ascii_lowercase().replace('_', "-")
}

/// Authenticated route groups: (path under /api/v1, env var, default URL).
const PROTECTED_GROUPS: &[(&str, &str, &str)] = &[
    // core ERP
    ("core/commerce", "COMMERCE_SERVICE", "http://localhost:3014"),
    ("core/cms", "CMS_SERVICE", "http://localhost:3021"),
    ("core/finance", "FINANCE_SERVICE", "http://localhost:3028"),
    ("core/hrm", "HRM_SERVICE", "http://localhost:3029"),
    ("core/inventory", "INVENTORY_SERVICE", "http://localhost:3030"),
    ("core/procurement", "PROCUREMENT_SERVICE", "http://localhost:3031"),
    ("core/crm", "CRM_SERVICE", "http://localhost:3033"),
    // industry
    ("industry/ecommerce", "INDUSTRY_ECOMMERCE_SERVICE", "http://localhost:3014"),
    ("industry/retail", "RETAIL_SERVICE", "http://localhost:3036"),
    ("industry/restaurant", "RESTAURANT_SERVICE", "http://localhost:3037"),
    ("industry/healthcare", "HEALTHCARE_SERVICE", "http://localhost:3034"),
    ("industry/agriculture", "AGRICULTURE_SERVICE", "http://localhost:3035"),
    ("industry/manufacturing", "MANUFACTURING_SERVICE", "http://localhost:3038"),
    // analytics
    ("ai", "AI_SERVICE", "http://localhost:3017"),
    ("ml-pipeline", "ML_PIPELINE_SERVICE", "http://localhost:3018"),
    ("analytics", "ANALYTICS_SERVICE", "http://localhost:3019"),
    ("user-analytics", "USER_ANALYTICS_SERVICE", "http://localhost:3020"),
    // content
    ("content", "CONTENT_SERVICE", "http://localhost:3021"),
    ("media", "MEDIA_SERVICE", "http://localhost:3022"),
    ("metadata", "METADATA_SERVICE", "http://localhost:3023"),
    ("ecommerce", "ECOMMERCE_SERVICE", "http://localhost:3032"),
    // infrastructure
    ("security", "SECURITY_SERVICE", "http://localhost:3040"),
    ("observability", "OBSERVABILITY_SERVICE", "http://localhost:3041"),
    ("cost-optimization", "COST_OPTIMIZATION_SERVICE", "http://localhost:3042"),
    ("load-balancer", "LOAD_BALANCER_SERVICE", "http://localhost:3043"),
    ("secrets", "SECRETS_MANAGEMENT_SERVICE", "http://localhost:3044"),
    // integration
    ("api-docs", "API_DOCUMENTATION_SERVICE", "http://localhost:3050"),
    ("integration", "INTEGRATION_SERVICE", "http://localhost:3051"),
    ("currency", "CURRENCY_EXCHANGE_SERVICE", "http://localhost:3052"),
    // marketplace
    ("templates", "TEMPLATE_MARKETPLACE", "http://localhost:3060"),
    ("template-install", "TEMPLATE_INSTALLATION", "http://localhost:3061"),
    ("template-preview", "TEMPLATE_PREVIEW", "http://localhost:3062"),
    // shared
    ("notifications", "NOTIFICATION_SERVICE", "http://localhost:3070"),
    ("workflow", "WORKFLOW_SERVICE", "http://localhost:3071"),
    ("billing", "BILLING_SERVICE", "http://localhost:3072"),
];

/// Anonymous route groups under /api/v1/public.
const PUBLIC_GROUPS: &[(&str, &str, &str)] = &[
    ("templates", "TEMPLATE_MARKETPLACE", "http://localhost:3060"),
    ("content", "CONTENT_SERVICE", "http://localhost:3021"),
    ("currency", "CURRENCY_EXCHANGE_SERVICE", "http://localhost:3052"),
    ("api-docs", "API_DOCUMENTATION_SERVICE", "http://localhost:3050"),
];
