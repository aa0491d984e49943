//! Configuration management for the gateway.
//!
//! All settings come from environment variables (optionally seeded from a
//! `.env` file). Every value has a default except the JWT secret; malformed
//! numeric values are startup errors rather than silent fallbacks.

use anyhow::{bail, Context, Result};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Main gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Bind address
    pub server: ServerConfig,

    /// Deployment environment name (`production` tightens log defaults)
    pub environment: String,

    /// Token verification settings
    pub auth: AuthConfig,

    /// Revocation store URL; `None` selects the in-process store
    pub redis_url: Option<String>,

    /// Admission control settings
    pub rate_limit: RateLimitConfig,

    /// Per-backend circuit breaker settings
    pub circuit_breaker: CircuitBreakerConfig,

    /// Outbound forwarding settings
    pub upstream: UpstreamConfig,

    /// Grace period for in-flight requests on shutdown
    pub shutdown_grace: Duration,

    /// Take the client IP from `X-Forwarded-For` / `X-Real-IP`
    pub trust_forwarded_headers: bool,

    /// Install the permissive CORS layer
    pub enable_cors: bool,

    /// Log output format
    pub log_format: LogFormat,
}

/// Server-specific configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3004,
        }
    }
}

/// Bearer token verification settings.
#[derive(Clone)]
pub struct AuthConfig {
    /// Shared HMAC secret with the auth service
    pub jwt_secret: String,

    /// Required `iss` claim, when set
    pub issuer: Option<String>,

    /// Upper bound on a single revocation-store lookup
    pub revocation_timeout: Duration,
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &"***")
            .field("issuer", &self.issuer)
            .field("revocation_timeout", &self.revocation_timeout)
            .finish()
    }
}

/// How the admission controller keys its buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitKey {
    /// Always the client IP
    ClientIp,
    /// Verified tenant (user when the tenant is empty), else client IP
    Identity,
}

impl FromStr for RateLimitKey {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ip" | "client_ip" => Ok(RateLimitKey::ClientIp),
            "identity" | "tenant" | "user" => Ok(RateLimitKey::Identity),
            other => bail!("unknown rate limit key strategy: {}", other),
        }
    }
}

/// Tenant subscription plan with its own per-minute limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TenantTier {
    Basic,
    Pro,
    Enterprise,
}

impl TenantTier {
    pub const fn limit_per_minute(self) -> u32 {
        match self {
            TenantTier::Basic => 100,
            TenantTier::Pro => 500,
            TenantTier::Enterprise => 2000,
        }
    }
}

impl FromStr for TenantTier {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "basic" => Ok(TenantTier::Basic),
            "pro" => Ok(TenantTier::Pro),
            "enterprise" => Ok(TenantTier::Enterprise),
            other => bail!("unknown tenant tier: {}", other),
        }
    }
}

/// Admission control configuration.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Limit for identities without a tier
    pub default_per_minute: u32,

    /// Bucket keying policy
    pub key: RateLimitKey,

    /// Tenant id -> plan
    pub tenant_tiers: HashMap<String, TenantTier>,
}

impl RateLimitConfig {
    /// Per-minute limit for a tenant, falling back to the default.
    pub fn limit_for_tenant(&self, tenant_id: Option<&str>) -> u32 {
        tenant_id
            .and_then(|t| self.tenant_tiers.get(t))
            .map(|tier| tier.limit_per_minute())
            .unwrap_or(self.default_per_minute)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            default_per_minute: 60,
            key: RateLimitKey::ClientIp,
            tenant_tiers: HashMap::new(),
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// The breaker opens once the failure count exceeds this value
    pub failure_threshold: u32,

    /// How long an open breaker rejects calls after the last failure
    pub cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(60),
        }
    }
}

/// Outbound forwarding configuration.
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    pub timeout: Duration,
    pub pool_max_idle_per_host: usize,
    pub pool_idle_timeout: Duration,
    pub forwarded_proto: String,
    pub max_body_bytes: usize,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            pool_max_idle_per_host: 10,
            pool_idle_timeout: Duration::from_secs(90),
            forwarded_proto: "http".to_string(),
            max_body_bytes: 10 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl GatewayConfig {
    /// Load configuration from the process environment.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use tenant_gateway::core::config::GatewayConfig;
    ///
    /// let config = GatewayConfig::from_env().expect("Failed to load config");
    /// ```
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let jwt_secret = lookup("JWT_SECRET")
            .filter(|s| !s.trim().is_empty())
            .context("JWT_SECRET environment variable is required")?;

        let server = ServerConfig {
            host: lookup("HOST").unwrap_or_else(|| ServerConfig::default().host),
            port: parse_or(&lookup, "PORT", ServerConfig::default().port)?,
        };

        let auth = AuthConfig {
            jwt_secret,
            issuer: lookup("JWT_ISSUER").filter(|s| !s.is_empty()),
            revocation_timeout: Duration::from_millis(parse_or(
                &lookup,
                "REVOCATION_TIMEOUT_MS",
                500u64,
            )?),
        };

        let rate_limit = RateLimitConfig {
            default_per_minute: parse_or(&lookup, "RATE_LIMIT_PER_MINUTE", 60u32)?,
            key: match lookup("RATE_LIMIT_KEY") {
                Some(value) => value.parse()?,
                None => RateLimitKey::ClientIp,
            },
            tenant_tiers: match lookup("TENANT_TIERS") {
                Some(value) => parse_tenant_tiers(&value)?,
                None => HashMap::new(),
            },
        };
        if rate_limit.default_per_minute == 0 {
            bail!("RATE_LIMIT_PER_MINUTE must be greater than zero");
        }

        let circuit_breaker = CircuitBreakerConfig {
            failure_threshold: parse_or(&lookup, "CIRCUIT_FAILURE_THRESHOLD", 5u32)?,
            cooldown: Duration::from_secs(parse_or(&lookup, "CIRCUIT_COOLDOWN_SECS", 60u64)?),
        };

        let defaults = UpstreamConfig::default();
        let upstream = UpstreamConfig {
            timeout: Duration::from_secs(parse_or(&lookup, "UPSTREAM_TIMEOUT_SECS", 30u64)?),
            pool_max_idle_per_host: parse_or(
                &lookup,
                "POOL_MAX_IDLE_PER_HOST",
                defaults.pool_max_idle_per_host,
            )?,
            pool_idle_timeout: Duration::from_secs(parse_or(
                &lookup,
                "POOL_IDLE_TIMEOUT_SECS",
                90u64,
            )?),
            forwarded_proto: lookup("FORWARDED_PROTO").unwrap_or(defaults.forwarded_proto),
            max_body_bytes: parse_or(&lookup, "MAX_BODY_BYTES", defaults.max_body_bytes)?,
        };

        let log_format = match lookup("LOG_FORMAT").as_deref().map(str::to_ascii_lowercase) {
            Some(ref f) if f == "json" => LogFormat::Json,
            _ => LogFormat::Text,
        };

        Ok(Self {
            server,
            environment: lookup("ENVIRONMENT").unwrap_or_else(|| "development".to_string()),
            auth,
            redis_url: lookup("REDIS_URL").filter(|s| !s.is_empty()),
            rate_limit,
            circuit_breaker,
            upstream,
            shutdown_grace: Duration::from_secs(parse_or(&lookup, "SHUTDOWN_GRACE_SECS", 10u64)?),
            trust_forwarded_headers: lookup("TRUST_FORWARDED_HEADERS")
                .map(|v| str_to_bool(&v))
                .unwrap_or(false),
            enable_cors: lookup("ENABLE_CORS")
                .map(|v| str_to_bool(&v))
                .unwrap_or(true),
            log_format,
        })
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }
}

/// Parse `tenant=plan` pairs separated by commas.
pub fn parse_tenant_tiers(value: &str) -> Result<HashMap<String, TenantTier>> {
    let mut tiers = HashMap::new();
    for pair in value.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (tenant, plan) = pair
            .split_once('=')
            .with_context(|| format!("invalid TENANT_TIERS entry: {}", pair))?;
        let tenant = tenant.trim();
        if tenant.is_empty() {
            bail!("invalid TENANT_TIERS entry: {}", pair);
        }
        tiers.insert(tenant.to_string(), plan.parse()?);
    }
    Ok(tiers)
}

fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("invalid value for {}: {:?}", key, raw)),
        None => Ok(default),
    }
}

/// Convert string to boolean.
///
/// Accepts: "true", "1", "yes", "on" (case-insensitive)
pub fn str_to_bool(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "true" | "1" | "yes" | "on"
    )
}
