//! Token revocation lookups.
//!
//! The auth service writes `blacklist:<token>` = `"true"` with a TTL equal to
//! the token's remaining lifetime when a user logs out. The gateway only reads
//! these entries.

use async_trait::async_trait;
use dashmap::DashMap;
use redis::{aio::ConnectionManager, AsyncCommands};
use std::time::{Duration, Instant};
use thiserror::Error;

pub const REVOCATION_KEY_PREFIX: &str = "blacklist:";

/// Store key for a raw bearer token.
pub fn revocation_key(token: &str) -> String {
    format!("{}{}", REVOCATION_KEY_PREFIX, token)
}

#[derive(Error, Debug)]
pub enum RevocationError {
    #[error("revocation store error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("revocation store unavailable: {0}")]
    Unavailable(String),
}

/// Read side of the shared revocation list.
#[async_trait]
pub trait RevocationStore: Send + Sync {
    /// Whether the token has been revoked before its natural expiry.
    async fn is_revoked(&self, token: &str) -> Result<bool, RevocationError>;

    /// Round trip to the backing store, used by the health endpoint.
    async fn ping(&self) -> Result<(), RevocationError>;

    fn backend_name(&self) -> &'static str;
}

/// Revocation store backed by Redis.
#[derive(Clone)]
pub struct RedisRevocationStore {
    conn: ConnectionManager,
}

impl RedisRevocationStore {
    /// Connect to Redis. Supports both redis:// and rediss:// URLs.
    pub async fn connect(url: &str) -> Result<Self, RevocationError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl RevocationStore for RedisRevocationStore {
    async fn is_revoked(&self, token: &str) -> Result<bool, RevocationError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(revocation_key(token)).await?;
        Ok(value.as_deref() == Some("true"))
    }

    async fn ping(&self) -> Result<(), RevocationError> {
        let mut conn = self.conn.clone();
        let reply: String = redis::cmd("PING").query_async(&mut conn).await?;
        if reply == "PONG" {
            Ok(())
        } else {
            Err(RevocationError::Unavailable(format!(
                "unexpected PING reply: {}",
                reply
            )))
        }
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}

/// Process-local revocation list with per-entry expiry.
///
/// Used when no Redis URL is configured and in tests. Entries are dropped
/// lazily when a lookup finds them expired.
#[derive(Default)]
pub struct InMemoryRevocationStore {
    entries: DashMap<String, Option<Instant>>,
}

impl InMemoryRevocationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Revoke a token, optionally only for `ttl`.
    pub fn revoke(&self, token: &str, ttl: Option<Duration>) {
        let expires_at = ttl.map(|ttl| Instant::now() + ttl);
        self.entries.insert(revocation_key(token), expires_at);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl RevocationStore for InMemoryRevocationStore {
    async fn is_revoked(&self, token: &str) -> Result<bool, RevocationError> {
        let key = revocation_key(token);
        let expired = match self.entries.get(&key) {
            None => return Ok(false),
            Some(entry) => matches!(*entry, Some(at) if at <= Instant::now()),
        };

        if expired {
            self.entries.remove(&key);
            Ok(false)
        } else {
            Ok(true)
        }
    }

    async fn ping(&self) -> Result<(), RevocationError> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
