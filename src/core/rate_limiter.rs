//! Per-identity admission control.
//!
//! Each identity (client IP, tenant or user, depending on the keying policy)
//! owns a token bucket via the governor crate: `limit` permits, refilled
//! continuously at `limit / 60s`, with a burst equal to the limit. The limit is
//! supplied by the caller on every check so that tenant plans can differ.
//!
//! Buckets live in a sharded concurrent map; a check only locks the shard of
//! its own identity.

use dashmap::DashMap;
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter as GovernorRateLimiter,
};
use std::num::NonZeroU32;

use crate::core::error::{GatewayError, Result};
use crate::core::logging::get_request_id;

/// Type alias for a single identity's bucket
type Bucket = GovernorRateLimiter<NotKeyed, InMemoryState, DefaultClock>;

struct ClientBucket {
    limit_per_minute: u32,
    limiter: Bucket,
}

impl ClientBucket {
    fn new(limit_per_minute: NonZeroU32) -> Self {
        Self {
            limit_per_minute: limit_per_minute.get(),
            limiter: GovernorRateLimiter::direct(Quota::per_minute(limit_per_minute)),
        }
    }
}

/// Token-bucket rate limiter keyed by identity.
pub struct RateLimiter {
    buckets: DashMap<String, ClientBucket>,
}

impl RateLimiter {
    /// Create a new rate limiter instance.
    pub fn new() -> Self {
        Self {
            buckets: DashMap::new(),
        }
    }

    /// Try to consume one permit for `identity` under `limit_per_minute`.
    ///
    /// The bucket is created full on first use. If the limit for an identity
    /// changes (tenant moved to another plan), its bucket is replaced.
    /// A zero limit admits nothing.
    pub fn allow(&self, identity: &str, limit_per_minute: u32) -> bool {
        let Some(limit) = NonZeroU32::new(limit_per_minute) else {
            return false;
        };

        if let Some(bucket) = self.buckets.get(identity) {
            if bucket.limit_per_minute == limit_per_minute {
                return bucket.limiter.check().is_ok();
            }
        }

        let mut bucket = self
            .buckets
            .entry(identity.to_string())
            .or_insert_with(|| ClientBucket::new(limit));
        if bucket.limit_per_minute != limit_per_minute {
            *bucket = ClientBucket::new(limit);
        }
        bucket.limiter.check().is_ok()
    }

    /// Check if a request is allowed for the given identity.
    ///
    /// # Returns
    ///
    /// * `Ok(())` if the request is allowed
    /// * `Err(GatewayError::RateLimitExceeded)` if the bucket is empty
    pub fn check_rate_limit(&self, identity: &str, limit_per_minute: u32) -> Result<()> {
        if self.allow(identity, limit_per_minute) {
            Ok(())
        } else {
            tracing::warn!(
                request_id = %get_request_id(),
                identity = %identity,
                limit_per_minute,
                "Rate limit exceeded"
            );
            Err(GatewayError::RateLimitExceeded { limit_per_minute })
        }
    }

    /// Number of identities with a bucket.
    pub fn tracked_identities(&self) -> usize {
        self.buckets.len()
    }

    /// Forget an identity; its next request starts with a full bucket.
    pub fn remove_identity(&self, identity: &str) {
        self.buckets.remove(identity);
    }

    /// Clear all buckets.
    pub fn clear(&self) {
        self.buckets.clear();
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
