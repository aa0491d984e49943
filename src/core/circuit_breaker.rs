//! Per-backend circuit breaker.
//!
//! Each backend service key moves between two states:
//!
//! - `Closed`: calls pass. A failure bumps the counter and stamps the failure
//!   time; once the counter exceeds the threshold the circuit opens.
//! - `Open`: calls are rejected without touching the network until the
//!   cooldown has elapsed since the last failure. The first call after that
//!   resets the counters and goes through as a trial request.
//!
//! A success (status < 400) resets the counter. All updates for one key happen
//! under that key's shard lock, so concurrent outcomes never lose increments.

use axum::http::StatusCode;
use dashmap::DashMap;
use tokio::time::Instant;

use crate::core::config::CircuitBreakerConfig;
use crate::core::error::{GatewayError, Result};
use crate::core::logging::get_request_id;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitStatus {
    Closed,
    Open,
}

impl CircuitStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitStatus::Closed => "closed",
            CircuitStatus::Open => "open",
        }
    }
}

#[derive(Debug)]
struct CircuitState {
    failure_count: u32,
    last_failure: Option<Instant>,
    status: CircuitStatus,
}

impl Default for CircuitState {
    fn default() -> Self {
        Self {
            failure_count: 0,
            last_failure: None,
            status: CircuitStatus::Closed,
        }
    }
}

impl CircuitState {
    fn reset(&mut self) {
        self.failure_count = 0;
        self.last_failure = None;
        self.status = CircuitStatus::Closed;
    }
}

/// Point-in-time view of one circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitSnapshot {
    pub status: CircuitStatus,
    pub failure_count: u32,
}

pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    circuits: DashMap<String, CircuitState>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            circuits: DashMap::new(),
        }
    }

    /// Decide whether a call to `service` may proceed.
    ///
    /// An open circuit whose cooldown has elapsed is closed again here and the
    /// call is let through.
    pub fn check(&self, service: &str) -> Result<()> {
        let Some(mut state) = self.circuits.get_mut(service) else {
            return Ok(());
        };

        if state.status == CircuitStatus::Closed {
            return Ok(());
        }

        let cooled_down = state
            .last_failure
            .map_or(true, |at| at.elapsed() >= self.config.cooldown);

        if cooled_down {
            state.reset();
            tracing::info!(service = %service, "Circuit cooldown elapsed, probing backend");
            Ok(())
        } else {
            Err(GatewayError::CircuitOpen {
                service: service.to_string(),
            })
        }
    }

    /// Record a failed call (transport error or 5xx).
    pub fn record_failure(&self, service: &str) {
        let mut state = self.circuits.entry(service.to_string()).or_default();
        state.failure_count = state.failure_count.saturating_add(1);
        state.last_failure = Some(Instant::now());

        if state.status == CircuitStatus::Closed
            && state.failure_count > self.config.failure_threshold
        {
            state.status = CircuitStatus::Open;
            tracing::warn!(
                request_id = %get_request_id(),
                service = %service,
                failures = state.failure_count,
                cooldown_secs = self.config.cooldown.as_secs(),
                "Circuit opened"
            );
        }
    }

    /// Record a successful call.
    pub fn record_success(&self, service: &str) {
        if let Some(mut state) = self.circuits.get_mut(service) {
            if state.failure_count > 0 || state.status == CircuitStatus::Open {
                state.reset();
            }
        }
    }

    /// Record a completed call by its status code. 4xx answers are neither a
    /// success nor a failure.
    pub fn record_status(&self, service: &str, status: StatusCode) {
        if status.is_server_error() {
            self.record_failure(service);
        } else if status.as_u16() < 400 {
            self.record_success(service);
        }
    }

    pub fn snapshot(&self, service: &str) -> CircuitSnapshot {
        self.circuits
            .get(service)
            .map(|state| CircuitSnapshot {
                status: state.status,
                failure_count: state.failure_count,
            })
            .unwrap_or(CircuitSnapshot {
                status: CircuitStatus::Closed,
                failure_count: 0,
            })
    }
}
