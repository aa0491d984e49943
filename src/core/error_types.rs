//! Shared constants for structured error bodies and upstream error labels.

use std::fmt;

pub const ERROR_CODE_UNAUTHORIZED: &str = "unauthorized";
pub const ERROR_CODE_RATE_LIMIT: &str = "rate_limit_exceeded";
pub const ERROR_CODE_SERVICE_UNAVAILABLE: &str = "service_unavailable";
pub const ERROR_CODE_NOT_FOUND: &str = "endpoint_not_found";
pub const ERROR_CODE_PAYLOAD_TOO_LARGE: &str = "payload_too_large";
pub const ERROR_CODE_GATEWAY_TIMEOUT: &str = "gateway_timeout";
pub const ERROR_CODE_BAD_GATEWAY: &str = "bad_gateway";
pub const ERROR_CODE_INTERNAL: &str = "internal_server_error";

pub const UPSTREAM_ERROR_TIMEOUT: &str = "timeout";
pub const UPSTREAM_ERROR_CONNECT: &str = "connect_error";
pub const UPSTREAM_ERROR_SERVER_5XX: &str = "server_5xx";
pub const UPSTREAM_ERROR_BODY_READ: &str = "body_read_error";

/// Kind of failed backend call, used as the `kind` metric label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamErrorKind {
    Timeout,
    Connect,
    Server5xx,
    BodyRead,
}

impl UpstreamErrorKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Timeout => UPSTREAM_ERROR_TIMEOUT,
            Self::Connect => UPSTREAM_ERROR_CONNECT,
            Self::Server5xx => UPSTREAM_ERROR_SERVER_5XX,
            Self::BodyRead => UPSTREAM_ERROR_BODY_READ,
        }
    }
}

impl fmt::Display for UpstreamErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
