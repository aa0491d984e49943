//! Bearer token authentication.
//!
//! Tokens are HMAC-signed JWTs issued by the auth service. Verification runs
//! in a fixed order, and the first failing check decides the rejection:
//!
//! 1. `Authorization` header present
//! 2. header has the form `Bearer <token>`
//! 3. signature verifies with an HMAC algorithm under the shared secret
//!    (and the issuer matches, when one is configured)
//! 4. `exp` is in the future and `nbf`, if present, is not
//! 5. the token is not in the revocation store
//!
//! Tokens signed with any non-HMAC algorithm are rejected outright.

use axum::http::{header, HeaderMap};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::api::context::Identity;
use crate::core::config::AuthConfig;
use crate::core::error::AuthError;
use crate::core::logging::get_request_id;
use crate::services::revocation::RevocationStore;

/// Claims carried by access tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub tenant_id: String,
    #[serde(default)]
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,
    pub exp: i64,
}

/// Extract the raw token from `Authorization: Bearer <token>`.
pub fn extract_bearer(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or(AuthError::MissingHeader)?
        .to_str()
        .map_err(|_| AuthError::MalformedHeader)?;

    if value.is_empty() {
        return Err(AuthError::MissingHeader);
    }

    match value.strip_prefix("Bearer ") {
        Some(token) if !token.is_empty() && !token.contains(' ') => Ok(token),
        _ => Err(AuthError::MalformedHeader),
    }
}

pub struct Authenticator {
    decoding_key: DecodingKey,
    validation: Validation,
    issuer: Option<String>,
    revocation: Arc<dyn RevocationStore>,
    revocation_timeout: Duration,
}

impl Authenticator {
    pub fn new(config: &AuthConfig, revocation: Arc<dyn RevocationStore>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.algorithms = vec![Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];
        // Time-based claims are checked after the signature, see `check_times`
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.leeway = 0;

        Self {
            decoding_key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            validation,
            issuer: config.issuer.clone(),
            revocation,
            revocation_timeout: config.revocation_timeout,
        }
    }

    /// Verify signature, issuer and validity window of a raw token.
    pub fn verify_token(&self, token: &str) -> Result<Claims, AuthError> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(|e| {
            tracing::debug!(error = %e, "JWT validation error");
            AuthError::InvalidSignature
        })?;
        let claims = data.claims;

        if let Some(expected) = &self.issuer {
            if claims.iss.as_deref() != Some(expected.as_str()) {
                tracing::debug!(issuer = ?claims.iss, "Token issuer mismatch");
                return Err(AuthError::InvalidSignature);
            }
        }

        check_times(&claims, chrono::Utc::now().timestamp())?;
        Ok(claims)
    }

    /// Consult the revocation store. Store failures and timeouts do not
    /// reject the request.
    async fn is_revoked(&self, token: &str) -> bool {
        match tokio::time::timeout(self.revocation_timeout, self.revocation.is_revoked(token)).await
        {
            Ok(Ok(revoked)) => revoked,
            Ok(Err(e)) => {
                tracing::warn!(
                    request_id = %get_request_id(),
                    error = %e,
                    "Revocation lookup failed, accepting token"
                );
                false
            }
            Err(_) => {
                tracing::warn!(
                    request_id = %get_request_id(),
                    timeout_ms = self.revocation_timeout.as_millis() as u64,
                    "Revocation lookup timed out, accepting token"
                );
                false
            }
        }
    }

    /// Run the full check sequence against the request headers.
    pub async fn authenticate(&self, headers: &HeaderMap) -> Result<Identity, AuthError> {
        let token = extract_bearer(headers)?;
        let claims = self.verify_token(token)?;

        if self.is_revoked(token).await {
            return Err(AuthError::Revoked);
        }

        Ok(Identity {
            tenant_id: claims.tenant_id,
            user_id: claims.user_id,
            role: claims.role,
            token: token.to_string(),
        })
    }
}

/// Valid iff `now < exp` and `now >= nbf`.
fn check_times(claims: &Claims, now: i64) -> Result<(), AuthError> {
    if now >= claims.exp {
        return Err(AuthError::Expired);
    }
    if let Some(nbf) = claims.nbf {
        if now < nbf {
            return Err(AuthError::NotYetValid);
        }
    }
    Ok(())
}
