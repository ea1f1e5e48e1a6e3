//! Stateless session tokens.
//!
//! A session is a signed HS256 JWT carrying `{sub, role}` plus the usual
//! time claims. There is no server-side session table; issuance is pure and
//! can only fail on signing-key misconfiguration, which is rejected at
//! process start rather than per request.

use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::role::Role;

const DEFAULT_SESSION_TTL_SECONDS: i64 = 7 * 24 * 60 * 60;

/// Claims embedded in every session token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Account ID (UUID string).
    pub sub: String,
    /// Wire role string; selects the table on lookup.
    pub role: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("session signing key is not configured")]
    MissingKey,
    #[error("token expired")]
    Expired,
    #[error("invalid token")]
    Invalid,
}

/// Issues and verifies session tokens with a single symmetric key.
pub struct SessionIssuer {
    key: SecretString,
    ttl_seconds: i64,
}

impl SessionIssuer {
    /// Build an issuer. An empty key is a configuration error and fails
    /// startup; nothing downstream re-checks it.
    pub fn new(key: SecretString, ttl_seconds: i64) -> Result<Self, TokenError> {
        if key.expose_secret().trim().is_empty() {
            return Err(TokenError::MissingKey);
        }
        let ttl_seconds = if ttl_seconds > 0 {
            ttl_seconds
        } else {
            DEFAULT_SESSION_TTL_SECONDS
        };
        Ok(Self { key, ttl_seconds })
    }

    #[must_use]
    pub fn ttl_seconds(&self) -> i64 {
        self.ttl_seconds
    }

    /// Mint a token for an authenticated account.
    pub fn issue(&self, account_id: Uuid, role: Role) -> Result<String, TokenError> {
        let now = Utc::now().timestamp();
        let claims = SessionClaims {
            sub: account_id.to_string(),
            role: role.as_str().to_string(),
            iat: now,
            exp: now + self.ttl_seconds,
            jti: Uuid::new_v4().to_string(),
        };
        let key = EncodingKey::from_secret(self.key.expose_secret().as_bytes());
        encode(&Header::new(Algorithm::HS256), &claims, &key).map_err(|_| TokenError::Invalid)
    }

    /// Verify signature and expiry, returning the decoded claims.
    pub fn verify(&self, token: &str) -> Result<SessionClaims, TokenError> {
        let key = DecodingKey::from_secret(self.key.expose_secret().as_bytes());
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        decode::<SessionClaims>(token, &key, &validation)
            .map(|data| data.claims)
            .map_err(|err| match err.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid,
            })
    }
}
