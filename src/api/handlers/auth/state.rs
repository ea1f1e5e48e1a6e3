//! Auth configuration and shared request state.

use secrecy::SecretString;
use std::sync::Arc;

use super::rate_limit::RateLimiter;
use super::token::{SessionIssuer, TokenError};

const DEFAULT_SESSION_TTL_SECONDS: i64 = 7 * 24 * 60 * 60;

#[derive(Clone, Debug)]
pub struct AuthConfig {
    frontend_base_url: String,
    session_ttl_seconds: i64,
}

impl AuthConfig {
    #[must_use]
    pub fn new(frontend_base_url: String) -> Self {
        Self {
            frontend_base_url,
            session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
        }
    }

    #[must_use]
    pub fn with_session_ttl_seconds(mut self, seconds: i64) -> Self {
        self.session_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn frontend_base_url(&self) -> &str {
        &self.frontend_base_url
    }

    #[must_use]
    pub fn session_ttl_seconds(&self) -> i64 {
        self.session_ttl_seconds
    }
}

/// Shared auth state handed to handlers via an `Extension` layer.
pub struct AuthState {
    config: AuthConfig,
    issuer: SessionIssuer,
    rate_limiter: Arc<dyn RateLimiter>,
}

impl AuthState {
    /// Build the state, constructing the session issuer up front so a
    /// missing signing key fails process start instead of a request.
    ///
    /// # Errors
    /// Returns `TokenError::MissingKey` when the signing key is empty.
    pub fn new(
        config: AuthConfig,
        signing_key: SecretString,
        rate_limiter: Arc<dyn RateLimiter>,
    ) -> Result<Self, TokenError> {
        let issuer = SessionIssuer::new(signing_key, config.session_ttl_seconds())?;
        Ok(Self {
            config,
            issuer,
            rate_limiter,
        })
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn issuer(&self) -> &SessionIssuer {
        &self.issuer
    }

    pub(crate) fn rate_limiter(&self) -> &dyn RateLimiter {
        self.rate_limiter.as_ref()
    }
}
