//! Bearer-token authentication for protected endpoints.
//!
//! Tokens are stateless, so every protected request re-resolves `{sub, role}`
//! against the role's table; a deleted account stops authenticating the
//! moment its row is gone.

use axum::http::{HeaderMap, StatusCode, header::AUTHORIZATION};
use axum::response::Response;
use sqlx::PgPool;
use tracing::error;
use uuid::Uuid;

use super::account::AccountRecord;
use super::role::Role;
use super::state::AuthState;
use super::storage::fetch_account_by_id;
use super::token::TokenError;
use super::types::{fail, server_error};

/// Authenticated account context for downstream handlers.
pub struct Principal {
    pub account: AccountRecord,
    pub role: Role,
}

pub(super) fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    // Some clients serialize a missing token as the literal string.
    if token.is_empty() || token == "null" || token == "undefined" {
        None
    } else {
        Some(token.to_string())
    }
}

/// Resolve the bearer token into a principal, or a ready 401 response.
pub(super) async fn require_auth(
    headers: &HeaderMap,
    pool: &PgPool,
    auth_state: &AuthState,
) -> Result<Principal, Response> {
    let Some(token) = extract_bearer_token(headers) else {
        return Err(fail(StatusCode::UNAUTHORIZED, "Not authorized, no token"));
    };

    let claims = match auth_state.issuer().verify(&token) {
        Ok(claims) => claims,
        Err(TokenError::Expired) => {
            return Err(fail(StatusCode::UNAUTHORIZED, "Token expired"));
        }
        Err(_) => {
            return Err(fail(StatusCode::UNAUTHORIZED, "Invalid token"));
        }
    };

    let Some(role) = Role::from_token_claim(&claims.role) else {
        return Err(fail(StatusCode::UNAUTHORIZED, "Invalid user role"));
    };
    let Ok(account_id) = Uuid::parse_str(&claims.sub) else {
        return Err(fail(StatusCode::UNAUTHORIZED, "Invalid token"));
    };

    match fetch_account_by_id(pool, role, account_id).await {
        Ok(Some(account)) => Ok(Principal { account, role }),
        Ok(None) => Err(fail(StatusCode::UNAUTHORIZED, "User not found")),
        Err(err) => {
            error!("Failed to resolve principal: {err}");
            Err(server_error("Authentication failed"))
        }
    }
}
