//! Password login.

use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use rand::{RngCore, rngs::OsRng};
use sqlx::PgPool;
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::error;

use crate::api::handlers::{extract_client_ip, normalize_email};

use super::lifecycle::{LoginGate, evaluate_login};
use super::password::verify_secret;
use super::rate_limit::{RateLimitAction, RateLimitDecision};
use super::role::Role;
use super::state::AuthState;
use super::storage;
use super::types::{
    AccountView, ApiFailure, LoginRequest, SessionData, TwoFactorChallengeData, fail, fail_body,
    ok_data, server_error,
};

/// Log an account in. Unknown e-mail and wrong password share one message so
/// the endpoint cannot be used to probe which accounts exist.
#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Session token, or a two-factor challenge", body = SessionData),
        (status = 401, description = "Invalid credentials"),
        (status = 403, description = "Unverified, onboarding, or approval gate"),
    ),
    tag = "auth"
)]
pub async fn login(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<LoginRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return fail(StatusCode::BAD_REQUEST, "Missing payload");
    };
    let Some(role) = Role::from_wire(&request.role) else {
        return fail(StatusCode::BAD_REQUEST, "Invalid role specified");
    };
    if request.email.trim().is_empty() || request.password.is_empty() {
        return fail(StatusCode::BAD_REQUEST, "Please provide email and password");
    }
    let email = normalize_email(&request.email);

    let client_ip = extract_client_ip(&headers);
    if auth_state
        .rate_limiter()
        .check_ip(client_ip.as_deref(), RateLimitAction::Login)
        == RateLimitDecision::Limited
    {
        return fail(StatusCode::TOO_MANY_REQUESTS, "Rate limited");
    }

    let account = match storage::fetch_account(&pool, role, &email).await {
        Ok(Some(account)) => account,
        // Absent account folds into the uniform credential failure.
        Ok(None) => return fail(StatusCode::UNAUTHORIZED, "Invalid credentials"),
        Err(err) => {
            error!("Failed to fetch account for login: {err}");
            return server_error("Login failed");
        }
    };
    if !verify_secret(&request.password, &account.password_hash) {
        return fail(StatusCode::UNAUTHORIZED, "Invalid credentials");
    }

    match evaluate_login(&account) {
        LoginGate::Unverified => fail(
            StatusCode::FORBIDDEN,
            "Please verify your email address to login. Check your email for the OTP.",
        ),
        LoginGate::OnboardingRequired => fail_body(
            StatusCode::FORBIDDEN,
            ApiFailure {
                success: false,
                message: "Please complete your onboarding process to continue.".to_string(),
                requires_onboarding: Some(true),
                approval_status: None,
                rejection_reason: None,
            },
        ),
        LoginGate::ApprovalPending {
            approval_status,
            rejection_reason,
        } => fail_body(
            StatusCode::FORBIDDEN,
            ApiFailure {
                success: false,
                message:
                    "Your account is pending admin approval. You will be notified once approved."
                        .to_string(),
                requires_onboarding: None,
                approval_status: Some(approval_status),
                rejection_reason,
            },
        ),
        LoginGate::TwoFactorRequired => ok_data(
            StatusCode::OK,
            "Two-factor authentication required. Please verify your identity.",
            TwoFactorChallengeData {
                requires_two_factor: true,
                temp_token: generate_temp_token(),
            },
        ),
        LoginGate::Allowed => {
            let token = match auth_state.issuer().issue(account.id, role) {
                Ok(token) => token,
                Err(err) => {
                    error!("Failed to issue session token: {err}");
                    return server_error("Login failed");
                }
            };

            // Best-effort, off the request path; a miss only skews the
            // last-seen timestamp.
            let pool = pool.0.clone();
            let account_id = account.id;
            tokio::spawn(async move {
                if let Err(err) = storage::touch_last_login(&pool, role, account_id).await {
                    error!("Failed to update last login: {err}");
                }
            });

            ok_data(
                StatusCode::OK,
                "Login successful",
                SessionData {
                    user: AccountView::from_record(&account, role),
                    token: Some(token),
                    requires_onboarding: None,
                    requires_approval: None,
                },
            )
        }
    }
}

/// Transient correlation token for the two-factor challenge. Returned to the
/// client but not persisted; the 2FA verify endpoints re-authenticate by
/// e-mail, role, and code.
fn generate_temp_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    bytes.iter().fold(String::with_capacity(64), |mut out, byte| {
        let _ = write!(out, "{byte:02x}");
        out
    })
}

#[cfg(test)]
mod tests {
    use super::{generate_temp_token, login};
    use crate::api::handlers::auth::rate_limit::{NoopRateLimiter, RateLimiter};
    use crate::api::handlers::auth::state::{AuthConfig, AuthState};
    use crate::api::handlers::auth::types::LoginRequest;
    use anyhow::Result;
    use axum::Json;
    use axum::extract::Extension;
    use axum::http::{HeaderMap, StatusCode};
    use axum::response::IntoResponse;
    use secrecy::SecretString;
    use sqlx::postgres::PgPoolOptions;
    use std::sync::Arc;

    fn auth_state() -> Arc<AuthState> {
        let config = AuthConfig::new("https://talentgate.dev".to_string());
        let limiter: Arc<dyn RateLimiter> = Arc::new(NoopRateLimiter);
        Arc::new(
            AuthState::new(config, SecretString::from("test-signing-key"), limiter)
                .expect("auth state"),
        )
    }

    #[test]
    fn temp_tokens_are_hex_and_unique() {
        let first = generate_temp_token();
        let second = generate_temp_token();
        assert_eq!(first.len(), 64);
        assert!(first.chars().all(|ch| ch.is_ascii_hexdigit()));
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn login_missing_payload() -> Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let response = login(HeaderMap::new(), Extension(pool), Extension(auth_state()), None)
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn login_rejects_unknown_role() -> Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let response = login(
            HeaderMap::new(),
            Extension(pool),
            Extension(auth_state()),
            Some(Json(LoginRequest {
                email: "a@x.com".to_string(),
                password: "pw123456".to_string(),
                role: "superuser".to_string(),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }
}
