//! Two-factor authentication: e-mail OTP setup, backup codes, and the
//! login-time challenge.
//!
//! The setup code lives in its own columns, separate from the shared
//! pending-code slot, so a pending registration or reset code can never be
//! replayed to enable 2FA. The login challenge has two alternate paths:
//! a single-use backup code, or a fresh e-mail OTP in the shared slot.

use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use chrono::{Duration, Utc};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;

use crate::api::email::templates;
use crate::api::handlers::{extract_client_ip, normalize_email};

use super::backup_codes::{BackupCodeBatch, find_matching_hash};
use super::otp::{self, OTP_TTL_MINUTES, OtpOutcome, OtpPurpose, PendingCode};
use super::password::{hash_secret, verify_secret};
use super::principal::require_auth;
use super::rate_limit::{RateLimitAction, RateLimitDecision};
use super::role::Role;
use super::state::AuthState;
use super::storage;
use super::types::{
    AccountView, BackupCodesData, SessionData, TwoFactorCodeRequest, TwoFactorEmailRequest,
    TwoFactorSetupRequest, fail, ok_data, ok_message, server_error,
};

/// Begin 2FA setup for the authenticated account: e-mail a 6-digit setup
/// code valid for ten minutes.
#[utoipa::path(
    post,
    path = "/v1/auth/enable-2fa",
    responses(
        (status = 200, description = "Setup code e-mailed"),
        (status = 400, description = "Already enabled"),
        (status = 401, description = "Not authenticated"),
    ),
    tag = "auth"
)]
pub async fn enable_two_factor(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool, &auth_state).await {
        Ok(principal) => principal,
        Err(response) => return response,
    };
    if principal.account.two_factor_enabled {
        return fail(
            StatusCode::BAD_REQUEST,
            "Two-factor authentication is already enabled",
        );
    }

    let setup_code = otp::generate_code();
    let setup_hash = match hash_secret(&setup_code) {
        Ok(hash) => hash,
        Err(err) => {
            error!("Failed to hash 2FA setup code: {err}");
            return server_error("Two-factor setup failed");
        }
    };
    let expires_at = Utc::now() + Duration::minutes(OTP_TTL_MINUTES);

    let mut tx = match pool.begin().await {
        Ok(tx) => tx,
        Err(err) => {
            error!("Failed to start 2FA setup transaction: {err}");
            return server_error("Two-factor setup failed");
        }
    };
    if let Err(err) = storage::store_two_factor_setup(
        &mut tx,
        principal.role,
        principal.account.id,
        &setup_hash,
        expires_at,
    )
    .await
    {
        let _ = tx.rollback().await;
        error!("Failed to store 2FA setup code: {err}");
        return server_error("Two-factor setup failed");
    }
    let payload = templates::otp_payload(
        &principal.account.email,
        principal.account.display_name(),
        &setup_code,
    );
    if let Err(err) = storage::enqueue_email(
        &mut tx,
        &principal.account.email,
        templates::TWO_FACTOR_SETUP,
        &payload,
    )
    .await
    {
        let _ = tx.rollback().await;
        error!("Failed to enqueue 2FA setup email: {err}");
        return server_error("Two-factor setup failed");
    }
    if let Err(err) = tx.commit().await {
        error!("Failed to commit 2FA setup transaction: {err}");
        return server_error("Two-factor setup failed");
    }

    ok_message(
        StatusCode::OK,
        "Two-factor authentication setup initiated. Please check your email for the verification code.",
    )
}

/// Confirm the setup code, flip 2FA on, and hand back the only copy of the
/// ten fresh backup codes.
#[utoipa::path(
    post,
    path = "/v1/auth/verify-2fa-setup",
    request_body = TwoFactorSetupRequest,
    responses(
        (status = 200, description = "2FA enabled; backup codes returned once", body = BackupCodesData),
        (status = 400, description = "No pending setup, expired, or wrong code"),
        (status = 401, description = "Not authenticated"),
    ),
    tag = "auth"
)]
pub async fn verify_two_factor_setup(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<TwoFactorSetupRequest>>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool, &auth_state).await {
        Ok(principal) => principal,
        Err(response) => return response,
    };
    let Some(Json(request)) = payload else {
        return fail(StatusCode::BAD_REQUEST, "Missing payload");
    };

    let (Some(setup_hash), Some(setup_expires_at)) = (
        principal.account.two_factor_setup_hash.as_deref(),
        principal.account.two_factor_setup_expires_at,
    ) else {
        return fail(
            StatusCode::BAD_REQUEST,
            "Two-factor authentication setup not initiated",
        );
    };

    if setup_expires_at < Utc::now() {
        if let Err(err) =
            storage::clear_two_factor_setup(&pool, principal.role, principal.account.id).await
        {
            error!("Failed to clear expired 2FA setup: {err}");
        }
        return fail(
            StatusCode::BAD_REQUEST,
            "Setup code has expired. Please start the setup process again.",
        );
    }

    if !verify_secret(request.otp.trim(), setup_hash) {
        return fail(StatusCode::BAD_REQUEST, "Invalid verification code");
    }

    let batch = match BackupCodeBatch::generate() {
        Ok(batch) => batch,
        Err(err) => {
            error!("Failed to generate backup codes: {err}");
            return server_error("Two-factor setup failed");
        }
    };
    if let Err(err) = storage::enable_two_factor(
        &pool,
        principal.role,
        principal.account.id,
        &batch.code_hashes,
    )
    .await
    {
        error!("Failed to enable 2FA: {err}");
        return server_error("Two-factor setup failed");
    }

    ok_data(
        StatusCode::OK,
        "Two-factor authentication has been successfully enabled!",
        BackupCodesData {
            backup_codes: batch.codes,
        },
    )
}

/// Disable 2FA and wipe every related field. Idempotent: disabling an
/// account that never had 2FA still answers success.
#[utoipa::path(
    post,
    path = "/v1/auth/disable-2fa",
    responses(
        (status = 200, description = "2FA disabled (or already off)"),
        (status = 401, description = "Not authenticated"),
    ),
    tag = "auth"
)]
pub async fn disable_two_factor(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool, &auth_state).await {
        Ok(principal) => principal,
        Err(response) => return response,
    };
    if let Err(err) =
        storage::disable_two_factor(&pool, principal.role, principal.account.id).await
    {
        error!("Failed to disable 2FA: {err}");
        return server_error("Failed to disable two-factor authentication");
    }
    ok_message(StatusCode::OK, "Two-factor authentication has been disabled")
}

/// Login challenge, backup-code path. A match consumes the code.
#[utoipa::path(
    post,
    path = "/v1/auth/verify-2fa-login",
    request_body = TwoFactorCodeRequest,
    responses(
        (status = 200, description = "Session token", body = SessionData),
        (status = 400, description = "2FA not enabled or invalid code"),
        (status = 401, description = "Unknown account"),
    ),
    tag = "auth"
)]
pub async fn verify_two_factor_login(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<TwoFactorCodeRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return fail(StatusCode::BAD_REQUEST, "Missing payload");
    };
    let Some(role) = Role::from_wire(&request.role) else {
        return fail(StatusCode::BAD_REQUEST, "Invalid role specified");
    };
    let email = normalize_email(&request.email);

    let account = match storage::fetch_account(&pool, role, &email).await {
        Ok(Some(account)) => account,
        Ok(None) => return fail(StatusCode::UNAUTHORIZED, "Invalid credentials"),
        Err(err) => {
            error!("Failed to fetch account for 2FA login: {err}");
            return server_error("Two-factor verification failed");
        }
    };
    if !account.two_factor_enabled {
        return fail(
            StatusCode::BAD_REQUEST,
            "Two-factor authentication is not enabled for this account",
        );
    }

    let Some(matched_hash) = find_matching_hash(&request.otp, &account.two_factor_backup_codes)
    else {
        return fail(
            StatusCode::BAD_REQUEST,
            "Invalid two-factor authentication code",
        );
    };
    let consumed =
        match storage::consume_backup_code(&pool, role, account.id, &matched_hash).await {
            Ok(consumed) => consumed,
            Err(err) => {
                error!("Failed to consume backup code: {err}");
                return server_error("Two-factor verification failed");
            }
        };
    if !consumed {
        // Lost the race against a concurrent use of the same code.
        return fail(
            StatusCode::BAD_REQUEST,
            "Invalid two-factor authentication code",
        );
    }

    issue_two_factor_session(
        &pool,
        &auth_state,
        role,
        &account,
        "Login successful using backup code. Please generate new backup codes.",
    )
}

/// Login challenge, e-mail-OTP path: issue a fresh code into the shared slot.
#[utoipa::path(
    post,
    path = "/v1/auth/send-2fa-login-otp",
    request_body = TwoFactorEmailRequest,
    responses(
        (status = 200, description = "Login OTP queued"),
        (status = 400, description = "2FA not enabled"),
        (status = 401, description = "Unknown account"),
    ),
    tag = "auth"
)]
pub async fn send_two_factor_login_otp(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<TwoFactorEmailRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return fail(StatusCode::BAD_REQUEST, "Missing payload");
    };
    let Some(role) = Role::from_wire(&request.role) else {
        return fail(StatusCode::BAD_REQUEST, "Invalid role specified");
    };
    let email = normalize_email(&request.email);

    let client_ip = extract_client_ip(&headers);
    if auth_state
        .rate_limiter()
        .check_ip(client_ip.as_deref(), RateLimitAction::TwoFactorOtp)
        == RateLimitDecision::Limited
    {
        return fail(StatusCode::TOO_MANY_REQUESTS, "Rate limited");
    }

    let account = match storage::fetch_account(&pool, role, &email).await {
        Ok(Some(account)) => account,
        Ok(None) => return fail(StatusCode::UNAUTHORIZED, "Invalid credentials"),
        Err(err) => {
            error!("Failed to fetch account for 2FA OTP: {err}");
            return server_error("Failed to send verification code");
        }
    };
    if !account.two_factor_enabled {
        return fail(
            StatusCode::BAD_REQUEST,
            "Two-factor authentication is not enabled for this account",
        );
    }

    let (pending, code) = match PendingCode::issue(OtpPurpose::TwoFactorLogin, Utc::now()) {
        Ok(issued) => issued,
        Err(err) => {
            error!("Failed to issue 2FA login OTP: {err}");
            return server_error("Failed to send verification code");
        }
    };
    let mut tx = match pool.begin().await {
        Ok(tx) => tx,
        Err(err) => {
            error!("Failed to start 2FA OTP transaction: {err}");
            return server_error("Failed to send verification code");
        }
    };
    if let Err(err) = storage::store_pending_code(&mut tx, role, account.id, &pending).await {
        let _ = tx.rollback().await;
        error!("Failed to store 2FA login OTP: {err}");
        return server_error("Failed to send verification code");
    }
    let payload = templates::otp_payload(&email, account.display_name(), &code);
    if let Err(err) =
        storage::enqueue_email(&mut tx, &email, templates::TWO_FACTOR_LOGIN, &payload).await
    {
        let _ = tx.rollback().await;
        error!("Failed to enqueue 2FA login email: {err}");
        return server_error("Failed to send verification code");
    }
    if let Err(err) = tx.commit().await {
        error!("Failed to commit 2FA OTP transaction: {err}");
        return server_error("Failed to send verification code");
    }

    ok_message(
        StatusCode::OK,
        "Two-factor authentication code sent to your email",
    )
}

/// Login challenge, e-mail-OTP redemption (5-attempt cap; exhaustion answers
/// 429 and forces a fresh code).
#[utoipa::path(
    post,
    path = "/v1/auth/verify-2fa-login-otp",
    request_body = TwoFactorCodeRequest,
    responses(
        (status = 200, description = "Session token", body = SessionData),
        (status = 400, description = "Invalid or expired code"),
        (status = 401, description = "Unknown account"),
        (status = 429, description = "Attempts exhausted"),
    ),
    tag = "auth"
)]
pub async fn verify_two_factor_login_otp(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<TwoFactorCodeRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return fail(StatusCode::BAD_REQUEST, "Missing payload");
    };
    let Some(role) = Role::from_wire(&request.role) else {
        return fail(StatusCode::BAD_REQUEST, "Invalid role specified");
    };
    let email = normalize_email(&request.email);

    let account = match storage::fetch_account(&pool, role, &email).await {
        Ok(Some(account)) => account,
        Ok(None) => return fail(StatusCode::UNAUTHORIZED, "Invalid credentials"),
        Err(err) => {
            error!("Failed to fetch account for 2FA OTP verification: {err}");
            return server_error("Two-factor verification failed");
        }
    };
    if !account.two_factor_enabled {
        return fail(
            StatusCode::BAD_REQUEST,
            "Two-factor authentication is not enabled for this account",
        );
    }

    let Some(pending) = account
        .pending_code
        .as_ref()
        .filter(|pending| pending.purpose == OtpPurpose::TwoFactorLogin)
    else {
        return fail(
            StatusCode::BAD_REQUEST,
            "No active two-factor authentication request",
        );
    };

    match pending.verify(&request.otp, Utc::now()) {
        OtpOutcome::Expired => {
            if let Err(err) = storage::clear_pending_code(&pool, role, account.id).await {
                error!("Failed to clear expired 2FA OTP: {err}");
            }
            fail(
                StatusCode::BAD_REQUEST,
                "Verification code has expired. Please request a new one.",
            )
        }
        OtpOutcome::AttemptsExceeded => {
            if let Err(err) = storage::clear_pending_code(&pool, role, account.id).await {
                error!("Failed to clear exhausted 2FA OTP: {err}");
            }
            fail(
                StatusCode::TOO_MANY_REQUESTS,
                "Too many failed attempts. Please request a new verification code.",
            )
        }
        OtpOutcome::Invalid => {
            if let Err(err) = storage::record_failed_otp_attempt(&pool, role, account.id).await {
                error!("Failed to record 2FA OTP attempt: {err}");
            }
            fail(StatusCode::BAD_REQUEST, "Invalid verification code")
        }
        OtpOutcome::Success => {
            if let Err(err) = storage::clear_pending_code(&pool, role, account.id).await {
                error!("Failed to clear redeemed 2FA OTP: {err}");
                return server_error("Two-factor verification failed");
            }
            issue_two_factor_session(&pool, &auth_state, role, &account, "Login successful")
        }
    }
}

/// Shared tail of both challenge paths: mint the session and touch
/// `last_login_at` off the request path.
fn issue_two_factor_session(
    pool: &PgPool,
    auth_state: &AuthState,
    role: Role,
    account: &super::account::AccountRecord,
    message: &str,
) -> Response {
    let token = match auth_state.issuer().issue(account.id, role) {
        Ok(token) => token,
        Err(err) => {
            error!("Failed to issue session token: {err}");
            return server_error("Two-factor verification failed");
        }
    };

    let pool = pool.clone();
    let account_id = account.id;
    tokio::spawn(async move {
        if let Err(err) = storage::touch_last_login(&pool, role, account_id).await {
            error!("Failed to update last login: {err}");
        }
    });

    ok_data(
        StatusCode::OK,
        message,
        SessionData {
            user: AccountView::from_record(account, role),
            token: Some(token),
            requires_onboarding: None,
            requires_approval: None,
        },
    )
}
