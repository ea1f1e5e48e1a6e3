//! Password recovery (forgot/reset) and authenticated password change.

use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use chrono::Utc;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;

use crate::api::email::templates;
use crate::api::handlers::{extract_client_ip, normalize_email};

use super::otp::{OtpOutcome, OtpPurpose, PendingCode};
use super::password::{hash_secret, valid_password, verify_secret};
use super::principal::require_auth;
use super::rate_limit::{RateLimitAction, RateLimitDecision};
use super::role::Role;
use super::state::AuthState;
use super::storage;
use super::types::{
    ChangePasswordRequest, ForgotPasswordRequest, ResetPasswordRequest, fail, ok_message,
    server_error,
};

/// Issue a password-reset OTP. Answers 404 for an unknown (email, role) —
/// unlike login, this endpoint does reveal account existence.
#[utoipa::path(
    post,
    path = "/v1/auth/forgot-password",
    request_body = ForgotPasswordRequest,
    responses(
        (status = 200, description = "Reset OTP queued"),
        (status = 400, description = "Validation failure"),
        (status = 404, description = "No account for that email and role"),
    ),
    tag = "auth"
)]
pub async fn forgot_password(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<ForgotPasswordRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return fail(StatusCode::BAD_REQUEST, "Email and role are required");
    };
    if request.email.trim().is_empty() || request.role.trim().is_empty() {
        return fail(StatusCode::BAD_REQUEST, "Email and role are required");
    }
    let Some(role) = Role::from_wire(&request.role) else {
        return fail(StatusCode::BAD_REQUEST, "Invalid role");
    };
    let email = normalize_email(&request.email);

    let client_ip = extract_client_ip(&headers);
    if auth_state
        .rate_limiter()
        .check_ip(client_ip.as_deref(), RateLimitAction::ForgotPassword)
        == RateLimitDecision::Limited
    {
        return fail(StatusCode::TOO_MANY_REQUESTS, "Rate limited");
    }

    let account = match storage::fetch_account(&pool, role, &email).await {
        Ok(Some(account)) => account,
        Ok(None) => {
            return fail(
                StatusCode::NOT_FOUND,
                "No account found with this email address",
            );
        }
        Err(err) => {
            error!("Failed to fetch account for password reset: {err}");
            return server_error("Password reset failed");
        }
    };

    let (pending, code) = match PendingCode::issue(OtpPurpose::PasswordReset, Utc::now()) {
        Ok(issued) => issued,
        Err(err) => {
            error!("Failed to issue password reset OTP: {err}");
            return server_error("Password reset failed");
        }
    };

    let mut tx = match pool.begin().await {
        Ok(tx) => tx,
        Err(err) => {
            error!("Failed to start password reset transaction: {err}");
            return server_error("Password reset failed");
        }
    };
    if let Err(err) = storage::store_pending_code(&mut tx, role, account.id, &pending).await {
        let _ = tx.rollback().await;
        error!("Failed to store password reset OTP: {err}");
        return server_error("Password reset failed");
    }
    let payload = templates::otp_payload(&email, account.display_name(), &code);
    if let Err(err) =
        storage::enqueue_email(&mut tx, &email, templates::PASSWORD_RESET, &payload).await
    {
        let _ = tx.rollback().await;
        error!("Failed to enqueue password reset email: {err}");
        return server_error("Password reset failed");
    }
    if let Err(err) = tx.commit().await {
        error!("Failed to commit password reset transaction: {err}");
        return server_error("Password reset failed");
    }

    ok_message(
        StatusCode::OK,
        "Password reset OTP sent to your email address.",
    )
}

/// Redeem a reset OTP (3-attempt cap) and replace the password hash.
#[utoipa::path(
    post,
    path = "/v1/auth/reset-password",
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password replaced"),
        (status = 400, description = "Invalid, expired, or exhausted code"),
    ),
    tag = "auth"
)]
pub async fn reset_password(
    pool: Extension<PgPool>,
    payload: Option<Json<ResetPasswordRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return fail(StatusCode::BAD_REQUEST, "All fields are required");
    };
    if request.email.trim().is_empty()
        || request.otp.trim().is_empty()
        || request.new_password.is_empty()
    {
        return fail(StatusCode::BAD_REQUEST, "All fields are required");
    }
    if !valid_password(&request.new_password) {
        return fail(
            StatusCode::BAD_REQUEST,
            "Password must be at least 6 characters long",
        );
    }
    let Some(role) = Role::from_wire(&request.role) else {
        return fail(StatusCode::BAD_REQUEST, "Invalid role");
    };
    let email = normalize_email(&request.email);

    let account = match storage::fetch_account(&pool, role, &email).await {
        Ok(Some(account)) => account,
        Ok(None) => return fail(StatusCode::BAD_REQUEST, "Invalid request or user not found"),
        Err(err) => {
            error!("Failed to fetch account for reset: {err}");
            return server_error("Password reset failed");
        }
    };

    let Some(pending) = account
        .pending_code
        .as_ref()
        .filter(|pending| pending.purpose == OtpPurpose::PasswordReset)
    else {
        return fail(
            StatusCode::BAD_REQUEST,
            "OTP expired or invalid. Please request a new one.",
        );
    };

    match pending.verify(&request.otp, Utc::now()) {
        OtpOutcome::Expired => {
            if let Err(err) = storage::clear_pending_code(&pool, role, account.id).await {
                error!("Failed to clear expired reset OTP: {err}");
            }
            fail(
                StatusCode::BAD_REQUEST,
                "OTP expired or invalid. Please request a new one.",
            )
        }
        OtpOutcome::AttemptsExceeded => {
            if let Err(err) = storage::clear_pending_code(&pool, role, account.id).await {
                error!("Failed to clear exhausted reset OTP: {err}");
            }
            fail(
                StatusCode::BAD_REQUEST,
                "Too many failed attempts. Please request a new OTP.",
            )
        }
        OtpOutcome::Invalid => {
            if let Err(err) = storage::record_failed_otp_attempt(&pool, role, account.id).await {
                error!("Failed to record reset OTP attempt: {err}");
            }
            fail(StatusCode::BAD_REQUEST, "Invalid OTP")
        }
        OtpOutcome::Success => {
            let password_hash = match hash_secret(&request.new_password) {
                Ok(hash) => hash,
                Err(err) => {
                    error!("Failed to hash new password: {err}");
                    return server_error("Password reset failed");
                }
            };
            if let Err(err) =
                storage::reset_password(&pool, role, account.id, &password_hash).await
            {
                error!("Failed to store new password: {err}");
                return server_error("Password reset failed");
            }
            ok_message(
                StatusCode::OK,
                "Password reset successful. You can now login.",
            )
        }
    }
}

/// Change the password of the authenticated account.
#[utoipa::path(
    put,
    path = "/v1/auth/change-password",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password updated"),
        (status = 401, description = "Not authenticated or wrong current password"),
    ),
    tag = "auth"
)]
pub async fn change_password(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<ChangePasswordRequest>>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool, &auth_state).await {
        Ok(principal) => principal,
        Err(response) => return response,
    };
    let Some(Json(request)) = payload else {
        return fail(
            StatusCode::BAD_REQUEST,
            "Old password and new password are required",
        );
    };
    if request.old_password.is_empty() || request.new_password.is_empty() {
        return fail(
            StatusCode::BAD_REQUEST,
            "Old password and new password are required",
        );
    }
    if !valid_password(&request.new_password) {
        return fail(
            StatusCode::BAD_REQUEST,
            "Password must be at least 6 characters long",
        );
    }

    if !verify_secret(&request.old_password, &principal.account.password_hash) {
        return fail(StatusCode::UNAUTHORIZED, "Current password is incorrect");
    }

    let password_hash = match hash_secret(&request.new_password) {
        Ok(hash) => hash,
        Err(err) => {
            error!("Failed to hash new password: {err}");
            return server_error("Password change failed");
        }
    };
    if let Err(err) = storage::update_password(
        &pool,
        principal.role,
        principal.account.id,
        &password_hash,
    )
    .await
    {
        error!("Failed to update password: {err}");
        return server_error("Password change failed");
    }

    ok_message(StatusCode::OK, "Password updated successfully")
}
