//! Registration and registration-OTP verification.

use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;

use crate::api::email::templates;
use crate::api::handlers::{extract_client_ip, normalize_email, valid_email};

use super::account::NewAccount;
use super::lifecycle::{VerifiedNext, after_verification};
use super::otp::{OtpOutcome, OtpPurpose, PendingCode};
use super::password::{hash_secret, valid_password};
use super::rate_limit::{RateLimitAction, RateLimitDecision};
use super::role::Role;
use super::state::AuthState;
use super::storage;
use super::types::{
    AccountView, RegisterRequest, RegisteredData, SessionData, VerifyOtpRequest, fail, ok_data,
    server_error,
};

/// Register an account. An unverified duplicate under another role is
/// replaced; one under the same role gets its details overwritten and a
/// fresh code (the resend path). Admin accounts skip the OTP step entirely.
#[utoipa::path(
    post,
    path = "/v1/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created, OTP sent", body = RegisteredData),
        (status = 200, description = "Unverified account refreshed, OTP resent", body = RegisteredData),
        (status = 400, description = "Validation failure or account already exists"),
    ),
    tag = "auth"
)]
pub async fn register(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<RegisterRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return fail(StatusCode::BAD_REQUEST, "Missing payload");
    };

    let Some(role) = Role::from_wire(&request.role) else {
        return fail(StatusCode::BAD_REQUEST, "Invalid role specified");
    };
    let email = normalize_email(&request.email);
    if !valid_email(&email) {
        return fail(StatusCode::BAD_REQUEST, "Please provide a valid email");
    }
    if !valid_password(&request.password) {
        return fail(
            StatusCode::BAD_REQUEST,
            "Password must be at least 6 characters long",
        );
    }

    let client_ip = extract_client_ip(&headers);
    if auth_state
        .rate_limiter()
        .check_ip(client_ip.as_deref(), RateLimitAction::Register)
        == RateLimitDecision::Limited
    {
        return fail(StatusCode::TOO_MANY_REQUESTS, "Rate limited");
    }

    let existing = match storage::find_email_across_roles(&pool, &email).await {
        Ok(existing) => existing,
        Err(err) => {
            error!("Failed cross-role lookup during registration: {err}");
            return server_error("Registration failed");
        }
    };

    if let Some(existing) = existing {
        if existing.is_verified {
            return fail(StatusCode::BAD_REQUEST, "User already exists");
        }
        if existing.role == role {
            return resend_registration_otp(&pool, role, existing.id, &request, &email).await;
        }
        // Unverified under a different role: drop the stale record and
        // register from scratch.
        if let Err(err) = storage::delete_account(&pool.0, existing.role, existing.id).await {
            error!("Failed to delete stale unverified account: {err}");
            return server_error("Registration failed");
        }
    }

    let password_hash = match hash_secret(&request.password) {
        Ok(hash) => hash,
        Err(err) => {
            error!("Failed to hash password: {err}");
            return server_error("Registration failed");
        }
    };

    if role == Role::Admin {
        return create_admin(&pool, &auth_state, &request, &email, &password_hash).await;
    }

    let (pending, code) = match PendingCode::issue(OtpPurpose::Registration, Utc::now()) {
        Ok(issued) => issued,
        Err(err) => {
            error!("Failed to issue registration OTP: {err}");
            return server_error("Registration failed");
        }
    };

    let mut tx = match pool.begin().await {
        Ok(tx) => tx,
        Err(err) => {
            error!("Failed to start registration transaction: {err}");
            return server_error("Registration failed");
        }
    };

    let account = NewAccount {
        email: &email,
        full_name: &request.full_name,
        password_hash: &password_hash,
        is_verified: false,
        pending_code: Some(&pending),
    };
    let user_id = match storage::insert_account(&mut tx, role, &account).await {
        Ok(user_id) => user_id,
        Err(err) => {
            let _ = tx.rollback().await;
            if err
                .downcast_ref::<sqlx::Error>()
                .is_some_and(storage::is_unique_violation)
            {
                return fail(StatusCode::BAD_REQUEST, "User already exists");
            }
            error!("Failed to insert account: {err}");
            return server_error("Registration failed");
        }
    };

    let payload = templates::otp_payload(&email, &request.full_name, &code);
    if let Err(err) =
        storage::enqueue_email(&mut tx, &email, templates::OTP_VERIFICATION, &payload).await
    {
        let _ = tx.rollback().await;
        error!("Failed to enqueue registration OTP email: {err}");
        return server_error("Registration failed");
    }
    if let Err(err) = tx.commit().await {
        error!("Failed to commit registration transaction: {err}");
        return server_error("Registration failed");
    }

    ok_data(
        StatusCode::CREATED,
        "Registration successful. OTP sent to email.",
        RegisteredData {
            user_id: user_id.to_string(),
            email,
            role: role.as_str().to_string(),
            token: None,
        },
    )
}

/// Same-role re-registration while unverified: overwrite the basics and
/// issue a fresh code with the attempt counter back at zero.
async fn resend_registration_otp(
    pool: &PgPool,
    role: Role,
    id: uuid::Uuid,
    request: &RegisterRequest,
    email: &str,
) -> Response {
    let password_hash = match hash_secret(&request.password) {
        Ok(hash) => hash,
        Err(err) => {
            error!("Failed to hash password: {err}");
            return server_error("Registration failed");
        }
    };
    let (pending, code) = match PendingCode::issue(OtpPurpose::Registration, Utc::now()) {
        Ok(issued) => issued,
        Err(err) => {
            error!("Failed to issue registration OTP: {err}");
            return server_error("Registration failed");
        }
    };

    let mut tx = match pool.begin().await {
        Ok(tx) => tx,
        Err(err) => {
            error!("Failed to start resend transaction: {err}");
            return server_error("Registration failed");
        }
    };
    let refresh = storage::refresh_unverified_account(
        &mut tx,
        role,
        id,
        &request.full_name,
        &password_hash,
        &pending,
    )
    .await;
    if let Err(err) = refresh {
        let _ = tx.rollback().await;
        error!("Failed to refresh unverified account: {err}");
        return server_error("Registration failed");
    }
    let payload = templates::otp_payload(email, &request.full_name, &code);
    if let Err(err) =
        storage::enqueue_email(&mut tx, email, templates::OTP_VERIFICATION, &payload).await
    {
        let _ = tx.rollback().await;
        error!("Failed to enqueue resend OTP email: {err}");
        return server_error("Registration failed");
    }
    if let Err(err) = tx.commit().await {
        error!("Failed to commit resend transaction: {err}");
        return server_error("Registration failed");
    }

    ok_data(
        StatusCode::OK,
        "User already registered but not verified. OTP resent to email.",
        RegisteredData {
            user_id: id.to_string(),
            email: email.to_string(),
            role: role.as_str().to_string(),
            token: None,
        },
    )
}

/// Admin accounts are auto-verified and receive a session token in the 201
/// response, with no OTP round-trip.
async fn create_admin(
    pool: &PgPool,
    auth_state: &AuthState,
    request: &RegisterRequest,
    email: &str,
    password_hash: &str,
) -> Response {
    let mut tx = match pool.begin().await {
        Ok(tx) => tx,
        Err(err) => {
            error!("Failed to start admin registration transaction: {err}");
            return server_error("Registration failed");
        }
    };
    let account = NewAccount {
        email,
        full_name: &request.full_name,
        password_hash,
        is_verified: true,
        pending_code: None,
    };
    let user_id = match storage::insert_account(&mut tx, Role::Admin, &account).await {
        Ok(user_id) => user_id,
        Err(err) => {
            let _ = tx.rollback().await;
            if err
                .downcast_ref::<sqlx::Error>()
                .is_some_and(storage::is_unique_violation)
            {
                return fail(StatusCode::BAD_REQUEST, "User already exists");
            }
            error!("Failed to insert admin account: {err}");
            return server_error("Registration failed");
        }
    };
    if let Err(err) = tx.commit().await {
        error!("Failed to commit admin registration: {err}");
        return server_error("Registration failed");
    }

    let token = match auth_state.issuer().issue(user_id, Role::Admin) {
        Ok(token) => token,
        Err(err) => {
            error!("Failed to issue admin session token: {err}");
            return server_error("Registration failed");
        }
    };

    ok_data(
        StatusCode::CREATED,
        "Admin registration successful.",
        RegisteredData {
            user_id: user_id.to_string(),
            email: email.to_string(),
            role: Role::Admin.as_str().to_string(),
            token: Some(token),
        },
    )
}

/// Verify the registration OTP and activate the account. Recruiters are
/// additionally routed through the onboarding/approval gates.
#[utoipa::path(
    post,
    path = "/v1/auth/verify-otp",
    request_body = VerifyOtpRequest,
    responses(
        (status = 200, description = "Verified; token unless approval is outstanding", body = SessionData),
        (status = 400, description = "Invalid, expired, or exhausted code"),
        (status = 404, description = "Unknown account"),
    ),
    tag = "auth"
)]
pub async fn verify_otp(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<VerifyOtpRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return fail(StatusCode::BAD_REQUEST, "Please provide email, OTP and role");
    };
    if request.email.trim().is_empty() || request.otp.trim().is_empty() {
        return fail(StatusCode::BAD_REQUEST, "Please provide email, OTP and role");
    }
    let Some(role) = Role::from_wire(&request.role) else {
        return fail(StatusCode::BAD_REQUEST, "Invalid role");
    };
    let email = normalize_email(&request.email);

    let client_ip = extract_client_ip(&headers);
    if auth_state
        .rate_limiter()
        .check_ip(client_ip.as_deref(), RateLimitAction::VerifyOtp)
        == RateLimitDecision::Limited
    {
        return fail(StatusCode::TOO_MANY_REQUESTS, "Rate limited");
    }

    let account = match storage::fetch_account(&pool, role, &email).await {
        Ok(Some(account)) => account,
        Ok(None) => return fail(StatusCode::NOT_FOUND, "User not found"),
        Err(err) => {
            error!("Failed to fetch account for OTP verification: {err}");
            return server_error("Verification failed");
        }
    };
    if account.is_verified {
        return fail(StatusCode::BAD_REQUEST, "User already verified");
    }

    let Some(pending) = account
        .pending_code
        .as_ref()
        .filter(|pending| pending.purpose == OtpPurpose::Registration)
    else {
        return fail(
            StatusCode::BAD_REQUEST,
            "OTP expired or invalid. Please request a new one.",
        );
    };

    match pending.verify(&request.otp, Utc::now()) {
        OtpOutcome::Expired => {
            if let Err(err) = storage::clear_pending_code(&pool, role, account.id).await {
                error!("Failed to clear expired OTP: {err}");
            }
            fail(StatusCode::BAD_REQUEST, "OTP expired. Please request a new one.")
        }
        OtpOutcome::AttemptsExceeded => {
            if let Err(err) = storage::clear_pending_code(&pool, role, account.id).await {
                error!("Failed to clear exhausted OTP: {err}");
            }
            fail(
                StatusCode::BAD_REQUEST,
                "Too many failed attempts. Please request a new OTP.",
            )
        }
        OtpOutcome::Invalid => {
            if let Err(err) = storage::record_failed_otp_attempt(&pool, role, account.id).await {
                error!("Failed to record OTP attempt: {err}");
            }
            fail(StatusCode::BAD_REQUEST, "Invalid OTP")
        }
        OtpOutcome::Success => finish_verification(&pool, &auth_state, role, &account).await,
    }
}

async fn finish_verification(
    pool: &PgPool,
    auth_state: &AuthState,
    role: Role,
    account: &super::account::AccountRecord,
) -> Response {
    let mut tx = match pool.begin().await {
        Ok(tx) => tx,
        Err(err) => {
            error!("Failed to start verification transaction: {err}");
            return server_error("Verification failed");
        }
    };
    if let Err(err) = storage::mark_verified(&mut tx, role, account.id).await {
        let _ = tx.rollback().await;
        error!("Failed to mark account verified: {err}");
        return server_error("Verification failed");
    }
    let payload = templates::welcome_payload(&account.email, account.display_name());
    if let Err(err) =
        storage::enqueue_email(&mut tx, &account.email, templates::WELCOME, &payload).await
    {
        let _ = tx.rollback().await;
        error!("Failed to enqueue welcome email: {err}");
        return server_error("Verification failed");
    }
    if let Err(err) = tx.commit().await {
        error!("Failed to commit verification transaction: {err}");
        return server_error("Verification failed");
    }

    let mut view = AccountView::from_record(account, role);
    view.is_verified = true;

    match after_verification(account) {
        VerifiedNext::ApprovalPending => ok_data(
            StatusCode::OK,
            "Email verified. Your account is pending admin approval.",
            SessionData {
                user: view,
                token: None,
                requires_onboarding: None,
                requires_approval: Some(true),
            },
        ),
        next => {
            let token = match auth_state.issuer().issue(account.id, role) {
                Ok(token) => token,
                Err(err) => {
                    error!("Failed to issue session token: {err}");
                    return server_error("Verification failed");
                }
            };
            ok_data(
                StatusCode::OK,
                "Email verified successfully",
                SessionData {
                    user: view,
                    token: Some(token),
                    requires_onboarding: Some(next == VerifiedNext::SessionWithOnboarding),
                    requires_approval: None,
                },
            )
        }
    }
}
