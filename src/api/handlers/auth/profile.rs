//! Authenticated account endpoints: current-account lookup and deletion.

use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::api::email::templates;

use super::lifecycle::classify;
use super::password::verify_secret;
use super::principal::require_auth;
use super::state::AuthState;
use super::storage;
use super::types::{AccountView, DeleteAccountRequest, fail, ok_data, ok_message, server_error};

/// Return the authenticated account.
#[utoipa::path(
    get,
    path = "/v1/auth/me",
    responses(
        (status = 200, description = "Current account", body = AccountView),
        (status = 401, description = "Not authenticated"),
    ),
    tag = "auth"
)]
pub async fn me(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    match require_auth(&headers, &pool, &auth_state).await {
        Ok(principal) => {
            debug!(
                account_id = %principal.account.id,
                state = ?classify(&principal.account),
                "current account lookup"
            );
            ok_data(
                StatusCode::OK,
                "OK",
                AccountView::from_record(&principal.account, principal.role),
            )
        }
        Err(response) => response,
    }
}

/// Delete the authenticated account after re-checking the password. Cleanup
/// of records the account owns (jobs, applications, enrollments) belongs to
/// the owning services; this removes the credential row itself.
#[utoipa::path(
    post,
    path = "/v1/auth/delete-account",
    request_body = DeleteAccountRequest,
    responses(
        (status = 200, description = "Account deleted"),
        (status = 401, description = "Not authenticated or wrong password"),
    ),
    tag = "auth"
)]
pub async fn delete_account(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<DeleteAccountRequest>>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool, &auth_state).await {
        Ok(principal) => principal,
        Err(response) => return response,
    };
    let Some(Json(request)) = payload else {
        return fail(StatusCode::BAD_REQUEST, "Password is required");
    };
    if !verify_secret(&request.password, &principal.account.password_hash) {
        return fail(StatusCode::UNAUTHORIZED, "Incorrect password");
    }

    let mut tx = match pool.begin().await {
        Ok(tx) => tx,
        Err(err) => {
            error!("Failed to start account deletion transaction: {err}");
            return server_error("Account deletion failed");
        }
    };
    let payload = templates::account_deletion_payload(
        &principal.account.email,
        principal.account.display_name(),
    );
    if let Err(err) = storage::enqueue_email(
        &mut tx,
        &principal.account.email,
        templates::ACCOUNT_DELETION,
        &payload,
    )
    .await
    {
        let _ = tx.rollback().await;
        error!("Failed to enqueue account deletion email: {err}");
        return server_error("Account deletion failed");
    }
    if let Err(err) =
        storage::delete_account(&mut *tx, principal.role, principal.account.id).await
    {
        let _ = tx.rollback().await;
        error!("Failed to delete account: {err}");
        return server_error("Account deletion failed");
    }
    if let Err(err) = tx.commit().await {
        error!("Failed to commit account deletion: {err}");
        return server_error("Account deletion failed");
    }

    info!(account_id = %principal.account.id, role = principal.role.as_str(), "account deleted");
    ok_message(
        StatusCode::OK,
        "Account deleted successfully. You will receive a confirmation email.",
    )
}
