//! Request/response types for auth endpoints.
//!
//! Bodies are camelCase on the wire and share the platform's
//! `{success, message, data}` envelope.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub full_name: String,
    pub role: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct VerifyOtpRequest {
    pub email: String,
    pub otp: String,
    pub role: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    pub role: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ForgotPasswordRequest {
    pub email: String,
    pub role: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    pub email: String,
    pub otp: String,
    pub new_password: String,
    pub role: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub new_password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct TwoFactorSetupRequest {
    pub otp: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct TwoFactorCodeRequest {
    pub email: String,
    pub otp: String,
    pub role: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct TwoFactorEmailRequest {
    pub email: String,
    pub role: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct DeleteAccountRequest {
    pub password: String,
}

/// Account summary safe to return to clients.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct AccountView {
    pub user_id: String,
    pub email: String,
    pub full_name: String,
    pub role: String,
    pub is_verified: bool,
    pub two_factor_enabled: bool,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredData {
    pub user_id: String,
    pub email: String,
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SessionData {
    pub user: AccountView,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requires_onboarding: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requires_approval: Option<bool>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct TwoFactorChallengeData {
    pub requires_two_factor: bool,
    pub temp_token: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct BackupCodesData {
    pub backup_codes: Vec<String>,
}

/// Standard success envelope.
#[derive(Serialize, Debug)]
pub struct ApiSuccess<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

/// Standard failure envelope.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ApiFailure {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(rename = "requiresOnboarding")]
    pub requires_onboarding: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(rename = "approvalStatus")]
    pub approval_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(rename = "rejectionReason")]
    pub rejection_reason: Option<String>,
}

impl AccountView {
    pub(crate) fn from_record(
        record: &super::account::AccountRecord,
        role: super::role::Role,
    ) -> Self {
        Self {
            user_id: record.id.to_string(),
            email: record.email.clone(),
            full_name: record.full_name.clone(),
            role: role.as_str().to_string(),
            is_verified: record.is_verified,
            two_factor_enabled: record.two_factor_enabled,
        }
    }
}

/// Failure response carrying extra gate fields (onboarding/approval).
pub(crate) fn fail_body(status: StatusCode, body: ApiFailure) -> Response {
    (status, Json(body)).into_response()
}

/// Success response with a data payload.
pub(crate) fn ok_data<T: Serialize>(status: StatusCode, message: &str, data: T) -> Response {
    (
        status,
        Json(ApiSuccess {
            success: true,
            message: Some(message.to_string()),
            data: Some(data),
        }),
    )
        .into_response()
}

/// Success response with a message only.
pub(crate) fn ok_message(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(ApiSuccess::<()> {
            success: true,
            message: Some(message.to_string()),
            data: None,
        }),
    )
        .into_response()
}

/// Failure response with the uniform `{success:false, message}` body.
pub(crate) fn fail(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(ApiFailure {
            success: false,
            message: message.to_string(),
            requires_onboarding: None,
            approval_status: None,
            rejection_reason: None,
        }),
    )
        .into_response()
}

/// 500 with an intentionally generic message.
pub(crate) fn server_error(message: &str) -> Response {
    fail(StatusCode::INTERNAL_SERVER_ERROR, message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Context, Result};

    #[test]
    fn register_request_uses_camel_case() -> Result<()> {
        let request: RegisterRequest = serde_json::from_value(serde_json::json!({
            "email": "a@x.com",
            "password": "pw123456",
            "fullName": "Ada",
            "role": "job_seeker",
        }))?;
        assert_eq!(request.full_name, "Ada");
        assert_eq!(request.role, "job_seeker");
        Ok(())
    }

    #[test]
    fn full_name_defaults_to_empty() -> Result<()> {
        let request: RegisterRequest = serde_json::from_value(serde_json::json!({
            "email": "a@x.com",
            "password": "pw123456",
            "role": "admin",
        }))?;
        assert!(request.full_name.is_empty());
        Ok(())
    }

    #[test]
    fn session_data_omits_absent_fields() -> Result<()> {
        let data = SessionData {
            user: AccountView {
                user_id: "id".to_string(),
                email: "a@x.com".to_string(),
                full_name: "Ada".to_string(),
                role: "job_seeker".to_string(),
                is_verified: true,
                two_factor_enabled: false,
            },
            token: Some("jwt".to_string()),
            requires_onboarding: None,
            requires_approval: None,
        };
        let value = serde_json::to_value(&data)?;
        assert!(value.get("requiresOnboarding").is_none());
        assert!(value.get("requiresApproval").is_none());
        let token = value
            .get("token")
            .and_then(serde_json::Value::as_str)
            .context("token present")?;
        assert_eq!(token, "jwt");
        Ok(())
    }

    #[test]
    fn failure_envelope_shape() -> Result<()> {
        let failure = ApiFailure {
            success: false,
            message: "Invalid credentials".to_string(),
            requires_onboarding: None,
            approval_status: Some("pending".to_string()),
            rejection_reason: None,
        };
        let value = serde_json::to_value(&failure)?;
        assert_eq!(value.get("success"), Some(&serde_json::json!(false)));
        assert_eq!(
            value.get("approvalStatus"),
            Some(&serde_json::json!("pending"))
        );
        assert!(value.get("rejectionReason").is_none());
        Ok(())
    }

    #[test]
    fn reset_request_round_trips() -> Result<()> {
        let request: ResetPasswordRequest = serde_json::from_value(serde_json::json!({
            "email": "a@x.com",
            "otp": "123456",
            "newPassword": "pw123456",
            "role": "employer",
        }))?;
        assert_eq!(request.new_password, "pw123456");
        Ok(())
    }
}
