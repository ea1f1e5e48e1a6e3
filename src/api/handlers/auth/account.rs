//! Account records as the auth flows see them.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::otp::PendingCode;

/// Recruiter-only gating state. `None` on every other role.
#[derive(Clone, Debug)]
pub struct RecruiterGate {
    pub is_approved: bool,
    pub approval_status: String,
    pub rejection_reason: Option<String>,
    pub onboarding_complete: bool,
}

/// One account row, uniform across the four role tables.
#[derive(Clone, Debug)]
pub struct AccountRecord {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    pub password_hash: String,
    pub is_verified: bool,
    pub pending_code: Option<PendingCode>,
    pub two_factor_enabled: bool,
    pub two_factor_backup_codes: Vec<String>,
    pub two_factor_setup_hash: Option<String>,
    pub two_factor_setup_expires_at: Option<DateTime<Utc>>,
    pub last_login_at: Option<DateTime<Utc>>,
    /// Present only for recruiters.
    pub approval: Option<RecruiterGate>,
}

impl AccountRecord {
    /// Display name for e-mail templates.
    pub(crate) fn display_name(&self) -> &str {
        if self.full_name.trim().is_empty() {
            "User"
        } else {
            &self.full_name
        }
    }
}

/// Fields for a fresh account row.
#[derive(Debug)]
pub struct NewAccount<'a> {
    pub email: &'a str,
    pub full_name: &'a str,
    pub password_hash: &'a str,
    pub is_verified: bool,
    pub pending_code: Option<&'a PendingCode>,
}

#[cfg(test)]
mod tests {
    use super::{AccountRecord, RecruiterGate};
    use uuid::Uuid;

    fn record(full_name: &str) -> AccountRecord {
        AccountRecord {
            id: Uuid::new_v4(),
            email: "user@example.com".to_string(),
            full_name: full_name.to_string(),
            password_hash: String::new(),
            is_verified: false,
            pending_code: None,
            two_factor_enabled: false,
            two_factor_backup_codes: Vec::new(),
            two_factor_setup_hash: None,
            two_factor_setup_expires_at: None,
            last_login_at: None,
            approval: None,
        }
    }

    #[test]
    fn display_name_falls_back() {
        assert_eq!(record("").display_name(), "User");
        assert_eq!(record("  ").display_name(), "User");
        assert_eq!(record("Ada").display_name(), "Ada");
    }

    #[test]
    fn recruiter_gate_holds_values() {
        let gate = RecruiterGate {
            is_approved: false,
            approval_status: "pending".to_string(),
            rejection_reason: None,
            onboarding_complete: true,
        };
        assert!(!gate.is_approved);
        assert_eq!(gate.approval_status, "pending");
    }
}
