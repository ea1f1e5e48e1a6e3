//! Account lifecycle gates.
//!
//! An account moves through
//! `PendingVerification → [PendingOnboarding] → [PendingApproval] → Active`;
//! only recruiters traverse the bracketed states. The functions here are the
//! single place that ordering lives — handlers fetch a record, evaluate the
//! gate, and map the result to a response.

use super::account::AccountRecord;

/// Where the account currently sits in its lifecycle.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LifecycleState {
    PendingVerification,
    PendingOnboarding,
    PendingApproval,
    Active,
}

/// Gate evaluated at login, after the password check has already passed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoginGate {
    /// Issue a session token.
    Allowed,
    /// 2FA enabled: answer with a challenge instead of a token.
    TwoFactorRequired,
    /// E-mail not verified yet.
    Unverified,
    /// Recruiter, unapproved, onboarding not finished.
    OnboardingRequired,
    /// Recruiter, unapproved, onboarding finished: waiting on an admin.
    ApprovalPending {
        approval_status: String,
        rejection_reason: Option<String>,
    },
}

/// What to answer once a registration OTP has verified successfully.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum VerifiedNext {
    /// Token issued, nothing else outstanding.
    Session,
    /// Token issued; the client must route to recruiter onboarding.
    SessionWithOnboarding,
    /// Withhold the token: onboarding is done but approval is not.
    ApprovalPending,
}

pub(crate) fn classify(account: &AccountRecord) -> LifecycleState {
    if !account.is_verified {
        return LifecycleState::PendingVerification;
    }
    match &account.approval {
        Some(gate) if !gate.is_approved => {
            if gate.onboarding_complete {
                LifecycleState::PendingApproval
            } else {
                LifecycleState::PendingOnboarding
            }
        }
        _ => LifecycleState::Active,
    }
}

/// Login ordering: verification, then recruiter approval, then 2FA.
pub(crate) fn evaluate_login(account: &AccountRecord) -> LoginGate {
    if !account.is_verified {
        return LoginGate::Unverified;
    }
    if let Some(gate) = &account.approval {
        if !gate.is_approved {
            if gate.onboarding_complete {
                return LoginGate::ApprovalPending {
                    approval_status: gate.approval_status.clone(),
                    rejection_reason: gate.rejection_reason.clone(),
                };
            }
            return LoginGate::OnboardingRequired;
        }
    }
    if account.two_factor_enabled {
        return LoginGate::TwoFactorRequired;
    }
    LoginGate::Allowed
}

/// Post-verification ordering for recruiters: an unapproved recruiter with
/// finished onboarding gets no token (so approval cannot be bypassed), while
/// one still onboarding gets a token to be able to finish.
pub(crate) fn after_verification(account: &AccountRecord) -> VerifiedNext {
    match &account.approval {
        Some(gate) if !gate.is_approved => {
            if gate.onboarding_complete {
                VerifiedNext::ApprovalPending
            } else {
                VerifiedNext::SessionWithOnboarding
            }
        }
        _ => VerifiedNext::Session,
    }
}

#[cfg(test)]
mod tests {
    use super::{
        LifecycleState, LoginGate, VerifiedNext, after_verification, classify, evaluate_login,
    };
    use crate::api::handlers::auth::account::{AccountRecord, RecruiterGate};
    use uuid::Uuid;

    fn account() -> AccountRecord {
        AccountRecord {
            id: Uuid::new_v4(),
            email: "user@example.com".to_string(),
            full_name: "User".to_string(),
            password_hash: String::new(),
            is_verified: true,
            pending_code: None,
            two_factor_enabled: false,
            two_factor_backup_codes: Vec::new(),
            two_factor_setup_hash: None,
            two_factor_setup_expires_at: None,
            last_login_at: None,
            approval: None,
        }
    }

    fn recruiter(is_approved: bool, onboarding_complete: bool) -> AccountRecord {
        let mut record = account();
        record.approval = Some(RecruiterGate {
            is_approved,
            approval_status: if is_approved { "approved" } else { "pending" }.to_string(),
            rejection_reason: None,
            onboarding_complete,
        });
        record
    }

    #[test]
    fn unverified_blocks_login_for_every_role() {
        let mut candidate = account();
        candidate.is_verified = false;
        assert_eq!(evaluate_login(&candidate), LoginGate::Unverified);

        let mut rec = recruiter(true, true);
        rec.is_verified = false;
        assert_eq!(evaluate_login(&rec), LoginGate::Unverified);
    }

    #[test]
    fn unapproved_recruiter_without_onboarding_needs_onboarding() {
        assert_eq!(
            evaluate_login(&recruiter(false, false)),
            LoginGate::OnboardingRequired
        );
    }

    #[test]
    fn unapproved_recruiter_with_onboarding_waits_for_approval() {
        let gate = evaluate_login(&recruiter(false, true));
        assert_eq!(
            gate,
            LoginGate::ApprovalPending {
                approval_status: "pending".to_string(),
                rejection_reason: None,
            }
        );
    }

    #[test]
    fn approved_recruiter_logs_in() {
        assert_eq!(evaluate_login(&recruiter(true, true)), LoginGate::Allowed);
    }

    #[test]
    fn two_factor_short_circuits_token_issuance() {
        let mut record = account();
        record.two_factor_enabled = true;
        assert_eq!(evaluate_login(&record), LoginGate::TwoFactorRequired);
    }

    #[test]
    fn approval_gate_outranks_two_factor() {
        let mut record = recruiter(false, true);
        record.two_factor_enabled = true;
        assert!(matches!(
            evaluate_login(&record),
            LoginGate::ApprovalPending { .. }
        ));
    }

    #[test]
    fn verification_outcome_is_exclusive() {
        // Never both onboarding and approval, never a token while approval
        // is the outstanding gate.
        assert_eq!(
            after_verification(&recruiter(false, true)),
            VerifiedNext::ApprovalPending
        );
        assert_eq!(
            after_verification(&recruiter(false, false)),
            VerifiedNext::SessionWithOnboarding
        );
        assert_eq!(
            after_verification(&recruiter(true, true)),
            VerifiedNext::Session
        );
        assert_eq!(after_verification(&account()), VerifiedNext::Session);
    }

    #[test]
    fn classification_tracks_the_state_machine() {
        let mut record = account();
        record.is_verified = false;
        assert_eq!(classify(&record), LifecycleState::PendingVerification);
        assert_eq!(classify(&account()), LifecycleState::Active);
        assert_eq!(
            classify(&recruiter(false, false)),
            LifecycleState::PendingOnboarding
        );
        assert_eq!(
            classify(&recruiter(false, true)),
            LifecycleState::PendingApproval
        );
        assert_eq!(classify(&recruiter(true, true)), LifecycleState::Active);
    }
}
