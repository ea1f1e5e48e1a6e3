//! Flow-level invariants exercised against an in-memory account directory.
//!
//! These mirror the decision logic the handlers drive through storage, with
//! persistence replaced by a map, so the registration/verification/2FA rules
//! can be checked end to end without a database.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

use super::backup_codes::{BackupCodeBatch, find_matching_hash};
use super::otp::{OtpOutcome, OtpPurpose, PendingCode};
use super::password::{hash_secret, verify_secret};
use super::role::Role;

struct StoredAccount {
    password_hash: String,
    is_verified: bool,
    pending: Option<PendingCode>,
    two_factor_enabled: bool,
    backup_hashes: Vec<String>,
}

#[derive(Debug, PartialEq, Eq)]
enum RegisterOutcome {
    Created,
    Resent,
    AlreadyExists,
}

#[derive(Debug, PartialEq, Eq)]
enum VerifyOutcome {
    Verified,
    Invalid,
    Expired,
    AttemptsExceeded,
    NoPendingCode,
    NotFound,
}

/// Four role "collections" keyed by e-mail, with the registration collision
/// rules and the OTP clearing rules of the real handlers.
struct InMemoryDirectory {
    accounts: HashMap<(Role, String), StoredAccount>,
}

impl InMemoryDirectory {
    fn new() -> Self {
        Self {
            accounts: HashMap::new(),
        }
    }

    fn register(
        &mut self,
        email: &str,
        role: Role,
        password: &str,
        now: DateTime<Utc>,
    ) -> (RegisterOutcome, Option<String>) {
        let existing = Role::ALL
            .iter()
            .find(|candidate| self.accounts.contains_key(&(**candidate, email.to_string())))
            .copied();

        if let Some(existing_role) = existing {
            let key = (existing_role, email.to_string());
            let verified = self
                .accounts
                .get(&key)
                .is_some_and(|account| account.is_verified);
            if verified {
                return (RegisterOutcome::AlreadyExists, None);
            }
            if existing_role == role {
                let (pending, code) =
                    PendingCode::issue(OtpPurpose::Registration, now).expect("issue");
                let account = self.accounts.get_mut(&key).expect("present");
                account.password_hash = hash_secret(password).expect("hash");
                account.pending = Some(pending);
                return (RegisterOutcome::Resent, Some(code));
            }
            // Unverified under a different role: replaced by the new signup.
            self.accounts.remove(&key);
        }

        let (pending, code) = PendingCode::issue(OtpPurpose::Registration, now).expect("issue");
        self.accounts.insert(
            (role, email.to_string()),
            StoredAccount {
                password_hash: hash_secret(password).expect("hash"),
                is_verified: role == Role::Admin,
                pending: if role == Role::Admin { None } else { Some(pending) },
                two_factor_enabled: false,
                backup_hashes: Vec::new(),
            },
        );
        let code = if role == Role::Admin { None } else { Some(code) };
        (RegisterOutcome::Created, code)
    }

    fn verify_otp(
        &mut self,
        email: &str,
        role: Role,
        submitted: &str,
        now: DateTime<Utc>,
    ) -> VerifyOutcome {
        let key = (role, email.to_string());
        let Some(account) = self.accounts.get_mut(&key) else {
            return VerifyOutcome::NotFound;
        };
        let Some(pending) = account
            .pending
            .as_ref()
            .filter(|pending| pending.purpose == OtpPurpose::Registration)
        else {
            return VerifyOutcome::NoPendingCode;
        };
        match pending.verify(submitted, now) {
            OtpOutcome::Success => {
                account.is_verified = true;
                account.pending = None;
                VerifyOutcome::Verified
            }
            OtpOutcome::Expired => {
                account.pending = None;
                VerifyOutcome::Expired
            }
            OtpOutcome::AttemptsExceeded => {
                account.pending = None;
                VerifyOutcome::AttemptsExceeded
            }
            OtpOutcome::Invalid => {
                if let Some(pending) = account.pending.as_mut() {
                    pending.attempts += 1;
                }
                VerifyOutcome::Invalid
            }
        }
    }

    fn enable_two_factor(&mut self, email: &str, role: Role) -> Vec<String> {
        let batch = BackupCodeBatch::generate().expect("batch");
        let account = self
            .accounts
            .get_mut(&(role, email.to_string()))
            .expect("account");
        account.two_factor_enabled = true;
        account.backup_hashes = batch.code_hashes;
        batch.codes
    }

    fn disable_two_factor(&mut self, email: &str, role: Role) -> bool {
        let account = self
            .accounts
            .get_mut(&(role, email.to_string()))
            .expect("account");
        account.two_factor_enabled = false;
        account.backup_hashes.clear();
        // Unconditional clear: success whether or not it was enabled.
        true
    }

    fn redeem_backup_code(&mut self, email: &str, role: Role, code: &str) -> bool {
        let account = self
            .accounts
            .get_mut(&(role, email.to_string()))
            .expect("account");
        if !account.two_factor_enabled {
            return false;
        }
        let Some(matched) = find_matching_hash(code, &account.backup_hashes) else {
            return false;
        };
        account.backup_hashes.retain(|hash| hash != &matched);
        true
    }

    fn account(&self, email: &str, role: Role) -> &StoredAccount {
        self.accounts
            .get(&(role, email.to_string()))
            .expect("account")
    }
}

#[test]
fn sixth_attempt_fails_even_with_the_correct_code() {
    let now = Utc::now();
    let mut directory = InMemoryDirectory::new();
    let (outcome, code) = directory.register("a@x.com", Role::Candidate, "pw123456", now);
    assert_eq!(outcome, RegisterOutcome::Created);
    let code = code.expect("candidate gets a code");

    for _ in 0..5 {
        assert_eq!(
            directory.verify_otp("a@x.com", Role::Candidate, "000000", now),
            VerifyOutcome::Invalid
        );
    }
    assert_eq!(
        directory.verify_otp("a@x.com", Role::Candidate, &code, now),
        VerifyOutcome::AttemptsExceeded
    );
    // The slot is cleared, so yet another try finds nothing pending.
    assert_eq!(
        directory.verify_otp("a@x.com", Role::Candidate, &code, now),
        VerifyOutcome::NoPendingCode
    );
}

#[test]
fn expired_code_clears_the_slot() {
    let now = Utc::now();
    let mut directory = InMemoryDirectory::new();
    let (_, code) = directory.register("a@x.com", Role::College, "pw123456", now);
    let code = code.expect("code");

    let later = now + Duration::minutes(11);
    assert_eq!(
        directory.verify_otp("a@x.com", Role::College, &code, later),
        VerifyOutcome::Expired
    );
    assert!(directory.account("a@x.com", Role::College).pending.is_none());
}

#[test]
fn resend_resets_the_attempt_counter() {
    let now = Utc::now();
    let mut directory = InMemoryDirectory::new();
    directory.register("a@x.com", Role::Candidate, "pw123456", now);
    for _ in 0..4 {
        directory.verify_otp("a@x.com", Role::Candidate, "000000", now);
    }
    assert_eq!(
        directory
            .account("a@x.com", Role::Candidate)
            .pending
            .as_ref()
            .map(|pending| pending.attempts),
        Some(4)
    );

    let (outcome, code) = directory.register("a@x.com", Role::Candidate, "pw123456", now);
    assert_eq!(outcome, RegisterOutcome::Resent);
    assert_eq!(
        directory
            .account("a@x.com", Role::Candidate)
            .pending
            .as_ref()
            .map(|pending| pending.attempts),
        Some(0)
    );
    assert_eq!(
        directory.verify_otp("a@x.com", Role::Candidate, &code.expect("code"), now),
        VerifyOutcome::Verified
    );
}

#[test]
fn unverified_account_under_another_role_is_replaced() {
    let now = Utc::now();
    let mut directory = InMemoryDirectory::new();
    directory.register("a@x.com", Role::College, "pw123456", now);

    // Registering the same e-mail as a candidate deletes the college record.
    let (outcome, _) = directory.register("a@x.com", Role::Candidate, "pw123456", now);
    assert_eq!(outcome, RegisterOutcome::Created);
    assert!(
        !directory
            .accounts
            .contains_key(&(Role::College, "a@x.com".to_string()))
    );

    // Re-registering as college afterward is brand-new, not a resend.
    let (outcome, _) = directory.register("a@x.com", Role::College, "pw123456", now);
    assert_eq!(outcome, RegisterOutcome::Created);
}

#[test]
fn verified_account_blocks_every_role() {
    let now = Utc::now();
    let mut directory = InMemoryDirectory::new();
    let (_, code) = directory.register("a@x.com", Role::Candidate, "pw123456", now);
    directory.verify_otp("a@x.com", Role::Candidate, &code.expect("code"), now);

    for role in Role::ALL {
        assert_eq!(
            directory.register("a@x.com", role, "pw123456", now).0,
            RegisterOutcome::AlreadyExists
        );
    }
}

#[test]
fn admin_registration_is_pre_verified_with_no_code() {
    let now = Utc::now();
    let mut directory = InMemoryDirectory::new();
    let (outcome, code) = directory.register("root@x.com", Role::Admin, "pw123456", now);
    assert_eq!(outcome, RegisterOutcome::Created);
    assert!(code.is_none());
    assert!(directory.account("root@x.com", Role::Admin).is_verified);
}

#[test]
fn registration_stores_only_hashes() {
    let now = Utc::now();
    let mut directory = InMemoryDirectory::new();
    let (_, code) = directory.register("a@x.com", Role::Candidate, "pw123456", now);
    let account = directory.account("a@x.com", Role::Candidate);

    assert_ne!(account.password_hash, "pw123456");
    assert!(verify_secret("pw123456", &account.password_hash));
    let pending = account.pending.as_ref().expect("pending code");
    let code = code.expect("code");
    assert_ne!(pending.hash, code);
    assert!(verify_secret(&code, &pending.hash));
}

#[test]
fn backup_code_is_single_use() {
    let now = Utc::now();
    let mut directory = InMemoryDirectory::new();
    let (_, code) = directory.register("a@x.com", Role::Recruiter, "pw123456", now);
    directory.verify_otp("a@x.com", Role::Recruiter, &code.expect("code"), now);

    let codes = directory.enable_two_factor("a@x.com", Role::Recruiter);
    assert_eq!(codes.len(), 10);

    let code = codes.first().expect("ten codes");
    assert!(directory.redeem_backup_code("a@x.com", Role::Recruiter, code));
    assert!(!directory.redeem_backup_code("a@x.com", Role::Recruiter, code));
    assert_eq!(
        directory
            .account("a@x.com", Role::Recruiter)
            .backup_hashes
            .len(),
        9
    );
}

#[test]
fn reenabling_two_factor_rotates_the_code_set() {
    let now = Utc::now();
    let mut directory = InMemoryDirectory::new();
    let (_, code) = directory.register("a@x.com", Role::Candidate, "pw123456", now);
    directory.verify_otp("a@x.com", Role::Candidate, &code.expect("code"), now);

    let first = directory.enable_two_factor("a@x.com", Role::Candidate);
    directory.disable_two_factor("a@x.com", Role::Candidate);
    let second = directory.enable_two_factor("a@x.com", Role::Candidate);

    // Old codes are gone with the old hashes.
    for old in &first {
        assert!(!directory.redeem_backup_code("a@x.com", Role::Candidate, old));
    }
    let fresh = second.first().expect("codes");
    assert!(directory.redeem_backup_code("a@x.com", Role::Candidate, fresh));
}

#[test]
fn disable_two_factor_is_idempotent() {
    let now = Utc::now();
    let mut directory = InMemoryDirectory::new();
    let (_, code) = directory.register("a@x.com", Role::Candidate, "pw123456", now);
    directory.verify_otp("a@x.com", Role::Candidate, &code.expect("code"), now);
    directory.enable_two_factor("a@x.com", Role::Candidate);

    assert!(directory.disable_two_factor("a@x.com", Role::Candidate));
    assert!(directory.disable_two_factor("a@x.com", Role::Candidate));
    assert!(!directory.account("a@x.com", Role::Candidate).two_factor_enabled);
}

#[test]
fn wrong_purpose_code_is_not_accepted() {
    let now = Utc::now();
    let mut directory = InMemoryDirectory::new();
    directory.register("a@x.com", Role::Candidate, "pw123456", now);

    // Swap the pending slot for a password-reset code; the registration
    // verify path must treat it as absent.
    let (pending, reset_code) = PendingCode::issue(OtpPurpose::PasswordReset, now).expect("issue");
    directory
        .accounts
        .get_mut(&(Role::Candidate, "a@x.com".to_string()))
        .expect("account")
        .pending = Some(pending);

    assert_eq!(
        directory.verify_otp("a@x.com", Role::Candidate, &reset_code, now),
        VerifyOutcome::NoPendingCode
    );
}
