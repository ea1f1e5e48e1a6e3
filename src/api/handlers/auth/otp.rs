//! One-time code engine.
//!
//! Registration verification, password reset, and two-factor login all share
//! a single pending-code slot per account. The slot is modeled explicitly as
//! `PendingCode { purpose, hash, expires_at, attempts }` so the attempt cap
//! is a property of the purpose instead of a convention scattered across
//! handlers. The fields are all present or all absent; callers clear them
//! together on success, expiry, or attempt exhaustion.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use rand::{Rng, rngs::OsRng};

use super::password::{hash_secret, verify_secret};

/// Codes expire 10 minutes after issuance.
pub(crate) const OTP_TTL_MINUTES: i64 = 10;

/// What a pending code is for. The cap on failed attempts depends on it.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OtpPurpose {
    Registration,
    PasswordReset,
    TwoFactorLogin,
}

impl OtpPurpose {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Registration => "registration",
            Self::PasswordReset => "password_reset",
            Self::TwoFactorLogin => "two_factor_login",
        }
    }

    pub(crate) fn from_str(value: &str) -> Option<Self> {
        match value.trim() {
            "registration" => Some(Self::Registration),
            "password_reset" => Some(Self::PasswordReset),
            "two_factor_login" => Some(Self::TwoFactorLogin),
            _ => None,
        }
    }

    /// Failed-attempt cap for this purpose.
    pub(crate) fn max_attempts(self) -> i32 {
        match self {
            Self::Registration | Self::TwoFactorLogin => 5,
            Self::PasswordReset => 3,
        }
    }
}

/// Outcome of checking a submitted code against the pending slot.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OtpOutcome {
    Success,
    Invalid,
    Expired,
    AttemptsExceeded,
}

/// The account's pending one-time code. At most one exists at a time;
/// re-issuing overwrites the previous one and resets `attempts`.
#[derive(Clone, Debug)]
pub struct PendingCode {
    pub purpose: OtpPurpose,
    pub hash: String,
    pub expires_at: DateTime<Utc>,
    pub attempts: i32,
}

impl PendingCode {
    /// Issue a fresh code: returns the slot to persist and the plaintext,
    /// which goes out by e-mail exactly once and is never stored.
    pub fn issue(purpose: OtpPurpose, now: DateTime<Utc>) -> Result<(Self, String)> {
        let code = generate_code();
        let pending = Self {
            purpose,
            hash: hash_secret(&code)?,
            expires_at: now + Duration::minutes(OTP_TTL_MINUTES),
            attempts: 0,
        };
        Ok((pending, code))
    }

    /// Check a submitted code. Expiry is evaluated first, then the attempt
    /// cap, then the hash. The caller owns persistence: `Expired`,
    /// `AttemptsExceeded`, and `Success` all clear the slot; `Invalid`
    /// increments `attempts`.
    pub fn verify(&self, submitted: &str, now: DateTime<Utc>) -> OtpOutcome {
        if self.expires_at < now {
            return OtpOutcome::Expired;
        }
        if self.attempts >= self.purpose.max_attempts() {
            return OtpOutcome::AttemptsExceeded;
        }
        if verify_secret(submitted.trim(), &self.hash) {
            OtpOutcome::Success
        } else {
            OtpOutcome::Invalid
        }
    }
}

/// 6-digit code drawn uniformly from [100000, 999999]. Also used for the
/// two-factor setup code, which lives outside the shared pending slot.
pub(crate) fn generate_code() -> String {
    OsRng.gen_range(100_000..=999_999).to_string()
}

#[cfg(test)]
mod tests {
    use super::{OtpOutcome, OtpPurpose, PendingCode, generate_code};
    use anyhow::Result;
    use chrono::{Duration, Utc};

    #[test]
    fn purpose_strings_round_trip() {
        for purpose in [
            OtpPurpose::Registration,
            OtpPurpose::PasswordReset,
            OtpPurpose::TwoFactorLogin,
        ] {
            assert_eq!(OtpPurpose::from_str(purpose.as_str()), Some(purpose));
        }
        assert_eq!(OtpPurpose::from_str("login"), None);
    }

    #[test]
    fn caps_by_purpose() {
        assert_eq!(OtpPurpose::Registration.max_attempts(), 5);
        assert_eq!(OtpPurpose::PasswordReset.max_attempts(), 3);
        assert_eq!(OtpPurpose::TwoFactorLogin.max_attempts(), 5);
    }

    #[test]
    fn generated_codes_are_six_digits() {
        for _ in 0..32 {
            let code = generate_code();
            assert_eq!(code.len(), 6);
            let value: u32 = code.parse().expect("numeric code");
            assert!((100_000..=999_999).contains(&value));
        }
    }

    #[test]
    fn correct_code_succeeds() -> Result<()> {
        let now = Utc::now();
        let (pending, code) = PendingCode::issue(OtpPurpose::Registration, now)?;
        assert_eq!(pending.verify(&code, now), OtpOutcome::Success);
        Ok(())
    }

    #[test]
    fn wrong_code_is_invalid() -> Result<()> {
        let now = Utc::now();
        let (pending, code) = PendingCode::issue(OtpPurpose::Registration, now)?;
        let wrong = if code == "123456" { "654321" } else { "123456" };
        assert_eq!(pending.verify(wrong, now), OtpOutcome::Invalid);
        Ok(())
    }

    #[test]
    fn expiry_wins_over_attempts_and_hash() -> Result<()> {
        let now = Utc::now();
        let (mut pending, code) = PendingCode::issue(OtpPurpose::PasswordReset, now)?;
        pending.attempts = 99;
        let later = now + Duration::minutes(11);
        // Even the correct code reads as expired once past the deadline.
        assert_eq!(pending.verify(&code, later), OtpOutcome::Expired);
        Ok(())
    }

    #[test]
    fn attempt_cap_blocks_correct_code() -> Result<()> {
        let now = Utc::now();
        let (mut pending, code) = PendingCode::issue(OtpPurpose::Registration, now)?;
        pending.attempts = 5;
        assert_eq!(pending.verify(&code, now), OtpOutcome::AttemptsExceeded);
        Ok(())
    }

    #[test]
    fn reset_cap_is_three() -> Result<()> {
        let now = Utc::now();
        let (mut pending, code) = PendingCode::issue(OtpPurpose::PasswordReset, now)?;
        pending.attempts = 3;
        assert_eq!(pending.verify(&code, now), OtpOutcome::AttemptsExceeded);
        pending.attempts = 2;
        assert_eq!(pending.verify(&code, now), OtpOutcome::Success);
        Ok(())
    }

    #[test]
    fn reissue_resets_attempts() -> Result<()> {
        let now = Utc::now();
        let (mut pending, _code) = PendingCode::issue(OtpPurpose::Registration, now)?;
        pending.attempts = 4;
        let (reissued, _new_code) = PendingCode::issue(OtpPurpose::Registration, now)?;
        assert_eq!(reissued.attempts, 0);
        assert_ne!(pending.hash, reissued.hash);
        Ok(())
    }
}
