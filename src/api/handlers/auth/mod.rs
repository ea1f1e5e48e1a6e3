//! Account lifecycle and authentication.
//!
//! Flow overview:
//! 1) Registration creates an unverified account with a pending OTP; admins
//!    are auto-verified and receive a token immediately.
//! 2) OTP verification activates the account. Recruiters then pass through
//!    onboarding/approval gates before a full session is possible.
//! 3) Login checks the password, the verification/approval gates, and (when
//!    enabled) hands off to the two-factor challenge instead of a token.
//! 4) Sessions are stateless signed tokens; every protected request resolves
//!    `{sub, role}` against the role's table.
//!
//! Security boundaries:
//! - Only Argon2id hashes of passwords, codes, and backup codes persist.
//! - Login never distinguishes unknown accounts from wrong passwords.
//! - One pending code per account; re-issuing overwrites it.

pub(crate) mod account;
pub(crate) mod backup_codes;
pub(crate) mod lifecycle;
pub(crate) mod login;
pub(crate) mod otp;
pub(crate) mod password;
pub(crate) mod password_reset;
pub(crate) mod principal;
pub(crate) mod profile;
pub(crate) mod rate_limit;
pub(crate) mod register;
pub(crate) mod role;
pub(crate) mod state;
pub(crate) mod storage;
pub(crate) mod token;
pub(crate) mod two_factor;
pub(crate) mod types;

pub use rate_limit::NoopRateLimiter;
pub use state::{AuthConfig, AuthState};

#[cfg(test)]
mod tests;
