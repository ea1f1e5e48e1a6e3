//! # TalentGate (Account Lifecycle & Authentication)
//!
//! `talentgate` is the account-lifecycle authority of a job-marketplace
//! platform. It owns registration, e-mail OTP verification, login, password
//! recovery, e-mail-based two-factor authentication, and stateless session
//! tokens for four account kinds (candidate, recruiter, college, admin).
//!
//! ## Role Model
//!
//! Each account kind lives in its own table; a wire role string selects the
//! table exactly once at the boundary. An e-mail may exist as a *verified*
//! account in at most one of the four tables — an unverified duplicate under
//! another role is replaced on re-registration.
//!
//! ## One-Time Codes
//!
//! Registration verification, password reset, and two-factor login share a
//! single pending-code slot per account (`{purpose, hash, expires_at,
//! attempts}`). The failed-attempt cap depends on the purpose (5 for
//! registration and 2FA login, 3 for password reset), and re-issuing a code
//! always replaces the slot with the counter reset.
//!
//! ## Recruiter Gating
//!
//! Recruiters additionally pass an onboarding step and an admin approval
//! step. An unapproved recruiter who finished onboarding is refused a
//! session token until approved; one still onboarding receives a token so
//! the onboarding flow itself can authenticate.
//!
//! ## Notifications
//!
//! Outbound e-mail goes through a transactional outbox: flows enqueue rows
//! with their account mutation and a background worker delivers them with
//! retry/backoff. A slow or failing mail provider never blocks or fails an
//! HTTP response.

pub mod api;
pub mod cli;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
