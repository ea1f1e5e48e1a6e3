//! Argon2id hashing shared by passwords, one-time codes, setup codes, and
//! backup codes. Only PHC-format hashes are persisted; plaintext secrets are
//! returned to the caller once (for e-mailing or display) and never stored.

use anyhow::{Result, anyhow};
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString};
use rand::rngs::OsRng;

/// Minimum accepted password length (matches account validation rules).
pub(crate) const MIN_PASSWORD_LEN: usize = 6;

pub(crate) fn valid_password(password: &str) -> bool {
    password.len() >= MIN_PASSWORD_LEN
}

/// Hash a secret with Argon2id and a fresh random salt.
pub(crate) fn hash_secret(secret: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(secret.as_bytes(), &salt)
        .map_err(|_| anyhow!("failed to hash secret"))?
        .to_string();
    Ok(hash)
}

/// Verify a secret against a stored PHC hash.
///
/// A malformed stored hash reads as a mismatch rather than an error so a
/// corrupt row can never be used to probe internals.
pub(crate) fn verify_secret(secret: &str, stored_hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored_hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(secret.as_bytes(), &parsed)
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::{hash_secret, valid_password, verify_secret};
    use anyhow::Result;

    #[test]
    fn hash_and_verify_round_trip() -> Result<()> {
        let hash = hash_secret("pw123456")?;
        assert!(verify_secret("pw123456", &hash));
        assert!(!verify_secret("pw123457", &hash));
        Ok(())
    }

    #[test]
    fn salts_differ_between_hashes() -> Result<()> {
        let first = hash_secret("pw123456")?;
        let second = hash_secret("pw123456")?;
        assert_ne!(first, second);
        Ok(())
    }

    #[test]
    fn malformed_hash_is_a_mismatch() {
        assert!(!verify_secret("pw123456", "not-a-phc-hash"));
        assert!(!verify_secret("pw123456", ""));
    }

    #[test]
    fn password_length_floor() {
        assert!(valid_password("123456"));
        assert!(!valid_password("12345"));
    }
}
