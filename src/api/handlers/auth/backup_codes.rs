//! Two-factor backup codes.
//!
//! Enabling 2FA mints ten single-use codes (8 uppercase hex characters from
//! 4 random bytes each). Only Argon2id hashes are stored; the plaintext
//! batch is shown to the caller exactly once. Login-time verification is a
//! linear scan over the stored hashes, and a match consumes the code by
//! removing its hash from the set.

use anyhow::Result;
use rand::{RngCore, rngs::OsRng};

use super::password::{hash_secret, verify_secret};

pub(crate) const BACKUP_CODE_COUNT: usize = 10;
const BACKUP_CODE_BYTES: usize = 4;

/// A freshly generated batch: plaintext codes plus their hashes.
#[derive(Debug)]
pub struct BackupCodeBatch {
    pub codes: Vec<String>,
    pub code_hashes: Vec<String>,
}

impl BackupCodeBatch {
    pub fn generate() -> Result<Self> {
        let mut codes = Vec::with_capacity(BACKUP_CODE_COUNT);
        let mut code_hashes = Vec::with_capacity(BACKUP_CODE_COUNT);
        for _ in 0..BACKUP_CODE_COUNT {
            let code = generate_code();
            code_hashes.push(hash_secret(&code)?);
            codes.push(code);
        }
        Ok(Self { codes, code_hashes })
    }
}

/// Uppercase a submitted code so entry is case-insensitive.
pub(crate) fn normalize_backup_code(input: &str) -> String {
    input.trim().to_ascii_uppercase()
}

/// Scan the stored hashes for one matching the submitted code.
/// Returns the matched hash so the caller can remove exactly that entry.
pub(crate) fn find_matching_hash(code: &str, hashes: &[String]) -> Option<String> {
    let normalized = normalize_backup_code(code);
    hashes
        .iter()
        .find(|hash| verify_secret(&normalized, hash))
        .cloned()
}

fn generate_code() -> String {
    let mut raw = [0u8; BACKUP_CODE_BYTES];
    OsRng.fill_bytes(&mut raw);
    let mut code = String::with_capacity(BACKUP_CODE_BYTES * 2);
    for byte in raw {
        code.push_str(&format!("{byte:02X}"));
    }
    code
}
