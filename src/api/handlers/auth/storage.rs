//! Database helpers for the account tables and the e-mail outbox.
//!
//! Every operation takes a `Role` and derives the table from it, so the
//! role-to-collection dispatch happens exactly once at the boundary. Writes
//! that must stay consistent (account + pending code + outbox row) run inside
//! a caller-owned transaction.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row, postgres::PgRow};
use tracing::Instrument;
use uuid::Uuid;

use super::account::{AccountRecord, NewAccount, RecruiterGate};
use super::otp::{OtpPurpose, PendingCode};
use super::role::Role;

const ACCOUNT_COLUMNS: &str = "id, email, full_name, password_hash, is_verified, \
     otp_purpose, otp_hash, otp_expires_at, otp_attempts, \
     two_factor_enabled, two_factor_backup_codes, \
     two_factor_setup_hash, two_factor_setup_expires_at, last_login_at";

const RECRUITER_EXTRA_COLUMNS: &str =
    ", is_approved, approval_status, rejection_reason, onboarding_complete";

type PgTransaction<'a> = sqlx::Transaction<'a, sqlx::Postgres>;

/// Cross-role lookup result used by registration collision handling.
#[derive(Debug)]
pub(super) struct ExistingAccount {
    pub(super) role: Role,
    pub(super) id: Uuid,
    pub(super) is_verified: bool,
}

fn db_span(operation: &'static str, statement: &str) -> tracing::Span {
    tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation,
        db.statement = statement
    )
}

fn select_columns(role: Role) -> String {
    if role == Role::Recruiter {
        format!("{ACCOUNT_COLUMNS}{RECRUITER_EXTRA_COLUMNS}")
    } else {
        ACCOUNT_COLUMNS.to_string()
    }
}

fn map_account_row(role: Role, row: &PgRow) -> AccountRecord {
    let pending_code = match (
        row.get::<Option<String>, _>("otp_purpose"),
        row.get::<Option<String>, _>("otp_hash"),
        row.get::<Option<DateTime<Utc>>, _>("otp_expires_at"),
        row.get::<Option<i32>, _>("otp_attempts"),
    ) {
        (Some(purpose), Some(hash), Some(expires_at), Some(attempts)) => OtpPurpose::from_str(
            &purpose,
        )
        .map(|purpose| PendingCode {
            purpose,
            hash,
            expires_at,
            attempts,
        }),
        _ => None,
    };

    let approval = if role == Role::Recruiter {
        Some(RecruiterGate {
            is_approved: row.get("is_approved"),
            approval_status: row.get("approval_status"),
            rejection_reason: row.get("rejection_reason"),
            onboarding_complete: row.get("onboarding_complete"),
        })
    } else {
        None
    };

    AccountRecord {
        id: row.get("id"),
        email: row.get("email"),
        full_name: row.get("full_name"),
        password_hash: row.get("password_hash"),
        is_verified: row.get("is_verified"),
        pending_code,
        two_factor_enabled: row.get("two_factor_enabled"),
        two_factor_backup_codes: row.get("two_factor_backup_codes"),
        two_factor_setup_hash: row.get("two_factor_setup_hash"),
        two_factor_setup_expires_at: row.get("two_factor_setup_expires_at"),
        last_login_at: row.get("last_login_at"),
        approval,
    }
}

pub(super) async fn fetch_account(
    pool: &PgPool,
    role: Role,
    email: &str,
) -> Result<Option<AccountRecord>> {
    let query = format!(
        "SELECT {} FROM {} WHERE email = $1",
        select_columns(role),
        role.table()
    );
    let row = sqlx::query(&query)
        .bind(email)
        .fetch_optional(pool)
        .instrument(db_span("SELECT", &query))
        .await
        .with_context(|| format!("failed to fetch account from {}", role.table()))?;
    Ok(row.map(|row| map_account_row(role, &row)))
}

pub(super) async fn fetch_account_by_id(
    pool: &PgPool,
    role: Role,
    id: Uuid,
) -> Result<Option<AccountRecord>> {
    let query = format!(
        "SELECT {} FROM {} WHERE id = $1",
        select_columns(role),
        role.table()
    );
    let row = sqlx::query(&query)
        .bind(id)
        .fetch_optional(pool)
        .instrument(db_span("SELECT", &query))
        .await
        .with_context(|| format!("failed to fetch account by id from {}", role.table()))?;
    Ok(row.map(|row| map_account_row(role, &row)))
}

/// Look the e-mail up across all four tables. Lookup order matches the
/// collision-resolution priority of the registration flow.
pub(super) async fn find_email_across_roles(
    pool: &PgPool,
    email: &str,
) -> Result<Option<ExistingAccount>> {
    for role in [Role::Recruiter, Role::Candidate, Role::College, Role::Admin] {
        let query = format!("SELECT id, is_verified FROM {} WHERE email = $1", role.table());
        let row = sqlx::query(&query)
            .bind(email)
            .fetch_optional(pool)
            .instrument(db_span("SELECT", &query))
            .await
            .with_context(|| format!("failed cross-role lookup in {}", role.table()))?;
        if let Some(row) = row {
            return Ok(Some(ExistingAccount {
                role,
                id: row.get("id"),
                is_verified: row.get("is_verified"),
            }));
        }
    }
    Ok(None)
}

pub(super) async fn insert_account(
    tx: &mut PgTransaction<'_>,
    role: Role,
    account: &NewAccount<'_>,
) -> Result<Uuid> {
    let query = format!(
        "INSERT INTO {} \
            (email, full_name, password_hash, is_verified, \
             otp_purpose, otp_hash, otp_expires_at, otp_attempts) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
         RETURNING id",
        role.table()
    );
    let pending = account.pending_code;
    let row = sqlx::query(&query)
        .bind(account.email)
        .bind(account.full_name)
        .bind(account.password_hash)
        .bind(account.is_verified)
        .bind(pending.map(|code| code.purpose.as_str()))
        .bind(pending.map(|code| code.hash.as_str()))
        .bind(pending.map(|code| code.expires_at))
        .bind(pending.map(|code| code.attempts))
        .fetch_one(&mut **tx)
        .instrument(db_span("INSERT", &query))
        .await
        .with_context(|| format!("failed to insert account into {}", role.table()))?;
    Ok(row.get("id"))
}

/// Overwrite an unverified account on same-role re-registration: new name,
/// new password, fresh pending code with attempts back at zero.
pub(super) async fn refresh_unverified_account(
    tx: &mut PgTransaction<'_>,
    role: Role,
    id: Uuid,
    full_name: &str,
    password_hash: &str,
    pending: &PendingCode,
) -> Result<()> {
    let query = format!(
        "UPDATE {} SET full_name = $2, password_hash = $3, \
            otp_purpose = $4, otp_hash = $5, otp_expires_at = $6, otp_attempts = $7, \
            updated_at = NOW() \
         WHERE id = $1",
        role.table()
    );
    sqlx::query(&query)
        .bind(id)
        .bind(full_name)
        .bind(password_hash)
        .bind(pending.purpose.as_str())
        .bind(pending.hash.as_str())
        .bind(pending.expires_at)
        .bind(pending.attempts)
        .execute(&mut **tx)
        .instrument(db_span("UPDATE", &query))
        .await
        .with_context(|| format!("failed to refresh unverified account in {}", role.table()))?;
    Ok(())
}

pub(super) async fn delete_account<'e>(
    executor: impl sqlx::PgExecutor<'e>,
    role: Role,
    id: Uuid,
) -> Result<()> {
    let query = format!("DELETE FROM {} WHERE id = $1", role.table());
    sqlx::query(&query)
        .bind(id)
        .execute(executor)
        .instrument(db_span("DELETE", &query))
        .await
        .with_context(|| format!("failed to delete account from {}", role.table()))?;
    Ok(())
}

/// Overwrite the pending-code slot. Issuance always pairs with an outbox
/// enqueue, so this only exists in a transaction flavor.
pub(super) async fn store_pending_code(
    tx: &mut PgTransaction<'_>,
    role: Role,
    id: Uuid,
    pending: &PendingCode,
) -> Result<()> {
    let query = format!(
        "UPDATE {} SET otp_purpose = $2, otp_hash = $3, otp_expires_at = $4, \
            otp_attempts = $5, updated_at = NOW() \
         WHERE id = $1",
        role.table()
    );
    sqlx::query(&query)
        .bind(id)
        .bind(pending.purpose.as_str())
        .bind(pending.hash.as_str())
        .bind(pending.expires_at)
        .bind(pending.attempts)
        .execute(&mut **tx)
        .instrument(db_span("UPDATE", &query))
        .await
        .with_context(|| format!("failed to store pending code in {}", role.table()))?;
    Ok(())
}

pub(super) async fn clear_pending_code(pool: &PgPool, role: Role, id: Uuid) -> Result<()> {
    let query = format!(
        "UPDATE {} SET otp_purpose = NULL, otp_hash = NULL, otp_expires_at = NULL, \
            otp_attempts = NULL, updated_at = NOW() \
         WHERE id = $1",
        role.table()
    );
    sqlx::query(&query)
        .bind(id)
        .execute(pool)
        .instrument(db_span("UPDATE", &query))
        .await
        .with_context(|| format!("failed to clear pending code in {}", role.table()))?;
    Ok(())
}

/// Plain read-then-increment; two concurrent wrong submissions may
/// under-count by one. Accepted behavior, not a correctness requirement.
pub(super) async fn record_failed_otp_attempt(pool: &PgPool, role: Role, id: Uuid) -> Result<()> {
    let query = format!(
        "UPDATE {} SET otp_attempts = otp_attempts + 1, updated_at = NOW() \
         WHERE id = $1 AND otp_attempts IS NOT NULL",
        role.table()
    );
    sqlx::query(&query)
        .bind(id)
        .execute(pool)
        .instrument(db_span("UPDATE", &query))
        .await
        .with_context(|| format!("failed to record otp attempt in {}", role.table()))?;
    Ok(())
}

/// Flip the account to verified and clear the pending code in one statement
/// so the all-or-nothing shape of the slot holds.
pub(super) async fn mark_verified(tx: &mut PgTransaction<'_>, role: Role, id: Uuid) -> Result<()> {
    let query = format!(
        "UPDATE {} SET is_verified = TRUE, otp_purpose = NULL, otp_hash = NULL, \
            otp_expires_at = NULL, otp_attempts = NULL, updated_at = NOW() \
         WHERE id = $1",
        role.table()
    );
    sqlx::query(&query)
        .bind(id)
        .execute(&mut **tx)
        .instrument(db_span("UPDATE", &query))
        .await
        .with_context(|| format!("failed to mark account verified in {}", role.table()))?;
    Ok(())
}

/// Password reset: replace the hash and clear the consumed reset code.
pub(super) async fn reset_password(
    pool: &PgPool,
    role: Role,
    id: Uuid,
    password_hash: &str,
) -> Result<()> {
    let query = format!(
        "UPDATE {} SET password_hash = $2, otp_purpose = NULL, otp_hash = NULL, \
            otp_expires_at = NULL, otp_attempts = NULL, updated_at = NOW() \
         WHERE id = $1",
        role.table()
    );
    sqlx::query(&query)
        .bind(id)
        .bind(password_hash)
        .execute(pool)
        .instrument(db_span("UPDATE", &query))
        .await
        .with_context(|| format!("failed to reset password in {}", role.table()))?;
    Ok(())
}

pub(super) async fn update_password(
    pool: &PgPool,
    role: Role,
    id: Uuid,
    password_hash: &str,
) -> Result<()> {
    let query = format!(
        "UPDATE {} SET password_hash = $2, updated_at = NOW() WHERE id = $1",
        role.table()
    );
    sqlx::query(&query)
        .bind(id)
        .bind(password_hash)
        .execute(pool)
        .instrument(db_span("UPDATE", &query))
        .await
        .with_context(|| format!("failed to update password in {}", role.table()))?;
    Ok(())
}

pub(super) async fn store_two_factor_setup(
    tx: &mut PgTransaction<'_>,
    role: Role,
    id: Uuid,
    setup_hash: &str,
    expires_at: DateTime<Utc>,
) -> Result<()> {
    let query = format!(
        "UPDATE {} SET two_factor_setup_hash = $2, two_factor_setup_expires_at = $3, \
            updated_at = NOW() \
         WHERE id = $1",
        role.table()
    );
    sqlx::query(&query)
        .bind(id)
        .bind(setup_hash)
        .bind(expires_at)
        .execute(&mut **tx)
        .instrument(db_span("UPDATE", &query))
        .await
        .with_context(|| format!("failed to store 2FA setup code in {}", role.table()))?;
    Ok(())
}

pub(super) async fn clear_two_factor_setup(pool: &PgPool, role: Role, id: Uuid) -> Result<()> {
    let query = format!(
        "UPDATE {} SET two_factor_setup_hash = NULL, two_factor_setup_expires_at = NULL, \
            updated_at = NOW() \
         WHERE id = $1",
        role.table()
    );
    sqlx::query(&query)
        .bind(id)
        .execute(pool)
        .instrument(db_span("UPDATE", &query))
        .await
        .with_context(|| format!("failed to clear 2FA setup code in {}", role.table()))?;
    Ok(())
}

/// Enable 2FA: store the fresh backup-code hashes and drop the setup code.
pub(super) async fn enable_two_factor(
    pool: &PgPool,
    role: Role,
    id: Uuid,
    code_hashes: &[String],
) -> Result<()> {
    let query = format!(
        "UPDATE {} SET two_factor_enabled = TRUE, two_factor_backup_codes = $2, \
            two_factor_setup_hash = NULL, two_factor_setup_expires_at = NULL, \
            updated_at = NOW() \
         WHERE id = $1",
        role.table()
    );
    sqlx::query(&query)
        .bind(id)
        .bind(code_hashes)
        .execute(pool)
        .instrument(db_span("UPDATE", &query))
        .await
        .with_context(|| format!("failed to enable 2FA in {}", role.table()))?;
    Ok(())
}

/// Unconditional clear; running it on an already-disabled account is a no-op.
pub(super) async fn disable_two_factor(pool: &PgPool, role: Role, id: Uuid) -> Result<()> {
    let query = format!(
        "UPDATE {} SET two_factor_enabled = FALSE, two_factor_backup_codes = '{{}}', \
            two_factor_setup_hash = NULL, two_factor_setup_expires_at = NULL, \
            updated_at = NOW() \
         WHERE id = $1",
        role.table()
    );
    sqlx::query(&query)
        .bind(id)
        .execute(pool)
        .instrument(db_span("UPDATE", &query))
        .await
        .with_context(|| format!("failed to disable 2FA in {}", role.table()))?;
    Ok(())
}

/// Remove one consumed backup-code hash. Returns false when the hash was
/// already gone, which callers treat as "invalid code".
pub(super) async fn consume_backup_code(
    pool: &PgPool,
    role: Role,
    id: Uuid,
    code_hash: &str,
) -> Result<bool> {
    let query = format!(
        "UPDATE {} SET two_factor_backup_codes = array_remove(two_factor_backup_codes, $2), \
            updated_at = NOW() \
         WHERE id = $1 AND $2 = ANY(two_factor_backup_codes)",
        role.table()
    );
    let result = sqlx::query(&query)
        .bind(id)
        .bind(code_hash)
        .execute(pool)
        .instrument(db_span("UPDATE", &query))
        .await
        .with_context(|| format!("failed to consume backup code in {}", role.table()))?;
    Ok(result.rows_affected() == 1)
}

pub(super) async fn touch_last_login(pool: &PgPool, role: Role, id: Uuid) -> Result<()> {
    let query = format!(
        "UPDATE {} SET last_login_at = NOW() WHERE id = $1",
        role.table()
    );
    sqlx::query(&query)
        .bind(id)
        .execute(pool)
        .instrument(db_span("UPDATE", &query))
        .await
        .with_context(|| format!("failed to update last login in {}", role.table()))?;
    Ok(())
}

/// Enqueue an outbox row. Runs in the caller's transaction so the e-mail is
/// only queued when the account mutation commits.
pub(super) async fn enqueue_email(
    tx: &mut PgTransaction<'_>,
    to_email: &str,
    template: &str,
    payload: &serde_json::Value,
) -> Result<()> {
    let payload_text = serde_json::to_string(payload).context("failed to serialize email payload")?;
    let query = "INSERT INTO email_outbox (to_email, template, payload_json) \
                 VALUES ($1, $2, $3::jsonb)";
    sqlx::query(query)
        .bind(to_email)
        .bind(template)
        .bind(payload_text)
        .execute(&mut **tx)
        .instrument(db_span("INSERT", query))
        .await
        .context("failed to insert email outbox row")?;
    Ok(())
}

pub(super) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}
