//! E-mail outbox worker and delivery abstractions.
//!
//! Auth flows never send mail inline. They enqueue a row in `email_outbox`
//! inside the same transaction as the account mutation, so a code is only
//! queued for delivery once the state that backs it has committed. A
//! background task polls pending rows, locks a batch via
//! `FOR UPDATE SKIP LOCKED`, and hands each row to an [`EmailSender`].
//! Failures retry with exponential backoff and jitter until a max attempt
//! threshold, then park as `failed`.
//!
//! Delivery is therefore at-most-once best-effort from the caller's view: a
//! user who never receives a code asks for a resend rather than the service
//! retrying the originating request. The default sender for local dev is
//! [`LogEmailSender`], which logs the payload and reports success.

use anyhow::{Context, Result};
use rand::Rng;
use sqlx::{PgPool, Row};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{Instrument, error, info, info_span};
use uuid::Uuid;

/// Template names and payload builders for the messages the auth flows send.
pub(crate) mod templates {
    use serde_json::{Value, json};

    pub(crate) const OTP_VERIFICATION: &str = "otp_verification";
    pub(crate) const WELCOME: &str = "welcome";
    pub(crate) const PASSWORD_RESET: &str = "password_reset";
    pub(crate) const TWO_FACTOR_SETUP: &str = "two_factor_setup";
    pub(crate) const TWO_FACTOR_LOGIN: &str = "two_factor_login";
    pub(crate) const ACCOUNT_DELETION: &str = "account_deletion";

    /// Payload for every template that carries a one-time code.
    pub(crate) fn otp_payload(email: &str, name: &str, code: &str) -> Value {
        json!({
            "email": email,
            "name": if name.trim().is_empty() { "User" } else { name },
            "otp": code,
        })
    }

    pub(crate) fn welcome_payload(email: &str, name: &str) -> Value {
        json!({ "email": email, "name": name })
    }

    pub(crate) fn account_deletion_payload(email: &str, name: &str) -> Value {
        json!({ "email": email, "name": name })
    }
}

#[derive(Clone, Debug)]
pub struct EmailMessage {
    pub to_email: String,
    pub template: String,
    pub payload_json: String,
}

/// Delivery abstraction used by the outbox worker. Implementations decide
/// the transport (SMTP, provider API) and report success or failure.
pub trait EmailSender: Send + Sync {
    fn send(&self, message: &EmailMessage) -> Result<()>;
}

/// Local dev sender: logs instead of delivering.
#[derive(Clone, Debug)]
pub struct LogEmailSender;

impl EmailSender for LogEmailSender {
    fn send(&self, message: &EmailMessage) -> Result<()> {
        info!(
            to_email = %message.to_email,
            template = %message.template,
            payload = %message.payload_json,
            "email outbox send stub"
        );
        Ok(())
    }
}

#[derive(Clone, Copy, Debug)]
pub struct OutboxConfig {
    poll_interval: Duration,
    batch_size: usize,
    max_attempts: u32,
    backoff_base: Duration,
    backoff_max: Duration,
}

impl OutboxConfig {
    /// Defaults: 5s poll, 10 rows per batch, 5 attempts, 5s→5m backoff.
    #[must_use]
    pub fn new() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            batch_size: 10,
            max_attempts: 5,
            backoff_base: Duration::from_secs(5),
            backoff_max: Duration::from_secs(300),
        }
    }

    #[must_use]
    pub fn with_poll_interval_seconds(mut self, seconds: u64) -> Self {
        self.poll_interval = Duration::from_secs(seconds);
        self
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    #[must_use]
    pub fn with_backoff_base_seconds(mut self, seconds: u64) -> Self {
        self.backoff_base = Duration::from_secs(seconds);
        self
    }

    #[must_use]
    pub fn with_backoff_max_seconds(mut self, seconds: u64) -> Self {
        self.backoff_max = Duration::from_secs(seconds);
        self
    }

    /// Clamp zero/inverted settings to workable values.
    #[must_use]
    pub fn normalize(mut self) -> Self {
        if self.poll_interval.is_zero() {
            self.poll_interval = Duration::from_secs(1);
        }
        if self.batch_size == 0 {
            self.batch_size = 1;
        }
        self.max_attempts = self.max_attempts.max(1);
        if self.backoff_base.is_zero() {
            self.backoff_base = Duration::from_secs(1);
        }
        if self.backoff_max < self.backoff_base {
            self.backoff_max = self.backoff_base;
        }
        self
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    #[must_use]
    pub fn backoff_base(&self) -> Duration {
        self.backoff_base
    }

    #[must_use]
    pub fn backoff_max(&self) -> Duration {
        self.backoff_max
    }
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Spawn the background task that drains the outbox.
pub fn spawn_outbox_worker(
    pool: PgPool,
    sender: Arc<dyn EmailSender>,
    config: OutboxConfig,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let config = config.normalize();
        loop {
            if let Err(err) = process_outbox_batch(&pool, sender.as_ref(), &config).await {
                error!("email outbox batch failed: {err}");
            }
            sleep(config.poll_interval()).await;
        }
    })
}

async fn process_outbox_batch(
    pool: &PgPool,
    sender: &dyn EmailSender,
    config: &OutboxConfig,
) -> Result<usize> {
    let mut tx = pool
        .begin()
        .await
        .context("failed to start email outbox transaction")?;

    // Locked batch so concurrent workers never double-send a row.
    let query = r"
        SELECT id, to_email, template, payload_json::text AS payload_json, attempts
        FROM email_outbox
        WHERE status = 'pending'
          AND next_attempt_at <= NOW()
        ORDER BY next_attempt_at ASC, created_at ASC
        LIMIT $1
        FOR UPDATE SKIP LOCKED
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let rows = sqlx::query(query)
        .bind(i64::try_from(config.batch_size()).unwrap_or(1))
        .fetch_all(&mut *tx)
        .instrument(span)
        .await
        .context("failed to load email outbox batch")?;

    if rows.is_empty() {
        tx.commit()
            .await
            .context("failed to commit empty outbox batch")?;
        return Ok(0);
    }

    let row_count = rows.len();
    for row in rows {
        let id: Uuid = row.get("id");
        let attempts = u32::try_from(row.get::<i32, _>("attempts")).unwrap_or(0);
        let message = EmailMessage {
            to_email: row.get("to_email"),
            template: row.get("template"),
            payload_json: row.get("payload_json"),
        };
        let send_result = sender.send(&message);
        record_outcome(&mut tx, id, attempts, send_result, config).await?;
    }

    tx.commit()
        .await
        .context("failed to commit email outbox batch")?;
    Ok(row_count)
}

async fn record_outcome(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    id: Uuid,
    attempts: u32,
    send_result: Result<()>,
    config: &OutboxConfig,
) -> Result<()> {
    let next_attempt = attempts.saturating_add(1);
    let attempts_column = i32::try_from(next_attempt).unwrap_or(i32::MAX);

    let (query, last_error, delay_ms) = match &send_result {
        Ok(()) => (
            r"
                UPDATE email_outbox
                SET status = 'sent',
                    attempts = $2,
                    last_error = NULL,
                    sent_at = NOW(),
                    next_attempt_at = NOW()
                WHERE id = $1
            ",
            None,
            0i64,
        ),
        Err(err) if next_attempt >= config.max_attempts() => (
            r"
                UPDATE email_outbox
                SET status = 'failed',
                    attempts = $2,
                    last_error = $3,
                    next_attempt_at = NOW()
                WHERE id = $1
            ",
            Some(err.to_string()),
            0i64,
        ),
        Err(err) => {
            let delay = backoff_delay(next_attempt, config.backoff_base(), config.backoff_max());
            (
                r"
                    UPDATE email_outbox
                    SET status = 'pending',
                        attempts = $2,
                        last_error = $3,
                        next_attempt_at = NOW() + ($4 * INTERVAL '1 millisecond')
                    WHERE id = $1
                ",
                Some(err.to_string()),
                i64::try_from(delay.as_millis()).unwrap_or(i64::MAX),
            )
        }
    };

    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let mut update = sqlx::query(query).bind(id).bind(attempts_column);
    if let Some(last_error) = last_error {
        update = update.bind(last_error);
        if delay_ms > 0 {
            update = update.bind(delay_ms);
        }
    }
    update
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to update email outbox row")?;
    Ok(())
}

fn backoff_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    let shift = attempt.saturating_sub(1).min(31);
    let factor = 1u32 << shift;
    let delay = base.checked_mul(factor).unwrap_or(max);
    jitter_delay(delay.min(max))
}

/// Spread retries over [delay/2, delay] so parked rows do not thundering-herd
/// the provider when it recovers.
fn jitter_delay(delay: Duration) -> Duration {
    let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
    if delay_ms < 2 {
        return delay;
    }
    let half = delay_ms / 2;
    let jitter = rand::thread_rng().gen_range(0..=half);
    Duration::from_millis(half + jitter)
}

#[cfg(test)]
mod tests {
    use super::templates::{ACCOUNT_DELETION, OTP_VERIFICATION, otp_payload};
    use super::{EmailMessage, EmailSender, LogEmailSender, OutboxConfig, backoff_delay};
    use std::time::Duration;

    #[test]
    fn normalize_clamps_degenerate_settings() {
        let config = OutboxConfig::new()
            .with_poll_interval_seconds(0)
            .with_batch_size(0)
            .with_max_attempts(0)
            .with_backoff_base_seconds(60)
            .with_backoff_max_seconds(1)
            .normalize();
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
        assert_eq!(config.batch_size(), 1);
        assert_eq!(config.max_attempts(), 1);
        assert_eq!(config.backoff_max(), config.backoff_base());
    }

    #[test]
    fn backoff_grows_and_stays_bounded() {
        let base = Duration::from_secs(5);
        let max = Duration::from_secs(300);
        for attempt in 1..=12 {
            let delay = backoff_delay(attempt, base, max);
            assert!(delay <= max, "attempt {attempt} exceeded max: {delay:?}");
            assert!(delay >= base / 2, "attempt {attempt} below jitter floor");
        }
    }

    #[test]
    fn log_sender_accepts_messages() {
        let sender = LogEmailSender;
        let message = EmailMessage {
            to_email: "a@x.com".to_string(),
            template: OTP_VERIFICATION.to_string(),
            payload_json: otp_payload("a@x.com", "Ada", "123456").to_string(),
        };
        assert!(sender.send(&message).is_ok());
    }

    #[test]
    fn otp_payload_defaults_blank_names() {
        let payload = otp_payload("a@x.com", "  ", "123456");
        assert_eq!(payload["name"], "User");
        assert_eq!(payload["otp"], "123456");
    }

    #[test]
    fn template_names_are_distinct() {
        assert_ne!(OTP_VERIFICATION, ACCOUNT_DELETION);
    }
}
