//! Keyed, TTL'd signup state
//!
//! Pending company signups (step 1 of the OTP flow) are held in the
//! `signup_sessions` table so they survive restarts and are visible to every
//! instance. Rows carry their own expiry; expired rows are ignored on read
//! and purged by the daily maintenance job.

use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;

/// Pending signup rows live this long before the OTP must be re-requested.
pub const SIGNUP_TTL_MINUTES: i64 = 5;
/// A wrong OTP may be retried this many times before the session is discarded.
pub const MAX_OTP_ATTEMPTS: i32 = 5;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SignupSession {
    pub key: String,
    pub payload: serde_json::Value,
    pub otp_hash: Option<String>,
    pub attempts: i32,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Create or replace a pending signup keyed by email. Replacing resets the
/// attempt counter and the TTL.
pub async fn put(
    pool: &PgPool,
    key: &str,
    payload: serde_json::Value,
    otp_hash: &str,
) -> Result<(), sqlx::Error> {
    let expires_at = Utc::now() + Duration::minutes(SIGNUP_TTL_MINUTES);

    sqlx::query(
        r#"
        INSERT INTO signup_sessions (key, payload, otp_hash, attempts, expires_at)
        VALUES ($1, $2, $3, 0, $4)
        ON CONFLICT (key)
        DO UPDATE SET payload = $2, otp_hash = $3, attempts = 0,
                      expires_at = $4, updated_at = NOW()
        "#,
    )
    .bind(key)
    .bind(payload)
    .bind(otp_hash)
    .bind(expires_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Fetch a pending signup if it has not expired.
pub async fn get_valid(pool: &PgPool, key: &str) -> Result<Option<SignupSession>, sqlx::Error> {
    sqlx::query_as::<_, SignupSession>(
        "SELECT * FROM signup_sessions WHERE key = $1 AND expires_at > NOW()",
    )
    .bind(key)
    .fetch_optional(pool)
    .await
}

/// Record a failed OTP attempt and return the updated count.
pub async fn record_failed_attempt(pool: &PgPool, key: &str) -> Result<i32, sqlx::Error> {
    sqlx::query_scalar(
        r#"
        UPDATE signup_sessions
        SET attempts = attempts + 1, updated_at = NOW()
        WHERE key = $1
        RETURNING attempts
        "#,
    )
    .bind(key)
    .fetch_one(pool)
    .await
}

/// Remove a pending signup (after completion or too many failed attempts).
pub async fn remove(pool: &PgPool, key: &str) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM signup_sessions WHERE key = $1")
        .bind(key)
        .execute(pool)
        .await?;
    Ok(())
}

/// Purge expired rows; returns how many were deleted.
pub async fn purge_expired(pool: &PgPool) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM signup_sessions WHERE expires_at <= NOW()")
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}
