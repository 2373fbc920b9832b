//! Per-company document sequences
//!
//! Quote, job, and invoice numbers come from the `company_counters` table.
//! The counter row is seeded at 1000, so the first issued number is 1001.
//! The upsert increments and returns atomically, and the caller runs it
//! inside the same transaction as the insert that consumes the number, so
//! concurrent allocations can never hand out the same value.

use sqlx::PgConnection;
use uuid::Uuid;

pub const SCOPE_QUOTE: &str = "quote";
pub const SCOPE_JOB: &str = "job";
pub const SCOPE_INVOICE: &str = "invoice";

/// Allocate the next number for a company-scoped sequence.
pub async fn next_number(
    conn: &mut PgConnection,
    company_id: Uuid,
    scope: &str,
) -> Result<i32, sqlx::Error> {
    let value: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO company_counters (company_id, scope, value)
        VALUES ($1, $2, 1001)
        ON CONFLICT (company_id, scope)
        DO UPDATE SET value = company_counters.value + 1
        RETURNING value
        "#,
    )
    .bind(company_id)
    .bind(scope)
    .fetch_one(conn)
    .await?;

    Ok(value as i32)
}
