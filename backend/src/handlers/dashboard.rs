//! Company-level dashboard counters, all scoped to the caller's tenant.

use axum::{extract::State, response::Json, routing::get, Router};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;

use crate::auth::middleware::AuthUser;
use crate::error::ApiResult;
use crate::AppState;

pub fn dashboard_routes() -> Router<Arc<AppState>> {
    Router::new().route("/", get(get_stats))
}

#[derive(Debug, Serialize)]
pub struct QuotationStats {
    pub total: i64,
    pub draft: i64,
    pub sent: i64,
    pub signed: i64,
    pub expired: i64,
}

#[derive(Debug, Serialize)]
pub struct JobStats {
    pub pending: i64,
    pub cancelled: i64,
    /// Jobs that made it to the calendar or beyond.
    pub moves: i64,
}

#[derive(Debug, Serialize)]
pub struct DashboardStats {
    pub customers: i64,
    pub active_employees: i64,
    pub quotations: QuotationStats,
    pub jobs: JobStats,
    pub revenue_signed: Decimal,
    pub invoices_outstanding: i64,
}

#[derive(sqlx::FromRow)]
struct StatsRow {
    customers: i64,
    active_employees: i64,
    quotes_total: i64,
    quotes_draft: i64,
    quotes_sent: i64,
    quotes_signed: i64,
    quotes_expired: i64,
    jobs_pending: i64,
    jobs_cancelled: i64,
    jobs_moves: i64,
    revenue_signed: Decimal,
    invoices_outstanding: i64,
}

async fn get_stats(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> ApiResult<Json<DashboardStats>> {
    let row = sqlx::query_as::<_, StatsRow>(
        r#"
        SELECT
            (SELECT COUNT(*) FROM customers WHERE company_id = $1) AS customers,
            (SELECT COUNT(*) FROM employees WHERE company_id = $1 AND status = 'ACTIVE')
                AS active_employees,
            (SELECT COUNT(*) FROM quotations WHERE company_id = $1
                AND status <> 'IN_PROGRESS') AS quotes_total,
            (SELECT COUNT(*) FROM quotations WHERE company_id = $1
                AND status = 'DRAFT') AS quotes_draft,
            (SELECT COUNT(*) FROM quotations WHERE company_id = $1
                AND status = 'SENT') AS quotes_sent,
            (SELECT COUNT(*) FROM quotations WHERE company_id = $1
                AND status = 'SIGNED') AS quotes_signed,
            (SELECT COUNT(*) FROM quotations WHERE company_id = $1
                AND status = 'EXPIRED') AS quotes_expired,
            (SELECT COUNT(*) FROM jobs WHERE company_id = $1
                AND status = 'PENDING') AS jobs_pending,
            (SELECT COUNT(*) FROM jobs WHERE company_id = $1
                AND status = 'CANCELLED') AS jobs_cancelled,
            (SELECT COUNT(*) FROM jobs WHERE company_id = $1
                AND status IN ('CONFIRMED', 'IN_PROGRESS', 'COMPLETED', 'AUTO_ENDED'))
                AS jobs_moves,
            (SELECT COALESCE(SUM(total), 0) FROM quotations WHERE company_id = $1
                AND status = 'SIGNED') AS revenue_signed,
            (SELECT COUNT(*) FROM invoices WHERE company_id = $1
                AND status = 'SENT') AS invoices_outstanding
        "#,
    )
    .bind(auth.user.company_id)
    .fetch_one(&state.db_pool)
    .await?;

    Ok(Json(DashboardStats {
        customers: row.customers,
        active_employees: row.active_employees,
        quotations: QuotationStats {
            total: row.quotes_total,
            draft: row.quotes_draft,
            sent: row.quotes_sent,
            signed: row.quotes_signed,
            expired: row.quotes_expired,
        },
        jobs: JobStats {
            pending: row.jobs_pending,
            cancelled: row.jobs_cancelled,
            moves: row.jobs_moves,
        },
        revenue_signed: row.revenue_signed,
        invoices_outstanding: row.invoices_outstanding,
    }))
}
