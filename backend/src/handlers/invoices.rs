//! Invoicing. Line items and Quebec sales taxes (TPS 5%, TVQ 9.975%) are
//! frozen into the row at creation; sending attaches the rendered PDF.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::middleware::AuthUser;
use crate::auth::policy;
use crate::error::{ApiResult, AppError, ValidationBuilder};
use crate::pagination::{PaginatedResponse, PaginationParams};
use crate::services::{email as email_templates, sequence};
use crate::AppState;
use haulbase_shared::{
    Company, Customer, Invoice, InvoiceStatus, Job, PricingMethod, Quotation,
};

pub fn invoice_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_invoices).post(create_invoice))
        .route("/:id", get(get_invoice))
        .route("/:id/send", post(send_invoice))
        .route("/preview-from-job/:job_id", get(preview_from_job))
}

const TPS_RATE: Decimal = Decimal::from_parts(5, 0, 0, false, 2); // 0.05
const TVQ_RATE: Decimal = Decimal::from_parts(9975, 0, 0, false, 5); // 0.09975

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceItem {
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    #[serde(default)]
    pub amount: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct InvoiceItemInput {
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct InvoiceCreate {
    pub job_id: Option<Uuid>,
    pub customer_id: Option<Uuid>,
    #[serde(default)]
    pub items: Vec<InvoiceItemInput>,
    pub notes: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct InvoicePreview {
    pub customer_id: Uuid,
    pub customer_name: String,
    pub items: Vec<InvoiceItem>,
    pub subtotal: Decimal,
    pub tax_tps: Decimal,
    pub tax_tvq: Decimal,
    pub total: Decimal,
}

/// Extend each item and compute (subtotal, tps, tvq, total), all rounded
/// to cents.
pub fn compute_totals(items: &[InvoiceItem]) -> (Decimal, Decimal, Decimal, Decimal) {
    let subtotal: Decimal = items.iter().map(|i| i.amount).sum::<Decimal>().round_dp(2);
    let tps = (subtotal * TPS_RATE).round_dp(2);
    let tvq = (subtotal * TVQ_RATE).round_dp(2);
    let total = subtotal + tps + tvq;
    (subtotal, tps, tvq, total)
}

fn extend_items(inputs: Vec<InvoiceItemInput>) -> Vec<InvoiceItem> {
    inputs
        .into_iter()
        .map(|i| {
            let amount = (i.quantity * i.unit_price).round_dp(2);
            InvoiceItem {
                description: i.description,
                quantity: i.quantity,
                unit_price: i.unit_price,
                amount,
            }
        })
        .collect()
}

/// Default line items for a completed job, derived from its quotation's
/// pricing method.
pub fn items_from_quotation(quotation: &Quotation) -> Vec<InvoiceItem> {
    let mut items = Vec::new();

    match quotation.pricing_method {
        PricingMethod::Hourly => {
            let hours = quotation.estimated_hours.unwrap_or(Decimal::ZERO);
            let rate = quotation.hourly_rate.unwrap_or(Decimal::ZERO);
            items.push(InvoiceItem {
                description: format!("Moving service ({} workers)", quotation.workers),
                quantity: hours,
                unit_price: rate,
                amount: (hours * rate).round_dp(2),
            });
        }
        PricingMethod::Fixed => {
            let price = quotation.fixed_price.unwrap_or(Decimal::ZERO);
            items.push(InvoiceItem {
                description: "Moving service (fixed price)".to_string(),
                quantity: Decimal::ONE,
                unit_price: price,
                amount: price.round_dp(2),
            });
        }
    }

    if let Some(travel) = quotation.travel_cost {
        if travel > Decimal::ZERO {
            items.push(InvoiceItem {
                description: "Travel cost".to_string(),
                quantity: Decimal::ONE,
                unit_price: travel,
                amount: travel.round_dp(2),
            });
        }
    }

    items
}

async fn resolve_job_prefill(
    state: &AppState,
    job_id: Uuid,
    company_id: Uuid,
) -> ApiResult<(Quotation, Job)> {
    let job = sqlx::query_as::<_, Job>("SELECT * FROM jobs WHERE id = $1 AND company_id = $2")
        .bind(job_id)
        .bind(company_id)
        .fetch_optional(&state.db_pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Job".to_string()))?;

    let quotation = sqlx::query_as::<_, Quotation>("SELECT * FROM quotations WHERE id = $1")
        .bind(job.quotation_id)
        .fetch_one(&state.db_pool)
        .await?;

    Ok((quotation, job))
}

async fn create_invoice(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(payload): Json<InvoiceCreate>,
) -> ApiResult<(StatusCode, Json<Invoice>)> {
    policy::require_admin(&auth.user)?;

    let (customer_id, job_id, quotation_id, items) = if let Some(job_id) = payload.job_id {
        let (quotation, job) = resolve_job_prefill(&state, job_id, auth.user.company_id).await?;
        let items = if payload.items.is_empty() {
            items_from_quotation(&quotation)
        } else {
            extend_items(payload.items)
        };
        (quotation.customer_id, Some(job.id), Some(quotation.id), items)
    } else {
        let customer_id = payload.customer_id.ok_or_else(|| {
            AppError::BadRequest("Either job_id or customer_id is required".to_string())
        })?;
        let owned: Option<Uuid> =
            sqlx::query_scalar("SELECT id FROM customers WHERE id = $1 AND company_id = $2")
                .bind(customer_id)
                .bind(auth.user.company_id)
                .fetch_optional(&state.db_pool)
                .await?;
        if owned.is_none() {
            return Err(AppError::NotFound("Customer".to_string()));
        }
        (customer_id, None, None, extend_items(payload.items))
    };

    if let Some(err) = ValidationBuilder::new()
        .require(!items.is_empty(), "items", "At least one line item is required")
        .require(
            items
                .iter()
                .all(|i| !i.description.trim().is_empty() && i.quantity > Decimal::ZERO),
            "items",
            "Each line item needs a description and a positive quantity",
        )
        .build()
    {
        return Err(err);
    }

    let (subtotal, tax_tps, tax_tvq, total) = compute_totals(&items);
    let items_json = serde_json::to_value(&items)
        .map_err(|e| AppError::InternalError(e.to_string()))?;

    let mut tx = state.db_pool.begin().await?;
    let invoice_number =
        sequence::next_number(&mut tx, auth.user.company_id, sequence::SCOPE_INVOICE).await?;

    let invoice = sqlx::query_as::<_, Invoice>(
        r#"
        INSERT INTO invoices
            (company_id, customer_id, job_id, quotation_id, invoice_number, status,
             items, subtotal, tax_tps, tax_tvq, total, issued_at, notes)
        VALUES ($1, $2, $3, $4, $5, 'DRAFT', $6, $7, $8, $9, $10, $11, $12)
        RETURNING *
        "#,
    )
    .bind(auth.user.company_id)
    .bind(customer_id)
    .bind(job_id)
    .bind(quotation_id)
    .bind(invoice_number)
    .bind(items_json)
    .bind(subtotal)
    .bind(tax_tps)
    .bind(tax_tvq)
    .bind(total)
    .bind(Utc::now())
    .bind(&payload.notes)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok((StatusCode::CREATED, Json(invoice)))
}

async fn list_invoices(
    State(state): State<Arc<AppState>>,
    Query(pagination): Query<PaginationParams>,
    auth: AuthUser,
) -> ApiResult<Json<PaginatedResponse<Invoice>>> {
    let invoices = sqlx::query_as::<_, Invoice>(
        r#"
        SELECT * FROM invoices
        WHERE company_id = $1
        ORDER BY created_at DESC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(auth.user.company_id)
    .bind(pagination.limit())
    .bind(pagination.offset())
    .fetch_all(&state.db_pool)
    .await?;

    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM invoices WHERE company_id = $1")
        .bind(auth.user.company_id)
        .fetch_one(&state.db_pool)
        .await?;

    Ok(Json(PaginatedResponse::new(invoices, &pagination, total)))
}

async fn get_invoice(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    auth: AuthUser,
) -> ApiResult<Json<Invoice>> {
    let invoice =
        sqlx::query_as::<_, Invoice>("SELECT * FROM invoices WHERE id = $1 AND company_id = $2")
            .bind(id)
            .bind(auth.user.company_id)
            .fetch_optional(&state.db_pool)
            .await?
            .ok_or_else(|| AppError::NotFound("Invoice".to_string()))?;

    Ok(Json(invoice))
}

async fn send_invoice(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    auth: AuthUser,
) -> ApiResult<Json<serde_json::Value>> {
    policy::require_admin(&auth.user)?;

    let invoice =
        sqlx::query_as::<_, Invoice>("SELECT * FROM invoices WHERE id = $1 AND company_id = $2")
            .bind(id)
            .bind(auth.user.company_id)
            .fetch_optional(&state.db_pool)
            .await?
            .ok_or_else(|| AppError::NotFound("Invoice".to_string()))?;

    if invoice.status != InvoiceStatus::Draft {
        return Err(AppError::BadRequest(
            "Only a draft invoice can be sent".to_string(),
        ));
    }

    let customer = sqlx::query_as::<_, Customer>("SELECT * FROM customers WHERE id = $1")
        .bind(invoice.customer_id)
        .fetch_one(&state.db_pool)
        .await?;
    let company = sqlx::query_as::<_, Company>("SELECT * FROM companies WHERE id = $1")
        .bind(auth.user.company_id)
        .fetch_one(&state.db_pool)
        .await?;

    let customer_email = customer.email.clone().ok_or_else(|| {
        AppError::BadRequest("Customer has no email address on file".to_string())
    })?;

    let stored = state
        .pdf
        .store_invoice_pdf(&invoice, &customer, &company)
        .await
        .map_err(|e| AppError::InternalError(format!("PDF generation failed: {}", e)))?;

    let now = Utc::now();
    let updated = sqlx::query(
        r#"
        UPDATE invoices SET status = 'SENT', sent_at = $2, pdf_url = $3, updated_at = NOW()
        WHERE id = $1 AND status = 'DRAFT'
        "#,
    )
    .bind(invoice.id)
    .bind(now)
    .bind(&stored.url)
    .execute(&state.db_pool)
    .await?;

    if updated.rows_affected() == 0 {
        return Err(AppError::Conflict(
            "Invoice was already sent".to_string(),
        ));
    }

    if let Some(email_service) = &state.email {
        let email_service = email_service.clone();
        let customer_name = customer.full_name.clone();
        let company_name = company.name.clone();
        let invoice_number = invoice.invoice_number;
        let total = format!("${:.2}", invoice.total);
        let pdf_bytes = stored.bytes.clone();
        tokio::spawn(async move {
            let template = email_templates::invoice_template(
                &customer_name,
                &company_name,
                invoice_number,
                &total,
            );
            if let Err(e) = email_service
                .send_email_with_pdf(
                    &customer_email,
                    Some(&customer_name),
                    &template,
                    &format!("invoice-{}.pdf", invoice_number),
                    pdf_bytes,
                )
                .await
            {
                tracing::error!("Failed to email invoice #{}: {}", invoice_number, e);
            }
        });
    }

    Ok(Json(json!({
        "success": true,
        "pdf_url": stored.url,
        "sent_at": now,
    })))
}

async fn preview_from_job(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<Uuid>,
    auth: AuthUser,
) -> ApiResult<Json<InvoicePreview>> {
    policy::require_admin(&auth.user)?;

    let (quotation, _job) = resolve_job_prefill(&state, job_id, auth.user.company_id).await?;

    let customer_name: String = sqlx::query_scalar("SELECT full_name FROM customers WHERE id = $1")
        .bind(quotation.customer_id)
        .fetch_one(&state.db_pool)
        .await?;

    let items = items_from_quotation(&quotation);
    let (subtotal, tax_tps, tax_tvq, total) = compute_totals(&items);

    Ok(Json(InvoicePreview {
        customer_id: quotation.customer_id,
        customer_name,
        items,
        subtotal,
        tax_tps,
        tax_tvq,
        total,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(quantity: &str, unit_price: &str) -> InvoiceItem {
        let quantity: Decimal = quantity.parse().unwrap();
        let unit_price: Decimal = unit_price.parse().unwrap();
        InvoiceItem {
            description: "Service".to_string(),
            quantity,
            unit_price,
            amount: (quantity * unit_price).round_dp(2),
        }
    }

    #[test]
    fn test_tax_rates() {
        assert_eq!(TPS_RATE, "0.05".parse::<Decimal>().unwrap());
        assert_eq!(TVQ_RATE, "0.09975".parse::<Decimal>().unwrap());
    }

    #[test]
    fn test_compute_totals_quebec_taxes() {
        let items = vec![item("4", "120"), item("1", "50")];
        let (subtotal, tps, tvq, total) = compute_totals(&items);

        assert_eq!(subtotal, "530.00".parse::<Decimal>().unwrap());
        assert_eq!(tps, "26.50".parse::<Decimal>().unwrap());
        assert_eq!(tvq, "52.87".parse::<Decimal>().unwrap());
        assert_eq!(total, "609.37".parse::<Decimal>().unwrap());
    }

    #[test]
    fn test_compute_totals_empty() {
        let (subtotal, tps, tvq, total) = compute_totals(&[]);
        assert_eq!(subtotal, Decimal::ZERO);
        assert_eq!(tps, Decimal::ZERO);
        assert_eq!(tvq, Decimal::ZERO);
        assert_eq!(total, Decimal::ZERO);
    }

    #[test]
    fn test_items_from_hourly_quotation() {
        let mut quotation = crate::tests::fixtures::quotation();
        quotation.pricing_method = PricingMethod::Hourly;
        quotation.estimated_hours = Some("3.5".parse().unwrap());
        quotation.hourly_rate = Some("140".parse().unwrap());
        quotation.workers = 3;
        quotation.travel_cost = Some("75".parse().unwrap());

        let items = items_from_quotation(&quotation);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].description, "Moving service (3 workers)");
        assert_eq!(items[0].amount, "490.00".parse::<Decimal>().unwrap());
        assert_eq!(items[1].description, "Travel cost");
        assert_eq!(items[1].amount, "75.00".parse::<Decimal>().unwrap());
    }

    #[test]
    fn test_items_from_fixed_quotation_skips_zero_travel() {
        let mut quotation = crate::tests::fixtures::quotation();
        quotation.pricing_method = PricingMethod::Fixed;
        quotation.fixed_price = Some("950".parse().unwrap());
        quotation.travel_cost = Some(Decimal::ZERO);

        let items = items_from_quotation(&quotation);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].description, "Moving service (fixed price)");
        assert_eq!(items[0].amount, "950.00".parse::<Decimal>().unwrap());
    }
}
