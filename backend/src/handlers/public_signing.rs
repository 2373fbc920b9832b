//! Token-addressed quotation pages for customers. No JWT here; the only
//! credential is the per-send public token.

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{ApiResult, AppError};
use crate::services::{email as email_templates, sequence};
use crate::AppState;
use haulbase_shared::{Company, Customer, PricingMethod, Quotation, QuotationStatus};

pub fn public_quotation_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/:token", get(view_quotation))
        .route("/:token/sign", post(sign_quotation))
        .route("/:token/success", get(signing_success))
}

/// A signature capture must be an image data URL with enough payload to be
/// a real drawing rather than an empty canvas.
pub fn valid_signature_data(data: &str) -> bool {
    data.starts_with("data:image") && data.len() >= 1500
}

#[derive(Debug, Deserialize)]
pub struct SignRequest {
    pub signed_by: String,
    pub signature_data: String,
    pub device: Option<String>,
}

/// Customer-facing projection: pricing breakdown and logistics, none of the
/// internal notes.
#[derive(Debug, Serialize)]
pub struct PublicQuotationView {
    pub quote_number: Option<i32>,
    pub status: QuotationStatus,
    pub company_name: String,
    pub company_phone: Option<String>,
    pub company_email: Option<String>,
    pub customer_name: String,
    pub service_type: Option<String>,
    pub moving_date: Option<NaiveDate>,
    pub start_time: Option<String>,
    pub estimated_hours: Option<Decimal>,
    pub workers: i32,
    pub trucks: i32,
    pub truck_size: Option<String>,
    pub pricing_method: PricingMethod,
    pub hourly_rate: Option<Decimal>,
    pub fixed_price: Option<Decimal>,
    pub travel_cost: Option<Decimal>,
    pub materials_cost: Option<Decimal>,
    pub other_fees: Option<Decimal>,
    pub discount: Option<Decimal>,
    pub tax_tps: Option<Decimal>,
    pub tax_tvq: Option<Decimal>,
    pub total: Decimal,
    pub pickup_address: Option<String>,
    pub dropoff_address: Option<String>,
    pub inventory_json: Option<serde_json::Value>,
    pub inventory_items: Option<i32>,
    pub terms_text: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub signed_at: Option<DateTime<Utc>>,
    pub signed_by: Option<String>,
}

async fn fetch_by_token(state: &AppState, token: &str) -> ApiResult<Quotation> {
    sqlx::query_as::<_, Quotation>("SELECT * FROM quotations WHERE public_token = $1")
        .bind(token)
        .fetch_optional(&state.db_pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Quotation".to_string()))
}

/// Flip a stale SENT quotation to EXPIRED on access. The conditional WHERE
/// makes the flip a no-op if the sweep or a concurrent request got there
/// first.
async fn expire_if_stale(state: &AppState, quotation: &mut Quotation) -> ApiResult<()> {
    if quotation.status != QuotationStatus::Sent {
        return Ok(());
    }
    let expired = match quotation.expires_at {
        Some(expires_at) => expires_at < Utc::now(),
        None => false,
    };
    if !expired {
        return Ok(());
    }

    sqlx::query(
        "UPDATE quotations SET status = 'EXPIRED', updated_at = NOW() \
         WHERE id = $1 AND status = 'SENT'",
    )
    .bind(quotation.id)
    .execute(&state.db_pool)
    .await?;
    quotation.status = QuotationStatus::Expired;

    Ok(())
}

async fn view_quotation(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> ApiResult<Json<PublicQuotationView>> {
    let mut quotation = fetch_by_token(&state, &token).await?;
    expire_if_stale(&state, &mut quotation).await?;

    let customer = sqlx::query_as::<_, Customer>("SELECT * FROM customers WHERE id = $1")
        .bind(quotation.customer_id)
        .fetch_one(&state.db_pool)
        .await?;
    let company = sqlx::query_as::<_, Company>("SELECT * FROM companies WHERE id = $1")
        .bind(quotation.company_id)
        .fetch_one(&state.db_pool)
        .await?;

    Ok(Json(PublicQuotationView {
        quote_number: quotation.quote_number,
        status: quotation.status,
        company_name: company.name,
        company_phone: company.phone,
        company_email: company.email,
        customer_name: customer.full_name,
        service_type: quotation.service_type,
        moving_date: quotation.moving_date,
        start_time: quotation.start_time,
        estimated_hours: quotation.estimated_hours,
        workers: quotation.workers,
        trucks: quotation.trucks,
        truck_size: quotation.truck_size,
        pricing_method: quotation.pricing_method,
        hourly_rate: quotation.hourly_rate,
        fixed_price: quotation.fixed_price,
        travel_cost: quotation.travel_cost,
        materials_cost: quotation.materials_cost,
        other_fees: quotation.other_fees,
        discount: quotation.discount,
        tax_tps: quotation.tax_tps,
        tax_tvq: quotation.tax_tvq,
        total: quotation.total,
        pickup_address: quotation.pickup_address,
        dropoff_address: quotation.dropoff_address,
        inventory_json: quotation.inventory_json,
        inventory_items: quotation.inventory_items,
        terms_text: quotation.terms_text,
        expires_at: quotation.expires_at,
        signed_at: quotation.signed_at,
        signed_by: quotation.signed_by,
    }))
}

fn client_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

async fn sign_quotation(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<SignRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let mut quotation = fetch_by_token(&state, &token).await?;

    // Re-submitting an already signed quotation is a success, not an error.
    if quotation.status == QuotationStatus::Signed {
        return Ok(Json(json!({ "success": true, "already_signed": true })));
    }

    expire_if_stale(&state, &mut quotation).await?;
    if quotation.status != QuotationStatus::Sent {
        return Err(AppError::BadRequest(
            "This quotation is no longer available for signing".to_string(),
        ));
    }

    if payload.signed_by.trim().is_empty() {
        return Err(AppError::BadRequest("Signer name is required".to_string()));
    }
    if !valid_signature_data(&payload.signature_data) {
        return Err(AppError::BadRequest(
            "A drawn signature is required".to_string(),
        ));
    }

    let now = Utc::now();
    let signed_ip = client_ip(&headers);

    // Signature and job creation commit together or not at all.
    let mut tx = state.db_pool.begin().await?;

    let updated = sqlx::query(
        r#"
        UPDATE quotations SET
            status = 'SIGNED', signed_by = $2, signed_at = $3,
            signature = $4, signed_ip = $5, signed_device = $6,
            updated_at = NOW()
        WHERE id = $1 AND status = 'SENT'
        "#,
    )
    .bind(quotation.id)
    .bind(payload.signed_by.trim())
    .bind(now)
    .bind(&payload.signature_data)
    .bind(&signed_ip)
    .bind(&payload.device)
    .execute(&mut *tx)
    .await?;

    if updated.rows_affected() == 0 {
        tx.rollback().await?;
        return Ok(Json(json!({ "success": true, "already_signed": true })));
    }

    let existing_job: Option<Uuid> =
        sqlx::query_scalar("SELECT id FROM jobs WHERE quotation_id = $1")
            .bind(quotation.id)
            .fetch_optional(&mut *tx)
            .await?;

    let job_id = match existing_job {
        Some(id) => id,
        None => {
            let job_number =
                sequence::next_number(&mut tx, quotation.company_id, sequence::SCOPE_JOB).await?;
            let title = format!(
                "Move #{}",
                quotation.quote_number.unwrap_or(job_number)
            );
            sqlx::query_scalar(
                r#"
                INSERT INTO jobs (company_id, quotation_id, job_number, status, title)
                VALUES ($1, $2, $3, 'PENDING', $4)
                RETURNING id
                "#,
            )
            .bind(quotation.company_id)
            .bind(quotation.id)
            .bind(job_number)
            .bind(&title)
            .fetch_one(&mut *tx)
            .await?
        }
    };

    tx.commit().await?;

    tracing::info!(
        quotation_id = %quotation.id,
        job_id = %job_id,
        "Quotation signed by {}",
        payload.signed_by.trim()
    );

    // Signed-copy PDF and confirmation email run after the fact; their
    // failure never unwinds the signature.
    let state_bg = state.clone();
    let quotation_id = quotation.id;
    tokio::spawn(async move {
        if let Err(e) = deliver_signed_copy(&state_bg, quotation_id).await {
            tracing::error!("Signed copy delivery failed for {}: {}", quotation_id, e);
        }
    });

    Ok(Json(json!({ "success": true })))
}

async fn deliver_signed_copy(state: &AppState, quotation_id: Uuid) -> ApiResult<()> {
    let quotation =
        sqlx::query_as::<_, Quotation>("SELECT * FROM quotations WHERE id = $1")
            .bind(quotation_id)
            .fetch_one(&state.db_pool)
            .await?;
    let customer = sqlx::query_as::<_, Customer>("SELECT * FROM customers WHERE id = $1")
        .bind(quotation.customer_id)
        .fetch_one(&state.db_pool)
        .await?;
    let company = sqlx::query_as::<_, Company>("SELECT * FROM companies WHERE id = $1")
        .bind(quotation.company_id)
        .fetch_one(&state.db_pool)
        .await?;

    let stored = state
        .pdf
        .store_quotation_pdf(&quotation, &customer, &company, true)
        .await
        .map_err(|e| AppError::InternalError(format!("PDF generation failed: {}", e)))?;

    sqlx::query(
        "UPDATE quotations SET sent_pdf_url = $2, pdf_generated_at = NOW() WHERE id = $1",
    )
    .bind(quotation_id)
    .bind(&stored.url)
    .execute(&state.db_pool)
    .await?;

    if let (Some(email_service), Some(customer_email)) = (&state.email, customer.email.clone()) {
        let quote_number = quotation.quote_number.unwrap_or_default();
        let template = email_templates::signed_copy_template(
            &customer.full_name,
            &company.name,
            quote_number,
        );
        email_service
            .send_email_with_pdf(
                &customer_email,
                Some(&customer.full_name),
                &template,
                &format!("quotation-{}-signed.pdf", quote_number),
                stored.bytes,
            )
            .await
            .map_err(|e| AppError::InternalError(e.to_string()))?;
    }

    Ok(())
}

async fn signing_success(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let quotation = fetch_by_token(&state, &token).await?;

    let company_name: String = sqlx::query_scalar("SELECT name FROM companies WHERE id = $1")
        .bind(quotation.company_id)
        .fetch_one(&state.db_pool)
        .await?;

    Ok(Json(json!({
        "signed": quotation.status == QuotationStatus::Signed,
        "quote_number": quotation.quote_number,
        "company_name": company_name,
        "signed_at": quotation.signed_at,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_data_validation() {
        let good = format!("data:image/png;base64,{}", "A".repeat(2000));
        assert!(valid_signature_data(&good));

        let too_short = format!("data:image/png;base64,{}", "A".repeat(100));
        assert!(!valid_signature_data(&too_short));

        let wrong_prefix = format!("data:text/plain,{}", "A".repeat(2000));
        assert!(!valid_signature_data(&wrong_prefix));
    }

    #[test]
    fn test_client_ip_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(client_ip(&headers), None);

        headers.insert("x-forwarded-for", "203.0.113.7, 10.0.0.1".parse().unwrap());
        assert_eq!(client_ip(&headers), Some("203.0.113.7".to_string()));
    }
}
