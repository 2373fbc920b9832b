//! Quotation lifecycle: IN_PROGRESS -> DRAFT -> SENT -> {SIGNED | EXPIRED},
//! with archive, duplicate, and renew side paths. Signing itself lives in
//! the public handlers; everything here runs under a company JWT.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::middleware::AuthUser;
use crate::auth::policy;
use crate::error::{ApiResult, AppError, ValidationBuilder};
use crate::services::{email as email_templates, sequence};
use crate::AppState;
use haulbase_shared::{Company, Customer, PricingMethod, Quotation, QuotationStatus};

pub fn quotation_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_quotations).post(create_quotation))
        .route(
            "/:id",
            get(get_quotation).put(update_quotation).delete(delete_quotation),
        )
        .route("/:id/draft", post(save_draft))
        .route("/:id/send", post(send_quotation))
        .route("/:id/duplicate", post(duplicate_quotation))
        .route("/:id/renew", post(renew_quotation))
        .route("/:id/reminder", post(send_reminder))
        .route("/:id/archive", post(archive_quotation))
}

/// Derive the concrete scheduling window from the quotation's day-precision
/// inputs. All three pieces must be present and the duration positive;
/// otherwise the window stays unset.
pub fn derive_schedule(
    moving_date: Option<NaiveDate>,
    start_time: Option<&str>,
    estimated_hours: Option<Decimal>,
) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let date = moving_date?;
    let time = start_time?;
    let hours = estimated_hours?;

    if hours <= Decimal::ZERO {
        return None;
    }

    let mut parts = time.split(':');
    let hour: u32 = parts.next()?.parse().ok()?;
    let minute: u32 = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }

    let start_naive = date.and_hms_opt(hour, minute, 0)?;
    let start_at = DateTime::<Utc>::from_naive_utc_and_offset(start_naive, Utc);

    let seconds = (hours * Decimal::from(3600)).to_i64()?;
    let end_at = start_at + Duration::seconds(seconds);

    Some((start_at, end_at))
}

/// Total item count implied by an inventory snapshot: sums `quantity`
/// fields, descending into `items` arrays for room-grouped snapshots.
pub fn inventory_item_count(inventory: &serde_json::Value) -> Option<i32> {
    let entries = inventory.as_array()?;
    let mut total: i64 = 0;

    for entry in entries {
        if let Some(items) = entry.get("items").and_then(|v| v.as_array()) {
            for item in items {
                total += item.get("quantity").and_then(|q| q.as_i64()).unwrap_or(0);
            }
        } else {
            total += entry.get("quantity").and_then(|q| q.as_i64()).unwrap_or(0);
        }
    }

    Some(total as i32)
}

/// A reminder may go out at most once per 24 hours.
pub fn reminder_allowed(last_reminder_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    match last_reminder_at {
        None => true,
        Some(last) => now - last >= Duration::hours(24),
    }
}

#[derive(Debug, Deserialize)]
pub struct QuotationCreate {
    pub customer_id: Uuid,
    pub service_type: Option<String>,
    pub moving_date: Option<NaiveDate>,
    pub start_time: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct QuotationUpdate {
    pub service_type: Option<String>,
    pub moving_date: Option<NaiveDate>,
    pub start_time: Option<String>,
    pub estimated_hours: Option<Decimal>,
    pub workers: Option<i32>,
    pub trucks: Option<i32>,
    pub truck_size: Option<String>,
    pub pricing_method: Option<PricingMethod>,
    pub hourly_rate: Option<Decimal>,
    pub fixed_price: Option<Decimal>,
    pub travel_cost: Option<Decimal>,
    pub materials_cost: Option<Decimal>,
    pub other_fees: Option<Decimal>,
    pub discount: Option<Decimal>,
    pub tax_tps: Option<Decimal>,
    pub tax_tvq: Option<Decimal>,
    pub total: Option<Decimal>,
    pub estimated_volume_cft: Option<Decimal>,
    pub estimated_weight_lbs: Option<Decimal>,
    pub inventory_json: Option<serde_json::Value>,
    pub inventory_items: Option<i32>,
    pub inventory_notes: Option<String>,
    pub pickup_address: Option<String>,
    pub pickup_unit: Option<String>,
    pub pickup_floor: Option<i32>,
    pub pickup_elevator: Option<bool>,
    pub pickup_loading_dock: Option<bool>,
    pub pickup_access_notes: Option<String>,
    pub dropoff_address: Option<String>,
    pub dropoff_unit: Option<String>,
    pub dropoff_floor: Option<i32>,
    pub dropoff_elevator: Option<bool>,
    pub dropoff_loading_dock: Option<bool>,
    pub dropoff_access_notes: Option<String>,
    pub terms_text: Option<String>,
    pub internal_notes: Option<String>,
    pub notes: Option<String>,
    pub validity_days: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct SendQuotationRequest {
    pub validity_days: Option<i32>,
}

#[derive(Debug, Serialize)]
pub struct SendQuotationResponse {
    pub success: bool,
    pub quote_number: i32,
    pub link: String,
    pub expires_at: DateTime<Utc>,
    pub pdf_url: String,
}

/// List row: quotation joined with the customer's contact fields.
#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct QuotationListItem {
    pub id: Uuid,
    pub quote_number: Option<i32>,
    pub status: QuotationStatus,
    pub service_type: Option<String>,
    pub moving_date: Option<NaiveDate>,
    pub start_at: Option<DateTime<Utc>>,
    pub total: Decimal,
    pub customer_name: String,
    pub customer_phone: Option<String>,
    pub pickup_address: Option<String>,
    pub dropoff_address: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct QuotationDetail {
    #[serde(flatten)]
    pub quotation: Quotation,
    pub customer: Customer,
    pub created_by_name: String,
}

async fn fetch_owned_quotation(
    state: &AppState,
    id: Uuid,
    company_id: Uuid,
) -> ApiResult<Quotation> {
    sqlx::query_as::<_, Quotation>(
        "SELECT * FROM quotations WHERE id = $1 AND company_id = $2",
    )
    .bind(id)
    .bind(company_id)
    .fetch_optional(&state.db_pool)
    .await?
    .ok_or_else(|| AppError::NotFound("Quotation".to_string()))
}

async fn create_quotation(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(payload): Json<QuotationCreate>,
) -> ApiResult<(StatusCode, Json<Quotation>)> {
    policy::require_admin(&auth.user)?;

    // Customer must belong to the caller's company.
    let customer: Option<Uuid> =
        sqlx::query_scalar("SELECT id FROM customers WHERE id = $1 AND company_id = $2")
            .bind(payload.customer_id)
            .bind(auth.user.company_id)
            .fetch_optional(&state.db_pool)
            .await?;
    if customer.is_none() {
        return Err(AppError::NotFound("Customer".to_string()));
    }

    let quotation = sqlx::query_as::<_, Quotation>(
        r#"
        INSERT INTO quotations
            (company_id, customer_id, created_by, status, service_type,
             moving_date, start_time, workers, trucks, pricing_method, total)
        VALUES ($1, $2, $3, 'IN_PROGRESS', $4, $5, $6, 1, 1, 'HOURLY', 0)
        RETURNING *
        "#,
    )
    .bind(auth.user.company_id)
    .bind(payload.customer_id)
    .bind(auth.user.id)
    .bind(&payload.service_type)
    .bind(payload.moving_date)
    .bind(&payload.start_time)
    .fetch_one(&state.db_pool)
    .await?;

    Ok((StatusCode::CREATED, Json(quotation)))
}

async fn list_quotations(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> ApiResult<Json<Vec<QuotationListItem>>> {
    let rows = sqlx::query_as::<_, QuotationListItem>(
        r#"
        SELECT q.id, q.quote_number, q.status, q.service_type, q.moving_date,
               q.start_at, q.total,
               c.full_name AS customer_name, c.phone AS customer_phone,
               q.pickup_address, q.dropoff_address,
               q.created_at, q.updated_at
        FROM quotations q
        JOIN customers c ON c.id = q.customer_id
        WHERE q.company_id = $1
          AND q.status IN ('DRAFT', 'SENT', 'SIGNED', 'REJECTED', 'EXPIRED')
        ORDER BY COALESCE(q.updated_at, q.created_at) DESC
        "#,
    )
    .bind(auth.user.company_id)
    .fetch_all(&state.db_pool)
    .await?;

    Ok(Json(rows))
}

async fn get_quotation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    auth: AuthUser,
) -> ApiResult<Json<QuotationDetail>> {
    let quotation = fetch_owned_quotation(&state, id, auth.user.company_id).await?;

    let customer = sqlx::query_as::<_, Customer>("SELECT * FROM customers WHERE id = $1")
        .bind(quotation.customer_id)
        .fetch_one(&state.db_pool)
        .await?;

    let created_by_name: String = sqlx::query_scalar("SELECT full_name FROM users WHERE id = $1")
        .bind(quotation.created_by)
        .fetch_optional(&state.db_pool)
        .await?
        .unwrap_or_default();

    Ok(Json(QuotationDetail {
        quotation,
        customer,
        created_by_name,
    }))
}

async fn update_quotation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    auth: AuthUser,
    Json(payload): Json<QuotationUpdate>,
) -> ApiResult<Json<Quotation>> {
    policy::require_admin(&auth.user)?;

    let existing = fetch_owned_quotation(&state, id, auth.user.company_id).await?;
    if !existing.status.is_editable() {
        return Err(AppError::BadRequest(format!(
            "Quotation can no longer be edited in status {:?}",
            existing.status
        )));
    }

    // Merge submitted fields over the stored row, then recompute the window
    // from the effective values.
    let moving_date = payload.moving_date.or(existing.moving_date);
    let start_time = payload.start_time.clone().or(existing.start_time.clone());
    let estimated_hours = payload.estimated_hours.or(existing.estimated_hours);

    let (start_at, end_at) =
        match derive_schedule(moving_date, start_time.as_deref(), estimated_hours) {
            Some((s, e)) => (Some(s), Some(e)),
            None => (existing.start_at, existing.end_at),
        };

    let inventory_json = payload.inventory_json.clone().or(existing.inventory_json.clone());
    let inventory_items = payload
        .inventory_items
        .or_else(|| {
            payload
                .inventory_json
                .as_ref()
                .and_then(inventory_item_count)
        })
        .or(existing.inventory_items);

    let quotation = sqlx::query_as::<_, Quotation>(
        r#"
        UPDATE quotations SET
            service_type = $3, moving_date = $4, start_time = $5,
            estimated_hours = $6, start_at = $7, end_at = $8,
            workers = $9, trucks = $10, truck_size = $11,
            pricing_method = $12, hourly_rate = $13, fixed_price = $14,
            travel_cost = $15, materials_cost = $16, other_fees = $17,
            discount = $18, tax_tps = $19, tax_tvq = $20, total = $21,
            estimated_volume_cft = $22, estimated_weight_lbs = $23,
            inventory_json = $24, inventory_items = $25, inventory_notes = $26,
            pickup_address = $27, pickup_unit = $28, pickup_floor = $29,
            pickup_elevator = $30, pickup_loading_dock = $31, pickup_access_notes = $32,
            dropoff_address = $33, dropoff_unit = $34, dropoff_floor = $35,
            dropoff_elevator = $36, dropoff_loading_dock = $37, dropoff_access_notes = $38,
            terms_text = $39, internal_notes = $40, notes = $41, validity_days = $42,
            updated_at = NOW()
        WHERE id = $1 AND company_id = $2
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(auth.user.company_id)
    .bind(payload.service_type.or(existing.service_type))
    .bind(moving_date)
    .bind(start_time)
    .bind(estimated_hours)
    .bind(start_at)
    .bind(end_at)
    .bind(payload.workers.unwrap_or(existing.workers))
    .bind(payload.trucks.unwrap_or(existing.trucks))
    .bind(payload.truck_size.or(existing.truck_size))
    .bind(payload.pricing_method.unwrap_or(existing.pricing_method))
    .bind(payload.hourly_rate.or(existing.hourly_rate))
    .bind(payload.fixed_price.or(existing.fixed_price))
    .bind(payload.travel_cost.or(existing.travel_cost))
    .bind(payload.materials_cost.or(existing.materials_cost))
    .bind(payload.other_fees.or(existing.other_fees))
    .bind(payload.discount.or(existing.discount))
    .bind(payload.tax_tps.or(existing.tax_tps))
    .bind(payload.tax_tvq.or(existing.tax_tvq))
    .bind(payload.total.unwrap_or(existing.total))
    .bind(payload.estimated_volume_cft.or(existing.estimated_volume_cft))
    .bind(payload.estimated_weight_lbs.or(existing.estimated_weight_lbs))
    .bind(inventory_json)
    .bind(inventory_items)
    .bind(payload.inventory_notes.or(existing.inventory_notes))
    .bind(payload.pickup_address.or(existing.pickup_address))
    .bind(payload.pickup_unit.or(existing.pickup_unit))
    .bind(payload.pickup_floor.or(existing.pickup_floor))
    .bind(payload.pickup_elevator.or(existing.pickup_elevator))
    .bind(payload.pickup_loading_dock.or(existing.pickup_loading_dock))
    .bind(payload.pickup_access_notes.or(existing.pickup_access_notes))
    .bind(payload.dropoff_address.or(existing.dropoff_address))
    .bind(payload.dropoff_unit.or(existing.dropoff_unit))
    .bind(payload.dropoff_floor.or(existing.dropoff_floor))
    .bind(payload.dropoff_elevator.or(existing.dropoff_elevator))
    .bind(payload.dropoff_loading_dock.or(existing.dropoff_loading_dock))
    .bind(payload.dropoff_access_notes.or(existing.dropoff_access_notes))
    .bind(payload.terms_text.or(existing.terms_text))
    .bind(payload.internal_notes.or(existing.internal_notes))
    .bind(payload.notes.or(existing.notes))
    .bind(payload.validity_days.or(existing.validity_days))
    .fetch_one(&state.db_pool)
    .await?;

    Ok(Json(quotation))
}

/// Assign the quote number (once) inside a transaction and return it.
async fn ensure_quote_number(
    state: &AppState,
    quotation: &Quotation,
) -> ApiResult<i32> {
    if let Some(number) = quotation.quote_number {
        return Ok(number);
    }

    let mut tx = state.db_pool.begin().await?;
    let number = sequence::next_number(&mut tx, quotation.company_id, sequence::SCOPE_QUOTE).await?;

    // The WHERE guard keeps a concurrent assignment from being overwritten.
    let updated = sqlx::query(
        "UPDATE quotations SET quote_number = $2 WHERE id = $1 AND quote_number IS NULL",
    )
    .bind(quotation.id)
    .bind(number)
    .execute(&mut *tx)
    .await?;

    if updated.rows_affected() == 0 {
        tx.rollback().await?;
        let current: Option<i32> =
            sqlx::query_scalar("SELECT quote_number FROM quotations WHERE id = $1")
                .bind(quotation.id)
                .fetch_one(&state.db_pool)
                .await?;
        return current.ok_or_else(|| {
            AppError::InternalError("Quote number assignment raced and lost".to_string())
        });
    }

    tx.commit().await?;
    Ok(number)
}

async fn save_draft(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    auth: AuthUser,
) -> ApiResult<Json<Quotation>> {
    policy::require_admin(&auth.user)?;

    let quotation = fetch_owned_quotation(&state, id, auth.user.company_id).await?;
    if quotation.status != QuotationStatus::InProgress {
        return Err(AppError::BadRequest(
            "Only an in-progress quotation can be saved as a draft".to_string(),
        ));
    }

    ensure_quote_number(&state, &quotation).await?;

    let quotation = sqlx::query_as::<_, Quotation>(
        "UPDATE quotations SET status = 'DRAFT', updated_at = NOW() WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .fetch_one(&state.db_pool)
    .await?;

    Ok(Json(quotation))
}

async fn send_quotation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    auth: AuthUser,
    Json(payload): Json<SendQuotationRequest>,
) -> ApiResult<Json<SendQuotationResponse>> {
    policy::require_admin(&auth.user)?;

    let quotation = fetch_owned_quotation(&state, id, auth.user.company_id).await?;
    if !quotation.status.is_editable() {
        return Err(AppError::BadRequest(format!(
            "Quotation cannot be sent in status {:?}",
            quotation.status
        )));
    }

    let validity_days = payload.validity_days.or(quotation.validity_days);

    if let Some(err) = ValidationBuilder::new()
        .require(
            validity_days.map_or(false, |d| d > 0),
            "validity_days",
            "Validity period is required before sending",
        )
        .require(
            quotation.start_at.is_some() && quotation.end_at.is_some(),
            "moving_date",
            "Moving date, start time, and estimated duration are required before sending",
        )
        .build()
    {
        return Err(err);
    }
    let validity_days = validity_days.unwrap_or_default();

    let quote_number = ensure_quote_number(&state, &quotation).await?;

    let customer = sqlx::query_as::<_, Customer>("SELECT * FROM customers WHERE id = $1")
        .bind(quotation.customer_id)
        .fetch_one(&state.db_pool)
        .await?;
    let company = sqlx::query_as::<_, Company>("SELECT * FROM companies WHERE id = $1")
        .bind(auth.user.company_id)
        .fetch_one(&state.db_pool)
        .await?;

    // Every send gets a fresh token; old links die with it.
    let public_token = Uuid::new_v4().to_string();
    let now = Utc::now();
    let expires_at = now + Duration::days(validity_days as i64);

    let mut for_pdf = quotation.clone();
    for_pdf.quote_number = Some(quote_number);
    let stored = state
        .pdf
        .store_quotation_pdf(&for_pdf, &customer, &company, false)
        .await
        .map_err(|e| AppError::InternalError(format!("PDF generation failed: {}", e)))?;

    sqlx::query(
        r#"
        UPDATE quotations SET
            status = 'SENT', public_token = $2, sent_at = $3, expires_at = $4,
            sent_pdf_url = $5, pdf_generated_at = $3, validity_days = $6,
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(&public_token)
    .bind(now)
    .bind(expires_at)
    .bind(&stored.url)
    .bind(validity_days)
    .execute(&state.db_pool)
    .await?;

    let link = state.config.public_quotation_url(&public_token);

    // Email delivery is best-effort; the quotation is already SENT.
    if let (Some(email_service), Some(customer_email)) = (&state.email, customer.email.clone()) {
        let email_service = email_service.clone();
        let customer_name = customer.full_name.clone();
        let company_name = company.name.clone();
        let link = link.clone();
        let expires_label = expires_at.format("%Y-%m-%d").to_string();
        let pdf_bytes = stored.bytes.clone();
        tokio::spawn(async move {
            let template = email_templates::quotation_template(
                &customer_name,
                &company_name,
                quote_number,
                &link,
                &expires_label,
            );
            if let Err(e) = email_service
                .send_email_with_pdf(
                    &customer_email,
                    Some(&customer_name),
                    &template,
                    &format!("quotation-{}.pdf", quote_number),
                    pdf_bytes,
                )
                .await
            {
                tracing::error!("Failed to email quotation #{}: {}", quote_number, e);
            }
        });
    }

    Ok(Json(SendQuotationResponse {
        success: true,
        quote_number,
        link,
        expires_at,
        pdf_url: stored.url,
    }))
}

/// Copy the descriptive, pricing, inventory, and access fields into a fresh
/// IN_PROGRESS row. Send and signature state never travels.
async fn copy_quotation(
    state: &AppState,
    source: &Quotation,
    created_by: Uuid,
    copy_validity: bool,
) -> ApiResult<Quotation> {
    let quotation = sqlx::query_as::<_, Quotation>(
        r#"
        INSERT INTO quotations
            (company_id, customer_id, created_by, status,
             service_type, moving_date, start_time, estimated_hours, start_at, end_at,
             workers, trucks, truck_size, pricing_method, hourly_rate, fixed_price,
             travel_cost, materials_cost, other_fees, discount, tax_tps, tax_tvq, total,
             estimated_volume_cft, estimated_weight_lbs, inventory_json, inventory_items,
             inventory_notes,
             pickup_address, pickup_unit, pickup_floor, pickup_elevator,
             pickup_loading_dock, pickup_access_notes,
             dropoff_address, dropoff_unit, dropoff_floor, dropoff_elevator,
             dropoff_loading_dock, dropoff_access_notes,
             terms_text, internal_notes, notes, validity_days)
        VALUES ($1, $2, $3, 'IN_PROGRESS',
                $4, $5, $6, $7, $8, $9,
                $10, $11, $12, $13, $14, $15,
                $16, $17, $18, $19, $20, $21, $22,
                $23, $24, $25, $26, $27,
                $28, $29, $30, $31, $32, $33,
                $34, $35, $36, $37, $38, $39,
                $40, $41, $42, $43)
        RETURNING *
        "#,
    )
    .bind(source.company_id)
    .bind(source.customer_id)
    .bind(created_by)
    .bind(&source.service_type)
    .bind(source.moving_date)
    .bind(&source.start_time)
    .bind(source.estimated_hours)
    .bind(source.start_at)
    .bind(source.end_at)
    .bind(source.workers)
    .bind(source.trucks)
    .bind(&source.truck_size)
    .bind(source.pricing_method)
    .bind(source.hourly_rate)
    .bind(source.fixed_price)
    .bind(source.travel_cost)
    .bind(source.materials_cost)
    .bind(source.other_fees)
    .bind(source.discount)
    .bind(source.tax_tps)
    .bind(source.tax_tvq)
    .bind(source.total)
    .bind(source.estimated_volume_cft)
    .bind(source.estimated_weight_lbs)
    .bind(&source.inventory_json)
    .bind(source.inventory_items)
    .bind(&source.inventory_notes)
    .bind(&source.pickup_address)
    .bind(&source.pickup_unit)
    .bind(source.pickup_floor)
    .bind(source.pickup_elevator)
    .bind(source.pickup_loading_dock)
    .bind(&source.pickup_access_notes)
    .bind(&source.dropoff_address)
    .bind(&source.dropoff_unit)
    .bind(source.dropoff_floor)
    .bind(source.dropoff_elevator)
    .bind(source.dropoff_loading_dock)
    .bind(&source.dropoff_access_notes)
    .bind(&source.terms_text)
    .bind(&source.internal_notes)
    .bind(&source.notes)
    .bind(if copy_validity { source.validity_days } else { None })
    .fetch_one(&state.db_pool)
    .await?;

    Ok(quotation)
}

async fn duplicate_quotation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    auth: AuthUser,
) -> ApiResult<(StatusCode, Json<Quotation>)> {
    policy::require_admin(&auth.user)?;

    let source = fetch_owned_quotation(&state, id, auth.user.company_id).await?;
    let copy = copy_quotation(&state, &source, auth.user.id, false).await?;

    Ok((StatusCode::CREATED, Json(copy)))
}

async fn renew_quotation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    auth: AuthUser,
) -> ApiResult<(StatusCode, Json<Quotation>)> {
    policy::require_admin(&auth.user)?;

    let source = fetch_owned_quotation(&state, id, auth.user.company_id).await?;
    if source.status != QuotationStatus::Expired {
        return Err(AppError::BadRequest(
            "Only an expired quotation can be renewed".to_string(),
        ));
    }

    let copy = copy_quotation(&state, &source, auth.user.id, true).await?;

    Ok((StatusCode::CREATED, Json(copy)))
}

async fn send_reminder(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    auth: AuthUser,
) -> ApiResult<Json<serde_json::Value>> {
    policy::require_admin(&auth.user)?;

    let quotation = fetch_owned_quotation(&state, id, auth.user.company_id).await?;
    if quotation.status != QuotationStatus::Sent {
        return Err(AppError::BadRequest(
            "Reminders only apply to sent quotations".to_string(),
        ));
    }

    let company = sqlx::query_as::<_, Company>("SELECT * FROM companies WHERE id = $1")
        .bind(auth.user.company_id)
        .fetch_one(&state.db_pool)
        .await?;

    policy::require_pro_plan(
        company.plan,
        "UPGRADE_REQUIRED_REMINDERS",
        "Quotation reminders require the Pro plan",
    )?;

    let now = Utc::now();
    if !reminder_allowed(quotation.last_reminder_at, now) {
        return Err(AppError::BadRequest(
            "A reminder was already sent in the last 24 hours".to_string(),
        ));
    }

    let customer = sqlx::query_as::<_, Customer>("SELECT * FROM customers WHERE id = $1")
        .bind(quotation.customer_id)
        .fetch_one(&state.db_pool)
        .await?;

    let quote_number = quotation.quote_number.unwrap_or_default();
    let link = quotation
        .public_token
        .as_deref()
        .map(|t| state.config.public_quotation_url(t))
        .unwrap_or_default();

    if let (Some(email_service), Some(customer_email)) = (&state.email, customer.email.clone()) {
        let email_service = email_service.clone();
        let customer_name = customer.full_name.clone();
        let company_name = company.name.clone();
        let link = link.clone();
        tokio::spawn(async move {
            let template = email_templates::quotation_reminder_template(
                &customer_name,
                &company_name,
                quote_number,
                &link,
            );
            if let Err(e) = email_service
                .send_email(&customer_email, Some(&customer_name), &template)
                .await
            {
                tracing::error!("Failed to email reminder for quotation #{}: {}", quote_number, e);
            }
        });
    }

    if let Some(phone) = customer.phone.clone() {
        let sms = state.sms.clone();
        let company_name = company.name.clone();
        tokio::spawn(async move {
            sms.send(
                &phone,
                &format!(
                    "Reminder from {}: your moving quotation #{} is awaiting your signature. {}",
                    company_name, quote_number, link
                ),
            )
            .await;
        });
    }

    sqlx::query("UPDATE quotations SET last_reminder_at = $2, updated_at = NOW() WHERE id = $1")
        .bind(id)
        .bind(now)
        .execute(&state.db_pool)
        .await?;

    Ok(Json(json!({ "success": true, "message": "Reminder sent" })))
}

async fn archive_quotation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    auth: AuthUser,
) -> ApiResult<Json<Quotation>> {
    policy::require_admin(&auth.user)?;

    let quotation = fetch_owned_quotation(&state, id, auth.user.company_id).await?;
    if quotation.status == QuotationStatus::Signed {
        return Err(AppError::BadRequest(
            "A signed quotation cannot be archived".to_string(),
        ));
    }

    let quotation = sqlx::query_as::<_, Quotation>(
        "UPDATE quotations SET status = 'ARCHIVED', updated_at = NOW() WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .fetch_one(&state.db_pool)
    .await?;

    Ok(Json(quotation))
}

async fn delete_quotation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    auth: AuthUser,
) -> ApiResult<StatusCode> {
    policy::require_admin(&auth.user)?;

    let quotation = fetch_owned_quotation(&state, id, auth.user.company_id).await?;
    if matches!(
        quotation.status,
        QuotationStatus::Sent | QuotationStatus::Signed
    ) {
        return Err(AppError::BadRequest(
            "Sent and signed quotations cannot be deleted".to_string(),
        ));
    }

    sqlx::query("DELETE FROM quotations WHERE id = $1")
        .bind(id)
        .execute(&state.db_pool)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_derive_schedule_basic() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        let (start, end) =
            derive_schedule(Some(date), Some("09:00"), Some(Decimal::from(3))).unwrap();

        assert_eq!(start, Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap());
    }

    #[test]
    fn test_derive_schedule_fractional_hours() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        let hours = Decimal::new(25, 1); // 2.5
        let (start, end) = derive_schedule(Some(date), Some("10:30"), Some(hours)).unwrap();

        assert_eq!(start, Utc.with_ymd_and_hms(2025, 3, 1, 10, 30, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2025, 3, 1, 13, 0, 0).unwrap());
    }

    #[test]
    fn test_derive_schedule_requires_all_inputs() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        assert!(derive_schedule(None, Some("09:00"), Some(Decimal::ONE)).is_none());
        assert!(derive_schedule(Some(date), None, Some(Decimal::ONE)).is_none());
        assert!(derive_schedule(Some(date), Some("09:00"), None).is_none());
        assert!(derive_schedule(Some(date), Some("09:00"), Some(Decimal::ZERO)).is_none());
        assert!(derive_schedule(Some(date), Some("09:00"), Some(Decimal::from(-2))).is_none());
    }

    #[test]
    fn test_derive_schedule_rejects_malformed_time() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        assert!(derive_schedule(Some(date), Some("9"), Some(Decimal::ONE)).is_none());
        assert!(derive_schedule(Some(date), Some("25:00"), Some(Decimal::ONE)).is_none());
        assert!(derive_schedule(Some(date), Some("09:61"), Some(Decimal::ONE)).is_none());
        assert!(derive_schedule(Some(date), Some("09:00:00"), Some(Decimal::ONE)).is_none());
    }

    #[test]
    fn test_inventory_item_count_flat_list() {
        let inventory = serde_json::json!([
            {"name": "Sofa", "quantity": 2},
            {"name": "Box", "quantity": 10},
        ]);
        assert_eq!(inventory_item_count(&inventory), Some(12));
    }

    #[test]
    fn test_inventory_item_count_room_groups() {
        let inventory = serde_json::json!([
            {"room": "Living room", "items": [{"name": "Sofa", "quantity": 1}, {"name": "TV", "quantity": 2}]},
            {"room": "Kitchen", "items": [{"name": "Table", "quantity": 1}]},
        ]);
        assert_eq!(inventory_item_count(&inventory), Some(4));
    }

    #[test]
    fn test_reminder_throttle() {
        let now = Utc.with_ymd_and_hms(2025, 3, 2, 12, 0, 0).unwrap();
        assert!(reminder_allowed(None, now));
        assert!(reminder_allowed(Some(now - Duration::hours(25)), now));
        assert!(reminder_allowed(Some(now - Duration::hours(24)), now));
        assert!(!reminder_allowed(Some(now - Duration::hours(23)), now));
        assert!(!reminder_allowed(Some(now - Duration::minutes(5)), now));
    }
}
