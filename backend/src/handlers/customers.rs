use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::middleware::AuthUser;
use crate::auth::policy;
use crate::error::{ApiResult, AppError, ValidationBuilder};
use crate::pagination::{ListParams, PaginatedResponse};
use crate::AppState;
use haulbase_shared::{Company, Customer};

pub fn customer_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_customers).post(create_customer))
        .route(
            "/:id",
            get(get_customer).put(update_customer).delete(delete_customer),
        )
}

#[derive(Debug, Deserialize)]
pub struct CustomerCreate {
    pub full_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub pickup_address: Option<String>,
    pub dropoff_address: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CustomerUpdate {
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub pickup_address: Option<String>,
    pub dropoff_address: Option<String>,
    pub notes: Option<String>,
}

async fn list_customers(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListParams>,
    auth: AuthUser,
) -> ApiResult<Json<PaginatedResponse<Customer>>> {
    let pattern = params.search.search_pattern();

    let (customers, total) = if let Some(pattern) = pattern {
        let rows = sqlx::query_as::<_, Customer>(
            r#"
            SELECT * FROM customers
            WHERE company_id = $1
              AND (full_name ILIKE $2 OR email ILIKE $2 OR phone ILIKE $2)
            ORDER BY created_at DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(auth.user.company_id)
        .bind(&pattern)
        .bind(params.pagination.limit())
        .bind(params.pagination.offset())
        .fetch_all(&state.db_pool)
        .await?;

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM customers
            WHERE company_id = $1
              AND (full_name ILIKE $2 OR email ILIKE $2 OR phone ILIKE $2)
            "#,
        )
        .bind(auth.user.company_id)
        .bind(&pattern)
        .fetch_one(&state.db_pool)
        .await?;

        (rows, total)
    } else {
        let rows = sqlx::query_as::<_, Customer>(
            r#"
            SELECT * FROM customers
            WHERE company_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(auth.user.company_id)
        .bind(params.pagination.limit())
        .bind(params.pagination.offset())
        .fetch_all(&state.db_pool)
        .await?;

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM customers WHERE company_id = $1")
            .bind(auth.user.company_id)
            .fetch_one(&state.db_pool)
            .await?;

        (rows, total)
    };

    Ok(Json(PaginatedResponse::new(
        customers,
        &params.pagination,
        total,
    )))
}

async fn create_customer(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(payload): Json<CustomerCreate>,
) -> ApiResult<(StatusCode, Json<Customer>)> {
    policy::require_admin(&auth.user)?;

    if let Some(err) = ValidationBuilder::new()
        .require(
            !payload.full_name.trim().is_empty(),
            "full_name",
            "Customer name is required",
        )
        .build()
    {
        return Err(err);
    }

    let company = sqlx::query_as::<_, Company>("SELECT * FROM companies WHERE id = $1")
        .bind(auth.user.company_id)
        .fetch_one(&state.db_pool)
        .await?;

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM customers WHERE company_id = $1")
        .bind(auth.user.company_id)
        .fetch_one(&state.db_pool)
        .await?;

    policy::check_customer_cap(company.plan, count)?;

    let customer = sqlx::query_as::<_, Customer>(
        r#"
        INSERT INTO customers
            (company_id, full_name, email, phone, pickup_address, dropoff_address, notes)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING *
        "#,
    )
    .bind(auth.user.company_id)
    .bind(payload.full_name.trim())
    .bind(&payload.email)
    .bind(&payload.phone)
    .bind(&payload.pickup_address)
    .bind(&payload.dropoff_address)
    .bind(&payload.notes)
    .fetch_one(&state.db_pool)
    .await?;

    Ok((StatusCode::CREATED, Json(customer)))
}

async fn get_customer(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    auth: AuthUser,
) -> ApiResult<Json<Customer>> {
    let customer = sqlx::query_as::<_, Customer>(
        "SELECT * FROM customers WHERE id = $1 AND company_id = $2",
    )
    .bind(id)
    .bind(auth.user.company_id)
    .fetch_optional(&state.db_pool)
    .await?
    .ok_or_else(|| AppError::NotFound("Customer".to_string()))?;

    Ok(Json(customer))
}

async fn update_customer(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    auth: AuthUser,
    Json(payload): Json<CustomerUpdate>,
) -> ApiResult<Json<Customer>> {
    policy::require_admin(&auth.user)?;

    let customer = sqlx::query_as::<_, Customer>(
        r#"
        UPDATE customers SET
            full_name = COALESCE($3, full_name),
            email = COALESCE($4, email),
            phone = COALESCE($5, phone),
            pickup_address = COALESCE($6, pickup_address),
            dropoff_address = COALESCE($7, dropoff_address),
            notes = COALESCE($8, notes),
            updated_at = NOW()
        WHERE id = $1 AND company_id = $2
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(auth.user.company_id)
    .bind(payload.full_name.as_deref().map(str::trim))
    .bind(&payload.email)
    .bind(&payload.phone)
    .bind(&payload.pickup_address)
    .bind(&payload.dropoff_address)
    .bind(&payload.notes)
    .fetch_optional(&state.db_pool)
    .await?
    .ok_or_else(|| AppError::NotFound("Customer".to_string()))?;

    Ok(Json(customer))
}

async fn delete_customer(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    auth: AuthUser,
) -> ApiResult<StatusCode> {
    policy::require_admin(&auth.user)?;

    let result = sqlx::query("DELETE FROM customers WHERE id = $1 AND company_id = $2")
        .bind(id)
        .bind(auth.user.company_id)
        .execute(&state.db_pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Customer".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}
