use axum::{
    extract::State,
    response::Json,
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::auth::middleware::AuthUser;
use crate::auth::policy;
use crate::error::{ApiResult, AppError};
use crate::AppState;
use haulbase_shared::{Company, CompanyPlan};

pub fn company_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(get_company).put(update_company))
        .route("/plan", get(get_plan))
}

#[derive(Debug, Deserialize)]
pub struct CompanyUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PlanResponse {
    pub plan: CompanyPlan,
}

async fn get_company(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> ApiResult<Json<Company>> {
    let company = sqlx::query_as::<_, Company>("SELECT * FROM companies WHERE id = $1")
        .bind(auth.user.company_id)
        .fetch_one(&state.db_pool)
        .await?;

    Ok(Json(company))
}

async fn update_company(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(payload): Json<CompanyUpdate>,
) -> ApiResult<Json<Company>> {
    policy::require_admin(&auth.user)?;

    if let Some(name) = &payload.name {
        if name.trim().is_empty() {
            return Err(AppError::BadRequest("Company name cannot be empty".to_string()));
        }
    }

    let company = sqlx::query_as::<_, Company>(
        r#"
        UPDATE companies SET
            name = COALESCE($2, name),
            email = COALESCE($3, email),
            phone = COALESCE($4, phone),
            address = COALESCE($5, address),
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(auth.user.company_id)
    .bind(payload.name.as_deref().map(str::trim))
    .bind(&payload.email)
    .bind(&payload.phone)
    .bind(&payload.address)
    .fetch_one(&state.db_pool)
    .await?;

    Ok(Json(company))
}

async fn get_plan(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> ApiResult<Json<PlanResponse>> {
    let plan: CompanyPlan = sqlx::query_scalar("SELECT plan FROM companies WHERE id = $1")
        .bind(auth.user.company_id)
        .fetch_one(&state.db_pool)
        .await?;

    Ok(Json(PlanResponse { plan }))
}
