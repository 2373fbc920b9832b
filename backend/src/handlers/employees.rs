//! Employee management and the public onboarding flow.
//!
//! Creating an employee makes two rows in one transaction: a user login
//! (role EMPLOYEE, throwaway password) and the employee record (PENDING,
//! SIN encrypted at rest). The confirmation email carries a single-use
//! token; following it activates the record and mints a short-lived
//! password token for the set-password step.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::{Duration, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::middleware::AuthUser;
use crate::auth::policy;
use crate::error::{ApiResult, AppError, ValidationBuilder};
use crate::handlers::auth::valid_email;
use crate::services::email as email_templates;
use crate::AppState;
use haulbase_shared::{Employee, EmployeeStatus};

pub fn employee_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_employees).post(create_employee))
        .route(
            "/:id",
            get(get_employee).put(update_employee).delete(delete_employee),
        )
        .route("/:id/resend-confirmation", post(resend_confirmation))
}

/// Token-authenticated onboarding endpoints, mounted outside /api/v1.
pub fn employee_public_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/confirm/:token", get(confirm_employee))
        .route("/set-password/:token", post(set_password))
}

#[derive(Debug, Deserialize)]
pub struct EmployeeCreate {
    pub full_name: String,
    pub email: String,
    pub position: Option<String>,
    pub phone: Option<String>,
    pub hourly_rate: Option<Decimal>,
    pub sin: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EmployeeUpdate {
    pub full_name: Option<String>,
    pub position: Option<String>,
    pub phone: Option<String>,
    pub hourly_rate: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
pub struct SetPasswordRequest {
    pub password: String,
}

/// Employee row joined with its login for list/detail views.
#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct EmployeeView {
    pub id: Uuid,
    pub user_id: Uuid,
    pub full_name: String,
    pub email: String,
    pub status: EmployeeStatus,
    pub position: Option<String>,
    pub phone: Option<String>,
    pub hourly_rate: Option<Decimal>,
    pub created_at: chrono::DateTime<Utc>,
}

const EMPLOYEE_VIEW_SQL: &str = r#"
    SELECT e.id, e.user_id, u.full_name, u.email, e.status,
           e.position, e.phone, e.hourly_rate, e.created_at
    FROM employees e
    JOIN users u ON u.id = e.user_id
"#;

fn random_token(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// At least 8 characters with an uppercase letter, a lowercase letter, and a digit.
pub fn password_strong_enough(password: &str) -> bool {
    password.len() >= 8
        && password.chars().any(|c| c.is_ascii_uppercase())
        && password.chars().any(|c| c.is_ascii_lowercase())
        && password.chars().any(|c| c.is_ascii_digit())
}

async fn list_employees(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> ApiResult<Json<Vec<EmployeeView>>> {
    let sql = format!("{} WHERE e.company_id = $1 ORDER BY u.full_name", EMPLOYEE_VIEW_SQL);

    let employees = sqlx::query_as::<_, EmployeeView>(&sql)
        .bind(auth.user.company_id)
        .fetch_all(&state.db_pool)
        .await?;

    Ok(Json(employees))
}

async fn create_employee(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(payload): Json<EmployeeCreate>,
) -> ApiResult<(StatusCode, Json<EmployeeView>)> {
    policy::require_admin(&auth.user)?;

    let email = payload.email.trim().to_lowercase();

    if let Some(err) = ValidationBuilder::new()
        .require(
            !payload.full_name.trim().is_empty(),
            "full_name",
            "Full name is required",
        )
        .require(valid_email(&email), "email", "A valid email is required")
        .build()
    {
        return Err(err);
    }

    let taken: Option<Uuid> = sqlx::query_scalar("SELECT id FROM users WHERE email = $1")
        .bind(&email)
        .fetch_optional(&state.db_pool)
        .await?;
    if taken.is_some() {
        return Err(AppError::Conflict(
            "An account with this email already exists".to_string(),
        ));
    }

    let sin_encrypted = match &payload.sin {
        Some(sin) if !sin.trim().is_empty() => Some(
            state
                .encryption
                .encrypt(sin.trim())
                .map_err(|e| AppError::InternalError(e.to_string()))?,
        ),
        _ => None,
    };

    // The login cannot be used until the employee confirms and sets their
    // own password.
    let temp_password = random_token(32);
    let password_hash = bcrypt::hash(&temp_password, bcrypt::DEFAULT_COST)?;
    let confirmation_token = random_token(48);

    let mut tx = state.db_pool.begin().await?;

    let user_id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO users (company_id, email, password_hash, full_name, role)
        VALUES ($1, $2, $3, $4, 'EMPLOYEE')
        RETURNING id
        "#,
    )
    .bind(auth.user.company_id)
    .bind(&email)
    .bind(&password_hash)
    .bind(payload.full_name.trim())
    .fetch_one(&mut *tx)
    .await?;

    let employee_id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO employees
            (company_id, user_id, status, position, phone, hourly_rate,
             sin_encrypted, confirmation_token)
        VALUES ($1, $2, 'PENDING', $3, $4, $5, $6, $7)
        RETURNING id
        "#,
    )
    .bind(auth.user.company_id)
    .bind(user_id)
    .bind(&payload.position)
    .bind(&payload.phone)
    .bind(payload.hourly_rate)
    .bind(&sin_encrypted)
    .bind(&confirmation_token)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    send_confirmation_email(&state, &email, payload.full_name.trim(), &confirmation_token).await;

    let sql = format!("{} WHERE e.id = $1", EMPLOYEE_VIEW_SQL);
    let view = sqlx::query_as::<_, EmployeeView>(&sql)
        .bind(employee_id)
        .fetch_one(&state.db_pool)
        .await?;

    Ok((StatusCode::CREATED, Json(view)))
}

async fn send_confirmation_email(state: &AppState, email: &str, name: &str, token: &str) {
    let Some(email_service) = &state.email else {
        tracing::warn!("SMTP not configured, confirmation email not sent to {}", email);
        return;
    };

    let company_name: String =
        sqlx::query_scalar("SELECT name FROM companies WHERE id = (SELECT company_id FROM users WHERE email = $1)")
            .bind(email)
            .fetch_optional(&state.db_pool)
            .await
            .ok()
            .flatten()
            .unwrap_or_else(|| "your company".to_string());

    let url = state.config.employee_confirm_url(token);
    let template = email_templates::employee_invite_template(name, &company_name, &url);

    if let Err(e) = email_service.send_email(email, Some(name), &template).await {
        tracing::error!("Failed to send confirmation email to {}: {}", email, e);
    }
}

async fn get_employee(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    auth: AuthUser,
) -> ApiResult<Json<EmployeeView>> {
    let sql = format!("{} WHERE e.id = $1 AND e.company_id = $2", EMPLOYEE_VIEW_SQL);

    let employee = sqlx::query_as::<_, EmployeeView>(&sql)
        .bind(id)
        .bind(auth.user.company_id)
        .fetch_optional(&state.db_pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Employee".to_string()))?;

    Ok(Json(employee))
}

async fn update_employee(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    auth: AuthUser,
    Json(payload): Json<EmployeeUpdate>,
) -> ApiResult<Json<EmployeeView>> {
    policy::require_admin(&auth.user)?;

    let employee = sqlx::query_as::<_, Employee>(
        "SELECT * FROM employees WHERE id = $1 AND company_id = $2",
    )
    .bind(id)
    .bind(auth.user.company_id)
    .fetch_optional(&state.db_pool)
    .await?
    .ok_or_else(|| AppError::NotFound("Employee".to_string()))?;

    if employee.status != EmployeeStatus::Active {
        return Err(AppError::BadRequest(
            "Employee must confirm their account before edits".to_string(),
        ));
    }

    let mut tx = state.db_pool.begin().await?;

    sqlx::query(
        r#"
        UPDATE employees SET
            position = COALESCE($2, position),
            phone = COALESCE($3, phone),
            hourly_rate = COALESCE($4, hourly_rate),
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(&payload.position)
    .bind(&payload.phone)
    .bind(payload.hourly_rate)
    .execute(&mut *tx)
    .await?;

    if let Some(full_name) = &payload.full_name {
        if full_name.trim().is_empty() {
            return Err(AppError::BadRequest("Name cannot be empty".to_string()));
        }
        sqlx::query("UPDATE users SET full_name = $2, updated_at = NOW() WHERE id = $1")
            .bind(employee.user_id)
            .bind(full_name.trim())
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;

    let sql = format!("{} WHERE e.id = $1", EMPLOYEE_VIEW_SQL);
    let view = sqlx::query_as::<_, EmployeeView>(&sql)
        .bind(id)
        .fetch_one(&state.db_pool)
        .await?;

    Ok(Json(view))
}

/// Removing the login cascades to the employee row and its assignments.
async fn delete_employee(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    auth: AuthUser,
) -> ApiResult<StatusCode> {
    policy::require_admin(&auth.user)?;

    let user_id: Option<Uuid> = sqlx::query_scalar(
        "SELECT user_id FROM employees WHERE id = $1 AND company_id = $2",
    )
    .bind(id)
    .bind(auth.user.company_id)
    .fetch_optional(&state.db_pool)
    .await?;

    let user_id = user_id.ok_or_else(|| AppError::NotFound("Employee".to_string()))?;

    sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(user_id)
        .execute(&state.db_pool)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

async fn resend_confirmation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    auth: AuthUser,
) -> ApiResult<Json<serde_json::Value>> {
    policy::require_admin(&auth.user)?;

    let employee = sqlx::query_as::<_, Employee>(
        "SELECT * FROM employees WHERE id = $1 AND company_id = $2",
    )
    .bind(id)
    .bind(auth.user.company_id)
    .fetch_optional(&state.db_pool)
    .await?
    .ok_or_else(|| AppError::NotFound("Employee".to_string()))?;

    if employee.status != EmployeeStatus::Pending {
        return Err(AppError::BadRequest(
            "Employee has already confirmed their account".to_string(),
        ));
    }

    let confirmation_token = random_token(48);
    sqlx::query(
        "UPDATE employees SET confirmation_token = $2, updated_at = NOW() WHERE id = $1",
    )
    .bind(id)
    .bind(&confirmation_token)
    .execute(&state.db_pool)
    .await?;

    let (email, name): (String, String) =
        sqlx::query_as("SELECT email, full_name FROM users WHERE id = $1")
            .bind(employee.user_id)
            .fetch_one(&state.db_pool)
            .await?;

    send_confirmation_email(&state, &email, &name, &confirmation_token).await;

    Ok(Json(json!({ "success": true, "message": "Confirmation email sent" })))
}

/// Public: flip PENDING -> ACTIVE once and mint a password token (1 hour).
async fn confirm_employee(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let password_token = random_token(48);
    let expires_at = Utc::now() + Duration::hours(1);

    // Single-use: the conditional update both validates and consumes the token.
    let updated: Option<Uuid> = sqlx::query_scalar(
        r#"
        UPDATE employees
        SET status = 'ACTIVE',
            confirmation_token = NULL,
            password_token = $2,
            password_token_expires_at = $3,
            updated_at = NOW()
        WHERE confirmation_token = $1 AND status = 'PENDING'
        RETURNING id
        "#,
    )
    .bind(&token)
    .bind(&password_token)
    .bind(expires_at)
    .fetch_optional(&state.db_pool)
    .await?;

    if updated.is_none() {
        return Err(AppError::BadRequest(
            "This confirmation link is invalid or was already used".to_string(),
        ));
    }

    Ok(Json(json!({
        "success": true,
        "password_token": password_token,
        "expires_at": expires_at.to_rfc3339(),
    })))
}

/// Public: set the employee's real password using the minted token.
async fn set_password(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
    Json(payload): Json<SetPasswordRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    if !password_strong_enough(&payload.password) {
        return Err(AppError::BadRequest(
            "Password must be at least 8 characters with an uppercase letter, a lowercase letter, and a digit"
                .to_string(),
        ));
    }

    let employee = sqlx::query_as::<_, Employee>(
        r#"
        SELECT * FROM employees
        WHERE password_token = $1 AND password_token_expires_at > NOW()
        "#,
    )
    .bind(&token)
    .fetch_optional(&state.db_pool)
    .await?
    .ok_or_else(|| {
        AppError::BadRequest("This password link is invalid or has expired".to_string())
    })?;

    let password_hash = bcrypt::hash(&payload.password, bcrypt::DEFAULT_COST)?;

    let mut tx = state.db_pool.begin().await?;

    sqlx::query("UPDATE users SET password_hash = $2, updated_at = NOW() WHERE id = $1")
        .bind(employee.user_id)
        .bind(&password_hash)
        .execute(&mut *tx)
        .await?;

    sqlx::query(
        r#"
        UPDATE employees
        SET password_token = NULL, password_token_expires_at = NULL, updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(employee.id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(Json(json!({ "success": true, "message": "Password set. You can now sign in." })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_strength() {
        assert!(password_strong_enough("Abcdef12"));
        assert!(password_strong_enough("Str0ngPassword"));
        assert!(!password_strong_enough("short1A"));
        assert!(!password_strong_enough("alllowercase1"));
        assert!(!password_strong_enough("ALLUPPERCASE1"));
        assert!(!password_strong_enough("NoDigitsHere"));
    }

    #[test]
    fn test_random_token_shape() {
        let token = random_token(48);
        assert_eq!(token.len(), 48);
        assert!(token.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(random_token(48), random_token(48));
    }
}
