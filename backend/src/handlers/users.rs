use axum::{
    extract::State,
    response::Json,
    routing::{get, put},
    Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::middleware::AuthUser;
use crate::error::{ApiResult, AppError};
use crate::handlers::auth::valid_email;
use crate::AppState;
use haulbase_shared::User;

pub fn user_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/me", get(get_me))
        .route("/profile", put(update_profile))
        .route("/push-token", put(register_push_token))
}

#[derive(Debug, Deserialize)]
pub struct ProfileUpdate {
    pub full_name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PushTokenUpdate {
    pub push_token: Option<String>,
}

async fn get_me(auth: AuthUser) -> ApiResult<Json<User>> {
    Ok(Json(auth.user))
}

async fn update_profile(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(payload): Json<ProfileUpdate>,
) -> ApiResult<Json<User>> {
    if let Some(name) = &payload.full_name {
        if name.trim().is_empty() {
            return Err(AppError::BadRequest("Name cannot be empty".to_string()));
        }
    }

    let email = match &payload.email {
        Some(email) => {
            let email = email.trim().to_lowercase();
            if !valid_email(&email) {
                return Err(AppError::BadRequest("Invalid email address".to_string()));
            }
            let taken: Option<Uuid> =
                sqlx::query_scalar("SELECT id FROM users WHERE email = $1 AND id <> $2")
                    .bind(&email)
                    .bind(auth.user.id)
                    .fetch_optional(&state.db_pool)
                    .await?;
            if taken.is_some() {
                return Err(AppError::Conflict(
                    "An account with this email already exists".to_string(),
                ));
            }
            Some(email)
        }
        None => None,
    };

    let user = sqlx::query_as::<_, User>(
        r#"
        UPDATE users SET
            full_name = COALESCE($2, full_name),
            email = COALESCE($3, email),
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(auth.user.id)
    .bind(payload.full_name.as_deref().map(str::trim))
    .bind(email)
    .fetch_one(&state.db_pool)
    .await?;

    Ok(Json(user))
}

/// Register (or clear) the caller's device token for push delivery.
async fn register_push_token(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(payload): Json<PushTokenUpdate>,
) -> ApiResult<Json<serde_json::Value>> {
    sqlx::query("UPDATE users SET push_token = $2, updated_at = NOW() WHERE id = $1")
        .bind(auth.user.id)
        .bind(&payload.push_token)
        .execute(&state.db_pool)
        .await?;

    Ok(Json(json!({ "success": true })))
}
