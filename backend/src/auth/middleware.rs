use axum::{
    async_trait,
    extract::FromRequestParts,
    http::request::Parts,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use super::jwt;
use crate::error::AppError;
use crate::AppState;
use haulbase_shared::User;

/// Authenticated user extractor
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user: User,
    /// Present for EMPLOYEE logins, taken from the token claims
    pub employee_id: Option<uuid::Uuid>,
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        // Extract Bearer token from Authorization header
        let auth_header = parts
            .headers
            .get("authorization")
            .and_then(|header| header.to_str().ok())
            .ok_or_else(|| {
                AppError::Unauthorized("Missing authorization header".to_string()).into_response()
            })?;

        let token = auth_header.strip_prefix("Bearer ").ok_or_else(|| {
            AppError::Unauthorized("Invalid authorization format".to_string()).into_response()
        })?;

        // Verify JWT token
        let token_data = jwt::verify_jwt(token).map_err(|e| AppError::from(e).into_response())?;

        // Load user from database
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(token_data.claims.sub)
            .fetch_optional(&state.db_pool)
            .await
            .map_err(|e| AppError::DatabaseError(e.to_string()).into_response())?
            .ok_or_else(|| AppError::Unauthorized("User not found".to_string()).into_response())?;

        // Token claims must still match the row; a role change invalidates
        // outstanding tokens.
        if user.role != token_data.claims.role || user.company_id != token_data.claims.company_id {
            return Err(
                AppError::Unauthorized("Token no longer valid for this account".to_string())
                    .into_response(),
            );
        }

        Ok(AuthUser {
            user,
            employee_id: token_data.claims.employee_id,
        })
    }
}
