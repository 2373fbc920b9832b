//! Standardized error handling for the Haulbase API
//!
//! Every handler returns `ApiResult<T>`; failures are converted into a
//! consistent JSON envelope by the `IntoResponse` impl below.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use haulbase_shared::CompanyPlan;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Standard API error response body
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    /// Error code (e.g. "VALIDATION_ERROR", "NOT_FOUND", "UPGRADE_REQUIRED_VOLUME")
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// Optional field-level errors for validation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<HashMap<String, Vec<String>>>,
    /// Plans that would satisfy a failed plan gate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required_plans: Option<Vec<CompanyPlan>>,
    /// ISO 8601 timestamp
    pub timestamp: String,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
            required_plans: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Application error type that can be converted to HTTP responses
#[derive(Debug, Error)]
pub enum AppError {
    // Authentication errors
    #[error("{0}")]
    Unauthorized(String),
    #[error("Invalid email or password")]
    InvalidCredentials,
    #[error("Authentication token has expired")]
    TokenExpired,

    // Authorization errors
    #[error("{0}")]
    Forbidden(String),
    /// Plan gate failure; carries a machine-readable code plus the plans
    /// that would satisfy the gate so clients can drive an upsell flow.
    #[error("{message}")]
    UpgradeRequired {
        code: &'static str,
        message: String,
        required_plans: Vec<CompanyPlan>,
    },

    // Resource errors
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),

    // Validation errors
    #[error("Validation failed")]
    ValidationError { details: HashMap<String, Vec<String>> },
    #[error("{0}")]
    BadRequest(String),

    // Server errors
    #[error("{0}")]
    InternalError(String),
    #[error("{0}")]
    DatabaseError(String),
}

impl AppError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized(_) | Self::InvalidCredentials | Self::TokenExpired => {
                StatusCode::UNAUTHORIZED
            }
            Self::Forbidden(_) | Self::UpgradeRequired { .. } => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::ValidationError { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::InternalError(_) | Self::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code string
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::TokenExpired => "TOKEN_EXPIRED",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::UpgradeRequired { code, .. } => code,
            Self::NotFound(_) => "NOT_FOUND",
            Self::Conflict(_) => "CONFLICT",
            Self::ValidationError { .. } => "VALIDATION_ERROR",
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::InternalError(_) => "INTERNAL_ERROR",
            Self::DatabaseError(_) => "DATABASE_ERROR",
        }
    }

    /// Get the client-facing error message. Server-side errors are logged
    /// and replaced with a generic message.
    pub fn message(&self) -> String {
        match self {
            Self::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                "An internal error occurred".to_string()
            }
            Self::DatabaseError(msg) => {
                tracing::error!("Database error: {}", msg);
                "A database error occurred".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let mut error = ApiError::new(self.error_code(), self.message());

        if let Self::ValidationError { details } = &self {
            error.details = Some(details.clone());
        }

        if let Self::UpgradeRequired { required_plans, .. } = &self {
            error.required_plans = Some(required_plans.clone());
        }

        (status, Json(error)).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::NotFound("Resource".to_string()),
            _ => Self::DatabaseError(err.to_string()),
        }
    }
}

impl From<jsonwebtoken::errors::Error> for AppError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => Self::TokenExpired,
            _ => Self::Unauthorized(format!("Invalid token: {}", err)),
        }
    }
}

impl From<bcrypt::BcryptError> for AppError {
    fn from(_err: bcrypt::BcryptError) -> Self {
        Self::InternalError("Password hashing error".to_string())
    }
}

/// Result type alias for handlers
pub type ApiResult<T> = Result<T, AppError>;

/// Helper to create a single-field validation error
pub fn validation_error(field: &str, message: &str) -> AppError {
    let mut details = HashMap::new();
    details.insert(field.to_string(), vec![message.to_string()]);
    AppError::ValidationError { details }
}

/// Helper to accumulate multiple validation errors
pub struct ValidationBuilder {
    details: HashMap<String, Vec<String>>,
}

impl ValidationBuilder {
    pub fn new() -> Self {
        Self {
            details: HashMap::new(),
        }
    }

    pub fn error(mut self, field: &str, message: &str) -> Self {
        self.details
            .entry(field.to_string())
            .or_insert_with(Vec::new)
            .push(message.to_string());
        self
    }

    pub fn require(self, present: bool, field: &str, message: &str) -> Self {
        if present {
            self
        } else {
            self.error(field, message)
        }
    }

    pub fn build(self) -> Option<AppError> {
        if self.details.is_empty() {
            None
        } else {
            Some(AppError::ValidationError {
                details: self.details,
            })
        }
    }
}

impl Default for ValidationBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_builder() {
        let error = ValidationBuilder::new()
            .error("email", "Email is required")
            .error("email", "Email must be valid")
            .error("password", "Password is too short")
            .build();

        assert!(error.is_some());
        if let Some(AppError::ValidationError { details }) = error {
            assert_eq!(details.get("email").unwrap().len(), 2);
            assert_eq!(details.get("password").unwrap().len(), 1);
        }
    }

    #[test]
    fn test_require_helper() {
        let err = ValidationBuilder::new()
            .require(true, "customer_id", "Customer is required")
            .require(false, "service_type", "Service type is required")
            .build();

        if let Some(AppError::ValidationError { details }) = err {
            assert!(!details.contains_key("customer_id"));
            assert!(details.contains_key("service_type"));
        } else {
            panic!("expected validation error");
        }
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            AppError::InvalidCredentials.error_code(),
            "INVALID_CREDENTIALS"
        );
        assert_eq!(
            AppError::NotFound("Quotation".to_string()).status_code(),
            StatusCode::NOT_FOUND
        );

        let gate = AppError::UpgradeRequired {
            code: "UPGRADE_REQUIRED_VOLUME",
            message: "Upgrade your plan to save more volume calculations".to_string(),
            required_plans: vec![CompanyPlan::Pro, CompanyPlan::Elite],
        };
        assert_eq!(gate.error_code(), "UPGRADE_REQUIRED_VOLUME");
        assert_eq!(gate.status_code(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_row_not_found_maps_to_404() {
        let err: AppError = sqlx::Error::RowNotFound.into();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }
}
