use axum::{extract::State, http::StatusCode, response::Json};
use serde_json::json;
use std::sync::Arc;

use crate::AppState;

pub mod auth;
pub mod chat;
pub mod companies;
pub mod customers;
pub mod dashboard;
pub mod employees;
pub mod invoices;
pub mod jobs;
pub mod public_signing;
pub mod quotations;
pub mod users;
pub mod volume;

pub use auth::auth_routes;
pub use chat::chat_routes;
pub use companies::company_routes;
pub use customers::customer_routes;
pub use dashboard::dashboard_routes;
pub use employees::{employee_public_routes, employee_routes};
pub use invoices::invoice_routes;
pub use jobs::job_routes;
pub use public_signing::public_quotation_routes;
pub use quotations::quotation_routes;
pub use users::user_routes;
pub use volume::volume_routes;

pub async fn health_check(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<serde_json::Value>) {
    let db_ok = crate::database::health_check(&state.db_pool).await;
    let status = if db_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(json!({
            "status": if db_ok { "healthy" } else { "degraded" },
            "database": db_ok,
            "service": "haulbase-api",
        })),
    )
}
