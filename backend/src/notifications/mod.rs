use axum::{
    extract::{Path, Query, State},
    response::Json,
    routing::{get, put},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::middleware::AuthUser;
use crate::error::{ApiResult, AppError};
use crate::AppState;
use haulbase_shared::{Notification, NotificationKind};

pub fn notification_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_notifications))
        .route("/:id/read", put(mark_as_read))
        .route("/read-all", put(mark_all_as_read))
        .route("/unread-count", get(get_unread_count))
}

#[derive(Debug, Deserialize)]
pub struct ListNotificationsQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct UnreadCountResponse {
    pub unread_count: i64,
}

/// Notifications target crew members. Owner and manager logins have no
/// employee record, so they see an empty feed.
async fn list_notifications(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListNotificationsQuery>,
    auth: AuthUser,
) -> ApiResult<Json<Vec<Notification>>> {
    let Some(employee_id) = auth.employee_id else {
        return Ok(Json(Vec::new()));
    };

    let limit = query.limit.unwrap_or(50).clamp(1, 100);

    let notifications = sqlx::query_as::<_, Notification>(
        r#"
        SELECT * FROM notifications
        WHERE employee_id = $1 AND company_id = $2
        ORDER BY created_at DESC
        LIMIT $3
        "#,
    )
    .bind(employee_id)
    .bind(auth.user.company_id)
    .bind(limit)
    .fetch_all(&state.db_pool)
    .await?;

    Ok(Json(notifications))
}

async fn mark_as_read(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    auth: AuthUser,
) -> ApiResult<Json<serde_json::Value>> {
    let employee_id = auth
        .employee_id
        .ok_or_else(|| AppError::NotFound("Notification".to_string()))?;

    let result = sqlx::query(
        "UPDATE notifications SET is_read = true WHERE id = $1 AND employee_id = $2",
    )
    .bind(id)
    .bind(employee_id)
    .execute(&state.db_pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Notification".to_string()));
    }

    Ok(Json(serde_json::json!({ "message": "Notification marked as read" })))
}

async fn mark_all_as_read(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> ApiResult<Json<serde_json::Value>> {
    let Some(employee_id) = auth.employee_id else {
        return Ok(Json(serde_json::json!({ "updated_count": 0 })));
    };

    let result = sqlx::query(
        "UPDATE notifications SET is_read = true WHERE employee_id = $1 AND is_read = false",
    )
    .bind(employee_id)
    .execute(&state.db_pool)
    .await?;

    Ok(Json(serde_json::json!({
        "message": "All notifications marked as read",
        "updated_count": result.rows_affected()
    })))
}

async fn get_unread_count(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> ApiResult<Json<UnreadCountResponse>> {
    let Some(employee_id) = auth.employee_id else {
        return Ok(Json(UnreadCountResponse { unread_count: 0 }));
    };

    let unread_count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM notifications WHERE employee_id = $1 AND is_read = false",
    )
    .bind(employee_id)
    .fetch_one(&state.db_pool)
    .await?;

    Ok(Json(UnreadCountResponse { unread_count }))
}

/// Persist a notification row for one employee and push it to their device
/// if a token is registered. The push leg never fails the caller.
pub async fn notify_employee(
    state: &AppState,
    company_id: Uuid,
    employee_id: Uuid,
    job_id: Option<Uuid>,
    kind: NotificationKind,
    title: &str,
    message: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO notifications (company_id, employee_id, job_id, kind, title, message)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(company_id)
    .bind(employee_id)
    .bind(job_id)
    .bind(kind)
    .bind(title)
    .bind(message)
    .execute(&state.db_pool)
    .await?;

    let push_token: Option<String> = sqlx::query_scalar(
        r#"
        SELECT u.push_token FROM users u
        JOIN employees e ON e.user_id = u.id
        WHERE e.id = $1
        "#,
    )
    .bind(employee_id)
    .fetch_optional(&state.db_pool)
    .await?
    .flatten();

    if let Some(token) = push_token {
        let job_ref = job_id.map(|id| id.to_string());
        state
            .push
            .send(&token, title, message, job_ref.as_deref(), Some("JobDetails"))
            .await;
    }

    Ok(())
}

/// Fan one notification out to several employees; per-employee failures are
/// collected into the returned list so background sweeps can report them.
pub async fn notify_employees(
    state: &AppState,
    company_id: Uuid,
    employee_ids: &[Uuid],
    job_id: Option<Uuid>,
    kind: NotificationKind,
    title: &str,
    message: &str,
) -> Vec<String> {
    let mut errors = Vec::new();
    for employee_id in employee_ids {
        if let Err(e) = notify_employee(
            state,
            company_id,
            *employee_id,
            job_id,
            kind,
            title,
            message,
        )
        .await
        {
            errors.push(format!("employee {}: {}", employee_id, e));
        }
    }
    errors
}

/// Push-only alert to the company's OWNER and MANAGER devices. Admin logins
/// carry no employee record, so nothing is persisted for them.
pub async fn push_to_admins(state: &AppState, company_id: Uuid, title: &str, message: &str) {
    let tokens: Vec<String> = match sqlx::query_scalar::<_, Option<String>>(
        r#"
        SELECT push_token FROM users
        WHERE company_id = $1 AND role IN ('OWNER', 'MANAGER') AND push_token IS NOT NULL
        "#,
    )
    .bind(company_id)
    .fetch_all(&state.db_pool)
    .await
    {
        Ok(rows) => rows.into_iter().flatten().collect(),
        Err(e) => {
            tracing::error!("Failed to load admin push tokens: {}", e);
            return;
        }
    };

    for token in tokens {
        state.push.send(&token, title, message, None, None).await;
    }
}
