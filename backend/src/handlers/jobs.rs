//! Job scheduling and dispatch. Jobs come into existence only when a
//! quotation is signed; here they are crewed, started, ended, and cancelled.
//! The per-minute sweep handles MISSED and AUTO_ENDED transitions.

use axum::{
    extract::{Path, Query, State},
    response::Json,
    routing::{delete, get, post},
    Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::middleware::AuthUser;
use crate::auth::policy;
use crate::error::{ApiResult, AppError};
use crate::notifications::{notify_employee, notify_employees, push_to_admins};
use crate::AppState;
use haulbase_shared::{Job, JobRole, JobStatus, NotificationKind, Quotation, TimePunch};

pub fn job_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_jobs))
        .route("/calendar", get(calendar))
        .route("/:id", get(get_job))
        .route("/:id/schedule", post(schedule_job))
        .route("/:id/confirm", post(confirm_job))
        .route("/:id/start", post(start_job))
        .route("/:id/end", post(end_job))
        .route("/:id/cancel", post(cancel_job))
        .route("/:id/assign", post(assign_employee))
        .route("/:id/assign/:employee_id", delete(unassign_employee))
}

/// Seconds of work implied by the quotation's estimate.
pub fn planned_seconds(estimated_hours: Option<Decimal>) -> Option<i32> {
    let hours = estimated_hours?;
    if hours <= Decimal::ZERO {
        return None;
    }
    (hours * Decimal::from(3600)).to_i32()
}

#[derive(Debug, Deserialize)]
pub struct JobListQuery {
    pub status: Option<JobStatus>,
}

#[derive(Debug, Deserialize)]
pub struct CalendarQuery {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

#[derive(Debug, Deserialize)]
pub struct AssignRequest {
    pub employee_id: Uuid,
    pub role: Option<String>,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct JobListItem {
    pub id: Uuid,
    pub job_number: i32,
    pub status: JobStatus,
    pub title: Option<String>,
    pub moving_date: Option<NaiveDate>,
    pub start_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,
    pub customer_name: String,
    pub pickup_address: Option<String>,
    pub dropoff_address: Option<String>,
    pub workers: i32,
    pub total: Decimal,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct CrewMember {
    pub employee_id: Uuid,
    pub full_name: String,
    pub phone: Option<String>,
    pub role: JobRole,
}

#[derive(Debug, Serialize)]
pub struct JobDetail {
    #[serde(flatten)]
    pub job: Job,
    pub quotation: Quotation,
    pub customer_name: String,
    pub customer_phone: Option<String>,
    pub crew: Vec<CrewMember>,
    pub punches: Vec<TimePunch>,
}

#[derive(Debug, Serialize)]
pub struct CalendarEvent {
    pub id: Uuid,
    pub job_number: i32,
    pub status: JobStatus,
    pub title: Option<String>,
    pub start_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,
    pub customer_name: String,
    pub color: &'static str,
}

const JOB_LIST_SQL: &str = r#"
    SELECT j.id, j.job_number, j.status, j.title,
           q.moving_date, q.start_at, q.end_at,
           c.full_name AS customer_name,
           q.pickup_address, q.dropoff_address, q.workers, q.total,
           j.started_at, j.ended_at
    FROM jobs j
    JOIN quotations q ON q.id = j.quotation_id
    JOIN customers c ON c.id = q.customer_id
"#;

async fn fetch_owned_job(state: &AppState, id: Uuid, company_id: Uuid) -> ApiResult<Job> {
    sqlx::query_as::<_, Job>("SELECT * FROM jobs WHERE id = $1 AND company_id = $2")
        .bind(id)
        .bind(company_id)
        .fetch_optional(&state.db_pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Job".to_string()))
}

async fn is_assigned(state: &AppState, job_id: Uuid, employee_id: Uuid) -> ApiResult<bool> {
    let row: Option<Uuid> = sqlx::query_scalar(
        "SELECT id FROM job_employees WHERE job_id = $1 AND employee_id = $2",
    )
    .bind(job_id)
    .bind(employee_id)
    .fetch_optional(&state.db_pool)
    .await?;
    Ok(row.is_some())
}

async fn assigned_employee_ids(state: &AppState, job_id: Uuid) -> ApiResult<Vec<Uuid>> {
    let ids: Vec<Uuid> =
        sqlx::query_scalar("SELECT employee_id FROM job_employees WHERE job_id = $1")
            .bind(job_id)
            .fetch_all(&state.db_pool)
            .await?;
    Ok(ids)
}

async fn list_jobs(
    State(state): State<Arc<AppState>>,
    Query(query): Query<JobListQuery>,
    auth: AuthUser,
) -> ApiResult<Json<Vec<JobListItem>>> {
    // Field crew only sees its own assignments.
    let rows = if let Some(employee_id) = auth.employee_id {
        let sql = format!(
            "{JOB_LIST_SQL}
             JOIN job_employees je ON je.job_id = j.id AND je.employee_id = $2
             WHERE j.company_id = $1 AND ($3::job_status IS NULL OR j.status = $3)
             ORDER BY q.start_at ASC NULLS LAST"
        );
        sqlx::query_as::<_, JobListItem>(&sql)
            .bind(auth.user.company_id)
            .bind(employee_id)
            .bind(query.status)
            .fetch_all(&state.db_pool)
            .await?
    } else {
        let sql = format!(
            "{JOB_LIST_SQL}
             WHERE j.company_id = $1 AND ($2::job_status IS NULL OR j.status = $2)
             ORDER BY q.start_at ASC NULLS LAST"
        );
        sqlx::query_as::<_, JobListItem>(&sql)
            .bind(auth.user.company_id)
            .bind(query.status)
            .fetch_all(&state.db_pool)
            .await?
    };

    Ok(Json(rows))
}

async fn calendar(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CalendarQuery>,
    auth: AuthUser,
) -> ApiResult<Json<Vec<CalendarEvent>>> {
    let sql = format!(
        "{JOB_LIST_SQL}
         WHERE j.company_id = $1
           AND j.status IN ('CONFIRMED', 'IN_PROGRESS', 'COMPLETED', 'CANCELLED')
           AND q.moving_date BETWEEN $2 AND $3
         ORDER BY q.start_at ASC NULLS LAST"
    );
    let rows = sqlx::query_as::<_, JobListItem>(&sql)
        .bind(auth.user.company_id)
        .bind(query.from)
        .bind(query.to)
        .fetch_all(&state.db_pool)
        .await?;

    let events = rows
        .into_iter()
        .map(|row| CalendarEvent {
            id: row.id,
            job_number: row.job_number,
            status: row.status,
            title: row.title,
            start_at: row.start_at,
            end_at: row.end_at,
            customer_name: row.customer_name,
            color: row.status.calendar_color(),
        })
        .collect();

    Ok(Json(events))
}

async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    auth: AuthUser,
) -> ApiResult<Json<JobDetail>> {
    let job = fetch_owned_job(&state, id, auth.user.company_id).await?;

    if let Some(employee_id) = auth.employee_id {
        if !is_assigned(&state, job.id, employee_id).await? {
            return Err(AppError::Forbidden(
                "You are not assigned to this job".to_string(),
            ));
        }
    }

    let quotation = sqlx::query_as::<_, Quotation>("SELECT * FROM quotations WHERE id = $1")
        .bind(job.quotation_id)
        .fetch_one(&state.db_pool)
        .await?;

    let (customer_name, customer_phone): (String, Option<String>) =
        sqlx::query_as("SELECT full_name, phone FROM customers WHERE id = $1")
            .bind(quotation.customer_id)
            .fetch_one(&state.db_pool)
            .await?;

    let crew = sqlx::query_as::<_, CrewMember>(
        r#"
        SELECT je.employee_id, u.full_name, e.phone, je.role
        FROM job_employees je
        JOIN employees e ON e.id = je.employee_id
        JOIN users u ON u.id = e.user_id
        WHERE je.job_id = $1
        ORDER BY je.created_at ASC
        "#,
    )
    .bind(job.id)
    .fetch_all(&state.db_pool)
    .await?;

    let punches = sqlx::query_as::<_, TimePunch>(
        "SELECT * FROM time_punches WHERE job_id = $1 ORDER BY punch_in ASC",
    )
    .bind(job.id)
    .fetch_all(&state.db_pool)
    .await?;

    Ok(Json(JobDetail {
        job,
        quotation,
        customer_name,
        customer_phone,
        crew,
        punches,
    }))
}

async fn transition_to(
    state: &AppState,
    job: &Job,
    from: JobStatus,
    to: JobStatus,
) -> ApiResult<Job> {
    let updated = sqlx::query_as::<_, Job>(
        "UPDATE jobs SET status = $3, updated_at = NOW() \
         WHERE id = $1 AND status = $2 RETURNING *",
    )
    .bind(job.id)
    .bind(from)
    .bind(to)
    .fetch_optional(&state.db_pool)
    .await?;

    updated.ok_or_else(|| {
        AppError::BadRequest(format!(
            "Job cannot move to {:?} from its current status",
            to
        ))
    })
}

async fn schedule_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    auth: AuthUser,
) -> ApiResult<Json<Job>> {
    policy::require_admin(&auth.user)?;
    let job = fetch_owned_job(&state, id, auth.user.company_id).await?;
    let job = transition_to(&state, &job, JobStatus::Pending, JobStatus::Scheduled).await?;
    Ok(Json(job))
}

async fn confirm_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    auth: AuthUser,
) -> ApiResult<Json<Job>> {
    policy::require_admin(&auth.user)?;
    let job = fetch_owned_job(&state, id, auth.user.company_id).await?;

    if job.status != JobStatus::Scheduled && job.status != JobStatus::Pending {
        return Err(AppError::BadRequest(
            "Only a pending or scheduled job can be confirmed".to_string(),
        ));
    }

    let job = sqlx::query_as::<_, Job>(
        "UPDATE jobs SET status = 'CONFIRMED', updated_at = NOW() \
         WHERE id = $1 AND status IN ('PENDING', 'SCHEDULED') RETURNING *",
    )
    .bind(job.id)
    .fetch_optional(&state.db_pool)
    .await?
    .ok_or_else(|| AppError::BadRequest("Job can no longer be confirmed".to_string()))?;

    Ok(Json(job))
}

async fn start_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    auth: AuthUser,
) -> ApiResult<Json<Job>> {
    let employee_id = policy::require_employee(&auth.user)
        .and(auth.employee_id.ok_or_else(|| {
            AppError::Forbidden("Only field employees can start jobs".to_string())
        }))?;

    let job = fetch_owned_job(&state, id, auth.user.company_id).await?;

    if !is_assigned(&state, job.id, employee_id).await? {
        return Err(AppError::Forbidden(
            "You are not assigned to this job".to_string(),
        ));
    }

    // A second start press from a teammate is a no-op.
    if job.status == JobStatus::InProgress {
        return Ok(Json(job));
    }
    if job.status.is_terminal() {
        return Err(AppError::BadRequest(
            "This job has already finished".to_string(),
        ));
    }

    let estimated_hours: Option<Decimal> =
        sqlx::query_scalar("SELECT estimated_hours FROM quotations WHERE id = $1")
            .bind(job.quotation_id)
            .fetch_one(&state.db_pool)
            .await?;
    let total_seconds = planned_seconds(estimated_hours);

    let now = Utc::now();
    let mut tx = state.db_pool.begin().await?;

    let updated = sqlx::query_as::<_, Job>(
        r#"
        UPDATE jobs SET status = 'IN_PROGRESS', started_at = $2, total_seconds = $3,
                        updated_at = NOW()
        WHERE id = $1 AND status NOT IN ('IN_PROGRESS', 'COMPLETED', 'CANCELLED', 'AUTO_ENDED', 'MISSED')
        RETURNING *
        "#,
    )
    .bind(job.id)
    .bind(now)
    .bind(total_seconds)
    .fetch_optional(&mut *tx)
    .await?;

    let Some(updated) = updated else {
        tx.rollback().await?;
        let current = fetch_owned_job(&state, id, auth.user.company_id).await?;
        return Ok(Json(current));
    };

    sqlx::query("INSERT INTO time_punches (job_id, employee_id, punch_in) VALUES ($1, $2, $3)")
        .bind(job.id)
        .bind(employee_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    let crew = assigned_employee_ids(&state, job.id).await?;
    let errors = notify_employees(
        &state,
        auth.user.company_id,
        &crew,
        Some(job.id),
        NotificationKind::JobStarted,
        "Job Started",
        &format!("Job #{} has started", job.job_number),
    )
    .await;
    for err in errors {
        tracing::warn!("Job start notification failed: {}", err);
    }

    Ok(Json(updated))
}

async fn end_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    auth: AuthUser,
) -> ApiResult<Json<Job>> {
    let job = fetch_owned_job(&state, id, auth.user.company_id).await?;

    if job.status != JobStatus::InProgress {
        return Err(AppError::BadRequest(
            "Only a job in progress can be ended".to_string(),
        ));
    }

    let now = Utc::now();
    let mut tx = state.db_pool.begin().await?;

    let updated = sqlx::query_as::<_, Job>(
        "UPDATE jobs SET status = 'COMPLETED', ended_at = $2, updated_at = NOW() \
         WHERE id = $1 AND status = 'IN_PROGRESS' RETURNING *",
    )
    .bind(job.id)
    .bind(now)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| AppError::BadRequest("Job is no longer in progress".to_string()))?;

    // Close the caller's open punch; teammates' punches stay open for the
    // sweep or their own punch-out.
    if let Some(employee_id) = auth.employee_id {
        sqlx::query(
            r#"
            UPDATE time_punches SET punch_out = $3, punch_out_type = 'MANUAL'
            WHERE job_id = $1 AND employee_id = $2 AND punch_out IS NULL
            "#,
        )
        .bind(job.id)
        .bind(employee_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    let crew = assigned_employee_ids(&state, job.id).await?;
    let errors = notify_employees(
        &state,
        auth.user.company_id,
        &crew,
        Some(job.id),
        NotificationKind::JobCompleted,
        "Job Completed",
        &format!("Job #{} has been completed", job.job_number),
    )
    .await;
    for err in errors {
        tracing::warn!("Job completion notification failed: {}", err);
    }

    Ok(Json(updated))
}

async fn cancel_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    auth: AuthUser,
) -> ApiResult<Json<Job>> {
    policy::require_admin(&auth.user)?;

    let job = fetch_owned_job(&state, id, auth.user.company_id).await?;
    if matches!(job.status, JobStatus::Completed | JobStatus::Cancelled) {
        return Err(AppError::BadRequest(
            "A completed or cancelled job cannot be cancelled".to_string(),
        ));
    }

    // Capture the crew before the assignment rows go away.
    let crew = assigned_employee_ids(&state, job.id).await?;

    let mut tx = state.db_pool.begin().await?;

    let updated = sqlx::query_as::<_, Job>(
        "UPDATE jobs SET status = 'CANCELLED', ended_at = $2, updated_at = NOW() \
         WHERE id = $1 AND status NOT IN ('COMPLETED', 'CANCELLED') RETURNING *",
    )
    .bind(job.id)
    .bind(Utc::now())
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| AppError::BadRequest("Job can no longer be cancelled".to_string()))?;

    sqlx::query("DELETE FROM job_employees WHERE job_id = $1")
        .bind(job.id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    let errors = notify_employees(
        &state,
        auth.user.company_id,
        &crew,
        Some(job.id),
        NotificationKind::JobCancelled,
        "Job Cancelled",
        &format!("Job #{} has been cancelled", job.job_number),
    )
    .await;
    for err in errors {
        tracing::warn!("Job cancellation notification failed: {}", err);
    }

    Ok(Json(updated))
}

async fn assign_employee(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    auth: AuthUser,
    Json(payload): Json<AssignRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    policy::require_admin(&auth.user)?;

    let job = fetch_owned_job(&state, id, auth.user.company_id).await?;
    if job.status.is_terminal() {
        return Err(AppError::BadRequest(
            "Cannot assign staff to a finished job".to_string(),
        ));
    }

    let employee: Option<(Uuid, String)> = sqlx::query_as(
        r#"
        SELECT e.id, u.full_name
        FROM employees e
        JOIN users u ON u.id = e.user_id
        WHERE e.id = $1 AND e.company_id = $2 AND e.status = 'ACTIVE'
        "#,
    )
    .bind(payload.employee_id)
    .bind(auth.user.company_id)
    .fetch_optional(&state.db_pool)
    .await?;

    let Some((employee_id, employee_name)) = employee else {
        return Err(AppError::NotFound("Active employee".to_string()));
    };

    let role = payload
        .role
        .as_deref()
        .map(JobRole::from)
        .unwrap_or(JobRole::Mover);

    sqlx::query(
        r#"
        INSERT INTO job_employees (job_id, employee_id, role)
        VALUES ($1, $2, $3)
        ON CONFLICT (job_id, employee_id) DO UPDATE SET role = EXCLUDED.role
        "#,
    )
    .bind(job.id)
    .bind(employee_id)
    .bind(role)
    .execute(&state.db_pool)
    .await?;

    if let Err(e) = notify_employee(
        &state,
        auth.user.company_id,
        employee_id,
        Some(job.id),
        NotificationKind::JobAssigned,
        "New Job Assigned",
        &format!("You have been assigned to job #{}", job.job_number),
    )
    .await
    {
        tracing::warn!("Assignment notification failed: {}", e);
    }

    push_to_admins(
        &state,
        auth.user.company_id,
        "Team Assigned",
        &format!("{} was assigned to job #{}", employee_name, job.job_number),
    )
    .await;

    Ok(Json(json!({ "success": true })))
}

async fn unassign_employee(
    State(state): State<Arc<AppState>>,
    Path((id, employee_id)): Path<(Uuid, Uuid)>,
    auth: AuthUser,
) -> ApiResult<Json<serde_json::Value>> {
    policy::require_admin(&auth.user)?;

    let job = fetch_owned_job(&state, id, auth.user.company_id).await?;

    let result = sqlx::query(
        "DELETE FROM job_employees WHERE job_id = $1 AND employee_id = $2",
    )
    .bind(job.id)
    .bind(employee_id)
    .execute(&state.db_pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Assignment".to_string()));
    }

    Ok(Json(json!({ "success": true })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_planned_seconds() {
        assert_eq!(planned_seconds(Some(Decimal::from(3))), Some(10800));
        assert_eq!(planned_seconds(Some(Decimal::new(25, 1))), Some(9000));
        assert_eq!(planned_seconds(Some(Decimal::ZERO)), None);
        assert_eq!(planned_seconds(Some(Decimal::from(-1))), None);
        assert_eq!(planned_seconds(None), None);
    }

    #[test]
    fn test_role_normalization_default() {
        assert_eq!(JobRole::from("driver"), JobRole::Driver);
        assert_eq!(JobRole::from("team lead"), JobRole::TeamLead);
        assert_eq!(JobRole::from("something else"), JobRole::Mover);
    }
}
