//! Per-minute sweep over scheduled jobs. A CONFIRMED job whose window has
//! passed without anyone starting it becomes MISSED; an IN_PROGRESS job
//! past its window is auto-ended at the planned end time, closing any
//! punches still open.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use std::sync::Arc;
use uuid::Uuid;

use crate::notifications::notify_employees;
use crate::AppState;
use haulbase_shared::NotificationKind;

pub struct JobSweep {
    state: Arc<AppState>,
}

#[derive(Debug, Default)]
pub struct SweepResult {
    pub checked: usize,
    pub missed: usize,
    pub auto_ended: usize,
    pub errors: Vec<String>,
}

#[derive(Debug, FromRow)]
struct OverdueJob {
    id: Uuid,
    company_id: Uuid,
    job_number: i32,
    end_at: DateTime<Utc>,
}

impl JobSweep {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    pub async fn run(&self) -> Result<SweepResult, sqlx::Error> {
        let mut result = SweepResult::default();
        let now = Utc::now();

        self.mark_missed(now, &mut result).await?;
        self.auto_end(now, &mut result).await?;

        Ok(result)
    }

    async fn overdue_jobs(
        &self,
        status: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<OverdueJob>, sqlx::Error> {
        let sql = format!(
            r#"
            SELECT j.id, j.company_id, j.job_number, q.end_at
            FROM jobs j
            JOIN quotations q ON q.id = j.quotation_id
            WHERE j.status = '{status}' AND q.end_at IS NOT NULL AND q.end_at < $1
            "#
        );
        sqlx::query_as::<_, OverdueJob>(&sql)
            .bind(now)
            .fetch_all(&self.state.db_pool)
            .await
    }

    async fn mark_missed(
        &self,
        now: DateTime<Utc>,
        result: &mut SweepResult,
    ) -> Result<(), sqlx::Error> {
        let overdue = self.overdue_jobs("CONFIRMED", now).await?;
        result.checked += overdue.len();

        // One transaction per job so a single failure cannot wedge the
        // whole sweep.
        for job in overdue {
            match self.mark_one_missed(&job).await {
                Ok(true) => {
                    result.missed += 1;
                    let crew = self.crew(job.id).await.unwrap_or_default();
                    let errors = notify_employees(
                        &self.state,
                        job.company_id,
                        &crew,
                        Some(job.id),
                        NotificationKind::JobMissed,
                        "Job Missed",
                        &format!("Job #{} was missed (not started on time)", job.job_number),
                    )
                    .await;
                    result.errors.extend(errors);
                }
                Ok(false) => {}
                Err(e) => {
                    result
                        .errors
                        .push(format!("mark_missed job {}: {}", job.id, e));
                }
            }
        }

        Ok(())
    }

    async fn mark_one_missed(&self, job: &OverdueJob) -> Result<bool, sqlx::Error> {
        let mut tx = self.state.db_pool.begin().await?;
        let updated = sqlx::query(
            "UPDATE jobs SET status = 'MISSED', updated_at = NOW() \
             WHERE id = $1 AND status = 'CONFIRMED'",
        )
        .bind(job.id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(updated.rows_affected() > 0)
    }

    async fn auto_end(
        &self,
        now: DateTime<Utc>,
        result: &mut SweepResult,
    ) -> Result<(), sqlx::Error> {
        let overdue = self.overdue_jobs("IN_PROGRESS", now).await?;
        result.checked += overdue.len();

        for job in overdue {
            match self.auto_end_one(&job).await {
                Ok(true) => {
                    result.auto_ended += 1;
                    let crew = self.crew(job.id).await.unwrap_or_default();
                    let errors = notify_employees(
                        &self.state,
                        job.company_id,
                        &crew,
                        Some(job.id),
                        NotificationKind::JobAutoEnded,
                        "Job Auto Ended",
                        &format!("Job #{} was automatically ended", job.job_number),
                    )
                    .await;
                    result.errors.extend(errors);
                }
                Ok(false) => {}
                Err(e) => {
                    result
                        .errors
                        .push(format!("auto_end job {}: {}", job.id, e));
                }
            }
        }

        Ok(())
    }

    /// The job ends at the planned end time, not at sweep time, so the
    /// recorded duration matches the estimate.
    async fn auto_end_one(&self, job: &OverdueJob) -> Result<bool, sqlx::Error> {
        let mut tx = self.state.db_pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE jobs SET status = 'AUTO_ENDED', ended_at = $2, updated_at = NOW() \
             WHERE id = $1 AND status = 'IN_PROGRESS'",
        )
        .bind(job.id)
        .bind(job.end_at)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query(
            "UPDATE time_punches SET punch_out = $2, punch_out_type = 'AUTO' \
             WHERE job_id = $1 AND punch_out IS NULL",
        )
        .bind(job.id)
        .bind(job.end_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn crew(&self, job_id: Uuid) -> Result<Vec<Uuid>, sqlx::Error> {
        sqlx::query_scalar("SELECT employee_id FROM job_employees WHERE job_id = $1")
            .bind(job_id)
            .fetch_all(&self.state.db_pool)
            .await
    }
}
