// Central scheduler for background work, driven by tokio-cron-scheduler.

use std::sync::Arc;
use thiserror::Error;
use tokio_cron_scheduler::{Job, JobScheduler as TokioScheduler, JobSchedulerError};
use tracing::{error, info, warn};

use super::{JobSweep, MaintenanceJob};
use crate::AppState;

#[derive(Error, Debug)]
pub enum JobError {
    #[error("Scheduler error: {0}")]
    SchedulerError(#[from] JobSchedulerError),
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}

pub type JobResult<T> = Result<T, JobError>;

const SWEEP_SCHEDULE: &str = "0 * * * * *"; // every minute
const MAINTENANCE_SCHEDULE: &str = "0 0 3 * * *"; // 03:00 daily

pub struct JobScheduler {
    scheduler: TokioScheduler,
    state: Arc<AppState>,
}

impl JobScheduler {
    pub async fn new(state: Arc<AppState>) -> JobResult<Self> {
        let scheduler = TokioScheduler::new().await?;
        Ok(Self { scheduler, state })
    }

    pub async fn start(&self) -> JobResult<()> {
        info!("Starting background job scheduler");

        self.schedule_job_sweep().await?;
        self.schedule_maintenance().await?;
        self.scheduler.start().await?;

        info!("Background job scheduler started");
        Ok(())
    }

    pub async fn shutdown(&mut self) -> JobResult<()> {
        info!("Shutting down background job scheduler");
        self.scheduler.shutdown().await?;
        Ok(())
    }

    async fn schedule_job_sweep(&self) -> JobResult<()> {
        let state = self.state.clone();

        let job = Job::new_async(SWEEP_SCHEDULE, move |_uuid, _lock| {
            let state = state.clone();
            Box::pin(async move {
                let sweep = JobSweep::new(state);
                match sweep.run().await {
                    Ok(result) => {
                        if result.missed > 0 || result.auto_ended > 0 {
                            info!(
                                "Job sweep: {} checked, {} missed, {} auto-ended",
                                result.checked, result.missed, result.auto_ended
                            );
                        }
                        for err in result.errors {
                            warn!("Job sweep partial failure: {}", err);
                        }
                    }
                    Err(e) => error!("Job sweep failed: {}", e),
                }
            })
        })?;

        self.scheduler.add(job).await?;
        info!("Scheduled job sweep to run every minute");
        Ok(())
    }

    async fn schedule_maintenance(&self) -> JobResult<()> {
        let state = self.state.clone();

        let job = Job::new_async(MAINTENANCE_SCHEDULE, move |_uuid, _lock| {
            let state = state.clone();
            Box::pin(async move {
                let maintenance = MaintenanceJob::new(state);
                match maintenance.run().await {
                    Ok(result) => {
                        info!(
                            "Maintenance: {} signup sessions purged, {} quotations expired",
                            result.purged_signups, result.expired_quotations
                        );
                    }
                    Err(e) => error!("Maintenance run failed: {}", e),
                }
            })
        })?;

        self.scheduler.add(job).await?;
        info!("Scheduled daily maintenance at 03:00");
        Ok(())
    }
}
