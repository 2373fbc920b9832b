// Scheduled background work: the per-minute job sweep and nightly
// maintenance, both driven by tokio-cron-scheduler.

pub mod job_sweep;
pub mod maintenance;
pub mod scheduler;

pub use job_sweep::JobSweep;
pub use maintenance::MaintenanceJob;
pub use scheduler::{JobError, JobResult, JobScheduler};
