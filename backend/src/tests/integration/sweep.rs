//! The per-minute sweep may overlap itself or run again before anything
//! changes. Every transition is a conditional update, so a second pass
//! finds nothing to do and sends no duplicate notifications.

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::jobs::JobSweep;
use crate::tests::TestContext;

#[tokio::test]
async fn second_sweep_pass_repeats_no_transitions() {
    let ctx = TestContext::new().await;
    let company = ctx.seed_company().await;
    let customer = ctx.seed_customer(company).await;
    let owner = ctx.seed_user(company).await;
    let crew = ctx.seed_employee(company).await;

    let past_end = Utc::now() - Duration::hours(2);

    // A confirmed job nobody started and a running job past its window.
    let q_missed = ctx
        .seed_signed_quotation(company, customer, owner, 2001, past_end)
        .await;
    let job_missed = ctx.seed_job(company, q_missed, "CONFIRMED", 2001).await;
    ctx.assign_crew(job_missed, crew).await;

    let q_running = ctx
        .seed_signed_quotation(company, customer, owner, 2002, past_end)
        .await;
    let job_running = ctx.seed_job(company, q_running, "IN_PROGRESS", 2002).await;
    ctx.assign_crew(job_running, crew).await;
    ctx.seed_open_punch(job_running, crew).await;

    let sweep = JobSweep::new(ctx.state.clone());

    let first = sweep.run().await.unwrap();
    assert_eq!(first.missed, 1);
    assert_eq!(first.auto_ended, 1);
    assert!(first.errors.is_empty(), "{:?}", first.errors);

    let second = sweep.run().await.unwrap();
    assert_eq!(second.missed, 0);
    assert_eq!(second.auto_ended, 0);

    let missed_status: String =
        sqlx::query_scalar("SELECT status::text FROM jobs WHERE id = $1")
            .bind(job_missed)
            .fetch_one(&ctx.db_pool)
            .await
            .unwrap();
    assert_eq!(missed_status, "MISSED");

    let (running_status, ended_at): (String, Option<DateTime<Utc>>) =
        sqlx::query_as("SELECT status::text, ended_at FROM jobs WHERE id = $1")
            .bind(job_running)
            .fetch_one(&ctx.db_pool)
            .await
            .unwrap();
    assert_eq!(running_status, "AUTO_ENDED");
    assert!(ended_at.is_some());

    // The punch closes at the planned end, stamped AUTO.
    let (punch_out, punch_out_type): (Option<DateTime<Utc>>, Option<String>) = sqlx::query_as(
        "SELECT punch_out, punch_out_type::text FROM time_punches WHERE job_id = $1",
    )
    .bind(job_running)
    .fetch_one(&ctx.db_pool)
    .await
    .unwrap();
    assert_eq!(punch_out, ended_at);
    assert_eq!(punch_out_type.as_deref(), Some("AUTO"));

    // One notification per transition for the crew member, none repeated.
    let notifications: Vec<(Uuid, String)> = sqlx::query_as(
        "SELECT job_id, kind::text FROM notifications WHERE employee_id = $1 ORDER BY kind::text",
    )
    .bind(crew)
    .fetch_all(&ctx.db_pool)
    .await
    .unwrap();
    assert_eq!(
        notifications,
        vec![
            (job_running, "JOB_AUTO_ENDED".to_string()),
            (job_missed, "JOB_MISSED".to_string()),
        ]
    );
}
