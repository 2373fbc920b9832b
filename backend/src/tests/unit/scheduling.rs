//! Scheduling math shared between quotation updates, job starts, and the
//! sweep: the same derived window drives all three.

use chrono::{NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;

use crate::handlers::jobs::planned_seconds;
use crate::handlers::quotations::derive_schedule;

#[test]
fn window_and_planned_duration_agree() {
    let date = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
    let hours = Decimal::from(3);

    let (start, end) = derive_schedule(Some(date), Some("09:00"), Some(hours)).unwrap();
    assert_eq!(start, Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap());
    assert_eq!(end, Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap());

    let seconds = planned_seconds(Some(hours)).unwrap();
    assert_eq!((end - start).num_seconds(), seconds as i64);
}

#[test]
fn half_hour_estimates_round_trip() {
    let date = NaiveDate::from_ymd_opt(2025, 7, 15).unwrap();
    let hours: Decimal = "4.5".parse().unwrap();

    let (start, end) = derive_schedule(Some(date), Some("08:30"), Some(hours)).unwrap();
    assert_eq!((end - start).num_minutes(), 270);
    assert_eq!(planned_seconds(Some(hours)), Some(16200));
}
