//! Status-machine guards that every lifecycle handler leans on.

use haulbase_shared::{JobStatus, QuotationStatus};

#[test]
fn quotation_editability_only_before_send() {
    assert!(QuotationStatus::InProgress.is_editable());
    assert!(QuotationStatus::Draft.is_editable());
    assert!(!QuotationStatus::Sent.is_editable());
    assert!(!QuotationStatus::Signed.is_editable());
    assert!(!QuotationStatus::Rejected.is_editable());
    assert!(!QuotationStatus::Expired.is_editable());
    assert!(!QuotationStatus::Archived.is_editable());
}

#[test]
fn job_terminal_states() {
    assert!(!JobStatus::Pending.is_terminal());
    assert!(!JobStatus::Scheduled.is_terminal());
    assert!(!JobStatus::Confirmed.is_terminal());
    assert!(!JobStatus::InProgress.is_terminal());
    assert!(JobStatus::Completed.is_terminal());
    assert!(JobStatus::Cancelled.is_terminal());
    assert!(JobStatus::Missed.is_terminal());
    assert!(JobStatus::AutoEnded.is_terminal());
}

#[test]
fn calendar_colors_by_status() {
    assert_eq!(JobStatus::Confirmed.calendar_color(), "#2A9D8F");
    assert_eq!(JobStatus::InProgress.calendar_color(), "#457B9D");
    assert_eq!(JobStatus::Completed.calendar_color(), "#6C757D");
    assert_eq!(JobStatus::Cancelled.calendar_color(), "#E63946");
    assert_eq!(JobStatus::Missed.calendar_color(), "#E63946");
}
