//! Nightly maintenance: drop expired signup sessions and flip stale SENT
//! quotations to EXPIRED. The lazy flip on public view covers quotations
//! that are looked at between runs; this catches the rest.

use std::sync::Arc;

use crate::services::signup_store;
use crate::AppState;

pub struct MaintenanceJob {
    state: Arc<AppState>,
}

#[derive(Debug, Default)]
pub struct MaintenanceResult {
    pub purged_signups: u64,
    pub expired_quotations: u64,
}

impl MaintenanceJob {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    pub async fn run(&self) -> Result<MaintenanceResult, sqlx::Error> {
        let purged_signups = signup_store::purge_expired(&self.state.db_pool).await?;

        let expired = sqlx::query(
            "UPDATE quotations SET status = 'EXPIRED', updated_at = NOW() \
             WHERE status = 'SENT' AND expires_at IS NOT NULL AND expires_at < NOW()",
        )
        .execute(&self.state.db_pool)
        .await?;

        Ok(MaintenanceResult {
            purged_signups,
            expired_quotations: expired.rows_affected(),
        })
    }
}
