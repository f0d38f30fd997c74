//! Retention GC
//!
//! Deletes probe results and alert records past their retention windows.
//! Runs once shortly after startup, then daily at 03:00 local time, off the
//! scheduler's hot path.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, TimeZone, Utc};
use tokio::task::JoinHandle;
use tracing::{error, info, instrument};

use crate::storage::Store;

/// Wait before the initial sweep so startup isn't competing with it.
const STARTUP_DELAY: Duration = Duration::from_secs(5);

/// Alert records are kept at least this long regardless of the result window.
const MIN_ALERT_RETENTION_DAYS: u32 = 90;

pub struct RetentionSweeper {
    store: Arc<dyn Store>,
    result_retention_days: u32,
    alert_retention_days: u32,
}

impl RetentionSweeper {
    pub fn new(store: Arc<dyn Store>, result_retention_days: u32) -> Self {
        Self {
            store,
            result_retention_days,
            alert_retention_days: result_retention_days.max(MIN_ALERT_RETENTION_DAYS),
        }
    }

    pub fn alert_retention_days(&self) -> u32 {
        self.alert_retention_days
    }

    /// Spawn the background loop: initial sweep after a short delay, then
    /// daily at 03:00 local.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                result_days = self.result_retention_days,
                alert_days = self.alert_retention_days,
                "retention sweeper started"
            );

            tokio::time::sleep(STARTUP_DELAY).await;
            self.sweep().await;

            loop {
                tokio::time::sleep(until_next_run()).await;
                self.sweep().await;
            }
        })
    }

    /// One full retention pass.
    #[instrument(skip(self))]
    pub async fn sweep(&self) {
        let now = Utc::now();

        let result_cutoff = now - chrono::Duration::days(self.result_retention_days as i64);
        match self.store.delete_results_before(result_cutoff).await {
            Ok(deleted) => info!(deleted, "expired probe results removed"),
            Err(e) => error!("failed to delete expired probe results: {e}"),
        }

        let alert_cutoff = now - chrono::Duration::days(self.alert_retention_days as i64);
        match self.store.delete_alerts_before(alert_cutoff).await {
            Ok(deleted) => info!(deleted, "expired alert records removed"),
            Err(e) => error!("failed to delete expired alert records: {e}"),
        }
    }
}

/// Time until the next 03:00 local.
fn until_next_run() -> Duration {
    let now = Local::now();
    let today_three = now
        .date_naive()
        .and_hms_opt(3, 0, 0)
        .expect("03:00:00 is a valid time");

    let mut next = today_three;
    if Local
        .from_local_datetime(&next)
        .earliest()
        .map(|t| t <= now)
        .unwrap_or(true)
    {
        next += chrono::Duration::days(1);
    }

    Local
        .from_local_datetime(&next)
        .earliest()
        .and_then(|t| (t - now).to_std().ok())
        .unwrap_or(Duration::from_secs(24 * 60 * 60))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AlertRecord, AlertStatus, ProbeResultRecord};
    use crate::storage::MemoryStore;

    #[test]
    fn next_run_is_within_a_day() {
        let wait = until_next_run();
        assert!(wait <= Duration::from_secs(24 * 60 * 60));
        assert!(wait > Duration::ZERO);
    }

    #[test]
    fn alert_retention_never_below_floor() {
        let store = Arc::new(MemoryStore::new());
        assert_eq!(RetentionSweeper::new(store.clone(), 7).alert_retention_days(), 90);
        assert_eq!(
            RetentionSweeper::new(store, 365).alert_retention_days(),
            365
        );
    }

    #[tokio::test]
    async fn sweep_removes_only_expired_rows() {
        let store = Arc::new(MemoryStore::new());
        let now = Utc::now();

        for age_days in [5i64, 45] {
            store
                .insert_result(&ProbeResultRecord {
                    id: 0,
                    target_id: 1,
                    success: true,
                    latency_ms: 1,
                    message: "ok".to_string(),
                    metrics: None,
                    warnings: None,
                    checked_at: now - chrono::Duration::days(age_days),
                })
                .await
                .unwrap();
        }

        for age_days in [30i64, 120] {
            store
                .insert_alert(&AlertRecord {
                    id: 0,
                    target_id: 1,
                    target_name: "t".to_string(),
                    target_kind: "tcp".to_string(),
                    status: AlertStatus::Resolved,
                    message: "was down".to_string(),
                    latency_ms: 0,
                    fired_at: now - chrono::Duration::days(age_days),
                    resolved_at: Some(now - chrono::Duration::days(age_days)),
                    notified: true,
                })
                .await
                .unwrap();
        }

        let sweeper = RetentionSweeper::new(store.clone(), 30);
        sweeper.sweep().await;

        let (results, _) = store
            .list_results(&crate::storage::ResultQuery {
                target_id: 1,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(results.len(), 1);

        let (alerts, _) = store
            .list_alerts(&crate::storage::AlertQuery::default())
            .await
            .unwrap();
        assert_eq!(alerts.len(), 1);
    }
}
