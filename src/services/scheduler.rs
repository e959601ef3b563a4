use std::sync::Arc;
use std::time::Duration;

use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::config::Config;
use crate::db;
use crate::models::sync_log::ScheduleParams;
use crate::models::SyncLogDetails;
use crate::services::sync_lock::SyncLockManager;
use crate::services::sync_log_service::SyncLogRecorder;
use crate::services::sync_service::{self, SyncPolicy, SyncRequest};
use crate::services::account_service;

/// Starts the background sync scheduler. Every tick it scans for accounts
/// past their sync frequency, writes a `scheduled` placeholder log entry,
/// and spawns an attempt wired to it.
pub fn start(
    pool: SqlitePool,
    config: Arc<Config>,
    http: reqwest::Client,
    recorder: Arc<SyncLogRecorder>,
    locks: SyncLockManager,
) {
    tokio::spawn(async move {
        loop {
            let tick_start = std::time::Instant::now();
            if let Err(e) = tick(&pool, &config, &http, &recorder, &locks).await {
                warn!("scheduler tick failed: {e}");
            }
            // sleep the remainder of the 60s tick
            let elapsed = tick_start.elapsed();
            let sleep_ms = 60_000u64.saturating_sub(elapsed.as_millis() as u64);
            tokio::time::sleep(Duration::from_millis(sleep_ms.max(1))).await;
        }
    });
}

async fn tick(
    pool: &SqlitePool,
    config: &Arc<Config>,
    http: &reqwest::Client,
    recorder: &Arc<SyncLogRecorder>,
    locks: &SyncLockManager,
) -> anyhow::Result<()> {
    let due = account_service::accounts_due_for_sync(pool, db::now_epoch()).await?;
    for account in due {
        if locks.is_locked(&account.id) {
            continue;
        }

        let details = SyncLogDetails {
            account_email: account.email.clone(),
            schedule: Some(ScheduleParams {
                frequency_secs: account.sync_frequency_secs,
            }),
            ..Default::default()
        };
        let log_id = recorder.begin_scheduled(&account.id, &details).await?;

        let req = SyncRequest {
            account_id: account.id.clone(),
            scheduled: true,
            sync_log_id: Some(log_id),
            ..Default::default()
        };

        let pool = pool.clone();
        let config = config.clone();
        let http = http.clone();
        let recorder = recorder.clone();
        let locks = locks.clone();
        tokio::spawn(async move {
            let policy = SyncPolicy::default();
            match sync_service::run_sync(&pool, &http, &config, &recorder, &locks, &policy, &req)
                .await
            {
                Ok(outcome) => info!(
                    account_id = %req.account_id,
                    status = outcome.status.as_str(),
                    count = outcome.count,
                    "scheduled sync completed"
                ),
                Err(e) => warn!(account_id = %req.account_id, "scheduled sync failed: {e}"),
            }
        });
    }
    Ok(())
}
