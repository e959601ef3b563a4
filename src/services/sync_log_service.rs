use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tokio::sync::broadcast;
use tracing::warn;

use crate::db;
use crate::models::{SyncKind, SyncLogDetails, SyncLogEntry, SyncStatus};

/// Keep only this many entries per account; older ones are pruned after
/// every write.
pub const LOG_RETENTION_PER_ACCOUNT: i64 = 50;

/// Append-only audit of sync attempts, with a broadcast feed for live
/// observers. Terminal entries are write-once: the in-place completion of a
/// `scheduled`/`processing` placeholder refuses rows that already reached a
/// terminal status.
pub struct SyncLogRecorder {
    pool: SqlitePool,
    events: broadcast::Sender<SyncLogEntry>,
}

impl SyncLogRecorder {
    pub fn new(pool: SqlitePool) -> Self {
        let (events, _) = broadcast::channel(100);
        Self { pool, events }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncLogEntry> {
        self.events.subscribe()
    }

    /// Append an entry. Manual syncs write their terminal entry here;
    /// scheduled syncs go through `begin_scheduled`/`complete` instead.
    pub async fn record(
        &self,
        account_id: &str,
        status: SyncStatus,
        message_count: i64,
        error_message: Option<&str>,
        details: &SyncLogDetails,
        kind: SyncKind,
    ) -> Result<SyncLogEntry, sqlx::Error> {
        let details_json =
            serde_json::to_string(details).unwrap_or_else(|_| "{}".to_string());
        let now = db::now_epoch();
        let result = sqlx::query(
            "INSERT INTO sync_logs (account_id, timestamp, status, message_count, error_message, details, sync_kind)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(account_id)
        .bind(now)
        .bind(status.as_str())
        .bind(message_count)
        .bind(error_message)
        .bind(&details_json)
        .bind(kind.as_str())
        .execute(&self.pool)
        .await?;

        let entry = self.fetch(result.last_insert_rowid()).await?;
        let _ = self.events.send(entry.clone());
        self.prune(account_id).await;
        Ok(entry)
    }

    /// Insert a `scheduled` placeholder at attempt start (the scheduled-sync
    /// path); it is later completed in place.
    pub async fn begin_scheduled(
        &self,
        account_id: &str,
        details: &SyncLogDetails,
    ) -> Result<i64, sqlx::Error> {
        let entry = self
            .record(
                account_id,
                SyncStatus::Scheduled,
                0,
                None,
                details,
                SyncKind::Scheduled,
            )
            .await?;
        Ok(entry.id)
    }

    /// Move a placeholder to `processing` once the attempt actually starts.
    pub async fn mark_processing(&self, log_id: i64) -> Result<(), sqlx::Error> {
        let updated = sqlx::query(
            "UPDATE sync_logs SET status = 'processing', timestamp = ? WHERE id = ? AND status = 'scheduled'",
        )
        .bind(db::now_epoch())
        .bind(log_id)
        .execute(&self.pool)
        .await?;
        if updated.rows_affected() > 0 {
            if let Ok(entry) = self.fetch(log_id).await {
                let _ = self.events.send(entry);
            }
        }
        Ok(())
    }

    /// Complete a placeholder with its terminal status. Rows that already
    /// reached a terminal status are left untouched.
    pub async fn complete(
        &self,
        log_id: i64,
        status: SyncStatus,
        message_count: i64,
        error_message: Option<&str>,
        details: &SyncLogDetails,
    ) -> Result<Option<SyncLogEntry>, sqlx::Error> {
        let details_json =
            serde_json::to_string(details).unwrap_or_else(|_| "{}".to_string());
        let updated = sqlx::query(
            "UPDATE sync_logs
             SET status = ?, message_count = ?, error_message = ?, details = ?, timestamp = ?
             WHERE id = ? AND status IN ('scheduled', 'processing')",
        )
        .bind(status.as_str())
        .bind(message_count)
        .bind(error_message)
        .bind(&details_json)
        .bind(db::now_epoch())
        .bind(log_id)
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 {
            warn!(log_id, "refusing to overwrite a terminal sync log entry");
            return Ok(None);
        }

        let entry = self.fetch(log_id).await?;
        let _ = self.events.send(entry.clone());
        self.prune(&entry.account_id).await;
        Ok(Some(entry))
    }

    /// Entries for an account, newest first, filterable by minimum message
    /// count, paginated by limit/offset.
    pub async fn list(
        &self,
        account_id: &str,
        min_count: Option<i64>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<SyncLogEntry>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT id, account_id, timestamp, status, message_count, error_message, details, sync_kind
             FROM sync_logs
             WHERE account_id = ? AND message_count >= ?
             ORDER BY timestamp DESC, id DESC
             LIMIT ? OFFSET ?",
        )
        .bind(account_id)
        .bind(min_count.unwrap_or(0))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(row_to_entry).collect())
    }

    async fn fetch(&self, log_id: i64) -> Result<SyncLogEntry, sqlx::Error> {
        let row = sqlx::query(
            "SELECT id, account_id, timestamp, status, message_count, error_message, details, sync_kind
             FROM sync_logs WHERE id = ?",
        )
        .bind(log_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row_to_entry(row))
    }

    /// Best-effort retention: keep the most recent N per account, delete the
    /// rest oldest-first.
    async fn prune(&self, account_id: &str) {
        let result = sqlx::query(
            "DELETE FROM sync_logs
             WHERE account_id = ?
               AND id NOT IN (
                   SELECT id FROM sync_logs WHERE account_id = ?
                   ORDER BY timestamp DESC, id DESC LIMIT ?
               )",
        )
        .bind(account_id)
        .bind(account_id)
        .bind(LOG_RETENTION_PER_ACCOUNT)
        .execute(&self.pool)
        .await;
        if let Err(e) = result {
            warn!(account_id, "sync log prune failed: {e}");
        }
    }
}

fn row_to_entry(row: SqliteRow) -> SyncLogEntry {
    let details_raw: String = row.try_get("details").unwrap_or_default();
    let status_raw: String = row.try_get("status").unwrap_or_default();
    let kind_raw: String = row.try_get("sync_kind").unwrap_or_default();
    SyncLogEntry {
        id: row.try_get("id").unwrap_or_default(),
        account_id: row.try_get("account_id").unwrap_or_default(),
        timestamp: row.try_get("timestamp").unwrap_or_default(),
        status: SyncStatus::from_str(&status_raw),
        message_count: row.try_get("message_count").unwrap_or_default(),
        error_message: row.try_get("error_message").unwrap_or_default(),
        details: serde_json::from_str(&details_raw).unwrap_or(serde_json::Value::Null),
        sync_kind: SyncKind::from_str(&kind_raw),
    }
}
