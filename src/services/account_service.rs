/// Account queries used by the sync pipeline and the read API.
use sqlx::SqlitePool;

use crate::db;
use crate::models::EmailAccount;

pub async fn get_account(
    pool: &SqlitePool,
    account_id: &str,
) -> Result<Option<EmailAccount>, sqlx::Error> {
    sqlx::query_as::<_, EmailAccount>("SELECT * FROM accounts WHERE id = ?")
        .bind(account_id)
        .fetch_optional(pool)
        .await
}

pub async fn list_accounts(pool: &SqlitePool) -> Result<Vec<EmailAccount>, sqlx::Error> {
    sqlx::query_as::<_, EmailAccount>("SELECT * FROM accounts ORDER BY created_at DESC")
        .fetch_all(pool)
        .await
}

pub async fn delete_account(pool: &SqlitePool, account_id: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM accounts WHERE id = ?")
        .bind(account_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Stamp the attempt on the account. Runs at the start of every attempt so
/// an interrupted sync still shows one happened.
pub async fn touch_last_synced(pool: &SqlitePool, account_id: &str) -> Result<(), sqlx::Error> {
    let now = db::now_epoch();
    sqlx::query("UPDATE accounts SET last_synced_at = ?, updated_at = ? WHERE id = ?")
        .bind(now)
        .bind(now)
        .bind(account_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Accounts whose sync frequency has elapsed since their last attempt.
pub async fn accounts_due_for_sync(
    pool: &SqlitePool,
    now: i64,
) -> Result<Vec<EmailAccount>, sqlx::Error> {
    sqlx::query_as::<_, EmailAccount>(
        "SELECT * FROM accounts
         WHERE last_synced_at IS NULL OR ? - last_synced_at >= sync_frequency_secs",
    )
    .bind(now)
    .fetch_all(pool)
    .await
}
