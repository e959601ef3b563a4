use serde_json::Value;
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::config::Config;
use crate::db;
use crate::error::SyncError;
use crate::models::EmailAccount;

/// Exchange the account's refresh token for a new access token and persist
/// it before returning, so concurrent readers observe a consistent value.
/// No retry here; transient-failure policy belongs to the caller.
pub async fn refresh_access_token(
    pool: &SqlitePool,
    http: &reqwest::Client,
    config: &Config,
    account: &EmailAccount,
) -> Result<String, SyncError> {
    let refresh_token = account
        .refresh_token
        .as_deref()
        .ok_or(SyncError::MissingCredentials)?;

    if config.google_client_id.is_empty() {
        return Err(SyncError::MisconfiguredProvider("GOOGLE_CLIENT_ID"));
    }
    if config.google_client_secret.is_empty() {
        return Err(SyncError::MisconfiguredProvider("GOOGLE_CLIENT_SECRET"));
    }

    let resp = http
        .post(&config.google_token_url)
        .form(&[
            ("client_id", config.google_client_id.as_str()),
            ("client_secret", config.google_client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ])
        .send()
        .await
        .map_err(|e| {
            if e.is_timeout() {
                SyncError::RequestTimedOut
            } else {
                SyncError::ProviderRequestFailed {
                    status: 0,
                    message: e.to_string(),
                }
            }
        })?;

    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();

    if !status.is_success() {
        let description = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|v| {
                v.get("error_description")
                    .or_else(|| v.get("error"))
                    .and_then(|d| d.as_str())
                    .map(str::to_string)
            })
            .unwrap_or_else(|| format!("{} {}", status.as_u16(), body));
        warn!(account_id = %account.id, "token refresh rejected: {description}");
        return Err(SyncError::TokenRefreshFailed(description));
    }

    let parsed: Value = serde_json::from_str(&body)
        .map_err(|e| SyncError::TokenRefreshFailed(format!("unparseable token response: {e}")))?;
    let access_token = parsed
        .get("access_token")
        .and_then(|t| t.as_str())
        .ok_or_else(|| SyncError::TokenRefreshFailed("missing access_token in response".into()))?
        .to_string();
    // Google occasionally rotates the refresh token; keep the old one otherwise
    let new_refresh = parsed
        .get("refresh_token")
        .and_then(|t| t.as_str())
        .unwrap_or(refresh_token);

    let now = db::now_epoch();
    sqlx::query(
        "UPDATE accounts SET access_token = ?, refresh_token = ?, token_refreshed_at = ?, updated_at = ? WHERE id = ?",
    )
    .bind(&access_token)
    .bind(new_refresh)
    .bind(now)
    .bind(now)
    .bind(&account.id)
    .execute(pool)
    .await?;

    info!(account_id = %account.id, "access token refreshed");
    Ok(access_token)
}
