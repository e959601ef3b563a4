use reqwest::StatusCode;
use sqlx::SqlitePool;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::SyncError;
use crate::gmail::token;
use crate::gmail::wire::{Message, MessageListResponse, MessageRef};
use crate::models::EmailAccount;

/// Page size for the message-list call.
pub const LIST_PAGE_SIZE: u32 = 50;

/// Upper bound on detail fetches per sync attempt. Bounds latency and quota
/// cost of one attempt; a deliberate trade-off, not an architectural limit —
/// the next attempt picks up where this one left off.
pub const DETAIL_FETCH_CAP: usize = 25;

/// Gmail REST client for one account. Holds the working access token and
/// transparently retries a call once after a token refresh on a 401.
pub struct GmailClient<'a> {
    http: &'a reqwest::Client,
    pool: &'a SqlitePool,
    config: &'a Config,
    account: &'a EmailAccount,
    access_token: Option<String>,
}

impl<'a> GmailClient<'a> {
    pub fn new(
        http: &'a reqwest::Client,
        pool: &'a SqlitePool,
        config: &'a Config,
        account: &'a EmailAccount,
    ) -> Self {
        Self {
            http,
            pool,
            config,
            account,
            access_token: account.access_token.clone(),
        }
    }

    /// List candidate message ids. Order is whatever the provider returns;
    /// callers must not assume chronology.
    pub async fn list_message_ids(
        &mut self,
        query: Option<&str>,
    ) -> Result<Vec<MessageRef>, SyncError> {
        let url = format!("{}/users/me/messages", self.config.gmail_api_base);
        let mut params = vec![("maxResults".to_string(), LIST_PAGE_SIZE.to_string())];
        if let Some(q) = query {
            params.push(("q".to_string(), q.to_string()));
        }

        let resp = self.authorized_get(&url, &params).await?;
        let list: MessageListResponse = resp
            .json()
            .await
            .map_err(|e| SyncError::ProviderRequestFailed {
                status: 0,
                message: format!("unparseable list response: {e}"),
            })?;
        Ok(list.messages.unwrap_or_default())
    }

    /// Fetch one message in full format.
    pub async fn get_message(&mut self, message_id: &str) -> Result<Message, SyncError> {
        let url = format!(
            "{}/users/me/messages/{}",
            self.config.gmail_api_base, message_id
        );
        let params = vec![("format".to_string(), "full".to_string())];

        let resp = self.authorized_get(&url, &params).await?;
        resp.json()
            .await
            .map_err(|e| SyncError::ProviderRequestFailed {
                status: 0,
                message: format!("unparseable message response: {e}"),
            })
    }

    /// Authorized GET with the single-refresh policy: a 401 triggers exactly
    /// one token refresh and one retry of the same call; a second 401 is
    /// terminal. Any other non-success status is a provider failure and does
    /// not touch the token.
    async fn authorized_get(
        &mut self,
        url: &str,
        params: &[(String, String)],
    ) -> Result<reqwest::Response, SyncError> {
        let mut refreshed = false;

        if self.access_token.is_none() {
            self.refresh_token(&mut refreshed).await?;
        }

        loop {
            let token = self.access_token.as_deref().unwrap_or_default();
            let resp = self
                .http
                .get(url)
                .bearer_auth(token)
                .query(params)
                .send()
                .await
                .map_err(request_error)?;

            if resp.status() == StatusCode::UNAUTHORIZED {
                if refreshed {
                    warn!(account_id = %self.account.id, "still unauthorized after refresh");
                    return Err(SyncError::AuthenticationExpired);
                }
                debug!(account_id = %self.account.id, "401 from provider, refreshing token");
                self.refresh_token(&mut refreshed).await?;
                continue;
            }

            if !resp.status().is_success() {
                return Err(provider_error(resp).await);
            }

            return Ok(resp);
        }
    }

    async fn refresh_token(&mut self, refreshed: &mut bool) -> Result<(), SyncError> {
        if self.account.refresh_token.is_none() {
            // Nothing to recover with; the user has to reconnect.
            return Err(SyncError::AuthenticationExpired);
        }
        let new_token =
            token::refresh_access_token(self.pool, self.http, self.config, self.account).await?;
        self.access_token = Some(new_token);
        *refreshed = true;
        Ok(())
    }
}

fn request_error(e: reqwest::Error) -> SyncError {
    if e.is_timeout() {
        SyncError::RequestTimedOut
    } else {
        SyncError::ProviderRequestFailed {
            status: 0,
            message: e.to_string(),
        }
    }
}

/// Pull the human-readable message out of Gmail's error envelope when the
/// body matches it, otherwise keep the raw body.
async fn provider_error(resp: reqwest::Response) -> SyncError {
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .unwrap_or(body);
    SyncError::ProviderRequestFailed { status, message }
}
