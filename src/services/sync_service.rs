use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::SqlitePool;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::SyncError;
use crate::gmail::client::{GmailClient, DETAIL_FETCH_CAP};
use crate::gmail::wire::Message;
use crate::models::sync_log::{ScheduleParams, SyncedMessageSummary};
use crate::models::{EmailAccount, SyncKind, SyncLogDetails, SyncStatus};
use crate::services::newsletter_service::{self, Stored};
use crate::services::sync_lock::SyncLockManager;
use crate::services::sync_log_service::SyncLogRecorder;
use crate::services::account_service;

/// Backoff strategy for transient attempt failures: a fixed number of
/// attempts with the delay doubling between them.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Delay to sleep after `attempts_made` attempts have failed.
    pub fn delay_for(&self, attempts_made: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempts_made.saturating_sub(1))
    }
}

/// Attempt-level knobs, injectable so tests run fast and deterministic.
#[derive(Debug, Clone)]
pub struct SyncPolicy {
    pub retry: RetryPolicy,
    pub fetch_timeout: Duration,
}

impl Default for SyncPolicy {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            fetch_timeout: Duration::from_secs(30),
        }
    }
}

/// The invocation payload of one sync attempt.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SyncRequest {
    #[serde(rename = "accountId", default)]
    pub account_id: String,
    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub verbose: bool,
    #[serde(default)]
    pub import_all_emails: bool,
    #[serde(default)]
    pub scheduled: bool,
    #[serde(default)]
    pub sync_log_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedMessage {
    pub gmail_message_id: String,
    pub error: String,
}

/// Terminal result of one attempt, already durably logged by the time the
/// caller sees it.
#[derive(Debug)]
pub struct SyncOutcome {
    pub status: SyncStatus,
    pub count: i64,
    pub synced: Vec<SyncedMessageSummary>,
    pub failed: Vec<FailedMessage>,
    pub warning: Option<String>,
    pub details: SyncLogDetails,
    pub debug_info: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Validating,
    Fetching,
    Processing,
    Finalizing,
}

struct AttemptStats {
    fetched: usize,
    synced: Vec<SyncedMessageSummary>,
    failed: Vec<FailedMessage>,
    senders: BTreeSet<String>,
}

/// Drive one sync attempt end to end: validate the account, fetch and
/// process under the retry/timeout policy, classify, and log the terminal
/// outcome before returning.
pub async fn run_sync(
    pool: &SqlitePool,
    http: &reqwest::Client,
    config: &Config,
    recorder: &SyncLogRecorder,
    locks: &SyncLockManager,
    policy: &SyncPolicy,
    req: &SyncRequest,
) -> Result<SyncOutcome, SyncError> {
    // one attempt per account at a time, held for the whole attempt
    let _lease = locks.acquire(&req.account_id)?;
    let started = std::time::Instant::now();

    let mut phase = Phase::Validating;
    debug!(account_id = %req.account_id, ?phase, "sync attempt starting");

    let account = account_service::get_account(pool, &req.account_id)
        .await?
        .ok_or_else(|| SyncError::AccountNotFound(req.account_id.clone()))?;

    let kind = if req.scheduled {
        SyncKind::Scheduled
    } else {
        SyncKind::Manual
    };

    if !account.has_credentials() {
        let err = SyncError::MissingCredentials;
        record_failure(recorder, &account, req, kind, &err).await;
        return Err(err);
    }

    // stamp the attempt up front so an interrupted sync still shows one
    account_service::touch_last_synced(pool, &account.id).await?;

    if let Some(log_id) = req.sync_log_id {
        if let Err(e) = recorder.mark_processing(log_id).await {
            warn!(log_id, "could not mark sync log processing: {e}");
        }
    }

    let query = if req.import_all_emails {
        None
    } else {
        account.last_synced_at.map(|ts| format!("after:{ts}"))
    };

    let mut attempts = 0u32;
    let stats = loop {
        attempts += 1;
        phase = Phase::Fetching;
        debug!(account_id = %account.id, ?phase, attempt = attempts, "fetching");
        match fetch_and_process(pool, http, config, &account, query.as_deref(), policy, &mut phase)
            .await
        {
            Ok(stats) => break stats,
            Err(e) if e.is_transient() && attempts < policy.retry.max_attempts => {
                let delay = policy.retry.delay_for(attempts);
                warn!(
                    account_id = %account.id,
                    attempt = attempts,
                    error = %e,
                    "transient sync failure, backing off for {delay:?}"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                record_failure(recorder, &account, req, kind, &e).await;
                return Err(e);
            }
        }
    };

    phase = Phase::Finalizing;
    debug!(account_id = %account.id, ?phase, "classifying outcome");

    let (status, warning, error_message) =
        classify_outcome(stats.fetched, stats.synced.len(), stats.failed.len());

    let senders: Vec<String> = stats.senders.iter().cloned().collect();
    let mut details = SyncLogDetails {
        total: stats.fetched as u64,
        synced: stats.synced.len() as u64,
        failed: stats.failed.len() as u64,
        new_sender_count: senders.len() as u64,
        senders,
        account_email: account.email.clone(),
        schedule: None,
        messages: None,
    };
    if req.verbose {
        details.messages = Some(stats.synced.clone());
    }
    if req.scheduled {
        details.schedule = Some(ScheduleParams {
            frequency_secs: account.sync_frequency_secs,
        });
    }

    let count = stats.synced.len() as i64;
    write_terminal_log(
        recorder,
        &account.id,
        req,
        kind,
        status,
        count,
        error_message.as_deref(),
        &details,
    )
    .await;

    info!(
        account_id = %account.id,
        status = status.as_str(),
        count,
        failed = stats.failed.len(),
        "sync attempt finished"
    );

    let debug_info = req.debug.then(|| {
        json!({
            "attempts": attempts,
            "durationMs": started.elapsed().as_millis() as u64,
            "query": query,
            "fetched": stats.fetched,
        })
    });

    Ok(SyncOutcome {
        status,
        count,
        synced: stats.synced,
        failed: stats.failed,
        warning,
        details,
        debug_info,
    })
}

/// One fetch+process pass. The fetch half is bounded by the policy timeout,
/// which aborts the in-flight provider call; persistence runs one message at
/// a time so a bad message stays attributable and isolated.
async fn fetch_and_process(
    pool: &SqlitePool,
    http: &reqwest::Client,
    config: &Config,
    account: &EmailAccount,
    query: Option<&str>,
    policy: &SyncPolicy,
    phase: &mut Phase,
) -> Result<AttemptStats, SyncError> {
    let mut client = GmailClient::new(http, pool, config, account);

    let (fetched, messages, mut failed) = timeout(policy.fetch_timeout, async {
        let refs = client.list_message_ids(query).await?;
        let fetched = refs.len();
        let mut messages: Vec<Message> = Vec::new();
        let mut failed: Vec<FailedMessage> = Vec::new();
        for message_ref in refs.iter().take(DETAIL_FETCH_CAP) {
            match client.get_message(&message_ref.id).await {
                Ok(message) => messages.push(message),
                // a provider rejection of one message is isolated like a
                // persistence failure; auth expiry and timeouts still abort
                Err(SyncError::ProviderRequestFailed { status, message }) => {
                    warn!(
                        account_id = %account.id,
                        message_id = %message_ref.id,
                        "detail fetch rejected ({status}): {message}"
                    );
                    failed.push(FailedMessage {
                        gmail_message_id: message_ref.id.clone(),
                        error: format!("fetch failed ({status}): {message}"),
                    });
                }
                Err(e) => return Err(e),
            }
        }
        Ok::<_, SyncError>((fetched, messages, failed))
    })
    .await
    .map_err(|_| SyncError::RequestTimedOut)??;

    *phase = Phase::Processing;
    debug!(account_id = %account.id, ?phase, fetched, "persisting fetched messages");

    let mut synced = Vec::new();
    let mut senders = BTreeSet::new();
    for message in &messages {
        let item = newsletter_service::build_newsletter(message);
        match newsletter_service::store_newsletter(pool, &account.id, &item).await {
            Ok(Stored::Created(_)) => {
                senders.insert(item.sender_email.clone());
                synced.push(SyncedMessageSummary {
                    gmail_message_id: item.gmail_message_id,
                    title: item.title,
                    sender_email: item.sender_email,
                });
            }
            Ok(Stored::Duplicate) => {}
            Err(e) => {
                warn!(
                    account_id = %account.id,
                    message_id = %message.id,
                    "message failed to persist: {e}"
                );
                failed.push(FailedMessage {
                    gmail_message_id: message.id.clone(),
                    error: e.to_string(),
                });
            }
        }
    }

    Ok(AttemptStats {
        fetched,
        synced,
        failed,
        senders,
    })
}

/// Outcome classification. Returns (status, warning, error message).
/// Zero fetched messages is a normal, successful outcome, as is a rerun
/// where everything deduplicated away.
pub fn classify_outcome(
    _fetched: usize,
    synced: usize,
    failed: usize,
) -> (SyncStatus, Option<String>, Option<String>) {
    if failed > 0 && synced > 0 {
        (
            SyncStatus::Partial,
            Some("some emails failed to sync".to_string()),
            None,
        )
    } else if failed > 0 {
        (
            SyncStatus::Failed,
            None,
            Some("all emails failed to sync".to_string()),
        )
    } else {
        (SyncStatus::Success, None, None)
    }
}

async fn record_failure(
    recorder: &SyncLogRecorder,
    account: &EmailAccount,
    req: &SyncRequest,
    kind: SyncKind,
    err: &SyncError,
) {
    let details = SyncLogDetails {
        account_email: account.email.clone(),
        ..Default::default()
    };
    let message = err.to_string();
    write_terminal_log(
        recorder,
        &account.id,
        req,
        kind,
        SyncStatus::Failed,
        0,
        Some(&message),
        &details,
    )
    .await;
}

#[allow(clippy::too_many_arguments)]
async fn write_terminal_log(
    recorder: &SyncLogRecorder,
    account_id: &str,
    req: &SyncRequest,
    kind: SyncKind,
    status: SyncStatus,
    count: i64,
    error_message: Option<&str>,
    details: &SyncLogDetails,
) {
    let result = match req.sync_log_id {
        Some(log_id) => recorder
            .complete(log_id, status, count, error_message, details)
            .await
            .map(|_| ()),
        None => recorder
            .record(account_id, status, count, error_message, details, kind)
            .await
            .map(|_| ()),
    };
    if let Err(e) = result {
        warn!(account_id, "failed to write sync log entry: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_partial_when_both_synced_and_failed() {
        let (status, warning, error) = classify_outcome(10, 8, 2);
        assert_eq!(status, SyncStatus::Partial);
        assert_eq!(warning.as_deref(), Some("some emails failed to sync"));
        assert!(error.is_none());
    }

    #[test]
    fn classification_success_when_nothing_failed() {
        let (status, warning, error) = classify_outcome(5, 5, 0);
        assert_eq!(status, SyncStatus::Success);
        assert!(warning.is_none());
        assert!(error.is_none());
    }

    #[test]
    fn classification_failed_when_nothing_synced() {
        let (status, warning, error) = classify_outcome(3, 0, 3);
        assert_eq!(status, SyncStatus::Failed);
        assert!(warning.is_none());
        assert_eq!(error.as_deref(), Some("all emails failed to sync"));
    }

    #[test]
    fn classification_empty_mailbox_is_success() {
        let (status, warning, error) = classify_outcome(0, 0, 0);
        assert_eq!(status, SyncStatus::Success);
        assert!(warning.is_none());
        assert!(error.is_none());
    }

    #[test]
    fn backoff_delays_strictly_increase() {
        let policy = RetryPolicy {
            max_attempts: 4,
            base_delay: Duration::from_millis(100),
        };
        let delays: Vec<Duration> = (1..4).map(|n| policy.delay_for(n)).collect();
        assert_eq!(delays[0], Duration::from_millis(100));
        assert_eq!(delays[1], Duration::from_millis(200));
        assert_eq!(delays[2], Duration::from_millis(400));
        assert!(delays.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn sync_request_uses_wire_field_names() {
        let req: SyncRequest = serde_json::from_str(
            r#"{"accountId":"acc-1","debug":true,"import_all_emails":true,"sync_log_id":7}"#,
        )
        .expect("deserialize");
        assert_eq!(req.account_id, "acc-1");
        assert!(req.debug);
        assert!(req.import_all_emails);
        assert_eq!(req.sync_log_id, Some(7));
        assert!(!req.scheduled);
        assert!(!req.verbose);
    }
}
