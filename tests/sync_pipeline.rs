//! End-to-end pipeline tests against an in-memory store and a local mock of
//! the Gmail REST surface.
mod common;

use std::sync::Arc;
use std::time::Duration;

use newsletter_hub::config::Config;
use newsletter_hub::error::SyncError;
use newsletter_hub::models::{SyncStatus, SyncKind};
use newsletter_hub::services::sync_lock::SyncLockManager;
use newsletter_hub::services::sync_log_service::SyncLogRecorder;
use newsletter_hub::services::sync_service::{
    run_sync, RetryPolicy, SyncOutcome, SyncPolicy, SyncRequest,
};
use sqlx::SqlitePool;

use common::*;

struct Harness {
    pool: SqlitePool,
    http: reqwest::Client,
    config: Config,
    recorder: SyncLogRecorder,
    locks: SyncLockManager,
    policy: SyncPolicy,
    mock: Arc<MockState>,
}

async fn harness() -> Harness {
    let mock = MockState::new();
    let base = spawn_mock(mock.clone()).await;
    let pool = test_pool().await;
    Harness {
        recorder: SyncLogRecorder::new(pool.clone()),
        locks: SyncLockManager::new(),
        policy: SyncPolicy {
            retry: RetryPolicy {
                max_attempts: 3,
                base_delay: Duration::from_millis(5),
            },
            fetch_timeout: Duration::from_secs(5),
        },
        http: reqwest::Client::new(),
        config: test_config(&base),
        pool,
        mock,
    }
}

impl Harness {
    async fn sync(&self, req: &SyncRequest) -> Result<SyncOutcome, SyncError> {
        run_sync(
            &self.pool,
            &self.http,
            &self.config,
            &self.recorder,
            &self.locks,
            &self.policy,
            req,
        )
        .await
    }

    async fn newsletter_count(&self, account_id: &str) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM newsletters WHERE account_id = ?")
            .bind(account_id)
            .fetch_one(&self.pool)
            .await
            .unwrap()
    }
}

fn manual_req(account_id: &str) -> SyncRequest {
    SyncRequest {
        account_id: account_id.to_string(),
        ..Default::default()
    }
}

#[tokio::test]
async fn sync_ingests_messages_and_reruns_are_idempotent() {
    let h = harness().await;
    h.mock.accept_token("good");
    insert_account(&h.pool, "acc-1", "me@example.com", Some("good"), Some("r-1")).await;
    h.mock.add_message(gmail_message(
        "m1",
        "The Daily Brew <news@dailybrew.example.com>",
        "Issue 1",
        "<p>one</p>",
        "one",
    ));
    h.mock.add_message(gmail_message(
        "m2",
        "Weekly Digest <digest@weekly.example.org>",
        "Issue 2",
        "<p>two</p>",
        "two",
    ));

    let outcome = h.sync(&manual_req("acc-1")).await.unwrap();
    assert_eq!(outcome.status, SyncStatus::Success);
    assert_eq!(outcome.count, 2);
    assert!(outcome.failed.is_empty());
    assert!(outcome.warning.is_none());
    assert_eq!(outcome.details.new_sender_count, 2);
    assert!(outcome
        .details
        .senders
        .contains(&"news@dailybrew.example.com".to_string()));
    assert_eq!(h.newsletter_count("acc-1").await, 2);

    // stored content is sanitized and wrapped into a document
    let html: String = sqlx::query_scalar(
        "SELECT content_html FROM newsletters WHERE account_id = ? AND gmail_message_id = 'm1'",
    )
    .bind("acc-1")
    .fetch_one(&h.pool)
    .await
    .unwrap();
    assert!(html.contains("<p>one</p>"));
    assert!(html.contains("charset"));

    // an unchanged mailbox syncs to zero new messages, still a success
    let rerun = h.sync(&manual_req("acc-1")).await.unwrap();
    assert_eq!(rerun.status, SyncStatus::Success);
    assert_eq!(rerun.count, 0);
    assert_eq!(h.newsletter_count("acc-1").await, 2);

    let logs = h.recorder.list("acc-1", None, 10, 0).await.unwrap();
    assert_eq!(logs.len(), 2);
    assert_eq!(logs[0].message_count, 0);
    assert_eq!(logs[1].message_count, 2);
    assert!(logs.iter().all(|l| l.status == SyncStatus::Success));
    assert!(logs.iter().all(|l| l.sync_kind == SyncKind::Manual));
}

#[tokio::test]
async fn empty_mailbox_is_a_successful_sync() {
    let h = harness().await;
    h.mock.accept_token("good");
    insert_account(&h.pool, "acc-1", "me@example.com", Some("good"), Some("r-1")).await;

    let outcome = h.sync(&manual_req("acc-1")).await.unwrap();
    assert_eq!(outcome.status, SyncStatus::Success);
    assert_eq!(outcome.count, 0);
    assert_eq!(outcome.details.total, 0);
}

#[tokio::test]
async fn partial_outcome_when_some_messages_fail_to_persist() {
    let h = harness().await;
    h.mock.accept_token("good");
    insert_account(&h.pool, "acc-1", "me@example.com", Some("good"), Some("r-1")).await;
    for n in 1..=10 {
        h.mock.add_message(gmail_message(
            &format!("m{n}"),
            &format!("Sender {n} <s{n}@example.com>"),
            &format!("Issue {n}"),
            "<p>body</p>",
            "body",
        ));
    }
    h.mock.blank_detail("m3");
    h.mock.blank_detail("m7");

    let outcome = h.sync(&manual_req("acc-1")).await.unwrap();
    assert_eq!(outcome.status, SyncStatus::Partial);
    assert_eq!(outcome.count, 8);
    assert_eq!(outcome.failed.len(), 2);
    assert_eq!(
        outcome.warning.as_deref(),
        Some("some emails failed to sync")
    );
    assert_eq!(h.newsletter_count("acc-1").await, 8);

    let logs = h.recorder.list("acc-1", None, 10, 0).await.unwrap();
    assert_eq!(logs[0].status, SyncStatus::Partial);
    assert_eq!(logs[0].message_count, 8);
    assert_eq!(logs[0].details["failed"], 2);
}

#[tokio::test]
async fn one_401_then_success_after_token_refresh() {
    let h = harness().await;
    // the stale token is rejected, the refreshed one accepted
    h.mock.accept_token("fresh");
    h.mock.grant_on_refresh("fresh");
    insert_account(&h.pool, "acc-1", "me@example.com", Some("stale"), Some("r-1")).await;
    h.mock.add_message(gmail_message(
        "m1",
        "A <a@example.com>",
        "Issue",
        "<p>x</p>",
        "x",
    ));

    let outcome = h.sync(&manual_req("acc-1")).await.unwrap();
    assert_eq!(outcome.status, SyncStatus::Success);
    assert_eq!(outcome.count, 1);
    assert_eq!(h.mock.token_calls.load(std::sync::atomic::Ordering::SeqCst), 1);

    // the refreshed token was persisted before the fetch continued
    let stored: Option<String> =
        sqlx::query_scalar("SELECT access_token FROM accounts WHERE id = 'acc-1'")
            .fetch_one(&h.pool)
            .await
            .unwrap();
    assert_eq!(stored.as_deref(), Some("fresh"));
}

#[tokio::test]
async fn second_401_after_refresh_requires_reauthentication() {
    let h = harness().await;
    // refresh succeeds but the API never accepts any token
    h.mock.grant_on_refresh("fresh");
    insert_account(&h.pool, "acc-1", "me@example.com", Some("stale"), Some("r-1")).await;

    let err = h.sync(&manual_req("acc-1")).await.unwrap_err();
    assert!(matches!(err, SyncError::AuthenticationExpired));
    assert!(err.requires_reauthentication());
    // exactly one refresh, no retry storm
    assert_eq!(h.mock.token_calls.load(std::sync::atomic::Ordering::SeqCst), 1);

    let logs = h.recorder.list("acc-1", None, 10, 0).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].status, SyncStatus::Failed);
}

#[tokio::test]
async fn rejected_refresh_surfaces_provider_description() {
    let h = harness().await;
    // no grant configured: the token endpoint answers 400 invalid_grant
    insert_account(&h.pool, "acc-1", "me@example.com", Some("stale"), Some("r-1")).await;

    let err = h.sync(&manual_req("acc-1")).await.unwrap_err();
    match &err {
        SyncError::TokenRefreshFailed(description) => {
            assert!(description.contains("expired or revoked"));
        }
        other => panic!("expected TokenRefreshFailed, got {other:?}"),
    }
    assert!(err.requires_reauthentication());
}

#[tokio::test]
async fn missing_credentials_fail_fast_without_provider_calls() {
    let h = harness().await;
    insert_account(&h.pool, "acc-1", "me@example.com", None, None).await;

    let err = h.sync(&manual_req("acc-1")).await.unwrap_err();
    assert!(matches!(err, SyncError::MissingCredentials));
    assert_eq!(h.mock.provider_calls(), 0);

    let logs = h.recorder.list("acc-1", None, 10, 0).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].status, SyncStatus::Failed);
    assert!(logs[0]
        .error_message
        .as_deref()
        .unwrap_or_default()
        .contains("no refresh token"));
}

#[tokio::test]
async fn fetch_timeouts_are_retried_then_reported() {
    let h = harness().await;
    h.mock.accept_token("good");
    h.mock.set_list_delay(Duration::from_millis(400));
    insert_account(&h.pool, "acc-1", "me@example.com", Some("good"), Some("r-1")).await;

    let policy = SyncPolicy {
        retry: RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(5),
        },
        fetch_timeout: Duration::from_millis(100),
    };
    let err = run_sync(
        &h.pool,
        &h.http,
        &h.config,
        &h.recorder,
        &h.locks,
        &policy,
        &manual_req("acc-1"),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, SyncError::RequestTimedOut));
    // one list hit per attempt, no more
    assert_eq!(
        h.mock.list_calls.load(std::sync::atomic::Ordering::SeqCst),
        3
    );

    let logs = h.recorder.list("acc-1", None, 10, 0).await.unwrap();
    assert_eq!(logs[0].status, SyncStatus::Failed);
}

#[tokio::test]
async fn unknown_account_is_reported_as_not_found() {
    let h = harness().await;
    let err = h.sync(&manual_req("nope")).await.unwrap_err();
    assert!(matches!(err, SyncError::AccountNotFound(_)));
}

#[tokio::test]
async fn concurrent_sync_for_same_account_is_refused() {
    let h = harness().await;
    h.mock.accept_token("good");
    insert_account(&h.pool, "acc-1", "me@example.com", Some("good"), Some("r-1")).await;

    let _lease = h.locks.acquire("acc-1").unwrap();
    let err = h.sync(&manual_req("acc-1")).await.unwrap_err();
    assert!(matches!(err, SyncError::SyncInProgress));

    // refused attempts leave no audit entry
    let logs = h.recorder.list("acc-1", None, 10, 0).await.unwrap();
    assert!(logs.is_empty());
}
