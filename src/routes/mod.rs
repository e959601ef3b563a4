use std::sync::Arc;

use axum::extract::FromRef;
use axum::routing::{delete, get, post};
use axum::Router;
use sqlx::SqlitePool;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::services::sync_lock::SyncLockManager;
use crate::services::sync_log_service::SyncLogRecorder;
use crate::services::sync_service::SyncPolicy;

pub mod accounts;
pub mod newsletters;
pub mod sync;
pub mod sync_logs;

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub config: Arc<Config>,
    pub http: reqwest::Client,
    pub recorder: Arc<SyncLogRecorder>,
    pub locks: SyncLockManager,
    pub policy: Arc<SyncPolicy>,
}

impl FromRef<AppState> for SqlitePool {
    fn from_ref(state: &AppState) -> Self {
        state.pool.clone()
    }
}

impl FromRef<AppState> for Arc<SyncLogRecorder> {
    fn from_ref(state: &AppState) -> Self {
        state.recorder.clone()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route("/sync", post(sync::trigger_sync))
        .route("/accounts", get(accounts::list_accounts))
        .route("/accounts/:id", get(accounts::get_account))
        .route("/accounts/:id", delete(accounts::delete_account))
        .route("/newsletters/:account_id", get(newsletters::list_newsletters))
        .route("/sync-logs/events", get(sync_logs::sync_log_events))
        .route("/sync-logs/:account_id", get(sync_logs::list_sync_logs))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
