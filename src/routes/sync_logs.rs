use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures::stream::Stream;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::broadcast;

use crate::services::sync_log_service::SyncLogRecorder;

#[derive(Debug, Deserialize)]
pub struct LogQuery {
    pub min_count: Option<i64>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// GET /sync-logs/:account_id - audit entries, newest first, filterable by
/// minimum message count
pub async fn list_sync_logs(
    State(recorder): State<Arc<SyncLogRecorder>>,
    Path(account_id): Path<String>,
    Query(query): Query<LogQuery>,
) -> Result<Json<Value>, (StatusCode, String)> {
    let limit = query.limit.unwrap_or(20).clamp(1, 100);
    let offset = query.offset.unwrap_or(0).max(0);

    let entries = recorder
        .list(&account_id, query.min_count, limit, offset)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    Ok(Json(json!({
        "account_id": account_id,
        "count": entries.len(),
        "logs": entries,
    })))
}

/// GET /sync-logs/events - SSE stream of sync log writes
pub async fn sync_log_events(
    State(recorder): State<Arc<SyncLogRecorder>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut rx = recorder.subscribe();

    let stream = async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(entry) => {
                    let json = serde_json::to_string(&entry).unwrap_or_default();
                    yield Ok(Event::default().data(json));
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "sync log event stream lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}
