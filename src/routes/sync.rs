use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::models::SyncStatus;
use crate::routes::AppState;
use crate::services::sync_service::{self, SyncRequest};

/// POST /sync - run one sync attempt for an account and return its
/// classified outcome. The audit entry is already written by the time the
/// response goes out.
pub async fn trigger_sync(
    State(state): State<AppState>,
    Json(req): Json<SyncRequest>,
) -> impl IntoResponse {
    if req.account_id.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "success": false, "error": "accountId is required" })),
        )
            .into_response();
    }

    let result = sync_service::run_sync(
        &state.pool,
        &state.http,
        &state.config,
        &state.recorder,
        &state.locks,
        &state.policy,
        &req,
    )
    .await;

    match result {
        Ok(outcome) => {
            let mut body = json!({
                "success": outcome.status != SyncStatus::Failed,
                "count": outcome.count,
                "synced": outcome.synced,
                "failed": outcome.failed,
                "details": outcome.details,
            });
            if outcome.status == SyncStatus::Partial {
                body["partial"] = json!(true);
            }
            if let Some(warning) = &outcome.warning {
                body["warning"] = json!(warning);
            }
            if outcome.status == SyncStatus::Failed {
                body["error"] = json!("all emails failed to sync");
            }
            if let Some(debug_info) = &outcome.debug_info {
                body["debugInfo"] = debug_info.clone();
            }
            Json(body).into_response()
        }
        Err(e) => {
            let mut body = json!({ "success": false, "error": e.to_string() });
            if e.requires_reauthentication() {
                body["requiresReauthentication"] = json!(true);
            }
            (e.status_code(), Json(body)).into_response()
        }
    }
}
