use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};
use sqlx::SqlitePool;

use crate::services::account_service;

/// GET /accounts - connected accounts (credentials never serialized)
pub async fn list_accounts(
    State(pool): State<SqlitePool>,
) -> Result<Json<Value>, (StatusCode, String)> {
    let accounts = account_service::list_accounts(&pool)
        .await
        .map_err(internal)?;
    Ok(Json(json!({
        "count": accounts.len(),
        "accounts": accounts,
    })))
}

/// GET /accounts/:id
pub async fn get_account(
    State(pool): State<SqlitePool>,
    Path(account_id): Path<String>,
) -> Result<Json<Value>, (StatusCode, String)> {
    let account = account_service::get_account(&pool, &account_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| {
            (
                StatusCode::NOT_FOUND,
                format!("Account {account_id} not found"),
            )
        })?;
    Ok(Json(json!({ "account": account })))
}

/// DELETE /accounts/:id - disconnect; newsletters and logs cascade away
pub async fn delete_account(
    State(pool): State<SqlitePool>,
    Path(account_id): Path<String>,
) -> Result<Json<Value>, (StatusCode, String)> {
    let deleted = account_service::delete_account(&pool, &account_id)
        .await
        .map_err(internal)?;
    Ok(Json(json!({ "deleted": deleted })))
}

fn internal(e: sqlx::Error) -> (StatusCode, String) {
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}
