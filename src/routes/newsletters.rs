use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use sqlx::SqlitePool;

use crate::services::newsletter_service;

#[derive(Debug, Deserialize)]
pub struct Pagination {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// GET /newsletters/:account_id - archived newsletters, newest first
pub async fn list_newsletters(
    State(pool): State<SqlitePool>,
    Path(account_id): Path<String>,
    Query(page): Query<Pagination>,
) -> Result<Json<Value>, (StatusCode, String)> {
    let limit = page.limit.unwrap_or(50).clamp(1, 200);
    let offset = page.offset.unwrap_or(0).max(0);

    let total = newsletter_service::count_for_account(&pool, &account_id)
        .await
        .map_err(internal)?;
    let newsletters = newsletter_service::list_newsletters(&pool, &account_id, limit, offset)
        .await
        .map_err(internal)?;

    Ok(Json(json!({
        "account_id": account_id,
        "count": newsletters.len(),
        "total": total,
        "newsletters": newsletters,
    })))
}

fn internal(e: sqlx::Error) -> (StatusCode, String) {
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}
