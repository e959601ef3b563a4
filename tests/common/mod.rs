//! Shared test fixtures: an in-memory database and a local mock of the
//! Gmail REST surface (message list/detail plus the OAuth token endpoint).
#![allow(dead_code)]

use std::collections::HashSet;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde_json::{json, Value};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

use newsletter_hub::config::Config;
use newsletter_hub::db;

pub async fn test_pool() -> SqlitePool {
    let opts = SqliteConnectOptions::from_str("sqlite::memory:")
        .unwrap()
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(opts)
        .await
        .unwrap();
    db::run_migrations(&pool).await.unwrap();
    pool
}

pub async fn insert_account(
    pool: &SqlitePool,
    id: &str,
    email: &str,
    access_token: Option<&str>,
    refresh_token: Option<&str>,
) {
    sqlx::query(
        "INSERT INTO accounts
         (id, user_id, email, provider, access_token, refresh_token, sync_frequency_secs, created_at, updated_at)
         VALUES (?, 'user-1', ?, 'gmail', ?, ?, 900, ?, ?)",
    )
    .bind(id)
    .bind(email)
    .bind(access_token)
    .bind(refresh_token)
    .bind(db::now_epoch())
    .bind(db::now_epoch())
    .execute(pool)
    .await
    .unwrap();
}

pub fn test_config(mock_base: &str) -> Config {
    Config {
        database_url: "sqlite::memory:".into(),
        port: 0,
        google_client_id: "test-client".into(),
        google_client_secret: "test-secret".into(),
        gmail_api_base: mock_base.to_string(),
        google_token_url: format!("{mock_base}/token"),
    }
}

/// State backing the mock provider. Tests tune the knobs, handlers count
/// every hit.
#[derive(Default)]
pub struct MockState {
    /// Bearer tokens the API accepts.
    pub valid_tokens: Mutex<HashSet<String>>,
    /// Access token the token endpoint hands out; `None` makes refresh fail.
    pub refresh_grant: Mutex<Option<String>>,
    /// Full message JSON documents, keyed by their "id" field.
    pub messages: Mutex<Vec<Value>>,
    /// Artificial latency before the list call answers.
    pub list_delay: Mutex<Option<Duration>>,
    /// Ids whose detail document comes back without a usable id; persisting
    /// those fails, which is how tests provoke per-message failures.
    pub blank_detail_ids: Mutex<HashSet<String>>,
    pub list_calls: AtomicUsize,
    pub detail_calls: AtomicUsize,
    pub token_calls: AtomicUsize,
}

impl MockState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn accept_token(&self, token: &str) {
        self.valid_tokens.lock().unwrap().insert(token.to_string());
    }

    pub fn grant_on_refresh(&self, token: &str) {
        *self.refresh_grant.lock().unwrap() = Some(token.to_string());
    }

    pub fn add_message(&self, message: Value) {
        self.messages.lock().unwrap().push(message);
    }

    pub fn set_list_delay(&self, delay: Duration) {
        *self.list_delay.lock().unwrap() = Some(delay);
    }

    pub fn blank_detail(&self, id: &str) {
        self.blank_detail_ids
            .lock()
            .unwrap()
            .insert(id.to_string());
    }

    pub fn provider_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
            + self.detail_calls.load(Ordering::SeqCst)
            + self.token_calls.load(Ordering::SeqCst)
    }

    fn authorized(&self, headers: &HeaderMap) -> bool {
        let bearer = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .unwrap_or_default();
        self.valid_tokens.lock().unwrap().contains(bearer)
    }
}

/// Bind the mock provider on an ephemeral port and return its base URL.
pub async fn spawn_mock(state: Arc<MockState>) -> String {
    let app = Router::new()
        .route("/users/me/messages", get(list_messages))
        .route("/users/me/messages/:id", get(get_message))
        .route("/token", post(token))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

async fn list_messages(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
) -> (StatusCode, Json<Value>) {
    state.list_calls.fetch_add(1, Ordering::SeqCst);
    let delay = *state.list_delay.lock().unwrap();
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }
    if !state.authorized(&headers) {
        return unauthorized();
    }
    let refs: Vec<Value> = state
        .messages
        .lock()
        .unwrap()
        .iter()
        .map(|m| json!({ "id": m["id"], "threadId": m["threadId"] }))
        .collect();
    (
        StatusCode::OK,
        Json(json!({ "messages": refs, "resultSizeEstimate": refs.len() })),
    )
}

async fn get_message(
    State(state): State<Arc<MockState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> (StatusCode, Json<Value>) {
    state.detail_calls.fetch_add(1, Ordering::SeqCst);
    if !state.authorized(&headers) {
        return unauthorized();
    }
    let found = state
        .messages
        .lock()
        .unwrap()
        .iter()
        .find(|m| m["id"] == json!(id))
        .cloned();
    match found {
        Some(mut message) => {
            if state.blank_detail_ids.lock().unwrap().contains(&id) {
                message["id"] = json!("");
            }
            (StatusCode::OK, Json(message))
        }
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": { "code": 404, "message": "Not Found" } })),
        ),
    }
}

async fn token(State(state): State<Arc<MockState>>) -> (StatusCode, Json<Value>) {
    state.token_calls.fetch_add(1, Ordering::SeqCst);
    let grant = state.refresh_grant.lock().unwrap().clone();
    match grant {
        Some(token) => (
            StatusCode::OK,
            Json(json!({
                "access_token": token,
                "expires_in": 3600,
                "token_type": "Bearer",
            })),
        ),
        None => (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "error": "invalid_grant",
                "error_description": "Token has been expired or revoked.",
            })),
        ),
    }
}

fn unauthorized() -> (StatusCode, Json<Value>) {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "error": { "code": 401, "message": "Invalid Credentials" } })),
    )
}

pub fn b64(data: &str) -> String {
    URL_SAFE_NO_PAD.encode(data.as_bytes())
}

/// A multipart/alternative message document the way the Gmail API returns
/// it in full format. The mock serves both variants from the same document.
pub fn gmail_message(id: &str, from: &str, subject: &str, html: &str, text: &str) -> Value {
    json!({
        "id": id,
        "threadId": format!("thread-{id}"),
        "internalDate": "1722470400000",
        "payload": {
            "mimeType": "multipart/alternative",
            "headers": [
                { "name": "From", "value": from },
                { "name": "Subject", "value": subject },
            ],
            "parts": [
                { "mimeType": "text/plain", "body": { "data": b64(text) } },
                { "mimeType": "text/html", "body": { "data": b64(html) } },
            ],
        },
    })
}

