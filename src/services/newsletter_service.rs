use sqlx::SqlitePool;

use crate::content::extract::{self, ExtractedContent};
use crate::content::sanitize;
use crate::db;
use crate::error::SyncError;
use crate::gmail::wire::Message;
use crate::models::{NewNewsletter, Newsletter};

const PREVIEW_MAX_CHARS: usize = 280;

/// Result of a store attempt. Re-ingesting an already-known provider
/// message is a no-op, not an error.
#[derive(Debug, PartialEq, Eq)]
pub enum Stored {
    Created(i64),
    Duplicate,
}

/// Turn a fetched provider message into the row we would persist. Content
/// is extracted here; sanitization happens at store time.
pub fn build_newsletter(message: &Message) -> NewNewsletter {
    let content = message
        .payload
        .as_ref()
        .map(extract::extract_content)
        .unwrap_or_default();

    let (sender_name, sender_email) = parse_sender(message.header("From").unwrap_or_default());
    let title = message.header("Subject").unwrap_or_default().to_string();

    let content_html = display_html(&content);
    let preview_text = if !content.text.is_empty() {
        extract::text_preview(&content.text, PREVIEW_MAX_CHARS)
    } else {
        extract::text_preview(&content.html, PREVIEW_MAX_CHARS)
    };

    NewNewsletter {
        gmail_message_id: message.id.clone(),
        thread_id: message.thread_id.clone(),
        title,
        sender_name,
        sender_email,
        content_html,
        preview_text,
        published_at: message.published_epoch(),
    }
}

/// Store exactly once per (account, provider message id): lookup, then
/// insert. The sanitizer plus a final https/data-URI pass run right before
/// the write.
pub async fn store_newsletter(
    pool: &SqlitePool,
    account_id: &str,
    item: &NewNewsletter,
) -> Result<Stored, SyncError> {
    if item.gmail_message_id.is_empty() {
        return Err(SyncError::PersistenceFailed(
            "provider message without an id".into(),
        ));
    }

    let existing: Option<i64> =
        sqlx::query_scalar("SELECT id FROM newsletters WHERE account_id = ? AND gmail_message_id = ?")
            .bind(account_id)
            .bind(&item.gmail_message_id)
            .fetch_optional(pool)
            .await?;
    if existing.is_some() {
        return Ok(Stored::Duplicate);
    }

    let html = sanitize::normalize_data_uris(&sanitize::sanitize_html(&item.content_html));

    let result = sqlx::query(
        "INSERT INTO newsletters
         (account_id, gmail_message_id, thread_id, title, sender_name, sender_email,
          content_html, preview_text, published_at, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(account_id)
    .bind(&item.gmail_message_id)
    .bind(&item.thread_id)
    .bind(&item.title)
    .bind(&item.sender_name)
    .bind(&item.sender_email)
    .bind(&html)
    .bind(&item.preview_text)
    .bind(item.published_at)
    .bind(db::now_epoch())
    .execute(pool)
    .await?;

    Ok(Stored::Created(result.last_insert_rowid()))
}

pub async fn list_newsletters(
    pool: &SqlitePool,
    account_id: &str,
    limit: i64,
    offset: i64,
) -> Result<Vec<Newsletter>, sqlx::Error> {
    sqlx::query_as::<_, Newsletter>(
        "SELECT * FROM newsletters
         WHERE account_id = ?
         ORDER BY published_at DESC, id DESC
         LIMIT ? OFFSET ?",
    )
    .bind(account_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await
}

pub async fn count_for_account(pool: &SqlitePool, account_id: &str) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM newsletters WHERE account_id = ?")
        .bind(account_id)
        .fetch_one(pool)
        .await
}

/// Choose what to display: the HTML body when one exists, otherwise the
/// plain-text body wrapped into a minimal document.
fn display_html(content: &ExtractedContent) -> String {
    if !content.html.is_empty() {
        return content.html.clone();
    }
    if content.text.is_empty() {
        return String::new();
    }
    extract::ensure_document(&format!("<pre>{}</pre>", escape_text(&content.text)))
}

fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Split an RFC 5322 From header into display name and address.
pub fn parse_sender(from: &str) -> (String, String) {
    let from = from.trim();
    if let Some(lt) = from.rfind('<') {
        if let Some(rel_gt) = from[lt..].find('>') {
            let email = from[lt + 1..lt + rel_gt].trim().to_string();
            let name = from[..lt].trim().trim_matches('"').trim().to_string();
            return (name, email);
        }
    }
    (String::new(), from.trim_matches('"').to_string())
}
