use serde::Serialize;

/// One ingested provider message. Created exactly once per
/// (account_id, gmail_message_id); the pipeline never mutates it afterwards.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Newsletter {
    pub id: i64,
    pub account_id: String,
    pub gmail_message_id: String,
    pub thread_id: Option<String>,
    pub title: String,
    pub sender_name: String,
    pub sender_email: String,
    pub content_html: String,
    pub preview_text: String,
    pub published_at: Option<i64>,
    pub category_id: Option<String>,
    pub created_at: i64,
}

/// Fields of a newsletter as extracted from a provider message, before it
/// has a row id.
#[derive(Debug, Clone)]
pub struct NewNewsletter {
    pub gmail_message_id: String,
    pub thread_id: Option<String>,
    pub title: String,
    pub sender_name: String,
    pub sender_email: String,
    pub content_html: String,
    pub preview_text: String,
    pub published_at: Option<i64>,
}
