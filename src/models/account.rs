/// Connected mailbox models
use serde::Serialize;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct EmailAccount {
    pub id: String,
    pub user_id: String,
    pub email: String,
    pub provider: String,
    #[serde(skip_serializing)]
    pub access_token: Option<String>,
    #[serde(skip_serializing)]
    pub refresh_token: Option<String>,
    pub last_synced_at: Option<i64>,
    pub token_refreshed_at: Option<i64>,
    pub sync_frequency_secs: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

impl EmailAccount {
    /// An account with a refresh token can recover from credential expiry;
    /// one without cannot.
    pub fn has_credentials(&self) -> bool {
        self.refresh_token.is_some() || self.access_token.is_some()
    }
}
