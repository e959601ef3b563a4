use anyhow::{Context, Result};
use std::env;

pub const GMAIL_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1";
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Process configuration, built once in `main` and passed down explicitly.
/// Provider base URLs are configurable so tests can point the client at a
/// local mock.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub google_client_id: String,
    pub google_client_secret: String,
    pub gmail_api_base: String,
    pub google_token_url: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let database_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://newsletter_hub.db".into());
        let port = env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3040);
        let google_client_id =
            env::var("GOOGLE_CLIENT_ID").context("GOOGLE_CLIENT_ID must be set")?;
        let google_client_secret =
            env::var("GOOGLE_CLIENT_SECRET").context("GOOGLE_CLIENT_SECRET must be set")?;
        let gmail_api_base = env::var("GMAIL_API_BASE").unwrap_or_else(|_| GMAIL_API_BASE.into());
        let google_token_url =
            env::var("GOOGLE_TOKEN_URL").unwrap_or_else(|_| GOOGLE_TOKEN_URL.into());

        Ok(Config {
            database_url,
            port,
            google_client_id,
            google_client_secret,
            gmail_api_base,
            google_token_url,
        })
    }
}
