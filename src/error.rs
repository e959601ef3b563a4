use axum::http::StatusCode;
use thiserror::Error;

/// Failure classification for one sync attempt. Per-message persistence
/// failures never reach this level; they are collected in the attempt's
/// failed list instead.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("account not found: {0}")]
    AccountNotFound(String),

    #[error("account has no refresh token and no access token")]
    MissingCredentials,

    #[error("provider configuration incomplete: {0}")]
    MisconfiguredProvider(&'static str),

    #[error("token refresh failed: {0}")]
    TokenRefreshFailed(String),

    #[error("authentication expired, the account must be reconnected")]
    AuthenticationExpired,

    #[error("provider request failed ({status}): {message}")]
    ProviderRequestFailed { status: u16, message: String },

    #[error("provider request timed out")]
    RequestTimedOut,

    #[error("a sync for this account is already running")]
    SyncInProgress,

    #[error("storage operation failed: {0}")]
    PersistenceFailed(String),

    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

impl SyncError {
    /// Transient failures are retried with backoff by the orchestrator.
    /// Auth failures are terminal: the fetcher already spent its one
    /// refresh before surfacing them.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SyncError::ProviderRequestFailed { .. } | SyncError::RequestTimedOut
        )
    }

    /// Whether the user has to reconnect the account to recover.
    pub fn requires_reauthentication(&self) -> bool {
        matches!(
            self,
            SyncError::AuthenticationExpired | SyncError::TokenRefreshFailed(_)
        )
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            SyncError::AccountNotFound(_) => StatusCode::NOT_FOUND,
            SyncError::MissingCredentials => StatusCode::BAD_REQUEST,
            SyncError::AuthenticationExpired | SyncError::TokenRefreshFailed(_) => {
                StatusCode::UNAUTHORIZED
            }
            SyncError::SyncInProgress => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<sqlx::Error> for SyncError {
    fn from(e: sqlx::Error) -> Self {
        SyncError::PersistenceFailed(e.to_string())
    }
}
