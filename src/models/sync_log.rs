use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Success,
    Partial,
    Failed,
    Processing,
    Scheduled,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Partial => "partial",
            Self::Failed => "failed",
            Self::Processing => "processing",
            Self::Scheduled => "scheduled",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "success" => Self::Success,
            "partial" => Self::Partial,
            "processing" => Self::Processing,
            "scheduled" => Self::Scheduled,
            _ => Self::Failed,
        }
    }

    /// Terminal entries are write-once; only these two may still change.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Processing | Self::Scheduled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncKind {
    Manual,
    Scheduled,
}

impl SyncKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Scheduled => "scheduled",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "scheduled" => Self::Scheduled,
            _ => Self::Manual,
        }
    }
}

/// One audit row per sync attempt.
#[derive(Debug, Clone, Serialize)]
pub struct SyncLogEntry {
    pub id: i64,
    pub account_id: String,
    pub timestamp: i64,
    pub status: SyncStatus,
    pub message_count: i64,
    pub error_message: Option<String>,
    pub details: serde_json::Value,
    pub sync_kind: SyncKind,
}

/// The `details` payload carried by every entry: enough for an observer to
/// render a human-readable summary without re-querying messages.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncLogDetails {
    pub total: u64,
    pub synced: u64,
    pub failed: u64,
    pub new_sender_count: u64,
    pub senders: Vec<String>,
    pub account_email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule: Option<ScheduleParams>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<SyncedMessageSummary>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleParams {
    pub frequency_secs: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncedMessageSummary {
    pub gmail_message_id: String,
    pub title: String,
    pub sender_email: String,
}
