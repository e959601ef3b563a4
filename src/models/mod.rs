pub mod account;
pub mod newsletter;
pub mod sync_log;

pub use account::EmailAccount;
pub use newsletter::{NewNewsletter, Newsletter};
pub use sync_log::{SyncKind, SyncLogDetails, SyncLogEntry, SyncStatus};
