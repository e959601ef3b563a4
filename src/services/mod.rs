pub mod account_service;
pub mod newsletter_service;
pub mod scheduler;
pub mod sync_lock;
pub mod sync_log_service;
pub mod sync_service;
