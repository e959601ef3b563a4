use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use crate::error::SyncError;

/// Per-account sync lease. At most one sync attempt may run per account;
/// a second acquire fails fast instead of racing the first on credential
/// refresh and log writes.
#[derive(Clone, Default)]
pub struct SyncLockManager {
    active: Arc<Mutex<HashSet<String>>>,
}

impl SyncLockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lease for one account. The guard releases it on drop, so
    /// the lease spans exactly one attempt regardless of how it exits.
    pub fn acquire(&self, account_id: &str) -> Result<SyncGuard, SyncError> {
        let mut active = self
            .active
            .lock()
            .map_err(|_| SyncError::PersistenceFailed("sync lock poisoned".into()))?;
        if !active.insert(account_id.to_string()) {
            return Err(SyncError::SyncInProgress);
        }
        Ok(SyncGuard {
            account_id: account_id.to_string(),
            active: self.active.clone(),
        })
    }

    pub fn is_locked(&self, account_id: &str) -> bool {
        self.active
            .lock()
            .map(|active| active.contains(account_id))
            .unwrap_or(false)
    }
}

pub struct SyncGuard {
    account_id: String,
    active: Arc<Mutex<HashSet<String>>>,
}

impl Drop for SyncGuard {
    fn drop(&mut self) {
        if let Ok(mut active) = self.active.lock() {
            active.remove(&self.account_id);
        }
    }
}
