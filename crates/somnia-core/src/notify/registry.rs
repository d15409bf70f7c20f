//! Logical-key to platform-id bookkeeping.
//!
//! Scheduling under a key that already has a live id cancels the old one
//! first, so a key never owns two live notifications.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{NotificationScheduler, NotificationSpec};
use crate::error::SchedulerError;
use crate::storage::KvStore;

const KEY_PREFIX: &str = "notification:";

/// Reminder scheduled when a sleep session starts.
pub const WAKE_UP_REMINDER: &str = "WakeUpReminder";

#[derive(Debug, Serialize, Deserialize)]
struct StoredId {
    platform_id: String,
}

pub struct NotificationIdRegistry<'a> {
    store: &'a dyn KvStore,
    scheduler: &'a dyn NotificationScheduler,
}

impl<'a> NotificationIdRegistry<'a> {
    pub fn new(store: &'a dyn KvStore, scheduler: &'a dyn NotificationScheduler) -> Self {
        Self { store, scheduler }
    }

    fn storage_key(key: &str) -> String {
        format!("{KEY_PREFIX}{key}")
    }

    /// Platform id currently registered under `key`.
    ///
    /// Unreadable or malformed entries count as absent.
    pub fn platform_id(&self, key: &str) -> Option<String> {
        let raw = match self.store.get(&Self::storage_key(key)) {
            Ok(raw) => raw?,
            Err(e) => {
                warn!(key, error = %e, "failed to read notification id");
                return None;
            }
        };
        match serde_json::from_str::<StoredId>(&raw) {
            Ok(stored) => Some(stored.platform_id),
            Err(e) => {
                warn!(key, error = %e, "discarding malformed notification id");
                self.forget(key);
                None
            }
        }
    }

    /// Schedule `spec` under `key`, replacing whatever was there.
    ///
    /// # Errors
    /// Returns the scheduler's error if the new notification could not be
    /// scheduled. Failing to cancel the previous one or to persist the new id
    /// is logged only.
    pub fn schedule_with_key(
        &self,
        key: &str,
        spec: &NotificationSpec,
    ) -> Result<String, SchedulerError> {
        if let Some(previous) = self.platform_id(key) {
            if let Err(e) = self.scheduler.cancel(&previous) {
                warn!(key, platform_id = %previous, error = %e, "failed to cancel replaced notification");
            }
            self.forget(key);
        }

        let platform_id = self.scheduler.schedule(spec)?;
        let stored = StoredId {
            platform_id: platform_id.clone(),
        };
        match serde_json::to_string(&stored) {
            Ok(json) => {
                if let Err(e) = self.store.set(&Self::storage_key(key), &json) {
                    warn!(key, error = %e, "failed to persist notification id");
                }
            }
            Err(e) => warn!(key, error = %e, "failed to encode notification id"),
        }
        debug!(key, platform_id = %platform_id, fire_at = %spec.fire_at, "notification scheduled");
        Ok(platform_id)
    }

    /// Cancel the notification registered under `key`.
    ///
    /// Returns `false` when nothing was registered. A scheduler failure is
    /// logged and the mapping is dropped anyway.
    pub fn cancel(&self, key: &str) -> bool {
        let Some(platform_id) = self.platform_id(key) else {
            return false;
        };
        if let Err(e) = self.scheduler.cancel(&platform_id) {
            warn!(key, platform_id = %platform_id, error = %e, "failed to cancel notification");
        }
        self.forget(key);
        debug!(key, platform_id = %platform_id, "notification cancelled");
        true
    }

    pub fn exists(&self, key: &str) -> bool {
        self.platform_id(key).is_some()
    }

    /// Drop local mappings for `keys` without touching the scheduler.
    ///
    /// Used after an out-of-band mass cancellation so the registry agrees
    /// with the platform again.
    pub fn clear_known_keys(&self, keys: &[&str]) {
        for key in keys {
            self.forget(key);
        }
    }

    /// Cancel everything at the scheduler, then clear `keys` locally.
    ///
    /// # Errors
    /// Returns the scheduler's error; local mappings are left untouched then.
    pub fn cancel_all(&self, keys: &[&str]) -> Result<usize, SchedulerError> {
        let count = self.scheduler.cancel_all()?;
        self.clear_known_keys(keys);
        Ok(count)
    }

    fn forget(&self, key: &str) {
        if let Err(e) = self.store.remove(&Self::storage_key(key)) {
            warn!(key, error = %e, "failed to remove notification id");
        }
    }
}
