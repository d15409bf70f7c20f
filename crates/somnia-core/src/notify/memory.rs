use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use super::{NotificationScheduler, NotificationSpec};
use crate::error::SchedulerError;

/// In-process scheduler that keeps live notifications in a map.
///
/// Ids are `mem-1`, `mem-2`, ... in scheduling order. `set_failing(true)`
/// makes every call fail, which is how tests exercise the non-fatal paths.
#[derive(Debug, Default)]
pub struct MemoryScheduler {
    next_id: AtomicU64,
    live: Mutex<BTreeMap<String, NotificationSpec>>,
    cancelled: Mutex<Vec<String>>,
    failing: AtomicBool,
}

impl MemoryScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn live(&self) -> BTreeMap<String, NotificationSpec> {
        self.live.lock().map(|l| l.clone()).unwrap_or_default()
    }

    pub fn is_live(&self, platform_id: &str) -> bool {
        self.live
            .lock()
            .map(|l| l.contains_key(platform_id))
            .unwrap_or(false)
    }

    /// Ids passed to `cancel`, in call order.
    pub fn cancelled(&self) -> Vec<String> {
        self.cancelled.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn check(&self) -> Result<(), String> {
        if self.failing.load(Ordering::SeqCst) {
            Err("scheduler unavailable".to_string())
        } else {
            Ok(())
        }
    }
}

impl NotificationScheduler for MemoryScheduler {
    fn schedule(&self, spec: &NotificationSpec) -> Result<String, SchedulerError> {
        self.check().map_err(SchedulerError::ScheduleFailed)?;
        let id = format!("mem-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.live
            .lock()
            .map_err(|e| SchedulerError::ScheduleFailed(e.to_string()))?
            .insert(id.clone(), spec.clone());
        Ok(id)
    }

    fn cancel(&self, platform_id: &str) -> Result<(), SchedulerError> {
        let cancel_failed = |message: String| SchedulerError::CancelFailed {
            platform_id: platform_id.to_string(),
            message,
        };
        self.check().map_err(cancel_failed)?;
        self.live
            .lock()
            .map_err(|e| cancel_failed(e.to_string()))?
            .remove(platform_id);
        self.cancelled
            .lock()
            .map_err(|e| cancel_failed(e.to_string()))?
            .push(platform_id.to_string());
        Ok(())
    }

    fn cancel_all(&self) -> Result<usize, SchedulerError> {
        let cancel_failed = |message: String| SchedulerError::CancelFailed {
            platform_id: "*".to_string(),
            message,
        };
        self.check().map_err(cancel_failed)?;
        let mut live = self.live.lock().map_err(|e| cancel_failed(e.to_string()))?;
        let count = live.len();
        live.clear();
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn ids_are_sequential_and_cancel_removes() {
        let scheduler = MemoryScheduler::new();
        let spec = NotificationSpec::new("t", "b", Utc::now());
        let a = scheduler.schedule(&spec).unwrap();
        let b = scheduler.schedule(&spec).unwrap();
        assert_eq!(a, "mem-1");
        assert_eq!(b, "mem-2");

        scheduler.cancel(&a).unwrap();
        assert!(!scheduler.is_live(&a));
        assert!(scheduler.is_live(&b));
        assert_eq!(scheduler.cancelled(), vec![a]);
        assert_eq!(scheduler.cancel_all().unwrap(), 1);
    }

    #[test]
    fn failing_mode_rejects_everything() {
        let scheduler = MemoryScheduler::new();
        scheduler.set_failing(true);
        let spec = NotificationSpec::new("t", "b", Utc::now());
        assert!(scheduler.schedule(&spec).is_err());
        assert!(scheduler.cancel("mem-1").is_err());
        assert!(scheduler.cancel_all().is_err());
    }
}
