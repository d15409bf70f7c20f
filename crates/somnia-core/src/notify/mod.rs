//! Notification scheduling seam.
//!
//! The platform scheduler is an external collaborator. The core only needs
//! to schedule, cancel, and mass-cancel, and to remember which opaque id
//! belongs to which logical reminder.

mod memory;
mod registry;

pub use memory::MemoryScheduler;
pub use registry::{NotificationIdRegistry, WAKE_UP_REMINDER};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SchedulerError;

/// Payload handed to the scheduler unmodified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationSpec {
    pub title: String,
    pub body: String,
    pub fire_at: DateTime<Utc>,
}

impl NotificationSpec {
    pub fn new(title: impl Into<String>, body: impl Into<String>, fire_at: DateTime<Utc>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            fire_at,
        }
    }
}

/// OS-level notification subsystem.
pub trait NotificationScheduler {
    /// Schedule a notification and return the platform's opaque id.
    fn schedule(&self, spec: &NotificationSpec) -> Result<String, SchedulerError>;

    /// Cancel a scheduled notification. Unknown ids are not an error.
    fn cancel(&self, platform_id: &str) -> Result<(), SchedulerError>;

    /// Cancel every scheduled notification, returning how many were dropped.
    fn cancel_all(&self) -> Result<usize, SchedulerError>;
}
