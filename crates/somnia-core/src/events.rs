use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::session::{SessionState, SleepReport};

/// Every state change the CLI reports is an Event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Event {
    SessionStarted {
        started_at: DateTime<Utc>,
        /// Platform id of the wake-up reminder, if one was scheduled.
        reminder_id: Option<String>,
        /// Why no reminder was scheduled.
        reminder_error: Option<String>,
    },
    /// Start was requested while a session was running; nothing changed.
    SessionAlreadyActive {
        started_at: DateTime<Utc>,
        at: DateTime<Utc>,
    },
    SessionFinished {
        started_at: DateTime<Utc>,
        woke_at: DateTime<Utc>,
        duration_ms: u64,
        hours: u64,
        minutes: u64,
    },
    SessionReset {
        started_at: Option<DateTime<Utc>>,
        at: DateTime<Utc>,
    },
    /// A session older than the stale window was dropped on load.
    SessionDiscarded {
        started_at: DateTime<Utc>,
        at: DateTime<Utc>,
    },
    ReminderCancelled {
        key: String,
        was_present: bool,
        at: DateTime<Utc>,
    },
    /// A reminder from the local outbox came due.
    ReminderDue {
        platform_id: String,
        title: String,
        body: String,
        fire_at: DateTime<Utc>,
    },
    StateSnapshot {
        session: SessionState,
        elapsed_ms: Option<u64>,
        sleep_logged_today: bool,
        reminder_pending: bool,
        at: DateTime<Utc>,
    },
}

impl From<&SleepReport> for Event {
    fn from(report: &SleepReport) -> Self {
        Event::SessionFinished {
            started_at: report.started_at,
            woke_at: report.woke_at,
            duration_ms: report.duration_ms,
            hours: report.whole_hours(),
            minutes: report.whole_minutes(),
        }
    }
}
