//! Sleep session tracker.
//!
//! "The user is asleep" is a single persisted start timestamp. There is no
//! ticking: elapsed time is derived from the clock whenever it is asked for.
//!
//! ## State Transitions
//!
//! ```text
//! Idle --start--> Active --finish(wake)--> Idle
//!                 Active --start--> Active (reported, nothing written)
//!                 Active --reset / stale load--> Idle
//! ```
//!
//! Starting also schedules the wake-up reminder; finishing or resetting
//! cancels it. Reminder problems never block a transition.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::clock::{Clock, DayBoundary};
use crate::error::{SchedulerError, SessionError, StorageError};
use crate::flags::{DailyFlag, ExpiringFlagStore};
use crate::notify::{
    NotificationIdRegistry, NotificationScheduler, NotificationSpec, WAKE_UP_REMINDER,
};
use crate::storage::KvStore;

pub(crate) const SESSION_KEY: &str = "session:current";

/// Tunables for the tracker.
#[derive(Debug, Clone)]
pub struct SessionPolicy {
    /// Delay between going to sleep and the wake-up reminder.
    pub reminder_delay: Duration,
    /// A session older than this is discarded on load.
    pub stale_after: Duration,
    pub reminder_title: String,
    pub reminder_body: String,
    pub reminders_enabled: bool,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            reminder_delay: Duration::hours(8),
            stale_after: Duration::hours(24),
            reminder_title: "Good morning".into(),
            reminder_body: "Don't forget to log how you slept.".into(),
            reminders_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum SessionState {
    Idle,
    Active { started_at: DateTime<Utc> },
}

impl SessionState {
    pub fn is_active(&self) -> bool {
        matches!(self, SessionState::Active { .. })
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        match self {
            SessionState::Idle => None,
            SessionState::Active { started_at } => Some(*started_at),
        }
    }
}

/// Result of [`SleepSessionTracker::load_report`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadReport {
    pub state: SessionState,
    /// Start time of a stale session that this load discarded.
    pub discarded: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub enum StartOutcome {
    Started {
        started_at: DateTime<Utc>,
        /// Platform id of the wake-up reminder, or why there is none.
        reminder: Result<String, SchedulerError>,
    },
    /// A session is already running. Nothing was written; the caller decides
    /// whether to [`restart`](SleepSessionTracker::restart).
    AlreadyActive { started_at: DateTime<Utc> },
}

/// A finished session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SleepReport {
    pub started_at: DateTime<Utc>,
    pub woke_at: DateTime<Utc>,
    /// Never negative.
    pub duration_ms: u64,
}

impl SleepReport {
    pub fn duration(&self) -> Duration {
        Duration::milliseconds(self.duration_ms as i64)
    }

    /// Floored to whole hours, the headline figure.
    pub fn whole_hours(&self) -> u64 {
        self.duration_ms / 3_600_000
    }

    /// Floored to whole minutes, for detailed breakdowns.
    pub fn whole_minutes(&self) -> u64 {
        self.duration_ms / 60_000
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredSession {
    started_at: DateTime<Utc>,
}

pub struct SleepSessionTracker<'a> {
    store: &'a dyn KvStore,
    clock: &'a dyn Clock,
    reminders: NotificationIdRegistry<'a>,
    flags: ExpiringFlagStore<'a>,
    policy: SessionPolicy,
}

impl<'a> SleepSessionTracker<'a> {
    pub fn new(
        store: &'a dyn KvStore,
        scheduler: &'a dyn NotificationScheduler,
        clock: &'a dyn Clock,
        boundary: DayBoundary,
    ) -> Self {
        Self {
            store,
            clock,
            reminders: NotificationIdRegistry::new(store, scheduler),
            flags: ExpiringFlagStore::new(store, clock, boundary),
            policy: SessionPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: SessionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> &SessionPolicy {
        &self.policy
    }

    // ── Queries ──────────────────────────────────────────────────────

    /// Current state, discarding a stale session on the way.
    pub fn load(&self) -> SessionState {
        self.load_report().state
    }

    /// Like [`load`](Self::load), but also says whether a stale session was dropped.
    pub fn load_report(&self) -> LoadReport {
        let Some(started_at) = self.read_started_at() else {
            return LoadReport {
                state: SessionState::Idle,
                discarded: None,
            };
        };

        let age = self.clock.now() - started_at;
        if age > self.policy.stale_after {
            info!(%started_at, age_hours = age.num_hours(), "discarding stale sleep session");
            if let Err(e) = self.store.remove(SESSION_KEY) {
                warn!(error = %e, "failed to remove stale sleep session");
            }
            self.reminders.cancel(WAKE_UP_REMINDER);
            return LoadReport {
                state: SessionState::Idle,
                discarded: Some(started_at),
            };
        }

        LoadReport {
            state: SessionState::Active { started_at },
            discarded: None,
        }
    }

    /// Time asleep so far, if a session is active.
    pub fn elapsed(&self) -> Option<Duration> {
        self.load()
            .started_at()
            .map(|started_at| (self.clock.now() - started_at).max(Duration::zero()))
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Begin a session now.
    ///
    /// # Errors
    /// Returns [`SessionError::Storage`] if the start time could not be
    /// persisted. Reminder failures are reported inside the outcome.
    pub fn start(&self) -> Result<StartOutcome, SessionError> {
        if let SessionState::Active { started_at } = self.load() {
            debug!(%started_at, "start requested while a session is active");
            return Ok(StartOutcome::AlreadyActive { started_at });
        }

        let started_at = self.clock.now();
        let json = serde_json::to_string(&StoredSession { started_at })
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;
        self.store.set(SESSION_KEY, &json)?;
        info!(%started_at, "sleep session started");

        let reminder = self.schedule_reminder(started_at);
        if let Err(e) = &reminder {
            warn!(error = %e, "wake-up reminder not scheduled");
        }
        Ok(StartOutcome::Started {
            started_at,
            reminder,
        })
    }

    /// End the active session at `wake_time`.
    ///
    /// On success the session is cleared, the reminder cancelled and today's
    /// sleep-log flag written.
    ///
    /// # Errors
    /// - [`SessionError::NoActiveSession`] if nothing is running.
    /// - [`SessionError::InvalidWakeTime`] if `wake_time` is before the start;
    ///   the session is left untouched.
    /// - [`SessionError::Storage`] if the session could not be cleared.
    pub fn finish(&self, wake_time: DateTime<Utc>) -> Result<SleepReport, SessionError> {
        let SessionState::Active { started_at } = self.load() else {
            return Err(SessionError::NoActiveSession);
        };

        let delta = wake_time - started_at;
        if delta < Duration::zero() {
            return Err(SessionError::InvalidWakeTime {
                started_at,
                wake_time,
            });
        }

        self.store.remove(SESSION_KEY)?;
        self.reminders.cancel(WAKE_UP_REMINDER);
        self.flags.write(DailyFlag::SleepLog.key(), true);

        let report = SleepReport {
            started_at,
            woke_at: wake_time,
            duration_ms: delta.num_milliseconds().max(0) as u64,
        };
        info!(%started_at, %wake_time, hours = report.whole_hours(), "sleep session finished");
        Ok(report)
    }

    /// Drop the active session without recording it.
    ///
    /// Returns the discarded start time, or `None` if nothing was running.
    ///
    /// # Errors
    /// Returns [`SessionError::Storage`] if the session could not be removed.
    pub fn reset(&self) -> Result<Option<DateTime<Utc>>, SessionError> {
        let previous = self.read_started_at();
        self.store.remove(SESSION_KEY)?;
        self.reminders.cancel(WAKE_UP_REMINDER);
        if let Some(started_at) = previous {
            info!(%started_at, "sleep session reset");
        }
        Ok(previous)
    }

    /// Confirmed restart: reset, then start fresh.
    ///
    /// # Errors
    /// Same as [`reset`](Self::reset) and [`start`](Self::start).
    pub fn restart(&self) -> Result<StartOutcome, SessionError> {
        self.reset()?;
        self.start()
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn schedule_reminder(&self, started_at: DateTime<Utc>) -> Result<String, SchedulerError> {
        if !self.policy.reminders_enabled {
            return Err(SchedulerError::Disabled);
        }
        let spec = NotificationSpec::new(
            self.policy.reminder_title.clone(),
            self.policy.reminder_body.clone(),
            started_at + self.policy.reminder_delay,
        );
        self.reminders.schedule_with_key(WAKE_UP_REMINDER, &spec)
    }

    /// Persisted start time. Unreadable or malformed records count as absent.
    fn read_started_at(&self) -> Option<DateTime<Utc>> {
        let raw = match self.store.get(SESSION_KEY) {
            Ok(raw) => raw?,
            Err(e) => {
                warn!(error = %e, "failed to read sleep session");
                return None;
            }
        };
        match serde_json::from_str::<StoredSession>(&raw) {
            Ok(stored) => Some(stored.started_at),
            Err(e) => {
                warn!(error = %e, "discarding malformed sleep session");
                if let Err(e) = self.store.remove(SESSION_KEY) {
                    warn!(error = %e, "failed to remove malformed sleep session");
                }
                None
            }
        }
    }
}
