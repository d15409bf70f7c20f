//! # Somnia Core Library
//!
//! Local state behind the Somnia sleep companion: the in-progress sleep
//! session, once-per-day flags, and the bookkeeping that keeps scheduled
//! reminders replaceable. Screens, charts and the REST backend live
//! elsewhere and drive this crate through the types below.
//!
//! ## Architecture
//!
//! - **Session Tracker**: a persisted start timestamp with an Idle/Active
//!   state machine; duration is derived at wake time
//! - **Daily Flags**: key/value cells that expire at the end of the calendar
//!   day they were written, evicted lazily on read
//! - **Notification Registry**: one live platform notification per logical key
//! - **Storage**: SQLite key/value table, sleep history and a local
//!   notification outbox; TOML configuration
//!
//! ## Key Components
//!
//! - [`SleepSessionTracker`]: sleep session state machine
//! - [`ExpiringFlagStore`]: daily flags
//! - [`NotificationIdRegistry`]: reminder id bookkeeping
//! - [`KvStore`] / [`NotificationScheduler`] / [`Clock`]: injected collaborators
//! - [`Database`]: durable implementation of the storage and scheduler seams
//! - [`Config`]: application configuration management
//! - [`SessionGuard`]: called by the external HTTP layer with response
//!   statuses; forces logout and wipes local state on a 401

pub mod auth;
pub mod clock;
pub mod error;
pub mod events;
pub mod flags;
pub mod notify;
pub mod session;
pub mod storage;

pub use auth::{ForceLogout, SessionGuard};
pub use clock::{Clock, DayBoundary, ManualClock, SystemClock};
pub use error::{ConfigError, CoreError, SchedulerError, SessionError, StorageError};
pub use events::Event;
pub use flags::{DailyFlag, ExpiringFlagStore};
pub use notify::{
    MemoryScheduler, NotificationIdRegistry, NotificationScheduler, NotificationSpec,
    WAKE_UP_REMINDER,
};
pub use session::{
    LoadReport, SessionPolicy, SessionState, SleepReport, SleepSessionTracker, StartOutcome,
};
pub use storage::{Config, Database, KvStore, MemoryStore, SleepStats};
