//! Daily flags: values that are only valid until the end of the day they
//! were written.
//!
//! Used as a cheap "did this happen today" memo to skip redundant server
//! calls and to gate once-per-day actions. Expiry is lazy: a read that finds
//! an expired entry evicts it. Nothing sweeps in the background.
//!
//! ```ignore
//! let flags = ExpiringFlagStore::new(&db, &SystemClock, DayBoundary::Local);
//! flags.write(DailyFlag::TipFlag.key(), true);
//! assert!(flags.is_set(DailyFlag::TipFlag.key()));
//! ```

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::clock::{Clock, DayBoundary};
use crate::storage::KvStore;

const KEY_PREFIX: &str = "flag:";

/// The once-per-day memos the app keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DailyFlag {
    /// Today's chat session id.
    ChatId,
    /// Sleep was logged today.
    SleepLog,
    /// A tip was generated today.
    TipFlag,
    /// The daily report was generated today.
    ReportFlag,
}

impl DailyFlag {
    pub const ALL: [DailyFlag; 4] = [
        DailyFlag::ChatId,
        DailyFlag::SleepLog,
        DailyFlag::TipFlag,
        DailyFlag::ReportFlag,
    ];

    pub fn key(self) -> &'static str {
        match self {
            DailyFlag::ChatId => "chatId",
            DailyFlag::SleepLog => "sleepLog",
            DailyFlag::TipFlag => "tipFlag",
            DailyFlag::ReportFlag => "reportFlag",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|flag| flag.key() == key)
    }
}

pub(crate) fn storage_key(key: &str) -> String {
    format!("{KEY_PREFIX}{key}")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FlagEntry {
    value: Value,
    expires_at: DateTime<Utc>,
}

pub struct ExpiringFlagStore<'a> {
    store: &'a dyn KvStore,
    clock: &'a dyn Clock,
    boundary: DayBoundary,
}

impl<'a> ExpiringFlagStore<'a> {
    pub fn new(store: &'a dyn KvStore, clock: &'a dyn Clock, boundary: DayBoundary) -> Self {
        Self {
            store,
            clock,
            boundary,
        }
    }

    /// Store `value` until the end of today. Replaces any previous entry.
    ///
    /// Storage failures are logged and swallowed; the feature then behaves
    /// as if the flag was never written.
    pub fn write(&self, key: &str, value: impl Into<Value>) {
        let expires_at = self.boundary.end_of_day(self.clock.now());
        let entry = FlagEntry {
            value: value.into(),
            expires_at,
        };
        let json = match serde_json::to_string(&entry) {
            Ok(json) => json,
            Err(e) => {
                warn!(key, error = %e, "failed to encode daily flag");
                return;
            }
        };
        match self.store.set(&storage_key(key), &json) {
            Ok(()) => debug!(key, %expires_at, "daily flag written"),
            Err(e) => warn!(key, error = %e, "failed to write daily flag"),
        }
    }

    /// Typed variant of [`write`](Self::write).
    pub fn write_as<T: Serialize>(&self, key: &str, value: &T) {
        match serde_json::to_value(value) {
            Ok(value) => self.write(key, value),
            Err(e) => warn!(key, error = %e, "failed to encode daily flag"),
        }
    }

    /// Current value, or `None` when absent, expired, or unreadable.
    ///
    /// An expired or malformed entry is removed as a side effect.
    pub fn read(&self, key: &str) -> Option<Value> {
        let raw = match self.store.get(&storage_key(key)) {
            Ok(raw) => raw?,
            Err(e) => {
                warn!(key, error = %e, "failed to read daily flag");
                return None;
            }
        };

        let entry = match serde_json::from_str::<FlagEntry>(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(key, error = %e, "discarding malformed daily flag");
                self.remove(key);
                return None;
            }
        };

        if self.clock.now() >= entry.expires_at {
            debug!(key, expires_at = %entry.expires_at, "daily flag expired");
            self.remove(key);
            return None;
        }
        Some(entry.value)
    }

    /// Typed variant of [`read`](Self::read). A value of the wrong shape is
    /// treated as absent but left in place.
    pub fn read_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.read(key)?;
        match serde_json::from_value(value) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(key, error = %e, "daily flag has unexpected shape");
                None
            }
        }
    }

    /// Whether a live entry exists and is not `false`/`null`.
    pub fn is_set(&self, key: &str) -> bool {
        !matches!(self.read(key), None | Some(Value::Null) | Some(Value::Bool(false)))
    }

    /// Delete the entry. Removing a missing key is fine.
    pub fn remove(&self, key: &str) {
        if let Err(e) = self.store.remove(&storage_key(key)) {
            warn!(key, error = %e, "failed to remove daily flag");
        }
    }

    /// Delete every known daily flag.
    pub fn clear_all(&self) {
        for flag in DailyFlag::ALL {
            self.remove(flag.key());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::StorageError;
    use crate::storage::MemoryStore;
    use chrono::Duration;

    fn utc(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    struct BrokenStore;

    impl KvStore for BrokenStore {
        fn get(&self, _key: &str) -> Result<Option<String>, StorageError> {
            Err(StorageError::Locked)
        }
        fn set(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
            Err(StorageError::Locked)
        }
        fn remove(&self, _key: &str) -> Result<(), StorageError> {
            Err(StorageError::Locked)
        }
    }

    #[test]
    fn tip_flag_expires_at_midnight() {
        let store = MemoryStore::new();
        let clock = ManualClock::new(utc("2024-03-10T22:00:00Z"));
        let flags = ExpiringFlagStore::new(&store, &clock, DayBoundary::Utc);

        flags.write("tipFlag", true);

        clock.set(utc("2024-03-10T23:30:00Z"));
        assert_eq!(flags.read("tipFlag"), Some(Value::Bool(true)));

        clock.set(utc("2024-03-11T00:00:01Z"));
        assert_eq!(flags.read("tipFlag"), None);
        assert!(store.get("flag:tipFlag").unwrap().is_none());
    }

    #[test]
    fn entry_is_gone_at_exactly_expires_at() {
        let store = MemoryStore::new();
        let clock = ManualClock::new(utc("2024-03-10T08:00:00Z"));
        let flags = ExpiringFlagStore::new(&store, &clock, DayBoundary::Utc);

        flags.write("sleepLog", true);
        clock.set(utc("2024-03-10T23:59:59.998Z"));
        assert!(flags.is_set("sleepLog"));
        clock.set(utc("2024-03-10T23:59:59.999Z"));
        assert!(!flags.is_set("sleepLog"));
    }

    #[test]
    fn eviction_is_permanent_even_if_clock_goes_back() {
        let store = MemoryStore::new();
        let clock = ManualClock::new(utc("2024-03-10T08:00:00Z"));
        let flags = ExpiringFlagStore::new(&store, &clock, DayBoundary::Utc);

        flags.write("reportFlag", "r-1");
        clock.advance(Duration::days(1));
        assert!(flags.read("reportFlag").is_none());
        clock.advance(Duration::days(-1));
        assert!(flags.read("reportFlag").is_none());
    }

    #[test]
    fn rewrite_replaces_value_and_expiry() {
        let store = MemoryStore::new();
        let clock = ManualClock::new(utc("2024-03-10T08:00:00Z"));
        let flags = ExpiringFlagStore::new(&store, &clock, DayBoundary::Utc);

        flags.write("chatId", "first");
        clock.set(utc("2024-03-11T09:00:00Z"));
        flags.write("chatId", "second");
        clock.set(utc("2024-03-11T20:00:00Z"));
        assert_eq!(flags.read_as::<String>("chatId").as_deref(), Some("second"));
    }

    #[test]
    fn remove_is_idempotent() {
        let store = MemoryStore::new();
        let clock = ManualClock::new(Utc::now());
        let flags = ExpiringFlagStore::new(&store, &clock, DayBoundary::Utc);

        flags.remove("tipFlag");
        flags.write("tipFlag", true);
        flags.remove("tipFlag");
        flags.remove("tipFlag");
        assert!(flags.read("tipFlag").is_none());
    }

    #[test]
    fn malformed_entry_reads_as_absent_and_is_dropped() {
        let store = MemoryStore::new();
        store.set("flag:tipFlag", "{\"value\":").unwrap();
        let clock = ManualClock::new(Utc::now());
        let flags = ExpiringFlagStore::new(&store, &clock, DayBoundary::Utc);

        assert!(flags.read("tipFlag").is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn storage_failures_degrade_to_absent() {
        let clock = ManualClock::new(Utc::now());
        let flags = ExpiringFlagStore::new(&BrokenStore, &clock, DayBoundary::Utc);

        flags.write("tipFlag", true);
        assert!(flags.read("tipFlag").is_none());
        flags.remove("tipFlag");
    }

    #[test]
    fn is_set_treats_false_and_null_as_unset() {
        let store = MemoryStore::new();
        let clock = ManualClock::new(utc("2024-03-10T08:00:00Z"));
        let flags = ExpiringFlagStore::new(&store, &clock, DayBoundary::Utc);

        flags.write("a", false);
        flags.write("b", Value::Null);
        flags.write("c", "chat-42");
        assert!(!flags.is_set("a"));
        assert!(!flags.is_set("b"));
        assert!(flags.is_set("c"));
    }

    #[test]
    fn fixed_offset_boundary_follows_that_calendar() {
        let store = MemoryStore::new();
        // 13:00 UTC is 22:00 in +09:00; that day ends at 14:59:59.999 UTC.
        let clock = ManualClock::new(utc("2024-03-10T13:00:00Z"));
        let boundary = DayBoundary::parse("+09:00").unwrap();
        let flags = ExpiringFlagStore::new(&store, &clock, boundary);

        flags.write("tipFlag", true);
        clock.set(utc("2024-03-10T14:59:00Z"));
        assert!(flags.is_set("tipFlag"));
        clock.set(utc("2024-03-10T15:00:00Z"));
        assert!(!flags.is_set("tipFlag"));
    }

    #[test]
    fn clear_all_only_touches_daily_flags() {
        let store = MemoryStore::new();
        store.set("session:current", "{}").unwrap();
        let clock = ManualClock::new(utc("2024-03-10T08:00:00Z"));
        let flags = ExpiringFlagStore::new(&store, &clock, DayBoundary::Utc);

        for flag in DailyFlag::ALL {
            flags.write(flag.key(), true);
        }
        flags.clear_all();
        assert_eq!(store.keys(), vec!["session:current".to_string()]);
    }

    #[test]
    fn daily_flag_keys_roundtrip() {
        for flag in DailyFlag::ALL {
            assert_eq!(DailyFlag::from_key(flag.key()), Some(flag));
        }
        assert_eq!(DailyFlag::from_key("unknown"), None);
    }

    #[test]
    fn typed_values_roundtrip_through_json() {
        let store = MemoryStore::new();
        let clock = ManualClock::new(utc("2024-03-10T08:00:00Z"));
        let flags = ExpiringFlagStore::new(&store, &clock, DayBoundary::Utc);

        flags.write_as("scores", &vec![3u32, 5, 8]);
        assert_eq!(flags.read_as::<Vec<u32>>("scores"), Some(vec![3, 5, 8]));
        assert_eq!(flags.read_as::<String>("scores"), None);
        assert!(flags.read("scores").is_some());
    }
}
