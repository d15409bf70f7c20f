//! SQLite-based storage.
//!
//! Provides persistent storage for:
//! - The key/value cells behind daily flags, the session record and
//!   notification id mappings
//! - Finished sleep sessions and their statistics
//! - The local notification outbox that stands in for a platform scheduler

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::{data_dir, migrations, KvStore};
use crate::error::{CoreError, SchedulerError, StorageError};
use crate::notify::{NotificationScheduler, NotificationSpec};

const MS_PER_HOUR: f64 = 3_600_000.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SleepRecord {
    pub id: i64,
    pub started_at: DateTime<Utc>,
    pub woke_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl SleepRecord {
    pub fn hours(&self) -> f64 {
        self.duration_ms as f64 / MS_PER_HOUR
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct SleepStats {
    pub sessions: u64,
    pub total_hours: f64,
    pub average_hours: f64,
    /// Duration of the most recently finished session.
    pub last_hours: Option<f64>,
}

/// A reminder sitting in the local outbox.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PendingNotification {
    pub id: String,
    pub title: String,
    pub body: String,
    pub fire_at: DateTime<Utc>,
}

/// SQLite database.
pub struct Database {
    conn: Connection,
}

fn ts(at: DateTime<Utc>) -> String {
    // Fixed width so TEXT comparison orders chronologically.
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>, rusqlite::Error> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })
}

impl Database {
    /// Open the database at `<data dir>/somnia.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the data directory is unavailable or the database
    /// cannot be opened or migrated.
    pub fn open() -> Result<Self, CoreError> {
        let path = data_dir()?.join("somnia.db");
        Ok(Self::open_at(&path)?)
    }

    /// Open (or create) a database file at an explicit path.
    pub fn open_at(path: &Path) -> Result<Self, StorageError> {
        let conn = Connection::open(path).map_err(|source| StorageError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<(), StorageError> {
        migrations::migrate(&self.conn).map_err(|e| StorageError::MigrationFailed(e.to_string()))
    }

    // ── Key/value ────────────────────────────────────────────────────

    /// Get a value from the kv store.
    pub fn kv_get(&self, key: &str) -> Result<Option<String>, rusqlite::Error> {
        self.conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get::<_, String>(0)
            })
            .optional()
    }

    /// Set a value in the kv store.
    pub fn kv_set(&self, key: &str, value: &str) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    /// Delete a key. Returns whether a row was removed.
    pub fn kv_delete(&self, key: &str) -> Result<bool, rusqlite::Error> {
        let affected = self
            .conn
            .execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(affected > 0)
    }

    /// List keys starting with `prefix`, sorted.
    pub fn kv_keys(&self, prefix: &str) -> Result<Vec<String>, rusqlite::Error> {
        let mut stmt = self
            .conn
            .prepare("SELECT key FROM kv WHERE substr(key, 1, length(?1)) = ?1 ORDER BY key")?;
        let keys = stmt
            .query_map(params![prefix], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(keys)
    }

    // ── Sleep log ────────────────────────────────────────────────────

    /// Record a finished sleep session.
    ///
    /// # Errors
    /// Returns an error if the insert fails.
    pub fn record_sleep(
        &self,
        started_at: DateTime<Utc>,
        woke_at: DateTime<Utc>,
        duration_ms: u64,
    ) -> Result<i64, rusqlite::Error> {
        self.conn.execute(
            "INSERT INTO sleep_log (started_at, woke_at, duration_ms) VALUES (?1, ?2, ?3)",
            params![ts(started_at), ts(woke_at), duration_ms as i64],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Most recent sessions first.
    pub fn recent_sleeps(&self, limit: usize) -> Result<Vec<SleepRecord>, rusqlite::Error> {
        let mut stmt = self.conn.prepare(
            "SELECT id, started_at, woke_at, duration_ms
             FROM sleep_log
             ORDER BY woke_at DESC, id DESC
             LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            let started_at: String = row.get(1)?;
            let woke_at: String = row.get(2)?;
            Ok(SleepRecord {
                id: row.get(0)?,
                started_at: parse_ts(&started_at)?,
                woke_at: parse_ts(&woke_at)?,
                duration_ms: row.get::<_, i64>(3)?.max(0) as u64,
            })
        })?;
        rows.collect()
    }

    /// Stats over sessions that ended within the last `days` days before `now`.
    pub fn stats_recent(&self, days: u32, now: DateTime<Utc>) -> Result<SleepStats, rusqlite::Error> {
        let since = now - Duration::days(i64::from(days));
        self.stats_since(Some(since))
    }

    pub fn stats_all(&self) -> Result<SleepStats, rusqlite::Error> {
        self.stats_since(None)
    }

    fn stats_since(&self, since: Option<DateTime<Utc>>) -> Result<SleepStats, rusqlite::Error> {
        let lower = since.map(ts).unwrap_or_default();
        let (sessions, total_ms): (i64, i64) = self.conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(duration_ms), 0)
             FROM sleep_log
             WHERE woke_at >= ?1",
            params![lower],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        let last_ms: Option<i64> = self
            .conn
            .query_row(
                "SELECT duration_ms FROM sleep_log
                 WHERE woke_at >= ?1
                 ORDER BY woke_at DESC, id DESC LIMIT 1",
                params![lower],
                |row| row.get(0),
            )
            .optional()?;

        let sessions = sessions.max(0) as u64;
        let total_hours = total_ms.max(0) as f64 / MS_PER_HOUR;
        Ok(SleepStats {
            sessions,
            total_hours,
            average_hours: if sessions == 0 {
                0.0
            } else {
                total_hours / sessions as f64
            },
            last_hours: last_ms.map(|ms| ms.max(0) as f64 / MS_PER_HOUR),
        })
    }

    // ── Notification outbox ──────────────────────────────────────────

    /// Undelivered notifications, soonest first.
    pub fn pending_notifications(&self) -> Result<Vec<PendingNotification>, rusqlite::Error> {
        self.query_notifications(
            "SELECT id, title, body, fire_at FROM notifications
             WHERE delivered_at IS NULL ORDER BY fire_at",
            None,
        )
    }

    /// Undelivered notifications whose fire time has passed.
    pub fn due_notifications(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<PendingNotification>, rusqlite::Error> {
        self.query_notifications(
            "SELECT id, title, body, fire_at FROM notifications
             WHERE delivered_at IS NULL AND fire_at <= ?1 ORDER BY fire_at",
            Some(ts(now)),
        )
    }

    pub fn mark_delivered(&self, id: &str, at: DateTime<Utc>) -> Result<bool, rusqlite::Error> {
        let affected = self.conn.execute(
            "UPDATE notifications SET delivered_at = ?2 WHERE id = ?1 AND delivered_at IS NULL",
            params![id, ts(at)],
        )?;
        Ok(affected > 0)
    }

    fn query_notifications(
        &self,
        sql: &str,
        bound: Option<String>,
    ) -> Result<Vec<PendingNotification>, rusqlite::Error> {
        let mut stmt = self.conn.prepare(sql)?;
        let map = |row: &rusqlite::Row<'_>| {
            let fire_at: String = row.get(3)?;
            Ok(PendingNotification {
                id: row.get(0)?,
                title: row.get(1)?,
                body: row.get(2)?,
                fire_at: parse_ts(&fire_at)?,
            })
        };
        match bound {
            Some(value) => stmt.query_map(params![value], map)?.collect(),
            None => stmt.query_map([], map)?.collect(),
        }
    }
}

impl KvStore for Database {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.kv_get(key)?)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        Ok(self.kv_set(key, value)?)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.kv_delete(key)?;
        Ok(())
    }
}

impl NotificationScheduler for Database {
    fn schedule(&self, spec: &NotificationSpec) -> Result<String, SchedulerError> {
        let id = uuid::Uuid::new_v4().to_string();
        self.conn.execute(
            "INSERT INTO notifications (id, title, body, fire_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id, spec.title, spec.body, ts(spec.fire_at), ts(Utc::now())],
        )?;
        Ok(id)
    }

    fn cancel(&self, platform_id: &str) -> Result<(), SchedulerError> {
        self.conn
            .execute(
                "DELETE FROM notifications WHERE id = ?1 AND delivered_at IS NULL",
                params![platform_id],
            )
            .map_err(|e| SchedulerError::CancelFailed {
                platform_id: platform_id.to_string(),
                message: e.to_string(),
            })?;
        Ok(())
    }

    fn cancel_all(&self) -> Result<usize, SchedulerError> {
        self.conn
            .execute("DELETE FROM notifications WHERE delivered_at IS NULL", [])
            .map_err(|e| SchedulerError::CancelFailed {
                platform_id: "*".to_string(),
                message: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    #[test]
    fn kv_store() {
        let db = Database::open_memory().unwrap();
        assert!(db.kv_get("test").unwrap().is_none());
        db.kv_set("test", "hello").unwrap();
        assert_eq!(db.kv_get("test").unwrap().unwrap(), "hello");
        assert!(db.kv_delete("test").unwrap());
        assert!(!db.kv_delete("test").unwrap());
    }

    #[test]
    fn kv_keys_filters_by_prefix() {
        let db = Database::open_memory().unwrap();
        db.kv_set("flag:tipFlag", "{}").unwrap();
        db.kv_set("flag:chatId", "{}").unwrap();
        db.kv_set("flagpole", "{}").unwrap();
        db.kv_set("session:current", "{}").unwrap();
        assert_eq!(
            db.kv_keys("flag:").unwrap(),
            vec!["flag:chatId".to_string(), "flag:tipFlag".to_string()]
        );
    }

    #[test]
    fn record_and_query_stats() {
        let db = Database::open_memory().unwrap();
        let night1 = utc("2024-03-09T23:00:00Z");
        let night2 = utc("2024-03-10T22:30:00Z");
        db.record_sleep(night1, night1 + Duration::hours(8), 8 * 3_600_000)
            .unwrap();
        db.record_sleep(night2, night2 + Duration::hours(6), 6 * 3_600_000)
            .unwrap();

        let all = db.stats_all().unwrap();
        assert_eq!(all.sessions, 2);
        assert!((all.total_hours - 14.0).abs() < 1e-9);
        assert!((all.average_hours - 7.0).abs() < 1e-9);
        assert_eq!(all.last_hours, Some(6.0));

        let recent = db.stats_recent(1, utc("2024-03-11T12:00:00Z")).unwrap();
        assert_eq!(recent.sessions, 1);
        assert_eq!(recent.last_hours, Some(6.0));

        let records = db.recent_sleeps(10).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].started_at, night2);
        assert!((records[1].hours() - 8.0).abs() < 1e-9);
    }

    #[test]
    fn empty_stats_are_zero() {
        let db = Database::open_memory().unwrap();
        assert_eq!(db.stats_all().unwrap(), SleepStats::default());
    }

    #[test]
    fn outbox_schedule_due_and_deliver() {
        let db = Database::open_memory().unwrap();
        let fire_at = utc("2024-03-11T07:00:00Z");
        let id = db
            .schedule(&NotificationSpec::new("Wake up", "", fire_at))
            .unwrap();

        assert_eq!(db.pending_notifications().unwrap().len(), 1);
        assert!(db.due_notifications(utc("2024-03-11T06:59:59Z")).unwrap().is_empty());

        let due = db.due_notifications(utc("2024-03-11T07:00:00Z")).unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, id);
        assert_eq!(due[0].fire_at, fire_at);

        assert!(db.mark_delivered(&id, fire_at).unwrap());
        assert!(!db.mark_delivered(&id, fire_at).unwrap());
        assert!(db.pending_notifications().unwrap().is_empty());
    }

    #[test]
    fn outbox_cancel_and_cancel_all() {
        let db = Database::open_memory().unwrap();
        let at = utc("2024-03-11T07:00:00Z");
        let a = db.schedule(&NotificationSpec::new("a", "", at)).unwrap();
        db.schedule(&NotificationSpec::new("b", "", at)).unwrap();
        db.schedule(&NotificationSpec::new("c", "", at)).unwrap();

        db.cancel(&a).unwrap();
        db.cancel(&a).unwrap();
        assert_eq!(db.pending_notifications().unwrap().len(), 2);
        assert_eq!(db.cancel_all().unwrap(), 2);
        assert!(db.pending_notifications().unwrap().is_empty());
    }
}
