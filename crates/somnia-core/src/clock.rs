//! Wall-clock source and calendar-day boundaries.
//!
//! Every component takes a `&dyn Clock` so tests can pin "now" and step it
//! across midnight or past the stale-session window.

use chrono::{
    DateTime, Duration, FixedOffset, Local, LocalResult, NaiveDateTime, NaiveTime, TimeZone, Utc,
};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// Time provider.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Reads the system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, to: DateTime<Utc>) {
        if let Ok(mut now) = self.now.lock() {
            *now = to;
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut now) = self.now.lock() {
            *now += by;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        match self.now.lock() {
            Ok(now) => *now,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

/// Which calendar decides where "today" ends.
///
/// Serialized as `"local"`, `"utc"`, or an offset such as `"+09:00"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DayBoundary {
    /// Device-local wall clock, DST rules included.
    #[default]
    Local,
    Utc,
    Fixed(FixedOffset),
}

impl DayBoundary {
    /// Last representable millisecond (23:59:59.999) of the day containing `at`.
    pub fn end_of_day(&self, at: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            DayBoundary::Local => end_of_day_in(at, &Local),
            DayBoundary::Utc => end_of_day_in(at, &Utc),
            DayBoundary::Fixed(offset) => end_of_day_in(at, offset),
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "local" => Some(DayBoundary::Local),
            "utc" | "z" => Some(DayBoundary::Utc),
            other => other.parse::<FixedOffset>().ok().map(DayBoundary::Fixed),
        }
    }
}

fn end_of_day_in<Tz: TimeZone>(at: DateTime<Utc>, tz: &Tz) -> DateTime<Utc> {
    let date = at.with_timezone(tz).date_naive();
    let last: NaiveDateTime =
        date.and_time(NaiveTime::MIN) + Duration::days(1) - Duration::milliseconds(1);
    resolve_local(tz.from_local_datetime(&last), last)
}

/// Map a local wall time onto the timeline. A repeated hour picks the later
/// instant; a DST gap falls back to reading the wall time as UTC.
fn resolve_local<Tz: TimeZone>(
    mapped: LocalResult<DateTime<Tz>>,
    wall: NaiveDateTime,
) -> DateTime<Utc> {
    mapped
        .latest()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| wall.and_utc())
}

impl std::fmt::Display for DayBoundary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DayBoundary::Local => f.write_str("local"),
            DayBoundary::Utc => f.write_str("utc"),
            DayBoundary::Fixed(offset) => write!(f, "{offset}"),
        }
    }
}

impl Serialize for DayBoundary {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for DayBoundary {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DayBoundary::parse(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid day boundary: {raw}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    #[test]
    fn utc_end_of_day() {
        let end = DayBoundary::Utc.end_of_day(utc("2024-03-10T22:00:00Z"));
        assert_eq!(end, utc("2024-03-10T23:59:59.999Z"));
    }

    #[test]
    fn fixed_offset_uses_its_own_calendar_day() {
        // 20:00 UTC on the 10th is already 05:00 on the 11th in +09:00.
        let tokyo = DayBoundary::parse("+09:00").unwrap();
        let end = tokyo.end_of_day(utc("2024-03-10T20:00:00Z"));
        assert_eq!(end, utc("2024-03-11T14:59:59.999Z"));
    }

    #[test]
    fn local_end_of_day_is_after_now() {
        let now = Utc::now();
        let end = DayBoundary::Local.end_of_day(now);
        assert!(end >= now);
        assert!(end - now < Duration::hours(26));
    }

    fn wall(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.3f").unwrap()
    }

    #[test]
    fn wall_time_in_dst_gap_reads_as_utc() {
        let end = resolve_local::<FixedOffset>(LocalResult::None, wall("2024-03-10 23:59:59.999"));
        assert_eq!(end, utc("2024-03-10T23:59:59.999Z"));
    }

    #[test]
    fn repeated_wall_time_takes_later_instant() {
        let at = wall("2024-11-03 23:59:59.999");
        let summer = FixedOffset::west_opt(4 * 3600).unwrap();
        let winter = FixedOffset::west_opt(5 * 3600).unwrap();
        let earlier = summer.from_local_datetime(&at).unwrap();
        let later = winter.from_local_datetime(&at).unwrap();

        let end = resolve_local(LocalResult::Ambiguous(earlier, later), at);
        assert_eq!(end, utc("2024-11-04T04:59:59.999Z"));
    }

    #[test]
    fn unambiguous_wall_time_maps_directly() {
        let at = wall("2024-03-10 23:59:59.999");
        let offset = FixedOffset::east_opt(2 * 3600).unwrap();
        let end = resolve_local(offset.from_local_datetime(&at), at);
        assert_eq!(end, utc("2024-03-10T21:59:59.999Z"));
    }

    #[test]
    fn boundary_parse_and_display() {
        assert_eq!(DayBoundary::parse("LOCAL"), Some(DayBoundary::Local));
        assert_eq!(DayBoundary::parse("utc"), Some(DayBoundary::Utc));
        assert!(DayBoundary::parse("tomorrow").is_none());
        let fixed = DayBoundary::parse("-05:00").unwrap();
        assert_eq!(fixed.to_string(), "-05:00");
    }

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::new(utc("2024-03-10T22:00:00Z"));
        clock.advance(Duration::hours(3));
        assert_eq!(clock.now(), utc("2024-03-11T01:00:00Z"));
        clock.set(utc("2024-01-01T00:00:00Z"));
        assert_eq!(clock.now(), utc("2024-01-01T00:00:00Z"));
    }
}
