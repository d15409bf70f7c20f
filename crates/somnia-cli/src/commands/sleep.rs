use chrono::{DateTime, Duration, Local, NaiveTime, TimeZone, Utc};
use clap::Subcommand;
use somnia_core::{
    Clock, DailyFlag, Event, ExpiringFlagStore, NotificationIdRegistry, SessionError,
    SleepReport, SleepSessionTracker, StartOutcome, SystemClock, WAKE_UP_REMINDER,
};

use super::{open, print_json, CmdResult};

#[derive(Subcommand)]
pub enum SleepAction {
    /// Mark going to sleep now
    Start,
    /// Mark waking up and record the session
    Finish {
        /// Wake time: RFC 3339, or HH:MM for the latest such local time (default: now)
        #[arg(long)]
        at: Option<String>,
    },
    /// Print the current session state as JSON
    Status,
    /// Discard the running session without recording it
    Reset,
    /// Discard the running session and start a new one now
    Restart,
    /// Recently finished sessions
    History {
        #[arg(long, default_value = "7")]
        limit: usize,
    },
}

/// Resolve a `--at` argument against `now`.
fn parse_wake_time(raw: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>, String> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    let time = NaiveTime::parse_from_str(raw, "%H:%M")
        .map_err(|_| format!("cannot parse wake time '{raw}' (use RFC 3339 or HH:MM)"))?;

    let today = now.with_timezone(&Local).date_naive();
    let candidate = Local
        .from_local_datetime(&today.and_time(time))
        .earliest()
        .ok_or_else(|| format!("{raw} does not exist today in local time"))?
        .with_timezone(&Utc);
    if candidate > now {
        Ok(candidate - Duration::days(1))
    } else {
        Ok(candidate)
    }
}

fn start_event(outcome: StartOutcome, now: DateTime<Utc>) -> Event {
    match outcome {
        StartOutcome::Started {
            started_at,
            reminder,
        } => {
            let (reminder_id, reminder_error) = match reminder {
                Ok(id) => (Some(id), None),
                Err(e) => (None, Some(e.to_string())),
            };
            Event::SessionStarted {
                started_at,
                reminder_id,
                reminder_error,
            }
        }
        StartOutcome::AlreadyActive { started_at } => Event::SessionAlreadyActive {
            started_at,
            at: now,
        },
    }
}

/// Finish the session, then hand the report to `record`.
///
/// The session record is already gone once `finish` succeeds, so a failed
/// history insert is logged and the report still returned.
fn finish_and_record<T, E: std::fmt::Display>(
    tracker: &SleepSessionTracker<'_>,
    wake_time: DateTime<Utc>,
    record: impl FnOnce(&SleepReport) -> Result<T, E>,
) -> Result<SleepReport, SessionError> {
    let report = tracker.finish(wake_time)?;
    if let Err(e) = record(&report) {
        tracing::warn!(
            started_at = %report.started_at,
            duration_ms = report.duration_ms,
            error = %e,
            "finished session not written to sleep history"
        );
    }
    Ok(report)
}

pub fn run(action: SleepAction) -> CmdResult {
    let (db, config) = open()?;
    let clock = SystemClock;
    let boundary = config.flags.day_boundary;
    let tracker =
        SleepSessionTracker::new(&db, &db, &clock, boundary).with_policy(config.session_policy());

    match action {
        SleepAction::Start => {
            let outcome = tracker.start()?;
            let already = matches!(outcome, StartOutcome::AlreadyActive { .. });
            print_json(&start_event(outcome, clock.now()))?;
            if already {
                eprintln!("A session is already running. Use `somnia sleep restart` to replace it.");
            }
        }
        SleepAction::Finish { at } => {
            let wake_time = match at {
                Some(raw) => parse_wake_time(&raw, clock.now())?,
                None => clock.now(),
            };
            let report = finish_and_record(&tracker, wake_time, |report| {
                db.record_sleep(report.started_at, report.woke_at, report.duration_ms)
            })?;
            print_json(&Event::from(&report))?;
        }
        SleepAction::Status => {
            let loaded = tracker.load_report();
            if let Some(started_at) = loaded.discarded {
                print_json(&Event::SessionDiscarded {
                    started_at,
                    at: clock.now(),
                })?;
            }
            let flags = ExpiringFlagStore::new(&db, &clock, boundary);
            let reminders = NotificationIdRegistry::new(&db, &db);
            let now = clock.now();
            print_json(&Event::StateSnapshot {
                session: loaded.state,
                elapsed_ms: tracker
                    .elapsed()
                    .map(|elapsed| elapsed.num_milliseconds().max(0) as u64),
                sleep_logged_today: flags.is_set(DailyFlag::SleepLog.key()),
                reminder_pending: reminders.exists(WAKE_UP_REMINDER),
                at: now,
            })?;
        }
        SleepAction::Reset => {
            let started_at = tracker.reset()?;
            print_json(&Event::SessionReset {
                started_at,
                at: clock.now(),
            })?;
        }
        SleepAction::Restart => {
            let outcome = tracker.restart()?;
            print_json(&start_event(outcome, clock.now()))?;
        }
        SleepAction::History { limit } => {
            let records = db.recent_sleeps(limit)?;
            print_json(&records)?;
        }
    }
    Ok(())
}
