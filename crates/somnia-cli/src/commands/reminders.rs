use std::time::Duration;

use chrono::{DateTime, Utc};
use clap::Subcommand;
use somnia_core::{Database, Event, NotificationIdRegistry, StorageError, WAKE_UP_REMINDER};

use super::{open, print_json, CmdResult};

#[derive(Subcommand)]
pub enum RemindersAction {
    /// Undelivered reminders in the local outbox
    List,
    /// Cancel the reminder registered under a key
    Cancel {
        #[arg(default_value = WAKE_UP_REMINDER)]
        key: String,
    },
    /// Cancel every reminder and forget known keys
    CancelAll,
    /// Deliver reminders as they come due until interrupted
    Watch {
        #[arg(long, default_value = "30")]
        interval_secs: u64,
        /// Deliver whatever is due now and exit
        #[arg(long)]
        once: bool,
    },
}

/// Mark every due reminder delivered and describe each one.
fn deliver_due(db: &Database, now: DateTime<Utc>) -> Result<Vec<Event>, StorageError> {
    let mut delivered = Vec::new();
    for pending in db.due_notifications(now)? {
        if !db.mark_delivered(&pending.id, now)? {
            continue;
        }
        tracing::info!(platform_id = %pending.id, "reminder delivered");
        delivered.push(Event::ReminderDue {
            platform_id: pending.id,
            title: pending.title,
            body: pending.body,
            fire_at: pending.fire_at,
        });
    }
    Ok(delivered)
}

fn tick(db: &Database) -> CmdResult {
    for event in deliver_due(db, Utc::now())? {
        print_json(&event)?;
    }
    Ok(())
}

async fn watch(db: &Database, interval_secs: u64) -> CmdResult {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    tracing::info!(interval_secs, "watching reminder outbox");
    loop {
        tokio::select! {
            _ = interval.tick() => tick(db)?,
            _ = &mut ctrl_c => {
                tracing::info!("reminder watch stopped");
                break;
            }
        }
    }
    Ok(())
}

pub fn run(action: RemindersAction) -> CmdResult {
    let (db, _config) = open()?;

    match action {
        RemindersAction::List => {
            print_json(&db.pending_notifications()?)?;
        }
        RemindersAction::Cancel { key } => {
            let registry = NotificationIdRegistry::new(&db, &db);
            let was_present = registry.cancel(&key);
            print_json(&Event::ReminderCancelled {
                key,
                was_present,
                at: Utc::now(),
            })?;
        }
        RemindersAction::CancelAll => {
            let registry = NotificationIdRegistry::new(&db, &db);
            let count = registry.cancel_all(&[WAKE_UP_REMINDER])?;
            println!("cancelled {count} reminder(s)");
        }
        RemindersAction::Watch {
            interval_secs,
            once,
        } => {
            if once {
                tick(&db)?;
            } else {
                tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()?
                    .block_on(watch(&db, interval_secs))?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use somnia_core::{NotificationScheduler, NotificationSpec};

    #[test]
    fn due_reminders_are_delivered_once() {
        let db = Database::open_memory().unwrap();
        let now = Utc::now();
        let due = db
            .schedule(&NotificationSpec::new("Good morning", "log it", now - ChronoDuration::minutes(1)))
            .unwrap();
        db.schedule(&NotificationSpec::new("later", "", now + ChronoDuration::hours(1)))
            .unwrap();

        let events = deliver_due(&db, now).unwrap();
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], Event::ReminderDue { platform_id, .. } if *platform_id == due));

        assert!(deliver_due(&db, now).unwrap().is_empty());
        assert_eq!(db.pending_notifications().unwrap().len(), 1);
    }
}
