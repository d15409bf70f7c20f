use clap::Subcommand;
use serde_json::{json, Value};
use somnia_core::{DailyFlag, ExpiringFlagStore, SystemClock};

use super::{open, print_json, CmdResult};

/// Namespace the flag store keeps its entries under in the kv table.
const KEY_PREFIX: &str = "flag:";

#[derive(Subcommand)]
pub enum FlagAction {
    /// Set a flag until the end of today
    Set {
        /// Flag key (e.g. "tipFlag", "chatId")
        key: String,
        /// JSON value; anything that is not valid JSON is stored as a string
        #[arg(default_value = "true")]
        value: String,
    },
    /// Print a flag's value, or null if unset or expired
    Get { key: String },
    /// Remove a flag
    Remove { key: String },
    /// Print the known daily flags plus any other flag written today
    List,
}

fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

pub fn run(action: FlagAction) -> CmdResult {
    let (db, config) = open()?;
    let clock = SystemClock;
    let flags = ExpiringFlagStore::new(&db, &clock, config.flags.day_boundary);

    match action {
        FlagAction::Set { key, value } => {
            flags.write(&key, parse_value(&value));
            print_json(&json!({ "key": key, "value": flags.read(&key) }))?;
        }
        FlagAction::Get { key } => {
            print_json(&flags.read(&key).unwrap_or(Value::Null))?;
        }
        FlagAction::Remove { key } => {
            flags.remove(&key);
            println!("removed {key}");
        }
        FlagAction::List => {
            let stored = db.kv_keys(KEY_PREFIX)?;
            let listed: serde_json::Map<String, Value> = DailyFlag::ALL
                .iter()
                .map(|flag| flag.key().to_string())
                .chain(stored.iter().filter_map(|k| k.strip_prefix(KEY_PREFIX).map(String::from)))
                .map(|key| {
                    let value = flags.read(&key).unwrap_or(Value::Null);
                    (key, value)
                })
                .collect();
            print_json(&listed)?;
        }
    }
    Ok(())
}
