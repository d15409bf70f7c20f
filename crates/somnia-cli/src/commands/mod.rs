pub mod config;
pub mod flag;
pub mod reminders;
pub mod sleep;
pub mod stats;

use serde::Serialize;
use somnia_core::{Config, Database};

pub type CmdResult = Result<(), Box<dyn std::error::Error>>;

/// Database and configuration every command starts from.
pub fn open() -> Result<(Database, Config), Box<dyn std::error::Error>> {
    let db = Database::open()?;
    let config = Config::load_or_default();
    Ok((db, config))
}

pub fn print_json<T: Serialize>(value: &T) -> CmdResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
