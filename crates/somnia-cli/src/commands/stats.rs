use chrono::Utc;
use clap::Subcommand;
use somnia_core::Database;

#[derive(Subcommand)]
pub enum StatsAction {
    /// Stats over the last N days
    Recent {
        #[arg(long, default_value = "7")]
        days: u32,
    },
    /// All-time stats
    All,
}

pub fn run(action: StatsAction) -> Result<(), Box<dyn std::error::Error>> {
    let db = Database::open()?;

    match action {
        StatsAction::Recent { days } => {
            let stats = db.stats_recent(days, Utc::now())?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        StatsAction::All => {
            let stats = db.stats_all()?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
    }
    Ok(())
}
