use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "somnia", version, about = "Somnia sleep companion CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sleep session control
    Sleep {
        #[command(subcommand)]
        action: commands::sleep::SleepAction,
    },
    /// Once-per-day flags
    Flag {
        #[command(subcommand)]
        action: commands::flag::FlagAction,
    },
    /// Scheduled reminders
    Reminders {
        #[command(subcommand)]
        action: commands::reminders::RemindersAction,
    },
    /// Sleep statistics
    Stats {
        #[command(subcommand)]
        action: commands::stats::StatsAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

/// Log to stderr so stdout stays machine-readable JSON.
fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_env("SOMNIA_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() {
    init_logging();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Sleep { action } => commands::sleep::run(action),
        Commands::Flag { action } => commands::flag::run(action),
        Commands::Reminders { action } => commands::reminders::run(action),
        Commands::Stats { action } => commands::stats::run(action),
        Commands::Config { action } => commands::config::run(action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
