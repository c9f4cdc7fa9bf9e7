use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use plantas_analytics::{init_logging, ConfigStore, LocalEventStore, TrackerConfig};

/// Inspect the locally buffered analytics events.
#[derive(Parser)]
#[command(name = "plantas-analytics", version, about)]
struct Cli {
    /// Path to the SQLite event buffer
    #[arg(long, default_value = "analytics.sqlite3")]
    db: PathBuf,

    /// Optional tracker config (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print buffered statistics as JSON
    Stats,
    /// Remove buffered events and the session record
    Clear,
    /// Print the development debug summary
    DebugSummary,
}

fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => ConfigStore::new(path.clone())?.config(),
        None => TrackerConfig::default(),
    };
    let store = LocalEventStore::open(&cli.db, &config);

    match cli.command {
        Command::Stats => {
            let stats = store.read_stats();
            let rendered =
                serde_json::to_string_pretty(&stats).context("failed to render stats")?;
            println!("{rendered}");
        }
        Command::Clear => {
            store.clear();
            println!("Cleared local analytics buffer at {}", cli.db.display());
        }
        Command::DebugSummary => {
            if config.debug_enabled() {
                println!("{}", store.read_stats().summary());
            } else {
                println!("Debug summary is only available for local origins or with debug enabled");
            }
        }
    }

    Ok(())
}
