//! combatd_init - One-time database initialization tool
//!
//! Creates a fresh combat database with the party's records and a battle
//! session.

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Parser;
use combatd::init::{init_database, BattleSeed};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// combatd database initialization tool
#[derive(Parser, Debug)]
#[command(
    name = "combatd_init",
    version,
    about = "Initialize a new combatd database"
)]
struct Args {
    /// Path to SQLite database file to create (must not exist)
    #[arg(short, long)]
    database: PathBuf,

    /// Battle seed JSON file (party and session)
    #[arg(long)]
    seed: Option<PathBuf>,

    /// Session id when no seed file is given
    #[arg(long, default_value = "default")]
    session: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "combatd=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let seed = match &args.seed {
        Some(path) => {
            if !path.exists() {
                bail!("Seed file not found: {}", path.display());
            }
            BattleSeed::from_json(&std::fs::read_to_string(path)?)?
        }
        None => BattleSeed::new(&args.session),
    };

    init_database(&args.database, &seed).await?;

    println!(
        "Database created at {} (session {})",
        args.database.display(),
        seed.session_id
    );
    Ok(())
}
