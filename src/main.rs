//! combatd - combat session synchronization daemon

use std::path::PathBuf;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use combatd::resources::NpcKind;
use combatd::{open_store, CombatClient, Config, Role};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Combat session synchronization daemon
#[derive(Parser, Debug)]
#[command(name = "combatd", version, about = "Keep a combat session in sync")]
struct Args {
    /// TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// SQLite database path (overrides config)
    #[arg(short, long)]
    database: Option<String>,

    /// Session id (overrides config)
    #[arg(short, long)]
    session: Option<String>,

    /// Character this client plays (overrides config)
    #[arg(long)]
    character: Option<String>,

    /// Run with game-master rights
    #[arg(long)]
    gm: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Follow the session and run turn boundary work until Ctrl-C
    Watch,
    /// Restore the whole party
    LongRest,
    /// Clear battle-scoped resources and the round state
    NewBattle,
    /// Change an NPC's level (game master only)
    NpcLevel { npc: String, level: u8 },
    /// Print the session's round state
    Status,
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

    let mut config = Config::load(args.config.as_deref())?;
    if args.database.is_some() {
        config.database = args.database;
    }
    if let Some(session) = args.session {
        config.session_id = session;
    }
    if args.character.is_some() {
        config.character_id = args.character;
    }
    if args.gm {
        config.role = Role::GameMaster;
    }

    let store = open_store(&config).await?;
    let client = CombatClient::connect(config, store).await?;

    match args.command {
        Command::Watch => {
            let run = client.run();
            tokio::pin!(run);
            tokio::select! {
                result = &mut run => result?,
                _ = tokio::signal::ctrl_c() => {
                    info!("Interrupted, shutting down");
                    client.shutdown();
                    run.await?;
                }
            }
        }
        Command::LongRest => report(client.long_rest().await?),
        Command::NewBattle => report(client.new_battle().await?),
        Command::NpcLevel { npc, level } => {
            let kind: NpcKind = npc
                .parse()
                .map_err(|_| anyhow!("Unknown NPC kind: {}", npc))?;
            let change = client.set_npc_level(kind, level).await?;
            println!(
                "{} is now level {} ({}/{} HP)",
                kind, change.level, change.hp, change.max_hp
            );
        }
        Command::Status => {
            let session = client.session_snapshot().await?;
            let round = &session.combat_state;
            println!(
                "session {}: {} round {} turn {}",
                client.config().session_id,
                if round.is_active { "active" } else { "idle" },
                round.round,
                round.current_turn.as_deref().unwrap_or("-")
            );
            for entry in &round.initiative_order {
                println!("  {:>2} {}", entry.initiative, entry.id);
            }
        }
    }

    Ok(())
}

fn report(report: combatd::reset::ResetReport) {
    for id in &report.succeeded {
        println!("ok      {}", id);
    }
    for (id, error) in &report.failed {
        println!("failed  {}: {}", id, error);
    }
}
