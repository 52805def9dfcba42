//! combatd - combat session synchronization daemon
//!
//! Keeps a turn-based tabletop combat session consistent across player and
//! game-master clients sharing one document store.

pub mod client;
pub mod control;
pub mod db;
pub mod decay;
pub mod init;
pub mod reset;
pub mod resources;
pub mod session;
pub mod store;
pub mod sync;
pub mod turns;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use tracing::info;

use db::Database;
use store::{DocumentStore, SqliteStore};

pub use client::{CombatClient, EngineAction};

/// What a client is allowed to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    GameMaster,
    #[default]
    Player,
}

impl Role {
    pub fn is_game_master(&self) -> bool {
        *self == Role::GameMaster
    }
}

/// Client configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite path; None = in-memory
    pub database: Option<String>,
    pub session_id: String,
    /// Character this client plays, if any
    pub character_id: Option<String>,
    pub role: Role,
    pub debounce_ms: u64,
    pub poll_interval_ms: u64,
    /// Character whose turn start triggers burn damage
    pub burn_tick_actor: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: None,
            session_id: "default".to_string(),
            character_id: None,
            role: Role::Player,
            debounce_ms: sync::DEFAULT_DEBOUNCE.as_millis() as u64,
            poll_interval_ms: store::DEFAULT_POLL_INTERVAL.as_millis() as u64,
            burn_tick_actor: "lune".to_string(),
        }
    }
}

impl Config {
    /// Defaults, then the TOML file (if given), then `COMBATD_*` variables
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(file) = file {
            figment = figment.merge(Toml::file(file));
        }
        let config = figment.merge(Env::prefixed("COMBATD_")).extract()?;
        Ok(config)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

/// Open the configured database and wrap it as a document store
pub async fn open_store(config: &Config) -> Result<Arc<dyn DocumentStore>> {
    let db = Database::new(config.database.as_deref()).await?;
    db.health_check().await?;
    info!(
        "Document store ready ({})",
        config.database.as_deref().unwrap_or("in-memory")
    );
    let store = SqliteStore::new(db.pool().clone()).with_poll_interval(config.poll_interval());
    Ok(Arc::new(store))
}
