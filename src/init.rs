//! Database initialization module
//!
//! Provides one-time database setup for the combatd_init tool: the party's
//! character records and an initial battle session.

use std::path::Path;

use anyhow::{anyhow, bail, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::db::Database;
use crate::resources::{CharacterKind, CharacterRecord};
use crate::session::Session;
use crate::store::{DocPath, DocumentStore, SqliteStore};

/// One party member in a seed file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartyMember {
    pub id: String,
    pub max_hp: i32,
    #[serde(default)]
    pub max_charges: u32,
    #[serde(default = "default_level")]
    pub level: u32,
}

fn default_level() -> u32 {
    1
}

/// Contents of a battle seed file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BattleSeed {
    pub session_id: String,
    /// Empty = the whole roster with default stats
    #[serde(default)]
    pub party: Vec<PartyMember>,
    #[serde(default)]
    pub session: Session,
}

impl BattleSeed {
    /// Whole roster, empty session
    pub fn new(session_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            party: Vec::new(),
            session: Session::default(),
        }
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    fn records(&self) -> Result<Vec<(CharacterKind, CharacterRecord)>> {
        if self.party.is_empty() {
            return Ok(CharacterKind::ALL
                .into_iter()
                .map(|kind| (kind, CharacterRecord::new(kind, 40, 3)))
                .collect());
        }

        self.party
            .iter()
            .map(|member| {
                let kind = CharacterKind::from_id(&member.id)
                    .ok_or_else(|| anyhow!("Unknown party member: {}", member.id))?;
                let mut record = CharacterRecord::new(kind, member.max_hp, member.max_charges);
                record.level = member.level.max(1);
                Ok((kind, record))
            })
            .collect()
    }
}

/// Initialize a new combat database
///
/// # Errors
/// * Database file already exists
/// * Seed names an unknown party member
/// * Database creation fails
pub async fn init_database(path: &Path, seed: &BattleSeed) -> Result<()> {
    if path.exists() {
        bail!(
            "Database file already exists: {}. Remove it first or use a different path.",
            path.display()
        );
    }

    let records = seed.records()?;
    let session_path = DocPath::session(&seed.session_id)?;
    let db_path = path
        .to_str()
        .ok_or_else(|| anyhow!("Database path is not valid UTF-8: {}", path.display()))?;

    info!("Creating new database at {}", path.display());
    let db = Database::new(Some(db_path)).await?;
    let store = SqliteStore::new(db.pool().clone());

    for (kind, record) in &records {
        store
            .set_document(&DocPath::character(kind.id())?, record.to_document()?)
            .await?;
        info!("  {} (hp {}, charges {})", kind, record.max_hp, record.max_charges);
    }

    store
        .set_document(&session_path, serde_json::to_value(&seed.session)?)
        .await?;
    info!(
        "Created session {} with {} tokens",
        seed.session_id,
        seed.session.tokens.len()
    );

    info!("Database initialization complete");
    Ok(())
}
