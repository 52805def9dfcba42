//! TestTable - a seeded party and battle session
//!
//! Creates a standard test environment with:
//! - All four party members (40 HP, 3 charges)
//! - Player tokens for the party
//! - A goblin, a burning skeleton and a Farmhand ally on the battlefield
//! - An inactive round state with everyone in the initiative order

#![allow(dead_code)]

use std::sync::Arc;

use anyhow::{anyhow, Result};
use combatd::resources::{CharacterKind, CharacterRecord};
use combatd::session::{EffectKind, InitiativeEntry, Session, StatusEffect, Token, TokenKind};
use combatd::store::{DocPath, DocumentStore, FieldPatch, MemoryStore};
use combatd::{CombatClient, Config, Role};
use serde_json::json;

/// Session id used by every table
pub const SESSION_ID: &str = "table";

/// Seeded in-memory table
pub struct TestTable {
    pub store: MemoryStore,
    pub session_path: DocPath,
}

impl TestTable {
    /// Seed a fresh table
    pub async fn start() -> Result<Self> {
        let store = MemoryStore::new();
        Self::seed(&store).await?;
        Ok(Self {
            store,
            session_path: DocPath::session(SESSION_ID)?,
        })
    }

    /// Seed party records and the battle session into `store`
    pub async fn seed(store: &MemoryStore) -> Result<()> {
        let mut session = Session::default();

        for kind in CharacterKind::ALL {
            let record = CharacterRecord::new(kind, 40, 3);
            store
                .set_document(&DocPath::character(kind.id())?, record.to_document()?)
                .await?;
            let token = Token::new(kind.id(), kind.display_name(), TokenKind::Player, 40);
            session.tokens.insert(kind.id().to_string(), token);
        }

        let goblin = Token::new("goblin", "Goblin", TokenKind::Enemy, 7);
        let mut skeleton = Token::new("skeleton", "Skeleton", TokenKind::Enemy, 12);
        skeleton.hp = 3;
        skeleton
            .status_effects
            .insert(EffectKind::Fire, StatusEffect::new(2, 5));
        let mut farmhand = Token::new("farmhand", "Farmhand", TokenKind::Npc, 26);
        farmhand.hp = 20;
        for token in [goblin, skeleton, farmhand] {
            session.tokens.insert(token.id.clone(), token);
        }

        for (id, initiative) in [
            ("maelle", 19),
            ("goblin", 16),
            ("farmhand", 14),
            ("lune", 12),
            ("skeleton", 9),
            ("gustave", 7),
            ("sciel", 4),
        ] {
            session
                .combat_state
                .initiative_order
                .push(InitiativeEntry::new(id, initiative));
        }
        session.npc_levels.insert("farmhand".to_string(), 2);

        store
            .set_document(&DocPath::session(SESSION_ID)?, serde_json::to_value(&session)?)
            .await?;
        Ok(())
    }

    pub fn config(role: Role, character: Option<&str>) -> Config {
        Config {
            session_id: SESSION_ID.to_string(),
            character_id: character.map(str::to_string),
            role,
            ..Config::default()
        }
    }

    /// Connect a client to this table
    pub async fn client(&self, role: Role, character: Option<&str>) -> Result<Arc<CombatClient>> {
        let store = Arc::new(self.store.clone());
        let client = CombatClient::connect(Self::config(role, character), store).await?;
        Ok(Arc::new(client))
    }

    /// Start combat or move to the given turn, the way the GM's tracker UI does
    pub async fn set_turn(&self, round: u32, turn_id: &str) -> Result<()> {
        let mut patch = FieldPatch::new();
        patch.set("combatState.isActive", json!(true));
        patch.set("combatState.round", json!(round));
        patch.set("combatState.currentTurn", json!(turn_id));
        self.store.update_partial(&self.session_path, &patch).await?;
        Ok(())
    }

    /// Current session contents
    pub fn session(&self) -> Result<Session> {
        let doc = self
            .store
            .document(&self.session_path)
            .ok_or_else(|| anyhow!("session missing"))?;
        Ok(Session::from_document(&doc)?)
    }

    /// Current record of a party member
    pub fn character(&self, id: &str) -> Result<CharacterRecord> {
        let doc = self
            .store
            .document(&DocPath::character(id)?)
            .ok_or_else(|| anyhow!("character {} missing", id))?;
        Ok(CharacterRecord::from_document(&doc)?)
    }
}
