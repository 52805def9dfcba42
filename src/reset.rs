//! Long rest and new battle resets
//!
//! Resets touch every party member's record and then the session. Writes are
//! independent per document: one failing character does not stop the rest,
//! and the report says who succeeded. Every step is idempotent, so a partial
//! reset is fixed by running it again.

use std::sync::Arc;

use serde_json::json;
use tracing::{info, warn};

use crate::resources::{CharacterKind, CharacterRecord};
use crate::session::{CombatRoundState, Session};
use crate::store::{DocPath, DocumentStore, FieldPatch, SnapshotEvent, StoreError};

/// Per-character outcome of a bulk reset
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResetReport {
    pub succeeded: Vec<String>,
    /// (character id, error message)
    pub failed: Vec<(String, String)>,
    /// Characters whose battle token HP was mirrored
    pub mirrored: Vec<String>,
    /// Whether the session round state was reset
    pub session_reset: bool,
}

impl ResetReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Runs bulk resets against the store
pub struct ResetOrchestrator {
    store: Arc<dyn DocumentStore>,
    session: DocPath,
}

impl ResetOrchestrator {
    pub fn new(store: Arc<dyn DocumentStore>, session: DocPath) -> Self {
        Self { store, session }
    }

    async fn load_record(&self, character_id: &str) -> Result<CharacterRecord, StoreError> {
        let path = DocPath::character(character_id)?;
        match self.store.get_once(&path).await? {
            SnapshotEvent::Snapshot(snapshot) => {
                Ok(CharacterRecord::from_document(&snapshot.data)?)
            }
            SnapshotEvent::NotFound(path) => Err(StoreError::NotFound(path)),
        }
    }

    async fn load_session(&self) -> Result<Session, StoreError> {
        match self.store.get_once(&self.session).await? {
            SnapshotEvent::Snapshot(snapshot) => Ok(Session::from_document(&snapshot.data)?),
            SnapshotEvent::NotFound(path) => Err(StoreError::NotFound(path)),
        }
    }

    /// Restore every party member to full and mirror HP onto battle tokens
    pub async fn long_rest(&self) -> ResetReport {
        let mut report = ResetReport::default();

        for kind in CharacterKind::ALL {
            let id = kind.id();
            match self.long_rest_one(kind).await {
                Ok(()) => report.succeeded.push(id.to_string()),
                Err(e) => {
                    warn!("Long rest failed for {}: {}", id, e);
                    report.failed.push((id.to_string(), e.to_string()));
                    continue;
                }
            }

            match self.reconcile_token_mirror(id).await {
                Ok(true) => report.mirrored.push(id.to_string()),
                Ok(false) => {}
                Err(e) => {
                    warn!("Token mirror failed for {}: {}", id, e);
                    report.failed.push((id.to_string(), e.to_string()));
                }
            }
        }

        info!(
            "Long rest: {} restored, {} failed",
            report.succeeded.len(),
            report.failed.len()
        );
        report
    }

    async fn long_rest_one(&self, kind: CharacterKind) -> Result<(), StoreError> {
        let record = self.load_record(kind.id()).await?;
        let patch = record.long_rest_patch(kind);
        self.store
            .update_partial(&DocPath::character(kind.id())?, &patch)
            .await
    }

    /// Copy a character's HP from its record onto its battle token.
    ///
    /// The record is the source of truth. Returns false when the character
    /// has no token in the session.
    pub async fn reconcile_token_mirror(&self, character_id: &str) -> Result<bool, StoreError> {
        let record = self.load_record(character_id).await?;
        let session = self.load_session().await?;

        let Some(token) = session.tokens.get(character_id) else {
            return Ok(false);
        };
        let max_hp = record.max_hp.max(1);
        let hp = record.hp.clamp(0, max_hp);
        if token.hp == hp && token.max_hp == max_hp {
            return Ok(true);
        }

        let mut patch = FieldPatch::new();
        patch.set(format!("tokens.{}.hp", character_id), json!(hp));
        patch.set(format!("tokens.{}.maxHp", character_id), json!(max_hp));
        self.store.update_partial(&self.session, &patch).await?;
        Ok(true)
    }

    /// Clear battle-scoped resources and the session's round state
    pub async fn new_battle(&self) -> ResetReport {
        let mut report = ResetReport::default();

        for kind in CharacterKind::ALL {
            let id = kind.id();
            match self.new_battle_one(kind).await {
                Ok(()) => report.succeeded.push(id.to_string()),
                Err(e) => {
                    warn!("New battle reset failed for {}: {}", id, e);
                    report.failed.push((id.to_string(), e.to_string()));
                }
            }
        }

        match self
            .store
            .update_partial(&self.session, &round_reset_patch())
            .await
        {
            Ok(()) => report.session_reset = true,
            Err(e) => warn!("Failed to reset round state of {}: {}", self.session, e),
        }

        info!(
            "New battle: {} reset, {} failed, session reset: {}",
            report.succeeded.len(),
            report.failed.len(),
            report.session_reset
        );
        report
    }

    async fn new_battle_one(&self, kind: CharacterKind) -> Result<(), StoreError> {
        let record = self.load_record(kind.id()).await?;
        let mut combat_state = record.combat_state;
        let patch = combat_state.new_battle_reset();
        self.store
            .update_partial(&DocPath::character(kind.id())?, &patch)
            .await
    }
}

fn round_reset_patch() -> FieldPatch {
    let defaults = CombatRoundState::default();
    let mut patch = FieldPatch::new();
    patch.set("combatState.isActive", json!(defaults.is_active));
    patch.set("combatState.round", json!(defaults.round));
    patch.delete("combatState.currentTurn");
    patch.set("combatState.initiativeOrder", json!(defaults.initiative_order));
    patch
}
