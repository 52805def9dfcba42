//! Status effect decay
//!
//! Two passes over the session's tokens:
//! - Burn damage at the start of the burn tick actor's turn
//! - Duration decay at each round boundary
//!
//! Each pass edits a working copy of the session and collects everything it
//! changed into one patch, so a pass costs at most one session write.

use serde_json::json;
use tracing::{debug, info};

use crate::session::{EffectKind, Session};
use crate::store::{DocPath, DocumentStore, FieldPatch, StoreError};

const INITIATIVE_ORDER: &str = "combatState.initiativeOrder";

/// What a pass changed
#[derive(Debug, Clone, Default)]
pub struct DecayOutcome {
    /// (token id, damage taken)
    pub damaged: Vec<(String, u32)>,
    /// Non-player tokens removed at 0 HP
    pub removed: Vec<String>,
    /// (token id, effect) pairs that ran out
    pub expired: Vec<(String, EffectKind)>,
    pub patch: FieldPatch,
}

impl DecayOutcome {
    pub fn is_empty(&self) -> bool {
        self.patch.is_empty()
    }

    /// Write the pass result as one session update; no-op when nothing changed
    pub async fn apply(
        &self,
        store: &dyn DocumentStore,
        session: &DocPath,
    ) -> Result<bool, StoreError> {
        if self.patch.is_empty() {
            return Ok(false);
        }
        store.update_partial(session, &self.patch).await?;
        Ok(true)
    }
}

/// Apply burn damage to every token with an active fire effect.
///
/// HP floors at 0. Non-player tokens that reach 0 leave the session and the
/// initiative order.
pub fn burn_damage_pass(session: &mut Session) -> DecayOutcome {
    let mut outcome = DecayOutcome::default();

    let burning: Vec<(String, u32)> = session
        .tokens
        .iter()
        .filter_map(|(id, token)| {
            token
                .status_effects
                .get(&EffectKind::Fire)
                .filter(|fire| fire.turns_remaining > 0 && fire.damage > 0)
                .map(|fire| (id.clone(), fire.damage))
        })
        .collect();

    for (id, damage) in burning {
        let Some(token) = session.tokens.get_mut(&id) else {
            continue;
        };
        let hp = token.hp_after_damage(damage);
        debug!("{} burns for {} ({} -> {})", id, damage, token.hp, hp);
        token.hp = hp;
        outcome.damaged.push((id.clone(), damage));

        if hp == 0 && !token.is_player() {
            session.tokens.remove(&id);
            outcome.patch.delete(format!("tokens.{}", id));
            outcome.removed.push(id);
        } else {
            outcome.patch.set(format!("tokens.{}.hp", id), json!(hp));
        }
    }

    if !outcome.removed.is_empty() {
        let order = &mut session.combat_state.initiative_order;
        let before = order.len();
        order.retain(|entry| !outcome.removed.contains(&entry.id));
        if order.len() != before {
            outcome.patch.set(INITIATIVE_ORDER, json!(order));
        }
        info!("Burn removed {:?}", outcome.removed);
    }

    outcome
}

/// Tick every tracked effect down one turn, dropping those that run out.
///
/// Untracked effects are written back untouched. A token left with no
/// effects at all loses its `statusEffects` field.
pub fn duration_decay_pass(session: &mut Session) -> DecayOutcome {
    let mut outcome = DecayOutcome::default();

    for (id, token) in session.tokens.iter_mut() {
        if !token.status_effects.has_tracked() {
            continue;
        }

        for kind in EffectKind::ALL {
            if let Some(effect) = token.status_effects.get_mut(&kind) {
                effect.turns_remaining = effect.turns_remaining.saturating_sub(1);
                if effect.turns_remaining == 0 {
                    token.status_effects.remove(&kind);
                    outcome.expired.push((id.clone(), kind));
                }
            }
        }

        let path = format!("tokens.{}.statusEffects", id);
        if token.status_effects.is_empty() {
            outcome.patch.delete(path);
        } else {
            outcome.patch.set(path, json!(token.status_effects));
        }
    }

    if !outcome.expired.is_empty() {
        debug!("Effects expired: {:?}", outcome.expired);
    }
    outcome
}
