//! NPC control resolution and turn-start hooks
//!
//! Decides who acts for the token whose turn it is. Player tokens act for
//! themselves; allied NPCs are driven by a party member, either named
//! explicitly on the token or found in a fixed fallback table.
//!
//! When an NPC's turn begins, its hooks run once:
//! 1. Expire buffs on the NPC that lapse at its turn start
//! 2. Release protection the NPC was granting
//! 3. Apply the NPC kind's start-of-turn heal
//!
//! Hook results go out as a single session write.

use serde_json::json;
use tracing::{debug, info};

use crate::resources::NpcKind;
use crate::session::{Session, Token, TokenKind};
use crate::store::FieldPatch;
use crate::turns::TurnKey;

/// Exact-name fallback when an NPC token has no `controlledBy`
const FALLBACK_CONTROLLERS: [(&str, &str); 4] = [
    ("Farmhand", "sciel"),
    ("Lamplighter", "lune"),
    ("Curator", "maelle"),
    ("Stonewave Keeper", "gustave"),
];

/// Controller of an NPC token: explicit assignment wins over the table
pub fn resolve_controller(token: &Token) -> Option<String> {
    if let Some(controller) = token.controlled_by.as_deref().filter(|c| !c.is_empty()) {
        return Some(controller.to_string());
    }
    FALLBACK_CONTROLLERS
        .iter()
        .find(|(name, _)| *name == token.name)
        .map(|(_, controller)| controller.to_string())
}

/// NPC kind of a token, from `npcType` or its display name
pub fn npc_kind_of(token: &Token) -> Option<NpcKind> {
    token.npc_type.or_else(|| token.name.parse().ok())
}

/// Who is acting right now
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ControlState {
    /// No combat or no current turn
    #[default]
    Idle,
    PlayerActive { token_id: String },
    NpcActive {
        token_id: String,
        controller: Option<String>,
    },
}

/// An NPC turn that needs its hooks run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NpcTurnStart {
    pub key: TurnKey,
    pub token_id: String,
    pub controller: Option<String>,
}

impl NpcTurnStart {
    /// Whether the client for `character_id` (with GM rights or not) runs
    /// this turn's hooks. An uncontrolled NPC falls to the game master.
    pub fn runs_on(&self, character_id: Option<&str>, is_game_master: bool) -> bool {
        match self.controller.as_deref() {
            Some(controller) => character_id == Some(controller),
            None => is_game_master,
        }
    }
}

/// What the turn-start hooks changed
#[derive(Debug, Clone, Default)]
pub struct HookReport {
    pub token_id: String,
    pub acted_reset: bool,
    pub expired_buffs: Vec<String>,
    pub released: Vec<String>,
    pub healed: u32,
    pub patch: FieldPatch,
}

impl HookReport {
    pub fn is_empty(&self) -> bool {
        self.patch.is_empty()
    }
}

/// Tracks the acting entity and guards NPC hooks to one run per turn
#[derive(Debug, Default)]
pub struct NpcControlResolver {
    state: ControlState,
    actor_name: Option<String>,
    last_hooked: Option<TurnKey>,
}

impl NpcControlResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &ControlState {
        &self.state
    }

    /// Display name of the acting token
    pub fn current_actor_name(&self) -> Option<&str> {
        self.actor_name.as_deref()
    }

    /// Whether `character_id` is acting now, directly or through an NPC
    pub fn is_controlled_by(&self, character_id: &str) -> bool {
        match &self.state {
            ControlState::Idle => false,
            ControlState::PlayerActive { token_id } => token_id == character_id,
            ControlState::NpcActive { controller, .. } => {
                controller.as_deref() == Some(character_id)
            }
        }
    }

    /// Refresh the control state from a snapshot
    pub fn observe(&mut self, session: &Session) -> &ControlState {
        let (state, name) = match session.active_token() {
            None => (ControlState::Idle, None),
            Some(token) if token.kind == TokenKind::Npc => (
                ControlState::NpcActive {
                    token_id: token.id.clone(),
                    controller: resolve_controller(token),
                },
                Some(token.name.clone()),
            ),
            Some(token) => (
                ControlState::PlayerActive {
                    token_id: token.id.clone(),
                },
                Some(token.name.clone()),
            ),
        };

        if state != self.state {
            debug!("Control state: {:?}", state);
        }
        // Turn keys restart with the next battle
        if !session.combat_state.is_active && self.last_hooked.take().is_some() {
            debug!("Combat inactive; NPC hook guard cleared");
        }
        self.state = state;
        self.actor_name = name;
        &self.state
    }

    /// Called on a turn start; returns the NPC turn whose hooks are due.
    ///
    /// A given turn is handed out at most once.
    pub fn turn_started(&mut self, session: &Session, key: &TurnKey) -> Option<NpcTurnStart> {
        self.observe(session);

        let ControlState::NpcActive {
            token_id,
            controller,
        } = &self.state
        else {
            return None;
        };
        if *token_id != key.turn_id || self.last_hooked.as_ref() == Some(key) {
            return None;
        }

        self.last_hooked = Some(key.clone());
        Some(NpcTurnStart {
            key: key.clone(),
            token_id: token_id.clone(),
            controller: controller.clone(),
        })
    }
}

/// Run the ordered turn-start hooks for an NPC against `session`.
///
/// The working session is updated in place so later passes see the result.
pub fn run_turn_start_hooks(session: &mut Session, start: &NpcTurnStart) -> HookReport {
    let mut report = HookReport {
        token_id: start.token_id.clone(),
        ..Default::default()
    };
    let npc_id = start.token_id.as_str();
    let round = start.key.round;

    if !session.tokens.contains_key(npc_id) {
        return report;
    }

    // Acted flag in the initiative order
    if let Some(entry) = session
        .combat_state
        .initiative_order
        .iter_mut()
        .find(|entry| entry.id == npc_id && entry.has_acted)
    {
        entry.has_acted = false;
        report.acted_reset = true;
        report.patch.set(
            "combatState.initiativeOrder",
            json!(session.combat_state.initiative_order),
        );
    }

    // (a) buffs that lapse at this turn start; same-round buffs stay
    if let Some(npc) = session.tokens.get_mut(npc_id) {
        let before = npc.buffs.len();
        npc.buffs.retain(|key, buff| {
            let expire = buff.expires_on_turn_start && buff.applied_round < round;
            if expire {
                report.expired_buffs.push(key.clone());
            }
            !expire
        });
        if npc.buffs.len() != before {
            let path = format!("tokens.{}.buffs", npc_id);
            if npc.buffs.is_empty() {
                report.patch.delete(path);
            } else {
                report.patch.set(path, json!(npc.buffs));
            }
        }
    }

    // (b) protection this NPC was granting
    for (id, token) in session.tokens.iter_mut() {
        if token.protected_by.as_deref() == Some(npc_id) {
            token.protected_by = None;
            report.released.push(id.clone());
            report.patch.delete(format!("tokens.{}.protectedBy", id));
        }
    }

    // (c) start-of-turn heal
    if let Some(npc) = session.tokens.get_mut(npc_id) {
        let heal = npc_kind_of(npc).and_then(|kind| kind.turn_start_heal());
        if let Some(amount) = heal {
            let hp = npc.hp_after_heal(amount);
            if hp > npc.hp {
                report.healed = (hp - npc.hp) as u32;
                npc.hp = hp;
                report.patch.set(format!("tokens.{}.hp", npc_id), json!(hp));
            }
        }
    }

    if !report.is_empty() {
        info!(
            "NPC {} turn start ({}): {} buffs expired, {} released, healed {}",
            npc_id,
            start.key,
            report.expired_buffs.len(),
            report.released.len(),
            report.healed
        );
    }
    report
}
