//! Per-combatant resource state
//!
//! Every setter clamps to its declared bound before storing and returns the
//! field patch describing the stored value. Out-of-range input is corrected,
//! never rejected; only adding a stain to a full stain list fails.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};

use super::ResourceError;
use crate::store::FieldPatch;

/// Maximum overcharge points
pub const MAX_OVERCHARGE_POINTS: u8 = 3;

/// Maximum afterimage stacks
pub const MAX_AFTERIMAGE_STACKS: u8 = 5;

/// Maximum length of the elemental stain list
pub const MAX_ELEMENTAL_STAINS: usize = 4;

/// Field paths of the combat resource record
pub mod fields {
    pub const PREFIX: &str = "combatState";
    pub const OVERCHARGE_POINTS: &str = "combatState.overchargePoints";
    pub const ELEMENTAL_STAINS: &str = "combatState.elementalStains";
    pub const CHARGED_FATE_CARD: &str = "combatState.chargedFateCard";
    pub const AFTERIMAGE_STACKS: &str = "combatState.afterimageStacks";
    pub const ACTIVE_TURRET_ID: &str = "combatState.activeTurretId";
    pub const TURRETS_DEPLOYED: &str = "combatState.turretsDeployedThisBattle";
    pub const BONUS_ACTION_COOLDOWN: &str = "combatState.bonusActionCooldown";
    pub const HAS_ACTED_THIS_TURN: &str = "combatState.hasActedThisTurn";
    pub const LAST_COMBAT_ROUND: &str = "combatState.lastCombatRound";
    pub const LAST_COMBAT_TURN: &str = "combatState.lastCombatTurn";
    pub const LAST_UPDATED: &str = "combatState.lastUpdated";
}

/// Elemental stain kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stain {
    Fire,
    Ice,
    Nature,
    Light,
}

/// The single charged fate card slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FateCard {
    Explosive,
    Switch,
    Vanish,
    #[default]
    #[serde(rename = "none")]
    Empty,
}

/// Combat resources of one character
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CombatantState {
    #[serde(deserialize_with = "read_overcharge")]
    overcharge_points: u8,
    #[serde(deserialize_with = "read_stains")]
    elemental_stains: Vec<Stain>,
    #[serde(deserialize_with = "read_fate_card")]
    charged_fate_card: FateCard,
    #[serde(deserialize_with = "read_afterimage")]
    afterimage_stacks: u8,
    active_turret_id: Option<String>,
    #[serde(deserialize_with = "read_counter")]
    turrets_deployed_this_battle: u32,
    #[serde(deserialize_with = "read_counter")]
    bonus_action_cooldown: u32,
    has_acted_this_turn: bool,
    #[serde(deserialize_with = "read_counter")]
    last_combat_round: u32,
    last_combat_turn: Option<String>,
    #[serde(deserialize_with = "read_number")]
    last_updated: i64,
    #[serde(deserialize_with = "read_number")]
    last_synced_at: i64,
}

// Remote records are clamped on the way in, never rejected. Non-numeric
// counters read as 0; unknown stains are skipped.

fn read_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(match raw {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or(0),
        _ => 0,
    })
}

fn read_overcharge<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u8, D::Error> {
    Ok(clamp_count(read_number(deserializer)?, MAX_OVERCHARGE_POINTS))
}

fn read_afterimage<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u8, D::Error> {
    Ok(clamp_count(read_number(deserializer)?, MAX_AFTERIMAGE_STACKS))
}

fn read_counter<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    Ok(clamp_counter(read_number(deserializer)?))
}

fn read_stains<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Stain>, D::Error> {
    let Some(Value::Array(raw)) = Option::<Value>::deserialize(deserializer)? else {
        return Ok(Vec::new());
    };
    let mut stains: Vec<Stain> = raw
        .into_iter()
        .filter_map(|value| serde_json::from_value(value).ok())
        .collect();
    stains.truncate(MAX_ELEMENTAL_STAINS);
    Ok(stains)
}

fn read_fate_card<'de, D: Deserializer<'de>>(deserializer: D) -> Result<FateCard, D::Error> {
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw
        .and_then(|value| serde_json::from_value(value).ok())
        .unwrap_or_default())
}

/// Batched update for [`CombatantState::update_multiple`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CombatantPatch {
    pub overcharge_points: Option<i64>,
    pub elemental_stains: Option<Vec<Stain>>,
    pub charged_fate_card: Option<FateCard>,
    pub afterimage_stacks: Option<i64>,
    /// `Some(None)` clears the active turret
    pub active_turret_id: Option<Option<String>>,
    pub turrets_deployed_this_battle: Option<i64>,
    pub bonus_action_cooldown: Option<i64>,
    pub has_acted_this_turn: Option<bool>,
}

fn clamp_count(value: i64, max: u8) -> u8 {
    value.clamp(0, i64::from(max)) as u8
}

fn clamp_counter(value: i64) -> u32 {
    value.clamp(0, i64::from(u32::MAX)) as u32
}

fn single(path: &str, value: serde_json::Value) -> FieldPatch {
    let mut patch = FieldPatch::new();
    patch.set(path, value);
    patch
}

impl CombatantState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn overcharge_points(&self) -> u8 {
        self.overcharge_points
    }

    pub fn elemental_stains(&self) -> &[Stain] {
        &self.elemental_stains
    }

    pub fn charged_fate_card(&self) -> FateCard {
        self.charged_fate_card
    }

    pub fn afterimage_stacks(&self) -> u8 {
        self.afterimage_stacks
    }

    pub fn active_turret_id(&self) -> Option<&str> {
        self.active_turret_id.as_deref()
    }

    pub fn turrets_deployed_this_battle(&self) -> u32 {
        self.turrets_deployed_this_battle
    }

    pub fn bonus_action_cooldown(&self) -> u32 {
        self.bonus_action_cooldown
    }

    pub fn has_acted_this_turn(&self) -> bool {
        self.has_acted_this_turn
    }

    pub fn last_combat_round(&self) -> u32 {
        self.last_combat_round
    }

    pub fn last_combat_turn(&self) -> Option<&str> {
        self.last_combat_turn.as_deref()
    }

    pub fn last_updated(&self) -> i64 {
        self.last_updated
    }

    pub fn last_synced_at(&self) -> i64 {
        self.last_synced_at
    }

    /// Clamp every field into its bound (used after loading remote data)
    pub fn normalized(mut self) -> Self {
        self.overcharge_points = self.overcharge_points.min(MAX_OVERCHARGE_POINTS);
        self.afterimage_stacks = self.afterimage_stacks.min(MAX_AFTERIMAGE_STACKS);
        self.elemental_stains.truncate(MAX_ELEMENTAL_STAINS);
        self
    }

    pub fn set_overcharge_points(&mut self, value: i64) -> FieldPatch {
        self.overcharge_points = clamp_count(value, MAX_OVERCHARGE_POINTS);
        single(fields::OVERCHARGE_POINTS, json!(self.overcharge_points))
    }

    pub fn set_afterimage_stacks(&mut self, value: i64) -> FieldPatch {
        self.afterimage_stacks = clamp_count(value, MAX_AFTERIMAGE_STACKS);
        single(fields::AFTERIMAGE_STACKS, json!(self.afterimage_stacks))
    }

    /// Append a stain; fails without touching state when the list is full
    pub fn add_elemental_stain(&mut self, stain: Stain) -> Result<FieldPatch, ResourceError> {
        if self.elemental_stains.len() >= MAX_ELEMENTAL_STAINS {
            return Err(ResourceError::CapacityExceeded {
                resource: "elemental stains",
                max: MAX_ELEMENTAL_STAINS,
            });
        }
        self.elemental_stains.push(stain);
        Ok(self.stains_patch())
    }

    /// Remove the stain at `index`; out of range is a no-op with an empty patch
    pub fn remove_elemental_stain_at(&mut self, index: usize) -> FieldPatch {
        if index >= self.elemental_stains.len() {
            return FieldPatch::new();
        }
        self.elemental_stains.remove(index);
        self.stains_patch()
    }

    pub fn clear_elemental_stains(&mut self) -> FieldPatch {
        self.elemental_stains.clear();
        self.stains_patch()
    }

    fn set_elemental_stains(&mut self, mut stains: Vec<Stain>) -> FieldPatch {
        stains.truncate(MAX_ELEMENTAL_STAINS);
        self.elemental_stains = stains;
        self.stains_patch()
    }

    fn stains_patch(&self) -> FieldPatch {
        single(fields::ELEMENTAL_STAINS, json!(self.elemental_stains))
    }

    pub fn set_fate_card(&mut self, card: FateCard) -> FieldPatch {
        self.charged_fate_card = card;
        single(fields::CHARGED_FATE_CARD, json!(self.charged_fate_card))
    }

    /// Take the charged card, leaving the slot empty
    pub fn consume_fate_card(&mut self) -> (FateCard, FieldPatch) {
        let card = self.charged_fate_card;
        (card, self.set_fate_card(FateCard::Empty))
    }

    pub fn increment_turret_count(&mut self) -> FieldPatch {
        self.turrets_deployed_this_battle = self.turrets_deployed_this_battle.saturating_add(1);
        single(fields::TURRETS_DEPLOYED, json!(self.turrets_deployed_this_battle))
    }

    fn set_turret_count(&mut self, value: i64) -> FieldPatch {
        self.turrets_deployed_this_battle = clamp_counter(value);
        single(fields::TURRETS_DEPLOYED, json!(self.turrets_deployed_this_battle))
    }

    fn set_active_turret(&mut self, turret_id: Option<String>) -> FieldPatch {
        self.active_turret_id = turret_id;
        single(fields::ACTIVE_TURRET_ID, json!(self.active_turret_id))
    }

    /// Deploy a new turret, replacing any active one
    pub fn deploy_turret(&mut self) -> (String, FieldPatch) {
        let turret_id = format!("turret-{}", uuid::Uuid::new_v4());
        let mut patch = self.set_active_turret(Some(turret_id.clone()));
        patch.merge(self.increment_turret_count());
        (turret_id, patch)
    }

    pub fn destroy_turret(&mut self) -> FieldPatch {
        self.set_active_turret(None)
    }

    pub fn set_bonus_action_cooldown(&mut self, value: i64) -> FieldPatch {
        self.bonus_action_cooldown = clamp_counter(value);
        single(fields::BONUS_ACTION_COOLDOWN, json!(self.bonus_action_cooldown))
    }

    pub fn set_has_acted_this_turn(&mut self, acted: bool) -> FieldPatch {
        self.has_acted_this_turn = acted;
        single(fields::HAS_ACTED_THIS_TURN, json!(self.has_acted_this_turn))
    }

    /// One afterimage per basic hit, two on a critical
    pub fn on_basic_attack_hit(&mut self, was_critical: bool) -> FieldPatch {
        let gain = if was_critical { 2 } else { 1 };
        self.set_afterimage_stacks(i64::from(self.afterimage_stacks) + gain)
    }

    /// Spend every afterimage stack, returning how many were spent
    pub fn consume_afterimage_stacks(&mut self) -> (u8, FieldPatch) {
        let spent = self.afterimage_stacks;
        (spent, self.set_afterimage_stacks(0))
    }

    /// Apply several updates at once, each clamped like its single setter
    pub fn update_multiple(&mut self, partial: CombatantPatch) -> FieldPatch {
        let mut patch = FieldPatch::new();
        if let Some(v) = partial.overcharge_points {
            patch.merge(self.set_overcharge_points(v));
        }
        if let Some(stains) = partial.elemental_stains {
            patch.merge(self.set_elemental_stains(stains));
        }
        if let Some(card) = partial.charged_fate_card {
            patch.merge(self.set_fate_card(card));
        }
        if let Some(v) = partial.afterimage_stacks {
            patch.merge(self.set_afterimage_stacks(v));
        }
        if let Some(turret_id) = partial.active_turret_id {
            patch.merge(self.set_active_turret(turret_id));
        }
        if let Some(v) = partial.turrets_deployed_this_battle {
            patch.merge(self.set_turret_count(v));
        }
        if let Some(v) = partial.bonus_action_cooldown {
            patch.merge(self.set_bonus_action_cooldown(v));
        }
        if let Some(acted) = partial.has_acted_this_turn {
            patch.merge(self.set_has_acted_this_turn(acted));
        }
        patch
    }

    /// Per-turn reset when this character's turn starts
    pub fn begin_turn(&mut self, round: u32, turn_id: &str) -> FieldPatch {
        let mut patch = self.set_has_acted_this_turn(false);
        patch.merge(self.set_bonus_action_cooldown(i64::from(self.bonus_action_cooldown) - 1));

        self.last_combat_round = round;
        self.last_combat_turn = Some(turn_id.to_string());
        patch.set(fields::LAST_COMBAT_ROUND, json!(round));
        patch.set(fields::LAST_COMBAT_TURN, json!(turn_id));
        patch
    }

    /// Everything back to defaults; sync timestamps survive
    pub fn long_rest_reset(&mut self) -> FieldPatch {
        let mut patch = self.set_overcharge_points(0);
        patch.merge(self.clear_elemental_stains());
        patch.merge(self.set_fate_card(FateCard::Empty));
        patch.merge(self.set_afterimage_stacks(0));
        patch.merge(self.set_active_turret(None));
        patch.merge(self.set_turret_count(0));
        patch.merge(self.set_bonus_action_cooldown(0));
        patch.merge(self.set_has_acted_this_turn(false));
        patch
    }

    /// Battle-scoped fields only: turrets and stains
    pub fn new_battle_reset(&mut self) -> FieldPatch {
        let mut patch = self.set_active_turret(None);
        patch.merge(self.set_turret_count(0));
        patch.merge(self.clear_elemental_stains());
        patch
    }

    /// Bump `lastUpdated`, strictly increasing even if the clock stalls
    pub fn stamp_updated(&mut self, now_ms: i64) -> FieldPatch {
        self.last_updated = now_ms.max(self.last_updated + 1);
        single(fields::LAST_UPDATED, json!(self.last_updated))
    }

    /// Record a confirmed write; local only, never written back
    pub fn mark_synced(&mut self, now_ms: i64) {
        self.last_synced_at = now_ms.max(self.last_synced_at);
    }

    pub(crate) fn restore_synced_at(&mut self, last_synced_at: i64) {
        self.last_synced_at = self.last_synced_at.max(last_synced_at);
    }
}
