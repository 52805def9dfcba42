//! Shared session aggregate
//!
//! The session document is the single authoritative aggregate every client
//! observes: battle tokens, the round/turn state and NPC levels. It is never
//! deleted during play; fields are reset instead.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::Index;
use std::str::FromStr;

use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use tracing::debug;

use crate::resources::NpcKind;

/// Lowest and highest initiative roll
pub const INITIATIVE_RANGE: (u8, u8) = (1, 20);

/// Who a token represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Player,
    #[default]
    Enemy,
    Npc,
}

/// Status effects tracked per token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EffectKind {
    /// Burning - takes damage at the start of the burn tick actor's turn
    Fire,
    /// Frozen
    Ice,
    /// Blinded
    Blind,
}

impl EffectKind {
    /// Every effect the round decay pass ticks down
    pub const ALL: [EffectKind; 3] = [EffectKind::Fire, EffectKind::Ice, EffectKind::Blind];
}

impl FromStr for EffectKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fire" | "burn" | "burning" => Ok(EffectKind::Fire),
            "ice" | "frozen" | "freeze" => Ok(EffectKind::Ice),
            "blind" | "blinded" => Ok(EffectKind::Blind),
            _ => Err(()),
        }
    }
}

impl fmt::Display for EffectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EffectKind::Fire => "fire",
            EffectKind::Ice => "ice",
            EffectKind::Blind => "blind",
        };
        write!(f, "{}", s)
    }
}

/// A status effect instance on a token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StatusEffect {
    /// Remaining duration in rounds
    pub turns_remaining: u32,
    /// Damage per tick (fire only)
    pub damage: u32,
}

impl StatusEffect {
    pub fn new(turns_remaining: u32, damage: u32) -> Self {
        Self {
            turns_remaining,
            damage,
        }
    }
}

/// A token's status effects, keyed by effect name.
///
/// The tracked kinds are typed. Anything else (including a tracked name
/// whose body does not parse) is carried as raw JSON, so rewriting the map
/// keeps it intact.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StatusEffects {
    tracked: BTreeMap<EffectKind, StatusEffect>,
    untracked: BTreeMap<String, Value>,
}

impl StatusEffects {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, kind: &EffectKind) -> Option<&StatusEffect> {
        self.tracked.get(kind)
    }

    pub fn get_mut(&mut self, kind: &EffectKind) -> Option<&mut StatusEffect> {
        self.tracked.get_mut(kind)
    }

    pub fn contains_key(&self, kind: &EffectKind) -> bool {
        self.tracked.contains_key(kind)
    }

    pub fn insert(&mut self, kind: EffectKind, effect: StatusEffect) -> Option<StatusEffect> {
        self.tracked.insert(kind, effect)
    }

    pub fn remove(&mut self, kind: &EffectKind) -> Option<StatusEffect> {
        self.tracked.remove(kind)
    }

    /// Whether any decaying effect is present
    pub fn has_tracked(&self) -> bool {
        !self.tracked.is_empty()
    }

    /// Effects this engine does not tick, by name
    pub fn untracked(&self) -> &BTreeMap<String, Value> {
        &self.untracked
    }

    pub fn is_empty(&self) -> bool {
        self.tracked.is_empty() && self.untracked.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tracked.len() + self.untracked.len()
    }
}

impl Index<&EffectKind> for StatusEffects {
    type Output = StatusEffect;

    fn index(&self, kind: &EffectKind) -> &StatusEffect {
        &self.tracked[kind]
    }
}

impl Serialize for StatusEffects {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (kind, effect) in &self.tracked {
            map.serialize_entry(&kind.to_string(), effect)?;
        }
        for (name, body) in &self.untracked {
            map.serialize_entry(name, body)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for StatusEffects {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<BTreeMap<String, Value>>::deserialize(deserializer)?;
        let mut effects = StatusEffects::new();
        for (name, body) in raw.unwrap_or_default() {
            let kind = EffectKind::ALL
                .into_iter()
                .find(|kind| kind.to_string() == name);
            let parsed =
                kind.map(|kind| (kind, serde_json::from_value::<StatusEffect>(body.clone())));
            match parsed {
                Some((kind, Ok(effect))) => {
                    effects.tracked.insert(kind, effect);
                }
                _ => {
                    debug!("Keeping untracked status effect {}", name);
                    effects.untracked.insert(name, body);
                }
            }
        }
        Ok(effects)
    }
}

/// Grid position of a token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

/// A buff sitting on a token
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Buff {
    /// Round the buff was applied in
    pub applied_round: u32,
    /// Token that granted it
    pub source_id: Option<String>,
    /// Expires when its bearer's next turn starts in a later round
    pub expires_on_turn_start: bool,
}

/// A combatant's battlefield representation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Token {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub kind: TokenKind,
    #[serde(default)]
    pub hp: i32,
    #[serde(default = "default_max_hp")]
    pub max_hp: i32,
    #[serde(default = "default_ac")]
    pub ac: i32,
    #[serde(default)]
    pub position: Position,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controlled_by: Option<String>,
    #[serde(default, skip_serializing_if = "StatusEffects::is_empty")]
    pub status_effects: StatusEffects,
    #[serde(
        default,
        deserialize_with = "lenient_npc_type",
        skip_serializing_if = "Option::is_none"
    )]
    pub npc_type: Option<NpcKind>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub buffs: BTreeMap<String, Buff>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protected_by: Option<String>,
}

fn default_max_hp() -> i32 {
    1
}

fn default_ac() -> i32 {
    10
}

/// Unknown NPC types read as none; the display name may still resolve one
fn lenient_npc_type<'de, D>(deserializer: D) -> Result<Option<NpcKind>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw
        .as_ref()
        .and_then(Value::as_str)
        .and_then(|name| name.parse().ok()))
}

impl Token {
    /// Create a token at full health
    pub fn new(id: &str, name: &str, kind: TokenKind, max_hp: i32) -> Self {
        let max_hp = max_hp.max(1);
        Self {
            id: id.to_string(),
            name: name.to_string(),
            kind,
            hp: max_hp,
            max_hp,
            ac: default_ac(),
            position: Position::default(),
            controlled_by: None,
            status_effects: StatusEffects::new(),
            npc_type: None,
            buffs: BTreeMap::new(),
            protected_by: None,
        }
    }

    /// Whether this token is a party member
    pub fn is_player(&self) -> bool {
        self.kind == TokenKind::Player
    }

    /// HP after taking `amount` damage, never below zero
    pub fn hp_after_damage(&self, amount: u32) -> i32 {
        let amount = i32::try_from(amount).unwrap_or(i32::MAX);
        self.hp.saturating_sub(amount).clamp(0, self.max_hp.max(1))
    }

    /// HP after healing `amount`, never above max
    pub fn hp_after_heal(&self, amount: u32) -> i32 {
        let amount = i32::try_from(amount).unwrap_or(i32::MAX);
        self.hp.saturating_add(amount).clamp(0, self.max_hp.max(1))
    }
}

/// One slot in the round's turn order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiativeEntry {
    pub id: String,
    #[serde(default = "default_initiative")]
    pub initiative: u8,
    #[serde(default)]
    pub controlled_by: Option<String>,
    #[serde(default)]
    pub has_acted: bool,
}

fn default_initiative() -> u8 {
    INITIATIVE_RANGE.0
}

impl InitiativeEntry {
    pub fn new(id: &str, initiative: u8) -> Self {
        Self {
            id: id.to_string(),
            initiative: initiative.clamp(INITIATIVE_RANGE.0, INITIATIVE_RANGE.1),
            controlled_by: None,
            has_acted: false,
        }
    }
}

/// Round and turn state of the session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CombatRoundState {
    pub is_active: bool,
    pub round: u32,
    pub current_turn: Option<String>,
    pub initiative_order: Vec<InitiativeEntry>,
}

impl Default for CombatRoundState {
    fn default() -> Self {
        Self {
            is_active: false,
            round: 1,
            current_turn: None,
            initiative_order: Vec::new(),
        }
    }
}

impl CombatRoundState {
    /// Position of an entity in the initiative order
    pub fn initiative_index(&self, id: &str) -> Option<usize> {
        self.initiative_order.iter().position(|entry| entry.id == id)
    }
}

/// The session aggregate root
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Session {
    pub tokens: BTreeMap<String, Token>,
    pub combat_state: CombatRoundState,
    pub npc_levels: BTreeMap<String, u8>,
}

impl Session {
    /// Parse a session from a store snapshot body
    pub fn from_document(data: &Value) -> Result<Self, serde_json::Error> {
        let mut session: Session = serde_json::from_value(data.clone())?;
        // Token ids live in the map keys; bodies may omit them
        for (id, token) in session.tokens.iter_mut() {
            if token.id.is_empty() {
                token.id = id.clone();
            }
        }
        Ok(session)
    }

    /// The token whose turn it currently is
    pub fn active_token(&self) -> Option<&Token> {
        if !self.combat_state.is_active {
            return None;
        }
        self.combat_state
            .current_turn
            .as_deref()
            .and_then(|id| self.tokens.get(id))
    }
}
