//! NPC kinds and level scaling
//!
//! Max HP comes from a static table indexed by (kind, level). Leveling up
//! heals to the new max; leveling down keeps current HP, clamped to the new
//! max.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::session::Token;
use crate::store::FieldPatch;

/// Highest NPC level in the table
pub const MAX_NPC_LEVEL: u8 = 5;

/// Max HP per level, index 0 = level 1
const HP_BY_LEVEL: [(NpcKind, [i32; MAX_NPC_LEVEL as usize]); 4] = [
    (NpcKind::Farmhand, [18, 26, 34, 44, 56]),
    (NpcKind::Lamplighter, [14, 20, 27, 35, 44]),
    (NpcKind::Curator, [24, 33, 43, 55, 68]),
    (NpcKind::StonewaveKeeper, [40, 52, 66, 82, 100]),
];

/// Allied NPC kinds that can join a battle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NpcKind {
    Farmhand,
    Lamplighter,
    Curator,
    StonewaveKeeper,
}

impl NpcKind {
    pub const ALL: [NpcKind; 4] = [
        NpcKind::Farmhand,
        NpcKind::Lamplighter,
        NpcKind::Curator,
        NpcKind::StonewaveKeeper,
    ];

    /// Key under `npcLevels` in the session document
    pub fn level_key(&self) -> &'static str {
        match self {
            NpcKind::Farmhand => "farmhand",
            NpcKind::Lamplighter => "lamplighter",
            NpcKind::Curator => "curator",
            NpcKind::StonewaveKeeper => "stonewave_keeper",
        }
    }

    /// Max HP at a level; levels outside 1..=MAX clamp to the nearest entry
    pub fn max_hp_at(&self, level: u8) -> i32 {
        let index = usize::from(level.clamp(1, MAX_NPC_LEVEL) - 1);
        HP_BY_LEVEL
            .iter()
            .find(|(kind, _)| kind == self)
            .map_or(1, |(_, table)| table[index])
    }

    /// HP restored at the start of this NPC's turn, if any
    pub fn turn_start_heal(&self) -> Option<u32> {
        match self {
            NpcKind::Curator => Some(5),
            NpcKind::StonewaveKeeper => Some(3),
            NpcKind::Farmhand | NpcKind::Lamplighter => None,
        }
    }

    /// Compute the HP change for moving `token` to `new_level`
    pub fn level_change(&self, token: &Token, current_level: u8, new_level: u8) -> LevelChange {
        let new_level = new_level.clamp(1, MAX_NPC_LEVEL);
        let max_hp = self.max_hp_at(new_level);
        let hp = if new_level > current_level {
            max_hp
        } else {
            token.hp.clamp(0, max_hp)
        };
        LevelChange {
            kind: *self,
            level: new_level,
            max_hp,
            hp,
        }
    }
}

impl FromStr for NpcKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace([' ', '-'], "_");
        Self::ALL
            .into_iter()
            .find(|kind| kind.level_key() == normalized)
            .ok_or(())
    }
}

impl fmt::Display for NpcKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.level_key())
    }
}

/// Result of an NPC level change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelChange {
    pub kind: NpcKind,
    pub level: u8,
    pub max_hp: i32,
    pub hp: i32,
}

impl LevelChange {
    /// Session patch storing the level and the token's new HP together
    pub fn patch(&self, token_id: &str) -> FieldPatch {
        let mut patch = FieldPatch::new();
        patch.set(format!("npcLevels.{}", self.kind.level_key()), json!(self.level));
        patch.set(format!("tokens.{}.maxHp", token_id), json!(self.max_hp));
        patch.set(format!("tokens.{}.hp", token_id), json!(self.hp));
        patch
    }
}
