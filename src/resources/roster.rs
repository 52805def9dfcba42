//! Party roster and character records
//!
//! The party is a fixed set of four characters. Each is a closed variant
//! with its own resource profile instead of an open-ended record.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::state::CombatantState;
use crate::store::FieldPatch;

/// Resources a character can carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Overcharge,
    ElementalStains,
    FateCards,
    Afterimages,
    Turrets,
    Stance,
}

/// The four party members
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CharacterKind {
    Gustave,
    Lune,
    Maelle,
    Sciel,
}

impl CharacterKind {
    /// The whole party in roster order
    pub const ALL: [CharacterKind; 4] = [
        CharacterKind::Gustave,
        CharacterKind::Lune,
        CharacterKind::Maelle,
        CharacterKind::Sciel,
    ];

    /// Stable id used for documents and tokens
    pub fn id(&self) -> &'static str {
        match self {
            CharacterKind::Gustave => "gustave",
            CharacterKind::Lune => "lune",
            CharacterKind::Maelle => "maelle",
            CharacterKind::Sciel => "sciel",
        }
    }

    pub fn from_id(id: &str) -> Option<CharacterKind> {
        Self::ALL.into_iter().find(|kind| kind.id() == id)
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            CharacterKind::Gustave => "Gustave",
            CharacterKind::Lune => "Lune",
            CharacterKind::Maelle => "Maelle",
            CharacterKind::Sciel => "Sciel",
        }
    }

    /// Resources this character actually uses
    pub fn resources(&self) -> &'static [ResourceKind] {
        match self {
            CharacterKind::Gustave => &[ResourceKind::Overcharge, ResourceKind::Turrets],
            CharacterKind::Lune => &[ResourceKind::ElementalStains],
            CharacterKind::Maelle => &[ResourceKind::Stance, ResourceKind::Afterimages],
            CharacterKind::Sciel => &[ResourceKind::FateCards],
        }
    }

    pub fn uses(&self, resource: ResourceKind) -> bool {
        self.resources().contains(&resource)
    }

    pub fn has_stance(&self) -> bool {
        self.uses(ResourceKind::Stance)
    }
}

impl fmt::Display for CharacterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Combat stance for characters that have one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stance {
    #[default]
    Neutral,
    Offensive,
    Defensive,
    Virtuose,
}

/// A character's resource record (the `characters/<id>` document)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterRecord {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub hp: i32,
    #[serde(default = "default_max")]
    pub max_hp: i32,
    #[serde(default)]
    pub charges: u32,
    #[serde(default)]
    pub max_charges: u32,
    #[serde(default = "default_level")]
    pub level: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stance: Option<Stance>,
    #[serde(default)]
    pub combat_state: CombatantState,
}

fn default_max() -> i32 {
    1
}

fn default_level() -> u32 {
    1
}

impl CharacterRecord {
    /// Fresh record at full health and charges
    pub fn new(kind: CharacterKind, max_hp: i32, max_charges: u32) -> Self {
        let max_hp = max_hp.max(1);
        Self {
            name: kind.display_name().to_string(),
            hp: max_hp,
            max_hp,
            charges: max_charges,
            max_charges,
            level: 1,
            stance: kind.has_stance().then(Stance::default),
            combat_state: CombatantState::default(),
        }
    }

    pub fn from_document(data: &Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(data.clone())
    }

    pub fn to_document(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    /// Patch restoring HP, charges, stance and every combat resource
    pub fn long_rest_patch(&self, kind: CharacterKind) -> FieldPatch {
        let mut combat_state = self.combat_state.clone();
        let mut patch = combat_state.long_rest_reset();

        patch.set("hp", json!(self.max_hp.max(1)));
        patch.set("charges", json!(self.max_charges));
        if kind.has_stance() {
            patch.set("stance", json!(Stance::default()));
        }
        patch
    }
}
