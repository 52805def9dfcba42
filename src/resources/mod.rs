//! Combat resource model
//!
//! Pure value rules for per-combatant resources:
//! - Overcharge points, afterimage stacks, elemental stains, fate cards
//! - Turret deployment counters and bonus-action cooldown
//! - Party roster and per-character resource profiles
//! - NPC max HP by level
//!
//! Nothing here performs I/O. Every mutation returns the [`FieldPatch`]
//! it produced so the synchronizer can coalesce it into a remote write.
//!
//! [`FieldPatch`]: crate::store::FieldPatch

mod npc;
mod roster;
mod state;

pub use npc::{LevelChange, NpcKind, MAX_NPC_LEVEL};
pub use roster::{CharacterKind, CharacterRecord, ResourceKind, Stance};
pub use state::{
    fields, CombatantPatch, CombatantState, FateCard, Stain, MAX_AFTERIMAGE_STACKS,
    MAX_ELEMENTAL_STAINS, MAX_OVERCHARGE_POINTS,
};

use thiserror::Error;

/// Resource mutation errors.
///
/// Out-of-bound values are never errors; setters clamp them silently.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResourceError {
    #[error("{resource} is full ({max} max)")]
    CapacityExceeded { resource: &'static str, max: usize },

    #[error("only the game master may {0}")]
    NotPermitted(&'static str),
}
