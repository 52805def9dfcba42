//! Turn transition tracking
//!
//! Watches `(round, currentTurn)` across session snapshots and reports each
//! transition exactly once. Repeated deliveries of the same snapshot, and
//! stale snapshots that arrive out of order, produce no events.

use std::fmt;

use tracing::{debug, info, warn};

use crate::session::CombatRoundState;

/// Identity of one turn within a battle
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TurnKey {
    pub round: u32,
    pub turn_id: String,
}

impl TurnKey {
    pub fn new(round: u32, turn_id: impl Into<String>) -> Self {
        Self {
            round,
            turn_id: turn_id.into(),
        }
    }
}

impl fmt::Display for TurnKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "round {} / {}", self.round, self.turn_id)
    }
}

/// Transitions reported by the tracker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnEvent {
    CombatStarted,
    /// A new round began; the status effect decay boundary
    RoundStarted { round: u32 },
    /// A different entity's turn began
    TurnStarted(TurnKey),
    CombatEnded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum TrackerState {
    /// No snapshot seen yet
    Unknown,
    Inactive,
    Active(TurnKey),
}

/// Per-client turn transition detector
#[derive(Debug)]
pub struct TurnTracker {
    state: TrackerState,
}

impl Default for TurnTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl TurnTracker {
    pub fn new() -> Self {
        Self {
            state: TrackerState::Unknown,
        }
    }

    /// Last observed turn, if combat is active
    pub fn current(&self) -> Option<&TurnKey> {
        match &self.state {
            TrackerState::Active(key) => Some(key),
            _ => None,
        }
    }

    pub fn is_combat_active(&self) -> bool {
        matches!(self.state, TrackerState::Active(_))
    }

    /// Feed one snapshot's round state; returns the transitions it implies
    pub fn observe(&mut self, combat: &CombatRoundState) -> Vec<TurnEvent> {
        let observed = match (combat.is_active, combat.current_turn.as_deref()) {
            (true, Some(turn_id)) if !turn_id.is_empty() => {
                Some(TurnKey::new(combat.round.max(1), turn_id))
            }
            _ => None,
        };

        let mut events = Vec::new();

        let next = match (&self.state, observed) {
            (TrackerState::Unknown, None) => TrackerState::Inactive,
            (TrackerState::Unknown, Some(key)) => {
                debug!("Joined combat at {}; baseline only", key);
                TrackerState::Active(key)
            }
            (TrackerState::Inactive, None) => return events,
            (TrackerState::Inactive, Some(key)) => {
                info!("Combat started at {}", key);
                events.push(TurnEvent::CombatStarted);
                events.push(TurnEvent::TurnStarted(key.clone()));
                TrackerState::Active(key)
            }
            (TrackerState::Active(_), None) => {
                info!("Combat ended");
                events.push(TurnEvent::CombatEnded);
                TrackerState::Inactive
            }
            (TrackerState::Active(last), Some(key)) => {
                if *last == key {
                    return events;
                }
                if key.round < last.round {
                    warn!("Ignoring stale snapshot at {} (last seen {})", key, last);
                    return events;
                }
                // Both positions come from this snapshot's order, since removed
                // tokens shift the indexes of everyone after them
                if key.round == last.round {
                    let new = combat.initiative_index(&key.turn_id);
                    let old = combat.initiative_index(&last.turn_id);
                    if let (Some(new), Some(old)) = (new, old) {
                        if new < old {
                            warn!("Ignoring stale snapshot at {} (last seen {})", key, last);
                            return events;
                        }
                    }
                }

                if key.round > last.round {
                    info!("Round {} started", key.round);
                    events.push(TurnEvent::RoundStarted { round: key.round });
                }
                if key.turn_id != last.turn_id {
                    debug!("Turn started: {}", key);
                    events.push(TurnEvent::TurnStarted(key.clone()));
                }
                TrackerState::Active(key)
            }
        };

        self.state = next;
        events
    }
}
