//! Combat client driver
//!
//! One client per process. It owns exactly one session subscription and feeds
//! every snapshot through the turn tracker and control resolver, then runs the
//! boundary work this client is responsible for:
//! - Its own character's per-turn reset (through the synchronizer)
//! - NPC turn-start hooks when it controls the acting NPC
//! - Decay and burn passes when it is the game master

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::control::{
    npc_kind_of, run_turn_start_hooks, ControlState, NpcControlResolver,
};
use crate::decay::{burn_damage_pass, duration_decay_pass};
use crate::reset::{ResetOrchestrator, ResetReport};
use crate::resources::{LevelChange, NpcKind, ResourceError};
use crate::session::{Session, TokenKind};
use crate::store::{DocPath, DocumentStore, FieldPatch, SnapshotEvent};
use crate::sync::StateSynchronizer;
use crate::turns::{TurnEvent, TurnKey, TurnTracker};
use crate::Config;

/// Work a snapshot caused on this client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineAction {
    CombatStarted,
    CombatEnded,
    /// This client's character started its turn
    TurnBegan { character_id: String, key: TurnKey },
    /// Status effects ticked down at a round boundary
    EffectsDecayed { expired: usize, written: bool },
    /// Burn damage applied
    BurnApplied {
        damaged: usize,
        removed: Vec<String>,
        written: bool,
    },
    /// NPC turn-start hooks ran here
    NpcHooksRan {
        token_id: String,
        key: TurnKey,
        written: bool,
    },
}

/// Per-process combat client
pub struct CombatClient {
    config: Config,
    store: Arc<dyn DocumentStore>,
    session_path: DocPath,
    sync: Option<StateSynchronizer>,
    tracker: Mutex<TurnTracker>,
    resolver: Mutex<NpcControlResolver>,
    last_error: Mutex<Option<String>>,
    subscribed: AtomicBool,
    shutdown_tx: watch::Sender<bool>,
}

impl CombatClient {
    /// Build a client; connects the character synchronizer when the config
    /// names a character
    pub async fn connect(config: Config, store: Arc<dyn DocumentStore>) -> Result<Self> {
        let session_path = DocPath::session(&config.session_id)?;

        let sync = match config.character_id.as_deref() {
            Some(character_id) => Some(
                StateSynchronizer::connect(store.clone(), character_id, config.debounce()).await?,
            ),
            None => None,
        };

        let (shutdown_tx, _) = watch::channel(false);

        info!(
            "Combat client for session {} ({:?}, character {})",
            config.session_id,
            config.role,
            config.character_id.as_deref().unwrap_or("none")
        );

        Ok(Self {
            config,
            store,
            session_path,
            sync,
            tracker: Mutex::new(TurnTracker::new()),
            resolver: Mutex::new(NpcControlResolver::new()),
            last_error: Mutex::new(None),
            subscribed: AtomicBool::new(false),
            shutdown_tx,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn session_path(&self) -> &DocPath {
        &self.session_path
    }

    /// The character synchronizer, if this client plays a character
    pub fn sync(&self) -> Option<&StateSynchronizer> {
        self.sync.as_ref()
    }

    pub fn control_state(&self) -> ControlState {
        self.resolver.lock().state().clone()
    }

    pub fn current_actor_name(&self) -> Option<String> {
        self.resolver.lock().current_actor_name().map(str::to_string)
    }

    /// Whether this client's character is acting, directly or via an NPC
    pub fn is_my_turn(&self) -> bool {
        match self.config.character_id.as_deref() {
            Some(id) => self.resolver.lock().is_controlled_by(id),
            None => false,
        }
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().clone()
    }

    fn record_error(&self, message: String) {
        warn!("{}", message);
        *self.last_error.lock() = Some(message);
    }

    /// Write a session patch; failures are recorded, never fatal
    async fn write_session(&self, patch: &FieldPatch, what: &str) -> bool {
        if patch.is_empty() {
            return false;
        }
        match self.store.update_partial(&self.session_path, patch).await {
            Ok(()) => true,
            Err(e) => {
                self.record_error(format!("Failed to write {}: {}", what, e));
                false
            }
        }
    }

    /// Process one session snapshot
    pub async fn handle_snapshot(&self, data: &Value) -> Result<Vec<EngineAction>> {
        let session = Session::from_document(data)?;
        let events = {
            let mut tracker = self.tracker.lock();
            tracker.observe(&session.combat_state)
        };
        self.resolver.lock().observe(&session);

        let is_gm = self.config.role.is_game_master();
        let character_id = self.config.character_id.as_deref();
        let mut working = session;
        let mut actions = Vec::new();

        for event in events {
            match event {
                TurnEvent::CombatStarted => actions.push(EngineAction::CombatStarted),
                TurnEvent::CombatEnded => actions.push(EngineAction::CombatEnded),
                TurnEvent::RoundStarted { round } => {
                    if !is_gm {
                        continue;
                    }
                    let outcome = duration_decay_pass(&mut working);
                    let written = self
                        .write_session(&outcome.patch, &format!("round {} decay", round))
                        .await;
                    actions.push(EngineAction::EffectsDecayed {
                        expired: outcome.expired.len(),
                        written,
                    });
                }
                TurnEvent::TurnStarted(key) => {
                    if character_id == Some(key.turn_id.as_str()) {
                        if let Some(sync) = &self.sync {
                            sync.begin_turn(key.round, &key.turn_id);
                            actions.push(EngineAction::TurnBegan {
                                character_id: key.turn_id.clone(),
                                key: key.clone(),
                            });
                        }
                    }

                    if is_gm && key.turn_id == self.config.burn_tick_actor {
                        let outcome = burn_damage_pass(&mut working);
                        if !outcome.damaged.is_empty() {
                            let written = self.write_session(&outcome.patch, "burn damage").await;
                            actions.push(EngineAction::BurnApplied {
                                damaged: outcome.damaged.len(),
                                removed: outcome.removed,
                                written,
                            });
                        }
                    }

                    let start = self.resolver.lock().turn_started(&working, &key);
                    if let Some(start) = start {
                        if !start.runs_on(character_id, is_gm) {
                            debug!(
                                "NPC {} hooks belong to {:?}",
                                start.token_id, start.controller
                            );
                            continue;
                        }
                        let report = run_turn_start_hooks(&mut working, &start);
                        let written = self.write_session(&report.patch, "NPC turn start").await;
                        actions.push(EngineAction::NpcHooksRan {
                            token_id: start.token_id,
                            key,
                            written,
                        });
                    }
                }
            }
        }

        Ok(actions)
    }

    /// Follow the session until shutdown or the stream closes
    pub async fn run(&self) -> Result<()> {
        if self.subscribed.swap(true, Ordering::SeqCst) {
            bail!("client is already subscribed to {}", self.session_path);
        }

        let result = self.follow().await;

        if let Some(sync) = &self.sync {
            if let Err(e) = sync.close().await {
                self.record_error(format!("Failed to flush combat state: {}", e));
            }
        }
        self.subscribed.store(false, Ordering::SeqCst);
        info!("Combat client for session {} stopped", self.config.session_id);
        result
    }

    async fn follow(&self) -> Result<()> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        if *shutdown_rx.borrow() {
            return Ok(());
        }

        let mut subscription = self.store.subscribe(&self.session_path).await?;
        info!("Following session {}", self.session_path);

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => break,
                event = subscription.next() => match event {
                    Some(SnapshotEvent::Snapshot(snapshot)) => {
                        debug!("Session snapshot v{}", snapshot.version);
                        match self.handle_snapshot(&snapshot.data).await {
                            Ok(actions) if !actions.is_empty() => debug!("Actions: {:?}", actions),
                            Ok(_) => {}
                            Err(e) => self.record_error(format!("Bad session snapshot: {}", e)),
                        }
                    }
                    Some(SnapshotEvent::NotFound(path)) => {
                        self.record_error(format!("session not found: {}", path));
                    }
                    None => break,
                },
            }
        }

        subscription.unsubscribe();
        Ok(())
    }

    /// Signal `run` to stop
    pub fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
    }

    /// Read the session once
    pub async fn session_snapshot(&self) -> Result<Session> {
        match self.store.get_once(&self.session_path).await? {
            SnapshotEvent::Snapshot(snapshot) => Ok(Session::from_document(&snapshot.data)?),
            SnapshotEvent::NotFound(path) => Err(anyhow!("session not found: {}", path)),
        }
    }

    /// Change an NPC's level (game master only); HP follows the level table
    pub async fn set_npc_level(&self, kind: NpcKind, level: u8) -> Result<LevelChange> {
        if !self.config.role.is_game_master() {
            return Err(ResourceError::NotPermitted("change NPC levels").into());
        }

        let session = self.session_snapshot().await?;
        let token = session
            .tokens
            .values()
            .find(|token| token.kind == TokenKind::Npc && npc_kind_of(token) == Some(kind))
            .ok_or_else(|| anyhow!("no {} token in session {}", kind, self.config.session_id))?;

        let current = session
            .npc_levels
            .get(kind.level_key())
            .copied()
            .unwrap_or(1);
        let change = kind.level_change(token, current, level);
        self.store
            .update_partial(&self.session_path, &change.patch(&token.id))
            .await?;

        info!(
            "{} level {} -> {} (hp {}/{})",
            kind, current, change.level, change.hp, change.max_hp
        );
        Ok(change)
    }

    pub fn orchestrator(&self) -> ResetOrchestrator {
        ResetOrchestrator::new(self.store.clone(), self.session_path.clone())
    }

    pub async fn long_rest(&self) -> Result<ResetReport> {
        self.flush_own().await;
        Ok(self.orchestrator().long_rest().await)
    }

    pub async fn new_battle(&self) -> Result<ResetReport> {
        self.flush_own().await;
        Ok(self.orchestrator().new_battle().await)
    }

    /// Push this client's pending changes before a bulk reset overwrites them
    async fn flush_own(&self) {
        if let Some(sync) = &self.sync {
            if let Err(e) = sync.flush_now().await {
                self.record_error(format!("Failed to flush combat state: {}", e));
            }
        }
    }
}
