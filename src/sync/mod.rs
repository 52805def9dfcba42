//! Combat state synchronizer
//!
//! Keeps this client's copy of one character's combat resources and pushes
//! changes to the shared store:
//! - Optimistic: every mutation applies locally at once
//! - Coalesced: mutations merge into one pending patch, flushed by a
//!   trailing-edge debounce timer
//! - Echo-suppressed: snapshots arriving while a write is in flight are
//!   ignored so the client never flickers back to pre-write values
//! - Offline-first: failed writes are reported, never rolled back

mod scheduler;

pub use scheduler::{DebounceScheduler, DEFAULT_DEBOUNCE};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::resources::{
    fields, CombatantPatch, CombatantState, FateCard, ResourceError, Stain,
};
use crate::store::{
    deep_merge, DocPath, DocumentStore, FieldPatch, SnapshotEvent, StoreError, Subscription,
};

/// Synchronizer errors
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("character record not found: {0}")]
    NotFound(DocPath),

    #[error(transparent)]
    Resource(#[from] ResourceError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Whether the synchronizer is writing to the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    /// Record exists; mutations are written
    Live,
    /// Record missing; mutations stay local until it appears
    Disabled,
}

struct SyncState {
    local: CombatantState,
    pending: FieldPatch,
    in_flight: bool,
    flush_after_flight: bool,
    status: SyncStatus,
    suppressed: u64,
}

struct SyncInner {
    character_id: String,
    path: DocPath,
    store: Arc<dyn DocumentStore>,
    state: Mutex<SyncState>,
    scheduler: DebounceScheduler,
    errors: watch::Sender<Option<String>>,
    writes: AtomicU64,
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Build local state from a remote record.
///
/// Remote `combatState` is deep-merged over the declared defaults (missing or
/// null fields fall back to defaults), then unflushed local fields are laid on
/// top so optimistic changes survive, then everything is clamped.
fn merge_remote(data: &Value, pending: &FieldPatch) -> Result<CombatantState, serde_json::Error> {
    let mut doc = Value::Object(Map::new());
    doc[fields::PREFIX] = serde_json::to_value(CombatantState::default())?;

    if let Some(remote) = data.get(fields::PREFIX).filter(|remote| remote.is_object()) {
        deep_merge(&mut doc[fields::PREFIX], remote);
    }
    pending.apply_to(&mut doc);

    let state: CombatantState = serde_json::from_value(doc[fields::PREFIX].take())?;
    Ok(state.normalized())
}

impl SyncInner {
    fn publish_error(&self, message: Option<String>) {
        self.errors.send_replace(message);
    }

    fn apply_remote(self: &Arc<Self>, event: SnapshotEvent) {
        let revived = {
            let mut state = self.state.lock();
            match event {
                SnapshotEvent::NotFound(path) => {
                    if state.status == SyncStatus::Live {
                        warn!("Character record {} disappeared; holding changes locally", path);
                    }
                    state.status = SyncStatus::Disabled;
                    drop(state);
                    self.publish_error(Some(format!("character record not found: {}", path)));
                    return;
                }
                SnapshotEvent::Snapshot(snapshot) => {
                    if state.in_flight {
                        state.suppressed += 1;
                        debug!(
                            "Suppressed snapshot v{} of {} during in-flight write",
                            snapshot.version, self.path
                        );
                        return;
                    }

                    match merge_remote(&snapshot.data, &state.pending) {
                        Ok(mut merged) => {
                            merged.restore_synced_at(state.local.last_synced_at());
                            state.local = merged;
                        }
                        Err(e) => {
                            warn!("Ignoring malformed snapshot of {}: {}", self.path, e);
                            return;
                        }
                    }

                    let revived = state.status == SyncStatus::Disabled;
                    state.status = SyncStatus::Live;
                    revived.then(|| !state.pending.is_empty())
                }
            }
        };

        if let Some(has_pending) = revived {
            info!("Character record {} is available again", self.path);
            self.publish_error(None);
            if has_pending {
                self.schedule_flush();
            }
        }
    }

    fn schedule_flush(self: &Arc<Self>) {
        let inner = Arc::clone(self);
        self.scheduler.reschedule(async move {
            let _ = inner.flush().await;
        });
    }

    /// Send the pending patch as one write. Returns whether a write happened.
    async fn flush(self: &Arc<Self>) -> Result<bool, StoreError> {
        let patch = {
            let mut state = self.state.lock();
            if state.status != SyncStatus::Live || state.pending.is_empty() {
                return Ok(false);
            }
            if state.in_flight {
                // One write at a time; go again once this one lands
                state.flush_after_flight = true;
                return Ok(false);
            }
            state.in_flight = true;
            std::mem::take(&mut state.pending)
        };

        debug!("Flushing {} fields to {}", patch.len(), self.path);
        let result = self.store.update_partial(&self.path, &patch).await;

        let reflush = {
            let mut state = self.state.lock();
            state.in_flight = false;
            match &result {
                Ok(()) => state.local.mark_synced(now_ms()),
                Err(_) => {
                    // Keep the failed fields queued under anything newer
                    let newer = std::mem::take(&mut state.pending);
                    state.pending = patch;
                    state.pending.merge(newer);
                }
            }
            std::mem::take(&mut state.flush_after_flight) && !state.pending.is_empty()
        };

        match &result {
            Ok(()) => {
                self.writes.fetch_add(1, Ordering::Relaxed);
                self.publish_error(None);
            }
            Err(e) => {
                warn!("Failed to save combat state for {}: {}", self.character_id, e);
                self.publish_error(Some(format!("Failed to save combat state: {}", e)));
            }
        }

        if reflush {
            self.schedule_flush();
        }

        result.map(|()| true)
    }
}

/// Optimistic, debounced synchronizer for one character's combat resources
pub struct StateSynchronizer {
    inner: Arc<SyncInner>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl StateSynchronizer {
    /// Load the character record and start following it.
    ///
    /// A missing record is not fatal: the synchronizer comes up `Disabled`
    /// with the error published, and goes live when the record appears.
    pub async fn connect(
        store: Arc<dyn DocumentStore>,
        character_id: &str,
        debounce: Duration,
    ) -> Result<Self, SyncError> {
        let path = DocPath::character(character_id).map_err(StoreError::from)?;
        let (errors, _) = watch::channel(None);

        let (local, status) = match store.get_once(&path).await? {
            SnapshotEvent::Snapshot(snapshot) => {
                match merge_remote(&snapshot.data, &FieldPatch::new()) {
                    Ok(local) => (local, SyncStatus::Live),
                    Err(e) => {
                        warn!("Unreadable combat state in {}; starting from defaults: {}", path, e);
                        errors.send_replace(Some(StoreError::from(e).to_string()));
                        (CombatantState::default(), SyncStatus::Live)
                    }
                }
            }
            SnapshotEvent::NotFound(path) => {
                warn!("Character record {} not found; synchronizer disabled", path);
                errors.send_replace(Some(SyncError::NotFound(path).to_string()));
                (CombatantState::default(), SyncStatus::Disabled)
            }
        };

        let inner = Arc::new(SyncInner {
            character_id: character_id.to_string(),
            path: path.clone(),
            store: store.clone(),
            state: Mutex::new(SyncState {
                local,
                pending: FieldPatch::new(),
                in_flight: false,
                flush_after_flight: false,
                status,
                suppressed: 0,
            }),
            scheduler: DebounceScheduler::new(debounce),
            errors,
            writes: AtomicU64::new(0),
        });

        let subscription = store.subscribe(&path).await?;
        let listener = tokio::spawn(Self::listen(inner.clone(), subscription));

        info!("Synchronizer for {} connected ({:?})", character_id, status);
        Ok(Self {
            inner,
            listener: Mutex::new(Some(listener)),
        })
    }

    async fn listen(inner: Arc<SyncInner>, mut subscription: Subscription) {
        while let Some(event) = subscription.next().await {
            inner.apply_remote(event);
        }
        debug!("Snapshot stream for {} closed", inner.path);
    }

    /// Apply a local mutation and queue its patch
    fn mutate<T>(&self, f: impl FnOnce(&mut CombatantState) -> (T, FieldPatch)) -> T {
        let (result, live) = {
            let mut state = self.inner.state.lock();
            let (result, patch) = f(&mut state.local);
            if patch.is_empty() {
                return result;
            }
            let stamp = state.local.stamp_updated(now_ms());
            state.pending.merge(patch);
            state.pending.merge(stamp);
            (result, state.status == SyncStatus::Live)
        };

        if live {
            self.inner.schedule_flush();
        } else {
            debug!(
                "Holding change for {} locally until its record exists",
                self.inner.character_id
            );
        }
        result
    }

    pub fn set_overcharge_points(&self, value: i64) -> u8 {
        self.mutate(|s| {
            let patch = s.set_overcharge_points(value);
            (s.overcharge_points(), patch)
        })
    }

    pub fn set_afterimage_stacks(&self, value: i64) -> u8 {
        self.mutate(|s| {
            let patch = s.set_afterimage_stacks(value);
            (s.afterimage_stacks(), patch)
        })
    }

    /// Add a stain; a full list is reported and nothing is queued
    pub fn add_elemental_stain(&self, stain: Stain) -> Result<(), SyncError> {
        self.mutate(|s| match s.add_elemental_stain(stain) {
            Ok(patch) => (Ok(()), patch),
            Err(e) => (Err(e.into()), FieldPatch::new()),
        })
    }

    pub fn remove_elemental_stain_at(&self, index: usize) {
        self.mutate(|s| ((), s.remove_elemental_stain_at(index)))
    }

    pub fn clear_elemental_stains(&self) {
        self.mutate(|s| ((), s.clear_elemental_stains()))
    }

    pub fn set_fate_card(&self, card: FateCard) {
        self.mutate(|s| ((), s.set_fate_card(card)))
    }

    pub fn consume_fate_card(&self) -> FateCard {
        self.mutate(|s| s.consume_fate_card())
    }

    pub fn increment_turret_count(&self) -> u32 {
        self.mutate(|s| {
            let patch = s.increment_turret_count();
            (s.turrets_deployed_this_battle(), patch)
        })
    }

    /// Deploy a turret, returning its id
    pub fn deploy_turret(&self) -> String {
        self.mutate(|s| s.deploy_turret())
    }

    pub fn destroy_turret(&self) {
        self.mutate(|s| ((), s.destroy_turret()))
    }

    pub fn set_bonus_action_cooldown(&self, value: i64) -> u32 {
        self.mutate(|s| {
            let patch = s.set_bonus_action_cooldown(value);
            (s.bonus_action_cooldown(), patch)
        })
    }

    pub fn set_has_acted_this_turn(&self, acted: bool) {
        self.mutate(|s| ((), s.set_has_acted_this_turn(acted)))
    }

    pub fn on_basic_attack_hit(&self, was_critical: bool) -> u8 {
        self.mutate(|s| {
            let patch = s.on_basic_attack_hit(was_critical);
            (s.afterimage_stacks(), patch)
        })
    }

    pub fn consume_afterimage_stacks(&self) -> u8 {
        self.mutate(|s| s.consume_afterimage_stacks())
    }

    pub fn update_multiple(&self, partial: CombatantPatch) {
        self.mutate(|s| ((), s.update_multiple(partial)))
    }

    /// Per-turn reset for this character's turn
    pub fn begin_turn(&self, round: u32, turn_id: &str) {
        self.mutate(|s| ((), s.begin_turn(round, turn_id)))
    }

    /// Cancel the timer and write pending fields now
    pub async fn flush_now(&self) -> Result<bool, SyncError> {
        self.inner.scheduler.cancel();
        Ok(self.inner.flush().await?)
    }

    /// Flush, then stop following the record
    pub async fn close(&self) -> Result<(), SyncError> {
        let flushed = self.flush_now().await;
        if let Some(listener) = self.listener.lock().take() {
            listener.abort();
        }
        info!("Synchronizer for {} closed", self.inner.character_id);
        flushed.map(|_| ())
    }

    pub fn character_id(&self) -> &str {
        &self.inner.character_id
    }

    /// Copy of the local (optimistic) state
    pub fn state(&self) -> CombatantState {
        self.inner.state.lock().local.clone()
    }

    pub fn status(&self) -> SyncStatus {
        self.inner.state.lock().status
    }

    /// Number of fields waiting for the next flush
    pub fn pending_fields(&self) -> usize {
        self.inner.state.lock().pending.len()
    }

    pub fn is_write_in_flight(&self) -> bool {
        self.inner.state.lock().in_flight
    }

    pub fn is_flush_scheduled(&self) -> bool {
        self.inner.scheduler.is_scheduled()
    }

    /// Snapshots ignored because a write was in flight
    pub fn suppressed_snapshots(&self) -> u64 {
        self.inner.state.lock().suppressed
    }

    /// Successful writes made by this synchronizer
    pub fn write_count(&self) -> u64 {
        self.inner.writes.load(Ordering::Relaxed)
    }

    /// Latest error message, cleared by the next successful write
    pub fn last_error(&self) -> Option<String> {
        self.inner.errors.borrow().clone()
    }

    /// Watch the error channel
    pub fn errors(&self) -> watch::Receiver<Option<String>> {
        self.inner.errors.subscribe()
    }
}

impl Drop for StateSynchronizer {
    fn drop(&mut self) {
        self.inner.scheduler.cancel();
        if let Some(listener) = self.listener.lock().take() {
            listener.abort();
        }
    }
}

impl std::fmt::Debug for StateSynchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateSynchronizer")
            .field("character_id", &self.inner.character_id)
            .field("status", &self.status())
            .finish()
    }
}
