//! GatedStore - a MemoryStore whose writes can be held in flight
//!
//! While the gate is closed, `update_partial` announces that it has started
//! and then waits for `release` before touching the documents. Tests use the
//! pause to deliver remote snapshots during a write.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use combatd::store::{
    DocPath, DocumentStore, FieldPatch, MemoryStore, SnapshotEvent, StoreError, Subscription,
};
use serde_json::Value;
use tokio::sync::Notify;

#[derive(Default)]
struct Gate {
    closed: AtomicBool,
    entered: Notify,
    released: Notify,
}

/// Memory store with a write gate
#[derive(Clone, Default)]
pub struct GatedStore {
    inner: MemoryStore,
    gate: Arc<Gate>,
}

impl GatedStore {
    pub fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            gate: Arc::default(),
        }
    }

    /// The wrapped store, for writes that bypass the gate
    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }

    /// Hold every following partial write until `release`
    pub fn hold_writes(&self) {
        self.gate.closed.store(true, Ordering::SeqCst);
    }

    /// Wait until a held write has started
    pub async fn write_started(&self) {
        self.gate.entered.notified().await;
    }

    /// Open the gate and let the held write finish
    pub fn release(&self) {
        self.gate.closed.store(false, Ordering::SeqCst);
        self.gate.released.notify_one();
    }
}

#[async_trait]
impl DocumentStore for GatedStore {
    async fn subscribe(&self, path: &DocPath) -> Result<Subscription, StoreError> {
        self.inner.subscribe(path).await
    }

    async fn get_once(&self, path: &DocPath) -> Result<SnapshotEvent, StoreError> {
        self.inner.get_once(path).await
    }

    async fn update_partial(&self, path: &DocPath, patch: &FieldPatch) -> Result<(), StoreError> {
        if self.gate.closed.load(Ordering::SeqCst) {
            self.gate.entered.notify_one();
            self.gate.released.notified().await;
        }
        self.inner.update_partial(path, patch).await
    }

    async fn set_document(&self, path: &DocPath, data: Value) -> Result<(), StoreError> {
        self.inner.set_document(path, data).await
    }
}
