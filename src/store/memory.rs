//! In-memory document store
//!
//! Every write is pushed synchronously to all subscribers of the document,
//! which makes it a faithful stand-in for a push-based remote store in tests.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;

use super::{DocPath, DocumentStore, FieldPatch, Snapshot, SnapshotEvent, StoreError, Subscription};

#[derive(Default)]
struct MemoryInner {
    docs: HashMap<DocPath, (Value, u64)>,
    subscribers: HashMap<DocPath, Vec<(u64, mpsc::UnboundedSender<SnapshotEvent>)>>,
    next_subscriber: u64,
    writes: u64,
    fail_writes: u32,
}

impl MemoryInner {
    fn event(&self, path: &DocPath) -> SnapshotEvent {
        match self.docs.get(path) {
            Some((data, version)) => SnapshotEvent::Snapshot(Snapshot {
                path: path.clone(),
                data: data.clone(),
                version: *version,
            }),
            None => SnapshotEvent::NotFound(path.clone()),
        }
    }

    fn publish(&mut self, path: &DocPath) {
        let event = self.event(path);
        if let Some(subs) = self.subscribers.get_mut(path) {
            subs.retain(|(_, tx)| tx.send(event.clone()).is_ok());
        }
    }
}

/// Shared in-memory store; clones share the same documents
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryInner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current document contents, if present
    pub fn document(&self, path: &DocPath) -> Option<Value> {
        self.inner.lock().docs.get(path).map(|(data, _)| data.clone())
    }

    /// Number of successful `update_partial` calls so far
    pub fn write_count(&self) -> u64 {
        self.inner.lock().writes
    }

    /// Make the next `count` partial writes fail with `Rejected`
    pub fn fail_next_writes(&self, count: u32) {
        self.inner.lock().fail_writes = count;
    }

    /// Number of live subscriptions on a document
    pub fn subscriber_count(&self, path: &DocPath) -> usize {
        self.inner
            .lock()
            .subscribers
            .get(path)
            .map_or(0, |subs| subs.len())
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("MemoryStore")
            .field("documents", &inner.docs.len())
            .field("writes", &inner.writes)
            .finish()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn subscribe(&self, path: &DocPath) -> Result<Subscription, StoreError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.inner.lock();

        let id = inner.next_subscriber;
        inner.next_subscriber += 1;

        // Current state goes out first, like any push-based store
        let _ = tx.send(inner.event(path));
        inner
            .subscribers
            .entry(path.clone())
            .or_default()
            .push((id, tx));

        debug!("Subscribed {} (subscriber {})", path, id);

        let weak = Arc::downgrade(&self.inner);
        let sub_path = path.clone();
        Ok(Subscription::new(path.clone(), rx, move || {
            if let Some(inner) = weak.upgrade() {
                if let Some(subs) = inner.lock().subscribers.get_mut(&sub_path) {
                    subs.retain(|(sub_id, _)| *sub_id != id);
                }
            }
        }))
    }

    async fn get_once(&self, path: &DocPath) -> Result<SnapshotEvent, StoreError> {
        Ok(self.inner.lock().event(path))
    }

    async fn update_partial(&self, path: &DocPath, patch: &FieldPatch) -> Result<(), StoreError> {
        patch.validate()?;
        let mut inner = self.inner.lock();

        if inner.fail_writes > 0 {
            inner.fail_writes -= 1;
            return Err(StoreError::Rejected("injected write failure".to_string()));
        }

        let Some((data, version)) = inner.docs.get_mut(path) else {
            return Err(StoreError::NotFound(path.clone()));
        };
        patch.apply_to(data);
        *version += 1;
        inner.writes += 1;

        inner.publish(path);
        Ok(())
    }

    async fn set_document(&self, path: &DocPath, data: Value) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        let version = inner.docs.get(path).map_or(1, |(_, v)| v + 1);
        inner.docs.insert(path.clone(), (data, version));
        inner.publish(path);
        Ok(())
    }
}
