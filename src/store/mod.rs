//! Remote document store contract
//!
//! The engine treats the shared store as a black box with three operations:
//! - subscribe: push stream of full-document snapshots
//! - get_once: single read
//! - update_partial: field-scoped write, atomic per document only
//!
//! Two adapters implement the contract: [`MemoryStore`] for tests and
//! single-process play, and [`SqliteStore`] for several processes sharing one
//! database file.

mod memory;
mod patch;
mod path;
mod sqlite;

pub use memory::MemoryStore;
pub use patch::{deep_merge, delete_path, set_path, FieldPatch, FieldValue};
pub use path::{validate_field_path, DocPath, PathValidationError, CHARACTERS, SESSIONS};
pub use sqlite::{SqliteStore, DEFAULT_POLL_INTERVAL};

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;

/// A full copy of one document at a given version
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub path: DocPath,
    pub data: Value,
    pub version: u64,
}

/// One delivery on a subscription or read
#[derive(Debug, Clone, PartialEq)]
pub enum SnapshotEvent {
    Snapshot(Snapshot),
    NotFound(DocPath),
}

impl SnapshotEvent {
    /// The snapshot, if the document exists
    pub fn into_snapshot(self) -> Option<Snapshot> {
        match self {
            SnapshotEvent::Snapshot(snapshot) => Some(snapshot),
            SnapshotEvent::NotFound(_) => None,
        }
    }
}

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("document not found: {0}")]
    NotFound(DocPath),

    #[error("invalid path: {0}")]
    InvalidPath(#[from] PathValidationError),

    #[error("write rejected: {0}")]
    Rejected(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A live snapshot stream for one document.
///
/// The stream ends when the subscription is dropped or
/// [`unsubscribe`](Subscription::unsubscribe) is called; teardown runs exactly
/// once either way.
pub struct Subscription {
    path: DocPath,
    rx: mpsc::UnboundedReceiver<SnapshotEvent>,
    teardown: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub(crate) fn new(
        path: DocPath,
        rx: mpsc::UnboundedReceiver<SnapshotEvent>,
        teardown: impl FnOnce() + Send + Sync + 'static,
    ) -> Self {
        Self {
            path,
            rx,
            teardown: Some(Box::new(teardown)),
        }
    }

    /// Document this subscription follows
    pub fn path(&self) -> &DocPath {
        &self.path
    }

    /// Wait for the next delivery; `None` once the stream has closed
    pub async fn next(&mut self) -> Option<SnapshotEvent> {
        self.rx.recv().await
    }

    /// Stop the stream
    pub fn unsubscribe(mut self) {
        self.teardown_once();
    }

    fn teardown_once(&mut self) {
        if let Some(teardown) = self.teardown.take() {
            teardown();
        }
        self.rx.close();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.teardown_once();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("path", &self.path)
            .field("active", &self.teardown.is_some())
            .finish()
    }
}

/// The shared document store
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Open a snapshot stream; the current state is delivered first
    async fn subscribe(&self, path: &DocPath) -> Result<Subscription, StoreError>;

    /// Read a document once
    async fn get_once(&self, path: &DocPath) -> Result<SnapshotEvent, StoreError>;

    /// Apply a field-scoped patch atomically to one existing document
    async fn update_partial(&self, path: &DocPath, patch: &FieldPatch) -> Result<(), StoreError>;

    /// Create or replace a whole document (battle setup and seeding only)
    async fn set_document(&self, path: &DocPath, data: Value) -> Result<(), StoreError>;
}
