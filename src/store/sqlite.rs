//! SQLite-backed document store
//!
//! Documents are JSON bodies keyed by path with a version counter. Partial
//! updates run inside `BEGIN IMMEDIATE` so concurrent writers from other
//! processes serialize on the database lock. Subscriptions poll the version
//! column and are woken early by writes made through this handle.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::{SqliteConnection, SqlitePool};
use tokio::sync::{mpsc, Notify};
use tracing::{debug, warn};

use super::{DocPath, DocumentStore, FieldPatch, Snapshot, SnapshotEvent, StoreError, Subscription};

/// Default interval between subscription polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Document store with database backing
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    changed: Arc<Notify>,
    poll_interval: Duration,
}

impl SqliteStore {
    /// Create a new store with the given connection pool
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            changed: Arc::new(Notify::new()),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Set how often subscriptions look for writes from other processes
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    async fn fetch(pool: &SqlitePool, path: &DocPath) -> Result<Option<(Value, u64)>, StoreError> {
        let row: Option<DocumentRow> =
            sqlx::query_as("SELECT data, version FROM documents WHERE path = ?")
                .bind(path.as_str())
                .fetch_optional(pool)
                .await?;

        row.map(|r| r.into_parts()).transpose()
    }

    /// Read, patch and write back one document on a connection holding the write lock
    async fn patch_locked(
        conn: &mut SqliteConnection,
        path: &DocPath,
        patch: &FieldPatch,
    ) -> Result<(), StoreError> {
        let row: Option<DocumentRow> =
            sqlx::query_as("SELECT data, version FROM documents WHERE path = ?")
                .bind(path.as_str())
                .fetch_optional(&mut *conn)
                .await?;

        let Some(row) = row else {
            return Err(StoreError::NotFound(path.clone()));
        };
        let (mut data, version) = row.into_parts()?;
        patch.apply_to(&mut data);

        let updated_at = chrono::Utc::now().to_rfc3339();
        sqlx::query("UPDATE documents SET data = ?, version = ?, updated_at = ? WHERE path = ?")
            .bind(serde_json::to_string(&data)?)
            .bind((version + 1) as i64)
            .bind(&updated_at)
            .bind(path.as_str())
            .execute(&mut *conn)
            .await?;

        Ok(())
    }
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("poll_interval", &self.poll_interval)
            .finish()
    }
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn subscribe(&self, path: &DocPath) -> Result<Subscription, StoreError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let pool = self.pool.clone();
        let changed = self.changed.clone();
        let poll_interval = self.poll_interval;
        let watch_path = path.clone();

        let task = tokio::spawn(async move {
            // None = nothing delivered yet, Some(None) = last delivery was NotFound
            let mut last: Option<Option<u64>> = None;

            loop {
                // Register interest before reading so a write between the
                // read and the wait still wakes us
                let notified = changed.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();

                match Self::fetch(&pool, &watch_path).await {
                    Ok(Some((data, version))) => {
                        if last != Some(Some(version)) {
                            last = Some(Some(version));
                            let event = SnapshotEvent::Snapshot(Snapshot {
                                path: watch_path.clone(),
                                data,
                                version,
                            });
                            if tx.send(event).is_err() {
                                break;
                            }
                        }
                    }
                    Ok(None) => {
                        if last != Some(None) {
                            last = Some(None);
                            if tx.send(SnapshotEvent::NotFound(watch_path.clone())).is_err() {
                                break;
                            }
                        }
                    }
                    Err(e) => warn!("Failed to poll {}: {}", watch_path, e),
                }

                tokio::select! {
                    _ = tokio::time::sleep(poll_interval) => {}
                    _ = &mut notified => {}
                    _ = tx.closed() => break,
                }
            }

            debug!("Subscription poller for {} stopped", watch_path);
        });

        let abort = task.abort_handle();
        Ok(Subscription::new(path.clone(), rx, move || abort.abort()))
    }

    async fn get_once(&self, path: &DocPath) -> Result<SnapshotEvent, StoreError> {
        Ok(match Self::fetch(&self.pool, path).await? {
            Some((data, version)) => SnapshotEvent::Snapshot(Snapshot {
                path: path.clone(),
                data,
                version,
            }),
            None => SnapshotEvent::NotFound(path.clone()),
        })
    }

    async fn update_partial(&self, path: &DocPath, patch: &FieldPatch) -> Result<(), StoreError> {
        patch.validate()?;

        // Dropping the transaction on any early return rolls it back
        let mut tx = self.pool.begin_with("BEGIN IMMEDIATE").await?;
        Self::patch_locked(&mut tx, path, patch).await?;
        tx.commit().await?;

        self.changed.notify_waiters();
        Ok(())
    }

    async fn set_document(&self, path: &DocPath, data: Value) -> Result<(), StoreError> {
        let body = serde_json::to_string(&data)?;
        let now = chrono::Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO documents (path, collection, data, version, created_at, updated_at)
            VALUES (?, ?, ?, 1, ?, ?)
            ON CONFLICT(path) DO UPDATE SET
                data = excluded.data,
                version = documents.version + 1,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(path.as_str())
        .bind(path.collection())
        .bind(&body)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        self.changed.notify_waiters();
        Ok(())
    }
}

/// Row type for SQLite queries
#[derive(sqlx::FromRow)]
struct DocumentRow {
    data: String,
    version: i64,
}

impl DocumentRow {
    fn into_parts(self) -> Result<(Value, u64), StoreError> {
        let data: Value = serde_json::from_str(&self.data)?;
        Ok((data, self.version.max(0) as u64))
    }
}
