//! SQLite scenario tests
//!
//! Tests two processes sharing one database file: each opens its own pool,
//! so changes cross over only through version polling.

use std::sync::Arc;
use std::time::Duration;

use combatd::db::Database;
use combatd::init::{init_database, BattleSeed};
use combatd::resources::{CharacterRecord, FateCard};
use combatd::store::{DocPath, DocumentStore, SnapshotEvent, SqliteStore};
use combatd::sync::StateSynchronizer;
use tempfile::TempDir;

async fn open(path: &std::path::Path) -> SqliteStore {
    let db = Database::new(path.to_str()).await.expect("Failed to open database");
    SqliteStore::new(db.pool().clone()).with_poll_interval(Duration::from_millis(20))
}

/// Test: A write from one process reaches a subscriber in another
#[tokio::test]
async fn test_write_crosses_processes() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("table.db");
    init_database(&db_path, &BattleSeed::new("table")).await.unwrap();

    let writer = open(&db_path).await;
    let reader = open(&db_path).await;
    let path = DocPath::character("sciel").unwrap();

    let mut subscription = reader.subscribe(&path).await.unwrap();
    let first = subscription.next().await.unwrap().into_snapshot().unwrap();

    let sync = StateSynchronizer::connect(Arc::new(writer), "sciel", Duration::from_millis(20))
        .await
        .unwrap();
    sync.set_fate_card(FateCard::Switch);

    let seen = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match subscription.next().await {
                Some(SnapshotEvent::Snapshot(snapshot)) if snapshot.version > first.version => {
                    break snapshot;
                }
                Some(_) => continue,
                None => panic!("subscription closed"),
            }
        }
    })
    .await
    .expect("no snapshot from the other process");

    let record = CharacterRecord::from_document(&seen.data).unwrap();
    assert_eq!(record.combat_state.charged_fate_card(), FateCard::Switch);
}

/// Test: A synchronizer started before its record exists catches up
#[tokio::test]
async fn test_record_created_later_by_other_process() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("table.db");
    let seed = BattleSeed::from_json(
        r#"{ "sessionId": "table", "party": [{ "id": "lune", "maxHp": 30 }] }"#,
    )
    .unwrap();
    init_database(&db_path, &seed).await.unwrap();

    let player = open(&db_path).await;
    let sync = StateSynchronizer::connect(Arc::new(player), "gustave", Duration::from_millis(20))
        .await
        .unwrap();
    assert!(sync.last_error().is_some());
    sync.set_overcharge_points(2);

    let admin = open(&db_path).await;
    let record = CharacterRecord::new(combatd::resources::CharacterKind::Gustave, 50, 2);
    admin
        .set_document(&DocPath::character("gustave").unwrap(), record.to_document().unwrap())
        .await
        .unwrap();

    let path = DocPath::character("gustave").unwrap();
    let stored = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            tokio::time::sleep(Duration::from_millis(20)).await;
            if let SnapshotEvent::Snapshot(snapshot) = admin.get_once(&path).await.unwrap() {
                let record = CharacterRecord::from_document(&snapshot.data).unwrap();
                if record.combat_state.overcharge_points() == 2 {
                    break record;
                }
            }
        }
    })
    .await
    .expect("pending change never written");

    assert_eq!(stored.max_hp, 50);
    assert!(sync.last_error().is_none());
}
