//! NPC scenario tests
//!
//! Tests delegated control of allied NPCs and level changes

use std::sync::Arc;
use std::time::Duration;

use combatd::control::ControlState;
use combatd::resources::{NpcKind, ResourceError};
use combatd::store::{DocumentStore, FieldPatch};
use combatd::{CombatClient, Role};
use serde_json::json;
use tokio::task::JoinHandle;

use crate::harness::TestTable;

async fn run_for(clients: &[&Arc<CombatClient>]) -> Vec<JoinHandle<anyhow::Result<()>>> {
    let handles = clients
        .iter()
        .map(|client| {
            let client = Arc::clone(client);
            tokio::spawn(async move { client.run().await })
        })
        .collect();
    tokio::time::sleep(Duration::from_millis(10)).await;
    handles
}

/// Test: A Farmhand without controlledBy is driven by Sciel
#[tokio::test(start_paused = true)]
async fn test_farmhand_falls_back_to_sciel() {
    let table = TestTable::start().await.unwrap();
    let sciel = table.client(Role::Player, Some("sciel")).await.unwrap();
    let lune = table.client(Role::Player, Some("lune")).await.unwrap();
    let handles = run_for(&[&sciel, &lune]).await;

    table.set_turn(1, "farmhand").await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(
        sciel.control_state(),
        ControlState::NpcActive {
            token_id: "farmhand".to_string(),
            controller: Some("sciel".to_string()),
        }
    );
    assert!(sciel.is_my_turn());
    assert!(!lune.is_my_turn());
    assert_eq!(lune.current_actor_name().as_deref(), Some("Farmhand"));

    for client in [&sciel, &lune] {
        client.shutdown();
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }
}

/// Test: Explicit assignment overrides the fallback table
#[tokio::test(start_paused = true)]
async fn test_explicit_controller_overrides_table() {
    let table = TestTable::start().await.unwrap();
    let mut patch = FieldPatch::new();
    patch.set("tokens.farmhand.controlledBy", json!("gustave"));
    table
        .store
        .update_partial(&table.session_path, &patch)
        .await
        .unwrap();

    let gustave = table.client(Role::Player, Some("gustave")).await.unwrap();
    let sciel = table.client(Role::Player, Some("sciel")).await.unwrap();
    let handles = run_for(&[&gustave, &sciel]).await;

    table.set_turn(1, "farmhand").await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert!(gustave.is_my_turn());
    assert!(!sciel.is_my_turn());

    for client in [&gustave, &sciel] {
        client.shutdown();
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }
}

/// Test: An uncontrolled NPC's heal runs once, on the game master's client
#[tokio::test(start_paused = true)]
async fn test_uncontrolled_curator_heals_via_gm() {
    let table = TestTable::start().await.unwrap();
    let mut patch = FieldPatch::new();
    patch.set(
        "tokens.archivist",
        json!({ "name": "Archivist", "kind": "npc", "hp": 10, "maxHp": 30, "npcType": "curator" }),
    );
    table
        .store
        .update_partial(&table.session_path, &patch)
        .await
        .unwrap();

    let gm = table.client(Role::GameMaster, None).await.unwrap();
    let lune = table.client(Role::Player, Some("lune")).await.unwrap();
    let handles = run_for(&[&gm, &lune]).await;

    table.set_turn(1, "goblin").await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    table.set_turn(1, "archivist").await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    table.set_turn(1, "archivist").await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(table.session().unwrap().tokens["archivist"].hp, 15);

    for client in [&gm, &lune] {
        client.shutdown();
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }
}

/// Test: Level changes are game-master only and follow the HP table
#[tokio::test]
async fn test_npc_level_changes() {
    let table = TestTable::start().await.unwrap();

    let player = table.client(Role::Player, Some("sciel")).await.unwrap();
    let err = player.set_npc_level(NpcKind::Farmhand, 4).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ResourceError>(),
        Some(ResourceError::NotPermitted(_))
    ));

    let gm = table.client(Role::GameMaster, None).await.unwrap();

    // Level up heals to the new max
    let up = gm.set_npc_level(NpcKind::Farmhand, 4).await.unwrap();
    assert_eq!((up.hp, up.max_hp), (44, 44));

    // Level down keeps HP, clamped to the new max
    let down = gm.set_npc_level(NpcKind::Farmhand, 1).await.unwrap();
    assert_eq!((down.hp, down.max_hp), (18, 18));

    let session = table.session().unwrap();
    assert_eq!(session.npc_levels["farmhand"], 1);
    assert_eq!(session.tokens["farmhand"].max_hp, 18);

    assert!(gm.set_npc_level(NpcKind::Curator, 2).await.is_err());
}

/// Test: After a new battle the same NPC turn key runs its hooks again
#[tokio::test(start_paused = true)]
async fn test_npc_hooks_rerun_after_new_battle() {
    let table = TestTable::start().await.unwrap();
    let mut patch = FieldPatch::new();
    patch.set(
        "tokens.archivist",
        json!({ "name": "Archivist", "kind": "npc", "hp": 10, "maxHp": 30, "npcType": "curator" }),
    );
    table
        .store
        .update_partial(&table.session_path, &patch)
        .await
        .unwrap();

    let gm = table.client(Role::GameMaster, None).await.unwrap();
    let handles = run_for(&[&gm]).await;

    table.set_turn(1, "goblin").await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    table.set_turn(1, "archivist").await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(table.session().unwrap().tokens["archivist"].hp, 15);

    let report = gm.new_battle().await.unwrap();
    assert!(report.session_reset);
    tokio::time::sleep(Duration::from_millis(10)).await;

    table.set_turn(1, "archivist").await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(table.session().unwrap().tokens["archivist"].hp, 20);

    gm.shutdown();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }
}
