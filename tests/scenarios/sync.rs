//! Synchronizer scenario tests
//!
//! Tests write coalescing, echo suppression and merging of remote changes

use std::sync::Arc;
use std::time::Duration;

use combatd::resources::{FateCard, Stain};
use combatd::store::{DocPath, DocumentStore, FieldPatch};
use combatd::sync::{StateSynchronizer, DEFAULT_DEBOUNCE};
use serde_json::json;

use crate::harness::{GatedStore, TestTable};

async fn connect(table: &TestTable, character_id: &str) -> StateSynchronizer {
    StateSynchronizer::connect(Arc::new(table.store.clone()), character_id, DEFAULT_DEBOUNCE)
        .await
        .unwrap()
}

/// Test: Five rapid mutations become one write with the final values
#[tokio::test(start_paused = true)]
async fn test_rapid_mutations_coalesce() {
    let table = TestTable::start().await.unwrap();
    let sync = connect(&table, "gustave").await;

    sync.set_overcharge_points(1);
    tokio::time::sleep(Duration::from_millis(50)).await;
    sync.set_overcharge_points(2);
    tokio::time::sleep(Duration::from_millis(50)).await;
    sync.deploy_turret();
    tokio::time::sleep(Duration::from_millis(50)).await;
    sync.set_bonus_action_cooldown(2);
    tokio::time::sleep(Duration::from_millis(50)).await;
    sync.set_has_acted_this_turn(true);

    assert_eq!(table.store.write_count(), 0);
    tokio::time::sleep(Duration::from_millis(350)).await;
    assert_eq!(table.store.write_count(), 1);

    let record = table.character("gustave").unwrap();
    let state = &record.combat_state;
    assert_eq!(state.overcharge_points(), 2);
    assert!(state.active_turret_id().is_some());
    assert_eq!(state.turrets_deployed_this_battle(), 1);
    assert_eq!(state.bonus_action_cooldown(), 2);
    assert!(state.has_acted_this_turn());
}

/// Test: A snapshot arriving mid-write does not undo in-flight fields
#[tokio::test(start_paused = true)]
async fn test_echo_suppressed_during_write() {
    let table = TestTable::start().await.unwrap();
    let store = GatedStore::new(table.store.clone());
    let sync = StateSynchronizer::connect(Arc::new(store.clone()), "maelle", DEFAULT_DEBOUNCE)
        .await
        .unwrap();

    store.hold_writes();
    sync.set_afterimage_stacks(4);
    tokio::time::sleep(Duration::from_millis(350)).await;
    store.write_started().await;
    assert!(sync.is_write_in_flight());

    // Another client's older value lands while our write is held
    let mut stale = FieldPatch::new();
    stale.set("combatState.afterimageStacks", json!(1));
    store
        .inner()
        .update_partial(&DocPath::character("maelle").unwrap(), &stale)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(sync.state().afterimage_stacks(), 4);
    assert!(sync.suppressed_snapshots() >= 1);

    store.release();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(!sync.is_write_in_flight());
    assert_eq!(table.character("maelle").unwrap().combat_state.afterimage_stacks(), 4);
    assert_eq!(sync.state().afterimage_stacks(), 4);
}

/// Test: Mutations made during a write go out in a second write afterwards
#[tokio::test(start_paused = true)]
async fn test_mutation_during_flight_is_not_lost() {
    let table = TestTable::start().await.unwrap();
    let store = GatedStore::new(table.store.clone());
    let sync = StateSynchronizer::connect(Arc::new(store.clone()), "sciel", DEFAULT_DEBOUNCE)
        .await
        .unwrap();

    store.hold_writes();
    sync.set_fate_card(FateCard::Explosive);
    tokio::time::sleep(Duration::from_millis(350)).await;
    store.write_started().await;

    sync.set_has_acted_this_turn(true);
    tokio::time::sleep(Duration::from_millis(350)).await;
    assert_eq!(table.store.write_count(), 0);

    store.release();
    tokio::time::sleep(Duration::from_millis(700)).await;

    assert_eq!(table.store.write_count(), 2);
    let record = table.character("sciel").unwrap();
    assert_eq!(record.combat_state.charged_fate_card(), FateCard::Explosive);
    assert!(record.combat_state.has_acted_this_turn());
}

/// Test: Changes made by another client show up locally
#[tokio::test(start_paused = true)]
async fn test_remote_changes_merge_into_local_state() {
    let table = TestTable::start().await.unwrap();
    let sync = connect(&table, "lune").await;

    sync.add_elemental_stain(Stain::Ice).unwrap();

    // The GM edits a different field before our flush
    let mut remote = FieldPatch::new();
    remote.set("combatState.bonusActionCooldown", json!(3));
    table
        .store
        .update_partial(&DocPath::character("lune").unwrap(), &remote)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    let state = sync.state();
    assert_eq!(state.bonus_action_cooldown(), 3);
    assert_eq!(state.elemental_stains(), &[Stain::Ice]);

    tokio::time::sleep(Duration::from_millis(400)).await;
    let record = table.character("lune").unwrap();
    assert_eq!(record.combat_state.elemental_stains(), &[Stain::Ice]);
    assert_eq!(record.combat_state.bonus_action_cooldown(), 3);
}

/// Test: Stains at capacity reject a fifth without changing anything
#[tokio::test(start_paused = true)]
async fn test_stain_capacity_through_sync() {
    let table = TestTable::start().await.unwrap();
    let sync = connect(&table, "lune").await;

    for stain in [Stain::Fire, Stain::Ice, Stain::Nature, Stain::Fire] {
        sync.add_elemental_stain(stain).unwrap();
    }
    assert!(sync.add_elemental_stain(Stain::Light).is_err());
    assert_eq!(
        sync.state().elemental_stains(),
        &[Stain::Fire, Stain::Ice, Stain::Nature, Stain::Fire]
    );

    sync.close().await.unwrap();
    assert_eq!(
        table.character("lune").unwrap().combat_state.elemental_stains().len(),
        4
    );
}

/// Test: Afterimages cap at five on a critical hit
#[tokio::test(start_paused = true)]
async fn test_afterimage_critical_caps() {
    let table = TestTable::start().await.unwrap();
    let sync = connect(&table, "maelle").await;

    sync.set_afterimage_stacks(4);
    assert_eq!(sync.on_basic_attack_hit(true), 5);
    sync.flush_now().await.unwrap();

    assert_eq!(table.character("maelle").unwrap().combat_state.afterimage_stacks(), 5);
    assert_eq!(sync.consume_afterimage_stacks(), 5);
    assert_eq!(sync.state().afterimage_stacks(), 0);
}
