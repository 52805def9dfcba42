//! Status effect scenario tests
//!
//! Tests burn damage and duration decay driven by the game master's client

use std::time::Duration;

use combatd::session::EffectKind;
use combatd::store::{DocumentStore, FieldPatch};
use combatd::Role;
use serde_json::json;

use crate::harness::TestTable;

/// Test: Burn on Lune's turn kills the 3 HP skeleton and removes it
#[tokio::test(start_paused = true)]
async fn test_burn_removes_dead_enemy() {
    let table = TestTable::start().await.unwrap();
    let gm = table.client(Role::GameMaster, None).await.unwrap();
    let runner = {
        let gm = gm.clone();
        tokio::spawn(async move { gm.run().await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;

    table.set_turn(1, "maelle").await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(table.session().unwrap().tokens.contains_key("skeleton"));

    let writes_before = table.store.write_count();
    table.set_turn(1, "lune").await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    let session = table.session().unwrap();
    assert!(!session.tokens.contains_key("skeleton"));
    assert!(session.combat_state.initiative_index("skeleton").is_none());
    assert!(session.tokens.values().all(|token| token.hp >= 0));
    // The turn change plus exactly one burn write
    assert_eq!(table.store.write_count(), writes_before + 2);

    gm.shutdown();
    runner.await.unwrap().unwrap();
}

/// Test: Round boundary ticks effects down and clears empty effect maps
#[tokio::test(start_paused = true)]
async fn test_round_decay() {
    let table = TestTable::start().await.unwrap();
    let mut patch = FieldPatch::new();
    patch.set(
        "tokens.goblin.statusEffects",
        json!({ "ice": { "turnsRemaining": 1 }, "blind": { "turnsRemaining": 3 } }),
    );
    patch.set(
        "tokens.maelle.statusEffects",
        json!({ "blind": { "turnsRemaining": 1 } }),
    );
    table
        .store
        .update_partial(&table.session_path, &patch)
        .await
        .unwrap();

    let gm = table.client(Role::GameMaster, None).await.unwrap();
    let player = table.client(Role::Player, Some("gustave")).await.unwrap();
    let runners: Vec<_> = [gm.clone(), player.clone()]
        .into_iter()
        .map(|client| tokio::spawn(async move { client.run().await }))
        .collect();
    tokio::time::sleep(Duration::from_millis(10)).await;

    table.set_turn(1, "sciel").await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    table.set_turn(2, "maelle").await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    let session = table.session().unwrap();
    let goblin = &session.tokens["goblin"];
    assert_eq!(goblin.status_effects.len(), 1);
    assert_eq!(goblin.status_effects[&EffectKind::Blind].turns_remaining, 2);
    assert!(session.tokens["maelle"].status_effects.is_empty());

    let doc = table.store.document(&table.session_path).unwrap();
    assert!(doc["tokens"]["maelle"].get("statusEffects").is_none());

    // The same round delivered again decays nothing further
    table.set_turn(2, "maelle").await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    let session = table.session().unwrap();
    let goblin = &session.tokens["goblin"];
    assert_eq!(goblin.status_effects[&EffectKind::Blind].turns_remaining, 2);

    for client in [&gm, &player] {
        client.shutdown();
    }
    for runner in runners {
        runner.await.unwrap().unwrap();
    }
}
