//! Reset scenario tests
//!
//! Tests long rest and new battle across the whole party

use std::sync::Arc;

use combatd::resources::{
    CharacterKind, CombatantPatch, FateCard, Stain, Stance,
};
use combatd::store::{DocPath, DocumentStore, FieldPatch};
use combatd::sync::{StateSynchronizer, DEFAULT_DEBOUNCE};
use combatd::Role;
use serde_json::json;

use crate::harness::TestTable;

async fn scramble(table: &TestTable) {
    for (i, kind) in CharacterKind::ALL.into_iter().enumerate() {
        let store = Arc::new(table.store.clone());
        let sync = StateSynchronizer::connect(store, kind.id(), DEFAULT_DEBOUNCE)
            .await
            .unwrap();
        sync.update_multiple(CombatantPatch {
            overcharge_points: Some(2),
            elemental_stains: Some(vec![Stain::Light, Stain::Nature]),
            charged_fate_card: Some(FateCard::Vanish),
            afterimage_stacks: Some(3),
            bonus_action_cooldown: Some(2),
            has_acted_this_turn: Some(true),
            ..Default::default()
        });
        sync.deploy_turret();
        sync.close().await.unwrap();

        let mut patch = FieldPatch::new();
        patch.set("hp", json!(5 + i as i32));
        patch.set("charges", json!(0));
        if kind.has_stance() {
            patch.set("stance", json!("defensive"));
        }
        table
            .store
            .update_partial(&DocPath::character(kind.id()).unwrap(), &patch)
            .await
            .unwrap();
    }

    let mut patch = FieldPatch::new();
    patch.set("tokens.lune.hp", json!(2));
    patch.set("tokens.gustave.hp", json!(9));
    table
        .store
        .update_partial(&table.session_path, &patch)
        .await
        .unwrap();
}

/// Test: Long rest restores every character and mirrors token HP
#[tokio::test]
async fn test_long_rest_from_arbitrary_state() {
    let table = TestTable::start().await.unwrap();
    scramble(&table).await;

    let gm = table.client(Role::GameMaster, None).await.unwrap();
    let report = gm.long_rest().await.unwrap();
    assert!(report.is_complete());
    assert_eq!(report.succeeded.len(), 4);
    assert_eq!(report.mirrored.len(), 4);

    let session = table.session().unwrap();
    for kind in CharacterKind::ALL {
        let record = table.character(kind.id()).unwrap();
        assert_eq!(record.hp, record.max_hp);
        assert_eq!(record.charges, record.max_charges);

        let state = &record.combat_state;
        assert_eq!(state.overcharge_points(), 0);
        assert!(state.elemental_stains().is_empty());
        assert_eq!(state.charged_fate_card(), FateCard::Empty);
        assert_eq!(state.afterimage_stacks(), 0);
        assert_eq!(state.active_turret_id(), None);
        assert_eq!(state.turrets_deployed_this_battle(), 0);
        assert_eq!(state.bonus_action_cooldown(), 0);
        assert!(!state.has_acted_this_turn());

        let token = &session.tokens[kind.id()];
        assert_eq!(token.hp, record.hp);
        assert_eq!(token.max_hp, record.max_hp);
    }
    assert_eq!(table.character("maelle").unwrap().stance, Some(Stance::Neutral));
}

/// Test: New battle clears battle resources and the round state only
#[tokio::test]
async fn test_new_battle_keeps_progression() {
    let table = TestTable::start().await.unwrap();
    scramble(&table).await;
    table.set_turn(3, "goblin").await.unwrap();

    let gm = table.client(Role::GameMaster, None).await.unwrap();
    let report = gm.new_battle().await.unwrap();
    assert!(report.is_complete());
    assert!(report.session_reset);

    for kind in CharacterKind::ALL {
        let record = table.character(kind.id()).unwrap();
        let state = &record.combat_state;
        assert_eq!(state.turrets_deployed_this_battle(), 0);
        assert_eq!(state.active_turret_id(), None);
        assert!(state.elemental_stains().is_empty());
        assert_eq!(state.overcharge_points(), 2);
        assert_eq!(record.level, 1);
    }

    let session = table.session().unwrap();
    assert!(!session.combat_state.is_active);
    assert_eq!(session.combat_state.round, 1);
    assert!(session.combat_state.current_turn.is_none());
}

/// Test: Mirror repair re-copies record HP onto the token
#[tokio::test]
async fn test_reconcile_token_mirror() {
    let table = TestTable::start().await.unwrap();
    let mut patch = FieldPatch::new();
    patch.set("tokens.sciel.hp", json!(1));
    table
        .store
        .update_partial(&table.session_path, &patch)
        .await
        .unwrap();

    let gm = table.client(Role::GameMaster, None).await.unwrap();
    let orchestrator = gm.orchestrator();
    assert!(orchestrator.reconcile_token_mirror("sciel").await.unwrap());
    assert_eq!(table.session().unwrap().tokens["sciel"].hp, 40);

    // No token for an unknown-but-valid record id
    table
        .store
        .set_document(
            &DocPath::character("verso").unwrap(),
            json!({ "name": "Verso", "hp": 10, "maxHp": 10 }),
        )
        .await
        .unwrap();
    assert!(!orchestrator.reconcile_token_mirror("verso").await.unwrap());
}
