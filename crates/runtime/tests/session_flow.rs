//! End-to-end flows through the public session API: pack loading, node
//! placement, action triggering, suspended bodies coming due, and replay.

use nodeforge_core::{Dict, ItemStack, Position, Value};
use nodeforge_runtime::{Session, SessionError, SessionEvent, load_packs};
use serde_json::json;

fn factory_pack() -> String {
    json!({
        "display": "Factory",
        "items": {
            "ore": {"display": "Ore", "maxStackSize": 10},
            "ingot": {"display": "Ingot"}
        },
        "nodes": {
            "miner": {
                "display": "Miner",
                "size": 1,
                "inventory": {"slots": 2, "canPlayerExtract": true},
                "actions": {
                    "mine": {
                        "display": "Mine",
                        "duration": 1,
                        "run": [{
                            "_type": "addItemsToInventory",
                            "node": {"_type": "getContext", "id": "node"},
                            "items": [{"item": "ore", "quantity": 2}]
                        }]
                    },
                    "prospect": {
                        "display": "Prospect",
                        "duration": 0,
                        "run": [{
                            "_type": "addItemsToInventory",
                            "node": {"_type": "getContext", "id": "node"},
                            "items": [{
                                "item": "ore",
                                "quantity": {"_type": "randomInt", "min": 1, "max": 5}
                            }]
                        }]
                    }
                }
            },
            "smelter": {
                "display": "Smelter",
                "size": 1,
                "data": {"done": {"_type": "boolean", "default": false}},
                "inventory": {"slots": 2},
                "actions": {
                    "smelt": {
                        "display": "Smelt",
                        "duration": 3,
                        "cost": {"ore": {"item": "ore", "quantity": 2}},
                        "run": [
                            {"_type": "wait", "duration": 2},
                            {
                                "_type": "addItemsToInventory",
                                "node": {"_type": "getContext", "id": "node"},
                                "items": [{"item": "ingot", "quantity": 1}]
                            },
                            {
                                "_type": "setData",
                                "object": {"_type": "getContext", "id": "node"},
                                "key": "done",
                                "value": true
                            }
                        ]
                    }
                }
            }
        },
        "eventListeners": {
            "oreMined": []
        }
    })
    .to_string()
}

fn session(seed: u64) -> Session {
    let env = load_packs([factory_pack().as_str()]).unwrap();
    Session::new(env, seed)
}

fn ore_count(session: &Session, node: nodeforge_core::NodeId) -> u64 {
    session
        .state()
        .node(node)
        .unwrap()
        .inventory
        .quantity_of("ore")
}

#[test]
fn ore_flows_from_miner_to_smelter() {
    let mut session = session(11);
    let miner = session
        .place_node("miner", Position { x: 0.0, y: 0.0 }, Dict::new())
        .unwrap();
    let smelter = session
        .place_node("smelter", Position { x: 1.0, y: 0.0 }, Dict::new())
        .unwrap();

    session.trigger_node_action(miner, "mine").unwrap();
    assert_eq!(ore_count(&session, miner), 2);

    session
        .player_extract(miner, &[ItemStack::new("ore", 2)])
        .unwrap();
    session
        .player_insert(smelter, &[ItemStack::new("ore", 2)])
        .unwrap();

    session.trigger_node_action(smelter, "smelt").unwrap();
    // Cost charged, body parked at the wait.
    assert_eq!(ore_count(&session, smelter), 0);
    assert_eq!(
        session.state().node(smelter).unwrap().data["done"],
        Value::Bool(false)
    );

    session.advance(2.0);
    assert_eq!(
        session.state().node(smelter).unwrap().data["done"],
        Value::Bool(true)
    );
    assert_eq!(
        session
            .state()
            .node(smelter)
            .unwrap()
            .inventory
            .quantity_of("ingot"),
        1
    );

    // Still inside the action's busy window.
    let err = session.trigger_node_action(smelter, "smelt").unwrap_err();
    assert!(matches!(err, SessionError::NodeBusy { .. }));
}

#[test]
fn removing_a_node_discards_its_pending_work() {
    let mut session = session(11);
    let smelter = session
        .place_node("smelter", Position { x: 0.0, y: 0.0 }, Dict::new())
        .unwrap();
    session
        .player_insert(smelter, &[ItemStack::new("ore", 2)])
        .unwrap();
    session.trigger_node_action(smelter, "smelt").unwrap();

    session.remove_node(smelter).unwrap();
    session.advance(10.0);

    let diagnostics = session.take_diagnostics();
    assert!(diagnostics.contains(&SessionEvent::ExecutionCancelled { node: smelter }));
    assert!(!diagnostics
        .iter()
        .any(|d| matches!(d, SessionEvent::ScriptFaulted { .. })));
}

#[test]
fn equal_seeds_produce_equal_worlds() {
    let mut a = session(23);
    let mut b = session(23);
    for session in [&mut a, &mut b] {
        let miner = session
            .place_node("miner", Position { x: 0.0, y: 0.0 }, Dict::new())
            .unwrap();
        for _ in 0..3 {
            session.trigger_node_action(miner, "prospect").unwrap();
            session
                .player_extract(miner, &[ItemStack::new("ore", ore_count(session, miner))])
                .unwrap();
        }
    }
    assert_eq!(a.state(), b.state());
}
