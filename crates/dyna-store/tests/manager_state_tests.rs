mod common;

use std::collections::HashMap;

use common::collecting_callback;
use dyna_store::DynaManager;
use serde_json::json;

// ===== PATH RESOLUTION TESTS =====

#[tokio::test]
async fn test_set_then_get_round_trips() {
    let manager = DynaManager::new();
    manager.set("a.b.c", json!("v")).await;

    assert_eq!(manager.get(Some("a.b.c")).await, Some(json!("v")));
    assert_eq!(manager.get(Some("a")).await, Some(json!({ "b": { "c": "v" } })));
}

#[tokio::test]
async fn test_get_without_path_returns_whole_tree() {
    let manager = DynaManager::new();
    manager.set("x", json!(1)).await;
    manager.set("y.z", json!(2)).await;

    assert_eq!(
        manager.get(None).await,
        Some(json!({ "x": 1, "y": { "z": 2 } }))
    );
}

#[tokio::test]
async fn test_get_missing_path_is_absent() {
    let manager = DynaManager::new();
    assert_eq!(manager.get(Some("never.set")).await, None);
}

// ===== MERGE TESTS =====

#[tokio::test]
async fn test_merge_is_shallow() {
    let manager = DynaManager::new();
    manager.set("p", json!({ "x": 1, "y": 2 })).await;
    manager.merge("p", json!({ "y": 3, "z": 4 })).await;

    assert_eq!(
        manager.get(Some("p")).await,
        Some(json!({ "x": 1, "y": 3, "z": 4 }))
    );
}

#[tokio::test]
async fn test_merge_onto_non_object_starts_empty() {
    let manager = DynaManager::new();
    manager.set("p", json!(42)).await;
    manager.merge("p", json!({ "a": 1 })).await;

    assert_eq!(manager.get(Some("p")).await, Some(json!({ "a": 1 })));
}

#[tokio::test]
async fn test_merge_onto_absent_path() {
    let manager = DynaManager::new();
    manager.merge("fresh", json!({ "a": 1 })).await;

    assert_eq!(manager.get(Some("fresh")).await, Some(json!({ "a": 1 })));
}

// ===== SUBSCRIPTION TESTS =====

#[tokio::test]
async fn test_subscribe_delivers_current_value_immediately() {
    let manager = DynaManager::new();
    manager.set("p", json!("initial")).await;

    let (callback, seen) = collecting_callback();
    let subscription = manager.subscribe(callback, Some("p")).await;

    assert_eq!(*seen.lock().unwrap(), vec![Some(json!("initial"))]);
    subscription.unsubscribe();
}

#[tokio::test]
async fn test_subscriber_dedups_deep_equal_values() {
    let manager = DynaManager::new();
    let (callback, seen) = collecting_callback();
    let _subscription = manager.subscribe(callback, Some("p")).await;

    // Two writes with structurally equal payloads
    manager.set("p", json!({ "a": 1 })).await;
    manager.set("p", json!({ "a": 1 })).await;

    let values = seen.lock().unwrap().clone();
    // Initial delivery (absent) plus exactly one change
    assert_eq!(values, vec![None, Some(json!({ "a": 1 }))]);
}

#[tokio::test]
async fn test_subscriber_sees_each_distinct_value() {
    let manager = DynaManager::new();
    let (callback, seen) = collecting_callback();
    let _subscription = manager.subscribe(callback, Some("p")).await;

    manager.set("p", json!(1)).await;
    manager.set("p", json!(2)).await;

    let values = seen.lock().unwrap().clone();
    assert_eq!(values, vec![None, Some(json!(1)), Some(json!(2))]);
}

#[tokio::test]
async fn test_set_notifies_exact_path_only() {
    let manager = DynaManager::new();
    let (callback, seen) = collecting_callback();
    let _subscription = manager.subscribe(callback, Some("a")).await;

    // A write below the watched path is not an exact match
    manager.set("a.b", json!(5)).await;

    let values = seen.lock().unwrap().clone();
    assert_eq!(values, vec![None]);
}

#[tokio::test]
async fn test_whole_tree_subscriber_sees_any_change() {
    let manager = DynaManager::new();
    let (callback, seen) = collecting_callback();
    let _subscription = manager.subscribe(callback, None).await;

    manager.set("a.b", json!(5)).await;

    let values = seen.lock().unwrap().clone();
    assert_eq!(values.len(), 2);
    assert_eq!(values[1], Some(json!({ "a": { "b": 5 } })));
}

#[tokio::test]
async fn test_unsubscribe_stops_deliveries() {
    let manager = DynaManager::new();
    let (callback, seen) = collecting_callback();
    let subscription = manager.subscribe(callback, Some("p")).await;

    subscription.unsubscribe();
    manager.set("p", json!(1)).await;

    assert_eq!(*seen.lock().unwrap(), vec![None]);
}

// ===== BULK SET TESTS =====

#[tokio::test]
async fn test_bulk_set_applies_every_path() {
    let manager = DynaManager::new();
    let mut values = HashMap::new();
    values.insert("a".to_string(), json!(1));
    values.insert("b.c".to_string(), json!(2));
    manager.bulk_set(values).await;

    assert_eq!(manager.get(Some("a")).await, Some(json!(1)));
    assert_eq!(manager.get(Some("b.c")).await, Some(json!(2)));
}

#[tokio::test]
async fn test_bulk_set_notifies_beyond_exact_matches() {
    let manager = DynaManager::new();
    let (callback, seen) = collecting_callback();
    // Watching "a" while the bulk write touches "a.b"
    let _subscription = manager.subscribe(callback, Some("a")).await;

    let mut values = HashMap::new();
    values.insert("a.b".to_string(), json!(5));
    manager.bulk_set(values).await;

    let values_seen = seen.lock().unwrap().clone();
    assert_eq!(values_seen, vec![None, Some(json!({ "b": 5 }))]);
}

// ===== RESET TESTS =====

#[tokio::test]
async fn test_reset_clears_previous_state() {
    let manager = DynaManager::new();
    manager.set("a.b", json!(1)).await;
    manager.set("c", json!(2)).await;

    manager.reset(None).await;

    assert_eq!(manager.get(Some("a.b")).await, None);
    assert_eq!(manager.get(Some("c")).await, None);
    assert!(manager.layers().memory().is_empty());
}

#[tokio::test]
async fn test_reset_with_payload_seeds_tree() {
    let manager = DynaManager::new();
    manager.set("old", json!(1)).await;

    manager.reset(Some(json!({ "fresh": { "value": true } }))).await;

    assert_eq!(manager.get(Some("old")).await, None);
    assert_eq!(manager.get(Some("fresh.value")).await, Some(json!(true)));
}

#[tokio::test]
async fn test_reset_notifies_subscribers() {
    let manager = DynaManager::new();
    manager.set("p", json!("before")).await;

    let (callback, seen) = collecting_callback();
    let _subscription = manager.subscribe(callback, Some("p")).await;

    manager.reset(None).await;

    let values = seen.lock().unwrap().clone();
    assert_eq!(values, vec![Some(json!("before")), None]);
}
