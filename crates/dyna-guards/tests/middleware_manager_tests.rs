mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dyna_guards::{
    from_fn, ContextOverlay, GuardError, Location, MiddlewareContext, MiddlewareManager,
};
use serde_json::json;

// ===== REGISTRATION TESTS =====

#[tokio::test]
async fn test_register_and_unregister() {
    let manager = MiddlewareManager::new();
    manager.register("noop", from_fn(|_ctx| async { Ok(json!(null)) }));

    assert_eq!(manager.registered().len(), 1);
    assert!(manager.unregister("noop"));
    assert!(!manager.unregister("noop"));
    assert!(manager.registered().is_empty());
}

#[tokio::test]
async fn test_reregistering_a_name_overwrites_silently() {
    let manager = MiddlewareManager::new();
    manager.register("guard", from_fn(|_ctx| async { Ok(json!({ "v": 1 })) }));
    manager.register("guard", from_fn(|_ctx| async { Ok(json!({ "v": 2 })) }));

    let result = manager
        .execute_by_name(&["guard"], ContextOverlay::new())
        .await
        .unwrap();
    assert_eq!(result.context.value("v"), Some(&json!(2)));
}

#[tokio::test]
async fn test_set_status_unknown_name_returns_false() {
    let manager = MiddlewareManager::new();
    assert!(!manager.set_status("ghost", false));

    manager.register("real", from_fn(|_ctx| async { Ok(json!(null)) }));
    assert!(manager.set_status("real", false));
    assert!(!manager.registered()[0].enabled);
}

// ===== EXECUTION TESTS =====

#[tokio::test]
async fn test_handlers_run_in_order_and_accumulate_context() {
    let manager = MiddlewareManager::new();
    let h1 = from_fn(|_ctx| async { Ok(json!({ "first": 1 })) });
    // The second handler sees what the first one merged
    let h2 = from_fn(|ctx: MiddlewareContext| async move {
        let first = ctx.value("first").cloned().unwrap_or(json!(null));
        Ok(json!({ "second": first }))
    });

    let result = manager
        .execute(&[h1, h2], ContextOverlay::new())
        .await
        .unwrap();
    assert_eq!(result.context.value("first"), Some(&json!(1)));
    assert_eq!(result.context.value("second"), Some(&json!(1)));
}

#[tokio::test]
async fn test_first_rejection_short_circuits() {
    let manager = MiddlewareManager::new();
    let ran = Arc::new(AtomicUsize::new(0));

    let h1 = from_fn(|_ctx| async {
        Err(GuardError::NotRegistered {
            name: "simulated failure".into(),
        })
    });
    let counter = ran.clone();
    let h2 = from_fn(move |_ctx| {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(json!(null))
        }
    });

    let result = manager.execute(&[h1, h2], ContextOverlay::new()).await;
    assert!(matches!(result, Err(GuardError::NotRegistered { .. })));
    assert_eq!(ran.load(Ordering::SeqCst), 0, "h2 must never run");
}

#[tokio::test]
async fn test_non_object_results_merge_nothing() {
    let manager = MiddlewareManager::new();
    let h = from_fn(|_ctx| async { Ok(json!("scalar result")) });

    let result = manager.execute(&[h], ContextOverlay::new()).await.unwrap();
    assert!(result.context.values().is_empty());
    assert_eq!(
        result.results.get("middleware_0").unwrap().data,
        json!("scalar result")
    );
}

#[tokio::test]
async fn test_results_keyed_by_registered_name() {
    let manager = MiddlewareManager::new();
    let named = from_fn(|_ctx| async { Ok(json!({ "ok": true })) });
    manager.register("known", named.clone());
    let anonymous = from_fn(|_ctx| async { Ok(json!(null)) });

    let result = manager
        .execute(&[named, anonymous], ContextOverlay::new())
        .await
        .unwrap();
    assert!(result.results.contains_key("known"));
    assert!(result.results.contains_key("middleware_1"));
    assert!(result.results.get("known").unwrap().success);
}

// ===== EXECUTE BY NAME TESTS =====

#[tokio::test]
async fn test_execute_by_name_unknown_name_fails_before_any_handler() {
    let manager = MiddlewareManager::new();
    let ran = Arc::new(AtomicUsize::new(0));
    let counter = ran.clone();
    manager.register(
        "present",
        from_fn(move |_ctx| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(json!(null))
            }
        }),
    );

    let result = manager
        .execute_by_name(&["present", "absent"], ContextOverlay::new())
        .await;

    match result {
        Err(GuardError::NotRegistered { name }) => assert_eq!(name, "absent"),
        other => panic!("expected NotRegistered, got {other:?}"),
    }
    assert_eq!(ran.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_execute_by_name_skips_disabled_entries() {
    let manager = MiddlewareManager::new();
    let ran = Arc::new(AtomicUsize::new(0));
    let counter = ran.clone();
    manager.register(
        "disabled",
        from_fn(move |_ctx| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(json!(null))
            }
        }),
    );
    manager.set_status("disabled", false);
    manager.register("enabled", from_fn(|_ctx| async { Ok(json!({ "ran": true })) }));

    let result = manager
        .execute_by_name(&["disabled", "enabled"], ContextOverlay::new())
        .await
        .unwrap();

    assert_eq!(ran.load(Ordering::SeqCst), 0);
    assert_eq!(result.context.value("ran"), Some(&json!(true)));
}

// ===== CONTEXT TESTS =====

#[tokio::test]
async fn test_manager_context_merges_under_local_context() {
    let manager = MiddlewareManager::new();
    manager.set_context(
        ContextOverlay::new()
            .with_location(Location::new("/default"))
            .with_value("shared", json!("manager")),
    );

    let echo = from_fn(|ctx: MiddlewareContext| async move {
        Ok(json!({
            "seen_pathname": ctx.location().pathname,
            "seen_shared": ctx.value("shared").cloned(),
        }))
    });

    // Local overlay overrides the location but inherits the value
    let result = manager
        .execute(
            &[echo],
            ContextOverlay::new().with_location(Location::new("/local")),
        )
        .await
        .unwrap();

    assert_eq!(result.context.value("seen_pathname"), Some(&json!("/local")));
    assert_eq!(
        result.context.value("seen_shared"),
        Some(&json!("manager"))
    );
}

#[tokio::test]
async fn test_clear_context_restores_defaults() {
    let manager = MiddlewareManager::new();
    manager.set_context(
        ContextOverlay::new()
            .with_location(Location::new("/somewhere"))
            .with_value("k", json!(1)),
    );
    manager.clear_context();

    let context = manager.get_context();
    assert_eq!(context.location().pathname, "/");
    assert!(context.values().is_empty());
    assert!(context.navigator().is_none());
}

#[tokio::test]
async fn test_get_context_returns_a_copy() {
    let manager = MiddlewareManager::new();
    let mut copy = manager.get_context();
    copy.insert("mutated", json!(true));

    assert!(manager.get_context().value("mutated").is_none());
}
