//! End-to-end pipeline runs: authentication feeding permission through
//! the shared context, the way a route guard composes them.

mod common;

use std::sync::Arc;

use common::{credential_storage, token_with_claims, RecordingNavigator};
use dyna_guards::{
    AuthGuard, AuthGuardOptions, CheckMode, ContextOverlay, GuardError, Location,
    MiddlewareManager, PermissionGuard,
};
use dyna_store::{ManualClock, SessionBackend, StorageBackend};
use serde_json::json;

const NOW_SECS: i64 = 1_000_000;

fn frozen_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::at_epoch_millis(NOW_SECS * 1_000))
}

/// Register the standard pipeline: authentication, then permission
fn pipeline(
    storage: Arc<SessionBackend>,
    required: &[&str],
    mode: CheckMode,
) -> MiddlewareManager {
    let manager = MiddlewareManager::new();
    manager.register(
        "authentication",
        Arc::new(
            AuthGuard::new(storage.clone(), AuthGuardOptions::default())
                .with_clock(frozen_clock()),
        ),
    );
    manager.register(
        "permission",
        Arc::new(
            PermissionGuard::new(
                required.iter().map(|p| p.to_string()).collect(),
                storage,
            )
            .with_check_mode(mode),
        ),
    );
    manager
}

#[tokio::test]
async fn test_authenticated_user_with_permissions_is_granted() {
    let storage = credential_storage();
    let token = token_with_claims(&json!({
        "sub": "u1",
        "email": "user@example.com",
        "permissions": ["dashboard.view", "dashboard.edit"],
        "exp": NOW_SECS + 3_600,
    }));
    storage.set("auth_token", &token).unwrap();

    let manager = pipeline(storage, &["dashboard.view"], CheckMode::Every);
    let result = manager
        .execute_by_name(&["authentication", "permission"], ContextOverlay::new())
        .await
        .unwrap();

    assert!(result.results.contains_key("authentication"));
    assert!(result.results.contains_key("permission"));

    // Authentication injected the user the permission guard consumed
    let user = result.context.user().expect("user in context");
    assert_eq!(user.id.as_deref(), Some("u1"));
    assert_eq!(
        result.context.value("granted"),
        Some(&json!(true)),
        "permission outcome should be merged into the context"
    );
}

#[tokio::test]
async fn test_missing_permission_denies_after_successful_authentication() {
    let storage = credential_storage();
    let token = token_with_claims(&json!({
        "sub": "u1",
        "permissions": ["dashboard.view"],
        "exp": NOW_SECS + 3_600,
    }));
    storage.set("auth_token", &token).unwrap();

    let manager = pipeline(storage, &["admin.panel"], CheckMode::Every);
    let result = manager
        .execute_by_name(&["authentication", "permission"], ContextOverlay::new())
        .await;

    match result {
        Err(GuardError::Permission {
            missing_permissions,
            user_permissions,
            ..
        }) => {
            assert_eq!(missing_permissions, vec!["admin.panel"]);
            assert_eq!(user_permissions, vec!["dashboard.view"]);
        }
        other => panic!("expected permission denial, got {other:?}"),
    }
}

#[tokio::test]
async fn test_unauthenticated_run_stops_before_permission_guard() {
    let storage = credential_storage();
    let navigator = RecordingNavigator::new();

    let manager = pipeline(storage, &["anything"], CheckMode::Every);
    let result = manager
        .execute_by_name(
            &["authentication", "permission"],
            ContextOverlay::new()
                .with_navigator(navigator.clone())
                .with_location(Location::new("/protected")),
        )
        .await;

    assert!(matches!(
        result,
        Err(GuardError::Authentication { .. })
    ));

    // Only the auth guard redirected; the permission guard never ran
    assert_eq!(navigator.call_count(), 1);
    let (path, _) = navigator.last_call().unwrap();
    assert!(path.starts_with("/login?reason="));
}

#[tokio::test]
async fn test_denied_permission_redirects_to_access_denied() {
    let storage = credential_storage();
    let token = token_with_claims(&json!({
        "sub": "u1",
        "permissions": [],
        "exp": NOW_SECS + 3_600,
    }));
    storage.set("auth_token", &token).unwrap();
    let navigator = RecordingNavigator::new();

    let manager = pipeline(storage, &["admin.panel"], CheckMode::Every);
    let result = manager
        .execute_by_name(
            &["authentication", "permission"],
            ContextOverlay::new().with_navigator(navigator.clone()),
        )
        .await;

    assert!(result.is_err());
    let (path, options) = navigator.last_call().unwrap();
    assert_eq!(path, "/access-denied");
    let state = options.state.unwrap();
    assert_eq!(state["reason"], json!("INSUFFICIENT_PERMISSIONS"));
    assert_eq!(state["missingPermissions"], json!(["admin.panel"]));
}

#[tokio::test]
async fn test_disabled_permission_guard_lets_authenticated_user_through() {
    let storage = credential_storage();
    let token = token_with_claims(&json!({
        "sub": "u1",
        "permissions": [],
        "exp": NOW_SECS + 3_600,
    }));
    storage.set("auth_token", &token).unwrap();

    let manager = pipeline(storage, &["admin.panel"], CheckMode::Every);
    manager.set_status("permission", false);

    let result = manager
        .execute_by_name(&["authentication", "permission"], ContextOverlay::new())
        .await
        .unwrap();

    assert!(result.results.contains_key("authentication"));
    assert!(!result.results.contains_key("permission"));
}
