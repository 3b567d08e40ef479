//! Permission guard
//!
//! Resolves the caller's permission set — context user first, then an
//! injected resolver, then durable storage (stored list, falling back to
//! token claims) — and evaluates it against the required permissions in
//! one of three modes. An optional custom check runs before the mode
//! evaluation and can deny unilaterally.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use dyna_store::StorageBackend;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::warn;

use crate::context::{AuthenticatedUser, MiddlewareContext, NavigateOptions};
use crate::errors::{GuardError, PermissionCode, Result};
use crate::jwt::decode_claims;
use crate::manager::Middleware;

/// How required permissions are evaluated against held permissions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CheckMode {
    /// Every required permission must be held
    #[default]
    Every,
    /// At least one required permission must be held
    Some,
    /// None of the required permissions may be held
    None,
}

/// Async source of the caller's permissions, injected ahead of storage
#[async_trait]
pub trait PermissionResolver: Send + Sync {
    async fn resolve(&self) -> Vec<String>;
}

/// Inputs handed to a custom check
pub struct CustomCheckParams<'a> {
    pub required_permissions: &'a [String],
    pub user_permissions: &'a [String],
    pub user: Option<AuthenticatedUser>,
    pub context: &'a MiddlewareContext,
}

/// Verdict of a custom check
#[derive(Debug, Clone, Default)]
pub struct CustomCheckResult {
    pub granted: bool,
    pub message: Option<String>,
}

/// Hook evaluated before the mode-based check; can deny unilaterally
#[async_trait]
pub trait CustomCheck: Send + Sync {
    async fn check(&self, params: CustomCheckParams<'_>) -> CustomCheckResult;
}

/// Successful permission outcome, merged into the pipeline context
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionOutcome {
    pub granted: bool,
    pub user_permissions: Vec<String>,
    pub required_permissions: Vec<String>,
    pub missing_permissions: Vec<String>,
}

/// Permission-evaluating guard over a durable storage backend
pub struct PermissionGuard {
    required: Vec<String>,
    storage: Arc<dyn StorageBackend>,
    check_mode: CheckMode,
    redirect_on_fail: bool,
    access_denied_path: String,
    permissions_key: String,
    token_key: String,
    resolver: Option<Arc<dyn PermissionResolver>>,
    custom_check: Option<Arc<dyn CustomCheck>>,
}

impl PermissionGuard {
    /// Guard requiring the given permissions, read through the given
    /// storage when the context carries no user
    pub fn new(required: Vec<String>, storage: Arc<dyn StorageBackend>) -> Self {
        Self {
            required,
            storage,
            check_mode: CheckMode::default(),
            redirect_on_fail: true,
            access_denied_path: "/access-denied".to_string(),
            permissions_key: "user_permissions".to_string(),
            token_key: "auth_token".to_string(),
            resolver: None,
            custom_check: None,
        }
    }

    pub fn with_check_mode(mut self, mode: CheckMode) -> Self {
        self.check_mode = mode;
        self
    }

    pub fn with_redirect_on_fail(mut self, redirect: bool) -> Self {
        self.redirect_on_fail = redirect;
        self
    }

    pub fn with_access_denied_path(mut self, path: impl Into<String>) -> Self {
        self.access_denied_path = path.into();
        self
    }

    pub fn with_permissions_key(mut self, key: impl Into<String>) -> Self {
        self.permissions_key = key.into();
        self
    }

    pub fn with_token_key(mut self, key: impl Into<String>) -> Self {
        self.token_key = key.into();
        self
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn PermissionResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn with_custom_check(mut self, check: Arc<dyn CustomCheck>) -> Self {
        self.custom_check = Some(check);
        self
    }

    /// Run the full permission check
    ///
    /// # Errors
    ///
    /// `GuardError::Permission` with one of `INVALID_PERMISSIONS_FORMAT`,
    /// `CUSTOM_CHECK_FAILED` or `INSUFFICIENT_PERMISSIONS`, carrying the
    /// required/held/missing sets.
    pub async fn check(&self, context: &MiddlewareContext) -> Result<PermissionOutcome> {
        match self.evaluate(context).await {
            Ok(outcome) => Ok(outcome),
            Err(error) => {
                self.redirect_on_failure(context, &error);
                Err(error)
            }
        }
    }

    async fn evaluate(&self, context: &MiddlewareContext) -> Result<PermissionOutcome> {
        // Nothing required grants trivially
        if self.required.is_empty() {
            return Ok(PermissionOutcome {
                granted: true,
                user_permissions: Vec::new(),
                required_permissions: Vec::new(),
                missing_permissions: Vec::new(),
            });
        }

        let held = self.resolve_permissions(context).await?;

        if let Some(custom) = &self.custom_check {
            let verdict = custom
                .check(CustomCheckParams {
                    required_permissions: &self.required,
                    user_permissions: &held,
                    user: context.user(),
                    context,
                })
                .await;
            if !verdict.granted {
                return Err(self.permission_error(
                    PermissionCode::CustomCheckFailed,
                    verdict
                        .message
                        .unwrap_or_else(|| "custom permission check failed".to_string()),
                    held,
                    Vec::new(),
                ));
            }
        }

        let (granted, missing) = self.apply_mode(&held);
        if !granted {
            return Err(self.permission_error(
                PermissionCode::InsufficientPermissions,
                format!(
                    "insufficient permissions. required: {}. missing: {}. held: {}",
                    self.required.join(", "),
                    missing.join(", "),
                    held.join(", "),
                ),
                held,
                missing,
            ));
        }

        Ok(PermissionOutcome {
            granted: true,
            user_permissions: held,
            required_permissions: self.required.clone(),
            missing_permissions: missing,
        })
    }

    /// Permission source priority: context user → resolver → storage
    async fn resolve_permissions(&self, context: &MiddlewareContext) -> Result<Vec<String>> {
        if let Some(raw_user) = context.value("user") {
            return match serde_json::from_value::<AuthenticatedUser>(raw_user.clone()) {
                Ok(user) => Ok(user.permissions),
                Err(_) => Err(self.permission_error(
                    PermissionCode::InvalidPermissionsFormat,
                    "invalid user permissions format",
                    Vec::new(),
                    Vec::new(),
                )),
            };
        }

        if let Some(resolver) = &self.resolver {
            return Ok(resolver.resolve().await);
        }

        if let Some(raw) = self.read_storage(&self.permissions_key) {
            return match serde_json::from_str::<Value>(&raw) {
                Ok(value) => self.permissions_from_value(value),
                // Undecodable stored list degrades to "no permissions"
                Err(_) => Ok(Vec::new()),
            };
        }

        if let Some(token) = self.read_storage(&self.token_key) {
            if let Some(claims) = decode_claims(&token) {
                return Ok(claims.permissions);
            }
        }

        Ok(Vec::new())
    }

    fn permissions_from_value(&self, value: Value) -> Result<Vec<String>> {
        let invalid = || {
            self.permission_error(
                PermissionCode::InvalidPermissionsFormat,
                "invalid user permissions format",
                Vec::new(),
                Vec::new(),
            )
        };
        let Value::Array(items) = value else {
            return Err(invalid());
        };
        items
            .into_iter()
            .map(|item| match item {
                Value::String(s) => Ok(s),
                _ => Err(invalid()),
            })
            .collect()
    }

    fn apply_mode(&self, held: &[String]) -> (bool, Vec<String>) {
        match self.check_mode {
            CheckMode::Every => {
                let missing: Vec<String> = self
                    .required
                    .iter()
                    .filter(|p| !held.contains(p))
                    .cloned()
                    .collect();
                (missing.is_empty(), missing)
            }
            CheckMode::Some => {
                let granted = self.required.iter().any(|p| held.contains(p));
                // Ungranted reports the whole required list, not the
                // absent subset
                let missing = if granted {
                    Vec::new()
                } else {
                    self.required.clone()
                };
                (granted, missing)
            }
            CheckMode::None => {
                let offending: Vec<String> = self
                    .required
                    .iter()
                    .filter(|p| held.contains(p))
                    .cloned()
                    .collect();
                (offending.is_empty(), offending)
            }
        }
    }

    fn redirect_on_failure(&self, context: &MiddlewareContext, error: &GuardError) {
        let GuardError::Permission {
            code,
            required_permissions,
            user_permissions,
            missing_permissions,
            ..
        } = error
        else {
            return;
        };
        if !self.redirect_on_fail {
            return;
        }
        let Some(navigator) = context.navigator() else {
            return;
        };

        navigator.navigate(
            &self.access_denied_path,
            &NavigateOptions {
                replace: true,
                state: Some(json!({
                    "reason": code.code(),
                    "requiredPermissions": required_permissions,
                    "userPermissions": user_permissions,
                    "missingPermissions": missing_permissions,
                })),
            },
        );
    }

    fn read_storage(&self, key: &str) -> Option<String> {
        match self.storage.get(key) {
            Ok(value) => value,
            Err(error) => {
                warn!(storage_key = %key, %error, "permission storage read failed");
                None
            }
        }
    }

    fn permission_error(
        &self,
        code: PermissionCode,
        message: impl Into<String>,
        held: Vec<String>,
        missing: Vec<String>,
    ) -> GuardError {
        GuardError::Permission {
            code,
            message: message.into(),
            required_permissions: self.required.clone(),
            user_permissions: held,
            missing_permissions: missing,
            timestamp: Utc::now(),
        }
    }
}

#[async_trait]
impl Middleware for PermissionGuard {
    async fn handle(&self, context: &MiddlewareContext) -> Result<Value> {
        self.check(context).await.map(|outcome| {
            serde_json::to_value(&outcome).unwrap_or(Value::Null)
        })
    }
}
