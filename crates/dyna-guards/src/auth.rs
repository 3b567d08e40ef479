//! Authentication guard
//!
//! Inspects the bearer token held in durable storage: presence, segment
//! format, expiry (with optional refresh), and an optional server-side
//! validation round trip. Fails closed: any failure clears both token
//! keys before the error propagates, and redirects to the login view
//! when a navigator is available.

use std::sync::Arc;

use async_trait::async_trait;
use dyna_core_types::Sensitive;
use dyna_store::{Clock, StorageBackend, SystemClock};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;

use crate::context::{AuthenticatedUser, MiddlewareContext, NavigateOptions};
use crate::errors::{AuthCode, GuardError, Result};
use crate::jwt::decode_claims;
use crate::manager::Middleware;

/// Tunables for the authentication guard
#[derive(Debug, Clone)]
pub struct AuthGuardOptions {
    /// Storage key of the access token
    pub token_key: String,
    /// Storage key of the refresh token
    pub refresh_token_key: String,
    /// Attempt a refresh when the token is expired
    pub auto_refresh: bool,
    /// Redirect to the login view on failure (when a navigator exists)
    pub redirect_on_fail: bool,
    /// Endpoint for the refresh round trip
    pub refresh_endpoint: Option<String>,
    /// Endpoint for server-side token validation; unset skips the round trip
    pub validation_endpoint: Option<String>,
    /// Login view for failure redirects
    pub login_path: String,
}

impl Default for AuthGuardOptions {
    fn default() -> Self {
        Self {
            token_key: "auth_token".to_string(),
            refresh_token_key: "refresh_token".to_string(),
            auto_refresh: true,
            redirect_on_fail: true,
            refresh_endpoint: None,
            validation_endpoint: None,
            login_path: "/login".to_string(),
        }
    }
}

impl AuthGuardOptions {
    pub fn with_token_key(mut self, key: impl Into<String>) -> Self {
        self.token_key = key.into();
        self
    }

    pub fn with_refresh_token_key(mut self, key: impl Into<String>) -> Self {
        self.refresh_token_key = key.into();
        self
    }

    pub fn with_auto_refresh(mut self, auto_refresh: bool) -> Self {
        self.auto_refresh = auto_refresh;
        self
    }

    pub fn with_redirect_on_fail(mut self, redirect: bool) -> Self {
        self.redirect_on_fail = redirect;
        self
    }

    pub fn with_refresh_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.refresh_endpoint = Some(endpoint.into());
        self
    }

    pub fn with_validation_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.validation_endpoint = Some(endpoint.into());
        self
    }

    pub fn with_login_path(mut self, path: impl Into<String>) -> Self {
        self.login_path = path.into();
        self
    }
}

/// Successful authentication outcome
#[derive(Debug, Clone)]
pub struct AuthResult {
    pub user: AuthenticatedUser,
    pub token: Sensitive<String>,
}

impl AuthResult {
    /// Context patch merged into the pipeline on success
    pub fn to_value(&self) -> Value {
        json!({
            "user": self.user,
            "token": self.token.expose(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(default, rename = "refreshToken")]
    refresh_token: Option<String>,
}

/// Token-inspecting guard over a durable storage backend
pub struct AuthGuard {
    storage: Arc<dyn StorageBackend>,
    options: AuthGuardOptions,
    clock: Arc<dyn Clock>,
    http: reqwest::Client,
}

impl AuthGuard {
    /// Guard over the given storage with the given options
    pub fn new(storage: Arc<dyn StorageBackend>, options: AuthGuardOptions) -> Self {
        Self {
            storage,
            options,
            clock: Arc::new(SystemClock),
            http: reqwest::Client::new(),
        }
    }

    /// Override the time source used for expiry checks
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Run the full authentication check
    ///
    /// # Errors
    ///
    /// `GuardError::Authentication` with one of `NO_TOKEN`,
    /// `INVALID_TOKEN_FORMAT`, `TOKEN_EXPIRED`, `REFRESH_FAILED` or
    /// `SERVER_VALIDATION_FAILED`; both token keys are removed from
    /// storage before the error is returned.
    pub async fn check(&self, context: &MiddlewareContext) -> Result<AuthResult> {
        match self.authenticate().await {
            Ok(result) => Ok(result),
            Err(error) => {
                self.clear_tokens();
                self.redirect_on_failure(context, &error);
                Err(error)
            }
        }
    }

    async fn authenticate(&self) -> Result<AuthResult> {
        let token = self.read_storage(&self.options.token_key);
        let refresh_token = self.read_storage(&self.options.refresh_token_key);

        let Some(mut token) = token else {
            return Err(self.auth_error(AuthCode::NoToken, "no authentication token found"));
        };

        let Some(mut claims) = decode_claims(&token) else {
            return Err(self.auth_error(AuthCode::InvalidTokenFormat, "invalid token format"));
        };

        if claims.is_expired(self.clock.now()) {
            let refresh_token = match refresh_token {
                Some(refresh) if self.options.auto_refresh => refresh,
                _ => return Err(self.auth_error(AuthCode::TokenExpired, "token has expired")),
            };
            if let Err(reason) = self.refresh_tokens(&refresh_token).await {
                return Err(self.auth_error(
                    AuthCode::RefreshFailed,
                    format!("token refresh failed: {reason}"),
                ));
            }
            // Continue with the rotated token
            if let Some(rotated) = self.read_storage(&self.options.token_key) {
                match decode_claims(&rotated) {
                    Some(rotated_claims) => {
                        claims = rotated_claims;
                        token = rotated;
                    }
                    None => {
                        return Err(self.auth_error(
                            AuthCode::InvalidTokenFormat,
                            "refreshed token has invalid format",
                        ))
                    }
                }
            }
        }

        if let Some(endpoint) = &self.options.validation_endpoint {
            if !self.validate_with_server(&token, endpoint).await {
                return Err(
                    self.auth_error(AuthCode::ServerValidationFailed, "token validation failed")
                );
            }
        }

        Ok(AuthResult {
            user: claims.into_user(),
            token: Sensitive::new(token),
        })
    }

    async fn refresh_tokens(&self, refresh_token: &str) -> std::result::Result<(), String> {
        let Some(endpoint) = &self.options.refresh_endpoint else {
            return Err("no refresh endpoint configured".to_string());
        };

        let response = self
            .http
            .post(endpoint)
            .json(&json!({ "refreshToken": refresh_token }))
            .send()
            .await
            .map_err(|e| e.to_string())?;

        if !response.status().is_success() {
            return Err(format!("refresh endpoint returned {}", response.status()));
        }

        let body: RefreshResponse = response.json().await.map_err(|e| e.to_string())?;
        if let Some(token) = body.token {
            self.write_storage(&self.options.token_key, &token);
        }
        if let Some(refresh_token) = body.refresh_token {
            self.write_storage(&self.options.refresh_token_key, &refresh_token);
        }
        Ok(())
    }

    async fn validate_with_server(&self, token: &str, endpoint: &str) -> bool {
        match self
            .http
            .get(endpoint)
            .bearer_auth(token)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    /// Remove both token keys; failures are logged, not raised
    fn clear_tokens(&self) {
        for key in [&self.options.token_key, &self.options.refresh_token_key] {
            if let Err(error) = self.storage.remove(key) {
                warn!(storage_key = %key, %error, "failed to clear credential");
            }
        }
    }

    fn redirect_on_failure(&self, context: &MiddlewareContext, error: &GuardError) {
        let GuardError::Authentication { code, .. } = error else {
            return;
        };
        if !self.options.redirect_on_fail {
            return;
        }
        let Some(navigator) = context.navigator() else {
            return;
        };

        let target = format!("{}?reason={}", self.options.login_path, code);
        navigator.navigate(
            &target,
            &NavigateOptions {
                replace: true,
                state: Some(json!({
                    "redirect": context.location().pathname,
                    "reason": code.code(),
                })),
            },
        );
    }

    fn read_storage(&self, key: &str) -> Option<String> {
        match self.storage.get(key) {
            Ok(value) => value,
            Err(error) => {
                warn!(storage_key = %key, %error, "credential storage read failed");
                None
            }
        }
    }

    fn write_storage(&self, key: &str, value: &str) {
        if let Err(error) = self.storage.set(key, value) {
            warn!(storage_key = %key, %error, "credential storage write failed");
        }
    }

    fn auth_error(&self, code: AuthCode, message: impl Into<String>) -> GuardError {
        GuardError::Authentication {
            code,
            message: message.into(),
            redirect_to: self.options.login_path.clone(),
            timestamp: self.clock.now(),
        }
    }
}

#[async_trait]
impl Middleware for AuthGuard {
    async fn handle(&self, context: &MiddlewareContext) -> Result<Value> {
        self.check(context).await.map(|result| result.to_value())
    }
}
