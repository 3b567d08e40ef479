//! Middleware registry and sequential executor
//!
//! Named async guard functions are registered once and executed as an
//! ordered pipeline against a shared context. Handlers run strictly in
//! sequence; an object returned by a handler is shallow-merged into the
//! context before the next handler runs, and the first rejection aborts
//! the chain.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, RwLock};
use std::time::Instant;

use async_trait::async_trait;
use dyna_core_types::RequestId;
use dyna_store::{log_op_end, log_op_error, log_op_start};
use serde_json::Value;

use crate::context::{ContextOverlay, MiddlewareContext};
use crate::errors::{GuardError, Result};

/// An async guard function
#[async_trait]
pub trait Middleware: Send + Sync {
    /// Run against the shared context
    ///
    /// An `Ok` object result is shallow-merged into the context for
    /// later handlers; any other `Ok` value is recorded but merges
    /// nothing. An `Err` aborts the pipeline.
    async fn handle(&self, context: &MiddlewareContext) -> Result<Value>;
}

type BoxedHandlerFuture = Pin<Box<dyn Future<Output = Result<Value>> + Send>>;

struct FnMiddleware<F>(F);

#[async_trait]
impl<F> Middleware for FnMiddleware<F>
where
    F: Fn(MiddlewareContext) -> BoxedHandlerFuture + Send + Sync,
{
    async fn handle(&self, context: &MiddlewareContext) -> Result<Value> {
        (self.0)(context.clone()).await
    }
}

/// Wrap an async closure as a middleware
pub fn from_fn<F, Fut>(f: F) -> Arc<dyn Middleware>
where
    F: Fn(MiddlewareContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    Arc::new(FnMiddleware(move |context: MiddlewareContext| {
        let fut: BoxedHandlerFuture = Box::pin(f(context));
        fut
    }))
}

/// One registry entry
#[derive(Clone)]
pub struct RegisteredMiddleware {
    pub name: String,
    pub handler: Arc<dyn Middleware>,
    pub enabled: bool,
}

/// Outcome of one handler within a successful run
#[derive(Debug, Clone, PartialEq)]
pub struct MiddlewareResult {
    pub success: bool,
    pub data: Value,
}

/// Outcome of a whole pipeline run
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    /// Per-handler results keyed by registered name (or a positional
    /// `middleware_<index>` fallback for unregistered handlers)
    pub results: HashMap<String, MiddlewareResult>,
    /// The context after every handler ran
    pub context: MiddlewareContext,
}

/// Named registry of guard functions with a shared default context
pub struct MiddlewareManager {
    registry: RwLock<HashMap<String, RegisteredMiddleware>>,
    context: RwLock<MiddlewareContext>,
}

impl MiddlewareManager {
    /// Empty registry with a default context (no navigator, root location)
    pub fn new() -> Self {
        Self {
            registry: RwLock::new(HashMap::new()),
            context: RwLock::new(MiddlewareContext::new()),
        }
    }

    // ----- Registration API -----

    /// Register (or silently replace) a named middleware, enabled
    pub fn register(&self, name: impl Into<String>, handler: Arc<dyn Middleware>) {
        self.register_with_status(name, handler, true);
    }

    /// Register (or silently replace) a named middleware with an explicit
    /// enabled flag
    pub fn register_with_status(
        &self,
        name: impl Into<String>,
        handler: Arc<dyn Middleware>,
        enabled: bool,
    ) {
        let name = name.into();
        self.registry.write().expect("registry lock poisoned").insert(
            name.clone(),
            RegisteredMiddleware {
                name,
                handler,
                enabled,
            },
        );
    }

    /// Remove a middleware; true when it existed
    pub fn unregister(&self, name: &str) -> bool {
        self.registry
            .write()
            .expect("registry lock poisoned")
            .remove(name)
            .is_some()
    }

    /// Enable or disable a middleware; false when the name is unknown
    pub fn set_status(&self, name: &str, enabled: bool) -> bool {
        let mut registry = self.registry.write().expect("registry lock poisoned");
        match registry.get_mut(name) {
            Some(entry) => {
                entry.enabled = enabled;
                true
            }
            None => false,
        }
    }

    /// Snapshot of every registration
    pub fn registered(&self) -> Vec<RegisteredMiddleware> {
        self.registry
            .read()
            .expect("registry lock poisoned")
            .values()
            .cloned()
            .collect()
    }

    // ----- Context API -----

    /// Merge an overlay into the manager-level default context
    pub fn set_context(&self, overlay: ContextOverlay) -> &Self {
        self.context
            .write()
            .expect("context lock poisoned")
            .apply(overlay);
        self
    }

    /// Copy of the manager-level default context
    pub fn get_context(&self) -> MiddlewareContext {
        self.context.read().expect("context lock poisoned").clone()
    }

    /// Reset the default context (no navigator, root location, no values)
    pub fn clear_context(&self) {
        *self.context.write().expect("context lock poisoned") = MiddlewareContext::new();
    }

    // ----- Execution -----

    /// Execute registered middlewares by name
    ///
    /// Disabled registrations are skipped. An unregistered name fails
    /// immediately, before any handler runs.
    pub async fn execute_by_name(
        &self,
        names: &[&str],
        local: ContextOverlay,
    ) -> Result<ExecutionResult> {
        let handlers = {
            let registry = self.registry.read().expect("registry lock poisoned");
            let mut handlers = Vec::new();
            for name in names {
                match registry.get(*name) {
                    Some(entry) if entry.enabled => handlers.push(entry.handler.clone()),
                    Some(_) => {}
                    None => {
                        return Err(GuardError::NotRegistered {
                            name: (*name).to_string(),
                        })
                    }
                }
            }
            handlers
        };

        self.execute(&handlers, local).await
    }

    /// Execute handlers strictly in order against a shared context
    ///
    /// Each successful object result is merged into the context before
    /// the next handler runs. The first rejection is rethrown and the
    /// partial results up to that point are discarded.
    pub async fn execute(
        &self,
        handlers: &[Arc<dyn Middleware>],
        local: ContextOverlay,
    ) -> Result<ExecutionResult> {
        let request_id = RequestId::new();
        let started = Instant::now();
        log_op_start!(
            "guard_execute",
            request_id = %request_id,
            handlers = handlers.len(),
        );

        let mut context = self.get_context();
        context.apply(local);

        let mut results: HashMap<String, MiddlewareResult> = HashMap::new();
        for (index, handler) in handlers.iter().enumerate() {
            let name = self
                .resolve_name(handler)
                .unwrap_or_else(|| format!("middleware_{index}"));

            match handler.handle(&context).await {
                Ok(data) => {
                    if let Value::Object(patch) = &data {
                        context.merge_values(patch.clone());
                    }
                    results.insert(
                        name,
                        MiddlewareResult {
                            success: true,
                            data,
                        },
                    );
                }
                Err(error) => {
                    log_op_error!(
                        "guard_execute",
                        error,
                        duration_ms = started.elapsed().as_millis() as u64,
                        request_id = %request_id,
                        middleware = %name,
                    );
                    return Err(error);
                }
            }
        }

        log_op_end!(
            "guard_execute",
            duration_ms = started.elapsed().as_millis() as u64,
            request_id = %request_id,
        );
        Ok(ExecutionResult { results, context })
    }

    /// Find the registered name of a handler by identity
    fn resolve_name(&self, handler: &Arc<dyn Middleware>) -> Option<String> {
        let registry = self.registry.read().expect("registry lock poisoned");
        registry
            .values()
            .find(|entry| Arc::ptr_eq(&entry.handler, handler))
            .map(|entry| entry.name.clone())
    }
}

impl Default for MiddlewareManager {
    fn default() -> Self {
        Self::new()
    }
}
