//! dyna-guards - Async guard pipeline for gated navigation
//!
//! This crate provides the policy side of dynastate:
//! - `MiddlewareManager`, a named registry of async guard functions
//!   executed strictly in order against a shared, accumulating context
//! - An authentication guard over a durable token store (presence,
//!   format, expiry, refresh, optional server validation; fail closed)
//! - A permission guard with every/some/none check modes, pluggable
//!   permission resolution and a custom-check hook
//! - Unverified JWT claim decoding (the server is the trust boundary)
//!
//! Denials are structured errors carrying stable codes and, for
//! permissions, the required/held/missing sets — enough for a consumer
//! to render a specific explanation rather than a generic failure.

pub mod auth;
pub mod context;
pub mod errors;
pub mod jwt;
pub mod manager;
pub mod permission;

// Re-export commonly used types
pub use auth::{AuthGuard, AuthGuardOptions, AuthResult};
pub use context::{
    AuthenticatedUser, ContextOverlay, Location, MiddlewareContext, NavigateOptions, Navigator,
};
pub use errors::{AuthCode, GuardError, PermissionCode, Result};
pub use jwt::{decode_claims, TokenClaims};
pub use manager::{
    from_fn, ExecutionResult, Middleware, MiddlewareManager, MiddlewareResult,
    RegisteredMiddleware,
};
pub use permission::{
    CheckMode, CustomCheck, CustomCheckParams, CustomCheckResult, PermissionGuard,
    PermissionOutcome, PermissionResolver,
};
