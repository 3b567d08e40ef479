//! Unverified JWT claim extraction
//!
//! The guard pipeline decodes the claim segment of a bearer token to read
//! identity and permissions. Signatures are NOT verified here — the
//! server is the trust boundary, and nothing decoded this way is a
//! security control on its own.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::context::AuthenticatedUser;

/// Claim set carried in the token's middle segment
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TokenClaims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
    /// Expiry as Unix seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    /// Issued-at as Unix seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
}

impl TokenClaims {
    /// Identity view of these claims
    pub fn into_user(self) -> AuthenticatedUser {
        AuthenticatedUser {
            id: self.sub,
            email: self.email,
            roles: self.roles,
            permissions: self.permissions,
        }
    }

    /// Whether the `exp` claim is at or before `now`
    ///
    /// Tokens without an `exp` claim never expire.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.exp {
            Some(exp) => now.timestamp() >= exp,
            None => false,
        }
    }
}

/// Decode the claim segment of a bearer token
///
/// Requires exactly three dot-delimited segments; the middle segment must
/// be base64url-encoded JSON. Returns `None` for anything else.
pub fn decode_claims(token: &str) -> Option<TokenClaims> {
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 {
        return None;
    }
    let payload = URL_SAFE_NO_PAD.decode(segments[1]).ok()?;
    serde_json::from_slice(&payload).ok()
}
