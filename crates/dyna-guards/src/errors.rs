use chrono::{DateTime, Utc};
use thiserror::Error;

/// Result type alias using GuardError
pub type Result<T> = std::result::Result<T, GuardError>;

/// Machine-readable authentication failure reasons
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthCode {
    /// No bearer token in durable storage
    NoToken,
    /// Token is not three dot-delimited base64url segments with a JSON claim set
    InvalidTokenFormat,
    /// The `exp` claim is in the past and no refresh was possible
    TokenExpired,
    /// A refresh was attempted and failed
    RefreshFailed,
    /// The server-side validation round trip rejected the token
    ServerValidationFailed,
}

impl AuthCode {
    /// Get the stable error code for this reason
    pub fn code(&self) -> &'static str {
        match self {
            AuthCode::NoToken => "NO_TOKEN",
            AuthCode::InvalidTokenFormat => "INVALID_TOKEN_FORMAT",
            AuthCode::TokenExpired => "TOKEN_EXPIRED",
            AuthCode::RefreshFailed => "REFRESH_FAILED",
            AuthCode::ServerValidationFailed => "SERVER_VALIDATION_FAILED",
        }
    }
}

impl std::fmt::Display for AuthCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Machine-readable permission failure reasons
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionCode {
    /// The stored or supplied permission set is not a list of strings
    InvalidPermissionsFormat,
    /// The configured custom check denied access
    CustomCheckFailed,
    /// The mode-based evaluation denied access
    InsufficientPermissions,
}

impl PermissionCode {
    /// Get the stable error code for this reason
    pub fn code(&self) -> &'static str {
        match self {
            PermissionCode::InvalidPermissionsFormat => "INVALID_PERMISSIONS_FORMAT",
            PermissionCode::CustomCheckFailed => "CUSTOM_CHECK_FAILED",
            PermissionCode::InsufficientPermissions => "INSUFFICIENT_PERMISSIONS",
        }
    }
}

impl std::fmt::Display for PermissionCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Error taxonomy for the guard pipeline
///
/// Authentication and permission denials carry everything a consumer
/// needs to render a specific explanation; registry errors fire before
/// any handler runs.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GuardError {
    /// Authentication failed; credentials were cleared
    #[error("authentication failed [{code}]: {message}")]
    Authentication {
        code: AuthCode,
        message: String,
        /// Default view to land the denied user on
        redirect_to: String,
        timestamp: DateTime<Utc>,
    },

    /// Permission check denied access
    #[error("permission denied [{code}]: {message}")]
    Permission {
        code: PermissionCode,
        message: String,
        required_permissions: Vec<String>,
        user_permissions: Vec<String>,
        missing_permissions: Vec<String>,
        timestamp: DateTime<Utc>,
    },

    /// `execute_by_name` referenced a name that was never registered
    #[error("middleware '{name}' is not registered")]
    NotRegistered { name: String },
}

impl GuardError {
    /// Get the stable error code
    pub fn code(&self) -> &'static str {
        match self {
            GuardError::Authentication { code, .. } => code.code(),
            GuardError::Permission { code, .. } => code.code(),
            GuardError::NotRegistered { .. } => "MIDDLEWARE_NOT_REGISTERED",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_codes_are_stable() {
        let cases = [
            (AuthCode::NoToken, "NO_TOKEN"),
            (AuthCode::InvalidTokenFormat, "INVALID_TOKEN_FORMAT"),
            (AuthCode::TokenExpired, "TOKEN_EXPIRED"),
            (AuthCode::RefreshFailed, "REFRESH_FAILED"),
            (AuthCode::ServerValidationFailed, "SERVER_VALIDATION_FAILED"),
        ];
        for (code, expected) in cases {
            assert_eq!(code.code(), expected, "Wrong code for {:?}", code);
        }
    }

    #[test]
    fn test_permission_codes_are_stable() {
        let cases = [
            (
                PermissionCode::InvalidPermissionsFormat,
                "INVALID_PERMISSIONS_FORMAT",
            ),
            (PermissionCode::CustomCheckFailed, "CUSTOM_CHECK_FAILED"),
            (
                PermissionCode::InsufficientPermissions,
                "INSUFFICIENT_PERMISSIONS",
            ),
        ];
        for (code, expected) in cases {
            assert_eq!(code.code(), expected, "Wrong code for {:?}", code);
        }
    }

    #[test]
    fn test_guard_error_exposes_inner_code() {
        let err = GuardError::NotRegistered {
            name: "authentication".into(),
        };
        assert_eq!(err.code(), "MIDDLEWARE_NOT_REGISTERED");
        assert!(err.to_string().contains("authentication"));
    }
}
