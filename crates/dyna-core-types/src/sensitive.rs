//! Sensitive data marker for automatic redaction
//!
//! The `Sensitive<T>` wrapper ensures that sensitive data (bearer tokens,
//! refresh tokens, API keys) is never accidentally logged or displayed.

use std::fmt;

/// Wrapper for sensitive data that redacts itself in Debug and Display
///
/// # Example
///
/// ```
/// use dyna_core_types::Sensitive;
///
/// let token = Sensitive::new("eyJhbGciOi...");
/// println!("{:?}", token); // Prints: ***REDACTED***
///
/// // Access the actual value when needed
/// assert_eq!(token.expose(), &"eyJhbGciOi...");
/// ```
pub struct Sensitive<T>(T);

impl<T> Sensitive<T> {
    /// Wrap a sensitive value
    pub fn new(value: T) -> Self {
        Self(value)
    }

    /// Expose the underlying sensitive value
    ///
    /// Use this method sparingly and only when the sensitive data
    /// must be accessed (e.g., for an Authorization header).
    pub fn expose(&self) -> &T {
        &self.0
    }

    /// Consume the wrapper and return the inner value
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> fmt::Debug for Sensitive<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "***REDACTED***")
    }
}

impl<T> fmt::Display for Sensitive<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "***REDACTED***")
    }
}

impl<T: Clone> Clone for Sensitive<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sensitive_debug_redaction() {
        let secret = Sensitive::new("my-secret-token");
        let debug_str = format!("{:?}", secret);
        assert_eq!(debug_str, "***REDACTED***");
        assert!(!debug_str.contains("my-secret-token"));
    }

    #[test]
    fn test_sensitive_display_redaction() {
        let secret = Sensitive::new("api-key-12345");
        let display_str = format!("{}", secret);
        assert_eq!(display_str, "***REDACTED***");
        assert!(!display_str.contains("api-key"));
    }

    #[test]
    fn test_sensitive_expose_and_into_inner() {
        let secret = Sensitive::new(String::from("value"));
        assert_eq!(secret.expose(), "value");
        assert_eq!(secret.into_inner(), "value");
    }

    #[test]
    fn test_sensitive_in_struct_debug() {
        #[derive(Debug)]
        #[allow(dead_code)]
        struct Session {
            user: String,
            token: Sensitive<String>,
        }

        let session = Session {
            user: "alice".to_string(),
            token: Sensitive::new("secret123".to_string()),
        };

        let debug_str = format!("{:?}", session);
        assert!(debug_str.contains("alice"));
        assert!(debug_str.contains("***REDACTED***"));
        assert!(!debug_str.contains("secret123"));
    }
}
