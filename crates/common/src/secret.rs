//! Secret wrapper for sensitive values
//!
//! Consumer secrets, token secrets and the server-wide transform key all
//! travel in a `Secret`. Serialization writes the raw value because the
//! registry file is the one place that must hold it; everything that
//! formats for humans (Debug, Display, tracing fields) sees `[REDACTED]`.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use zeroize::Zeroize;

/// Sensitive value - redacted in Debug/Display/logs
pub struct Secret<T: Zeroize>(T);

impl<T: Zeroize> Secret<T> {
    /// Create a new secret value
    pub fn new(value: T) -> Self {
        Self(value)
    }

    /// Expose the inner value (use sparingly)
    pub fn expose(&self) -> &T {
        &self.0
    }
}

impl Secret<String> {
    /// Borrow the secret as a string slice.
    pub fn expose_str(&self) -> &str {
        self.0.as_str()
    }

    /// Whether the wrapped string is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<String> for Secret<String> {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for Secret<String> {
    fn from(value: &str) -> Self {
        Self::new(value.to_owned())
    }
}

impl<T: Zeroize> fmt::Debug for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl<T: Zeroize> fmt::Display for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl<T: Zeroize> Drop for Secret<T> {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl<T: Zeroize + Clone> Clone for Secret<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T: Zeroize + Serialize> Serialize for Secret<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<'de, T: Zeroize + Deserialize<'de>> Deserialize<'de> for Secret<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        T::deserialize(deserializer).map(Secret::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_redacts_debug() {
        let secret = Secret::new(String::from("consumer-secret"));
        let debug = format!("{:?}", secret);
        assert_eq!(debug, "[REDACTED]");
        assert!(!debug.contains("consumer-secret"));
    }

    #[test]
    fn test_secret_exposes_value() {
        let secret = Secret::new(String::from("consumer-secret"));
        assert_eq!(secret.expose(), "consumer-secret");
        assert_eq!(secret.expose_str(), "consumer-secret");
        assert!(!secret.is_empty());
    }

    #[test]
    fn test_secret_serde_is_transparent() {
        #[derive(Serialize, Deserialize)]
        struct Record {
            secret: Secret<String>,
        }

        let json = serde_json::to_string(&Record {
            secret: Secret::from("abc123"),
        })
        .unwrap();
        assert_eq!(json, r#"{"secret":"abc123"}"#);

        let record: Record = serde_json::from_str(&json).unwrap();
        assert_eq!(record.secret.expose_str(), "abc123");
    }

    #[test]
    fn test_empty_secret() {
        let secret: Secret<String> = "".into();
        assert!(secret.is_empty());
    }
}
