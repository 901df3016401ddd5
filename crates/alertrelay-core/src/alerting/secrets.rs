//! Credential resolution for channel settings
//!
//! Secret storage and encryption at rest live outside this crate. Notifier
//! constructors only see a [`Decrypter`], asked once per credential field.

use std::collections::HashMap;

/// Resolves a credential setting to its plaintext value
pub trait Decrypter: Send + Sync {
    /// Decrypted value stored for `field`, or `fallback` when none is stored
    fn decrypted_value(&self, field: &str, fallback: &str) -> String;
}

impl<F> Decrypter for F
where
    F: Fn(&str, &str) -> String + Send + Sync,
{
    fn decrypted_value(&self, field: &str, fallback: &str) -> String {
        self(field, fallback)
    }
}

/// Decrypted credential held by a notifier; never printed
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    /// Wrap a plaintext credential
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Plaintext value, for building requests only
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Whether no credential is set
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Secret(<redacted>)")
    }
}

/// Reads credentials from a channel's `secure_settings`, which the credential
/// store has already decrypted. Empty entries fall back to the plain setting.
#[derive(Debug, Clone, Copy)]
pub struct SecureSettings<'a>(&'a HashMap<String, String>);

impl<'a> SecureSettings<'a> {
    /// Wrap a secure settings map
    pub fn new(values: &'a HashMap<String, String>) -> Self {
        Self(values)
    }
}

impl Decrypter for SecureSettings<'_> {
    fn decrypted_value(&self, field: &str, fallback: &str) -> String {
        match self.0.get(field) {
            Some(value) if !value.is_empty() => value.clone(),
            _ => fallback.to_string(),
        }
    }
}

/// Decrypter for channels without secure settings
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainSettings;

impl Decrypter for PlainSettings {
    fn decrypted_value(&self, _field: &str, fallback: &str) -> String {
        fallback.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secure_settings_take_precedence() {
        let secure = HashMap::from([
            ("token".to_string(), "s3cret".to_string()),
            ("empty".to_string(), String::new()),
        ]);
        let decrypter = SecureSettings::new(&secure);
        assert_eq!(decrypter.decrypted_value("token", "plain"), "s3cret");
        assert_eq!(decrypter.decrypted_value("empty", "plain"), "plain");
        assert_eq!(decrypter.decrypted_value("other", "plain"), "plain");
    }

    #[test]
    fn test_closures_are_decrypters() {
        let decrypter = |field: &str, fallback: &str| format!("{field}:{fallback}");
        assert_eq!(decrypter.decrypted_value("api_secret", "x"), "api_secret:x");
        assert_eq!(PlainSettings.decrypted_value("api_secret", "x"), "x");
    }

    #[test]
    fn test_secret_debug_is_redacted() {
        let secret = Secret::new("hunter2");
        assert_eq!(format!("{secret:?}"), "Secret(<redacted>)");
        assert_eq!(secret.expose(), "hunter2");
        assert!(Secret::default().is_empty());
    }
}
