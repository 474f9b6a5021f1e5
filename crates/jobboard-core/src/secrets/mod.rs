//! Secret handling for configuration values.
//!
//! - `SecretValue`: wrapper that keeps signing keys and client secrets out of logs
//! - `scrub_secrets`: redact secrets from error messages

use rand::RngCore;
use secrecy::{ExposeSecret, SecretBox};
use serde::{Deserialize, Deserializer};

/// Minimum accepted secret length in bytes.
pub const MIN_SECRET_LEN: usize = 16;

/// Secret configuration value (token signing key, OAuth client secret).
///
/// The inner value is wrapped with `secrecy::SecretBox` so it never shows up
/// in `Debug` output or logs.
#[derive(Clone)]
pub struct SecretValue(SecretBox<str>);

impl SecretValue {
    /// Wrap a secret value.
    #[must_use]
    pub fn new(secret: impl Into<String>) -> Self {
        Self(SecretBox::new(secret.into().into_boxed_str()))
    }

    /// Generate a random 256-bit secret, hex encoded.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self::new(hex::encode(bytes))
    }

    /// Expose the raw bytes for key construction.
    ///
    /// Use sparingly - only when building signing keys.
    #[must_use]
    pub fn expose(&self) -> &[u8] {
        self.0.expose_secret().as_bytes()
    }

    /// Length of the secret in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.expose().len()
    }

    /// Whether the secret is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Constant-shape comparison of two secrets.
    #[must_use]
    pub fn same_as(&self, other: &Self) -> bool {
        let (a, b) = (self.expose(), other.expose());
        a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
    }
}

impl std::fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SecretValue([REDACTED])")
    }
}

impl<'de> Deserialize<'de> for SecretValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::new)
    }
}

/// Scrub potential secrets from a string (for error messages).
///
/// Replaces everything after each pattern up to the next delimiter with
/// `[REDACTED]`.
#[must_use]
pub fn scrub_secrets(text: &str, patterns: &[&str]) -> String {
    let mut result = text.to_string();
    for pattern in patterns {
        let mut search_from = 0;
        while let Some(offset) = result[search_from..].find(pattern) {
            let start = search_from + offset + pattern.len();
            let end = result[start..]
                .find(|c: char| c.is_whitespace() || c == '"' || c == '\'' || c == ';' || c == '&')
                .map_or(result.len(), |i| start + i);
            result.replace_range(start..end, "[REDACTED]");
            search_from = start + "[REDACTED]".len();
        }
    }
    result
}
