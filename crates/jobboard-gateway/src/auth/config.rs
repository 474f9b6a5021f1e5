//! Resolved authentication settings.
//!
//! `jobboard_core::Config` holds what the operator wrote; `AuthSettings` is
//! what the auth core actually runs with: secrets present, lifetimes parsed.

use std::time::Duration;

use jobboard_core::secrets::MIN_SECRET_LEN;
use jobboard_core::{Config, SecretValue, parse_lifetime};

use super::AuthError;
use super::credentials::HashCost;

/// Default access token lifetime (15 minutes).
pub const DEFAULT_ACCESS_LIFETIME: Duration = Duration::from_secs(15 * 60);
/// Default refresh token lifetime (7 days).
pub const DEFAULT_REFRESH_LIFETIME: Duration = Duration::from_secs(7 * 24 * 3600);

/// Settings the token codec, cookie transport and hasher are built from.
#[derive(Debug, Clone)]
pub struct AuthSettings {
    /// Access token signing secret.
    pub access_secret: SecretValue,
    /// Refresh token signing secret.
    pub refresh_secret: SecretValue,
    /// Access token (and access cookie) lifetime.
    pub access_lifetime: Duration,
    /// Refresh token (and refresh cookie) lifetime.
    pub refresh_lifetime: Duration,
    /// Emit `Secure; SameSite=None` cookies.
    pub secure_cookies: bool,
    /// Argon2 cost for new secret hashes.
    pub hash_cost: HashCost,
}

impl AuthSettings {
    /// Create a new settings builder.
    #[must_use]
    pub fn builder() -> AuthSettingsBuilder {
        AuthSettingsBuilder::default()
    }

    /// Resolve settings from the loaded configuration.
    ///
    /// In production both signing secrets must be configured. In development
    /// a missing secret is generated for this process only, which means
    /// sessions do not survive a restart.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Config` if a production secret is missing or the
    /// two secrets are identical.
    pub fn from_config(config: &Config) -> Result<Self, AuthError> {
        let production = config.is_production();

        let access_secret =
            resolve_secret(config.auth.access_secret.as_ref(), "JWT_ACCESS_SECRET", production)?;
        let refresh_secret = resolve_secret(
            config.auth.refresh_secret.as_ref(),
            "JWT_REFRESH_SECRET",
            production,
        )?;

        Self::builder()
            .access_secret(access_secret)
            .refresh_secret(refresh_secret)
            .access_lifetime(lifetime_or_default(
                &config.auth.access_expires,
                DEFAULT_ACCESS_LIFETIME,
                "access",
            ))
            .refresh_lifetime(lifetime_or_default(
                &config.auth.refresh_expires,
                DEFAULT_REFRESH_LIFETIME,
                "refresh",
            ))
            .secure_cookies(config.cookie_secure())
            .hash_cost(config.auth.hash_cost.into())
            .build()
    }
}

fn resolve_secret(
    configured: Option<&SecretValue>,
    name: &str,
    production: bool,
) -> Result<SecretValue, AuthError> {
    match configured {
        Some(secret) if !secret.is_empty() => {
            if secret.len() < MIN_SECRET_LEN {
                tracing::warn!(
                    "{} is shorter than {} bytes; use a longer random value",
                    name,
                    MIN_SECRET_LEN
                );
            }
            Ok(secret.clone())
        }
        _ if production => Err(AuthError::Config(format!(
            "{name} is required in production"
        ))),
        _ => {
            tracing::warn!(
                "{} not set, generated an ephemeral secret (sessions end on restart)",
                name
            );
            Ok(SecretValue::generate())
        }
    }
}

fn lifetime_or_default(value: &str, default: Duration, kind: &str) -> Duration {
    parse_lifetime(value).unwrap_or_else(|| {
        tracing::warn!(
            "Unrecognized {} token lifetime {:?}, using {}s",
            kind,
            value,
            default.as_secs()
        );
        default
    })
}

/// Builder for `AuthSettings`.
#[derive(Debug, Default)]
pub struct AuthSettingsBuilder {
    access_secret: Option<SecretValue>,
    refresh_secret: Option<SecretValue>,
    access_lifetime: Option<Duration>,
    refresh_lifetime: Option<Duration>,
    secure_cookies: bool,
    hash_cost: HashCost,
}

impl AuthSettingsBuilder {
    /// Set the access token secret.
    #[must_use]
    pub fn access_secret(mut self, secret: SecretValue) -> Self {
        self.access_secret = Some(secret);
        self
    }

    /// Set the refresh token secret.
    #[must_use]
    pub fn refresh_secret(mut self, secret: SecretValue) -> Self {
        self.refresh_secret = Some(secret);
        self
    }

    /// Set the access token lifetime.
    #[must_use]
    pub const fn access_lifetime(mut self, lifetime: Duration) -> Self {
        self.access_lifetime = Some(lifetime);
        self
    }

    /// Set the refresh token lifetime.
    #[must_use]
    pub const fn refresh_lifetime(mut self, lifetime: Duration) -> Self {
        self.refresh_lifetime = Some(lifetime);
        self
    }

    /// Set whether cookies are cross-site (`Secure; SameSite=None`).
    #[must_use]
    pub const fn secure_cookies(mut self, secure: bool) -> Self {
        self.secure_cookies = secure;
        self
    }

    /// Set the hashing cost.
    #[must_use]
    pub const fn hash_cost(mut self, cost: HashCost) -> Self {
        self.hash_cost = cost;
        self
    }

    /// Build the settings. Missing secrets are generated.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Config` if both secrets are the same value.
    pub fn build(self) -> Result<AuthSettings, AuthError> {
        let access_secret = self.access_secret.unwrap_or_else(SecretValue::generate);
        let refresh_secret = self.refresh_secret.unwrap_or_else(SecretValue::generate);

        if access_secret.same_as(&refresh_secret) {
            return Err(AuthError::Config(
                "Access and refresh token secrets must differ".to_string(),
            ));
        }

        Ok(AuthSettings {
            access_secret,
            refresh_secret,
            access_lifetime: self.access_lifetime.unwrap_or(DEFAULT_ACCESS_LIFETIME),
            refresh_lifetime: self.refresh_lifetime.unwrap_or(DEFAULT_REFRESH_LIFETIME),
            secure_cookies: self.secure_cookies,
            hash_cost: self.hash_cost,
        })
    }
}
