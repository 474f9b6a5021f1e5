//! Access and refresh token codec.

use std::time::Duration;

use chrono::{DateTime, Utc};
use jobboard_core::{IdentityId, Role};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use super::AuthError;
use super::config::AuthSettings;

/// Token claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (identity ID).
    pub sub: String,
    /// Role at issue time.
    pub role: Role,
    /// Issued at (Unix timestamp).
    pub iat: i64,
    /// Expiration (Unix timestamp).
    pub exp: i64,
    /// Token kind.
    pub typ: TokenKind,
}

/// Token kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    /// Short-lived token checked on every request.
    Access,
    /// Long-lived token used only to mint a new pair.
    Refresh,
}

/// A signed token and its expiry.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    /// Compact encoded token.
    pub token: String,
    /// When the token stops verifying.
    pub expires_at: DateTime<Utc>,
}

/// A freshly issued access + refresh pair.
#[derive(Debug, Clone)]
pub struct TokenPair {
    /// Access token.
    pub access: IssuedToken,
    /// Refresh token.
    pub refresh: IssuedToken,
}

/// What a verified token asserts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenSubject {
    /// Identity the token was issued to.
    pub id: IdentityId,
    /// Role carried in the payload.
    pub role: Role,
}

struct KeyPair {
    encoding: EncodingKey,
    decoding: DecodingKey,
    lifetime: Duration,
}

impl KeyPair {
    fn new(secret: &[u8], lifetime: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            lifetime,
        }
    }
}

/// Signs and verifies access and refresh tokens.
///
/// Each kind has its own secret, so a leaked access secret cannot forge
/// refresh tokens.
pub struct TokenCodec {
    access: KeyPair,
    refresh: KeyPair,
    validation: Validation,
}

impl TokenCodec {
    /// Create a codec from resolved settings.
    #[must_use]
    pub fn new(settings: &AuthSettings) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            access: KeyPair::new(settings.access_secret.expose(), settings.access_lifetime),
            refresh: KeyPair::new(settings.refresh_secret.expose(), settings.refresh_lifetime),
            validation,
        }
    }

    /// Lifetime of tokens of the given kind.
    #[must_use]
    pub const fn lifetime(&self, kind: TokenKind) -> Duration {
        self.keys(kind).lifetime
    }

    const fn keys(&self, kind: TokenKind) -> &KeyPair {
        match kind {
            TokenKind::Access => &self.access,
            TokenKind::Refresh => &self.refresh,
        }
    }

    /// Issue an access token.
    ///
    /// # Errors
    ///
    /// Returns error if token encoding fails.
    pub fn issue_access(&self, id: &IdentityId, role: Role) -> Result<IssuedToken, AuthError> {
        self.issue_at(TokenKind::Access, id, role, Utc::now())
    }

    /// Issue a refresh token.
    ///
    /// # Errors
    ///
    /// Returns error if token encoding fails.
    pub fn issue_refresh(&self, id: &IdentityId, role: Role) -> Result<IssuedToken, AuthError> {
        self.issue_at(TokenKind::Refresh, id, role, Utc::now())
    }

    /// Issue an access + refresh pair.
    ///
    /// # Errors
    ///
    /// Returns error if token encoding fails.
    pub fn issue_pair(&self, id: &IdentityId, role: Role) -> Result<TokenPair, AuthError> {
        Ok(TokenPair {
            access: self.issue_access(id, role)?,
            refresh: self.issue_refresh(id, role)?,
        })
    }

    /// Issue a token with an explicit issue time.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Config` if the expiry is not representable or
    /// token encoding fails.
    pub fn issue_at(
        &self,
        kind: TokenKind,
        id: &IdentityId,
        role: Role,
        issued_at: DateTime<Utc>,
    ) -> Result<IssuedToken, AuthError> {
        let keys = self.keys(kind);
        let expires_at = chrono::Duration::from_std(keys.lifetime)
            .ok()
            .and_then(|lifetime| issued_at.checked_add_signed(lifetime))
            .ok_or_else(|| {
                AuthError::Config(format!("{kind:?} token lifetime is out of range"))
            })?;

        let claims = Claims {
            sub: id.to_string(),
            role,
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
            typ: kind,
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &keys.encoding)
            .map_err(|e| AuthError::Config(format!("Token encoding failed: {e}")))?;

        Ok(IssuedToken { token, expires_at })
    }

    /// Verify an access token.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidToken` on any signature, structure, kind or
    /// expiry failure.
    pub fn verify_access(&self, token: &str) -> Result<TokenSubject, AuthError> {
        self.verify(TokenKind::Access, token)
    }

    /// Verify a refresh token.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidToken` on any signature, structure, kind or
    /// expiry failure.
    pub fn verify_refresh(&self, token: &str) -> Result<TokenSubject, AuthError> {
        self.verify(TokenKind::Refresh, token)
    }

    fn verify(&self, kind: TokenKind, token: &str) -> Result<TokenSubject, AuthError> {
        let data = decode::<Claims>(token, &self.keys(kind).decoding, &self.validation)
            .map_err(|e| {
                tracing::debug!(?kind, "Token rejected: {}", e);
                AuthError::InvalidToken
            })?;

        if data.claims.typ != kind {
            tracing::debug!(?kind, found = ?data.claims.typ, "Token kind mismatch");
            return Err(AuthError::InvalidToken);
        }

        Ok(TokenSubject {
            id: IdentityId::new(data.claims.sub),
            role: data.claims.role,
        })
    }
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec")
            .field("access_lifetime", &self.access.lifetime)
            .field("refresh_lifetime", &self.refresh.lifetime)
            .finish_non_exhaustive()
    }
}
