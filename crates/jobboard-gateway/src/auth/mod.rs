//! Authentication and authorization for the gateway.
//!
//! This module provides:
//! - Access/refresh token issuance and verification
//! - Local secret hashing and verification
//! - Identity storage with role-based access control
//! - Cookie transport for the token pair
//! - The session guard and role gate for protected routes
//! - Federation of third-party logins into local identities

mod config;
pub mod cookies;
pub mod credentials;
pub mod federation;
pub mod google;
pub mod guard;
pub mod identity;
pub mod role_gate;
pub mod tokens;

pub use config::{AuthSettings, AuthSettingsBuilder};
pub use cookies::{ACCESS_COOKIE, CookieTransport, REFRESH_COOKIE};
pub use credentials::{Argon2Hasher, CredentialVerifier, HashCost, SecretHash, SecretHasher};
pub use federation::{FederatedAssertion, FederatedLogin, FederationBridge};
pub use google::{GoogleAuthState, GoogleOAuthClient};
pub use guard::{CurrentIdentity, GuardOutcome, ResolvedIdentity, SessionGuard, require_session};
pub use identity::{
    Identity, IdentityStore, MemoryIdentityStore, NewIdentity, PublicIdentity, SledIdentityStore,
};
pub use role_gate::{RoleGate, require_role};
pub use tokens::{Claims, IssuedToken, TokenCodec, TokenKind, TokenPair, TokenSubject};

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use jobboard_core::ValidationError;
use serde::Serialize;
use thiserror::Error;

/// Why a request carried no usable session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnauthorizedReason {
    /// Neither an access nor a refresh token was presented.
    MissingCredentials,
    /// The refresh token failed verification.
    InvalidRefreshToken,
    /// The token subject no longer exists.
    UnknownIdentity,
    /// The token subject has been deactivated.
    InactiveIdentity,
}

impl UnauthorizedReason {
    /// Whether the client's session cookies should be dropped.
    ///
    /// Only a bad refresh token clears cookies; a missing or deactivated
    /// identity leaves them in place.
    #[must_use]
    pub const fn clears_cookies(self) -> bool {
        matches!(self, Self::InvalidRefreshToken)
    }
}

impl std::fmt::Display for UnauthorizedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingCredentials => write!(f, "authentication required"),
            Self::InvalidRefreshToken => write!(f, "invalid refresh token"),
            Self::UnknownIdentity | Self::InactiveIdentity => write!(f, "invalid user"),
        }
    }
}

/// Authentication errors.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No usable session.
    #[error("Unauthorized: {0}")]
    Unauthorized(UnauthorizedReason),

    /// Token failed signature, structure, kind or expiry checks.
    #[error("Invalid or expired token")]
    InvalidToken,

    /// Authenticated but the role is not allowed.
    #[error("Forbidden")]
    Forbidden,

    /// Unknown email or wrong secret. Same message for both.
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Correct credentials for a deactivated identity.
    #[error("Account is disabled")]
    AccountDisabled,

    /// Local secret login or registration against a federated-only identity.
    #[error("This account uses Google sign-in. Please sign in with Google.")]
    FederatedAccountConflict,

    /// Email already registered.
    #[error("Email already registered")]
    EmailTaken,

    /// The identity changed since it was read.
    #[error("Identity was modified concurrently, reload and retry")]
    Conflict,

    /// Federation assertion cannot be used.
    #[error("Invalid federated assertion: {0}")]
    InvalidAssertion(String),

    /// Request body failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Rate limiter refused the request.
    #[error("Too many requests, please try again later")]
    RateLimited,

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Storage error.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Secret hashing error.
    #[error("Hashing error: {0}")]
    Hashing(String),

    /// Configuration error.
    #[error("Config error: {0}")]
    Config(String),

    /// Identity provider error.
    #[error("Federation error: {0}")]
    Federation(String),
}

impl AuthError {
    /// Stable machine-readable code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Unauthorized(_) => "unauthorized",
            Self::InvalidToken => "invalid_token",
            Self::Forbidden => "forbidden",
            Self::InvalidCredentials => "invalid_credentials",
            Self::AccountDisabled => "account_disabled",
            Self::FederatedAccountConflict => "federated_account",
            Self::EmailTaken => "email_taken",
            Self::Conflict => "conflict",
            Self::InvalidAssertion(_) => "invalid_assertion",
            Self::Validation(_) => "validation_error",
            Self::RateLimited => "rate_limited",
            Self::NotFound(_) => "not_found",
            Self::Federation(_) => "federation_error",
            Self::Storage(_) | Self::Hashing(_) | Self::Config(_) => "internal_error",
        }
    }

    /// HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized(_) | Self::InvalidToken | Self::InvalidCredentials => {
                StatusCode::UNAUTHORIZED
            }
            Self::Forbidden | Self::AccountDisabled => StatusCode::FORBIDDEN,
            Self::FederatedAccountConflict | Self::EmailTaken | Self::Conflict => {
                StatusCode::CONFLICT
            }
            Self::InvalidAssertion(_) | Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Federation(_) => StatusCode::BAD_GATEWAY,
            Self::Storage(_) | Self::Hashing(_) | Self::Config(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Whether this is a server-side fault rather than a client rejection.
    #[must_use]
    pub const fn is_internal(&self) -> bool {
        matches!(
            self,
            Self::Storage(_) | Self::Hashing(_) | Self::Config(_) | Self::Federation(_)
        )
    }
}

impl From<ValidationError> for AuthError {
    fn from(e: ValidationError) -> Self {
        Self::Validation(e.to_string())
    }
}

/// Error response for auth failures.
#[derive(Debug, Serialize)]
struct AuthErrorResponse {
    error: String,
    code: &'static str,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();

        // Internal details stay in the logs
        let error = if self.is_internal() {
            tracing::error!(code, "{}", self);
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        (status, Json(AuthErrorResponse { error, code })).into_response()
    }
}
