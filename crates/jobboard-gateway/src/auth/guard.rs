//! Session guard for protected routes.
//!
//! Resolution order per request:
//!
//! 1. A valid access token resolves the identity straight from its payload.
//!    The store is not consulted, so a role change only shows up after the
//!    next refresh.
//! 2. Otherwise a refresh token is verified. A bad one rejects the request and
//!    clears both cookies.
//! 3. A good refresh token re-reads the identity. Missing or inactive
//!    identities are rejected but keep their cookies.
//! 4. A new pair is minted from the live role and both cookies are rewritten.
//! 5. With no token at all the request is rejected without touching the store.

use std::sync::Arc;

use axum::{
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::CookieJar;
use jobboard_core::{IdentityId, Role};

use super::cookies::{CookieTransport, SessionCookies};
use super::identity::{Identity, IdentityStore};
use super::tokens::{TokenCodec, TokenPair};
use super::{AuthError, UnauthorizedReason};

/// Identity attached to a request by the guard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedIdentity {
    /// Identity ID.
    pub id: IdentityId,
    /// Role in effect for this request.
    pub role: Role,
}

/// How the guard resolved a request.
#[derive(Debug, Clone)]
pub enum GuardOutcome {
    /// Access token was valid.
    Access(ResolvedIdentity),
    /// Refresh token was used; the client must receive the new pair.
    Rotated {
        /// Identity with its live role.
        identity: ResolvedIdentity,
        /// Replacement tokens.
        pair: TokenPair,
    },
}

impl GuardOutcome {
    /// The resolved identity.
    #[must_use]
    pub const fn identity(&self) -> &ResolvedIdentity {
        match self {
            Self::Access(identity) | Self::Rotated { identity, .. } => identity,
        }
    }
}

/// Resolves request cookies into an identity.
pub struct SessionGuard {
    codec: Arc<TokenCodec>,
    store: Arc<dyn IdentityStore>,
    cookies: CookieTransport,
}

impl SessionGuard {
    /// Create a guard.
    #[must_use]
    pub fn new(
        codec: Arc<TokenCodec>,
        store: Arc<dyn IdentityStore>,
        cookies: CookieTransport,
    ) -> Self {
        Self {
            codec,
            store,
            cookies,
        }
    }

    /// Resolve the presented tokens.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Unauthorized` when no session can be established,
    /// or a storage/encoding error.
    pub async fn resolve(&self, presented: &SessionCookies) -> Result<GuardOutcome, AuthError> {
        if let Some(access) = presented.access.as_deref() {
            match self.codec.verify_access(access) {
                Ok(subject) => {
                    tracing::debug!(identity = %subject.id, "Session resolved from access token");
                    return Ok(GuardOutcome::Access(ResolvedIdentity {
                        id: subject.id,
                        role: subject.role,
                    }));
                }
                Err(_) => tracing::debug!("Access token unusable, trying refresh token"),
            }
        }

        let Some(refresh) = presented.refresh.as_deref() else {
            return Err(AuthError::Unauthorized(
                UnauthorizedReason::MissingCredentials,
            ));
        };

        let (identity, pair) = self.rotate(refresh).await?;
        tracing::debug!(identity = %identity.id, role = %identity.role, "Session rotated");

        Ok(GuardOutcome::Rotated {
            identity: ResolvedIdentity {
                id: identity.id,
                role: identity.role,
            },
            pair,
        })
    }

    /// Exchange a refresh token for a new pair built from the live identity.
    ///
    /// The old refresh token stays valid until it expires.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Unauthorized` with `InvalidRefreshToken`,
    /// `UnknownIdentity` or `InactiveIdentity`.
    pub async fn rotate(&self, refresh_token: &str) -> Result<(Identity, TokenPair), AuthError> {
        let subject = self.codec.verify_refresh(refresh_token).map_err(|_| {
            tracing::warn!("Rejected invalid refresh token");
            AuthError::Unauthorized(UnauthorizedReason::InvalidRefreshToken)
        })?;

        let identity = self.store.find_by_id(&subject.id).await?.ok_or_else(|| {
            tracing::warn!(identity = %subject.id, "Refresh token for unknown identity");
            AuthError::Unauthorized(UnauthorizedReason::UnknownIdentity)
        })?;

        if !identity.active {
            tracing::warn!(identity = %identity.id, "Refresh token for inactive identity");
            return Err(AuthError::Unauthorized(
                UnauthorizedReason::InactiveIdentity,
            ));
        }

        let pair = self.codec.issue_pair(&identity.id, identity.role)?;
        Ok((identity, pair))
    }

    /// Resolve a request's cookie jar and apply the resulting cookie changes.
    ///
    /// The returned jar carries rotated cookies on success and removal
    /// cookies when the refresh token was bad.
    pub async fn authenticate(
        &self,
        jar: CookieJar,
    ) -> (CookieJar, Result<ResolvedIdentity, AuthError>) {
        match self.resolve(&CookieTransport::read(&jar)).await {
            Ok(GuardOutcome::Access(identity)) => (jar, Ok(identity)),
            Ok(GuardOutcome::Rotated { identity, pair }) => {
                (self.cookies.set_session(jar, &pair), Ok(identity))
            }
            Err(AuthError::Unauthorized(reason)) if reason.clears_cookies() => (
                self.cookies.clear_session(jar),
                Err(AuthError::Unauthorized(reason)),
            ),
            Err(e) => (jar, Err(e)),
        }
    }
}

impl std::fmt::Debug for SessionGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionGuard")
            .field("codec", &self.codec)
            .field("cookies", &self.cookies)
            .finish_non_exhaustive()
    }
}

/// Middleware that requires a session.
///
/// On success the `ResolvedIdentity` is inserted into the request extensions
/// and any rotated cookies are appended to the response.
pub async fn require_session(
    State(guard): State<Arc<SessionGuard>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    let (jar, result) = guard.authenticate(jar).await;

    match result {
        Ok(identity) => {
            request.extensions_mut().insert(identity);
            let response = next.run(request).await;
            (jar, response).into_response()
        }
        Err(e) => (jar, e).into_response(),
    }
}

/// Extractor for the identity resolved by `require_session`.
#[derive(Debug, Clone)]
pub struct CurrentIdentity(pub ResolvedIdentity);

impl<S> FromRequestParts<S> for CurrentIdentity
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<ResolvedIdentity>()
            .cloned()
            .map(Self)
            .ok_or(AuthError::Unauthorized(
                UnauthorizedReason::MissingCredentials,
            ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::config::AuthSettings;
    use crate::auth::credentials::SecretHash;
    use crate::auth::identity::{MemoryIdentityStore, NewIdentity};
    use crate::auth::tokens::TokenKind;
    use crate::auth::{ACCESS_COOKIE, REFRESH_COOKIE};
    use axum_extra::extract::cookie::Cookie;
    use chrono::Utc;

    struct Fixture {
        guard: SessionGuard,
        codec: Arc<TokenCodec>,
        store: Arc<MemoryIdentityStore>,
    }

    fn fixture() -> Fixture {
        let settings = AuthSettings::builder().build().unwrap();
        let codec = Arc::new(TokenCodec::new(&settings));
        let store = Arc::new(MemoryIdentityStore::new());
        let guard = SessionGuard::new(
            codec.clone(),
            store.clone(),
            CookieTransport::new(&settings),
        );
        Fixture {
            guard,
            codec,
            store,
        }
    }

    async fn seed(store: &MemoryIdentityStore, role: Role) -> Identity {
        let hash = SecretHash::new("$argon2id$v=19$m=8,t=1,p=1$c2FsdA$aGFzaA").unwrap();
        store
            .create(NewIdentity::local("sam@example.com", "Sam", hash, role))
            .await
            .unwrap()
    }

    fn cookies(access: Option<&str>, refresh: Option<&str>) -> SessionCookies {
        SessionCookies {
            access: access.map(String::from),
            refresh: refresh.map(String::from),
        }
    }

    #[tokio::test]
    async fn test_no_cookies_rejected_without_store_access() {
        let f = fixture();
        let result = f.guard.resolve(&SessionCookies::default()).await;

        assert!(matches!(
            result,
            Err(AuthError::Unauthorized(UnauthorizedReason::MissingCredentials))
        ));
        assert_eq!(f.store.lookups(), 0);
    }

    #[tokio::test]
    async fn test_valid_access_trusts_payload_role() {
        let f = fixture();
        let mut identity = seed(&f.store, Role::Employer).await;
        let access = f.codec.issue_access(&identity.id, Role::Employer).unwrap();

        identity.set_role(Role::Admin);
        f.store.update(&identity).await.unwrap();

        let outcome = f
            .guard
            .resolve(&cookies(Some(&access.token), None))
            .await
            .unwrap();

        assert!(matches!(outcome, GuardOutcome::Access(_)));
        assert_eq!(outcome.identity().role, Role::Employer);
        assert_eq!(f.store.lookups(), 0);
    }

    #[tokio::test]
    async fn test_expired_access_rotates_with_live_role() {
        let f = fixture();
        let mut identity = seed(&f.store, Role::Seeker).await;
        let expired = f
            .codec
            .issue_at(
                TokenKind::Access,
                &identity.id,
                Role::Seeker,
                Utc::now() - chrono::Duration::hours(1),
            )
            .unwrap();
        let refresh = f.codec.issue_refresh(&identity.id, Role::Seeker).unwrap();

        identity.set_role(Role::Employer);
        f.store.update(&identity).await.unwrap();

        let outcome = f
            .guard
            .resolve(&cookies(Some(&expired.token), Some(&refresh.token)))
            .await
            .unwrap();

        let GuardOutcome::Rotated { identity: resolved, pair } = outcome else {
            panic!("expected rotation");
        };
        assert_eq!(resolved.role, Role::Employer);
        assert_eq!(
            f.codec.verify_access(&pair.access.token).unwrap().role,
            Role::Employer
        );
        assert_eq!(
            f.codec.verify_refresh(&pair.refresh.token).unwrap().role,
            Role::Employer
        );
    }

    #[tokio::test]
    async fn test_inactive_identity_rejected_and_cookies_kept() {
        let f = fixture();
        let mut identity = seed(&f.store, Role::Seeker).await;
        let refresh = f.codec.issue_refresh(&identity.id, Role::Seeker).unwrap();
        identity.set_active(false);
        f.store.update(&identity).await.unwrap();

        let jar = CookieJar::new().add(Cookie::new(REFRESH_COOKIE, refresh.token));
        let (jar, result) = f.guard.authenticate(jar).await;

        assert!(matches!(
            result,
            Err(AuthError::Unauthorized(UnauthorizedReason::InactiveIdentity))
        ));
        let kept = jar.get(REFRESH_COOKIE).unwrap();
        assert!(!kept.value().is_empty());
        assert!(jar.get(ACCESS_COOKIE).is_none());
    }

    #[tokio::test]
    async fn test_unknown_identity_rejected() {
        let f = fixture();
        let refresh = f
            .codec
            .issue_refresh(&IdentityId::new("user_gone"), Role::Seeker)
            .unwrap();

        let result = f.guard.resolve(&cookies(None, Some(&refresh.token))).await;
        assert!(matches!(
            result,
            Err(AuthError::Unauthorized(UnauthorizedReason::UnknownIdentity))
        ));
    }

    #[tokio::test]
    async fn test_invalid_refresh_clears_cookies() {
        let f = fixture();
        let jar = CookieJar::new()
            .add(Cookie::new(ACCESS_COOKIE, "garbage"))
            .add(Cookie::new(REFRESH_COOKIE, "also-garbage"));

        let (jar, result) = f.guard.authenticate(jar).await;

        assert!(matches!(
            result,
            Err(AuthError::Unauthorized(UnauthorizedReason::InvalidRefreshToken))
        ));
        assert_eq!(jar.get(ACCESS_COOKIE).unwrap().value(), "");
        assert_eq!(jar.get(REFRESH_COOKIE).unwrap().value(), "");
        assert_eq!(f.store.lookups(), 0);
    }

    #[tokio::test]
    async fn test_access_token_in_refresh_slot_rejected() {
        let f = fixture();
        let identity = seed(&f.store, Role::Seeker).await;
        let access = f.codec.issue_access(&identity.id, Role::Seeker).unwrap();

        let result = f.guard.resolve(&cookies(None, Some(&access.token))).await;
        assert!(matches!(
            result,
            Err(AuthError::Unauthorized(UnauthorizedReason::InvalidRefreshToken))
        ));
    }

    #[tokio::test]
    async fn test_authenticate_writes_rotated_cookies() {
        let f = fixture();
        let identity = seed(&f.store, Role::Admin).await;
        let refresh = f.codec.issue_refresh(&identity.id, Role::Admin).unwrap();

        let jar = CookieJar::new().add(Cookie::new(REFRESH_COOKIE, refresh.token.clone()));
        let (jar, result) = f.guard.authenticate(jar).await;

        assert_eq!(result.unwrap().role, Role::Admin);
        let access = jar.get(ACCESS_COOKIE).unwrap();
        assert!(f.codec.verify_access(access.value()).is_ok());
        assert!(jar.get(REFRESH_COOKIE).unwrap().http_only().unwrap_or(false));
    }
}
