//! Third-party login federation.
//!
//! Turns a verified provider assertion into a local session:
//! validate the assertion, find or create the identity by email, issue the
//! token pair and choose a landing page by role.
//!
//! An assertion whose email matches an identity that also has a local
//! secret signs in as that identity without checking the secret. The
//! provider's email verification is the only proof of ownership, so such
//! merges are logged.

use std::sync::Arc;

use axum::response::Redirect;
use axum_extra::extract::CookieJar;
use jobboard_core::config::RoleRedirects;
use jobboard_core::validation::sanitize_display_name;
use jobboard_core::{Role, normalize_email};

use super::AuthError;
use super::cookies::CookieTransport;
use super::identity::{Identity, IdentityStore, NewIdentity};
use super::tokens::{TokenCodec, TokenPair};

/// Identity claims vouched for by an external provider.
#[derive(Debug, Clone)]
pub struct FederatedAssertion {
    /// Provider name, e.g. `google`.
    pub provider: String,
    /// Email address reported by the provider.
    pub email: String,
    /// Whether the provider verified the email.
    pub email_verified: bool,
    /// Display name reported by the provider.
    pub display_name: String,
}

/// Result of a successful federated sign-in.
#[derive(Debug, Clone)]
pub struct FederatedLogin {
    /// The local identity signed in.
    pub identity: Identity,
    /// Whether the identity was created by this sign-in.
    pub created: bool,
    /// Session tokens.
    pub pair: TokenPair,
    /// Absolute URL to send the browser to.
    pub redirect: String,
}

/// Reconciles provider assertions with local identities.
pub struct FederationBridge {
    codec: Arc<TokenCodec>,
    store: Arc<dyn IdentityStore>,
    cookies: CookieTransport,
    redirects: RoleRedirects,
    frontend_url: String,
}

impl FederationBridge {
    /// Create a bridge.
    #[must_use]
    pub fn new(
        codec: Arc<TokenCodec>,
        store: Arc<dyn IdentityStore>,
        cookies: CookieTransport,
        redirects: RoleRedirects,
        frontend_url: impl Into<String>,
    ) -> Self {
        Self {
            codec,
            store,
            cookies,
            redirects,
            frontend_url: frontend_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Sign in with a provider assertion, creating the identity if needed.
    ///
    /// # Errors
    ///
    /// - `InvalidAssertion` if the email is missing, malformed or unverified
    /// - `AccountDisabled` if the matching identity is inactive
    /// - storage and encoding errors
    pub async fn complete(&self, assertion: FederatedAssertion) -> Result<FederatedLogin, AuthError> {
        let email = normalize_email(&assertion.email)
            .map_err(|e| AuthError::InvalidAssertion(e.to_string()))?;

        if !assertion.email_verified {
            return Err(AuthError::InvalidAssertion(format!(
                "{} did not verify the email address",
                assertion.provider
            )));
        }

        let (identity, created) = self.find_or_create(&email, &assertion).await?;

        if !identity.active {
            tracing::warn!(identity = %identity.id, provider = %assertion.provider, "Federated sign-in to inactive identity");
            return Err(AuthError::AccountDisabled);
        }

        if !created && identity.has_local_secret() {
            tracing::warn!(
                identity = %identity.id,
                provider = %assertion.provider,
                "Federated sign-in attached to identity with a local secret"
            );
        }

        let identity = self.store.record_login(&identity.id).await?;
        let pair = self.codec.issue_pair(&identity.id, identity.role)?;
        let redirect = self.redirect_for(identity.role);

        tracing::info!(
            identity = %identity.id,
            role = %identity.role,
            provider = %assertion.provider,
            created,
            "Federated sign-in, redirecting to {}",
            redirect
        );

        Ok(FederatedLogin {
            identity,
            created,
            pair,
            redirect,
        })
    }

    async fn find_or_create(
        &self,
        email: &str,
        assertion: &FederatedAssertion,
    ) -> Result<(Identity, bool), AuthError> {
        if let Some(existing) = self.store.find_by_email(email).await? {
            return Ok((existing, false));
        }

        let name = sanitize_display_name(&assertion.display_name)
            .unwrap_or_else(|_| email.split('@').next().unwrap_or(email).to_string());

        match self.store.create(NewIdentity::federated(email, name)).await {
            Ok(identity) => Ok((identity, true)),
            // Lost a concurrent create for the same email; use the winner
            Err(AuthError::EmailTaken) => self
                .store
                .find_by_email(email)
                .await?
                .map(|identity| (identity, false))
                .ok_or_else(|| {
                    AuthError::Storage(format!("identity for {email} vanished after conflict"))
                }),
            Err(e) => Err(e),
        }
    }

    /// Absolute landing URL for a role.
    #[must_use]
    pub fn redirect_for(&self, role: Role) -> String {
        format!("{}{}", self.frontend_url, self.redirects.destination(role))
    }

    /// Absolute URL of the login page carrying an error code.
    #[must_use]
    pub fn failure_redirect(&self, error: &str) -> String {
        format!("{}/login?error={error}", self.frontend_url)
    }

    /// Set the session cookies and redirect to the landing page.
    #[must_use]
    pub fn respond(&self, jar: CookieJar, login: &FederatedLogin) -> (CookieJar, Redirect) {
        (
            self.cookies.set_session(jar, &login.pair),
            Redirect::to(&login.redirect),
        )
    }
}

impl std::fmt::Debug for FederationBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FederationBridge")
            .field("redirects", &self.redirects)
            .field("frontend_url", &self.frontend_url)
            .finish_non_exhaustive()
    }
}
