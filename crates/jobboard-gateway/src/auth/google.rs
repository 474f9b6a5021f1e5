//! Google OAuth 2.0 client.
//!
//! Authorization-code flow with PKCE. The CSRF token and PKCE verifier
//! travel in a short-lived cookie between the start and callback requests.
//! After the code exchange the userinfo endpoint supplies the assertion
//! handed to the federation bridge.

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use jobboard_core::{SecretValue, scrub_secrets};
use jobboard_core::config::GoogleConfig;
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, PkceCodeChallenge,
    PkceCodeVerifier, RedirectUrl, Scope, TokenResponse, TokenUrl, basic::BasicClient,
};
use serde::{Deserialize, Serialize};
use time::Duration as TimeDuration;

use super::AuthError;
use super::federation::FederatedAssertion;

/// Google OAuth authorization URL.
const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";

/// Google OAuth token URL.
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Google OpenID userinfo URL.
const GOOGLE_USERINFO_URL: &str = "https://openidconnect.googleapis.com/v1/userinfo";

const SCOPES: &[&str] = &["openid", "email", "profile"];

/// Cookie carrying the OAuth state between start and callback.
pub const GOOGLE_STATE_COOKIE: &str = "google_oauth_state";

/// Path of the callback route, relative to the backend URL.
pub const CALLBACK_PATH: &str = "/api/auth/google/callback";

/// State stored during the OAuth flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoogleAuthState {
    /// CSRF token echoed back by Google as `state`.
    pub csrf_token: String,
    /// PKCE verifier for the code exchange.
    pub pkce_verifier: String,
}

#[derive(Debug, Deserialize)]
struct GoogleUserInfo {
    email: Option<String>,
    #[serde(default)]
    email_verified: bool,
    #[serde(default)]
    name: Option<String>,
}

/// Google OAuth client.
#[derive(Clone)]
pub struct GoogleOAuthClient {
    client_id: ClientId,
    client_secret: SecretValue,
    auth_url: AuthUrl,
    token_url: TokenUrl,
    redirect_url: RedirectUrl,
    userinfo_url: String,
    http: reqwest::Client,
    secure_cookies: bool,
}

impl GoogleOAuthClient {
    /// Create a client whose callback lives under `backend_url`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Config` if the client secret is missing or a URL
    /// is invalid.
    pub fn new(
        config: &GoogleConfig,
        backend_url: &str,
        secure_cookies: bool,
    ) -> Result<Self, AuthError> {
        let client_secret = config
            .client_secret
            .clone()
            .ok_or_else(|| AuthError::Config("GOOGLE_CLIENT_SECRET is not set".to_string()))?;

        let redirect = format!("{}{CALLBACK_PATH}", backend_url.trim_end_matches('/'));
        let redirect_url = RedirectUrl::new(redirect)
            .map_err(|e| AuthError::Config(format!("Invalid redirect URL: {e}")))?;

        // Don't follow redirects from the token endpoint
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| AuthError::Config(format!("HTTP client error: {e}")))?;

        Ok(Self {
            client_id: ClientId::new(config.client_id.clone()),
            client_secret,
            auth_url: parse_auth_url(GOOGLE_AUTH_URL)?,
            token_url: parse_token_url(GOOGLE_TOKEN_URL)?,
            redirect_url,
            userinfo_url: GOOGLE_USERINFO_URL.to_string(),
            http,
            secure_cookies,
        })
    }

    fn client_secret(&self) -> ClientSecret {
        ClientSecret::new(String::from_utf8_lossy(self.client_secret.expose()).into_owned())
    }

    /// Build the consent URL and the state to keep until the callback.
    #[must_use]
    pub fn authorization_url(&self) -> (String, GoogleAuthState) {
        let client = BasicClient::new(self.client_id.clone())
            .set_client_secret(self.client_secret())
            .set_auth_uri(self.auth_url.clone())
            .set_redirect_uri(self.redirect_url.clone());

        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

        let mut request = client
            .authorize_url(CsrfToken::new_random)
            .set_pkce_challenge(pkce_challenge);
        for scope in SCOPES {
            request = request.add_scope(Scope::new((*scope).to_string()));
        }
        request = request.add_extra_param("prompt", "select_account");

        let (url, csrf_token) = request.url();

        let state = GoogleAuthState {
            csrf_token: csrf_token.secret().clone(),
            pkce_verifier: pkce_verifier.secret().clone(),
        };

        (url.to_string(), state)
    }

    /// Exchange the authorization code and fetch the user's profile.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Federation` if Google rejects the exchange or the
    /// profile cannot be fetched.
    pub async fn exchange_code(
        &self,
        code: &str,
        state: &GoogleAuthState,
    ) -> Result<FederatedAssertion, AuthError> {
        let client = BasicClient::new(self.client_id.clone())
            .set_client_secret(self.client_secret())
            .set_token_uri(self.token_url.clone())
            .set_redirect_uri(self.redirect_url.clone());

        let token = client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .set_pkce_verifier(PkceCodeVerifier::new(state.pkce_verifier.clone()))
            .request_async(&self.http)
            .await
            .map_err(|e| federation_err("Token exchange failed", &e))?;

        let info: GoogleUserInfo = self
            .http
            .get(&self.userinfo_url)
            .bearer_auth(token.access_token().secret())
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| federation_err("Userinfo request failed", &e))?
            .json()
            .await
            .map_err(|e| federation_err("Userinfo decode failed", &e))?;

        Ok(FederatedAssertion {
            provider: "google".to_string(),
            email: info.email.unwrap_or_default(),
            email_verified: info.email_verified,
            display_name: info.name.unwrap_or_default(),
        })
    }

    /// Store the OAuth state in a cookie for the callback.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Config` if the state cannot be serialized.
    pub fn store_state(&self, jar: CookieJar, state: &GoogleAuthState) -> Result<CookieJar, AuthError> {
        let value = serde_json::to_string(state)
            .map_err(|e| AuthError::Config(format!("OAuth state encoding failed: {e}")))?;
        Ok(jar.add(self.state_cookie(value, TimeDuration::minutes(10))))
    }

    /// Take the OAuth state out of the jar, expiring the cookie.
    #[must_use]
    pub fn take_state(&self, jar: CookieJar) -> (CookieJar, Option<GoogleAuthState>) {
        let state = jar
            .get(GOOGLE_STATE_COOKIE)
            .and_then(|c| serde_json::from_str(c.value()).ok());
        (jar.add(self.state_cookie(String::new(), TimeDuration::ZERO)), state)
    }

    // Lax so the cookie survives the top-level redirect back from Google
    fn state_cookie(&self, value: String, max_age: TimeDuration) -> Cookie<'static> {
        Cookie::build((GOOGLE_STATE_COOKIE, value))
            .path("/")
            .http_only(true)
            .secure(self.secure_cookies)
            .same_site(SameSite::Lax)
            .max_age(max_age)
            .build()
    }
}

// Provider errors can echo request URLs
fn federation_err(context: &str, e: &dyn std::fmt::Display) -> AuthError {
    let message = scrub_secrets(&e.to_string(), &["code=", "access_token=", "client_secret="]);
    AuthError::Federation(format!("{context}: {message}"))
}

fn parse_auth_url(url: &str) -> Result<AuthUrl, AuthError> {
    AuthUrl::new(url.to_string()).map_err(|e| AuthError::Config(format!("Invalid auth URL: {e}")))
}

fn parse_token_url(url: &str) -> Result<TokenUrl, AuthError> {
    TokenUrl::new(url.to_string())
        .map_err(|e| AuthError::Config(format!("Invalid token URL: {e}")))
}

impl std::fmt::Debug for GoogleOAuthClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleOAuthClient")
            .field("client_id", &self.client_id.as_str())
            .field("client_secret", &"[REDACTED]")
            .field("redirect_url", &self.redirect_url.as_str())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> GoogleConfig {
        GoogleConfig {
            client_id: "client-123.apps.googleusercontent.com".to_string(),
            client_secret: Some(SecretValue::new("shh")),
        }
    }

    #[test]
    fn test_authorization_url_carries_pkce_and_state() {
        let client = GoogleOAuthClient::new(&config(), "http://localhost:4000/", false).unwrap();
        let (url, state) = client.authorization_url();

        assert!(url.starts_with(GOOGLE_AUTH_URL));
        assert!(url.contains("client_id=client-123.apps.googleusercontent.com"));
        assert!(url.contains("code_challenge_method=S256"));
        assert!(url.contains(&format!("state={}", state.csrf_token)));
        assert!(url.contains("scope=openid+email+profile"));
        assert!(url.contains("localhost%3A4000%2Fapi%2Fauth%2Fgoogle%2Fcallback"));
        assert!(!state.pkce_verifier.is_empty());
    }

    #[test]
    fn test_missing_secret_rejected() {
        let mut config = config();
        config.client_secret = None;
        assert!(matches!(
            GoogleOAuthClient::new(&config, "http://localhost:4000", false),
            Err(AuthError::Config(_))
        ));
    }

    #[test]
    fn test_invalid_backend_url_rejected() {
        assert!(GoogleOAuthClient::new(&config(), "not a url", false).is_err());
    }

    #[test]
    fn test_state_cookie_round_trip() {
        let client = GoogleOAuthClient::new(&config(), "http://localhost:4000", true).unwrap();
        let (_, state) = client.authorization_url();

        let jar = client.store_state(CookieJar::new(), &state).unwrap();
        let cookie = jar.get(GOOGLE_STATE_COOKIE).unwrap();
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
        assert_eq!(cookie.secure(), Some(true));

        let (jar, taken) = client.take_state(jar);
        assert_eq!(taken, Some(state));
        assert_eq!(jar.get(GOOGLE_STATE_COOKIE).unwrap().value(), "");
    }

    #[test]
    fn test_debug_redacts_secret() {
        let client = GoogleOAuthClient::new(&config(), "http://localhost:4000", false).unwrap();
        assert!(!format!("{client:?}").contains("shh"));
    }
}
