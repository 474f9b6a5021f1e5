//! Session cookie transport.
//!
//! The token pair travels in two `HttpOnly` cookies scoped to `/`. Same-site
//! deployments use `SameSite=Lax`; cross-site deployments need
//! `SameSite=None`, which browsers only accept together with `Secure`.

use std::time::Duration;

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use time::Duration as TimeDuration;

use super::config::AuthSettings;
use super::tokens::TokenPair;

/// Access token cookie name.
pub const ACCESS_COOKIE: &str = "access_token";
/// Refresh token cookie name.
pub const REFRESH_COOKIE: &str = "refresh_token";

/// Raw token values presented by a client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionCookies {
    /// Access token, if sent.
    pub access: Option<String>,
    /// Refresh token, if sent.
    pub refresh: Option<String>,
}

/// Writes and reads the session cookies.
#[derive(Debug, Clone)]
pub struct CookieTransport {
    secure: bool,
    access_max_age: TimeDuration,
    refresh_max_age: TimeDuration,
}

impl CookieTransport {
    /// Create a transport whose cookie lifetimes match the token lifetimes.
    #[must_use]
    pub fn new(settings: &AuthSettings) -> Self {
        Self {
            secure: settings.secure_cookies,
            access_max_age: to_time(settings.access_lifetime),
            refresh_max_age: to_time(settings.refresh_lifetime),
        }
    }

    /// Whether cookies are emitted with `Secure; SameSite=None`.
    #[must_use]
    pub const fn is_secure(&self) -> bool {
        self.secure
    }

    const fn same_site(&self) -> SameSite {
        if self.secure {
            SameSite::None
        } else {
            SameSite::Lax
        }
    }

    fn cookie(&self, name: &'static str, value: String, max_age: TimeDuration) -> Cookie<'static> {
        Cookie::build((name, value))
            .path("/")
            .http_only(true)
            .secure(self.secure)
            .same_site(self.same_site())
            .max_age(max_age)
            .build()
    }

    /// Write both tokens into the jar.
    #[must_use]
    pub fn set_session(&self, jar: CookieJar, pair: &TokenPair) -> CookieJar {
        jar.add(self.cookie(ACCESS_COOKIE, pair.access.token.clone(), self.access_max_age))
            .add(self.cookie(REFRESH_COOKIE, pair.refresh.token.clone(), self.refresh_max_age))
    }

    /// Expire both cookies on the client.
    #[must_use]
    pub fn clear_session(&self, jar: CookieJar) -> CookieJar {
        jar.add(self.cookie(ACCESS_COOKIE, String::new(), TimeDuration::ZERO))
            .add(self.cookie(REFRESH_COOKIE, String::new(), TimeDuration::ZERO))
    }

    /// Read the presented tokens. Empty values count as absent.
    #[must_use]
    pub fn read(jar: &CookieJar) -> SessionCookies {
        let value = |name| {
            jar.get(name)
                .map(|c| c.value().to_string())
                .filter(|v| !v.is_empty())
        };

        SessionCookies {
            access: value(ACCESS_COOKIE),
            refresh: value(REFRESH_COOKIE),
        }
    }
}

fn to_time(lifetime: Duration) -> TimeDuration {
    TimeDuration::try_from(lifetime).unwrap_or(TimeDuration::MAX)
}
