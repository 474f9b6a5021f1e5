//! Gateway middleware.

use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{Quota, clock::DefaultClock, state::keyed::DefaultKeyedStateStore};

use crate::auth::AuthError;

/// Decides whether a request keyed by `key` may proceed.
///
/// The in-process limiter only sees one instance; deployments with several
/// gateway instances need an implementation backed by shared storage.
pub trait RateLimiter: Send + Sync {
    /// Consume one unit of quota for `key`.
    fn allow(&self, key: &str) -> bool;
}

/// Checks between sweeps of keys whose quota has fully replenished.
const SWEEP_INTERVAL: usize = 1024;

/// Per-key rate limiter held in process memory.
pub struct InProcessRateLimiter {
    limiter: governor::RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>,
    checks: AtomicUsize,
}

impl InProcessRateLimiter {
    /// Create a limiter allowing `requests_per_minute` per key.
    #[must_use]
    pub fn new(requests_per_minute: u32) -> Self {
        let quota =
            Quota::per_minute(NonZeroU32::new(requests_per_minute).unwrap_or(NonZeroU32::MIN));
        Self {
            limiter: governor::RateLimiter::keyed(quota),
            checks: AtomicUsize::new(0),
        }
    }

    /// Number of keys currently tracked.
    #[must_use]
    pub fn tracked_keys(&self) -> usize {
        self.limiter.len()
    }

    /// Drop keys whose quota has fully replenished.
    pub fn sweep(&self) {
        self.limiter.retain_recent();
        self.limiter.shrink_to_fit();
    }
}

impl RateLimiter for InProcessRateLimiter {
    fn allow(&self, key: &str) -> bool {
        if self.checks.fetch_add(1, Ordering::Relaxed) % SWEEP_INTERVAL == SWEEP_INTERVAL - 1 {
            self.sweep();
        }
        let allowed = self.limiter.check_key(&key.to_string()).is_ok();
        if !allowed {
            tracing::warn!(key, "Rate limit exceeded");
        }
        allowed
    }
}

impl Default for InProcessRateLimiter {
    fn default() -> Self {
        Self::new(10) // 10 requests per minute
    }
}

impl std::fmt::Debug for InProcessRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InProcessRateLimiter").finish_non_exhaustive()
    }
}

/// Derives the rate-limit key for a request.
///
/// With no trusted proxies the key is the peer address. With `n` trusted
/// proxies, `X-Forwarded-For` hops are read right to left and the key is the
/// first address not appended by one of them, so client-supplied entries on
/// the left never decide the key.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClientKeys {
    trusted_proxies: usize,
}

impl ClientKeys {
    /// Key on the peer address only.
    #[must_use]
    pub const fn peer_only() -> Self {
        Self { trusted_proxies: 0 }
    }

    /// Trust `trusted_proxies` reverse proxies in front of the gateway.
    #[must_use]
    pub const fn behind_proxies(trusted_proxies: usize) -> Self {
        Self { trusted_proxies }
    }

    /// Key for `request`, or `unknown` without a peer address.
    #[must_use]
    pub fn key(&self, request: &Request) -> String {
        let peer = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|info| info.0.ip().to_string());

        if self.trusted_proxies == 0 {
            return peer.unwrap_or_else(|| "unknown".to_string());
        }

        // Nearest first: the peer, then forwarded hops right to left
        let forwarded: Vec<String> = request
            .headers()
            .get_all("x-forwarded-for")
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(String::from)
            .collect();
        let chain: Vec<String> = peer
            .into_iter()
            .chain(forwarded.into_iter().rev())
            .collect();

        chain
            .get(self.trusted_proxies.min(chain.len().saturating_sub(1)))
            .cloned()
            .unwrap_or_else(|| "unknown".to_string())
    }
}

/// Limiter plus key policy for the credential routes.
#[derive(Clone)]
pub struct RateLimitState {
    limiter: Arc<dyn RateLimiter>,
    keys: ClientKeys,
}

impl RateLimitState {
    /// Combine a limiter with a key policy.
    #[must_use]
    pub fn new(limiter: Arc<dyn RateLimiter>, keys: ClientKeys) -> Self {
        Self { limiter, keys }
    }
}

/// Middleware refusing requests over the limiter's quota with 429.
pub async fn rate_limit(
    State(state): State<RateLimitState>,
    request: Request,
    next: Next,
) -> Response {
    if state.limiter.allow(&state.keys.key(&request)) {
        next.run(request).await
    } else {
        AuthError::RateLimited.into_response()
    }
}
