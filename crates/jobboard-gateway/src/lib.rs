//! # Jobboard Gateway
//!
//! Authentication and session core for the job board, served over HTTP.
//!
//! Sessions are a pair of signed tokens carried in `HttpOnly` cookies. The
//! session guard resolves them on protected routes, rotating the pair when
//! the access token has lapsed, and the role gate restricts routes by role.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Authentication and authorization.
pub mod auth;
mod handlers;
/// Rate limiting middleware.
pub mod middleware;
mod server;

pub use auth::{AuthError, AuthSettings, Identity, IdentityStore, PublicIdentity};
pub use handlers::{IdentityResponse, OkResponse};
pub use middleware::{ClientKeys, InProcessRateLimiter, RateLimitState, RateLimiter};
pub use server::{Gateway, GatewayBuilder, GatewayState};

use jobboard_core::Config;

/// Start the gateway server.
///
/// # Errors
///
/// Returns error if server fails to start.
pub async fn start(config: Config) -> Result<(), GatewayError> {
    let gateway = Gateway::new(config)?;
    gateway.run().await
}

/// Gateway errors.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Server error.
    #[error("Server error: {0}")]
    Server(String),

    /// Configuration error.
    #[error("Config error: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
