//! # Jobboard Core
//!
//! Core types, configuration, and validation for the Jobboard auth core.
//!
//! This crate provides:
//! - Identity and role types shared by the gateway and the CLI
//! - Configuration loading (JSON5 file + environment overrides)
//! - Secret wrappers that keep key material out of logs
//! - Input validation and email normalization

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod secrets;
pub mod types;
pub mod validation;

pub use config::{
    AuthConfig, Config, ConfigError, Environment, FederationConfig, GoogleConfig, HashCostConfig,
    MAX_LIFETIME, RateLimitConfig, RoleRedirects, ServerConfig, parse_lifetime,
};
pub use secrets::{SecretValue, scrub_secrets};
pub use types::{IdentityId, Role};
pub use validation::{ValidationError, normalize_email};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::secrets::SecretValue;
    pub use crate::types::*;
    pub use crate::validation::normalize_email;
}
