//! Configuration loading and validation.
//!
//! Supports JSON5 files with environment variable overrides.
//! Config location: `~/.jobboard/jobboard.json`

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::secrets::SecretValue;
use crate::types::Role;

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// IO error reading config file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON5 parsing error.
    #[error("Parse error: {0}")]
    Parse(#[from] json5::Error),

    /// Config validation error.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Missing required field.
    #[error("Missing required field: {0}")]
    MissingField(String),
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// HTTP server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Token and cookie configuration.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Third-party login configuration.
    #[serde(default)]
    pub federation: FederationConfig,

    /// Rate limiting for credential endpoints.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// # Errors
    ///
    /// Returns error if config cannot be loaded or parsed.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path.
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = json5::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a path.
    ///
    /// Secrets are never written back to disk.
    ///
    /// # Errors
    ///
    /// Returns error if serialization or file write fails.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::Validation(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default config file path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        Self::state_dir().join("jobboard.json")
    }

    /// Get the Jobboard state directory.
    ///
    /// Uses `JOBBOARD_STATE_DIR` env var if set, otherwise `~/.jobboard`.
    #[must_use]
    pub fn state_dir() -> PathBuf {
        if let Ok(dir) = std::env::var("JOBBOARD_STATE_DIR") {
            PathBuf::from(dir)
        } else if let Some(home) = dirs::home_dir() {
            home.join(".jobboard")
        } else {
            PathBuf::from(".jobboard")
        }
    }

    /// Directory holding the identity database.
    #[must_use]
    pub fn data_dir(&self) -> PathBuf {
        self.server
            .data_dir
            .clone()
            .unwrap_or_else(|| Self::state_dir().join("data"))
    }

    /// Whether the deployment runs in production mode.
    #[must_use]
    pub fn is_production(&self) -> bool {
        self.server.environment == Environment::Production
    }

    /// Whether cookies must be `Secure` + `SameSite=None`.
    ///
    /// Always true in production, otherwise follows `auth.cookieSecure`.
    #[must_use]
    pub fn cookie_secure(&self) -> bool {
        self.is_production() || self.auth.cookie_secure
    }

    /// Apply overrides from process environment variables.
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable source.
    #[must_use]
    pub fn with_overrides_from<F>(mut self, var: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| var(key).filter(|v| !v.trim().is_empty());

        if let Some(env) = var("JOBBOARD_ENV") {
            match env.parse() {
                Ok(env) => self.server.environment = env,
                Err(()) => tracing::warn!("Ignoring unknown JOBBOARD_ENV value: {}", env),
            }
        }
        if let Some(port) = var("PORT").and_then(|p| p.parse().ok()) {
            self.server.port = port;
        }
        if let Some(url) = var("FRONTEND_URL") {
            self.server.frontend_url = url;
        }
        if let Some(url) = var("BACKEND_URL") {
            self.server.backend_url = url;
        }
        if let Some(origins) = var("ALLOWED_ORIGINS") {
            self.server.allowed_origins = origins
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(String::from)
                .collect();
        }

        if let Some(secret) = var("JWT_ACCESS_SECRET") {
            self.auth.access_secret = Some(SecretValue::new(secret));
        }
        if let Some(secret) = var("JWT_REFRESH_SECRET") {
            self.auth.refresh_secret = Some(SecretValue::new(secret));
        }
        if let Some(expires) = var("JWT_ACCESS_EXPIRES") {
            self.auth.access_expires = expires;
        }
        if let Some(expires) = var("JWT_REFRESH_EXPIRES") {
            self.auth.refresh_expires = expires;
        }
        if let Some(secure) = var("COOKIE_SECURE") {
            self.auth.cookie_secure = secure.eq_ignore_ascii_case("true") || secure == "1";
        }

        if let Some(client_id) = var("GOOGLE_CLIENT_ID") {
            let google = self.federation.google.get_or_insert_with(GoogleConfig::default);
            google.client_id = client_id;
        }
        if let Some(client_secret) = var("GOOGLE_CLIENT_SECRET") {
            let google = self.federation.google.get_or_insert_with(GoogleConfig::default);
            google.client_secret = Some(SecretValue::new(client_secret));
        }

        if let Some(limit) = var("AUTH_RATE_LIMIT_PER_MIN").and_then(|v| v.parse().ok()) {
            self.rate_limit.auth_requests_per_minute = limit;
        }
        if let Some(hops) = var("TRUSTED_PROXIES").and_then(|v| v.parse().ok()) {
            self.rate_limit.trusted_proxies = hops;
        }

        self
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` describing the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Validation(
                "Server port cannot be 0".to_string(),
            ));
        }

        if self.server.frontend_url.trim().is_empty() {
            return Err(ConfigError::MissingField("server.frontendUrl".to_string()));
        }

        if self.rate_limit.auth_requests_per_minute == 0 {
            return Err(ConfigError::Validation(
                "rateLimit.authRequestsPerMinute must be positive".to_string(),
            ));
        }

        if let Some(google) = &self.federation.google {
            if google.client_id.trim().is_empty() {
                return Err(ConfigError::MissingField(
                    "federation.google.clientId".to_string(),
                ));
            }
        }

        Ok(())
    }
}

/// Deployment environment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Local development; relaxed cookie flags, generated secrets allowed.
    #[default]
    Development,
    /// Production; secure cookies and explicit secrets required.
    Production,
}

impl std::str::FromStr for Environment {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            _ => Err(()),
        }
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Bind address.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Deployment environment.
    #[serde(default)]
    pub environment: Environment,

    /// Public URL of the web frontend (redirect target after federation).
    #[serde(default = "default_frontend_url")]
    pub frontend_url: String,

    /// Public URL of this server (OAuth callback base).
    #[serde(default = "default_backend_url")]
    pub backend_url: String,

    /// Origins allowed to call the API with credentials.
    #[serde(default)]
    pub allowed_origins: Vec<String>,

    /// Data directory override.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind_address: default_bind_address(),
            environment: Environment::default(),
            frontend_url: default_frontend_url(),
            backend_url: default_backend_url(),
            allowed_origins: Vec::new(),
            data_dir: None,
            timeout_secs: default_timeout(),
        }
    }
}

impl ServerConfig {
    /// Origins allowed for CORS, falling back to the frontend URL.
    #[must_use]
    pub fn cors_origins(&self) -> Vec<String> {
        if self.allowed_origins.is_empty() {
            vec![self.frontend_url.clone()]
        } else {
            self.allowed_origins.clone()
        }
    }
}

const fn default_port() -> u16 {
    4000
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_frontend_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_backend_url() -> String {
    "http://localhost:4000".to_string()
}

const fn default_timeout() -> u64 {
    30
}

/// Token and cookie configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthConfig {
    /// Access token signing secret.
    #[serde(default, skip_serializing)]
    pub access_secret: Option<SecretValue>,

    /// Refresh token signing secret. Must differ from the access secret.
    #[serde(default, skip_serializing)]
    pub refresh_secret: Option<SecretValue>,

    /// Access token lifetime (`900` or `"15m"`).
    #[serde(default = "default_access_expires")]
    pub access_expires: String,

    /// Refresh token lifetime (`604800` or `"7d"`).
    #[serde(default = "default_refresh_expires")]
    pub refresh_expires: String,

    /// Force `Secure` + `SameSite=None` cookies outside production.
    #[serde(default)]
    pub cookie_secure: bool,

    /// Password hashing cost.
    #[serde(default)]
    pub hash_cost: HashCostConfig,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            access_secret: None,
            refresh_secret: None,
            access_expires: default_access_expires(),
            refresh_expires: default_refresh_expires(),
            cookie_secure: false,
            hash_cost: HashCostConfig::default(),
        }
    }
}

fn default_access_expires() -> String {
    "15m".to_string()
}

fn default_refresh_expires() -> String {
    "7d".to_string()
}

/// Argon2 cost parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HashCostConfig {
    /// Memory cost in KiB.
    #[serde(default = "default_memory_kib")]
    pub memory_kib: u32,
    /// Number of passes.
    #[serde(default = "default_iterations")]
    pub iterations: u32,
    /// Degree of parallelism.
    #[serde(default = "default_parallelism")]
    pub parallelism: u32,
}

impl Default for HashCostConfig {
    fn default() -> Self {
        Self {
            memory_kib: default_memory_kib(),
            iterations: default_iterations(),
            parallelism: default_parallelism(),
        }
    }
}

// argon2 crate defaults (OWASP minimum for Argon2id)
const fn default_memory_kib() -> u32 {
    19 * 1024
}

const fn default_iterations() -> u32 {
    2
}

const fn default_parallelism() -> u32 {
    1
}

/// Third-party login configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FederationConfig {
    /// Google OAuth client. Federation routes are disabled when absent.
    #[serde(default)]
    pub google: Option<GoogleConfig>,

    /// Post-login destinations by role.
    #[serde(default)]
    pub redirects: RoleRedirects,
}

/// Google OAuth client credentials.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleConfig {
    /// OAuth client ID.
    #[serde(default)]
    pub client_id: String,

    /// OAuth client secret.
    #[serde(default, skip_serializing)]
    pub client_secret: Option<SecretValue>,
}

/// Post-login destination paths, relative to the frontend URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleRedirects {
    /// Destination for job seekers.
    #[serde(default)]
    pub seeker: Option<String>,
    /// Destination for employers.
    #[serde(default)]
    pub employer: Option<String>,
    /// Destination for administrators.
    #[serde(default)]
    pub admin: Option<String>,
    /// Destination for roles without an entry.
    #[serde(default = "default_redirect")]
    pub fallback: String,
}

impl Default for RoleRedirects {
    fn default() -> Self {
        Self {
            seeker: Some("/".to_string()),
            employer: Some("/dashboard".to_string()),
            admin: Some("/admin".to_string()),
            fallback: default_redirect(),
        }
    }
}

impl RoleRedirects {
    /// Destination path for a role.
    #[must_use]
    pub fn destination(&self, role: Role) -> &str {
        let mapped = match role {
            Role::Seeker => self.seeker.as_deref(),
            Role::Employer => self.employer.as_deref(),
            Role::Admin => self.admin.as_deref(),
        };
        mapped.unwrap_or(&self.fallback)
    }
}

fn default_redirect() -> String {
    "/".to_string()
}

/// Rate limiting for credential endpoints.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitConfig {
    /// Login/registration attempts allowed per client per minute.
    #[serde(default = "default_auth_rate")]
    pub auth_requests_per_minute: u32,
    /// Reverse proxies in front of the gateway whose `X-Forwarded-For`
    /// entries are trusted. Zero keys clients by peer address only.
    #[serde(default)]
    pub trusted_proxies: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            auth_requests_per_minute: default_auth_rate(),
            trusted_proxies: 0,
        }
    }
}

const fn default_auth_rate() -> u32 {
    10
}

/// Longest accepted token lifetime (ten years).
pub const MAX_LIFETIME: Duration = Duration::from_secs(10 * 31_557_600);

/// Parse a token lifetime.
///
/// Accepts a plain integer (seconds) or a number followed by one of
/// `ms`, `s`, `m`, `h`, `d`, `w`, `y` (case-insensitive). Returns `None` for
/// anything else, and for lifetimes above [`MAX_LIFETIME`], so callers can
/// fall back to their default.
#[must_use]
pub fn parse_lifetime(value: &str) -> Option<Duration> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    let digits_end = value
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(value.len());
    if digits_end == 0 {
        return None;
    }

    let amount: u64 = value[..digits_end].parse().ok()?;
    let unit = value[digits_end..].to_ascii_lowercase();

    let lifetime = match unit.as_str() {
        "ms" => Some(Duration::from_millis(amount)),
        _ => seconds_per_unit(&unit)
            .and_then(|per_unit| amount.checked_mul(per_unit))
            .map(Duration::from_secs),
    };
    lifetime.filter(|d| *d <= MAX_LIFETIME)
}

fn seconds_per_unit(unit: &str) -> Option<u64> {
    Some(match unit {
        "" | "s" => 1,
        "m" => 60,
        "h" => 3600,
        "d" => 86_400,
        "w" => 7 * 86_400,
        // 365.25 days
        "y" => 31_557_600,
        _ => return None,
    })
}
