//! Local secret hashing and verification.

use std::sync::Arc;

use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{
        self, PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng,
    },
};
use jobboard_core::config::HashCostConfig;
use serde::{Deserialize, Serialize};

use super::AuthError;

/// Argon2 cost parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashCost {
    /// Memory cost in KiB.
    pub memory_kib: u32,
    /// Number of passes.
    pub iterations: u32,
    /// Degree of parallelism.
    pub parallelism: u32,
}

impl HashCost {
    /// Cheapest parameters argon2 accepts. Tests and benchmarks only.
    #[must_use]
    pub const fn minimal() -> Self {
        Self {
            memory_kib: Params::MIN_M_COST,
            iterations: Params::MIN_T_COST,
            parallelism: Params::MIN_P_COST,
        }
    }
}

impl Default for HashCost {
    fn default() -> Self {
        Self {
            memory_kib: Params::DEFAULT_M_COST,
            iterations: Params::DEFAULT_T_COST,
            parallelism: Params::DEFAULT_P_COST,
        }
    }
}

impl From<HashCostConfig> for HashCost {
    fn from(config: HashCostConfig) -> Self {
        Self {
            memory_kib: config.memory_kib,
            iterations: config.iterations,
            parallelism: config.parallelism,
        }
    }
}

/// A stored secret hash in PHC string format.
///
/// Never empty: an identity either has a real hash or none at all.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SecretHash(String);

impl SecretHash {
    /// Wrap an existing PHC string.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Hashing` if the value is empty.
    pub fn new(phc: impl Into<String>) -> Result<Self, AuthError> {
        let phc = phc.into();
        if phc.trim().is_empty() {
            return Err(AuthError::Hashing("Secret hash cannot be empty".to_string()));
        }
        Ok(Self(phc))
    }

    /// PHC string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for SecretHash {
    type Error = AuthError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<SecretHash> for String {
    fn from(hash: SecretHash) -> Self {
        hash.0
    }
}

impl std::fmt::Debug for SecretHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SecretHash([REDACTED])")
    }
}

/// Hashing backend.
pub trait SecretHasher: Send + Sync {
    /// Hash a plaintext secret with a fresh salt.
    ///
    /// # Errors
    ///
    /// Returns error if hashing fails.
    fn hash(&self, secret: &str) -> Result<SecretHash, AuthError>;

    /// Check a plaintext secret against a stored hash.
    ///
    /// # Errors
    ///
    /// Returns error if the stored hash cannot be parsed.
    fn verify(&self, secret: &str, hash: &SecretHash) -> Result<bool, AuthError>;
}

/// Argon2id hasher.
#[derive(Debug, Clone)]
pub struct Argon2Hasher {
    params: Params,
}

impl Argon2Hasher {
    /// Create a hasher with the given cost.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Config` if argon2 rejects the parameters.
    pub fn new(cost: HashCost) -> Result<Self, AuthError> {
        let params = Params::new(cost.memory_kib, cost.iterations, cost.parallelism, None)
            .map_err(|e| AuthError::Config(format!("Invalid hash cost: {e}")))?;
        Ok(Self { params })
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }
}

impl SecretHasher for Argon2Hasher {
    fn hash(&self, secret: &str) -> Result<SecretHash, AuthError> {
        let salt = SaltString::generate(&mut OsRng);
        let phc = self
            .argon2()
            .hash_password(secret.as_bytes(), &salt)
            .map_err(|e| AuthError::Hashing(format!("Hashing failed: {e}")))?;
        SecretHash::new(phc.to_string())
    }

    fn verify(&self, secret: &str, hash: &SecretHash) -> Result<bool, AuthError> {
        let parsed = PasswordHash::new(hash.as_str())
            .map_err(|e| AuthError::Hashing(format!("Invalid hash: {e}")))?;

        // Cost parameters come from the PHC string, not from self.params
        match Argon2::default().verify_password(secret.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(password_hash::Error::Password) => Ok(false),
            Err(e) => Err(AuthError::Hashing(format!("Verification failed: {e}"))),
        }
    }
}

/// Checks presented secrets against stored hashes.
#[derive(Clone)]
pub struct CredentialVerifier {
    hasher: Arc<dyn SecretHasher>,
}

impl CredentialVerifier {
    /// Create a verifier over any hashing backend.
    #[must_use]
    pub fn new(hasher: Arc<dyn SecretHasher>) -> Self {
        Self { hasher }
    }

    /// Create a verifier backed by Argon2id.
    ///
    /// # Errors
    ///
    /// Returns error if the cost parameters are invalid.
    pub fn argon2(cost: HashCost) -> Result<Self, AuthError> {
        Ok(Self::new(Arc::new(Argon2Hasher::new(cost)?)))
    }

    /// Hash a new or changed secret.
    ///
    /// # Errors
    ///
    /// Returns error if hashing fails.
    pub fn hash(&self, secret: &str) -> Result<SecretHash, AuthError> {
        self.hasher.hash(secret)
    }

    /// Check a secret against an optional stored hash.
    ///
    /// Identities without a hash never verify, and no hashing work is done
    /// for them. A corrupt stored hash also fails closed.
    #[must_use]
    pub fn verify(&self, secret: &str, stored: Option<&SecretHash>) -> bool {
        let Some(hash) = stored else {
            return false;
        };

        match self.hasher.verify(secret, hash) {
            Ok(matches) => matches,
            Err(e) => {
                tracing::warn!("Stored secret hash unusable: {}", e);
                false
            }
        }
    }

    /// `hash` on the blocking pool.
    ///
    /// # Errors
    ///
    /// Returns error if hashing fails or the task is cancelled.
    pub async fn hash_blocking(&self, secret: String) -> Result<SecretHash, AuthError> {
        let verifier = self.clone();
        tokio::task::spawn_blocking(move || verifier.hash(&secret))
            .await
            .map_err(|e| AuthError::Hashing(format!("Hash task failed: {e}")))?
    }

    /// `verify` on the blocking pool. A cancelled task fails closed.
    pub async fn verify_blocking(&self, secret: String, stored: Option<SecretHash>) -> bool {
        if stored.is_none() {
            return false;
        }

        let verifier = self.clone();
        tokio::task::spawn_blocking(move || verifier.verify(&secret, stored.as_ref()))
            .await
            .unwrap_or(false)
    }
}

impl std::fmt::Debug for CredentialVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialVerifier").finish_non_exhaustive()
    }
}
