//! Identity model and storage.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jobboard_core::{IdentityId, Role};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::AuthError;
use super::credentials::SecretHash;

const EMAIL_INDEX_PREFIX: &str = "idx:email:";

/// A user identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    /// Unique, immutable identity ID.
    pub id: IdentityId,
    /// Email address, stored lowercased.
    pub email: String,
    /// Display name.
    pub name: String,
    /// Local secret hash. Absent for federation-only identities.
    #[serde(default)]
    pub secret_hash: Option<SecretHash>,
    /// Role.
    #[serde(default)]
    pub role: Role,
    /// Whether the identity may authenticate.
    pub active: bool,
    /// When the identity was created.
    pub created_at: DateTime<Utc>,
    /// When the identity was last modified.
    pub updated_at: DateTime<Utc>,
    /// When the identity last established a session.
    #[serde(default)]
    pub last_login: Option<DateTime<Utc>>,
    /// Store revision, bumped on every `update`.
    #[serde(default)]
    pub version: u64,
}

impl Identity {
    fn from_new(new: NewIdentity) -> Self {
        let now = Utc::now();
        Self {
            id: IdentityId::generate(),
            email: email_key(&new.email),
            name: new.name,
            secret_hash: new.secret_hash,
            role: new.role,
            active: true,
            created_at: now,
            updated_at: now,
            last_login: None,
            version: 0,
        }
    }

    /// Whether the identity can sign in with a local secret.
    #[must_use]
    pub const fn has_local_secret(&self) -> bool {
        self.secret_hash.is_some()
    }

    /// Replace the local secret with an already computed hash.
    pub fn set_secret(&mut self, hash: SecretHash) {
        self.secret_hash = Some(hash);
        self.updated_at = Utc::now();
    }

    /// Change the role.
    pub fn set_role(&mut self, role: Role) {
        self.role = role;
        self.updated_at = Utc::now();
    }

    /// Enable or disable the identity.
    pub fn set_active(&mut self, active: bool) {
        self.active = active;
        self.updated_at = Utc::now();
    }

    /// Record a successful sign-in.
    pub fn record_login(&mut self) {
        self.last_login = Some(Utc::now());
    }

    /// Create a safe version for API responses (no secret hash).
    #[must_use]
    pub fn to_public(&self) -> PublicIdentity {
        PublicIdentity {
            id: self.id.clone(),
            email: self.email.clone(),
            name: self.name.clone(),
            role: self.role,
            active: self.active,
            local_sign_in: self.has_local_secret(),
            created_at: self.created_at,
            last_login: self.last_login,
        }
    }
}

/// Public identity representation (for API responses).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicIdentity {
    /// Identity ID.
    pub id: IdentityId,
    /// Email address.
    pub email: String,
    /// Display name.
    pub name: String,
    /// Role.
    pub role: Role,
    /// Whether active.
    pub active: bool,
    /// Whether a local secret is set.
    pub local_sign_in: bool,
    /// When created.
    pub created_at: DateTime<Utc>,
    /// Last sign-in.
    pub last_login: Option<DateTime<Utc>>,
}

/// Fields for a new identity.
#[derive(Debug, Clone)]
pub struct NewIdentity {
    /// Email address.
    pub email: String,
    /// Display name.
    pub name: String,
    /// Hashed local secret, if any.
    pub secret_hash: Option<SecretHash>,
    /// Initial role.
    pub role: Role,
}

impl NewIdentity {
    /// Identity that signs in with a local secret.
    #[must_use]
    pub fn local(
        email: impl Into<String>,
        name: impl Into<String>,
        secret_hash: SecretHash,
        role: Role,
    ) -> Self {
        Self {
            email: email.into(),
            name: name.into(),
            secret_hash: Some(secret_hash),
            role,
        }
    }

    /// Federation-only identity: no secret, least privileged role.
    #[must_use]
    pub fn federated(email: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            name: name.into(),
            secret_hash: None,
            role: Role::default(),
        }
    }
}

/// Storage for identities.
///
/// Implementations must guarantee email uniqueness (case-insensitive).
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Look up an identity by ID.
    async fn find_by_id(&self, id: &IdentityId) -> Result<Option<Identity>, AuthError>;

    /// Look up an identity by email (case-insensitive).
    async fn find_by_email(&self, email: &str) -> Result<Option<Identity>, AuthError>;

    /// Create an identity. Fails with `AuthError::EmailTaken` on a duplicate email.
    async fn create(&self, new: NewIdentity) -> Result<Identity, AuthError>;

    /// Persist changes to an existing identity. The email cannot change.
    ///
    /// Fails with `AuthError::Conflict` if the stored revision moved on since
    /// `identity` was read. The stored `last_login` is kept.
    async fn update(&self, identity: &Identity) -> Result<(), AuthError>;

    /// All identities, newest first.
    async fn list(&self) -> Result<Vec<Identity>, AuthError>;

    /// Number of identities.
    async fn count(&self) -> Result<usize, AuthError>;

    /// Stamp the last login time and return the current record.
    ///
    /// Touches nothing but `last_login`, atomically with the active check:
    /// fails with `AuthError::AccountDisabled` if the identity is inactive.
    async fn record_login(&self, id: &IdentityId) -> Result<Identity, AuthError>;
}

/// Canonical form of an email for indexing.
fn email_key(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Next stored revision of `existing` carrying the caller's changes.
fn revise(existing: &Identity, changed: &Identity) -> Result<Identity, AuthError> {
    if existing.email != changed.email {
        return Err(AuthError::Validation("email cannot be changed".to_string()));
    }
    if existing.version != changed.version {
        return Err(AuthError::Conflict);
    }

    let mut next = changed.clone();
    next.last_login = existing.last_login;
    next.version = existing.version + 1;
    Ok(next)
}

fn stamp_login(mut existing: Identity) -> Result<Identity, AuthError> {
    if !existing.active {
        return Err(AuthError::AccountDisabled);
    }
    existing.record_login();
    Ok(existing)
}

fn decode(value: &[u8]) -> Result<Identity, AuthError> {
    serde_json::from_slice(value)
        .map_err(|e| AuthError::Storage(format!("Deserialization error: {e}")))
}

fn encode(identity: &Identity) -> Result<Vec<u8>, AuthError> {
    serde_json::to_vec(identity)
        .map_err(|e| AuthError::Storage(format!("Serialization error: {e}")))
}

fn storage_err(context: &str) -> impl Fn(sled::Error) -> AuthError + '_ {
    move |e| AuthError::Storage(format!("{context}: {e}"))
}

/// Identity store backed by sled.
pub struct SledIdentityStore {
    db: sled::Db,
    tree: sled::Tree,
}

impl SledIdentityStore {
    /// Open or create an identity store under the given directory.
    ///
    /// # Errors
    ///
    /// Returns error if database cannot be opened.
    pub fn open(path: &Path) -> Result<Self, AuthError> {
        let db = sled::open(path.join("identities"))
            .map_err(storage_err("Failed to open identity database"))?;
        Self::with_db(db)
    }

    /// Create a store over an existing sled database.
    ///
    /// # Errors
    ///
    /// Returns error if tree cannot be opened.
    pub fn with_db(db: sled::Db) -> Result<Self, AuthError> {
        let tree = db
            .open_tree("identities")
            .map_err(storage_err("Failed to open identities tree"))?;
        Ok(Self { db, tree })
    }

    fn get(&self, id: &str) -> Result<Option<Identity>, AuthError> {
        self.tree
            .get(id.as_bytes())
            .map_err(storage_err("Get error"))?
            .map(|value| decode(&value))
            .transpose()
    }

    fn put(&self, identity: &Identity) -> Result<(), AuthError> {
        self.tree
            .insert(identity.id.as_str().as_bytes(), encode(identity)?)
            .map_err(storage_err("Insert error"))?;
        Ok(())
    }

    /// Replace a record with `change(current)` by compare-and-swap, rereading
    /// and reapplying when another writer got in first.
    fn modify<F>(&self, id: &IdentityId, change: F) -> Result<Identity, AuthError>
    where
        F: Fn(Identity) -> Result<Identity, AuthError>,
    {
        let key = id.as_str().as_bytes();
        loop {
            let current = self
                .tree
                .get(key)
                .map_err(storage_err("Get error"))?
                .ok_or_else(|| AuthError::NotFound(format!("identity {id}")))?;

            let next = change(decode(&current)?)?;
            let swapped = self
                .tree
                .compare_and_swap(key, Some(&current), Some(encode(&next)?))
                .map_err(storage_err("Update error"))?;

            match swapped {
                Ok(()) => return Ok(next),
                Err(_) => {
                    tracing::debug!(identity = %id, "Identity changed during write, retrying");
                }
            }
        }
    }

    async fn flush(&self) -> Result<(), AuthError> {
        self.db
            .flush_async()
            .await
            .map_err(storage_err("Flush error"))?;
        Ok(())
    }
}

#[async_trait]
impl IdentityStore for SledIdentityStore {
    async fn find_by_id(&self, id: &IdentityId) -> Result<Option<Identity>, AuthError> {
        self.get(id.as_str())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Identity>, AuthError> {
        let index_key = format!("{EMAIL_INDEX_PREFIX}{}", email_key(email));
        match self
            .tree
            .get(index_key.as_bytes())
            .map_err(storage_err("Index lookup error"))?
        {
            Some(id_bytes) => self.get(&String::from_utf8_lossy(&id_bytes)),
            None => Ok(None),
        }
    }

    async fn create(&self, new: NewIdentity) -> Result<Identity, AuthError> {
        let identity = Identity::from_new(new);
        let index_key = format!("{EMAIL_INDEX_PREFIX}{}", identity.email);

        // Claim the email first; losing the race means someone else owns it
        let claimed = self
            .tree
            .compare_and_swap(
                index_key.as_bytes(),
                None as Option<&[u8]>,
                Some(identity.id.as_str().as_bytes()),
            )
            .map_err(storage_err("Index error"))?;
        if claimed.is_err() {
            return Err(AuthError::EmailTaken);
        }

        if let Err(e) = self.put(&identity) {
            // Release the claim so the email is not locked forever
            let _ = self.tree.remove(index_key.as_bytes());
            return Err(e);
        }

        self.flush().await?;
        Ok(identity)
    }

    async fn update(&self, identity: &Identity) -> Result<(), AuthError> {
        self.modify(&identity.id, |existing| revise(&existing, identity))?;
        self.flush().await
    }

    async fn record_login(&self, id: &IdentityId) -> Result<Identity, AuthError> {
        let identity = self.modify(id, stamp_login)?;
        self.flush().await?;
        Ok(identity)
    }

    async fn list(&self) -> Result<Vec<Identity>, AuthError> {
        let mut identities = Vec::new();

        for result in self.tree.iter() {
            let (key, value) = result.map_err(storage_err("Iter error"))?;

            // Skip index entries
            if key.starts_with(b"idx:") {
                continue;
            }

            identities.push(decode(&value)?);
        }

        identities.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(identities)
    }

    async fn count(&self) -> Result<usize, AuthError> {
        Ok(self.tree.scan_prefix(EMAIL_INDEX_PREFIX).count())
    }
}

impl std::fmt::Debug for SledIdentityStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SledIdentityStore")
            .field("entries", &self.tree.len())
            .finish_non_exhaustive()
    }
}

/// In-memory identity store for tests and single-process demos.
///
/// Counts lookups so callers can assert that a code path never touched
/// storage.
#[derive(Debug, Default)]
pub struct MemoryIdentityStore {
    inner: RwLock<MemoryInner>,
    lookups: AtomicUsize,
}

#[derive(Debug, Default)]
struct MemoryInner {
    by_id: HashMap<IdentityId, Identity>,
    by_email: HashMap<String, IdentityId>,
}

impl MemoryIdentityStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `find_by_id` / `find_by_email` calls so far.
    #[must_use]
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityStore for MemoryIdentityStore {
    async fn find_by_id(&self, id: &IdentityId) -> Result<Option<Identity>, AuthError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self.inner.read().await.by_id.get(id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Identity>, AuthError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        let inner = self.inner.read().await;
        Ok(inner
            .by_email
            .get(&email_key(email))
            .and_then(|id| inner.by_id.get(id))
            .cloned())
    }

    async fn create(&self, new: NewIdentity) -> Result<Identity, AuthError> {
        let identity = Identity::from_new(new);
        let mut inner = self.inner.write().await;

        if inner.by_email.contains_key(&identity.email) {
            return Err(AuthError::EmailTaken);
        }

        inner
            .by_email
            .insert(identity.email.clone(), identity.id.clone());
        inner.by_id.insert(identity.id.clone(), identity.clone());
        Ok(identity)
    }

    async fn update(&self, identity: &Identity) -> Result<(), AuthError> {
        let mut inner = self.inner.write().await;
        let existing = inner
            .by_id
            .get_mut(&identity.id)
            .ok_or_else(|| AuthError::NotFound(format!("identity {}", identity.id)))?;

        *existing = revise(existing, identity)?;
        Ok(())
    }

    async fn record_login(&self, id: &IdentityId) -> Result<Identity, AuthError> {
        let mut inner = self.inner.write().await;
        let existing = inner
            .by_id
            .get_mut(id)
            .ok_or_else(|| AuthError::NotFound(format!("identity {id}")))?;

        *existing = stamp_login(existing.clone())?;
        Ok(existing.clone())
    }

    async fn list(&self) -> Result<Vec<Identity>, AuthError> {
        let mut identities: Vec<Identity> =
            self.inner.read().await.by_id.values().cloned().collect();
        identities.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(identities)
    }

    async fn count(&self) -> Result<usize, AuthError> {
        Ok(self.inner.read().await.by_id.len())
    }
}
