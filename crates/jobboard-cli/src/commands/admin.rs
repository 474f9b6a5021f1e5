//! Admin identity management commands.

use std::path::PathBuf;

use jobboard_core::validation::limits::{MAX_SECRET_LENGTH, MIN_SECRET_LENGTH};
use jobboard_core::validation::sanitize_display_name;
use jobboard_core::{Role, normalize_email};
use jobboard_gateway::auth::{
    CredentialVerifier, HashCost, Identity, IdentityStore, NewIdentity, SledIdentityStore,
};
use rand::Rng;
use rand::distributions::Alphanumeric;

use super::load_config;
use crate::ui;

/// Length of generated secrets.
const GENERATED_SECRET_LEN: usize = 20;

/// Arguments for admin commands.
pub struct AdminArgs {
    /// The admin action to perform.
    pub action: AdminAction,
    /// Data directory override.
    pub data_dir: Option<PathBuf>,
}

/// Admin actions.
pub enum AdminAction {
    /// Create an identity.
    Create {
        email: String,
        name: String,
        password: Option<String>,
        role: String,
        generate_password: bool,
    },
    /// List all identities.
    List,
    /// Replace an identity's secret with a generated one.
    ResetSecret { email: String },
    /// Enable an identity.
    Enable { email: String },
    /// Disable an identity.
    Disable { email: String },
    /// Change an identity's role.
    SetRole { email: String, role: String },
}

/// Run the admin command.
///
/// # Errors
///
/// Returns error if the operation fails.
pub async fn run_admin(args: AdminArgs) -> anyhow::Result<()> {
    let config = load_config()?;
    let data_dir = args.data_dir.unwrap_or_else(|| config.data_dir());

    // Ensure directory exists
    std::fs::create_dir_all(&data_dir)?;

    let store = SledIdentityStore::open(&data_dir)
        .map_err(|e| anyhow::anyhow!("Failed to open identity store: {}", e))?;
    let verifier = CredentialVerifier::argon2(HashCost::from(config.auth.hash_cost))
        .map_err(|e| anyhow::anyhow!("Invalid hash cost: {}", e))?;

    match args.action {
        AdminAction::Create {
            email,
            name,
            password,
            role,
            generate_password,
        } => {
            let secret = if generate_password {
                let secret = generate_secret(GENERATED_SECRET_LEN);
                ui::success(&format!("Generated secret: {secret}"));
                secret
            } else if let Some(password) = password {
                password
            } else {
                ui::prompts::new_secret("Secret")?
            };
            create_identity(&store, &verifier, &email, &name, &secret, &role).await?;
        }
        AdminAction::List => {
            list_identities(&store).await?;
        }
        AdminAction::ResetSecret { email } => {
            let secret = generate_secret(GENERATED_SECRET_LEN);
            reset_secret(&store, &verifier, &email, &secret).await?;
            ui::success(&format!("New secret: {secret}"));
        }
        AdminAction::Enable { email } => {
            set_active(&store, &email, true).await?;
        }
        AdminAction::Disable { email } => {
            set_active(&store, &email, false).await?;
        }
        AdminAction::SetRole { email, role } => {
            set_role(&store, &email, &role).await?;
        }
    }

    Ok(())
}

/// Random alphanumeric secret.
pub fn generate_secret(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

fn parse_role(role: &str) -> anyhow::Result<Role> {
    role.parse()
        .map_err(|_| anyhow::anyhow!("Invalid role: {role}. Use: seeker, employer, or admin"))
}

fn check_secret(secret: &str) -> anyhow::Result<()> {
    let len = secret.chars().count() as u64;
    if !(MIN_SECRET_LENGTH..=MAX_SECRET_LENGTH).contains(&len) {
        anyhow::bail!(
            "Secret must be between {MIN_SECRET_LENGTH} and {MAX_SECRET_LENGTH} characters"
        );
    }
    Ok(())
}

async fn find(store: &dyn IdentityStore, email: &str) -> anyhow::Result<Identity> {
    let email = normalize_email(email)?;
    store
        .find_by_email(&email)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to find identity: {}", e))?
        .ok_or_else(|| anyhow::anyhow!("Identity not found: {}", email))
}

async fn save(store: &dyn IdentityStore, identity: &Identity) -> anyhow::Result<()> {
    store
        .update(identity)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to update identity: {}", e))
}

async fn create_identity(
    store: &dyn IdentityStore,
    verifier: &CredentialVerifier,
    email: &str,
    name: &str,
    secret: &str,
    role: &str,
) -> anyhow::Result<Identity> {
    let role = parse_role(role)?;
    let email = normalize_email(email)?;
    let name = sanitize_display_name(name)?;
    check_secret(secret)?;

    let hash = verifier
        .hash_blocking(secret.to_string())
        .await
        .map_err(|e| anyhow::anyhow!("Failed to hash secret: {}", e))?;

    let identity = store
        .create(NewIdentity::local(email, name, hash, role))
        .await
        .map_err(|e| anyhow::anyhow!("Failed to save identity: {}", e))?;

    ui::success(&format!(
        "Created identity '{}' with role '{}'",
        identity.email, identity.role
    ));

    Ok(identity)
}

async fn list_identities(store: &dyn IdentityStore) -> anyhow::Result<()> {
    let identities = store
        .list()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to list identities: {}", e))?;

    if identities.is_empty() {
        ui::info("No identities yet.");
        ui::info(
            "Run 'jobboard admin create --email you@example.com --name Admin --generate-password' to create an admin.",
        );
        return Ok(());
    }

    ui::info(&format!("Identities ({}):", identities.len()));
    println!();
    println!(
        "{:<32} {:<10} {:<8} {:<8} {:<20}",
        "EMAIL", "ROLE", "ACTIVE", "LOCAL", "CREATED"
    );
    println!("{}", "-".repeat(80));

    for identity in identities {
        let created = identity.created_at.format("%Y-%m-%d %H:%M:%S");
        let active = if identity.active { "yes" } else { "no" };
        let local = if identity.has_local_secret() { "yes" } else { "no" };
        println!(
            "{:<32} {:<10} {:<8} {:<8} {:<20}",
            identity.email, identity.role, active, local, created
        );
    }

    Ok(())
}

async fn reset_secret(
    store: &dyn IdentityStore,
    verifier: &CredentialVerifier,
    email: &str,
    secret: &str,
) -> anyhow::Result<()> {
    let mut identity = find(store, email).await?;
    let hash = verifier
        .hash_blocking(secret.to_string())
        .await
        .map_err(|e| anyhow::anyhow!("Failed to hash secret: {}", e))?;

    identity.set_secret(hash);
    save(store, &identity).await?;

    ui::success(&format!("Secret reset for '{}'", identity.email));
    Ok(())
}

async fn set_active(store: &dyn IdentityStore, email: &str, active: bool) -> anyhow::Result<()> {
    let mut identity = find(store, email).await?;

    if !active && identity.role.is_admin() {
        let admins = store
            .list()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to list identities: {}", e))?
            .iter()
            .filter(|i| i.role.is_admin() && i.active)
            .count();
        if admins <= 1 && identity.active {
            anyhow::bail!("Cannot disable the last active admin");
        }
    }

    identity.set_active(active);
    save(store, &identity).await?;

    let status = if active { "enabled" } else { "disabled" };
    ui::success(&format!("Identity '{}' {}", identity.email, status));
    Ok(())
}

async fn set_role(store: &dyn IdentityStore, email: &str, role: &str) -> anyhow::Result<()> {
    let role = parse_role(role)?;
    let mut identity = find(store, email).await?;

    identity.set_role(role);
    save(store, &identity).await?;

    ui::success(&format!("Identity '{}' now has role '{}'", identity.email, role));
    ui::info("The change applies to existing sessions at their next refresh.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> (tempfile::TempDir, SledIdentityStore, CredentialVerifier) {
        let temp = tempfile::tempdir().unwrap();
        let store = SledIdentityStore::open(temp.path()).unwrap();
        let verifier = CredentialVerifier::argon2(HashCost::minimal()).unwrap();
        (temp, store, verifier)
    }

    #[test]
    fn test_generate_secret() {
        let secret = generate_secret(GENERATED_SECRET_LEN);
        assert_eq!(secret.len(), GENERATED_SECRET_LEN);
        assert!(secret.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(secret, generate_secret(GENERATED_SECRET_LEN));
        assert!(check_secret(&secret).is_ok());
    }

    #[test]
    fn test_secret_length_bounds() {
        assert!(check_secret("12345").is_err());
        assert!(check_secret("123456").is_ok());
        assert!(check_secret(&"x".repeat(101)).is_err());
    }

    #[tokio::test]
    async fn test_create_and_verify() {
        let (_temp, store, verifier) = fixture();

        let identity =
            create_identity(&store, &verifier, "Root@Example.com", "Root", "s3cret!", "admin")
                .await
                .unwrap();

        assert_eq!(identity.email, "root@example.com");
        assert_eq!(identity.role, Role::Admin);
        assert!(verifier.verify("s3cret!", identity.secret_hash.as_ref()));

        let duplicate =
            create_identity(&store, &verifier, "root@example.com", "Root", "s3cret!", "admin")
                .await;
        assert!(duplicate.is_err());

        let bad_role =
            create_identity(&store, &verifier, "x@example.com", "X", "s3cret!", "owner").await;
        assert!(bad_role.is_err());
    }

    #[tokio::test]
    async fn test_reset_secret_and_set_role() {
        let (_temp, store, verifier) = fixture();
        create_identity(&store, &verifier, "ada@example.com", "Ada", "old-secret", "seeker")
            .await
            .unwrap();

        reset_secret(&store, &verifier, "ada@example.com", "new-secret")
            .await
            .unwrap();
        set_role(&store, "ada@example.com", "employer").await.unwrap();

        let identity = find(&store, "ada@example.com").await.unwrap();
        assert_eq!(identity.role, Role::Employer);
        assert!(verifier.verify("new-secret", identity.secret_hash.as_ref()));
        assert!(!verifier.verify("old-secret", identity.secret_hash.as_ref()));
    }

    #[tokio::test]
    async fn test_last_admin_cannot_be_disabled() {
        let (_temp, store, verifier) = fixture();
        create_identity(&store, &verifier, "root@example.com", "Root", "s3cret!", "admin")
            .await
            .unwrap();

        assert!(set_active(&store, "root@example.com", false).await.is_err());

        create_identity(&store, &verifier, "two@example.com", "Two", "s3cret!", "admin")
            .await
            .unwrap();
        set_active(&store, "root@example.com", false).await.unwrap();
        assert!(!find(&store, "root@example.com").await.unwrap().active);
    }

    #[tokio::test]
    async fn test_unknown_identity() {
        let (_temp, store, _) = fixture();
        assert!(set_role(&store, "ghost@example.com", "admin").await.is_err());
    }
}
