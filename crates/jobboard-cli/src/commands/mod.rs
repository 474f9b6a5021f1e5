//! CLI command implementations.

pub mod admin;
pub mod serve;

pub use admin::run_admin;
pub use serve::{run_serve, run_status};

use jobboard_core::Config;

use crate::ui;

/// Load the configuration file with environment overrides applied.
///
/// A broken config file is an error; a missing one falls back to defaults.
pub fn load_config() -> anyhow::Result<Config> {
    let path = Config::default_path();
    if !path.exists() {
        ui::warning("No configuration found, using defaults");
        ui::kv("Expected at", &path.display().to_string());
    }

    let config = Config::load_default()
        .map_err(|e| anyhow::anyhow!("Failed to load {}: {}", path.display(), e))?;
    Ok(config.with_env_overrides())
}
