//! Serve command - start the gateway server.

use std::path::PathBuf;

use anyhow::Result;

use super::load_config;
use crate::ui;

/// Serve command arguments.
#[derive(Debug, Clone, Default)]
pub struct ServeArgs {
    /// Port to listen on.
    pub port: Option<u16>,
    /// Bind address.
    pub bind: Option<String>,
    /// Data directory override.
    pub data_dir: Option<PathBuf>,
}

/// Start the gateway server.
pub async fn run_serve(args: ServeArgs) -> Result<()> {
    let mut config = load_config()?;

    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(bind) = args.bind {
        config.server.bind_address = bind;
    }
    if let Some(dir) = args.data_dir {
        config.server.data_dir = Some(dir);
    }
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {e}"))?;

    ui::header("Starting Jobboard Gateway");
    ui::kv(
        "Address",
        &format!("{}:{}", config.server.bind_address, config.server.port),
    );
    ui::kv("Environment", &format!("{:?}", config.server.environment));
    ui::kv("Data", &config.data_dir().display().to_string());
    ui::kv("Frontend", &config.server.frontend_url);
    ui::kv(
        "Google sign-in",
        if config.federation.google.is_some() {
            "enabled"
        } else {
            "disabled"
        },
    );
    println!();

    if !config.is_production()
        && (config.auth.access_secret.is_none() || config.auth.refresh_secret.is_none())
    {
        ui::warning("Signing secrets not set; sessions will not survive a restart");
    }

    ui::info("Press Ctrl+C to stop");
    println!();

    jobboard_gateway::start(config).await?;

    Ok(())
}

/// Check whether a gateway answers on the configured port.
pub async fn run_status() -> Result<()> {
    ui::header("Gateway Status");

    let config = load_config()?;
    let port = config.server.port;

    if tokio::net::TcpStream::connect(format!("127.0.0.1:{port}"))
        .await
        .is_err()
    {
        ui::warning(&format!("Gateway is not running on port {port}"));
        ui::info("Start with: jobboard serve");
        return Ok(());
    }

    ui::success(&format!("Gateway is running on port {port}"));

    let client = reqwest::Client::new();
    match client
        .get(format!("http://127.0.0.1:{port}/health"))
        .timeout(std::time::Duration::from_secs(2))
        .send()
        .await
    {
        Ok(resp) if resp.status().is_success() => {
            if let Ok(body) = resp.json::<serde_json::Value>().await {
                if let Some(status) = body.get("status").and_then(|v| v.as_str()) {
                    ui::kv("Status", status);
                }
                if let Some(time) = body.get("time").and_then(|v| v.as_str()) {
                    ui::kv("Server time", time);
                }
            }
        }
        Ok(resp) => ui::warning(&format!("Health check returned {}", resp.status())),
        Err(_) => ui::warning("Health check failed"),
    }

    Ok(())
}
