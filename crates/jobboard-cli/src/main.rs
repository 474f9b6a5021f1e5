//! Jobboard CLI - run the auth gateway and manage identities.

mod commands;
mod ui;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser)]
#[command(name = "jobboard")]
#[command(about = "Jobboard - authentication and session gateway")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway server
    Serve {
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Bind address
        #[arg(long)]
        bind: Option<String>,

        /// Data directory override
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },

    /// Check whether the gateway is running
    Status,

    /// Identity management
    Admin {
        #[command(subcommand)]
        action: AdminCommands,

        /// Data directory override
        #[arg(long, global = true)]
        data_dir: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum AdminCommands {
    /// Create an identity with a local secret
    Create {
        /// Email address
        #[arg(long)]
        email: String,

        /// Display name
        #[arg(long)]
        name: String,

        /// Secret (prompted for when omitted)
        #[arg(long)]
        password: Option<String>,

        /// Role: seeker, employer, or admin
        #[arg(long, default_value = "admin")]
        role: String,

        /// Generate a random secret
        #[arg(long)]
        generate_password: bool,
    },

    /// List all identities
    List,

    /// Replace an identity's local secret with a generated one
    ResetSecret {
        /// Email address
        #[arg(long)]
        email: String,
    },

    /// Enable an identity
    Enable {
        /// Email address
        #[arg(long)]
        email: String,
    },

    /// Disable an identity
    Disable {
        /// Email address
        #[arg(long)]
        email: String,
    },

    /// Change an identity's role
    SetRole {
        /// Email address
        #[arg(long)]
        email: String,

        /// Role: seeker, employer, or admin
        #[arg(long)]
        role: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();

    match cli.command {
        Commands::Serve {
            port,
            bind,
            data_dir,
        } => {
            let args = commands::serve::ServeArgs {
                port,
                bind,
                data_dir,
            };
            commands::run_serve(args).await?;
        }

        Commands::Status => {
            commands::run_status().await?;
        }

        Commands::Admin { action, data_dir } => {
            let args = commands::admin::AdminArgs {
                action: match action {
                    AdminCommands::Create {
                        email,
                        name,
                        password,
                        role,
                        generate_password,
                    } => commands::admin::AdminAction::Create {
                        email,
                        name,
                        password,
                        role,
                        generate_password,
                    },
                    AdminCommands::List => commands::admin::AdminAction::List,
                    AdminCommands::ResetSecret { email } => {
                        commands::admin::AdminAction::ResetSecret { email }
                    }
                    AdminCommands::Enable { email } => {
                        commands::admin::AdminAction::Enable { email }
                    }
                    AdminCommands::Disable { email } => {
                        commands::admin::AdminAction::Disable { email }
                    }
                    AdminCommands::SetRole { email, role } => {
                        commands::admin::AdminAction::SetRole { email, role }
                    }
                },
                data_dir,
            };
            commands::run_admin(args).await?;
        }
    }

    Ok(())
}
