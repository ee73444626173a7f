//! Campus Eats CLI - database migrations and operator tools.
//!
//! # Usage
//!
//! ```bash
//! # Apply schema migrations (shop tables and the session table)
//! campus-eats-cli migrate
//!
//! # Create a staff account for the admin API
//! campus-eats-cli staff create -e kitchen@campus.example -n "Kitchen" -p 'long passphrase'
//!
//! # Load menu items from a JSON array
//! campus-eats-cli seed --file menu.json
//!
//! # Re-query M-Pesa for payments stuck in processing
//! campus-eats-cli payments reconcile --older-than-minutes 15
//! ```
//!
//! All commands read `DATABASE_URL` (or `CLI_DATABASE_URL`) from the
//! environment or a `.env` file.

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "campus-eats-cli")]
#[command(author, version, about = "Campus Eats operator tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Manage staff accounts
    Staff {
        #[command(subcommand)]
        action: StaffAction,
    },
    /// Insert menu items from a JSON file
    Seed {
        /// Path to a JSON array of menu items
        #[arg(short, long)]
        file: PathBuf,
    },
    /// M-Pesa payment maintenance
    Payments {
        #[command(subcommand)]
        action: PaymentsAction,
    },
}

#[derive(Subcommand)]
enum StaffAction {
    /// Create a staff account
    Create {
        /// Staff email address
        #[arg(short, long)]
        email: String,

        /// Display name
        #[arg(short, long)]
        name: String,

        /// Login password (at least 8 characters)
        #[arg(short, long)]
        password: String,
    },
}

#[derive(Subcommand)]
enum PaymentsAction {
    /// Query the provider for orders stuck in processing
    Reconcile {
        /// Only orders placed at least this many minutes ago
        #[arg(long, default_value_t = 10)]
        older_than_minutes: i64,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::Staff { action } => match action {
            StaffAction::Create {
                email,
                name,
                password,
            } => {
                commands::staff::create(&email, &name, &password).await?;
            }
        },
        Commands::Seed { file } => commands::seed::menu(&file).await?,
        Commands::Payments { action } => match action {
            PaymentsAction::Reconcile { older_than_minutes } => {
                commands::payments::reconcile(older_than_minutes).await?;
            }
        },
    }
    Ok(())
}
