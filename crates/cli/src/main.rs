//! Flash sale CLI - Database migrations and management tools.
//!
//! # Usage
//!
//! ```bash
//! # Run database migrations
//! flash-sale-cli migrate
//!
//! # Load products from a YAML file
//! flash-sale-cli seed products.yaml
//!
//! # Drop every cache entry
//! flash-sale-cli cache flush
//! ```
//!
//! # Commands
//!
//! - `migrate` - Run database migrations
//! - `seed` - Insert products from a YAML list
//! - `cache flush` - Flush the configured cache backend
//!
//! All commands read the same environment variables as the server.

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "flash-sale-cli")]
#[command(author, version, about = "Flash sale inventory CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Insert products from a YAML file
    Seed {
        /// Path to a YAML list of products (name, description, price, inventory)
        file: PathBuf,
    },
    /// Manage the cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Drop every cache entry
    Flush,
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), commands::CommandError> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::Seed { file } => commands::seed::run(&file).await?,
        Commands::Cache { action } => match action {
            CacheAction::Flush => commands::cache::flush().await?,
        },
    }
    Ok(())
}
