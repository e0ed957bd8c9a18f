//! Voxel Fox CLI - Database migrations and checkout item management.
//!
//! # Usage
//!
//! ```bash
//! # Run website database migrations
//! vf-cli migrate
//!
//! # Create or replace a checkout item
//! vf-cli item create --name "MarriageBot Gold" --creator <payment user id> \
//!     --stripe-product prod_123 --stripe-price price_123 --group MarriageBot
//!
//! # List checkout items
//! vf-cli item list
//! ```
//!
//! # Environment Variables
//!
//! - `WEBSITE_DATABASE_URL` (or `DATABASE_URL`) - `PostgreSQL` connection string

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

use commands::items::ItemArgs;

#[derive(Parser)]
#[command(name = "vf-cli")]
#[command(author, version, about = "Voxel Fox website CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run website database migrations
    Migrate,
    /// Manage checkout items
    Item {
        #[command(subcommand)]
        action: ItemAction,
    },
}

#[derive(Subcommand)]
enum ItemAction {
    /// Create a checkout item, or replace the one with the same name
    Create(ItemArgs),
    /// List every checkout item
    List,
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
        Commands::Item { action } => match action {
            ItemAction::Create(args) => commands::items::create(args).await?,
            ItemAction::List => commands::items::list().await?,
        },
    }
    Ok(())
}
