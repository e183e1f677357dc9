//! # Docshelf CLI (`dsh`)
//!
//! The `dsh` binary manages a docshelf deployment: database initialization,
//! the HTTP API server, and a quick stats overview.
//!
//! ## Usage
//!
//! ```bash
//! dsh --config ./config/docshelf.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `dsh init` | Create the SQLite database and run schema migrations |
//! | `dsh serve` | Start the HTTP API server |
//! | `dsh stats` | Print database statistics |

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use docshelf::{config, db, migrate, server, stats};

/// Docshelf — a multi-tenant document shelf with LLM-backed summarization.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/docshelf.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "dsh",
    about = "Docshelf — upload, organize, and summarize documents",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/docshelf.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables. This
    /// command is idempotent — running it multiple times is safe.
    Init,

    /// Start the HTTP API server.
    Serve,

    /// Print database statistics.
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&config).await?;
            migrate::run_migrations(&pool).await?;
            pool.close().await;
            println!("Database initialized at {}", config.db.path.display());
        }
        Commands::Serve => {
            server::run_server(&config).await?;
        }
        Commands::Stats => {
            stats::run_stats(&config).await?;
        }
    }

    Ok(())
}
