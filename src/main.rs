//! # Repo Indexer CLI (`rindex`)
//!
//! ## Usage
//!
//! ```bash
//! rindex --config ./config/rindex.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `rindex init` | Create the SQLite database and run schema migrations |
//! | `rindex credential set <user> <token>` | Store a user's GitHub token |
//! | `rindex index <owner/repo> --user <id>` | Index a repository in the foreground |
//! | `rindex status --user <id> [repo]` | Show job records |
//! | `rindex delete <owner/repo> --user <id>` | Delete a repository's chunks and record |
//! | `rindex search "<query>" --repo <r> --user <id>` | Search one repository |
//! | `rindex serve` | Start the HTTP API |
//!
//! Logs go to stderr and honour `RUST_LOG` (default `info`).

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use repo_indexer::config;
use repo_indexer::db;
use repo_indexer::migrate;
use repo_indexer::progress::ProgressMode;
use repo_indexer::search;
use repo_indexer::server;
use repo_indexer::sqlite_store::SqliteCredentialStore;
use repo_indexer::state::AppState;
use repo_indexer::status_cmd;

/// Repo Indexer CLI: index GitHub repositories into searchable code chunks.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/rindex.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "rindex",
    about = "Index GitHub repositories into searchable semantic code chunks",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/rindex.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Idempotent.
    Init,

    /// Manage stored GitHub credentials.
    Credential {
        #[command(subcommand)]
        action: CredentialAction,
    },

    /// Index a repository now, reporting progress on stderr.
    Index {
        /// Repository as `owner/repo`.
        repo: String,

        /// User the index belongs to.
        #[arg(long)]
        user: String,

        /// Progress output: off, human or json. Defaults to human on a TTY.
        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,
    },

    /// Show indexing status.
    Status {
        /// Only this repository (`owner/repo`).
        repo: Option<String>,

        #[arg(long)]
        user: String,
    },

    /// Delete a repository's chunks and job record.
    Delete {
        repo: String,

        #[arg(long)]
        user: String,
    },

    /// Search one repository's chunks.
    Search {
        query: String,

        #[arg(long)]
        repo: String,

        #[arg(long)]
        user: String,

        /// Maximum number of results.
        #[arg(long, default_value_t = 10)]
        top_k: usize,
    },

    /// Start the HTTP API on `[server].bind`.
    Serve,
}

#[derive(Subcommand)]
enum CredentialAction {
    /// Store or replace a user's GitHub access token.
    Set { user: String, token: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Credential {
            action: CredentialAction::Set { user, token },
        } => {
            let pool = db::connect(&cfg).await?;
            migrate::apply(&pool).await?;
            SqliteCredentialStore::new(pool.clone())
                .set_credential(&user, &token)
                .await?;
            pool.close().await;
            println!("Stored credential for {}.", user);
        }
        Commands::Index {
            repo,
            user,
            progress,
        } => {
            let state = AppState::from_config(&cfg).await?;
            let mode = progress.unwrap_or_else(ProgressMode::default_for_tty);
            let summary = state.run_foreground(&repo, &user, mode.reporter()).await?;
            println!(
                "Indexed {}@{}: {} files, {} chunks ({} files skipped, {} stale chunks removed).",
                repo,
                summary.branch,
                summary.files,
                summary.chunks,
                summary.failed_files,
                summary.deleted_chunks
            );
        }
        Commands::Status { repo, user } => {
            let state = AppState::from_config(&cfg).await?;
            status_cmd::run_status(&state, &user, repo.as_deref()).await?;
        }
        Commands::Delete { repo, user } => {
            let state = AppState::from_config(&cfg).await?;
            status_cmd::run_delete(&state, &user, &repo).await?;
        }
        Commands::Search {
            query,
            repo,
            user,
            top_k,
        } => {
            let state = AppState::from_config(&cfg).await?;
            search::run_search(&state, &query, &repo, &user, top_k).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
