//! # Crowdcrawl CLI (`crowdcrawl`)
//!
//! ## Usage
//!
//! ```bash
//! crowdcrawl --config ./config/crowdcrawl.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `crowdcrawl init` | Create the SQLite database and run schema migrations |
//! | `crowdcrawl batch import <files>` | Store batch JSON files as ready to reconcile |
//! | `crowdcrawl reconcile` | Run one reconciliation cycle |
//! | `crowdcrawl ingest` | Run the ingestion driver until Ctrl-C |
//! | `crowdcrawl curate <request.json> --user <name>` | Apply a curation request |
//! | `crowdcrawl queue pop` | Print and remove the oldest queued URL set |
//! | `crowdcrawl stats` | Show batch, URL, link and queue counts |

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crowdcrawl::{config, curation, ingest, logging, migrate, stats};

/// Crowdcrawl: batch reconciliation and curation for a crowd-sourced crawler.
#[derive(Parser)]
#[command(
    name = "crowdcrawl",
    about = "Batch reconciliation and curation for a crowd-sourced crawler",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/crowdcrawl.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Manage uploaded crawl batches.
    Batch {
        #[command(subcommand)]
        action: BatchAction,
    },

    /// Reconcile up to `ingest.batch_limit` ready batches once and exit.
    Reconcile,

    /// Run the ingestion driver until interrupted.
    ///
    /// Each cycle reconciles ready batches, then waits
    /// `ingest.retry_delay_secs` before the next one. Failed cycles are
    /// logged and retried after the same delay.
    Ingest,

    /// Apply a curation request to the term index.
    Curate {
        /// JSON file holding the curation request.
        request: PathBuf,

        /// User performing the curation, recorded in the audit log.
        #[arg(long)]
        user: String,
    },

    /// Inspect the outbound URL queue.
    Queue {
        #[command(subcommand)]
        action: QueueAction,
    },

    /// Show database statistics.
    Stats,
}

#[derive(Subcommand)]
enum BatchAction {
    /// Import batch JSON files.
    Import {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

#[derive(Subcommand)]
enum QueueAction {
    /// Print and remove the oldest queued URL set.
    Pop,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;
    logging::init_logging(cfg.logging.json)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Batch { action } => match action {
            BatchAction::Import { files } => {
                ingest::run_import(&cfg, &files).await?;
            }
        },
        Commands::Reconcile => {
            ingest::run_reconcile(&cfg).await?;
        }
        Commands::Ingest => {
            ingest::run_ingest(&cfg).await?;
        }
        Commands::Curate { request, user } => {
            curation::run_curate(&cfg, &request, &user).await?;
        }
        Commands::Queue { action } => match action {
            QueueAction::Pop => {
                stats::run_queue_pop(&cfg).await?;
            }
        },
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
    }

    Ok(())
}
