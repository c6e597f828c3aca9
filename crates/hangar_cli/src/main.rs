//! Hangar CLI
//!
//! Operates a file-backed client store against a file-backed mirror remote.
//!
//! # Commands
//!
//! - `enqueue` - Record a local mutation
//! - `status` - Display queue statistics and connectivity
//! - `sync` - Drain the queue once
//! - `retry` - Requeue failed entries and sync
//! - `log` - Show or clear the sync log
//! - `purge` - Drop synced entries from the queue
//! - `seed` - Write legacy records into the local tables
//! - `counts` - Count local records per migrated table
//! - `migrate` - Copy local tables to the remote

mod commands;

use clap::{Parser, Subcommand};
use commands::Client;
use hangar_sync_engine::{RetryConfig, SyncConfig};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Hangar offline-first sync tools.
#[derive(Parser)]
#[command(name = "hangar")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the client store directory
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Path to the mirror remote directory (default: `<path>-remote`)
    #[arg(global = true, short, long)]
    remote: Option<PathBuf>,

    /// Treat the client as offline
    #[arg(global = true, long)]
    offline: bool,

    /// Attempt ceiling for retryable failures
    #[arg(global = true, long)]
    max_attempts: Option<u32>,

    /// Per-request timeout in seconds
    #[arg(global = true, long)]
    timeout: Option<u64>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record a local mutation
    Enqueue {
        /// Entity type (aircraft, employee, task, flight_sheet, or custom)
        entity_type: String,

        /// Entity ID
        id: String,

        /// Operation (create, update, delete)
        #[arg(short, long, default_value = "update")]
        operation: String,

        /// JSON payload (required for create and update)
        #[arg(short = 'd', long)]
        payload: Option<String>,
    },

    /// Display queue statistics and connectivity
    Status {
        /// List queue entries
        #[arg(short, long)]
        entries: bool,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Drain the queue once
    Sync,

    /// Requeue failed entries and sync
    Retry {
        /// Also requeue entries whose failure is not retryable
        #[arg(short, long)]
        all: bool,
    },

    /// Show or clear the sync log
    Log {
        /// Maximum number of entries to show
        #[arg(short, long, default_value = "20")]
        limit: usize,

        /// Clear the log instead
        #[arg(long)]
        clear: bool,
    },

    /// Drop synced entries from the queue
    Purge,

    /// Write legacy records into the local tables
    Seed {
        /// Aircraft to write
        #[arg(long, default_value = "5")]
        aircraft: usize,

        /// Employees to write
        #[arg(long, default_value = "3")]
        employees: usize,

        /// Tasks to write
        #[arg(long, default_value = "0")]
        tasks: usize,

        /// Flight sheets to write
        #[arg(long, default_value = "2")]
        flight_sheets: usize,
    },

    /// Count local records per migrated table
    Counts {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Copy local tables to the remote
    Migrate {
        /// Clear the sync queue after a successful migration
        #[arg(long)]
        clear_queue: bool,

        /// Mark every local record as synced after a successful migration
        #[arg(long)]
        mark_synced: bool,
    },

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Commands::Version = cli.command {
        println!("Hangar CLI v{}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let path = cli.path.ok_or("Client store path required")?;
    let remote = cli
        .remote
        .unwrap_or_else(|| commands::default_remote_dir(&path));

    let mut config = SyncConfig::new().with_sync_interval(None);
    if let Some(max_attempts) = cli.max_attempts {
        config = config.with_retry(RetryConfig::new(max_attempts));
    }
    if let Some(secs) = cli.timeout {
        config = config.with_request_timeout(Duration::from_secs(secs));
    }

    let client = Client::open(&path, &remote, !cli.offline, config)?;

    match cli.command {
        Commands::Enqueue {
            entity_type,
            id,
            operation,
            payload,
        } => {
            commands::queue::enqueue(&client, &entity_type, &id, &operation, payload)?;
        }
        Commands::Status { entries, format } => {
            commands::queue::status(&client, entries, &format)?;
        }
        Commands::Sync => {
            commands::sync::sync(&client).await?;
        }
        Commands::Retry { all } => {
            commands::sync::retry(&client, all).await?;
        }
        Commands::Log { limit, clear } => {
            commands::sync::log(&client, limit, clear);
        }
        Commands::Purge => {
            commands::queue::purge(&client)?;
        }
        Commands::Seed {
            aircraft,
            employees,
            tasks,
            flight_sheets,
        } => {
            commands::migrate::seed(&client, [aircraft, employees, tasks, flight_sheets])?;
        }
        Commands::Counts { format } => {
            commands::migrate::counts(&client, &format)?;
        }
        Commands::Migrate {
            clear_queue,
            mark_synced,
        } => {
            commands::migrate::migrate(&client, clear_queue, mark_synced).await?;
        }
        Commands::Version => {}
    }

    Ok(())
}
