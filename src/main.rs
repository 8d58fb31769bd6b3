/// Main entry point for the habit-sync MCP server
///
/// Sets up logging, opens the device store and the account store, and serves
/// MCP requests over stdin/stdout.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::info;

use habit_sync::storage::SqliteKeyValueStore;
use habit_sync::{HabitTrackerServer, LocalHabitStore, SqliteStorage};

/// Find a writable data directory, trying the usual locations in order
fn default_data_dir() -> Result<PathBuf, Box<dyn std::error::Error>> {
    let candidates = [
        dirs::home_dir().map(|p| p.join(".habit_sync")),
        dirs::data_dir().map(|p| p.join("habit_sync")),
        dirs::config_dir().map(|p| p.join("habit_sync")),
        std::env::current_dir().ok().map(|p| p.join(".habit_sync")),
    ];

    for dir in candidates.iter().flatten() {
        if std::fs::create_dir_all(dir).is_ok() {
            let check_file = dir.join(".test_write");
            if std::fs::write(&check_file, "test").is_ok() {
                let _ = std::fs::remove_file(&check_file);
                return Ok(dir.clone());
            }
        }
    }

    let fallback = std::env::temp_dir().join("habit_sync");
    std::fs::create_dir_all(&fallback)?;
    tracing::warn!("Using temporary directory for data: {}", fallback.display());
    Ok(fallback)
}

/// Make sure the parent directory of an explicit path exists
fn prepare(path: PathBuf) -> Result<PathBuf, std::io::Error> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(path)
}

/// Command line arguments for the habit-sync MCP server
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the account (remote) SQLite database
    #[arg(long)]
    database: Option<PathBuf>,

    /// Path to the device key/value store holding anonymous data
    #[arg(long)]
    local_store: Option<PathBuf>,

    /// Start signed in as this account; device data is migrated on first use
    #[arg(long)]
    user_id: Option<String>,

    /// The signed-in account is on the premium plan
    #[arg(long)]
    premium: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Enable verbose output (implies debug)
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let log_level = if args.verbose {
        "debug"
    } else if args.debug {
        "info"
    } else {
        "warn"
    };

    tracing_subscriber::fmt()
        .with_env_filter(format!("habit_sync={}", log_level))
        .with_writer(std::io::stderr)
        .init();

    info!("Starting habit-sync MCP server");

    let (database, local_store) = match (args.database, args.local_store) {
        (Some(database), Some(local_store)) => (prepare(database)?, prepare(local_store)?),
        (database, local_store) => {
            let dir = default_data_dir()?;
            (
                database.map(prepare).transpose()?.unwrap_or_else(|| dir.join("habits.db")),
                local_store.map(prepare).transpose()?.unwrap_or_else(|| dir.join("device.db")),
            )
        }
    };

    info!("Using account database at: {}", database.display());
    info!("Using device store at: {}", local_store.display());

    let remote = Arc::new(SqliteStorage::new(&database)?);
    let local = Arc::new(LocalHabitStore::new(Arc::new(SqliteKeyValueStore::new(&local_store)?)));

    let server = HabitTrackerServer::new(local, remote, args.user_id, args.premium).await?;
    server.run().await?;

    info!("habit-sync MCP server shutdown complete");
    Ok(())
}
