use clap::Parser;
use jobhost_core::JobhostConfig;
use tracing::info;

mod cli;
mod commands;
mod serve;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "jobhost=info,jobhost_scheduler=info,jobhost_runner=info,jobhost_history=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // explicit --config / JOBHOST_CONFIG > ~/.jobhost/jobhost.toml
    let config = JobhostConfig::load(cli.config.as_deref()).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        JobhostConfig::default()
    });

    let db_path = &config.database.path;
    ensure_parent_dir(db_path);
    info!(path = %db_path, "opening SQLite database");

    // run all schema setup (idempotent)
    let db = open_db(db_path)?;
    jobhost_packages::db::init_db(&db)?;
    jobhost_scheduler::db::init_db(&db)?;
    jobhost_history::db::init_db(&db)?;
    drop(db);

    match cli.command {
        Commands::Serve => serve::run(config).await,
        Commands::Package { command } => commands::package(&config, command),
        Commands::Job { command } => commands::job(&config, command),
        Commands::History { command } => commands::history(&config, command),
        Commands::Cluster => commands::cluster(&config),
    }
}

/// Open a connection to the shared database file.
///
/// Every subsystem gets its own connection; WAL keeps dashboard reads from
/// blocking the run output writers.
pub(crate) fn open_db(path: &str) -> rusqlite::Result<rusqlite::Connection> {
    let conn = rusqlite::Connection::open(path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON; PRAGMA busy_timeout=5000;")?;
    Ok(conn)
}

fn ensure_parent_dir(path: &str) {
    if let Some(parent) = std::path::Path::new(path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
}
