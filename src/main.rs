use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};

use gator::app::App;
use gator::commands::{self, Command};
use gator::config::Config;
use gator::storage::{Database, DatabaseError};

#[derive(Parser, Debug)]
#[command(
    name = "gator",
    version,
    about = "RSS aggregator that polls your feeds and collects their posts"
)]
struct Args {
    /// Config file (default: ~/.gatorconfig.json)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

/// Create the database directory user-only if it does not exist yet.
fn ensure_db_dir(db_path: &Path) -> Result<()> {
    let Some(dir) = db_path.parent().filter(|d| !d.as_os_str().is_empty()) else {
        return Ok(());
    };
    if dir.exists() {
        return Ok(());
    }

    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create database directory '{}'", dir.display()))?;
    tracing::debug!(path = %dir.display(), "Created database directory");

    // User-only access on Unix
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) = std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700)) {
            tracing::warn!(
                path = %dir.display(),
                error = %e,
                "Failed to set database directory permissions to 0700"
            );
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so command output stays clean
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config_path = match args.config {
        Some(path) => path,
        None => Config::default_path().context("Failed to locate config file")?,
    };
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from '{}'", config_path.display()))?;

    let db_path = config.database_path()?;
    ensure_db_dir(&db_path)?;
    let db_path_str = db_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;

    let db = match Database::open(db_path_str).await {
        Ok(db) => db,
        Err(DatabaseError::InstanceLocked) => {
            eprintln!(
                "Error: The database at {} is locked by another gator process. Please close it and try again.",
                db_path.display()
            );
            std::process::exit(1);
        }
        Err(e) => {
            return Err(anyhow::anyhow!("Failed to open database: {}", e));
        }
    };

    let mut app = App::new(db, config, config_path)?;
    commands::run(&mut app, args.command, &mut std::io::stdout()).await
}
