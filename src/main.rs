// src/main.rs — Synapse entry point

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;

use synapse::cli::{replay, status, Cli, Commands};
use synapse::core::Engine;
use synapse::infra::config::Config;
use synapse::infra::{logger, paths};
use synapse::memory::{KvStore, MemoryStore, SqliteStore};

#[tokio::main]
async fn main() {
    // Initialize logging (respects RUST_LOG)
    logger::init_logging("warn");

    if let Err(e) = run().await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load config (falls back to defaults if no config.toml)
    let config = if let Some(ref path) = cli.config {
        Config::load_from(Path::new(path))?
    } else {
        Config::load()?
    };

    let store = open_store(cli.memory, cli.db.as_deref())?;
    let mut engine = Engine::start(config, store).await?;

    let result = match &cli.command {
        Commands::Replay { file, all, train } => {
            replay::run_replay(&mut engine, file, *all, *train).await
        }
        Commands::Train { file } => replay::run_train(&mut engine, file).await,
        Commands::Skills { json } => status::show_skills(&mut engine, *json).await,
        Commands::Status { json } => status::show_status(&mut engine, *json).await,
    };

    engine.shutdown().await;
    result
}

fn open_store(memory: bool, db: Option<&str>) -> anyhow::Result<Arc<dyn KvStore>> {
    if memory {
        return Ok(Arc::new(MemoryStore::new()));
    }
    let path = match db {
        Some(p) => PathBuf::from(p),
        None => {
            paths::ensure_dirs()?;
            paths::db_path()
        }
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    tracing::debug!("Opening store at {}", path.display());
    Ok(Arc::new(SqliteStore::open(&path)?))
}
