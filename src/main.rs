//! E-Library server
//!
//! ```text
//! ┌──────────┐    ┌──────────┐    ┌──────────────┐    ┌────────────┐
//! │  Client  │───▶│ Gateway  │───▶│ Repositories │───▶│ PostgreSQL │
//! │ (Bearer) │    │  (axum)  │    │  + Services  │    │  / memory  │
//! └──────────┘    └──────────┘    └──────┬───────┘    └────────────┘
//!                                        │
//!                              ┌─────────┴─────────┐
//!                              │ Blob store, cache │
//!                              └───────────────────┘
//! ```
//!
//! Usage: `e_library [--env dev] [--port 5000]`

use std::sync::Arc;
use std::time::Duration;

use e_library::cache::{AggregateCache, LocalCache};
use e_library::config::{AppConfig, StorageProvider};
use e_library::db::{Database, LibraryStore, MemoryStore};
use e_library::gateway::{self, state::AppState};
use e_library::storage::{BlobStore, CloudinaryStore, MemoryBlobStore};

fn get_env() -> String {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if (args[i] == "--env" || args[i] == "-e") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    "dev".to_string()
}

/// Get port override from command line (--port argument)
fn get_port_override() -> Option<u16> {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if args[i] == "--port" && i + 1 < args.len() {
            return args[i + 1].parse().ok();
        }
    }
    None
}

async fn open_store(
    config: &AppConfig,
) -> anyhow::Result<(Arc<dyn LibraryStore>, Option<Arc<Database>>)> {
    match &config.postgres_url {
        Some(url) => {
            let db = Database::connect(url).await?;
            let store = db.open_store().await?;
            tracing::info!("Using PostgreSQL store");
            Ok((Arc::new(store), Some(Arc::new(db))))
        }
        None => {
            tracing::warn!("postgres_url not set; using the in-memory store (data is lost on exit)");
            Ok((Arc::new(MemoryStore::new()), None))
        }
    }
}

fn open_blob_store(config: &AppConfig) -> anyhow::Result<Arc<dyn BlobStore>> {
    Ok(match config.storage.provider {
        StorageProvider::Cloudinary => Arc::new(CloudinaryStore::from_config(&config.storage)?),
        StorageProvider::Memory => {
            tracing::warn!("Using the in-memory blob store");
            Arc::new(MemoryBlobStore::new())
        }
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = get_env();
    let mut config = AppConfig::load(&env)?;
    if let Some(port) = get_port_override() {
        config.gateway.port = port;
    }
    let _log_guard = e_library::logging::init_logging(&config);

    tracing::info!("Starting E-Library in {} mode", env);

    let (store, pg_db) = open_store(&config).await?;
    let blobs = open_blob_store(&config)?;
    let cache = if config.cache.enabled {
        AggregateCache::new(
            Arc::new(LocalCache::new()),
            Duration::from_secs(config.cache.ttl_secs),
        )
    } else {
        AggregateCache::disabled()
    };

    let state = Arc::new(AppState::new(&config, store, blobs, cache, pg_db));
    gateway::run_server(&config.gateway, state).await
}
