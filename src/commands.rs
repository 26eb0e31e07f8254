use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::info;

use weekpack_core::{now_ts, AppConfig};
use weekpack_fetch::Fetcher;
use weekpack_storage::Storage;
use weekpack_worker::PackCoordinator;

use crate::server::{self, AppState};

pub async fn run_serve(config: AppConfig, bind: Option<String>) -> Result<()> {
    let storage =
        Storage::with_pool_size(&config.database.path, config.database.max_connections).await?;
    storage.run_migrations().await?;

    let fetcher = Fetcher::new(&config.fetcher)?;
    let coordinator = PackCoordinator::new(storage, fetcher).with_lock_bounds(
        Duration::from_secs(config.lock.timeout_seconds),
        Duration::from_millis(config.lock.poll_interval_ms),
    );
    let state = Arc::new(AppState { coordinator });

    let addr = bind.unwrap_or(config.server.bind_addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, "pack service listening");
    axum::serve(listener, server::router(state)).await?;
    Ok(())
}

pub async fn run_status(config: AppConfig) -> Result<()> {
    let storage = Storage::open(&config.database.path).await?;

    match storage.check_connectivity().await {
        Ok(()) => println!("Database: connected"),
        Err(e) => {
            println!("Database: ERROR - {}", e);
            return Ok(());
        }
    }

    storage.run_migrations().await?;

    let packs = storage.get_pack_count().await?;
    let metadata = storage.get_metadata_count().await?;
    let locks = storage.get_lock_count().await?;

    println!("Cached packs:   {}", packs);
    println!("Metadata rows:  {}", metadata);
    println!("Held locks:     {}", locks);

    Ok(())
}

pub async fn run_purge(config: AppConfig) -> Result<()> {
    let storage = Storage::open(&config.database.path).await?;
    storage.run_migrations().await?;

    let purged = storage.purge_expired_packs(now_ts()).await?;
    println!("Purged {} expired pack(s)", purged);

    Ok(())
}
