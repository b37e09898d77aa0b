//! M3U EPG Matcher
//! Periodically fetches each configured playlist/guide pair, matches guide
//! channel ids into the playlist by display name, and serves the results
//! over a small HTTP API.

use std::net::SocketAddr;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;
mod fetch;
mod fsutil;
mod guide;
mod playlist;
mod server;
mod store;
mod sync;


use config::AppConfig;
use fetch::Fetcher;
use server::AppState;
use store::ListStore;
use sync::Syncer;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::load();

    std::fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("cannot create data dir {}", config.data_dir.display()))?;

    let store = Arc::new(
        ListStore::load(&config.lists_file)
            .with_context(|| format!("cannot load {}", config.lists_file.display()))?,
    );
    info!(
        lists = store.snapshot().len(),
        "loaded list configuration from {}",
        config.lists_file.display()
    );

    let fetcher = Fetcher::new(
        Duration::from_secs(config.fetch_timeout_secs),
        &config.user_agent,
    );
    let syncer = Arc::new(Syncer::new(
        Arc::clone(&store),
        config.data_dir.clone(),
        fetcher,
    ));

    // Periodic cycle on its own thread; the sender doubles as the
    // done-signal when the HTTP server stops.
    let (shutdown_tx, shutdown_rx) = mpsc::channel();
    let interval = Duration::from_secs(config.sync_interval_hours * 3600);
    let worker = Arc::clone(&syncer)
        .run_periodic(interval, shutdown_rx)
        .context("cannot start sync scheduler")?;

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .with_context(|| format!("invalid bind address {}:{}", config.host, config.port))?;
    let state = AppState {
        store,
        syncer,
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("cannot start async runtime")?;
    runtime.block_on(server::serve(addr, state, &config.data_dir))?;

    // Stop the scheduler; a cycle already underway finishes first.
    let _ = shutdown_tx.send(());
    if worker.join().is_err() {
        tracing::error!("sync worker panicked");
    }

    info!("shutdown complete");
    Ok(())
}
