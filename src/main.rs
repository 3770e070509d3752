mod cli;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use pa_analysis::threat_feed::StaticThreatFeed;
use pa_api::AppState;
use pa_core::config::AppConfig;
use pa_dedup::DedupCoordinator;
use pa_engine::CrawlEngine;
use pa_queue::WorkQueue;
use pa_store::Store;
use pa_worker::WorkerPool;
use tokio::sync::broadcast;
use tracing::{info, warn};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use crate::cli::{Cli, Commands};

fn main() -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(async_main())
}

async fn async_main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config_str = std::fs::read_to_string(&cli.config).unwrap_or_else(|_| {
        warn!(path = %cli.config, "config file not found, using defaults");
        include_str!("../config/default.toml").to_string()
    });
    let config = AppConfig::load_from(&config_str)?;

    match cli.command {
        Commands::Migrate => {
            let store = Store::new(&config.database.url, config.database.max_connections).await?;
            store.run_migrations().await?;
            info!("migrations applied");
        }
        Commands::Worker => run_worker(config).await?,
        Commands::Serve => run_serve(config).await?,
    }

    Ok(())
}

/// Assemble the components every command needs (Job Store, Work Queue, Dedup
/// Coordinator) so `serve` and `worker` share exactly one wiring path.
async fn build_shared(
    config: &AppConfig,
) -> Result<(Arc<Store>, Arc<WorkQueue>, Arc<DedupCoordinator>)> {
    let store = Arc::new(Store::new(&config.database.url, config.database.max_connections).await?);
    store.run_migrations().await?;

    let queue = Arc::new(WorkQueue::new(
        &config.redis.url,
        config.worker.max_attempts,
        config.worker.lease_seconds,
    )?);

    let dedup = Arc::new(DedupCoordinator::new(&config.redis.url, store.clone())?);

    Ok((store, queue, dedup))
}

/// `worker` command: run the bounded pool of job executors standalone, until ctrl-c
/// (spec.md §4.G). Used when the Worker Pool is scaled independently of the API.
async fn run_worker(config: AppConfig) -> Result<()> {
    let (store, queue, _dedup) = build_shared(&config).await?;
    let engine = Arc::new(CrawlEngine::new());
    let threat_feed = Arc::new(StaticThreatFeed::new());

    let pool = Arc::new(WorkerPool::new(
        queue,
        store,
        engine,
        threat_feed,
        config.worker.concurrency,
    ));

    let (tx, rx) = broadcast::channel(1);
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        let _ = tx.send(());
    });

    pool.run(rx).await;
    Ok(())
}

/// `serve` command: Poll API + submission ingress HTTP server. The Worker Pool runs
/// in-process alongside it so a single-process deployment needs no second command
/// (spec.md §9 treats Worker Pool and Poll API as independently scalable, not
/// mutually exclusive).
async fn run_serve(config: AppConfig) -> Result<()> {
    let (store, queue, dedup) = build_shared(&config).await?;
    let engine = Arc::new(CrawlEngine::new());
    let threat_feed = Arc::new(StaticThreatFeed::new());

    let worker_pool = Arc::new(WorkerPool::new(
        Arc::clone(&queue),
        Arc::clone(&store),
        engine,
        threat_feed,
        config.worker.concurrency,
    ));
    let metrics = worker_pool.metrics();

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let worker_handle = {
        let pool = Arc::clone(&worker_pool);
        let rx = shutdown_tx.subscribe();
        tokio::spawn(async move { pool.run(rx).await })
    };

    let state = AppState::new(store, dedup, queue, metrics);
    let app = pa_api::router(state, &config.server.cors_origin);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "poll API listening");

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal(shutdown_tx.clone()))
        .await?;

    let _ = shutdown_tx.send(());
    let _ = worker_handle.await;
    Ok(())
}

async fn shutdown_signal(shutdown_tx: broadcast::Sender<()>) {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
    let _ = shutdown_tx.send(());
}
