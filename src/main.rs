mod api;
mod config;
mod db;
mod error;
mod fetcher;
mod markets;
mod poller;
mod series;
mod snapshot;
mod types;

use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::api::health::HealthState;
use crate::api::latency::LatencyStats;
use crate::api::{router, ApiState};
use crate::config::Config;
use crate::db::{SnapshotStore, SqliteSnapshotStore};
use crate::error::Result;
use crate::fetcher::{Fetchers, PolymarketClient};
use crate::markets::MarketsConfig;
use crate::poller::Poller;

#[tokio::main]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    // --- Database setup ---
    let pool = db::connect(&cfg.db_path).await?;
    info!("Database ready at {}", cfg.db_path);
    let store: Arc<dyn SnapshotStore> = Arc::new(SqliteSnapshotStore::new(pool));

    // --- Markets config check (the poller re-reads it every run) ---
    match MarketsConfig::load(&cfg.markets_path).await {
        Ok(markets) => {
            let symbols = markets.all_symbols();
            let market_count: usize = symbols.iter().map(|s| markets.markets_for(s).len()).sum();
            info!(
                "Markets config {}: {} symbols, {} markets",
                cfg.markets_path,
                symbols.len(),
                market_count,
            );
        }
        Err(e) => warn!("{e}; poll runs will fail until it is fixed"),
    }

    // --- Poller ---
    let http = fetcher::http_client(&cfg)?;
    let fetchers = Fetchers::from_config(&cfg, &http);
    let latency = Arc::new(LatencyStats::new());
    let health = Arc::new(HealthState::new());
    let poller = Arc::new(Poller::new(
        &cfg,
        Arc::clone(&store),
        fetchers.clone(),
        Arc::clone(&latency),
        Arc::clone(&health),
    ));

    let scheduled = Arc::clone(&poller);
    let every = cfg.poll_interval();
    info!(
        "Polling every {}m (fetch timeout {}s, {} concurrent)",
        cfg.poll_interval_minutes,
        cfg.fetch_timeout.as_secs(),
        cfg.max_concurrent_fetches,
    );
    tokio::spawn(async move { scheduled.run_scheduled(every).await });

    // --- HTTP API server ---
    let api_state = ApiState {
        store,
        poller,
        fetchers,
        search: Arc::new(PolymarketClient::new(http, cfg.gamma_api_url.clone())),
        markets_path: Arc::from(cfg.markets_path.as_str()),
        poll_interval_minutes: cfg.poll_interval_minutes,
        latency,
        health,
    };
    let app = router(api_state);
    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("HTTP API listening on {bind_addr}");

    axum::serve(listener, app).await?;

    Ok(())
}
