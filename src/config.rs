use std::time::Duration;

use crate::error::{AppError, Result};

pub const GAMMA_API_URL: &str = "https://gamma-api.polymarket.com";
pub const KALSHI_API_URL: &str = "https://api.elections.kalshi.com/trade-api/v2";

/// Default location of the symbol → markets mapping.
pub const MARKETS_CONFIG_PATH: &str = "config/markets.json";

/// An unchanged observation younger than this is discarded by the dedup gate.
/// Equality with the window is NOT a duplicate.
pub const DEDUP_WINDOW_MS: i64 = 2 * 60 * 1000;

/// Max absolute difference in yes/no for two observations to count as unchanged.
pub const DEDUP_TOLERANCE: f64 = 1e-6;

/// Derived-stats query always looks back this far...
pub const DERIVED_LOOKBACK_MS: i64 = 7 * 24 * 60 * 60 * 1000;
/// ...on bars of this size.
pub const DERIVED_RESOLUTION_MINUTES: i64 = 15;

/// Trailing SMA length for the smoothed series.
pub const SMOOTH_WINDOW: usize = 3;

/// Series query range when the caller omits `from`.
pub const DEFAULT_SERIES_LOOKBACK_MS: i64 = 7 * 24 * 60 * 60 * 1000;

/// Largest bar size the read endpoints accept (one leap year).
pub const MAX_RESOLUTION_MINUTES: i64 = 366 * 24 * 60;

/// Topic search page size: default and cap.
pub const DEFAULT_SEARCH_LIMIT: usize = 25;
pub const MAX_SEARCH_LIMIT: usize = 50;

/// Resolutions advertised to the charting adapter.
pub const SUPPORTED_RESOLUTIONS: &[&str] = &["1", "5", "15", "60", "1D"];

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub db_path: String,
    pub api_port: u16,
    /// Path to the markets JSON file (MARKETS_CONFIG). Re-read on every run and query.
    pub markets_path: String,
    /// Minutes between scheduled poll runs (SNAPSHOT_POLL_INTERVAL_MINUTES)
    pub poll_interval_minutes: u64,
    /// Upper bound on a single provider fetch (FETCH_TIMEOUT_SECS)
    pub fetch_timeout: Duration,
    /// Units processed concurrently within one run (MAX_CONCURRENT_FETCHES)
    pub max_concurrent_fetches: usize,
    pub gamma_api_url: String,
    pub kalshi_api_url: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            db_path: std::env::var("DB_PATH").unwrap_or_else(|_| "odds.db".to_string()),
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse::<u16>()
                .map_err(|_| AppError::Config("API_PORT must be a valid port number".to_string()))?,
            markets_path: std::env::var("MARKETS_CONFIG")
                .unwrap_or_else(|_| MARKETS_CONFIG_PATH.to_string()),
            poll_interval_minutes: std::env::var("SNAPSHOT_POLL_INTERVAL_MINUTES")
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
                .filter(|m| *m > 0)
                .unwrap_or(5),
            fetch_timeout: Duration::from_secs(
                std::env::var("FETCH_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse::<u64>().ok())
                    .filter(|s| *s > 0)
                    .unwrap_or(10),
            ),
            max_concurrent_fetches: std::env::var("MAX_CONCURRENT_FETCHES")
                .ok()
                .and_then(|s| s.parse::<usize>().ok())
                .filter(|n| *n > 0)
                .unwrap_or(8),
            gamma_api_url: std::env::var("GAMMA_API_URL")
                .unwrap_or_else(|_| GAMMA_API_URL.to_string()),
            kalshi_api_url: std::env::var("KALSHI_API_URL")
                .unwrap_or_else(|_| KALSHI_API_URL.to_string()),
        })
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_minutes * 60)
    }
}
