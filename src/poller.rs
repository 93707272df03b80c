use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, SecondsFormat, Utc};
use dashmap::DashMap;
use futures_util::{stream, StreamExt};
use tokio::sync::Mutex;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::api::health::HealthState;
use crate::api::latency::LatencyStats;
use crate::config::Config;
use crate::db::SnapshotStore;
use crate::error::Result;
use crate::fetcher::Fetchers;
use crate::markets::MarketsConfig;
use crate::snapshot::{normalize, should_insert};
use crate::types::{RunSummary, SnapshotKey};

enum UnitOutcome {
    Inserted,
    Skipped,
    Failed(String),
}

/// Polls every configured market once per run: fetch → normalize → dedup →
/// store. Units are independent; a failing unit is recorded and the run
/// carries on. All cross-run memory lives in the store.
pub struct Poller {
    store: Arc<dyn SnapshotStore>,
    fetchers: Fetchers,
    markets_path: PathBuf,
    fetch_timeout: Duration,
    max_concurrent: usize,
    /// Serializes fetch → latest → dedup → insert per key so dedup always
    /// compares against the true most recent row. Entries live only while a
    /// unit for that key is queued or running.
    key_locks: DashMap<SnapshotKey, Arc<Mutex<()>>>,
    latency: Arc<LatencyStats>,
    health: Arc<HealthState>,
}

impl Poller {
    pub fn new(
        cfg: &Config,
        store: Arc<dyn SnapshotStore>,
        fetchers: Fetchers,
        latency: Arc<LatencyStats>,
        health: Arc<HealthState>,
    ) -> Self {
        Self {
            store,
            fetchers,
            markets_path: PathBuf::from(&cfg.markets_path),
            fetch_timeout: cfg.fetch_timeout,
            max_concurrent: cfg.max_concurrent_fetches.max(1),
            key_locks: DashMap::new(),
            latency,
            health,
        }
    }

    /// Scheduled loop: one run immediately, then every `every`.
    pub async fn run_scheduled(self: Arc<Self>, every: Duration) {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if let Err(e) = self.run_now(Utc::now().timestamp_millis()).await {
                error!("Scheduled poll failed: {e}");
            }
        }
    }

    /// Load a fresh markets snapshot and run once. Failing to load the
    /// configuration aborts the run before any unit executes.
    pub async fn run_now(&self, now_ms: i64) -> Result<RunSummary> {
        let markets = match MarketsConfig::load(&self.markets_path).await {
            Ok(m) => m,
            Err(e) => {
                self.health.record_failed_run();
                error!("Poll run aborted: {e}");
                return Err(e);
            }
        };
        Ok(self.run(&markets, now_ms).await)
    }

    pub async fn run(&self, markets: &MarketsConfig, now_ms: i64) -> RunSummary {
        let started = Instant::now();
        let symbols = markets.all_symbols();
        let units: Vec<SnapshotKey> = symbols
            .iter()
            .flat_map(|symbol| {
                markets
                    .markets_for(symbol)
                    .into_iter()
                    .map(move |r| SnapshotKey::new(symbol, r.source, &r.market_key))
            })
            .collect();
        let unit_count = units.len();

        let outcomes: Vec<UnitOutcome> = stream::iter(units)
            .map(|key| self.process_unit(key, now_ms))
            .buffer_unordered(self.max_concurrent)
            .collect()
            .await;

        let mut summary = RunSummary {
            ts: rfc3339(now_ms),
            symbols: symbols.len(),
            ..Default::default()
        };
        for outcome in outcomes {
            match outcome {
                UnitOutcome::Inserted => summary.inserted += 1,
                UnitOutcome::Skipped => summary.skipped += 1,
                UnitOutcome::Failed(e) => summary.errors.push(e),
            }
        }
        // completion order is arbitrary
        summary.errors.sort();

        self.health.record_run(now_ms, &summary);
        info!(
            units = unit_count,
            inserted = summary.inserted,
            skipped = summary.skipped,
            errors = summary.errors.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Poll run complete: {} inserted, {} skipped, {} errors",
            summary.inserted,
            summary.skipped,
            summary.errors.len(),
        );
        summary
    }

    async fn process_unit(&self, key: SnapshotKey, now_ms: i64) -> UnitOutcome {
        let lock = Arc::clone(&self.key_locks.entry(key.clone()).or_default());
        let outcome = {
            let _guard = lock.lock().await;
            self.process_locked(&key, now_ms).await
        };
        drop(lock);
        // only the map's handle left: nobody is waiting on this key
        self.key_locks.remove_if(&key, |_, l| Arc::strong_count(l) == 1);
        outcome
    }

    async fn process_locked(&self, key: &SnapshotKey, now_ms: i64) -> UnitOutcome {
        let Some(fetcher) = self.fetchers.get(key.source) else {
            return self.fail(key, "no client for source".to_string());
        };

        let fetch_started = Instant::now();
        let fetched = tokio::time::timeout(self.fetch_timeout, fetcher.fetch(&key.market_key)).await;
        self.latency.record(fetch_started.elapsed());

        let odds = match fetched {
            Ok(Some(odds)) => odds,
            Ok(None) => return self.fail(key, "no data".to_string()),
            Err(_) => return self.fail(key, "fetch timed out".to_string()),
        };

        let row = normalize(&key.symbol, key.source, &key.market_key, &odds, now_ms);
        let last = match self.store.latest(key).await {
            Ok(last) => last,
            Err(e) => return self.fail(key, e.to_string()),
        };

        if !should_insert(&row, last.as_ref()) {
            debug!(
                symbol = %key.symbol,
                source = %key.source,
                market_key = %key.market_key,
                yes = row.yes,
                "unchanged within dedup window, skipped"
            );
            return UnitOutcome::Skipped;
        }

        if let Err(e) = self.store.insert(&row).await {
            return self.fail(key, e.to_string());
        }
        debug!(
            symbol = %key.symbol,
            source = %key.source,
            market_key = %key.market_key,
            yes = row.yes,
            no = row.no,
            "snapshot stored"
        );
        UnitOutcome::Inserted
    }

    fn fail(&self, key: &SnapshotKey, reason: String) -> UnitOutcome {
        warn!(
            symbol = %key.symbol,
            source = %key.source,
            market_key = %key.market_key,
            "poll unit failed: {reason}"
        );
        UnitOutcome::Failed(format!("{key}: {reason}"))
    }
}

pub(crate) fn rfc3339(ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_default()
}
