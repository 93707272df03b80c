//! Read-side queries over the snapshot store. Both refuse keys that are not
//! in the current markets configuration instead of aggregating stray rows.

use crate::config::{DERIVED_LOOKBACK_MS, DERIVED_RESOLUTION_MINUTES, SMOOTH_WINDOW};
use crate::db::SnapshotStore;
use crate::error::{AppError, Result};
use crate::markets::MarketsConfig;
use crate::series::{aggregate, derive};
use crate::types::{Bar, DerivedStats, SnapshotKey};

fn ensure_configured(markets: &MarketsConfig, key: &SnapshotKey) -> Result<()> {
    if markets.is_configured(&key.symbol, key.source, &key.market_key) {
        Ok(())
    } else {
        Err(AppError::NotFound(format!("market not configured for symbol: {key}")))
    }
}

/// Yes-probability bars (× 100) for `from_ms..=to_ms`.
pub async fn bars_query(
    store: &dyn SnapshotStore,
    markets: &MarketsConfig,
    key: &SnapshotKey,
    from_ms: i64,
    to_ms: i64,
    resolution_minutes: i64,
) -> Result<Vec<Bar>> {
    ensure_configured(markets, key)?;
    let points: Vec<(i64, f64)> = store
        .series_in_range(key, from_ms, to_ms)
        .await?
        .into_iter()
        .map(|(ts, yes)| (ts, yes * 100.0))
        .collect();
    Ok(aggregate(&points, resolution_minutes))
}

/// Derived stats over the trailing week of 15-minute bars ending at `now_ms`.
pub async fn derived_query(
    store: &dyn SnapshotStore,
    markets: &MarketsConfig,
    key: &SnapshotKey,
    now_ms: i64,
) -> Result<DerivedStats> {
    let bars = bars_query(
        store,
        markets,
        key,
        now_ms - DERIVED_LOOKBACK_MS,
        now_ms,
        DERIVED_RESOLUTION_MINUTES,
    )
    .await?;
    Ok(derive(&bars, SMOOTH_WINDOW))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{memory_pool, SqliteSnapshotStore};
    use crate::types::{SnapshotRow, Source};

    const MARKETS: &str = r#"{ "SPX": { "polymarket": "spx-a" } }"#;

    fn row(ts: i64, yes: f64) -> SnapshotRow {
        SnapshotRow {
            ts,
            symbol: "SPX".to_string(),
            source: Source::Polymarket,
            market_key: "spx-a".to_string(),
            question: String::new(),
            yes,
            no: 1.0 - yes,
            volume: None,
            liquidity: None,
        }
    }

    async fn seeded_store(rows: &[(i64, f64)]) -> SqliteSnapshotStore {
        let store = SqliteSnapshotStore::new(memory_pool().await);
        for &(ts, yes) in rows {
            store.insert(&row(ts, yes)).await.unwrap();
        }
        store
    }

    #[tokio::test]
    async fn bars_are_percentages() {
        let store = seeded_store(&[(0, 0.10), (30_000, 0.20), (65_000, 0.15)]).await;
        let markets = MarketsConfig::from_json(MARKETS).unwrap();
        let key = SnapshotKey::new("spx", Source::Polymarket, "spx-a");

        let bars = bars_query(&store, &markets, &key, 0, 120_000, 1).await.unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].time, 0);
        assert!((bars[0].open - 10.0).abs() < 1e-9);
        assert!((bars[0].high - 20.0).abs() < 1e-9);
        assert!((bars[0].close - 20.0).abs() < 1e-9);
        assert_eq!(bars[1].time, 60);
        assert!((bars[1].close - 15.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn unconfigured_key_is_not_found_even_with_rows() {
        let store = seeded_store(&[(0, 0.5)]).await;
        let markets = MarketsConfig::from_json(r#"{ "SPX": { "kalshi": "INX" } }"#).unwrap();
        let key = SnapshotKey::new("SPX", Source::Polymarket, "spx-a");

        let err = bars_query(&store, &markets, &key, 0, 1_000, 1).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        let err = derived_query(&store, &markets, &key, 1_000).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn derived_uses_trailing_week_of_fifteen_minute_bars() {
        let now = 30 * 24 * 60 * 60 * 1000i64;
        let bucket = 15 * 60_000;
        let store = seeded_store(&[
            // older than the lookback: ignored
            (now - DERIVED_LOOKBACK_MS - bucket, 0.90),
            (now - 3 * bucket, 0.10),
            (now - 2 * bucket, 0.20),
            (now - bucket, 0.10),
        ])
        .await;
        let markets = MarketsConfig::from_json(MARKETS).unwrap();
        let key = SnapshotKey::new("SPX", Source::Polymarket, "spx-a");

        let stats = derived_query(&store, &markets, &key, now).await.unwrap();
        assert_eq!(stats.bars_used, 3);
        assert!((stats.current.unwrap() - 10.0).abs() < 1e-9);
        assert!((stats.roc.unwrap() + 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn derived_with_no_rows_is_empty() {
        let store = seeded_store(&[]).await;
        let markets = MarketsConfig::from_json(MARKETS).unwrap();
        let key = SnapshotKey::new("SPX", Source::Polymarket, "spx-a");

        let stats = derived_query(&store, &markets, &key, 1_000_000).await.unwrap();
        assert_eq!(stats.bars_used, 0);
        assert_eq!(stats.current, None);
    }
}
