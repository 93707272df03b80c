use async_trait::async_trait;
use tracing::debug;

use crate::db::models::{LastTsRow, SeriesPointRow, SnapshotDbRow};
use crate::error::Result;
use crate::types::{LastSnapshot, SnapshotKey, SnapshotRow};

/// Append-only log of snapshot rows. Rows are never updated or deleted.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn insert(&self, row: &SnapshotRow) -> Result<()>;

    /// Most recent row for the key, by `ts`.
    async fn latest(&self, key: &SnapshotKey) -> Result<Option<SnapshotRow>>;

    /// `(ts_ms, yes)` for `from_ms <= ts <= to_ms`, oldest first.
    async fn series_in_range(
        &self,
        key: &SnapshotKey,
        from_ms: i64,
        to_ms: i64,
    ) -> Result<Vec<(i64, f64)>>;

    /// Newest `ts` for every key that has at least one row.
    async fn last_timestamps_per_key(&self) -> Result<Vec<LastSnapshot>>;
}

pub struct SqliteSnapshotStore {
    pool: sqlx::SqlitePool,
}

impl SqliteSnapshotStore {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SnapshotStore for SqliteSnapshotStore {
    async fn insert(&self, row: &SnapshotRow) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO prediction_snapshots
                (ts, symbol, source, market_key, question, yes, no, volume, liquidity)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(row.ts)
        .bind(&row.symbol)
        .bind(row.source.as_str())
        .bind(&row.market_key)
        .bind(&row.question)
        .bind(row.yes)
        .bind(row.no)
        .bind(row.volume)
        .bind(row.liquidity)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn latest(&self, key: &SnapshotKey) -> Result<Option<SnapshotRow>> {
        let row = sqlx::query_as::<_, SnapshotDbRow>(
            r#"
            SELECT ts, symbol, source, market_key, question, yes, no, volume, liquidity
            FROM prediction_snapshots
            WHERE symbol = ? AND source = ? AND market_key = ?
            ORDER BY ts DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(&key.symbol)
        .bind(key.source.as_str())
        .bind(&key.market_key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(SnapshotRow::try_from).transpose()?)
    }

    async fn series_in_range(
        &self,
        key: &SnapshotKey,
        from_ms: i64,
        to_ms: i64,
    ) -> Result<Vec<(i64, f64)>> {
        let rows = sqlx::query_as::<_, SeriesPointRow>(
            r#"
            SELECT ts, yes
            FROM prediction_snapshots
            WHERE symbol = ? AND source = ? AND market_key = ?
              AND ts >= ? AND ts <= ?
            ORDER BY ts ASC, id ASC
            "#,
        )
        .bind(&key.symbol)
        .bind(key.source.as_str())
        .bind(&key.market_key)
        .bind(from_ms)
        .bind(to_ms)
        .fetch_all(&self.pool)
        .await?;

        debug!(key = %key, from_ms, to_ms, points = rows.len(), "series range read");
        Ok(rows.into_iter().map(|r| (r.ts, r.yes)).collect())
    }

    async fn last_timestamps_per_key(&self) -> Result<Vec<LastSnapshot>> {
        let rows = sqlx::query_as::<_, LastTsRow>(
            r#"
            SELECT symbol, source, market_key, MAX(ts) AS ts
            FROM prediction_snapshots
            GROUP BY symbol, source, market_key
            ORDER BY symbol, source, market_key
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(LastSnapshot::try_from)
            .collect::<std::result::Result<Vec<_>, _>>()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory_pool;
    use crate::types::Source;

    fn row(symbol: &str, source: Source, key: &str, ts: i64, yes: f64) -> SnapshotRow {
        SnapshotRow {
            ts,
            symbol: symbol.to_string(),
            source,
            market_key: key.to_string(),
            question: "Will it?".to_string(),
            yes,
            no: 1.0 - yes,
            volume: Some(1200.5),
            liquidity: None,
        }
    }

    #[tokio::test]
    async fn latest_returns_newest_row_for_key() {
        let store = SqliteSnapshotStore::new(memory_pool().await);
        let key = SnapshotKey::new("SPX", Source::Polymarket, "slug");
        assert!(store.latest(&key).await.unwrap().is_none());

        store.insert(&row("SPX", Source::Polymarket, "slug", 1_000, 0.4)).await.unwrap();
        store.insert(&row("SPX", Source::Polymarket, "slug", 3_000, 0.6)).await.unwrap();
        store.insert(&row("SPX", Source::Polymarket, "slug", 2_000, 0.5)).await.unwrap();
        store.insert(&row("SPX", Source::Kalshi, "slug", 9_000, 0.9)).await.unwrap();

        let latest = store.latest(&key).await.unwrap().unwrap();
        assert_eq!(latest, row("SPX", Source::Polymarket, "slug", 3_000, 0.6));
    }

    #[tokio::test]
    async fn series_range_is_inclusive_and_ordered() {
        let store = SqliteSnapshotStore::new(memory_pool().await);
        for (ts, yes) in [(5_000, 0.5), (1_000, 0.1), (3_000, 0.3), (7_000, 0.7)] {
            store.insert(&row("SPX", Source::Kalshi, "T", ts, yes)).await.unwrap();
        }
        store.insert(&row("NDX", Source::Kalshi, "T", 4_000, 0.99)).await.unwrap();

        let key = SnapshotKey::new("spx", Source::Kalshi, "T");
        let points = store.series_in_range(&key, 1_000, 5_000).await.unwrap();
        assert_eq!(points, vec![(1_000, 0.1), (3_000, 0.3), (5_000, 0.5)]);
    }

    #[tokio::test]
    async fn last_timestamps_cover_every_key() {
        let store = SqliteSnapshotStore::new(memory_pool().await);
        store.insert(&row("SPX", Source::Polymarket, "a", 1_000, 0.4)).await.unwrap();
        store.insert(&row("SPX", Source::Polymarket, "a", 2_000, 0.4)).await.unwrap();
        store.insert(&row("SPX", Source::Kalshi, "k", 1_500, 0.4)).await.unwrap();
        store.insert(&row("BTC", Source::Polymarket, "b", 500, 0.4)).await.unwrap();

        let last = store.last_timestamps_per_key().await.unwrap();
        let flat: Vec<(String, i64)> = last.iter().map(|l| (l.key.to_string(), l.ts)).collect();
        assert_eq!(
            flat,
            vec![
                ("BTC/polymarket/b".to_string(), 500),
                ("SPX/kalshi/k".to_string(), 1_500),
                ("SPX/polymarket/a".to_string(), 2_000),
            ]
        );
    }
}
