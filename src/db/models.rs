/// Database row types for the `prediction_snapshots` table (see migrations/).
/// Used by sqlx for typed queries.
use crate::types::{LastSnapshot, SnapshotKey, SnapshotRow, Source};

#[derive(Debug, sqlx::FromRow)]
pub struct SnapshotDbRow {
    pub ts: i64,
    pub symbol: String,
    pub source: String,
    pub market_key: String,
    pub question: String,
    pub yes: f64,
    pub no: f64,
    pub volume: Option<f64>,
    pub liquidity: Option<f64>,
}

#[derive(Debug, sqlx::FromRow)]
pub struct SeriesPointRow {
    pub ts: i64,
    pub yes: f64,
}

#[derive(Debug, sqlx::FromRow)]
pub struct LastTsRow {
    pub symbol: String,
    pub source: String,
    pub market_key: String,
    pub ts: i64,
}

fn parse_source(s: &str) -> Result<Source, sqlx::Error> {
    Source::parse(s).ok_or_else(|| sqlx::Error::Decode(format!("unknown source '{s}'").into()))
}

impl TryFrom<SnapshotDbRow> for SnapshotRow {
    type Error = sqlx::Error;

    fn try_from(r: SnapshotDbRow) -> Result<Self, Self::Error> {
        Ok(SnapshotRow {
            ts: r.ts,
            symbol: r.symbol,
            source: parse_source(&r.source)?,
            market_key: r.market_key,
            question: r.question,
            yes: r.yes,
            no: r.no,
            volume: r.volume,
            liquidity: r.liquidity,
        })
    }
}

impl TryFrom<LastTsRow> for LastSnapshot {
    type Error = sqlx::Error;

    fn try_from(r: LastTsRow) -> Result<Self, Self::Error> {
        Ok(LastSnapshot {
            key: SnapshotKey {
                symbol: r.symbol,
                source: parse_source(&r.source)?,
                market_key: r.market_key,
            },
            ts: r.ts,
        })
    }
}
