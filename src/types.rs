use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Market identity
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Polymarket,
    Kalshi,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Polymarket => "polymarket",
            Source::Kalshi => "kalshi",
        }
    }

    /// Case-insensitive parse of the wire/query name.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "polymarket" => Some(Source::Polymarket),
            "kalshi" => Some(Source::Kalshi),
            _ => None,
        }
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One tradable market at one provider. `market_key` is a slug (polymarket)
/// or a ticker (kalshi) and is opaque everywhere outside the fetch clients.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketRef {
    pub source: Source,
    pub market_key: String,
}

/// Identity of a snapshot series: `(symbol, source, market_key)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SnapshotKey {
    pub symbol: String,
    pub source: Source,
    pub market_key: String,
}

impl SnapshotKey {
    pub fn new(symbol: &str, source: Source, market_key: &str) -> Self {
        Self {
            symbol: symbol.to_uppercase(),
            source,
            market_key: market_key.to_string(),
        }
    }
}

impl std::fmt::Display for SnapshotKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.symbol, self.source, self.market_key)
    }
}

// ---------------------------------------------------------------------------
// Snapshots
// ---------------------------------------------------------------------------

/// Uniform result of a provider fetch. Values are raw: probabilities may be
/// out of range or non-finite until they pass through the normalizer.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FetchedOdds {
    pub yes: f64,
    pub no: f64,
    pub question: Option<String>,
    pub volume: Option<f64>,
    pub liquidity: Option<f64>,
}

/// One normalized observation. `yes`/`no` are always within [0, 1] and
/// `symbol` is always uppercase.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotRow {
    /// Unix epoch milliseconds.
    pub ts: i64,
    pub symbol: String,
    pub source: Source,
    pub market_key: String,
    pub question: String,
    pub yes: f64,
    pub no: f64,
    pub volume: Option<f64>,
    pub liquidity: Option<f64>,
}

/// Last stored timestamp for one series, as reported by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct LastSnapshot {
    pub key: SnapshotKey,
    pub ts: i64,
}

// ---------------------------------------------------------------------------
// Read-side outputs
// ---------------------------------------------------------------------------

/// One resolution bucket. `time` is whole Unix seconds; values are in the
/// unit of the input points (probability × 100 on the bars query).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Bar {
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivedStats {
    pub current: Option<f64>,
    pub smoothed: Option<f64>,
    pub roc: Option<f64>,
    pub roc_z_score: Option<f64>,
    pub bars_used: usize,
}

// ---------------------------------------------------------------------------
// Poll run
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    /// RFC 3339 timestamp of the run's `now`.
    pub ts: String,
    pub symbols: usize,
    pub inserted: usize,
    pub skipped: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}
