//! Symbol → market configuration.
//!
//! The file on disk maps each symbol to per-provider keys, where each entry is
//! `null`, a single key, or a list of keys. Parsing collapses that into a
//! canonical `MarketsConfig`; nothing downstream sees the union.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::{AppError, Result};
use crate::types::{MarketRef, Source};

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

#[derive(Debug, Default, Deserialize)]
struct RawSymbolEntry {
    #[serde(default)]
    polymarket: Option<OneOrMany>,
    #[serde(default)]
    kalshi: Option<OneOrMany>,
}

fn to_keys(v: Option<OneOrMany>) -> Vec<String> {
    let keys = match v {
        None => Vec::new(),
        Some(OneOrMany::One(s)) => vec![s],
        Some(OneOrMany::Many(v)) => v,
    };
    keys.into_iter()
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .collect()
}

/// Point-in-time view of the configured markets, keyed by uppercase symbol.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MarketsConfig {
    symbols: BTreeMap<String, Vec<MarketRef>>,
}

impl MarketsConfig {
    pub fn from_json(raw: &str) -> Result<Self> {
        let parsed: BTreeMap<String, RawSymbolEntry> = serde_json::from_str(raw)
            .map_err(|e| AppError::Config(format!("invalid markets config: {e}")))?;

        let mut symbols: BTreeMap<String, Vec<MarketRef>> = BTreeMap::new();
        for (symbol, entry) in parsed {
            let refs = symbols.entry(symbol.trim().to_uppercase()).or_default();
            for market_key in to_keys(entry.polymarket) {
                refs.push(MarketRef { source: Source::Polymarket, market_key });
            }
            for market_key in to_keys(entry.kalshi) {
                refs.push(MarketRef { source: Source::Kalshi, market_key });
            }
        }
        // polymarket refs first, config order otherwise
        for refs in symbols.values_mut() {
            refs.sort_by_key(|r| r.source);
        }
        Ok(Self { symbols })
    }

    /// Read and parse the markets file. Called at the start of every run and
    /// query so edits on disk take effect without a restart.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
            AppError::Config(format!("cannot read markets config {}: {e}", path.display()))
        })?;
        Self::from_json(&raw)
    }

    /// Symbols with at least one market, ascending.
    pub fn all_symbols(&self) -> Vec<String> {
        self.symbols
            .iter()
            .filter(|(_, refs)| !refs.is_empty())
            .map(|(s, _)| s.clone())
            .collect()
    }

    /// Case-insensitive; unknown symbols yield an empty list.
    pub fn markets_for(&self, symbol: &str) -> Vec<MarketRef> {
        self.symbols
            .get(&symbol.trim().to_uppercase())
            .cloned()
            .unwrap_or_default()
    }

    pub fn is_configured(&self, symbol: &str, source: Source, market_key: &str) -> bool {
        self.symbols
            .get(&symbol.trim().to_uppercase())
            .is_some_and(|refs| {
                refs.iter()
                    .any(|r| r.source == source && r.market_key == market_key)
            })
    }

    /// First polymarket and first kalshi key for a symbol.
    pub fn first_market_keys(&self, symbol: &str) -> (Option<String>, Option<String>) {
        let refs = self.markets_for(symbol);
        let first = |source: Source| {
            refs.iter()
                .find(|r| r.source == source)
                .map(|r| r.market_key.clone())
        };
        (first(Source::Polymarket), first(Source::Kalshi))
    }
}
