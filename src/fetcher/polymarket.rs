use async_trait::async_trait;
use serde::Serialize;
use tracing::warn;

use super::{endpoint, get_json, list, num, text, OddsFetcher};
use crate::error::Result;
use crate::types::{FetchedOdds, Source};

/// Gamma events API, keyed by event slug.
pub struct PolymarketClient {
    client: reqwest::Client,
    base_url: String,
}

impl PolymarketClient {
    pub fn new(client: reqwest::Client, base_url: String) -> Self {
        Self { client, base_url }
    }

    async fn fetch_event(&self, slug: &str) -> Result<Option<FetchedOdds>> {
        let url = endpoint(&self.base_url, &["events", "slug", slug])?;
        let Some(body) = get_json(&self.client, url).await? else {
            return Ok(None);
        };
        Ok(parse_gamma_event(&body))
    }

    /// Open markets matching a free-text topic. `None` when Gamma answers
    /// with a non-success status.
    pub async fn search(&self, topic: &str, limit: usize) -> Result<Option<Vec<SearchRow>>> {
        let mut url = endpoint(&self.base_url, &["public-search"])?;
        url.query_pairs_mut()
            .append_pair("q", topic)
            .append_pair("limit_per_type", &limit.to_string());
        Ok(get_json(&self.client, url)
            .await?
            .map(|body| parse_public_search(&body)))
    }
}

/// One open market from a topic search.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRow {
    pub question: String,
    /// First outcome's price, as quoted (0..1).
    pub yes_pct: f64,
    pub outcome_label: String,
    pub volume: f64,
    pub liquidity: f64,
    pub slug: String,
    pub url: String,
}

/// Rows for every open market of every event in a `public-search` body.
/// Closed markets and markets without outcomes or prices are skipped.
pub fn parse_public_search(body: &serde_json::Value) -> Vec<SearchRow> {
    let Some(events) = body.get("events").and_then(|e| e.as_array()) else {
        return Vec::new();
    };

    let mut rows = Vec::new();
    for event in events {
        let event_slug = text(event, "slug").unwrap_or("");
        let Some(markets) = event.get("markets").and_then(|m| m.as_array()) else {
            continue;
        };
        for market in markets {
            if market.get("closed").and_then(|c| c.as_bool()) == Some(true) {
                continue;
            }
            let outcomes = list(market.get("outcomes"));
            let prices = list(market.get("outcomePrices"));
            let (Some(first_outcome), Some(first_price)) = (outcomes.first(), prices.first()) else {
                continue;
            };

            let non_empty = |field: &str| text(market, field).filter(|s| !s.is_empty());
            rows.push(SearchRow {
                question: non_empty("question")
                    .or_else(|| text(event, "title"))
                    .unwrap_or("")
                    .to_string(),
                yes_pct: num(Some(first_price)).filter(|p| p.is_finite()).unwrap_or(0.0),
                outcome_label: match first_outcome {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                },
                volume: num(market.get("volume")).filter(|v| v.is_finite()).unwrap_or(0.0),
                liquidity: num(market.get("liquidity")).filter(|v| v.is_finite()).unwrap_or(0.0),
                slug: non_empty("slug").unwrap_or(event_slug).to_string(),
                url: format!("https://polymarket.com/event/{event_slug}"),
            });
        }
    }
    rows
}

#[async_trait]
impl OddsFetcher for PolymarketClient {
    fn source(&self) -> Source {
        Source::Polymarket
    }

    async fn fetch(&self, market_key: &str) -> Option<FetchedOdds> {
        match self.fetch_event(market_key).await {
            Ok(odds) => odds,
            Err(e) => {
                warn!(source = "polymarket", market_key, "fetch failed: {e}");
                None
            }
        }
    }
}

/// Odds from a Gamma event body. Uses the event's first market; `outcomes`
/// and `outcomePrices` may be arrays or JSON-encoded strings.
pub fn parse_gamma_event(event: &serde_json::Value) -> Option<FetchedOdds> {
    let market = match event.get("markets") {
        Some(serde_json::Value::Array(a)) => a.first()?,
        Some(m) if m.is_object() => m,
        _ => event,
    };
    if !market.is_object() {
        return None;
    }

    let outcomes = list(market.get("outcomes"));
    let prices = list(market.get("outcomePrices"));
    if outcomes.is_empty() || prices.is_empty() {
        return None;
    }

    let position = |labels: [&str; 2]| {
        outcomes
            .iter()
            .position(|o| o.as_str().is_some_and(|s| labels.contains(&s)))
    };
    let yes_idx = position(["Yes", "yes"]);
    let no_idx = position(["No", "no"]);
    let price = |i: usize| num(prices.get(i)).unwrap_or(f64::NAN);

    let yes_raw = price(yes_idx.unwrap_or(0));
    let no_raw = match (no_idx, yes_idx) {
        (Some(n), _) => price(n),
        (None, Some(0)) => price(1),
        (None, _) => price(0),
    };

    let question = text(market, "question")
        .or_else(|| text(event, "title"))
        .unwrap_or("")
        .to_string();

    Some(FetchedOdds {
        yes: if yes_raw.is_finite() { yes_raw } else { 0.0 },
        no: if no_raw.is_finite() { no_raw } else { 1.0 - yes_raw },
        question: Some(question),
        volume: num(market.get("volume")).filter(|v| v.is_finite()),
        liquidity: num(market.get("liquidity")).filter(|v| v.is_finite()),
    })
}
