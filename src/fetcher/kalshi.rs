use async_trait::async_trait;
use tracing::warn;

use super::{endpoint, get_json, num, text, OddsFetcher};
use crate::error::Result;
use crate::types::{FetchedOdds, Source};

/// Kalshi trade API v2. A key is tried as an event ticker first, then as a
/// market ticker.
pub struct KalshiClient {
    client: reqwest::Client,
    base_url: String,
}

impl KalshiClient {
    pub fn new(client: reqwest::Client, base_url: String) -> Self {
        Self { client, base_url }
    }

    async fn fetch_ticker(&self, ticker: &str) -> Result<Option<FetchedOdds>> {
        let url = endpoint(&self.base_url, &["events", ticker])?;
        if let Some(body) = get_json(&self.client, url).await? {
            if let Some(odds) = parse_kalshi_event(&body) {
                return Ok(Some(odds));
            }
        }

        let url = endpoint(&self.base_url, &["markets", ticker])?;
        let Some(body) = get_json(&self.client, url).await? else {
            return Ok(None);
        };
        Ok(parse_kalshi_market(&body))
    }
}

#[async_trait]
impl OddsFetcher for KalshiClient {
    fn source(&self) -> Source {
        Source::Kalshi
    }

    async fn fetch(&self, market_key: &str) -> Option<FetchedOdds> {
        match self.fetch_ticker(market_key).await {
            Ok(odds) => odds,
            Err(e) => {
                warn!(source = "kalshi", market_key, "fetch failed: {e}");
                None
            }
        }
    }
}

/// Yes probability from cents: bid/ask mid (ask defaults to bid), else last price.
fn yes_probability(m: &serde_json::Value) -> Option<f64> {
    let yes = match num(m.get("yes_bid")) {
        Some(bid) => (bid + num(m.get("yes_ask")).unwrap_or(bid)) / 2.0 / 100.0,
        None => num(m.get("last_price"))? / 100.0,
    };
    yes.is_finite().then_some(yes)
}

pub fn parse_kalshi_event(event: &serde_json::Value) -> Option<FetchedOdds> {
    let market = match event.get("markets") {
        Some(serde_json::Value::Array(a)) => a.first()?,
        None | Some(serde_json::Value::Null) => return None,
        Some(_) => event,
    };
    let yes = yes_probability(market)?;
    let question = text(event, "title")
        .or_else(|| text(market, "title"))
        .unwrap_or("")
        .to_string();
    Some(FetchedOdds {
        yes,
        no: 1.0 - yes,
        question: Some(question),
        volume: None,
        liquidity: None,
    })
}

/// Market body, bare or wrapped as `{"market": {...}}`.
pub fn parse_kalshi_market(body: &serde_json::Value) -> Option<FetchedOdds> {
    let market = body.get("market").filter(|m| m.is_object()).unwrap_or(body);
    let yes = yes_probability(market)?;
    let question = text(market, "title")
        .or_else(|| text(market, "question"))
        .unwrap_or("")
        .to_string();
    Some(FetchedOdds {
        yes,
        no: 1.0 - yes,
        question: Some(question),
        volume: None,
        liquidity: None,
    })
}
