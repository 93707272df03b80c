//! Provider fetch clients. Each client turns one market key into a uniform
//! `FetchedOdds`, failing closed: transport, status, and shape problems are
//! logged and reported as `None`, never as an error.

pub mod kalshi;
pub mod polymarket;

pub use kalshi::KalshiClient;
pub use polymarket::{PolymarketClient, SearchRow};

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::types::{FetchedOdds, Source};

#[async_trait]
pub trait OddsFetcher: Send + Sync {
    fn source(&self) -> Source;

    async fn fetch(&self, market_key: &str) -> Option<FetchedOdds>;
}

/// One client per provider, looked up by the `source` tag on a market ref.
#[derive(Clone, Default)]
pub struct Fetchers {
    clients: HashMap<Source, Arc<dyn OddsFetcher>>,
}

/// Shared HTTP client for every provider call, bounded by the fetch timeout.
pub fn http_client(cfg: &Config) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(cfg.fetch_timeout)
        .build()?)
}

impl Fetchers {
    pub fn from_config(cfg: &Config, client: &reqwest::Client) -> Self {
        Self::from_clients(vec![
            Arc::new(PolymarketClient::new(client.clone(), cfg.gamma_api_url.clone())),
            Arc::new(KalshiClient::new(client.clone(), cfg.kalshi_api_url.clone())),
        ])
    }

    pub fn from_clients(clients: Vec<Arc<dyn OddsFetcher>>) -> Self {
        Self {
            clients: clients.into_iter().map(|c| (c.source(), c)).collect(),
        }
    }

    pub fn get(&self, source: Source) -> Option<Arc<dyn OddsFetcher>> {
        self.clients.get(&source).cloned()
    }
}

/// `base` + percent-encoded path segments.
pub(crate) fn endpoint(base: &str, segments: &[&str]) -> Result<reqwest::Url> {
    let mut url = reqwest::Url::parse(base)
        .map_err(|e| AppError::Fetch(format!("invalid base url {base}: {e}")))?;
    url.path_segments_mut()
        .map_err(|_| AppError::Fetch(format!("base url cannot carry a path: {base}")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// GET a JSON body. A non-2xx status is `Ok(None)`.
pub(crate) async fn get_json(
    client: &reqwest::Client,
    url: reqwest::Url,
) -> Result<Option<serde_json::Value>> {
    let resp = client.get(url.clone()).send().await?;
    if !resp.status().is_success() {
        debug!(%url, status = %resp.status(), "provider returned non-success status");
        return Ok(None);
    }
    Ok(Some(resp.json().await?))
}

/// A number, or a string holding one.
pub(crate) fn num(v: Option<&serde_json::Value>) -> Option<f64> {
    let v = v?;
    v.as_f64()
        .or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
}

/// A JSON array, or a string holding a JSON-encoded array.
pub(crate) fn list(v: Option<&serde_json::Value>) -> Vec<serde_json::Value> {
    match v {
        Some(serde_json::Value::Array(a)) => a.clone(),
        Some(serde_json::Value::String(s)) => serde_json::from_str(s).unwrap_or_default(),
        _ => Vec::new(),
    }
}

pub(crate) fn text<'a>(v: &'a serde_json::Value, field: &str) -> Option<&'a str> {
    v.get(field).and_then(|s| s.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn num_accepts_numbers_and_numeric_strings() {
        assert_eq!(num(Some(&json!(0.42))), Some(0.42));
        assert_eq!(num(Some(&json!("0.42"))), Some(0.42));
        assert_eq!(num(Some(&json!("abc"))), None);
        assert_eq!(num(Some(&json!(null))), None);
        assert_eq!(num(None), None);
    }

    #[test]
    fn list_accepts_arrays_and_stringified_arrays() {
        assert_eq!(list(Some(&json!(["Yes", "No"]))), vec![json!("Yes"), json!("No")]);
        assert_eq!(list(Some(&json!("[\"0.6\", \"0.4\"]"))), vec![json!("0.6"), json!("0.4")]);
        assert!(list(Some(&json!("not json"))).is_empty());
        assert!(list(None).is_empty());
    }

    #[test]
    fn endpoint_encodes_segments_under_base_path() {
        let url = endpoint("https://api.example.com/trade-api/v2", &["events", "A B/C"]).unwrap();
        assert_eq!(url.as_str(), "https://api.example.com/trade-api/v2/events/A%20B%2FC");
        let url = endpoint("https://gamma.example.com/", &["events", "slug", "spx"]).unwrap();
        assert_eq!(url.as_str(), "https://gamma.example.com/events/slug/spx");
    }

    struct Fixed(Source);

    #[async_trait]
    impl OddsFetcher for Fixed {
        fn source(&self) -> Source {
            self.0
        }
        async fn fetch(&self, _market_key: &str) -> Option<FetchedOdds> {
            None
        }
    }

    #[test]
    fn registry_resolves_by_source() {
        let fetchers = Fetchers::from_clients(vec![Arc::new(Fixed(Source::Kalshi))]);
        assert_eq!(fetchers.get(Source::Kalshi).map(|c| c.source()), Some(Source::Kalshi));
        assert!(fetchers.get(Source::Polymarket).is_none());
    }
}
