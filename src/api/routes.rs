use std::sync::Arc;

use axum::{
    extract::{Query, Request, State},
    http::{header, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::api::health::HealthState;
use crate::api::latency::LatencyStats;
use crate::config::{
    DEFAULT_SEARCH_LIMIT, DEFAULT_SERIES_LOOKBACK_MS, MAX_RESOLUTION_MINUTES, MAX_SEARCH_LIMIT,
    SUPPORTED_RESOLUTIONS,
};
use crate::db::SnapshotStore;
use crate::error::{AppError, Result};
use crate::fetcher::{Fetchers, PolymarketClient, SearchRow};
use crate::markets::MarketsConfig;
use crate::poller::{rfc3339, Poller};
use crate::series::{bars_query, derived_query};
use crate::snapshot::normalize;
use crate::types::{Bar, DerivedStats, LastSnapshot, SnapshotKey, Source};

#[derive(Clone)]
pub struct ApiState {
    pub store: Arc<dyn SnapshotStore>,
    pub poller: Arc<Poller>,
    /// Live lookups for `/prediction`; the same clients the poller uses.
    pub fetchers: Fetchers,
    pub search: Arc<PolymarketClient>,
    pub markets_path: Arc<str>,
    pub poll_interval_minutes: u64,
    pub latency: Arc<LatencyStats>,
    pub health: Arc<HealthState>,
}

impl ApiState {
    /// Fresh view of the markets file for this request.
    async fn markets(&self) -> Result<MarketsConfig> {
        MarketsConfig::load(&*self.markets_path).await
    }

    async fn live_odds(
        &self,
        symbol: &str,
        source: Source,
        market_key: Option<&str>,
        now_ms: i64,
    ) -> Option<LiveOdds> {
        let market_key = market_key?;
        let odds = self.fetchers.get(source)?.fetch(market_key).await?;
        let row = normalize(symbol, source, market_key, &odds, now_ms);
        Some(LiveOdds {
            yes: row.yes,
            no: row.no,
            question: row.question,
        })
    }
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(get_health))
        .route("/cron/snapshot", get(run_snapshot).post(run_snapshot))
        .route("/markets", get(get_markets))
        .route("/prediction", get(get_prediction))
        .route("/predictions-list", get(get_predictions_list))
        .route("/series", get(get_series))
        .route("/derived", get(get_derived))
        .route("/status", get(get_status))
        .route("/udf/config", get(get_udf_config))
        .route("/udf/symbols", get(get_udf_symbols))
        .route("/udf/history", get(get_udf_history))
        .route("/stats/latency", get(get_stats_latency))
        .layer(middleware::from_fn(cors))
        .with_state(state)
}

/// Open CORS on every response. Preflights are answered here with 204.
async fn cors(req: Request, next: Next) -> Response {
    let mut res = if req.method() == Method::OPTIONS {
        StatusCode::NO_CONTENT.into_response()
    } else {
        next.run(req).await
    };
    let headers = res.headers_mut();
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type"),
    );
    res
}

// ---------------------------------------------------------------------------
// Query param structs
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct SymbolQuery {
    pub symbol: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesQuery {
    pub symbol: Option<String>,
    pub market_key: Option<String>,
    pub source: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub resolution: Option<String>,
}

#[derive(Deserialize)]
pub struct SearchQuery {
    pub topic: Option<String>,
    pub limit: Option<String>,
}

#[derive(Deserialize)]
pub struct UdfHistoryQuery {
    pub symbol: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub resolution: Option<String>,
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketOption {
    pub source: Source,
    pub market_key: String,
    pub label: String,
}

#[derive(Serialize)]
pub struct DefaultMarkets {
    pub polymarket: Option<String>,
    pub kalshi: Option<String>,
}

#[derive(Serialize)]
pub struct MarketsResponse {
    pub symbol: String,
    pub markets: Vec<MarketOption>,
    /// First configured key per provider, preselected by chart UIs.
    pub defaults: DefaultMarkets,
}

#[derive(Debug, Serialize)]
pub struct LiveOdds {
    pub yes: f64,
    pub no: f64,
    pub question: String,
}

#[derive(Debug, Serialize)]
pub struct PredictionResponse {
    pub symbol: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub polymarket: Option<LiveOdds>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kalshi: Option<LiveOdds>,
}

#[derive(Serialize)]
pub struct SearchResponse {
    pub topic: String,
    pub markets: Vec<SearchRow>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesResponse {
    pub symbol: String,
    pub source: Source,
    pub market_key: String,
    pub resolution: i64,
    pub bars: Vec<Bar>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivedResponse {
    pub symbol: String,
    pub source: Source,
    pub market_key: String,
    #[serde(flatten)]
    pub stats: DerivedStats,
}

#[derive(Serialize)]
pub struct LastSnapshotResponse {
    pub symbol: String,
    pub source: Source,
    pub market_key: String,
    pub ts: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub ok: bool,
    pub last_snapshots: Vec<LastSnapshotResponse>,
    pub healthy: Option<bool>,
    pub poll_interval_minutes: u64,
}

// ---------------------------------------------------------------------------
// Param parsing
// ---------------------------------------------------------------------------

fn parse_key(
    symbol: Option<&str>,
    market_key: Option<&str>,
    source: Option<&str>,
) -> Result<SnapshotKey> {
    let symbol = symbol.map(str::trim).filter(|s| !s.is_empty());
    let market_key = market_key.map(str::trim).filter(|s| !s.is_empty());
    let source = source.and_then(Source::parse);
    match (symbol, market_key, source) {
        (Some(symbol), Some(market_key), Some(source)) => {
            Ok(SnapshotKey::new(symbol, source, market_key))
        }
        _ => Err(AppError::BadRequest(
            "missing or invalid symbol, marketKey, or source (polymarket|kalshi)".to_string(),
        )),
    }
}

/// Seconds or milliseconds; values below 1e12 are taken as seconds.
fn parse_time_ms(v: Option<&str>) -> Option<i64> {
    let n: i64 = v?.trim().parse().ok()?;
    if n < 1_000_000_000_000 {
        n.checked_mul(1000)
    } else {
        Some(n)
    }
}

/// Bar size in minutes, `0..=MAX_RESOLUTION_MINUTES`. "1D" (and friends)
/// map to whole days.
fn parse_resolution(v: Option<&str>) -> Option<i64> {
    let v = v?.trim();
    let minutes = match v.strip_suffix(|c: char| c == 'D' || c == 'd') {
        Some("") => 24 * 60,
        Some(days) => days.parse::<i64>().ok()?.checked_mul(24 * 60)?,
        None => v.parse().ok()?,
    };
    (0..=MAX_RESOLUTION_MINUTES).contains(&minutes).then_some(minutes)
}

/// Absent or blank is `Ok(None)`; present but unparseable is a 400.
fn optional_param<T>(
    v: Option<&str>,
    name: &str,
    parse: fn(Option<&str>) -> Option<T>,
) -> Result<Option<T>> {
    match v.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(s) => parse(Some(s))
            .map(Some)
            .ok_or_else(|| AppError::BadRequest(format!("invalid {name}: {s}"))),
    }
}

/// `None` without snapshots, else whether every key was written within two
/// poll intervals of `now_ms`.
fn is_healthy(last: &[LastSnapshot], now_ms: i64, poll_interval_minutes: u64) -> Option<bool> {
    if last.is_empty() {
        return None;
    }
    let stale_after_ms =
        i64::try_from(poll_interval_minutes.saturating_mul(2 * 60 * 1000)).unwrap_or(i64::MAX);
    Some(last.iter().all(|l| now_ms.saturating_sub(l.ts) < stale_after_ms))
}

/// `PM:SYMBOL:SOURCE:marketKey:YES|NO` → (key, is_yes).
fn parse_pm_symbol(ticker: &str) -> Option<(SnapshotKey, bool)> {
    let parts: Vec<&str> = ticker.split(':').collect();
    let [prefix, symbol, source, market_key, outcome] = parts.as_slice() else {
        return None;
    };
    if *prefix != "PM" || symbol.is_empty() || market_key.is_empty() {
        return None;
    }
    let source = Source::parse(source)?;
    let is_yes = match *outcome {
        "YES" => true,
        "NO" => false,
        _ => return None,
    };
    Some((SnapshotKey::new(symbol, source, market_key), is_yes))
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn get_health(State(state): State<ApiState>) -> Json<serde_json::Value> {
    let mut body = state.health.snapshot();
    body["ok"] = serde_json::Value::Bool(true);
    body["message"] = serde_json::Value::from("API is running");
    Json(body)
}

async fn run_snapshot(State(state): State<ApiState>) -> Response {
    match state.poller.run_now(Utc::now().timestamp_millis()).await {
        Ok(summary) => {
            let mut body = serde_json::to_value(&summary).unwrap_or_default();
            body["ok"] = serde_json::Value::Bool(true);
            Json(body).into_response()
        }
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "ok": false, "error": e.to_string() })),
        )
            .into_response(),
    }
}

async fn get_markets(
    State(state): State<ApiState>,
    Query(params): Query<SymbolQuery>,
) -> Result<Json<MarketsResponse>> {
    let symbol = params
        .symbol
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::BadRequest("missing symbol".to_string()))?;

    let config = state.markets().await?;
    let (polymarket, kalshi) = config.first_market_keys(&symbol);
    let markets = config
        .markets_for(&symbol)
        .into_iter()
        .map(|r| MarketOption {
            source: r.source,
            label: r.market_key.clone(),
            market_key: r.market_key,
        })
        .collect();

    Ok(Json(MarketsResponse {
        symbol,
        markets,
        defaults: DefaultMarkets { polymarket, kalshi },
    }))
}

/// Live odds for the first configured market of each provider.
async fn get_prediction(
    State(state): State<ApiState>,
    Query(params): Query<SymbolQuery>,
) -> Result<Json<PredictionResponse>> {
    let symbol = params
        .symbol
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::BadRequest("missing symbol".to_string()))?;

    let (polymarket_key, kalshi_key) = state.markets().await?.first_market_keys(&symbol);
    if polymarket_key.is_none() && kalshi_key.is_none() {
        return Err(AppError::NotFound(format!("no market for symbol: {symbol}")));
    }

    let now = Utc::now().timestamp_millis();
    let (polymarket, kalshi) = tokio::join!(
        state.live_odds(&symbol, Source::Polymarket, polymarket_key.as_deref(), now),
        state.live_odds(&symbol, Source::Kalshi, kalshi_key.as_deref(), now),
    );
    if polymarket.is_none() && kalshi.is_none() {
        return Err(AppError::Upstream(format!(
            "could not fetch prediction data for {symbol}"
        )));
    }

    Ok(Json(PredictionResponse {
        symbol,
        polymarket,
        kalshi,
    }))
}

async fn get_predictions_list(
    State(state): State<ApiState>,
    Query(params): Query<SearchQuery>,
) -> Result<Json<SearchResponse>> {
    let topic = params
        .topic
        .map(|t| t.trim().to_lowercase())
        .unwrap_or_else(|| "spx".to_string());
    let limit = params
        .limit
        .and_then(|l| l.trim().parse::<usize>().ok())
        .filter(|l| *l > 0)
        .unwrap_or(DEFAULT_SEARCH_LIMIT)
        .min(MAX_SEARCH_LIMIT);

    let markets = state
        .search
        .search(&topic, limit)
        .await?
        .ok_or_else(|| AppError::Upstream(format!("polymarket search failed for {topic}")))?;
    Ok(Json(SearchResponse { topic, markets }))
}

async fn get_series(
    State(state): State<ApiState>,
    Query(params): Query<SeriesQuery>,
) -> Result<Json<SeriesResponse>> {
    let key = parse_key(
        params.symbol.as_deref(),
        params.market_key.as_deref(),
        params.source.as_deref(),
    )?;
    let resolution =
        optional_param(params.resolution.as_deref(), "resolution", parse_resolution)?.unwrap_or(1);

    let now = Utc::now().timestamp_millis();
    let from_ms = optional_param(params.from.as_deref(), "from", parse_time_ms)?
        .unwrap_or(now - DEFAULT_SERIES_LOOKBACK_MS);
    let to_ms = optional_param(params.to.as_deref(), "to", parse_time_ms)?.unwrap_or(now);

    let markets = state.markets().await?;
    let bars = bars_query(state.store.as_ref(), &markets, &key, from_ms, to_ms, resolution).await?;

    Ok(Json(SeriesResponse {
        symbol: key.symbol,
        source: key.source,
        market_key: key.market_key,
        resolution,
        bars,
    }))
}

async fn get_derived(
    State(state): State<ApiState>,
    Query(params): Query<SeriesQuery>,
) -> Result<Json<DerivedResponse>> {
    let key = parse_key(
        params.symbol.as_deref(),
        params.market_key.as_deref(),
        params.source.as_deref(),
    )?;
    let markets = state.markets().await?;
    let stats = derived_query(
        state.store.as_ref(),
        &markets,
        &key,
        Utc::now().timestamp_millis(),
    )
    .await?;

    Ok(Json(DerivedResponse {
        symbol: key.symbol,
        source: key.source,
        market_key: key.market_key,
        stats,
    }))
}

async fn get_status(State(state): State<ApiState>) -> Result<Json<StatusResponse>> {
    let last = state.store.last_timestamps_per_key().await?;
    let healthy = is_healthy(&last, Utc::now().timestamp_millis(), state.poll_interval_minutes);

    Ok(Json(StatusResponse {
        ok: true,
        last_snapshots: last
            .into_iter()
            .map(|l| LastSnapshotResponse {
                ts: rfc3339(l.ts),
                symbol: l.key.symbol,
                source: l.key.source,
                market_key: l.key.market_key,
            })
            .collect(),
        healthy,
        poll_interval_minutes: state.poll_interval_minutes,
    }))
}

async fn get_udf_config() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "supported_resolutions": SUPPORTED_RESOLUTIONS,
        "supports_group_request": false,
        "supports_marks": false,
        "supports_search": false,
        "supports_timescale_marks": false,
    }))
}

async fn get_udf_symbols(
    State(state): State<ApiState>,
    Query(params): Query<SymbolQuery>,
) -> Result<Json<serde_json::Value>> {
    let ticker = params
        .symbol
        .ok_or_else(|| AppError::BadRequest("missing symbol".to_string()))?;
    let (key, is_yes) = parse_pm_symbol(&ticker).ok_or_else(|| {
        AppError::BadRequest("invalid PM symbol; use PM:SYMBOL:SOURCE:marketKey:YES|NO".to_string())
    })?;
    if !state.markets().await?.is_configured(&key.symbol, key.source, &key.market_key) {
        return Err(AppError::NotFound("market not configured".to_string()));
    }

    let name = format!(
        "PM {} {} {}",
        key.symbol,
        key.market_key,
        if is_yes { "YES" } else { "NO" }
    );
    Ok(Json(serde_json::json!({
        "name": name,
        "exchange": "Prediction",
        "full_name": ticker,
        "description": name,
        "type": "index",
        "session": "24x7",
        "timezone": "Etc/UTC",
        "ticker": ticker,
        "minmov": 1,
        "pricescale": 100,
        "has_intraday": true,
        "supported_resolutions": SUPPORTED_RESOLUTIONS,
        "volume_precision": 0,
        "data_status": "streaming",
    })))
}

fn no_data(status: StatusCode) -> Response {
    (status, Json(serde_json::json!({ "s": "no_data" }))).into_response()
}

async fn get_udf_history(
    State(state): State<ApiState>,
    Query(params): Query<UdfHistoryQuery>,
) -> Response {
    // whole seconds in, milliseconds out
    let secs = |v: Option<&str>| match v {
        None => Some(0),
        Some(s) => s.trim().parse::<i64>().ok()?.checked_mul(1000),
    };
    let (Some(ticker), Some(from), Some(to)) = (
        params.symbol.as_deref(),
        secs(params.from.as_deref()),
        secs(params.to.as_deref()),
    ) else {
        return AppError::BadRequest("missing symbol, from, or to".to_string()).into_response();
    };
    let Some((key, is_yes)) = parse_pm_symbol(ticker) else {
        return no_data(StatusCode::BAD_REQUEST);
    };
    let resolution = parse_resolution(params.resolution.as_deref())
        .filter(|r| *r > 0)
        .unwrap_or(1);

    let Ok(markets) = state.markets().await else {
        return no_data(StatusCode::OK);
    };
    let bars = match bars_query(
        state.store.as_ref(),
        &markets,
        &key,
        from,
        to,
        resolution,
    )
    .await
    {
        Ok(bars) => bars,
        Err(_) => return no_data(StatusCode::OK),
    };

    // every column carries the close, inverted for the NO side
    let closes: Vec<f64> = bars
        .iter()
        .map(|b| if is_yes { b.close } else { 100.0 - b.close })
        .collect();
    let times: Vec<i64> = bars.iter().map(|b| b.time).collect();
    Json(serde_json::json!({
        "s": "ok",
        "t": times,
        "o": closes,
        "h": closes,
        "l": closes,
        "c": closes,
    }))
    .into_response()
}

async fn get_stats_latency(State(state): State<ApiState>) -> Json<serde_json::Value> {
    let (p50, p95, p99) = match state.latency.percentiles_ms() {
        Some((p50, p95, p99)) => (Some(p50), Some(p95), Some(p99)),
        None => (None, None, None),
    };
    Json(serde_json::json!({
        "count": state.latency.len(),
        "p50_ms": p50,
        "p95_ms": p95,
        "p99_ms": p99,
    }))
}
