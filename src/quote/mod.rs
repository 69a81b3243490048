//! Quote Client (§4.A) — buy/sell route lookup against a swap
//! aggregator with endpoint racing, TTL cache, and a circuit breaker.

pub mod cache;
pub mod circuit_breaker;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::select_ok;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use cache::{CacheKey, Direction, QuoteCache};
use circuit_breaker::CircuitBreaker;

const CACHE_TTL: Duration = Duration::from_secs(30);
const CACHE_MAX_ENTRIES: usize = 2000;
const CIRCUIT_RESET: Duration = Duration::from_secs(60);
const STAGGER: Duration = Duration::from_millis(100);
const FANOUT_DEADLINE: Duration = Duration::from_secs(6);
const PRICE_IMPACT_REJECT_PCT: f64 = 50.0;
const MIN_ESTIMATED_LIQUIDITY_USD: f64 = 5.0;

/// Result of a buy or sell quote lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteResult {
    pub success: bool,
    pub has_route: bool,
    pub out_amount: Option<u64>,
    pub price_impact_pct: Option<f64>,
    pub route_label: Option<String>,
    pub pool_handle: Option<String>,
    pub estimated_liquidity: Option<f64>,
    pub error: Option<String>,
}

impl QuoteResult {
    fn no_route(error: impl Into<String>) -> Self {
        QuoteResult {
            success: false,
            has_route: false,
            out_amount: None,
            price_impact_pct: None,
            route_label: None,
            pool_handle: None,
            estimated_liquidity: None,
            error: Some(error.into()),
        }
    }
}

/// `routePlan[0].swapInfo` fields consumed from the aggregator response.
#[derive(Debug, Deserialize)]
struct SwapInfo {
    label: Option<String>,
    #[serde(rename = "ammKey")]
    amm_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RoutePlanEntry {
    #[serde(rename = "swapInfo")]
    swap_info: Option<SwapInfo>,
}

/// Aggregator quote response DTO (§6 external interfaces).
#[derive(Debug, Deserialize)]
struct AggregatorQuoteResponse {
    #[serde(rename = "outAmount")]
    out_amount: Option<String>,
    #[serde(rename = "priceImpactPct")]
    price_impact_pct: Option<String>,
    #[serde(rename = "routePlan")]
    route_plan: Option<Vec<RoutePlanEntry>>,
    error: Option<String>,
}

pub struct QuoteClient {
    http: reqwest::Client,
    endpoints: Vec<String>,
    cache: Mutex<QuoteCache>,
    breaker: CircuitBreaker,
}

impl QuoteClient {
    pub fn new(endpoints: Vec<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoints,
            cache: Mutex::new(QuoteCache::new(CACHE_TTL, CACHE_MAX_ENTRIES)),
            breaker: CircuitBreaker::new(CIRCUIT_RESET),
        }
    }

    pub async fn buy_quote(&self, mint: &str, amount_lamports: u64, slippage_bps: u16) -> QuoteResult {
        self.quote(Direction::Buy, "So11111111111111111111111111111111111111112", mint, amount_lamports, slippage_bps)
            .await
    }

    pub async fn sell_quote(&self, mint: &str, token_raw_amount: u64, slippage_bps: u16) -> QuoteResult {
        self.quote(Direction::Sell, mint, "So11111111111111111111111111111111111111112", token_raw_amount, slippage_bps)
            .await
    }

    async fn quote(
        &self,
        direction: Direction,
        input_mint: &str,
        output_mint: &str,
        amount: u64,
        slippage_bps: u16,
    ) -> QuoteResult {
        let key = CacheKey {
            direction,
            mint: if direction == Direction::Buy { output_mint.to_string() } else { input_mint.to_string() },
            amount,
        };

        if let Some(cached) = self.cache.lock().unwrap().get(&key) {
            debug!(mint = output_mint, "quote cache hit");
            return cached;
        }

        if !self.breaker.may_call() {
            warn!(remaining_ms = self.breaker.remaining_ms(), "quote circuit breaker open");
            return QuoteResult::no_route("circuit breaker open");
        }

        if self.endpoints.is_empty() {
            return QuoteResult::no_route("no aggregator endpoints configured");
        }

        let result = self.race_endpoints(input_mint, output_mint, amount, slippage_bps).await;
        self.cache.lock().unwrap().insert(key, result.clone());
        result
    }

    /// Endpoint racing (§4.A steps 3-7): 100ms staggered start, overall
    /// 6s deadline, first non-error response with `out_amount > 0` wins;
    /// the rest are cancelled by `select_ok` dropping their futures.
    ///
    /// `select_ok` only ever surfaces the *last*-settling future's error
    /// when every endpoint fails, so a 429 from one endpoint can be
    /// masked by a different failure settling afterward. `rate_limited`
    /// is a side channel every endpoint's future reports into directly,
    /// so the breaker trips whenever a 429 occurred anywhere in the
    /// fanout, independent of which error `select_ok` happens to return.
    async fn race_endpoints(
        &self,
        input_mint: &str,
        output_mint: &str,
        amount: u64,
        slippage_bps: u16,
    ) -> QuoteResult {
        let rate_limited = Arc::new(AtomicBool::new(false));

        let futures: Vec<_> = self
            .endpoints
            .iter()
            .enumerate()
            .map(|(i, endpoint)| {
                let delay = STAGGER * i as u32;
                let http = self.http.clone();
                let endpoint = endpoint.clone();
                let input_mint = input_mint.to_string();
                let output_mint = output_mint.to_string();
                let rate_limited = rate_limited.clone();
                Box::pin(async move {
                    tokio::time::sleep(delay).await;
                    let result =
                        fetch_one(&http, &endpoint, &input_mint, &output_mint, amount, slippage_bps).await;
                    if matches!(result, Err(FetchError::RateLimited)) {
                        rate_limited.store(true, Ordering::Release);
                    }
                    result
                })
            })
            .collect();

        let race = select_ok(futures);
        let outcome = tokio::time::timeout(FANOUT_DEADLINE, race).await;

        match outcome {
            Ok(Ok((mut result, _remaining))) => {
                if result.price_impact_pct.map(|p| p > PRICE_IMPACT_REJECT_PCT).unwrap_or(false) {
                    result.has_route = false;
                    result.error = Some("price impact exceeds 50%, treating pool as uninitialized".into());
                }
                result
            }
            Ok(Err(_)) => {
                if rate_limited.load(Ordering::Acquire) {
                    warn!("an aggregator endpoint was rate-limited during this fanout, tripping circuit breaker");
                    self.breaker.trip();
                    QuoteResult::no_route("rate limited by aggregator")
                } else {
                    QuoteResult::no_route("all aggregator endpoints failed")
                }
            }
            Err(_) => {
                if rate_limited.load(Ordering::Acquire) {
                    self.breaker.trip();
                }
                QuoteResult::no_route("aggregator fanout deadline exceeded")
            }
        }
    }

    /// Batch quotes in chunks of `concurrency`, allSettled-style:
    /// failures degrade to `{success:false, has_route:false}` (§4.A).
    pub async fn batch_buy_quotes(
        &self,
        mints: &[String],
        amount_lamports: u64,
        slippage_bps: u16,
        concurrency: usize,
    ) -> HashMap<String, QuoteResult> {
        let mut out = HashMap::new();
        for chunk in mints.chunks(concurrency.max(1)) {
            let futs = chunk.iter().map(|mint| self.buy_quote(mint, amount_lamports, slippage_bps));
            let results = futures::future::join_all(futs).await;
            for (mint, result) in chunk.iter().zip(results) {
                out.insert(mint.clone(), result);
            }
        }
        out
    }

    pub async fn batch_sell_quotes(
        &self,
        mints: &[String],
        token_raw_amount: u64,
        slippage_bps: u16,
        concurrency: usize,
    ) -> HashMap<String, QuoteResult> {
        let mut out = HashMap::new();
        for chunk in mints.chunks(concurrency.max(1)) {
            let futs = chunk.iter().map(|mint| self.sell_quote(mint, token_raw_amount, slippage_bps));
            let results = futures::future::join_all(futs).await;
            for (mint, result) in chunk.iter().zip(results) {
                out.insert(mint.clone(), result);
            }
        }
        out
    }
}

enum FetchError {
    RateLimited,
    Other,
}

impl std::fmt::Debug for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchError::RateLimited => write!(f, "rate limited"),
            FetchError::Other => write!(f, "request failed"),
        }
    }
}

async fn fetch_one(
    http: &reqwest::Client,
    endpoint: &str,
    input_mint: &str,
    output_mint: &str,
    amount: u64,
    slippage_bps: u16,
) -> std::result::Result<QuoteResult, FetchError> {
    let response = http
        .get(endpoint)
        .query(&[
            ("inputMint", input_mint),
            ("outputMint", output_mint),
            ("amount", &amount.to_string()),
            ("slippageBps", &slippage_bps.to_string()),
        ])
        .send()
        .await
        .map_err(|_| FetchError::Other)?;

    if response.status().as_u16() == 429 {
        return Err(FetchError::RateLimited);
    }
    if !response.status().is_success() {
        return Err(FetchError::Other);
    }

    let body: AggregatorQuoteResponse = response.json().await.map_err(|_| FetchError::Other)?;
    if let Some(err) = body.error {
        debug!(endpoint, error = %err, "aggregator returned an error payload");
        return Err(FetchError::Other);
    }

    let out_amount: u64 = body
        .out_amount
        .and_then(|s| s.parse().ok())
        .ok_or(FetchError::Other)?;
    if out_amount == 0 {
        return Err(FetchError::Other);
    }

    let price_impact_pct: Option<f64> = body.price_impact_pct.and_then(|s| s.parse().ok());
    let (route_label, pool_handle) = body
        .route_plan
        .and_then(|mut plan| plan.drain(..).next())
        .and_then(|entry| entry.swap_info)
        .map(|info| (info.label, info.amm_key))
        .unwrap_or((None, None));

    let estimated_liquidity = price_impact_pct.map(|impact| {
        let input_sol = amount as f64 / 1e9;
        if impact > 0.0 {
            (input_sol / (impact / 100.0)).max(MIN_ESTIMATED_LIQUIDITY_USD)
        } else {
            MIN_ESTIMATED_LIQUIDITY_USD
        }
    });

    Ok(QuoteResult {
        success: true,
        has_route: true,
        out_amount: Some(out_amount),
        price_impact_pct,
        route_label,
        pool_handle,
        estimated_liquidity,
        error: None,
    })
}

impl From<FetchError> for Error {
    fn from(e: FetchError) -> Self {
        match e {
            FetchError::RateLimited => Error::Quote("rate limited (429)".into()),
            FetchError::Other => Error::Quote("aggregator request failed".into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_result_no_route_sets_error() {
        let r = QuoteResult::no_route("test reason");
        assert!(!r.success);
        assert!(!r.has_route);
        assert_eq!(r.error.as_deref(), Some("test reason"));
    }

    #[tokio::test]
    async fn test_quote_with_no_endpoints_returns_no_route() {
        let client = QuoteClient::new(vec![]);
        let result = client.buy_quote("So11111111111111111111111111111111111111112", 1_000_000, 100).await;
        assert!(!result.has_route);
    }

    #[tokio::test]
    async fn test_batch_buy_quotes_degrades_on_failure() {
        let client = QuoteClient::new(vec![]);
        let mints = vec!["mintA".to_string(), "mintB".to_string()];
        let results = client.batch_buy_quotes(&mints, 1_000_000, 100, 5).await;
        assert_eq!(results.len(), 2);
        for (_, r) in results {
            assert!(!r.success);
        }
    }

    /// Binds a loopback listener that answers every connection with a
    /// fixed raw HTTP response, then returns its URL.
    async fn spawn_raw_responder(response: &'static str) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else { break };
                use tokio::io::{AsyncReadExt, AsyncWriteExt};
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });
        format!("http://{}/quote", addr)
    }

    /// Binds a loopback listener that accepts and immediately drops the
    /// connection without writing a response, forcing a non-429 transport
    /// failure on the client side.
    async fn spawn_reset_endpoint() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((socket, _)) = listener.accept().await else { break };
                drop(socket);
            }
        });
        format!("http://{}/quote", addr)
    }

    #[tokio::test]
    async fn test_race_trips_breaker_when_any_endpoint_is_rate_limited() {
        let rate_limited_endpoint =
            spawn_raw_responder("HTTP/1.1 429 Too Many Requests\r\ncontent-length: 0\r\n\r\n").await;
        let reset_endpoint = spawn_reset_endpoint().await;

        // The endpoint that settles last (reset_endpoint, second in the
        // list) fails with a non-429 error; without the shared flag the
        // breaker would never trip even though the first endpoint hit a
        // genuine 429.
        let client = QuoteClient::new(vec![rate_limited_endpoint, reset_endpoint]);
        let result = client.buy_quote("So11111111111111111111111111111111111111112", 1_000_000, 100).await;

        assert!(!result.has_route);
        assert!(!client.breaker.may_call(), "circuit breaker should trip on a 429 seen anywhere in the fanout");
    }
}
