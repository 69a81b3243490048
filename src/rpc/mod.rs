//! RPC Client (§4.B) — parallel token-supply / slot queries against N
//! configured RPC endpoints in priority order; pool-account fetch +
//! decode.

pub mod pool;

use std::str::FromStr;
use std::time::Duration;

use solana_client::nonblocking::rpc_client::RpcClient as SolanaRpcClient;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::transaction::Transaction;
use tracing::{debug, warn};

use crate::error::{Error, Result};

const PER_ENDPOINT_TIMEOUT: Duration = Duration::from_secs(6);

#[derive(Debug, Clone, Copy)]
pub struct TokenSupply {
    pub supply: u64,
    pub slot: u64,
}

#[derive(Debug, Clone)]
pub struct SimulationOutcome {
    pub err: Option<String>,
}

/// RPC endpoints are tried in the priority order they were configured;
/// the first endpoint to answer within its own timeout wins. Endpoints
/// past the first are fallbacks, not a race — matching the teacher's
/// "priority order" framing from §4.B, distinct from the Quote Client's
/// genuine any-of race (§4.A).
pub struct RpcClient {
    endpoints: Vec<SolanaRpcClient>,
}

impl RpcClient {
    pub fn new(urls: Vec<String>) -> Self {
        let endpoints = urls
            .into_iter()
            .map(|url| SolanaRpcClient::new_with_timeout(url, PER_ENDPOINT_TIMEOUT))
            .collect();
        Self { endpoints }
    }

    fn require_endpoints(&self) -> Result<()> {
        if self.endpoints.is_empty() {
            Err(Error::NoRpcEndpoints)
        } else {
            Ok(())
        }
    }

    pub async fn get_token_supply(&self, mint: &Pubkey) -> Result<TokenSupply> {
        self.require_endpoints()?;
        let mut last_err = None;
        for (i, endpoint) in self.endpoints.iter().enumerate() {
            match endpoint.get_token_supply(mint).await {
                Ok(resp) => {
                    let supply: u64 = resp.amount.parse().map_err(|_| Error::Rpc("unparseable supply".into()))?;
                    let slot = endpoint.get_slot().await.unwrap_or(0);
                    return Ok(TokenSupply { supply, slot });
                }
                Err(e) => {
                    warn!(endpoint_index = i, error = %e, "get_token_supply failed, trying next endpoint");
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.map(Error::from).unwrap_or_else(|| Error::Rpc("all endpoints exhausted".into())))
    }

    pub async fn get_account(&self, pubkey: &Pubkey) -> Result<Vec<u8>> {
        self.require_endpoints()?;
        let mut last_err = None;
        for (i, endpoint) in self.endpoints.iter().enumerate() {
            match endpoint.get_account_data(pubkey).await {
                Ok(data) => return Ok(data),
                Err(e) => {
                    debug!(endpoint_index = i, error = %e, "get_account failed, trying next endpoint");
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.map(Error::from).unwrap_or_else(|| Error::Rpc("all endpoints exhausted".into())))
    }

    pub async fn get_account_owner(&self, pubkey: &Pubkey) -> Result<Pubkey> {
        self.require_endpoints()?;
        let mut last_err = None;
        for endpoint in &self.endpoints {
            match endpoint.get_account(pubkey).await {
                Ok(account) => return Ok(account.owner),
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err.map(Error::from).unwrap_or_else(|| Error::Rpc("all endpoints exhausted".into())))
    }

    pub async fn get_slot(&self) -> Result<u64> {
        self.require_endpoints()?;
        let mut last_err = None;
        for endpoint in &self.endpoints {
            match endpoint.get_slot().await {
                Ok(slot) => return Ok(slot),
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err.map(Error::from).unwrap_or_else(|| Error::Rpc("all endpoints exhausted".into())))
    }

    pub async fn get_block_time(&self, slot: u64) -> Result<Option<i64>> {
        self.require_endpoints()?;
        for endpoint in &self.endpoints {
            if let Ok(ts) = endpoint.get_block_time(slot).await {
                return Ok(Some(ts));
            }
        }
        Ok(None)
    }

    pub async fn simulate_tx(&self, tx: &Transaction) -> Result<SimulationOutcome> {
        self.require_endpoints()?;
        let endpoint = self.endpoints.first().ok_or(Error::NoRpcEndpoints)?;
        match endpoint.simulate_transaction(tx).await {
            Ok(response) => Ok(SimulationOutcome {
                err: response.value.err.map(|e| e.to_string()),
            }),
            Err(e) => Err(Error::from(e)),
        }
    }

    /// Fetch + decode a Raydium AMM V4 pool account in one call,
    /// checking the owning program id first (§4.B).
    pub async fn get_raydium_pool(&self, pool_address: &Pubkey) -> Result<pool::RaydiumPool> {
        let owner = self.get_account_owner(pool_address).await?;
        pool::check_owner(&owner)?;
        let data = self.get_account(pool_address).await?;
        pool::decode(&data)
    }

    pub fn endpoint_count(&self) -> usize {
        self.endpoints.len()
    }
}

/// Map a simulation error string to the tri-state the tradability probe
/// expects (§4.C strict on-chain mode).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapSimulationVerdict {
    NotReady,
    SimOk,
    Failed,
}

pub fn classify_simulation_error(err: &Option<String>) -> SwapSimulationVerdict {
    let Some(err) = err else {
        return SwapSimulationVerdict::SimOk;
    };
    if err.contains("NotOpenTimeYet") || err.contains("InvalidPoolState") || err.contains("InsufficientFunds") && !err.contains("InsufficientFundsForFee") {
        SwapSimulationVerdict::NotReady
    } else if err.contains("InsufficientFundsForFee") {
        SwapSimulationVerdict::SimOk
    } else {
        SwapSimulationVerdict::Failed
    }
}

pub fn parse_pubkey(s: &str) -> Result<Pubkey> {
    Pubkey::from_str(s).map_err(|e| Error::InvalidPubkey(format!("{s}: {e}")))
}
