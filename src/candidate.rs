//! Candidate — the immutable input to the Gate Orchestrator.
//!
//! A Candidate is value-copied into the orchestrator for one evaluation;
//! nothing in the gate mutates it. See `rules::RuleBoard` for where
//! per-rule intermediate results live instead.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Execution mode requested for a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    Auto,
    Manual,
}

impl ExecutionMode {
    /// Minimum risk score required for `EXECUTABLE` in this mode.
    pub fn min_score(&self) -> f64 {
        match self {
            ExecutionMode::Auto => 65.0,
            ExecutionMode::Manual => 55.0,
        }
    }
}

/// Subscription-tier feature flags the gate consumes (§1, §4.E).
///
/// This crate never computes these — they arrive with the candidate,
/// sourced from an external subscription-tier collaborator.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TierFeatures {
    pub advanced_clustering: bool,
    pub capital_preservation: bool,
}

/// A (wallet address, percentage) pair, used for top-holder and LP
/// concentration inputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HolderShare {
    pub address: String,
    pub percent: f64,
}

/// A recent buy observed for a token, used by buyer-cluster/entropy rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecentBuy {
    pub address: String,
    pub amount_sol: f64,
    pub timestamp: DateTime<Utc>,
}

/// Timing + funding-source metadata for a buyer wallet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuyerTimestamp {
    pub address: String,
    pub timestamp: DateTime<Utc>,
    pub funder: Option<String>,
}

/// Immutable input to one gate evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    // --- required ---
    pub token_address: String,
    pub token_symbol: String,
    pub token_name: String,
    pub liquidity_usd: f64,
    pub execution_mode: ExecutionMode,

    // --- tradability ---
    #[serde(default)]
    pub pool_created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub has_buy_route: bool,
    #[serde(default)]
    pub buy_slippage: Option<f64>,
    #[serde(default)]
    pub is_pumpfun: bool,
    #[serde(default)]
    pub source_tag: Option<String>,

    // --- holders ---
    #[serde(default)]
    pub holder_count: Option<u64>,
    #[serde(default)]
    pub top_holders: Vec<HolderShare>,
    #[serde(default)]
    pub holder_data: Vec<HolderShare>,

    // --- wallets ---
    #[serde(default)]
    pub deployer_wallet: Option<String>,
    #[serde(default)]
    pub lp_creator_wallet: Option<String>,
    #[serde(default)]
    pub buyer_wallets: Vec<String>,
    #[serde(default)]
    pub recent_buyers: Vec<RecentBuy>,
    #[serde(default)]
    pub buyer_timestamps: Vec<BuyerTimestamp>,

    // --- market ---
    #[serde(default)]
    pub price_usd: Option<f64>,
    #[serde(default)]
    pub previous_price_usd: Option<f64>,
    #[serde(default)]
    pub fdv_usd: Option<f64>,
    #[serde(default)]
    pub market_cap_usd: Option<f64>,
    #[serde(default)]
    pub buy_amount_sol: Option<f64>,
    #[serde(default)]
    pub max_slippage: Option<f64>,
    #[serde(default)]
    pub sol_price_usd: Option<f64>,

    // --- LP shape ---
    #[serde(default)]
    pub lp_mint_address: Option<String>,
    #[serde(default)]
    pub lp_holder_concentration: Option<f64>,
    #[serde(default)]
    pub lp_owner_is_deployer: bool,
    #[serde(default)]
    pub lp_recently_minted: bool,
    #[serde(default)]
    pub lp_recently_transferred: bool,
    #[serde(default)]
    pub liquidity_age_seconds: Option<u64>,

    // --- controls ---
    #[serde(default)]
    pub validation_toggles: HashMap<String, bool>,
    #[serde(default)]
    pub tier_features: TierFeatures,

    /// Optional explicit set of acceptable buyer positions (e.g. "be buyer #3-10").
    #[serde(default)]
    pub target_buyer_positions: Vec<u32>,
    /// This candidate's own position in the buy order, if known.
    #[serde(default)]
    pub buyer_position: Option<u32>,
}

impl Candidate {
    /// Validate the invariants listed in spec §3. Returns a human-readable
    /// reason on violation; never panics.
    pub fn validate(&self) -> Result<()> {
        if self.liquidity_usd < 0.0 {
            return Err(Error::InvalidCandidate(
                "liquidity_usd must be >= 0".into(),
            ));
        }

        let mut sum = 0.0;
        for h in &self.top_holders {
            if !(0.0..=100.0).contains(&h.percent) {
                return Err(Error::InvalidCandidate(format!(
                    "top_holders percent out of [0,100] for {}",
                    h.address
                )));
            }
            sum += h.percent;
        }
        // allow a small epsilon over 100 for rounding noise upstream
        if sum > 100.0 + 1e-6 {
            return Err(Error::InvalidCandidate(format!(
                "top_holders percentages sum to {:.4}, exceeds 100",
                sum
            )));
        }

        for addr in self.address_fields() {
            if !is_base58_pubkey(addr) {
                return Err(Error::InvalidCandidate(format!(
                    "address field is not a valid base58 pubkey: {}",
                    addr
                )));
            }
        }

        Ok(())
    }

    fn address_fields(&self) -> Vec<&str> {
        let mut out = vec![self.token_address.as_str()];
        if let Some(a) = &self.deployer_wallet {
            out.push(a);
        }
        if let Some(a) = &self.lp_creator_wallet {
            out.push(a);
        }
        if let Some(a) = &self.lp_mint_address {
            out.push(a);
        }
        out
    }

    /// Read a validation toggle, defaulting to enabled when absent.
    pub fn rule_enabled(&self, rule_id: &str) -> bool {
        self.validation_toggles.get(rule_id).copied().unwrap_or(true)
    }
}

/// Base58, 32-byte decoded length — the shape of a Solana pubkey.
/// Validates structure only, not on-chain existence.
pub fn is_base58_pubkey(s: &str) -> bool {
    match bs58::decode(s).into_vec() {
        Ok(bytes) => bytes.len() == 32,
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_pubkey() -> String {
        "So11111111111111111111111111111111111111112".to_string()
    }

    fn base_candidate() -> Candidate {
        Candidate {
            token_address: valid_pubkey(),
            token_symbol: "TEST".into(),
            token_name: "Test Token".into(),
            liquidity_usd: 10_000.0,
            execution_mode: ExecutionMode::Auto,
            pool_created_at: None,
            has_buy_route: true,
            buy_slippage: Some(0.01),
            is_pumpfun: true,
            source_tag: None,
            holder_count: Some(100),
            top_holders: vec![],
            holder_data: vec![],
            deployer_wallet: None,
            lp_creator_wallet: None,
            buyer_wallets: vec![],
            recent_buyers: vec![],
            buyer_timestamps: vec![],
            price_usd: Some(0.001),
            previous_price_usd: Some(0.0009),
            fdv_usd: Some(100_000.0),
            market_cap_usd: Some(100_000.0),
            buy_amount_sol: Some(0.1),
            max_slippage: Some(0.2),
            sol_price_usd: Some(150.0),
            lp_mint_address: None,
            lp_holder_concentration: None,
            lp_owner_is_deployer: false,
            lp_recently_minted: false,
            lp_recently_transferred: false,
            liquidity_age_seconds: Some(120),
            validation_toggles: HashMap::new(),
            tier_features: TierFeatures::default(),
            target_buyer_positions: vec![],
            buyer_position: None,
        }
    }

    #[test]
    fn test_valid_candidate_passes() {
        assert!(base_candidate().validate().is_ok());
    }

    #[test]
    fn test_negative_liquidity_rejected() {
        let mut c = base_candidate();
        c.liquidity_usd = -1.0;
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_holder_percent_out_of_range_rejected() {
        let mut c = base_candidate();
        c.top_holders.push(HolderShare {
            address: "x".into(),
            percent: 150.0,
        });
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_holder_sum_over_100_rejected() {
        let mut c = base_candidate();
        c.top_holders.push(HolderShare {
            address: "a".into(),
            percent: 60.0,
        });
        c.top_holders.push(HolderShare {
            address: "b".into(),
            percent: 60.0,
        });
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_invalid_address_rejected() {
        let mut c = base_candidate();
        c.token_address = "not-a-pubkey".into();
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_rule_toggle_default_enabled() {
        let c = base_candidate();
        assert!(c.rule_enabled("SYMBOL_SPOOFING"));
    }

    #[test]
    fn test_rule_toggle_explicit_disable() {
        let mut c = base_candidate();
        c.validation_toggles.insert("SYMBOL_SPOOFING".into(), false);
        assert!(!c.rule_enabled("SYMBOL_SPOOFING"));
    }
}
