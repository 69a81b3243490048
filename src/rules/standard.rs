//! Standard rules (§4.E.3). Failure subtracts a penalty and marks the
//! rule failed, but only a hard-block changes state.

use crate::candidate::Candidate;
use crate::rules::stats::{normalized_entropy, piecewise_linear_risk, RiskBreakpoint};
use crate::rules::types::{RuleId, RuleResult};

const DEFAULT_PENALTY: f64 = 15.0;

/// Known official mints, keyed by ticker, exempted from `SYMBOL_SPOOFING`.
pub const PROTECTED_TICKERS: &[(&str, &str)] = &[
    ("SOL", "So11111111111111111111111111111111111111112"),
    ("USDC", "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v"),
    ("USDT", "Es9vMFrzaCERmJfrF4H2FYD4KCoNkY11McCe8BenwNYB"),
    ("BTC", ""),
    ("ETH", ""),
    ("BNB", ""),
    ("XRP", ""),
    ("DOGE", ""),
    ("SHIB", ""),
    ("MATIC", ""),
    ("AVAX", ""),
    ("DOT", ""),
    ("LINK", ""),
    ("UNI", ""),
    ("WBTC", ""),
    ("WETH", ""),
    ("WSOL", ""),
    ("TRX", ""),
];

/// `SYMBOL_SPOOFING` — reject if `token_symbol` matches a protected
/// ticker and the address is not the known official mint.
pub fn symbol_spoofing(candidate: &Candidate) -> RuleResult {
    let symbol = candidate.token_symbol.to_uppercase();
    for (ticker, official_mint) in PROTECTED_TICKERS {
        if symbol == *ticker {
            if !official_mint.is_empty() && candidate.token_address == *official_mint {
                return RuleResult::pass(RuleId::SymbolSpoofing, format!("official {ticker} mint"));
            }
            return RuleResult::fail(
                RuleId::SymbolSpoofing,
                format!("token impersonates {ticker}"),
                50.0,
            );
        }
    }
    RuleResult::pass(RuleId::SymbolSpoofing, "symbol not protected")
}

/// `TIME_BUFFER` — pool must have existed for at least a minimum window
/// before the gate will consider it, guarding against instant-rug launches.
pub fn time_buffer(pool_age_seconds: Option<i64>, min_age_seconds: i64) -> RuleResult {
    let Some(age) = pool_age_seconds else {
        return RuleResult::skip(RuleId::TimeBuffer, "pool creation time unknown");
    };
    if age < min_age_seconds {
        RuleResult::fail(
            RuleId::TimeBuffer,
            format!("pool is only {age}s old, below {min_age_seconds}s buffer"),
            DEFAULT_PENALTY,
        )
    } else {
        RuleResult::pass(RuleId::TimeBuffer, format!("pool age {age}s"))
    }
}

/// `LIQUIDITY_REALITY` — declared liquidity must roughly agree with the
/// Quote Client's estimated liquidity derived from price impact.
pub fn liquidity_reality(
    declared_liquidity_usd: f64,
    estimated_liquidity_usd: Option<f64>,
    max_divergence_pct: f64,
) -> RuleResult {
    let Some(estimated) = estimated_liquidity_usd else {
        return RuleResult::skip(RuleId::LiquidityReality, "no quote-derived liquidity estimate");
    };
    if declared_liquidity_usd <= 0.0 {
        return RuleResult::fail(RuleId::LiquidityReality, "declared liquidity is zero", 30.0);
    }
    let divergence = ((declared_liquidity_usd - estimated).abs() / declared_liquidity_usd) * 100.0;
    if divergence > max_divergence_pct {
        RuleResult::fail(
            RuleId::LiquidityReality,
            format!(
                "declared liquidity ${declared_liquidity_usd:.0} diverges {divergence:.1}% from quoted ${estimated:.0}"
            ),
            DEFAULT_PENALTY,
        )
    } else {
        RuleResult::pass(
            RuleId::LiquidityReality,
            format!("liquidity estimate within {divergence:.1}% of declared"),
        )
    }
}

/// `EXECUTABLE_SELL` — requires a buy route within slippage tolerance,
/// plus the orchestrator's separate sell-quote probe must confirm a sell
/// path exists (one-way traps fail this).
pub fn executable_sell(candidate: &Candidate, sell_route_exists: bool) -> RuleResult {
    if !candidate.has_buy_route {
        return RuleResult::fail(RuleId::ExecutableSell, "no buy route available", 50.0);
    }
    if let (Some(slippage), Some(max)) = (candidate.buy_slippage, candidate.max_slippage) {
        if slippage > max {
            return RuleResult::fail(
                RuleId::ExecutableSell,
                format!("buy slippage {slippage:.4} exceeds max {max:.4}"),
                40.0,
            );
        }
    }
    if !sell_route_exists {
        return RuleResult::fail(
            RuleId::ExecutableSell,
            "no sell route found — possible one-way trap",
            60.0,
        );
    }
    RuleResult::pass(RuleId::ExecutableSell, "buy and sell routes confirmed")
}

/// `BUYER_POSITION` — if `target_buyer_positions` is non-empty and
/// `buyer_position` is not in the set, fail.
pub fn buyer_position(candidate: &Candidate) -> RuleResult {
    if candidate.target_buyer_positions.is_empty() {
        return RuleResult::pass(RuleId::BuyerPosition, "no buyer-position constraint configured");
    }
    let Some(pos) = candidate.buyer_position else {
        return RuleResult::skip(RuleId::BuyerPosition, "buyer position unknown");
    };
    if candidate.target_buyer_positions.contains(&pos) {
        RuleResult::pass(RuleId::BuyerPosition, format!("buyer position {pos} within target set"))
    } else {
        RuleResult::fail(
            RuleId::BuyerPosition,
            format!("buyer position {pos} outside target set"),
            DEFAULT_PENALTY,
        )
    }
}

/// `BUYER_CLUSTER` — flags a disproportionate share of early buys coming
/// from a small number of wallets, independent of the tier-gated
/// `WALLET_CLUSTER` sybil analysis.
pub fn buyer_cluster(candidate: &Candidate, max_top_buyer_share_pct: f64) -> RuleResult {
    if candidate.recent_buyers.is_empty() {
        return RuleResult::skip(RuleId::BuyerCluster, "no recent buyer data");
    }
    let total: f64 = candidate.recent_buyers.iter().map(|b| b.amount_sol).sum();
    if total <= 0.0 {
        return RuleResult::skip(RuleId::BuyerCluster, "recent buy volume is zero");
    }
    let max_buy = candidate
        .recent_buyers
        .iter()
        .map(|b| b.amount_sol)
        .fold(0.0_f64, f64::max);
    let share_pct = (max_buy / total) * 100.0;
    if share_pct > max_top_buyer_share_pct {
        RuleResult::fail(
            RuleId::BuyerCluster,
            format!("single buyer accounts for {share_pct:.1}% of early volume"),
            DEFAULT_PENALTY,
        )
    } else {
        RuleResult::pass(RuleId::BuyerCluster, format!("top buyer share {share_pct:.1}%"))
    }
}

/// `LP_OWNERSHIP_DISTRIBUTION` — LP tokens should not be concentrated
/// among very few holders, nor owned by the deployer.
pub fn lp_ownership_distribution(candidate: &Candidate, max_concentration_pct: f64) -> RuleResult {
    if candidate.lp_owner_is_deployer {
        return RuleResult::fail(
            RuleId::LpOwnershipDistribution,
            "deployer wallet owns LP tokens",
            35.0,
        );
    }
    let Some(concentration) = candidate.lp_holder_concentration else {
        return RuleResult::skip(RuleId::LpOwnershipDistribution, "LP holder concentration unknown");
    };
    if concentration > max_concentration_pct {
        RuleResult::fail(
            RuleId::LpOwnershipDistribution,
            format!("top LP holder controls {concentration:.1}%"),
            DEFAULT_PENALTY,
        )
    } else {
        RuleResult::pass(
            RuleId::LpOwnershipDistribution,
            format!("LP holder concentration {concentration:.1}%"),
        )
    }
}

/// `PRICE_SANITY` — price must not have swung implausibly since the
/// last observation (guards against bad feed data poisoning other rules).
pub fn price_sanity(candidate: &Candidate, max_swing_pct: f64) -> RuleResult {
    let (Some(prev), Some(curr)) = (candidate.previous_price_usd, candidate.price_usd) else {
        return RuleResult::skip(RuleId::PriceSanity, "insufficient price history");
    };
    if prev <= 0.0 || curr <= 0.0 {
        return RuleResult::fail(RuleId::PriceSanity, "non-positive price observed", 30.0);
    }
    let swing_pct = ((curr - prev).abs() / prev) * 100.0;
    if swing_pct > max_swing_pct {
        RuleResult::fail(
            RuleId::PriceSanity,
            format!("price moved {swing_pct:.1}% since last sample"),
            DEFAULT_PENALTY,
        )
    } else {
        RuleResult::pass(RuleId::PriceSanity, format!("price swing {swing_pct:.1}%"))
    }
}

/// Deployer reputation summary distinct from the hard-block-only rug
/// history consulted by `structural::deployer_behavior`.
#[derive(Debug, Clone, Default)]
pub struct DeployerReputation {
    pub score_0_to_100: f64,
}

/// `DEPLOYER_REPUTATION` — softer signal than `DEPLOYER_BEHAVIOR`: a low
/// reputation score costs points without forcing a block.
pub fn deployer_reputation(reputation: Option<&DeployerReputation>, min_score: f64) -> RuleResult {
    let Some(reputation) = reputation else {
        return RuleResult::skip(RuleId::DeployerReputation, "no deployer reputation data");
    };
    if reputation.score_0_to_100 < min_score {
        RuleResult::fail(
            RuleId::DeployerReputation,
            format!("deployer reputation {:.0} below {min_score:.0}", reputation.score_0_to_100),
            DEFAULT_PENALTY,
        )
    } else {
        RuleResult::pass(
            RuleId::DeployerReputation,
            format!("deployer reputation {:.0}", reputation.score_0_to_100),
        )
    }
}

/// `HIDDEN_SELL_TAX` — compares the round-trip loss of a buy followed
/// immediately by a sell quote against the declared slippage tolerance;
/// a gap beyond tolerance indicates an undisclosed transfer tax.
pub fn hidden_sell_tax(
    buy_out_amount: Option<u64>,
    sell_in_amount: Option<u64>,
    sell_out_amount: Option<u64>,
    max_acceptable_tax_pct: f64,
) -> RuleResult {
    let (Some(buy_out), Some(sell_in), Some(sell_out)) = (buy_out_amount, sell_in_amount, sell_out_amount)
    else {
        return RuleResult::skip(RuleId::HiddenSellTax, "insufficient round-trip quote data");
    };
    if buy_out == 0 || sell_in == 0 {
        return RuleResult::skip(RuleId::HiddenSellTax, "zero-amount round-trip quote");
    }
    let expected_sell_out = sell_out as f64; // aggregator already nets routing fees
    let tax_pct = (1.0 - expected_sell_out / sell_in as f64).max(0.0) * 100.0;
    if tax_pct > max_acceptable_tax_pct {
        RuleResult::fail(
            RuleId::HiddenSellTax,
            format!("implied sell tax {tax_pct:.1}% exceeds {max_acceptable_tax_pct:.1}%"),
            45.0,
        )
    } else {
        RuleResult::pass(RuleId::HiddenSellTax, format!("implied sell tax {tax_pct:.1}%"))
    }
}

/// Inputs to the `RUG_PROBABILITY` weighted blend (§4.E).
#[derive(Debug, Clone, Default)]
pub struct RugInputs {
    pub liquidity_to_fdv: Option<f64>,
    pub holder_percentages: Vec<f64>,
    pub deployer_reputation_0_to_100: Option<f64>,
    pub funding_diversity_0_to_100: Option<f64>,
    pub buyer_symmetry_0_to_100: Option<f64>,
}

/// `RUG_PROBABILITY` — weighted blend of five sub-scores mapped through
/// piecewise-linear risk curves. `<40` SAFE, `40-54` OBSERVE, `55-69`
/// REDUCED, `>=70` hard block.
pub fn rug_probability(inputs: &RugInputs) -> RuleResult {
    let liquidity_fdv_curve = [
        RiskBreakpoint { metric: 0.10, risk: 0.0 },
        RiskBreakpoint { metric: 0.03, risk: 50.0 },
        RiskBreakpoint { metric: 0.01, risk: 100.0 },
    ];

    let liquidity_risk = inputs
        .liquidity_to_fdv
        .map(|ratio| piecewise_linear_risk(ratio, &liquidity_fdv_curve));

    let entropy_risk = if inputs.holder_percentages.len() > 1 {
        Some((1.0 - normalized_entropy(&inputs.holder_percentages)) * 100.0)
    } else {
        None
    };

    let deployer_risk = inputs.deployer_reputation_0_to_100.map(|s| 100.0 - s);
    let funding_risk = inputs.funding_diversity_0_to_100.map(|s| 100.0 - s);
    let symmetry_risk = inputs.buyer_symmetry_0_to_100.map(|s| 100.0 - s);

    let weighted = [
        (liquidity_risk, 0.25),
        (entropy_risk, 0.20),
        (deployer_risk, 0.25),
        (funding_risk, 0.15),
        (symmetry_risk, 0.15),
    ];

    let available: Vec<(f64, f64)> = weighted.iter().filter_map(|(v, w)| v.map(|v| (v, *w))).collect();
    if available.is_empty() {
        return RuleResult::skip(RuleId::RugProbability, "no sub-scores available");
    }

    let total_weight: f64 = available.iter().map(|(_, w)| w).sum();
    let score: f64 = available.iter().map(|(v, w)| v * w).sum::<f64>() / total_weight;

    let result = if score >= 70.0 {
        RuleResult::hard_block(RuleId::RugProbability, format!("rug probability {score:.1} (hard block)"))
    } else if score >= 55.0 {
        RuleResult::fail(RuleId::RugProbability, format!("rug probability {score:.1} (reduced)"), 35.0)
    } else if score >= 40.0 {
        RuleResult::fail(RuleId::RugProbability, format!("rug probability {score:.1} (observe)"), 15.0)
    } else {
        RuleResult::pass(RuleId::RugProbability, format!("rug probability {score:.1} (safe)"))
    };
    result.with_details(serde_json::json!({ "rug_probability": score }))
}

/// `LIQUIDITY_STABILITY` — consumes a monitor-session evaluation (§4.D).
pub fn liquidity_stability(
    evaluated: Option<&crate::monitor::EvaluationResult>,
) -> RuleResult {
    let Some(eval) = evaluated else {
        return RuleResult::skip(RuleId::LiquidityStability, "no monitor session evaluation available");
    };
    if !eval.stable {
        let penalty = if eval.liquidity_drop_percent > 50.0 { 40.0 } else { 25.0 };
        RuleResult::fail(
            RuleId::LiquidityStability,
            format!(
                "liquidity unstable: {:.1}% drop, dominant buyer {:.1}%",
                eval.liquidity_drop_percent, eval.dominant_buyer_percent
            ),
            penalty,
        )
    } else {
        RuleResult::pass(RuleId::LiquidityStability, "liquidity stable")
    }
}

/// `QUOTE_DEPTH` — buy quote at `buy_amount_sol`, checks price impact.
/// Skipped when liquidity is ample.
pub fn quote_depth(
    liquidity_usd: f64,
    high_liquidity_threshold: f64,
    price_impact_pct: Option<f64>,
    max_slippage_pct: f64,
) -> RuleResult {
    if liquidity_usd >= high_liquidity_threshold {
        return RuleResult::skip(RuleId::QuoteDepth, "high-liquidity fast path");
    }
    let Some(impact) = price_impact_pct else {
        return RuleResult::skip(RuleId::QuoteDepth, "no buy quote available");
    };
    if impact > max_slippage_pct {
        RuleResult::fail(
            RuleId::QuoteDepth,
            format!("price impact {impact:.2}% exceeds tolerance {max_slippage_pct:.2}%"),
            DEFAULT_PENALTY,
        )
    } else {
        RuleResult::pass(RuleId::QuoteDepth, format!("price impact {impact:.2}%"))
    }
}

/// `VOLUME_AUTHENTICITY` — flags 24h volume wildly inconsistent with
/// liquidity, a wash-trading tell.
pub fn volume_authenticity(
    volume_24h_usd: Option<f64>,
    liquidity_usd: f64,
    max_volume_to_liquidity_ratio: f64,
) -> RuleResult {
    let Some(volume) = volume_24h_usd else {
        return RuleResult::skip(RuleId::VolumeAuthenticity, "no 24h volume data");
    };
    if liquidity_usd <= 0.0 {
        return RuleResult::skip(RuleId::VolumeAuthenticity, "liquidity unknown, cannot ratio");
    }
    let ratio = volume / liquidity_usd;
    if ratio > max_volume_to_liquidity_ratio {
        RuleResult::fail(
            RuleId::VolumeAuthenticity,
            format!("volume/liquidity ratio {ratio:.1}x exceeds {max_volume_to_liquidity_ratio:.1}x"),
            20.0,
        )
    } else {
        RuleResult::pass(RuleId::VolumeAuthenticity, format!("volume/liquidity ratio {ratio:.1}x"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate::{Candidate, ExecutionMode, RecentBuy};
    use chrono::Utc;

    fn base() -> Candidate {
        Candidate {
            token_address: "SomeRandomMint11111111111111111111111111112".into(),
            token_symbol: "TEST".into(),
            token_name: "Test".into(),
            liquidity_usd: 10_000.0,
            execution_mode: ExecutionMode::Auto,
            pool_created_at: None,
            has_buy_route: true,
            buy_slippage: Some(0.01),
            is_pumpfun: false,
            source_tag: None,
            holder_count: None,
            top_holders: vec![],
            holder_data: vec![],
            deployer_wallet: None,
            lp_creator_wallet: None,
            buyer_wallets: vec![],
            recent_buyers: vec![],
            buyer_timestamps: vec![],
            price_usd: Some(1.0),
            previous_price_usd: Some(1.0),
            fdv_usd: None,
            market_cap_usd: None,
            buy_amount_sol: None,
            max_slippage: Some(0.02),
            sol_price_usd: None,
            lp_mint_address: None,
            lp_holder_concentration: None,
            lp_owner_is_deployer: false,
            lp_recently_minted: false,
            lp_recently_transferred: false,
            liquidity_age_seconds: None,
            validation_toggles: Default::default(),
            tier_features: Default::default(),
            target_buyer_positions: vec![],
            buyer_position: None,
        }
    }

    #[test]
    fn test_symbol_spoofing_blocks_fake_usdc() {
        let mut c = base();
        c.token_symbol = "USDC".into();
        let r = symbol_spoofing(&c);
        assert!(!r.passed && !r.hard_block);
        assert!(r.reason.contains("impersonates USDC"));
    }

    #[test]
    fn test_symbol_spoofing_passes_official_usdc() {
        let mut c = base();
        c.token_symbol = "USDC".into();
        c.token_address = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v".into();
        assert!(symbol_spoofing(&c).passed);
    }

    #[test]
    fn test_executable_sell_fails_without_sell_route() {
        let c = base();
        let r = executable_sell(&c, false);
        assert!(!r.passed);
        assert!(r.reason.contains("one-way trap"));
    }

    #[test]
    fn test_executable_sell_passes_both_routes() {
        let c = base();
        assert!(executable_sell(&c, true).passed);
    }

    #[test]
    fn test_buyer_position_fails_outside_target() {
        let mut c = base();
        c.target_buyer_positions = vec![3, 4, 5];
        c.buyer_position = Some(20);
        assert!(!buyer_position(&c).passed);
    }

    #[test]
    fn test_buyer_position_passes_in_target() {
        let mut c = base();
        c.target_buyer_positions = vec![3, 4, 5];
        c.buyer_position = Some(4);
        assert!(buyer_position(&c).passed);
    }

    #[test]
    fn test_buyer_cluster_flags_dominant_buyer() {
        let mut c = base();
        c.recent_buyers = vec![
            RecentBuy { address: "a".into(), amount_sol: 90.0, timestamp: Utc::now() },
            RecentBuy { address: "b".into(), amount_sol: 10.0, timestamp: Utc::now() },
        ];
        assert!(!buyer_cluster(&c, 50.0).passed);
    }

    #[test]
    fn test_rug_probability_hard_blocks_high_score() {
        let inputs = RugInputs {
            liquidity_to_fdv: Some(0.005),
            holder_percentages: vec![90.0, 10.0],
            deployer_reputation_0_to_100: Some(5.0),
            funding_diversity_0_to_100: Some(5.0),
            buyer_symmetry_0_to_100: Some(5.0),
        };
        assert!(rug_probability(&inputs).hard_block);
    }

    #[test]
    fn test_rug_probability_passes_healthy_inputs() {
        let inputs = RugInputs {
            liquidity_to_fdv: Some(0.2),
            holder_percentages: vec![10.0, 10.0, 10.0, 10.0, 10.0, 10.0, 10.0, 10.0, 10.0, 10.0],
            deployer_reputation_0_to_100: Some(90.0),
            funding_diversity_0_to_100: Some(90.0),
            buyer_symmetry_0_to_100: Some(90.0),
        };
        assert!(rug_probability(&inputs).passed);
    }

    #[test]
    fn test_quote_depth_skips_on_high_liquidity() {
        let r = quote_depth(100_000.0, 50_000.0, Some(80.0), 5.0);
        assert!(r.skipped);
    }

    #[test]
    fn test_quote_depth_fails_high_impact() {
        let r = quote_depth(1_000.0, 50_000.0, Some(10.0), 5.0);
        assert!(!r.passed);
    }

    #[test]
    fn test_volume_authenticity_flags_wash_trading() {
        let r = volume_authenticity(Some(1_000_000.0), 1_000.0, 20.0);
        assert!(!r.passed);
    }
}
