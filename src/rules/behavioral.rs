//! Behavioral penalty rules (§4.E.2). Failure subtracts a penalty and is
//! never itself blocking — except `WALLET_CLUSTER` and `LIQUIDITY_AGING`,
//! which may additionally set `hard_block` for a confirmed sybil ring or
//! dangerously young liquidity.

use crate::candidate::Candidate;
use crate::rules::stats::normalized_entropy;
use crate::rules::types::{RuleId, RuleResult};

const DEFAULT_BEHAVIORAL_PENALTY: f64 = 15.0;

/// `HOLDER_ENTROPY` — Shannon entropy over holder percentages, scaled to
/// a 0-100 risk. Single-holder >50% or top-10 >85% are independent hard
/// triggers within this rule only.
pub fn holder_entropy(
    candidate: &Candidate,
    single_holder_block_pct: f64,
    top10_block_pct: f64,
) -> RuleResult {
    let shares: Vec<f64> = candidate.top_holders.iter().map(|h| h.percent).collect();
    if shares.is_empty() {
        return RuleResult::skip(RuleId::HolderEntropy, "no holder distribution data");
    }

    if let Some(max) = shares.iter().cloned().fold(None, |acc: Option<f64>, x| {
        Some(acc.map_or(x, |a| a.max(x)))
    }) {
        if max > single_holder_block_pct {
            return RuleResult::fail(
                RuleId::HolderEntropy,
                format!("single holder controls {:.1}%", max),
                40.0,
            );
        }
    }

    let mut sorted = shares.clone();
    sorted.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
    let top10: f64 = sorted.iter().take(10).sum();
    if top10 > top10_block_pct {
        return RuleResult::fail(
            RuleId::HolderEntropy,
            format!("top-10 holders control {:.1}%", top10),
            35.0,
        );
    }

    let normalized = normalized_entropy(&shares);
    let risk = (1.0 - normalized) * 100.0;
    if risk > 50.0 {
        RuleResult::fail(
            RuleId::HolderEntropy,
            format!("concentrated holder distribution (risk {:.1})", risk),
            DEFAULT_BEHAVIORAL_PENALTY,
        )
    } else {
        RuleResult::pass(
            RuleId::HolderEntropy,
            format!("holder distribution acceptable (risk {:.1})", risk),
        )
    }
}

/// Result of wallet-cluster analysis, produced by a collaborator that
/// groups buyers by shared funding ancestry (§3 wallet-funding record).
#[derive(Debug, Clone, Default)]
pub struct ClusterAnalysis {
    pub largest_cluster_fraction: f64,
    pub confirmed_sybil_ring: bool,
}

/// `WALLET_CLUSTER` — behavioral penalty unless advanced clustering
/// confirms a sybil ring, in which case it hard-blocks.
pub fn wallet_cluster(
    candidate: &Candidate,
    analysis: Option<&ClusterAnalysis>,
    cluster_block_fraction: f64,
) -> RuleResult {
    if !candidate.tier_features.advanced_clustering {
        return RuleResult::skip(RuleId::WalletCluster, "advanced clustering tier disabled");
    }
    let Some(analysis) = analysis else {
        return RuleResult::skip(RuleId::WalletCluster, "no cluster analysis available");
    };

    if analysis.confirmed_sybil_ring {
        return RuleResult::hard_block(
            RuleId::WalletCluster,
            "confirmed sybil ring among early buyers",
        );
    }
    if analysis.largest_cluster_fraction > cluster_block_fraction {
        return RuleResult::fail(
            RuleId::WalletCluster,
            format!(
                "largest wallet cluster controls {:.1}% of buyers",
                analysis.largest_cluster_fraction * 100.0
            ),
            DEFAULT_BEHAVIORAL_PENALTY,
        );
    }
    RuleResult::pass(RuleId::WalletCluster, "no dominant wallet cluster detected")
}

/// `DOUBLE_QUOTE` — two back-to-back buy quotes; fail if deviation
/// exceeds tolerance. Skipped on high liquidity.
pub fn double_quote(
    liquidity_usd: f64,
    high_liquidity_threshold: f64,
    first_out_amount: Option<u64>,
    second_out_amount: Option<u64>,
    tolerance_pct: f64,
) -> RuleResult {
    if liquidity_usd >= high_liquidity_threshold {
        return RuleResult::skip(RuleId::DoubleQuote, "high-liquidity fast path");
    }
    let (Some(a), Some(b)) = (first_out_amount, second_out_amount) else {
        return RuleResult::skip(RuleId::DoubleQuote, "could not obtain two comparable quotes");
    };
    if a == 0 || b == 0 {
        return RuleResult::fail(RuleId::DoubleQuote, "one quote returned zero output", 30.0);
    }
    let deviation_pct = ((a as f64 - b as f64).abs() / a as f64) * 100.0;
    if deviation_pct > tolerance_pct {
        RuleResult::fail(
            RuleId::DoubleQuote,
            format!("quote deviation {:.2}% exceeds tolerance {:.2}%", deviation_pct, tolerance_pct),
            DEFAULT_BEHAVIORAL_PENALTY,
        )
    } else {
        RuleResult::pass(
            RuleId::DoubleQuote,
            format!("quote deviation {:.2}% within tolerance", deviation_pct),
        )
    }
}

/// `LIQUIDITY_AGING` — dangerously young liquidity is a penalty, and a
/// hard-block when the age is below an operator-defined minimum floor.
pub fn liquidity_aging(
    liquidity_age_seconds: Option<u64>,
    min_age_seconds: u64,
    hard_block_age_seconds: u64,
) -> RuleResult {
    let Some(age) = liquidity_age_seconds else {
        return RuleResult::skip(RuleId::LiquidityAging, "liquidity age unknown");
    };
    if age < hard_block_age_seconds {
        return RuleResult::hard_block(
            RuleId::LiquidityAging,
            format!("liquidity only {age}s old, below {hard_block_age_seconds}s floor"),
        );
    }
    if age < min_age_seconds {
        return RuleResult::fail(
            RuleId::LiquidityAging,
            format!("liquidity {age}s old, below preferred {min_age_seconds}s"),
            20.0,
        );
    }
    RuleResult::pass(RuleId::LiquidityAging, format!("liquidity age {age}s"))
}
