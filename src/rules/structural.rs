//! Structural hard-block rules (§4.E.1). Failure on any of these forces
//! `BLOCKED` regardless of the numeric score.

use crate::candidate::Candidate;
use crate::rules::types::{RuleId, RuleResult};

/// Data a structural on-chain lookup produces for `LP_INTEGRITY`. The
/// gate orchestrator fetches this sequentially before cap logic (§4.F
/// step 4) since the hard-block flag must be settled first.
#[derive(Debug, Clone, Default)]
pub struct LpVerification {
    pub lp_burn_percent: f64,
    pub creator_lp_percent: f64,
    pub lp_mint_authority_present: bool,
}

/// `LP_INTEGRITY` — LP-token burn percentage, creator LP holding, and LP
/// mint authority status. Pump.fun tokens have no LP to verify pre-
/// graduation and skip.
pub fn lp_integrity(candidate: &Candidate, verification: &LpVerification) -> RuleResult {
    if candidate.is_pumpfun {
        return RuleResult::skip(RuleId::LpIntegrity, "pump.fun bonding curve, no LP yet");
    }

    if verification.lp_mint_authority_present {
        return RuleResult::hard_block(
            RuleId::LpIntegrity,
            "LP mint authority is not renounced",
        );
    }
    if verification.creator_lp_percent > 50.0 {
        return RuleResult::hard_block(
            RuleId::LpIntegrity,
            format!(
                "creator holds {:.1}% of LP tokens",
                verification.creator_lp_percent
            ),
        );
    }
    if verification.lp_burn_percent < 50.0 {
        return RuleResult::hard_block(
            RuleId::LpIntegrity,
            format!("only {:.1}% of LP burned", verification.lp_burn_percent),
        );
    }

    RuleResult::pass(RuleId::LpIntegrity, "LP burned and authority renounced")
}

/// `FREEZE_AUTHORITY` — freeze authority must be null.
pub fn freeze_authority(freeze_authority_present: bool) -> RuleResult {
    if freeze_authority_present {
        RuleResult::hard_block(RuleId::FreezeAuthority, "mint retains a freeze authority")
    } else {
        RuleResult::pass(RuleId::FreezeAuthority, "no freeze authority")
    }
}

/// Deployer rug-history summary consulted by `DEPLOYER_BEHAVIOR`.
#[derive(Debug, Clone, Default)]
pub struct DeployerHistory {
    pub prior_rug_count: u32,
    pub prior_token_count: u32,
}

/// `DEPLOYER_BEHAVIOR` — hard-blocks only when the deployer has a recent
/// rug history; otherwise surfaces as a softer reputation signal via
/// `DEPLOYER_REPUTATION` (standard.rs) instead.
pub fn deployer_behavior(history: &DeployerHistory) -> RuleResult {
    if history.prior_rug_count >= 2 {
        return RuleResult::hard_block(
            RuleId::DeployerBehavior,
            format!(
                "deployer has {} prior rugs across {} tokens",
                history.prior_rug_count, history.prior_token_count
            ),
        );
    }
    if history.prior_rug_count == 1 {
        return RuleResult::fail(
            RuleId::DeployerBehavior,
            "deployer has one prior rug on record",
            25.0,
        );
    }
    RuleResult::pass(RuleId::DeployerBehavior, "no prior rug history found")
}

/// Simulated stress-test outcome consulted by `CAPITAL_PRESERVATION`.
#[derive(Debug, Clone, Copy)]
pub struct StressOutcome {
    pub survivability_pct: f64,
}

/// `CAPITAL_PRESERVATION` — hard-blocks only when a simulated stress
/// outcome falls below the survivability threshold; tier-gated.
pub fn capital_preservation(
    enabled: bool,
    outcome: Option<&StressOutcome>,
    min_survivability_pct: f64,
) -> RuleResult {
    if !enabled {
        return RuleResult::skip(RuleId::CapitalPreservation, "capital preservation tier disabled");
    }
    let Some(outcome) = outcome else {
        return RuleResult::skip(RuleId::CapitalPreservation, "no stress simulation available");
    };
    if outcome.survivability_pct < min_survivability_pct {
        return RuleResult::hard_block(
            RuleId::CapitalPreservation,
            format!(
                "simulated survivability {:.1}% below required {:.1}%",
                outcome.survivability_pct, min_survivability_pct
            ),
        );
    }
    RuleResult::pass(
        RuleId::CapitalPreservation,
        format!("simulated survivability {:.1}%", outcome.survivability_pct),
    )
}

/// `DATA_COMPLETENESS` meta-rule — if more than `max_skipped_fraction`
/// of enabled rules produced a skipped/insufficient-data result, hard
/// block: never trade blind (§7 data-gap cascade, §9 open question on
/// fixed-count vs. fraction — this crate uses a fraction, see
/// `gate::GateConfig::max_skipped_fraction`).
pub fn data_completeness(
    skipped_count: usize,
    enabled_count: usize,
    max_skipped_fraction: f64,
) -> RuleResult {
    if enabled_count == 0 {
        return RuleResult::skip(RuleId::DataCompleteness, "no rules enabled");
    }
    let fraction = skipped_count as f64 / enabled_count as f64;
    if fraction > max_skipped_fraction {
        return RuleResult::hard_block(
            RuleId::DataCompleteness,
            format!(
                "{skipped_count}/{enabled_count} rules skipped for missing data ({:.0}% > {:.0}% threshold)",
                fraction * 100.0,
                max_skipped_fraction * 100.0
            ),
        );
    }
    RuleResult::pass(
        RuleId::DataCompleteness,
        format!("{skipped_count}/{enabled_count} rules skipped, within threshold"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate::ExecutionMode;

    fn candidate() -> Candidate {
        Candidate {
            token_address: "So11111111111111111111111111111111111111112".into(),
            token_symbol: "TEST".into(),
            token_name: "Test".into(),
            liquidity_usd: 10_000.0,
            execution_mode: ExecutionMode::Auto,
            pool_created_at: None,
            has_buy_route: true,
            buy_slippage: None,
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
            price_usd: None,
            previous_price_usd: None,
            fdv_usd: None,
            market_cap_usd: None,
            buy_amount_sol: None,
            max_slippage: None,
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
    fn test_lp_integrity_skips_pumpfun() {
        let mut c = candidate();
        c.is_pumpfun = true;
        let r = lp_integrity(&c, &LpVerification::default());
        assert!(r.skipped);
    }

    #[test]
    fn test_lp_integrity_blocks_unburned_lp() {
        let c = candidate();
        let v = LpVerification {
            lp_burn_percent: 10.0,
            creator_lp_percent: 0.0,
            lp_mint_authority_present: false,
        };
        let r = lp_integrity(&c, &v);
        assert!(r.hard_block);
    }

    #[test]
    fn test_lp_integrity_passes_fully_burned() {
        let c = candidate();
        let v = LpVerification {
            lp_burn_percent: 100.0,
            creator_lp_percent: 0.0,
            lp_mint_authority_present: false,
        };
        let r = lp_integrity(&c, &v);
        assert!(r.passed && !r.hard_block);
    }

    #[test]
    fn test_freeze_authority_blocks_when_present() {
        assert!(freeze_authority(true).hard_block);
        assert!(freeze_authority(false).passed);
    }

    #[test]
    fn test_deployer_behavior_blocks_repeat_rugger() {
        let h = DeployerHistory {
            prior_rug_count: 2,
            prior_token_count: 5,
        };
        assert!(deployer_behavior(&h).hard_block);
    }

    #[test]
    fn test_deployer_behavior_penalty_for_single_rug() {
        let h = DeployerHistory {
            prior_rug_count: 1,
            prior_token_count: 5,
        };
        let r = deployer_behavior(&h);
        assert!(!r.hard_block && !r.passed);
    }

    #[test]
    fn test_capital_preservation_skips_when_tier_disabled() {
        let r = capital_preservation(false, None, 30.0);
        assert!(r.skipped);
    }

    #[test]
    fn test_capital_preservation_blocks_low_survivability() {
        let outcome = StressOutcome {
            survivability_pct: 10.0,
        };
        let r = capital_preservation(true, Some(&outcome), 30.0);
        assert!(r.hard_block);
    }

    #[test]
    fn test_data_completeness_blocks_over_threshold() {
        let r = data_completeness(15, 23, 0.5);
        assert!(r.hard_block);
    }

    #[test]
    fn test_data_completeness_passes_under_threshold() {
        let r = data_completeness(2, 23, 0.5);
        assert!(r.passed && !r.hard_block);
    }
}
