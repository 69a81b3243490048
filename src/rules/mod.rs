//! The rule catalog (§4.E): structural hard-blocks, behavioral penalty
//! rules, and standard rules, plus the shared statistics helpers and the
//! closed `RuleId` enumeration.

pub mod behavioral;
pub mod stats;
pub mod standard;
pub mod structural;
pub mod types;

pub use types::{RuleBoard, RuleId, RuleResult};

/// Default penalty applied to a failed rule that did not set an explicit
/// `penalty` (§4.F step 5).
pub const DEFAULT_RULE_PENALTY: f64 = 15.0;

/// Early Trust Bonus inputs (§4.E) — a post-aggregation additive
/// adjustment, not itself a rule.
#[derive(Debug, Clone, Default)]
pub struct TrustSignals {
    pub liquidity_usd: f64,
    pub unique_buyer_count: u32,
    pub funding_diversity_0_to_100: Option<f64>,
    pub lp_burn_percent: Option<f64>,
    pub sell_route_confirmed: bool,
    pub sell_slippage_pct: Option<f64>,
    pub deployer_reputation_0_to_100: Option<f64>,
    pub holder_count: Option<u64>,
    pub token_age_seconds: Option<u64>,
}

/// Sum bounded additive bonus points for combinations of positive
/// signals. Bounded so a flood of weak positives cannot overwhelm the
/// penalty side of the score.
pub fn early_trust_bonus(signals: &TrustSignals, max_bonus: f64) -> f64 {
    let mut bonus = 0.0;

    if signals.liquidity_usd >= 100_000.0 {
        bonus += 8.0;
    } else if signals.liquidity_usd >= 50_000.0 {
        bonus += 4.0;
    }

    if signals.unique_buyer_count >= 50 {
        bonus += 6.0;
    } else if signals.unique_buyer_count >= 20 {
        bonus += 3.0;
    }

    if let Some(diversity) = signals.funding_diversity_0_to_100 {
        if diversity >= 80.0 {
            bonus += 4.0;
        }
    }

    if let Some(burn) = signals.lp_burn_percent {
        if burn >= 95.0 {
            bonus += 6.0;
        }
    }

    if signals.sell_route_confirmed {
        bonus += 4.0;
    }

    if let Some(slippage) = signals.sell_slippage_pct {
        if slippage <= 2.0 {
            bonus += 3.0;
        }
    }

    if let Some(reputation) = signals.deployer_reputation_0_to_100 {
        if reputation >= 85.0 {
            bonus += 5.0;
        }
    }

    if let Some(count) = signals.holder_count {
        if count >= 500 {
            bonus += 3.0;
        }
    }

    if let Some(age) = signals.token_age_seconds {
        if age >= 3600 {
            bonus += 3.0;
        }
    }

    bonus.min(max_bonus)
}

/// Dynamic-cap flag set (§4.F step 9). If two or more are true, the
/// caller caps `risk_score` at a configured ceiling.
#[derive(Debug, Clone, Default)]
pub struct DynamicCapFlags {
    pub high_lp_concentration: bool,
    pub confirmed_hard_block_cluster: bool,
    pub low_holder_entropy: bool,
    pub very_young_liquidity: bool,
    pub wash_trading_detected: bool,
}

impl DynamicCapFlags {
    pub fn true_count(&self) -> usize {
        [
            self.high_lp_concentration,
            self.confirmed_hard_block_cluster,
            self.low_holder_entropy,
            self.very_young_liquidity,
            self.wash_trading_detected,
        ]
        .into_iter()
        .filter(|b| *b)
        .count()
    }

    pub fn triggered_reasons(&self) -> Vec<&'static str> {
        let mut reasons = Vec::new();
        if self.high_lp_concentration {
            reasons.push("high LP concentration");
        }
        if self.confirmed_hard_block_cluster {
            reasons.push("confirmed hard-block cluster");
        }
        if self.low_holder_entropy {
            reasons.push("low holder entropy");
        }
        if self.very_young_liquidity {
            reasons.push("very young liquidity");
        }
        if self.wash_trading_detected {
            reasons.push("detected wash trading");
        }
        reasons
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_early_trust_bonus_bounded() {
        let signals = TrustSignals {
            liquidity_usd: 500_000.0,
            unique_buyer_count: 1000,
            funding_diversity_0_to_100: Some(100.0),
            lp_burn_percent: Some(100.0),
            sell_route_confirmed: true,
            sell_slippage_pct: Some(0.1),
            deployer_reputation_0_to_100: Some(100.0),
            holder_count: Some(10_000),
            token_age_seconds: Some(100_000),
        };
        let bonus = early_trust_bonus(&signals, 20.0);
        assert!(bonus <= 20.0);
    }

    #[test]
    fn test_early_trust_bonus_zero_for_no_signals() {
        let bonus = early_trust_bonus(&TrustSignals::default(), 20.0);
        assert_eq!(bonus, 0.0);
    }

    #[test]
    fn test_dynamic_cap_flags_two_or_more() {
        let flags = DynamicCapFlags {
            high_lp_concentration: true,
            low_holder_entropy: true,
            ..Default::default()
        };
        assert_eq!(flags.true_count(), 2);
        assert_eq!(flags.triggered_reasons().len(), 2);
    }
}
