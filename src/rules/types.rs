//! The closed rule catalog (§4.E) and the intermediate board rules read
//! and write through instead of mutating the Candidate (§9 redesign flag:
//! "ad-hoc attach private result to input").

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// The ~23 rules of the catalog, closed at compile time. String ids are
/// kept at config/serialization boundaries (`validation_toggles`,
/// activity log) via `as_str()`/`from_str()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RuleId {
    // structural hard-blocks
    LpIntegrity,
    FreezeAuthority,
    DeployerBehavior,
    CapitalPreservation,
    DataCompleteness,
    // behavioral penalty rules
    HolderEntropy,
    WalletCluster,
    DoubleQuote,
    LiquidityAging,
    // standard rules
    TimeBuffer,
    LiquidityReality,
    ExecutableSell,
    BuyerPosition,
    BuyerCluster,
    LpOwnershipDistribution,
    PriceSanity,
    SymbolSpoofing,
    DeployerReputation,
    HiddenSellTax,
    RugProbability,
    LiquidityStability,
    QuoteDepth,
    VolumeAuthenticity,
}

impl RuleId {
    pub const ALL: &'static [RuleId] = &[
        RuleId::LpIntegrity,
        RuleId::FreezeAuthority,
        RuleId::DeployerBehavior,
        RuleId::CapitalPreservation,
        RuleId::DataCompleteness,
        RuleId::HolderEntropy,
        RuleId::WalletCluster,
        RuleId::DoubleQuote,
        RuleId::LiquidityAging,
        RuleId::TimeBuffer,
        RuleId::LiquidityReality,
        RuleId::ExecutableSell,
        RuleId::BuyerPosition,
        RuleId::BuyerCluster,
        RuleId::LpOwnershipDistribution,
        RuleId::PriceSanity,
        RuleId::SymbolSpoofing,
        RuleId::DeployerReputation,
        RuleId::HiddenSellTax,
        RuleId::RugProbability,
        RuleId::LiquidityStability,
        RuleId::QuoteDepth,
        RuleId::VolumeAuthenticity,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RuleId::LpIntegrity => "LP_INTEGRITY",
            RuleId::FreezeAuthority => "FREEZE_AUTHORITY",
            RuleId::DeployerBehavior => "DEPLOYER_BEHAVIOR",
            RuleId::CapitalPreservation => "CAPITAL_PRESERVATION",
            RuleId::DataCompleteness => "DATA_COMPLETENESS",
            RuleId::HolderEntropy => "HOLDER_ENTROPY",
            RuleId::WalletCluster => "WALLET_CLUSTER",
            RuleId::DoubleQuote => "DOUBLE_QUOTE",
            RuleId::LiquidityAging => "LIQUIDITY_AGING",
            RuleId::TimeBuffer => "TIME_BUFFER",
            RuleId::LiquidityReality => "LIQUIDITY_REALITY",
            RuleId::ExecutableSell => "EXECUTABLE_SELL",
            RuleId::BuyerPosition => "BUYER_POSITION",
            RuleId::BuyerCluster => "BUYER_CLUSTER",
            RuleId::LpOwnershipDistribution => "LP_OWNERSHIP_DISTRIBUTION",
            RuleId::PriceSanity => "PRICE_SANITY",
            RuleId::SymbolSpoofing => "SYMBOL_SPOOFING",
            RuleId::DeployerReputation => "DEPLOYER_REPUTATION",
            RuleId::HiddenSellTax => "HIDDEN_SELL_TAX",
            RuleId::RugProbability => "RUG_PROBABILITY",
            RuleId::LiquidityStability => "LIQUIDITY_STABILITY",
            RuleId::QuoteDepth => "QUOTE_DEPTH",
            RuleId::VolumeAuthenticity => "VOLUME_AUTHENTICITY",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|r| r.as_str() == s)
    }

    /// Structural hard-block layer — failure always forces `BLOCKED`.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            RuleId::LpIntegrity
                | RuleId::FreezeAuthority
                | RuleId::DeployerBehavior
                | RuleId::CapitalPreservation
                | RuleId::DataCompleteness
        )
    }

    /// Behavioral penalty layer — failure subtracts points but never
    /// blocks by itself (unless the rule result also sets `hard_block`,
    /// e.g. a confirmed sybil ring).
    pub fn is_behavioral_penalty(&self) -> bool {
        matches!(
            self,
            RuleId::HolderEntropy | RuleId::WalletCluster | RuleId::DoubleQuote | RuleId::LiquidityAging
        )
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of a single rule evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleResult {
    pub rule_id: RuleId,
    pub passed: bool,
    pub reason: String,
    pub penalty: Option<f64>,
    pub hard_block: bool,
    pub skipped: bool,
    pub details: Option<serde_json::Value>,
}

impl RuleResult {
    pub fn pass(rule_id: RuleId, reason: impl Into<String>) -> Self {
        RuleResult {
            rule_id,
            passed: true,
            reason: reason.into(),
            penalty: None,
            hard_block: false,
            skipped: false,
            details: None,
        }
    }

    pub fn fail(rule_id: RuleId, reason: impl Into<String>, penalty: f64) -> Self {
        RuleResult {
            rule_id,
            passed: false,
            reason: reason.into(),
            penalty: Some(penalty),
            hard_block: false,
            skipped: false,
            details: None,
        }
    }

    pub fn hard_block(rule_id: RuleId, reason: impl Into<String>) -> Self {
        RuleResult {
            rule_id,
            passed: false,
            reason: reason.into(),
            penalty: None,
            hard_block: true,
            skipped: false,
            details: None,
        }
    }

    pub fn skip(rule_id: RuleId, reason: impl Into<String>) -> Self {
        RuleResult {
            rule_id,
            passed: true,
            reason: reason.into(),
            penalty: None,
            hard_block: false,
            skipped: true,
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// Intermediate per-rule scratch space the orchestrator hands to rules,
/// replacing the pattern of stashing private results on the input
/// candidate. Keyed by `RuleId` so exhaustiveness is compiler-checked
/// at the call sites that read it back.
#[derive(Debug, Default)]
pub struct RuleBoard {
    results: HashMap<RuleId, RuleResult>,
}

impl RuleBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, result: RuleResult) {
        self.results.insert(result.rule_id, result);
    }

    pub fn get(&self, rule_id: RuleId) -> Option<&RuleResult> {
        self.results.get(&rule_id)
    }

    pub fn all(&self) -> impl Iterator<Item = &RuleResult> {
        self.results.values()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_id_roundtrips_through_string() {
        for rule in RuleId::ALL {
            let s = rule.as_str();
            assert_eq!(RuleId::from_str(s), Some(*rule));
        }
    }

    #[test]
    fn test_catalog_has_23_rules() {
        assert_eq!(RuleId::ALL.len(), 23);
    }

    #[test]
    fn test_structural_and_behavioral_are_disjoint() {
        for rule in RuleId::ALL {
            assert!(!(rule.is_structural() && rule.is_behavioral_penalty()));
        }
    }

    #[test]
    fn test_board_records_and_retrieves() {
        let mut board = RuleBoard::new();
        board.record(RuleResult::pass(RuleId::PriceSanity, "ok"));
        assert!(board.get(RuleId::PriceSanity).unwrap().passed);
        assert!(board.get(RuleId::QuoteDepth).is_none());
    }
}
