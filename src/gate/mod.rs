//! Gate Orchestrator (§4.F) — runs the rule catalog, classifies failures
//! as hard-block or weighted penalty, applies the dynamic cap, runs the
//! observation delay, and emits a `Decision`. Never returns `Err` from
//! its public entrypoint; every failure is surfaced as a `Decision`.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::info;

use crate::activity::{ActivityCategory, ActivityEntry, ActivityLevel, ActivityLogSink};
use crate::candidate::Candidate;
use crate::decision::{Decision, DecisionState, RuleDetail};
use crate::monitor::EvaluationResult;
use crate::quote::QuoteClient;
use crate::rules::behavioral::{self, ClusterAnalysis};
use crate::rules::standard::{self, DeployerReputation, RugInputs};
use crate::rules::stats::normalized_entropy;
use crate::rules::structural::{self, DeployerHistory, LpVerification, StressOutcome};
use crate::rules::{early_trust_bonus, DynamicCapFlags, RuleBoard, RuleId, RuleResult, TrustSignals};

const OBSERVATION_DELAY: Duration = Duration::from_secs(3);

#[derive(Debug, Clone)]
pub struct GateConfig {
    pub high_liquidity_usd: f64,
    pub cap_ceiling: f64,
    pub max_skipped_fraction: f64,
    pub observation_drift_tolerance_pct: f64,
    pub single_holder_block_pct: f64,
    pub top10_holder_block_pct: f64,
    pub cluster_block_fraction: f64,
    pub quote_deviation_tolerance_pct: f64,
    pub time_buffer_min_age_secs: i64,
    pub liquidity_reality_max_divergence_pct: f64,
    pub buyer_cluster_max_share_pct: f64,
    pub lp_ownership_max_concentration_pct: f64,
    pub price_sanity_max_swing_pct: f64,
    pub deployer_reputation_min_score: f64,
    pub hidden_sell_tax_max_pct: f64,
    pub liquidity_aging_min_age_secs: u64,
    pub liquidity_aging_hard_block_secs: u64,
    pub volume_max_ratio: f64,
    pub capital_preservation_min_survivability_pct: f64,
    pub early_trust_max_bonus: f64,
    pub low_entropy_flag_threshold: f64,
    pub very_young_liquidity_secs: u64,
    pub high_lp_concentration_flag_pct: f64,
    pub default_slippage_bps: u16,
}

impl Default for GateConfig {
    fn default() -> Self {
        GateConfig {
            high_liquidity_usd: 50_000.0,
            cap_ceiling: 50.0,
            max_skipped_fraction: 0.5,
            observation_drift_tolerance_pct: 15.0,
            single_holder_block_pct: 50.0,
            top10_holder_block_pct: 85.0,
            cluster_block_fraction: 0.4,
            quote_deviation_tolerance_pct: 5.0,
            time_buffer_min_age_secs: 30,
            liquidity_reality_max_divergence_pct: 40.0,
            buyer_cluster_max_share_pct: 60.0,
            lp_ownership_max_concentration_pct: 60.0,
            price_sanity_max_swing_pct: 80.0,
            deployer_reputation_min_score: 40.0,
            hidden_sell_tax_max_pct: 10.0,
            liquidity_aging_min_age_secs: 300,
            liquidity_aging_hard_block_secs: 30,
            volume_max_ratio: 20.0,
            capital_preservation_min_survivability_pct: 30.0,
            early_trust_max_bonus: 20.0,
            low_entropy_flag_threshold: 0.3,
            very_young_liquidity_secs: 120,
            high_lp_concentration_flag_pct: 70.0,
            default_slippage_bps: 1500,
        }
    }
}

/// External enrichment the orchestrator cannot derive from the
/// Candidate alone — deployer reputation services, stress simulations,
/// and sybil-cluster analysis are out-of-scope collaborators (§1); all
/// fields degrade to "rule skipped" when absent (§7).
#[derive(Debug, Clone, Default)]
pub struct GateEnrichment {
    pub freeze_authority_present: Option<bool>,
    pub lp_verification: Option<LpVerification>,
    pub deployer_history: Option<DeployerHistory>,
    pub deployer_reputation: Option<DeployerReputation>,
    pub stress_outcome: Option<StressOutcome>,
    pub cluster_analysis: Option<ClusterAnalysis>,
    pub rug_inputs: Option<RugInputs>,
    pub monitor_evaluation: Option<EvaluationResult>,
    pub volume_24h_usd: Option<f64>,
}

pub struct GateOrchestrator {
    quote: Arc<QuoteClient>,
    config: GateConfig,
}

impl GateOrchestrator {
    pub fn new(quote: Arc<QuoteClient>, config: GateConfig) -> Self {
        Self { quote, config }
    }

    pub async fn evaluate(
        &self,
        candidate: &Candidate,
        enrichment: &GateEnrichment,
        sink: Option<&dyn ActivityLogSink>,
    ) -> Decision {
        if let Err(e) = candidate.validate() {
            return self.blocked_on_invalid_input(candidate, &e.to_string());
        }

        let mut board = RuleBoard::new();
        let is_auto = matches!(candidate.execution_mode, crate::candidate::ExecutionMode::Auto);

        // --- sync phase (§4.F step 3) ---
        self.run_sync_rules(candidate, enrichment, &mut board);

        // --- async phase (§4.F step 4) ---
        self.run_async_rules(candidate, enrichment, &mut board).await;

        // --- aggregation (§4.F steps 5-8) ---
        let mut risk_score = 100.0_f64;
        let mut passed_rules = Vec::new();
        let mut failed_rules = Vec::new();
        let mut reasons = Vec::new();
        let mut hard_block = false;
        let mut per_rule_details = std::collections::HashMap::new();
        let mut skipped_count = 0;
        let mut enabled_count = 0;

        for rule_id in RuleId::ALL {
            if !candidate.rule_enabled(rule_id.as_str()) {
                passed_rules.push(*rule_id);
                continue;
            }
            enabled_count += 1;

            let Some(result) = board.get(*rule_id) else {
                continue;
            };

            if result.skipped {
                skipped_count += 1;
                passed_rules.push(*rule_id);
                per_rule_details.insert(*rule_id, to_detail(result));
                continue;
            }

            if result.passed {
                passed_rules.push(*rule_id);
                risk_score -= result.penalty.unwrap_or(0.0);
            } else if result.hard_block {
                // A fired hard-block always forces BLOCKED regardless of
                // rule family — `is_structural()`/`is_behavioral_penalty()`
                // only say which rules *can* hard-block, not that every
                // failure does (e.g. a single prior rug is a soft penalty,
                // two or more is a hard block — see `DeployerBehavior`).
                failed_rules.push(*rule_id);
                reasons.push(result.reason.clone());
                hard_block = true;
            } else {
                failed_rules.push(*rule_id);
                risk_score -= result.penalty.unwrap_or(crate::rules::DEFAULT_RULE_PENALTY);
                reasons.push(result.reason.clone());
            }

            per_rule_details.insert(*rule_id, to_detail(result));
        }

        // DATA_COMPLETENESS meta-rule (§4.F step 7)
        let completeness = structural::data_completeness(skipped_count, enabled_count, self.config.max_skipped_fraction);
        if !completeness.passed {
            hard_block = true;
            failed_rules.push(RuleId::DataCompleteness);
            reasons.push(completeness.reason.clone());
        } else {
            passed_rules.push(RuleId::DataCompleteness);
        }
        per_rule_details.insert(RuleId::DataCompleteness, to_detail(&completeness));

        // Early Trust Bonus (§4.F step 8)
        let trust_signals = self.build_trust_signals(candidate, enrichment, &board);
        let bonus = early_trust_bonus(&trust_signals, self.config.early_trust_max_bonus);
        risk_score += bonus;

        // Dynamic risk cap (§4.F step 9)
        let flags = self.derive_cap_flags(candidate, enrichment, &board);
        let mut cap_applied = None;
        let mut cap_reasons = Vec::new();
        if flags.true_count() >= 2 && risk_score > self.config.cap_ceiling {
            cap_applied = Some(self.config.cap_ceiling);
            cap_reasons = flags.triggered_reasons().iter().map(|s| s.to_string()).collect();
            risk_score = self.config.cap_ceiling;
        }

        // Clamp (§4.F step 10)
        risk_score = risk_score.clamp(0.0, 100.0);

        let mode_min = Decision::mode_min(is_auto);
        let mut state = Decision::tentative_state(risk_score, hard_block, mode_min);

        // Observation delay (§4.F step 12)
        if state == DecisionState::Executable && candidate.liquidity_usd < self.config.high_liquidity_usd {
            if !self.observation_delay_holds(candidate).await {
                state = DecisionState::Observed;
                reasons.push("observation delay detected excessive drift".into());
            }
        }

        let allowed = state == DecisionState::Executable;
        let decision = Decision {
            allowed,
            state,
            risk_score,
            reasons,
            failed_rules,
            passed_rules,
            timestamp: Utc::now(),
            per_rule_details,
            cap_applied,
            cap_reasons,
            early_trust_bonus: bonus,
        };

        if let Some(sink) = sink {
            self.emit_activity(candidate, &decision, sink).await;
        }
        info!(
            token_address = %candidate.token_address,
            state = ?decision.state,
            risk_score = decision.risk_score,
            "gate decision emitted"
        );

        decision
    }

    fn run_sync_rules(&self, candidate: &Candidate, enrichment: &GateEnrichment, board: &mut RuleBoard) {
        board.record(standard::symbol_spoofing(candidate));
        board.record(standard::time_buffer(
            candidate.pool_created_at.map(|t| Utc::now().signed_duration_since(t).num_seconds()),
            self.config.time_buffer_min_age_secs,
        ));
        board.record(standard::buyer_position(candidate));
        board.record(standard::buyer_cluster(candidate, self.config.buyer_cluster_max_share_pct));
        board.record(standard::lp_ownership_distribution(candidate, self.config.lp_ownership_max_concentration_pct));
        board.record(standard::price_sanity(candidate, self.config.price_sanity_max_swing_pct));
        board.record(structural::freeze_authority(enrichment.freeze_authority_present.unwrap_or(false)));

        if !candidate.top_holders.is_empty() {
            board.record(behavioral::holder_entropy(
                candidate,
                self.config.single_holder_block_pct,
                self.config.top10_holder_block_pct,
            ));
        } else {
            board.record(RuleResult::skip(RuleId::HolderEntropy, "no holder distribution data"));
        }

        if enrichment.volume_24h_usd.is_some() {
            board.record(standard::volume_authenticity(
                enrichment.volume_24h_usd,
                candidate.liquidity_usd,
                self.config.volume_max_ratio,
            ));
        } else {
            board.record(RuleResult::skip(RuleId::VolumeAuthenticity, "no 24h volume data"));
        }
    }

    async fn run_async_rules(&self, candidate: &Candidate, enrichment: &GateEnrichment, board: &mut RuleBoard) {
        // LP_INTEGRITY runs sequentially first — the hard-block flag it
        // sets must be settled before cap logic (§4.F step 4).
        let lp_verification = enrichment.lp_verification.clone().unwrap_or_default();
        board.record(structural::lp_integrity(candidate, &lp_verification));

        let slippage_bps = self.config.default_slippage_bps;
        let buy_amount_lamports = (candidate.buy_amount_sol.unwrap_or(0.01) * 1e9) as u64;

        const SELL_PROBE_TOKEN_AMOUNT: u64 = 1_000_000;
        let needs_quote_probe = candidate.liquidity_usd < self.config.high_liquidity_usd;

        let sell_quote_fut = self.quote.sell_quote(&candidate.token_address, SELL_PROBE_TOKEN_AMOUNT, slippage_bps);
        let first_quote_fut = async {
            if needs_quote_probe {
                Some(self.quote.buy_quote(&candidate.token_address, buy_amount_lamports, slippage_bps).await)
            } else {
                None
            }
        };

        let (sell_quote, first_quote) = tokio::join!(sell_quote_fut, first_quote_fut);

        // Second probe uses a perturbed amount so it doesn't hit the same
        // cache entry as the first — DOUBLE_QUOTE needs two independent
        // fetches to catch a pool that mutates state between them.
        let second_quote = if needs_quote_probe {
            Some(self.quote.buy_quote(&candidate.token_address, buy_amount_lamports + 1, slippage_bps).await)
        } else {
            None
        };

        board.record(standard::executable_sell(candidate, sell_quote.has_route));
        board.record(standard::quote_depth(
            candidate.liquidity_usd,
            self.config.high_liquidity_usd,
            first_quote.as_ref().and_then(|q| q.price_impact_pct),
            candidate.max_slippage.map(|s| s * 100.0).unwrap_or(5.0),
        ));
        board.record(behavioral::double_quote(
            candidate.liquidity_usd,
            self.config.high_liquidity_usd,
            first_quote.as_ref().and_then(|q| q.out_amount),
            second_quote.as_ref().and_then(|q| q.out_amount),
            self.config.quote_deviation_tolerance_pct,
        ));
        board.record(standard::hidden_sell_tax(
            first_quote.as_ref().and_then(|q| q.out_amount),
            Some(SELL_PROBE_TOKEN_AMOUNT),
            sell_quote.out_amount,
            self.config.hidden_sell_tax_max_pct,
        ));

        board.record(standard::deployer_reputation(
            enrichment.deployer_reputation.as_ref(),
            self.config.deployer_reputation_min_score,
        ));
        board.record(standard::rug_probability(&enrichment.rug_inputs.clone().unwrap_or_default()));
        board.record(standard::liquidity_stability(enrichment.monitor_evaluation.as_ref()));
        board.record(behavioral::wallet_cluster(candidate, enrichment.cluster_analysis.as_ref(), self.config.cluster_block_fraction));
        board.record(behavioral::liquidity_aging(
            candidate.liquidity_age_seconds,
            self.config.liquidity_aging_min_age_secs,
            self.config.liquidity_aging_hard_block_secs,
        ));
        board.record(structural::capital_preservation(
            candidate.tier_features.capital_preservation,
            enrichment.stress_outcome.as_ref(),
            self.config.capital_preservation_min_survivability_pct,
        ));
        board.record(structural::deployer_behavior(&enrichment.deployer_history.clone().unwrap_or_default()));
        board.record(standard::liquidity_reality(
            candidate.liquidity_usd,
            first_quote.as_ref().and_then(|q| q.estimated_liquidity),
            self.config.liquidity_reality_max_divergence_pct,
        ));
    }

    fn build_trust_signals(&self, candidate: &Candidate, enrichment: &GateEnrichment, board: &RuleBoard) -> TrustSignals {
        TrustSignals {
            liquidity_usd: candidate.liquidity_usd,
            unique_buyer_count: candidate.buyer_wallets.len() as u32,
            funding_diversity_0_to_100: enrichment.rug_inputs.as_ref().and_then(|r| r.funding_diversity_0_to_100),
            lp_burn_percent: enrichment.lp_verification.as_ref().map(|v| v.lp_burn_percent),
            sell_route_confirmed: board.get(RuleId::ExecutableSell).map(|r| r.passed).unwrap_or(false),
            sell_slippage_pct: candidate.buy_slippage.map(|s| s * 100.0),
            deployer_reputation_0_to_100: enrichment.deployer_reputation.as_ref().map(|r| r.score_0_to_100),
            holder_count: candidate.holder_count,
            token_age_seconds: candidate.liquidity_age_seconds,
        }
    }

    fn derive_cap_flags(&self, candidate: &Candidate, enrichment: &GateEnrichment, board: &RuleBoard) -> DynamicCapFlags {
        let entropy = if candidate.top_holders.len() > 1 {
            normalized_entropy(&candidate.top_holders.iter().map(|h| h.percent).collect::<Vec<_>>())
        } else {
            1.0
        };

        DynamicCapFlags {
            high_lp_concentration: candidate
                .lp_holder_concentration
                .map(|c| c > self.config.high_lp_concentration_flag_pct)
                .unwrap_or(false),
            confirmed_hard_block_cluster: enrichment
                .cluster_analysis
                .as_ref()
                .map(|a| a.confirmed_sybil_ring)
                .unwrap_or(false),
            low_holder_entropy: entropy < self.config.low_entropy_flag_threshold,
            very_young_liquidity: candidate
                .liquidity_age_seconds
                .map(|age| age < self.config.very_young_liquidity_secs)
                .unwrap_or(false),
            wash_trading_detected: board.get(RuleId::VolumeAuthenticity).map(|r| !r.passed && !r.skipped).unwrap_or(false),
        }
    }

    async fn observation_delay_holds(&self, candidate: &Candidate) -> bool {
        tokio::time::sleep(OBSERVATION_DELAY).await;
        let fresh = self.quote.buy_quote(&candidate.token_address, 10_000_000, self.config.default_slippage_bps).await;
        match fresh.price_impact_pct {
            Some(impact) => impact <= self.config.observation_drift_tolerance_pct,
            None => true,
        }
    }

    fn blocked_on_invalid_input(&self, candidate: &Candidate, reason: &str) -> Decision {
        Decision {
            allowed: false,
            state: DecisionState::Blocked,
            risk_score: 0.0,
            reasons: vec![format!("invalid candidate: {reason}")],
            failed_rules: vec![RuleId::DataCompleteness],
            passed_rules: vec![],
            timestamp: Utc::now(),
            per_rule_details: std::collections::HashMap::new(),
            cap_applied: None,
            cap_reasons: vec![],
            early_trust_bonus: 0.0,
        }
        .tap_log(candidate)
    }

    async fn emit_activity(&self, candidate: &Candidate, decision: &Decision, sink: &dyn ActivityLogSink) {
        let level = match decision.state {
            DecisionState::Executable => ActivityLevel::Success,
            DecisionState::Observed => ActivityLevel::Warning,
            DecisionState::Blocked => ActivityLevel::Error,
        };
        sink.emit(ActivityEntry {
            token_symbol: candidate.token_symbol.clone(),
            token_address: candidate.token_address.clone(),
            level,
            category: ActivityCategory::Evaluate,
            message: format!("{:?} risk_score={:.1}", decision.state, decision.risk_score),
            details: serde_json::to_value(decision).ok(),
            timestamp: decision.timestamp,
        })
        .await;
    }
}

trait TapLog {
    fn tap_log(self, candidate: &Candidate) -> Self;
}

impl TapLog for Decision {
    fn tap_log(self, candidate: &Candidate) -> Self {
        info!(token_address = %candidate.token_address, "candidate rejected: invalid input");
        self
    }
}

fn to_detail(result: &RuleResult) -> RuleDetail {
    RuleDetail {
        rule_id: result.rule_id,
        passed: result.passed,
        reason: result.reason.clone(),
        penalty: result.penalty.unwrap_or(0.0),
        hard_block: result.hard_block,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate::ExecutionMode;

    fn candidate(symbol: &str, address: &str, liquidity: f64) -> Candidate {
        Candidate {
            token_address: address.into(),
            token_symbol: symbol.into(),
            token_name: "Test".into(),
            liquidity_usd: liquidity,
            execution_mode: ExecutionMode::Auto,
            pool_created_at: Some(Utc::now() - chrono::Duration::seconds(600)),
            has_buy_route: true,
            buy_slippage: Some(0.01),
            is_pumpfun: false,
            source_tag: None,
            holder_count: Some(5000),
            top_holders: vec![],
            holder_data: vec![],
            deployer_wallet: None,
            lp_creator_wallet: None,
            buyer_wallets: vec!["a".into(), "b".into(), "c".into()],
            recent_buyers: vec![],
            buyer_timestamps: vec![],
            price_usd: Some(1.0),
            previous_price_usd: Some(1.0),
            fdv_usd: Some(1_000_000.0),
            market_cap_usd: Some(1_000_000.0),
            buy_amount_sol: Some(0.1),
            max_slippage: Some(0.05),
            sol_price_usd: Some(150.0),
            lp_mint_address: None,
            lp_holder_concentration: Some(10.0),
            lp_owner_is_deployer: false,
            lp_recently_minted: false,
            lp_recently_transferred: false,
            liquidity_age_seconds: Some(600),
            validation_toggles: Default::default(),
            tier_features: Default::default(),
            target_buyer_positions: vec![],
            buyer_position: None,
        }
    }

    #[tokio::test]
    async fn test_protected_symbol_spoof_blocks() {
        let orchestrator = GateOrchestrator::new(Arc::new(QuoteClient::new(vec![])), GateConfig::default());
        let c = candidate("USDC", "SomeRandomMint1111111111111111111111111111", 10_000.0);
        let decision = orchestrator.evaluate(&c, &GateEnrichment::default(), None).await;
        assert_eq!(decision.state, DecisionState::Blocked);
        assert!(decision.failed_rules.contains(&RuleId::SymbolSpoofing));
    }

    #[tokio::test]
    async fn test_official_usdc_not_blocked_by_symbol_rule() {
        let orchestrator = GateOrchestrator::new(Arc::new(QuoteClient::new(vec![])), GateConfig::default());
        let c = candidate("USDC", "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v", 10_000_000.0);
        let decision = orchestrator.evaluate(&c, &GateEnrichment::default(), None).await;
        assert!(!decision.failed_rules.contains(&RuleId::SymbolSpoofing));
    }

    #[tokio::test]
    async fn test_exactly_one_state_emitted() {
        let orchestrator = GateOrchestrator::new(Arc::new(QuoteClient::new(vec![])), GateConfig::default());
        let c = candidate("TEST", "So11111111111111111111111111111111111111112", 10_000.0);
        let decision = orchestrator.evaluate(&c, &GateEnrichment::default(), None).await;
        assert!(decision.check_invariants().is_ok());
    }

    #[tokio::test]
    async fn test_invalid_candidate_is_blocked_not_panicked() {
        let orchestrator = GateOrchestrator::new(Arc::new(QuoteClient::new(vec![])), GateConfig::default());
        let mut c = candidate("TEST", "So11111111111111111111111111111111111111112", -1.0);
        c.liquidity_usd = -1.0;
        let decision = orchestrator.evaluate(&c, &GateEnrichment::default(), None).await;
        assert_eq!(decision.state, DecisionState::Blocked);
    }

    #[tokio::test]
    async fn test_allowed_iff_executable() {
        let orchestrator = GateOrchestrator::new(Arc::new(QuoteClient::new(vec![])), GateConfig::default());
        let c = candidate("TEST", "So11111111111111111111111111111111111111112", 10_000.0);
        let decision = orchestrator.evaluate(&c, &GateEnrichment::default(), None).await;
        assert_eq!(decision.allowed, decision.state == DecisionState::Executable);
    }
}
