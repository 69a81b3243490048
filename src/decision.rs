//! Decision — the Gate Orchestrator's output (§3, §8).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::rules::types::RuleId;

/// Ternary state machine terminal value for one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionState {
    Executable,
    Observed,
    Blocked,
}

/// Per-rule detail attached to the decision for downstream display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleDetail {
    pub rule_id: RuleId,
    pub passed: bool,
    pub reason: String,
    pub penalty: f64,
    pub hard_block: bool,
}

/// Output of one Gate Orchestrator evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub allowed: bool,
    pub state: DecisionState,
    pub risk_score: f64,
    pub reasons: Vec<String>,
    pub failed_rules: Vec<RuleId>,
    pub passed_rules: Vec<RuleId>,
    pub timestamp: DateTime<Utc>,
    pub per_rule_details: HashMap<RuleId, RuleDetail>,
    pub cap_applied: Option<f64>,
    pub cap_reasons: Vec<String>,
    pub early_trust_bonus: f64,
}

impl Decision {
    /// Enforce the §3/§8 invariants. Intended for debug assertions and tests,
    /// not called on the hot path.
    pub fn check_invariants(&self) -> Result<(), String> {
        if self.allowed != (self.state == DecisionState::Executable) {
            return Err("allowed must be equivalent to state == EXECUTABLE".into());
        }
        if !(0.0..=100.0).contains(&self.risk_score) {
            return Err(format!("risk_score {} out of [0,100]", self.risk_score));
        }
        let hard_blocked = self
            .per_rule_details
            .values()
            .any(|d| d.hard_block && !d.passed);
        if hard_blocked && self.state != DecisionState::Blocked {
            return Err("a fired hard-block must force state=BLOCKED".into());
        }
        if self.state == DecisionState::Blocked && !hard_blocked && self.risk_score != 0.0 {
            return Err("BLOCKED without hard-block requires risk_score == 0".into());
        }
        Ok(())
    }

    pub fn mode_min(auto: bool) -> f64 {
        if auto {
            65.0
        } else {
            55.0
        }
    }

    /// Derive the tentative state from a clamped score and hard-block flag,
    /// per §4.F step 11. A fired hard-block always forces BLOCKED, matching
    /// the invariant `check_invariants` enforces afterward.
    pub fn tentative_state(risk_score: f64, hard_block: bool, mode_min: f64) -> DecisionState {
        if hard_block {
            DecisionState::Blocked
        } else if risk_score >= mode_min {
            DecisionState::Executable
        } else if risk_score > 0.0 {
            DecisionState::Observed
        } else {
            DecisionState::Blocked
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Decision {
        Decision {
            allowed: false,
            state: DecisionState::Observed,
            risk_score: 50.0,
            reasons: vec![],
            failed_rules: vec![],
            passed_rules: vec![],
            timestamp: Utc::now(),
            per_rule_details: HashMap::new(),
            cap_applied: None,
            cap_reasons: vec![],
            early_trust_bonus: 0.0,
        }
    }

    #[test]
    fn test_allowed_state_equivalence_holds() {
        let d = base();
        assert!(d.check_invariants().is_ok());
    }

    #[test]
    fn test_allowed_without_executable_is_invalid() {
        let mut d = base();
        d.allowed = true;
        assert!(d.check_invariants().is_err());
    }

    #[test]
    fn test_score_out_of_range_is_invalid() {
        let mut d = base();
        d.risk_score = 150.0;
        assert!(d.check_invariants().is_err());
    }

    #[test]
    fn test_hard_block_forces_blocked() {
        let mut d = base();
        d.per_rule_details.insert(
            RuleId::FreezeAuthority,
            RuleDetail {
                rule_id: RuleId::FreezeAuthority,
                passed: false,
                reason: "freeze authority set".into(),
                penalty: 0.0,
                hard_block: true,
            },
        );
        d.state = DecisionState::Observed;
        assert!(d.check_invariants().is_err());
        d.state = DecisionState::Blocked;
        d.risk_score = 0.0;
        assert!(d.check_invariants().is_ok());
    }

    #[test]
    fn test_mode_min_values() {
        assert_eq!(Decision::mode_min(true), 65.0);
        assert_eq!(Decision::mode_min(false), 55.0);
    }

    #[test]
    fn test_tentative_state_transitions() {
        assert_eq!(
            Decision::tentative_state(70.0, false, 65.0),
            DecisionState::Executable
        );
        assert_eq!(
            Decision::tentative_state(30.0, false, 65.0),
            DecisionState::Observed
        );
        assert_eq!(
            Decision::tentative_state(0.0, false, 65.0),
            DecisionState::Blocked
        );
        assert_eq!(
            Decision::tentative_state(90.0, true, 65.0),
            DecisionState::Blocked
        );
    }
}
