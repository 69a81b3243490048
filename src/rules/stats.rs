//! Statistical helpers shared across the rule catalog: Shannon entropy,
//! Gini coefficient, and a piecewise-linear risk-curve evaluator (§4.E,
//! §8 — holder-entropy and Gini testable properties).

/// Shannon entropy `H = -Σ p_i log2(p_i)` over a distribution of
/// percentages, normalized by `log2(N)` so a uniform distribution of
/// `N>1` holders yields exactly `1.0` and a single-holder distribution
/// yields `0.0`.
pub fn normalized_entropy(percentages: &[f64]) -> f64 {
    let n = percentages.len();
    if n <= 1 {
        return 0.0;
    }

    let total: f64 = percentages.iter().sum();
    if total <= 0.0 {
        return 0.0;
    }

    let h: f64 = percentages
        .iter()
        .filter(|&&p| p > 0.0)
        .map(|&p| {
            let prob = p / total;
            -prob * prob.log2()
        })
        .sum();

    let max_h = (n as f64).log2();
    if max_h <= 0.0 {
        0.0
    } else {
        (h / max_h).clamp(0.0, 1.0)
    }
}

/// Gini coefficient over a distribution of non-negative shares. `0` for
/// perfect equality, approaching `1` as one holder owns everything.
pub fn gini_coefficient(shares: &[f64]) -> f64 {
    let n = shares.len();
    if n == 0 {
        return 0.0;
    }

    let mut sorted: Vec<f64> = shares.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let total: f64 = sorted.iter().sum();
    if total <= 0.0 {
        return 0.0;
    }

    let mut cumulative = 0.0;
    let mut weighted_sum = 0.0;
    for (i, &v) in sorted.iter().enumerate() {
        cumulative += v;
        weighted_sum += cumulative;
        let _ = i;
    }

    let gini = (n as f64 + 1.0 - 2.0 * (weighted_sum / total)) / n as f64;
    gini.clamp(0.0, 1.0)
}

/// One breakpoint in a piecewise-linear risk curve: a raw metric value
/// mapped to a risk score in `[0,100]`. Breakpoints must be supplied in
/// decreasing order of the metric (healthy -> dangerous), matching the
/// way rule semantics describe them (e.g. liquidity/FDV 0.10 healthy,
/// 0.03 concerning, 0.01 dangerous).
#[derive(Debug, Clone, Copy)]
pub struct RiskBreakpoint {
    pub metric: f64,
    pub risk: f64,
}

/// Evaluate a metric against a descending-metric piecewise-linear curve,
/// linearly interpolating between the two bracketing breakpoints and
/// clamping outside the defined range.
pub fn piecewise_linear_risk(metric: f64, breakpoints: &[RiskBreakpoint]) -> f64 {
    if breakpoints.is_empty() {
        return 0.0;
    }
    if breakpoints.len() == 1 {
        return breakpoints[0].risk;
    }

    // breakpoints[0] has the highest (healthiest) metric value.
    if metric >= breakpoints[0].metric {
        return breakpoints[0].risk;
    }
    let last = breakpoints.len() - 1;
    if metric <= breakpoints[last].metric {
        return breakpoints[last].risk;
    }

    for w in breakpoints.windows(2) {
        let (hi, lo) = (w[0], w[1]);
        if metric <= hi.metric && metric >= lo.metric {
            let span = hi.metric - lo.metric;
            if span.abs() < f64::EPSILON {
                return lo.risk;
            }
            let t = (hi.metric - metric) / span;
            return hi.risk + t * (lo.risk - hi.risk);
        }
    }
    breakpoints[last].risk
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_entropy_is_one() {
        let percentages = vec![25.0, 25.0, 25.0, 25.0];
        let h = normalized_entropy(&percentages);
        assert!((h - 1.0).abs() < 1e-9, "got {h}");
    }

    #[test]
    fn test_single_holder_entropy_is_zero() {
        assert_eq!(normalized_entropy(&[100.0]), 0.0);
    }

    #[test]
    fn test_skewed_entropy_between_zero_and_one() {
        let h = normalized_entropy(&[90.0, 5.0, 5.0]);
        assert!(h > 0.0 && h < 1.0);
    }

    #[test]
    fn test_gini_equal_distribution_is_zero() {
        let g = gini_coefficient(&[25.0, 25.0, 25.0, 25.0]);
        assert!(g.abs() < 1e-9, "got {g}");
    }

    #[test]
    fn test_gini_single_holder_approaches_one() {
        let g = gini_coefficient(&[100.0, 0.0, 0.0, 0.0]);
        assert!(g > 0.7, "got {g}");
    }

    #[test]
    fn test_gini_empty_is_zero() {
        assert_eq!(gini_coefficient(&[]), 0.0);
    }

    #[test]
    fn test_piecewise_linear_healthy_end() {
        let bps = vec![
            RiskBreakpoint { metric: 0.10, risk: 0.0 },
            RiskBreakpoint { metric: 0.03, risk: 50.0 },
            RiskBreakpoint { metric: 0.01, risk: 100.0 },
        ];
        assert_eq!(piecewise_linear_risk(0.20, &bps), 0.0);
        assert_eq!(piecewise_linear_risk(0.005, &bps), 100.0);
    }

    #[test]
    fn test_piecewise_linear_interpolates() {
        let bps = vec![
            RiskBreakpoint { metric: 0.10, risk: 0.0 },
            RiskBreakpoint { metric: 0.00, risk: 100.0 },
        ];
        let mid = piecewise_linear_risk(0.05, &bps);
        assert!((mid - 50.0).abs() < 1e-9, "got {mid}");
    }
}
