//! Multi-criteria condition evaluation.
//!
//! Each discovery profile carries a fixed, ordered list of named rules.
//! A rule is a pure function of candidate fields producing pass/fail plus
//! an evidence string; when an input is missing or zero the evidence says
//! "unknown" rather than fabricating a value.

use crate::engine::config::{PolicyConfig, ScoreProfile};
use crate::types::{Candidate, Condition};
use chrono::{DateTime, Utc};
use tracing::{debug, instrument};

/// Outcome of one rule evaluation.
pub struct ConditionOutcome {
    pub observed: String,
    pub threshold: String,
    pub passed: bool,
    pub evidence: String,
}

impl ConditionOutcome {
    fn unknown(threshold: impl Into<String>, what: &str) -> Self {
        Self {
            observed: "unknown".to_string(),
            threshold: threshold.into(),
            passed: false,
            evidence: format!("{} unknown, treated as failed", what),
        }
    }
}

type CondFn = fn(&Candidate, &PolicyConfig, DateTime<Utc>) -> ConditionOutcome;

/// A named condition rule. Mandatory rules must pass for the gem profile
/// to qualify regardless of the overall passed count.
pub struct ConditionRule {
    pub name: &'static str,
    pub mandatory: bool,
    eval: CondFn,
}

impl ConditionRule {
    fn new(name: &'static str, eval: CondFn) -> Self {
        Self {
            name,
            mandatory: false,
            eval,
        }
    }

    fn mandatory(name: &'static str, eval: CondFn) -> Self {
        Self {
            name,
            mandatory: true,
            eval,
        }
    }
}

/// Profile-specific evaluation over the fixed rule list.
pub struct ConditionEvaluator {
    profile: ScoreProfile,
    rules: Vec<ConditionRule>,
}

/// Evaluation summary consumed by the orchestrator and scorer.
pub struct EvaluationSummary {
    pub conditions: Vec<Condition>,
    pub passed: usize,
    pub total: usize,
    pub qualifies: bool,
}

impl ConditionEvaluator {
    pub fn new(profile: ScoreProfile) -> Self {
        let rules = match profile {
            ScoreProfile::Discovery => discovery_rules(),
            ScoreProfile::Gem => gem_rules(),
        };
        Self { profile, rules }
    }

    /// Run every rule in order and derive qualification.
    #[instrument(skip(self, candidate, policy), fields(key = %candidate.key()))]
    pub fn evaluate(
        &self,
        candidate: &Candidate,
        policy: &PolicyConfig,
        now: DateTime<Utc>,
    ) -> EvaluationSummary {
        let mut conditions = Vec::with_capacity(self.rules.len());
        let mut passed = 0usize;
        let mut mandatory_ok = true;

        for rule in &self.rules {
            let outcome = (rule.eval)(candidate, policy, now);
            if outcome.passed {
                passed += 1;
            } else if rule.mandatory {
                mandatory_ok = false;
            }
            conditions.push(Condition {
                name: rule.name.to_string(),
                observed: outcome.observed,
                threshold: outcome.threshold,
                passed: outcome.passed,
                evidence: outcome.evidence,
            });
        }

        let total = self.rules.len();
        let qualifies = passed >= policy.min_conditions(self.profile) && mandatory_ok;

        debug!(
            profile = ?self.profile,
            passed,
            total,
            qualifies,
            "Evaluated conditions"
        );

        EvaluationSummary {
            conditions,
            passed,
            total,
            qualifies,
        }
    }
}

fn discovery_rules() -> Vec<ConditionRule> {
    vec![
        ConditionRule::new("accumulation_pattern", accumulation_pattern),
        ConditionRule::new("buyer_seller_ratio", buyer_seller_ratio),
        ConditionRule::new("freshness", freshness),
        ConditionRule::new("market_cap_band", market_cap_band),
        ConditionRule::new("liquidity_ratio", liquidity_ratio),
        ConditionRule::new("momentum_band", momentum_band),
        ConditionRule::new("transaction_velocity", transaction_velocity),
        ConditionRule::new("overextension_guard", overextension_guard),
    ]
}

fn gem_rules() -> Vec<ConditionRule> {
    vec![
        ConditionRule::mandatory("ultra_freshness", ultra_freshness),
        ConditionRule::mandatory("liquidity_floor", liquidity_floor),
        ConditionRule::new("accumulation_pattern", accumulation_pattern),
        ConditionRule::new("buyer_dominance", buyer_dominance),
        ConditionRule::new("early_market_cap", early_market_cap),
        ConditionRule::new("liquidity_ratio_strict", liquidity_ratio_strict),
        ConditionRule::new("momentum_band", momentum_band),
        ConditionRule::new("early_transaction_velocity", early_transaction_velocity),
        ConditionRule::new("unique_buyer_spread", unique_buyer_spread),
        ConditionRule::new("volume_floor", volume_floor),
        ConditionRule::new("overextension_guard", overextension_guard),
        ConditionRule::new("steady_price", steady_price),
    ]
}

// --- Rule implementations ---

/// High turnover against valuation with a flat price and buy dominance.
fn accumulation_pattern(c: &Candidate, _p: &PolicyConfig, _now: DateTime<Utc>) -> ConditionOutcome {
    let threshold = "vol/FDV >= 0.30 with |1h| < 15% and buy ratio >= 0.55";
    if c.fdv_usd <= 0.0 {
        return ConditionOutcome::unknown(threshold, "FDV");
    }
    let turnover = c.volume_24h / c.fdv_usd;
    let flat = c.price_change_1h.abs() < 15.0;
    let buy_ratio = c.buy_ratio();
    let dominated = buy_ratio.map(|r| r >= 0.55).unwrap_or(false);
    let passed = turnover >= 0.30 && flat && dominated;
    ConditionOutcome {
        observed: format!(
            "vol/FDV {:.2}, 1h {:+.1}%, buy ratio {}",
            turnover,
            c.price_change_1h,
            buy_ratio
                .map(|r| format!("{:.2}", r))
                .unwrap_or_else(|| "unknown".to_string()),
        ),
        threshold: threshold.to_string(),
        passed,
        evidence: format!(
            "volume ${:.0} against FDV ${:.0} ({:.2}x) with 1h change {:+.1}%",
            c.volume_24h, c.fdv_usd, turnover, c.price_change_1h
        ),
    }
}

/// Buys outnumber sells on a non-trivial sample.
fn buyer_seller_ratio(c: &Candidate, _p: &PolicyConfig, _now: DateTime<Utc>) -> ConditionOutcome {
    let threshold = "buy ratio >= 0.55 over >= 10 txns";
    let total = c.total_txns_24h();
    if total == 0 {
        return ConditionOutcome::unknown(threshold, "transaction counts");
    }
    let ratio = c.buys_24h as f64 / total as f64;
    let passed = ratio >= 0.55 && total >= 10;
    ConditionOutcome {
        observed: format!("{:.2} over {} txns", ratio, total),
        threshold: threshold.to_string(),
        passed,
        evidence: format!("{} buys / {} sells in 24h", c.buys_24h, c.sells_24h),
    }
}

/// Pair created recently enough to still be early.
fn freshness(c: &Candidate, _p: &PolicyConfig, now: DateTime<Utc>) -> ConditionOutcome {
    let threshold = "pair age <= 72h";
    match c.pair_age(now) {
        None => ConditionOutcome::unknown(threshold, "pair creation time"),
        Some(age) => {
            let hours = age.num_minutes() as f64 / 60.0;
            ConditionOutcome {
                observed: format!("{:.1}h", hours),
                threshold: threshold.to_string(),
                passed: hours <= 72.0 && hours >= 0.0,
                evidence: format!("pair created {:.1}h before evaluation", hours),
            }
        }
    }
}

/// Valuation inside the early-stage band.
fn market_cap_band(c: &Candidate, _p: &PolicyConfig, _now: DateTime<Utc>) -> ConditionOutcome {
    let threshold = "$50K <= FDV <= $10M";
    if c.fdv_usd <= 0.0 {
        return ConditionOutcome::unknown(threshold, "FDV");
    }
    let passed = (50_000.0..=10_000_000.0).contains(&c.fdv_usd);
    ConditionOutcome {
        observed: format!("${:.0}", c.fdv_usd),
        threshold: threshold.to_string(),
        passed,
        evidence: format!("FDV ${:.0}", c.fdv_usd),
    }
}

/// Enough liquidity backing the valuation.
fn liquidity_ratio(c: &Candidate, _p: &PolicyConfig, _now: DateTime<Utc>) -> ConditionOutcome {
    liquidity_ratio_with_floor(c, 0.03, "liquidity/FDV >= 3%")
}

fn liquidity_ratio_strict(c: &Candidate, _p: &PolicyConfig, _now: DateTime<Utc>) -> ConditionOutcome {
    liquidity_ratio_with_floor(c, 0.05, "liquidity/FDV >= 5%")
}

fn liquidity_ratio_with_floor(c: &Candidate, floor: f64, threshold: &str) -> ConditionOutcome {
    if c.fdv_usd <= 0.0 {
        return ConditionOutcome::unknown(threshold, "FDV");
    }
    let ratio = c.liquidity_usd / c.fdv_usd;
    ConditionOutcome {
        observed: format!("{:.1}%", ratio * 100.0),
        threshold: threshold.to_string(),
        passed: ratio >= floor,
        evidence: format!(
            "liquidity ${:.0} against FDV ${:.0} ({:.1}%)",
            c.liquidity_usd,
            c.fdv_usd,
            ratio * 100.0
        ),
    }
}

/// Hourly move in a healthy band: climbing but not vertical.
fn momentum_band(c: &Candidate, _p: &PolicyConfig, _now: DateTime<Utc>) -> ConditionOutcome {
    let threshold = "-20% < 1h change < +80%";
    let passed = c.price_change_1h > -20.0 && c.price_change_1h < 80.0;
    ConditionOutcome {
        observed: format!("{:+.1}%", c.price_change_1h),
        threshold: threshold.to_string(),
        passed,
        evidence: format!("1h price change {:+.1}%", c.price_change_1h),
    }
}

/// Sustained trading activity.
fn transaction_velocity(c: &Candidate, _p: &PolicyConfig, _now: DateTime<Utc>) -> ConditionOutcome {
    txn_velocity_with_floor(c, 50)
}

fn early_transaction_velocity(
    c: &Candidate,
    _p: &PolicyConfig,
    _now: DateTime<Utc>,
) -> ConditionOutcome {
    txn_velocity_with_floor(c, 30)
}

fn txn_velocity_with_floor(c: &Candidate, floor: u32) -> ConditionOutcome {
    let threshold = format!(">= {} txns in 24h", floor);
    let total = c.total_txns_24h();
    if total == 0 {
        return ConditionOutcome::unknown(threshold, "transaction counts");
    }
    ConditionOutcome {
        observed: format!("{} txns", total),
        threshold,
        passed: total >= floor,
        evidence: format!("{} transactions in 24h", total),
    }
}

/// Not already parabolic.
fn overextension_guard(c: &Candidate, _p: &PolicyConfig, _now: DateTime<Utc>) -> ConditionOutcome {
    let threshold = "1h <= +100% and 24h <= +300%";
    let passed = c.price_change_1h <= 100.0 && c.price_change_24h <= 300.0;
    ConditionOutcome {
        observed: format!("1h {:+.1}%, 24h {:+.1}%", c.price_change_1h, c.price_change_24h),
        threshold: threshold.to_string(),
        passed,
        evidence: format!(
            "1h change {:+.1}%, 24h change {:+.1}%",
            c.price_change_1h, c.price_change_24h
        ),
    }
}

// --- Gem-only rules ---

/// Mandatory: pool younger than the gem age cap.
fn ultra_freshness(c: &Candidate, p: &PolicyConfig, now: DateTime<Utc>) -> ConditionOutcome {
    let threshold = format!("pair age <= {}h", p.gem_max_pair_age_hours);
    match c.pair_age(now) {
        None => ConditionOutcome::unknown(threshold, "pair creation time"),
        Some(age) => {
            let hours = age.num_minutes() as f64 / 60.0;
            ConditionOutcome {
                observed: format!("{:.1}h", hours),
                threshold,
                passed: hours >= 0.0 && hours <= p.gem_max_pair_age_hours as f64,
                evidence: format!("pair created {:.1}h before evaluation", hours),
            }
        }
    }
}

/// Mandatory: liquidity above the configured floor.
fn liquidity_floor(c: &Candidate, p: &PolicyConfig, _now: DateTime<Utc>) -> ConditionOutcome {
    let threshold = format!("liquidity >= ${:.0}", p.min_liquidity_usd);
    if c.liquidity_usd <= 0.0 {
        return ConditionOutcome::unknown(threshold, "liquidity");
    }
    ConditionOutcome {
        observed: format!("${:.0}", c.liquidity_usd),
        threshold,
        passed: c.liquidity_usd >= p.min_liquidity_usd,
        evidence: format!("liquidity ${:.0}", c.liquidity_usd),
    }
}

/// Stronger buy dominance than the discovery profile asks for.
fn buyer_dominance(c: &Candidate, _p: &PolicyConfig, _now: DateTime<Utc>) -> ConditionOutcome {
    let threshold = "buy ratio >= 0.60 over >= 10 txns";
    let total = c.total_txns_24h();
    if total == 0 {
        return ConditionOutcome::unknown(threshold, "transaction counts");
    }
    let ratio = c.buys_24h as f64 / total as f64;
    ConditionOutcome {
        observed: format!("{:.2} over {} txns", ratio, total),
        threshold: threshold.to_string(),
        passed: ratio >= 0.60 && total >= 10,
        evidence: format!("{} buys / {} sells in 24h", c.buys_24h, c.sells_24h),
    }
}

/// Small enough to still re-rate.
fn early_market_cap(c: &Candidate, _p: &PolicyConfig, _now: DateTime<Utc>) -> ConditionOutcome {
    let threshold = "FDV <= $2M";
    if c.fdv_usd <= 0.0 {
        return ConditionOutcome::unknown(threshold, "FDV");
    }
    ConditionOutcome {
        observed: format!("${:.0}", c.fdv_usd),
        threshold: threshold.to_string(),
        passed: c.fdv_usd <= 2_000_000.0,
        evidence: format!("FDV ${:.0}", c.fdv_usd),
    }
}

/// Buyer base is actually spread out.
fn unique_buyer_spread(c: &Candidate, _p: &PolicyConfig, _now: DateTime<Utc>) -> ConditionOutcome {
    let threshold = ">= 25 unique buyers in 24h";
    if c.unique_buyers_24h == 0 && c.total_txns_24h() == 0 {
        return ConditionOutcome::unknown(threshold, "unique buyer count");
    }
    ConditionOutcome {
        observed: format!("{} unique buyers", c.unique_buyers_24h),
        threshold: threshold.to_string(),
        passed: c.unique_buyers_24h >= 25,
        evidence: format!("{} unique buyers in 24h", c.unique_buyers_24h),
    }
}

/// Real money is moving.
fn volume_floor(c: &Candidate, _p: &PolicyConfig, _now: DateTime<Utc>) -> ConditionOutcome {
    let threshold = "24h volume >= $10K";
    if c.volume_24h <= 0.0 {
        return ConditionOutcome::unknown(threshold, "volume");
    }
    ConditionOutcome {
        observed: format!("${:.0}", c.volume_24h),
        threshold: threshold.to_string(),
        passed: c.volume_24h >= 10_000.0,
        evidence: format!("24h volume ${:.0}", c.volume_24h),
    }
}

/// Daily chart is not in collapse.
fn steady_price(c: &Candidate, _p: &PolicyConfig, _now: DateTime<Utc>) -> ConditionOutcome {
    let threshold = "24h change > -30%";
    ConditionOutcome {
        observed: format!("{:+.1}%", c.price_change_24h),
        threshold: threshold.to_string(),
        passed: c.price_change_24h > -30.0,
        evidence: format!("24h price change {:+.1}%", c.price_change_24h),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::normalizer::test_support::blank_candidate;
    use chrono::Duration;

    fn policy() -> PolicyConfig {
        PolicyConfig::default()
    }

    /// A candidate tuned to pass most discovery conditions.
    fn strong_candidate(now: DateTime<Utc>) -> Candidate {
        let mut c = blank_candidate();
        c.price_usd = 0.001;
        c.price_change_1h = 8.0;
        c.price_change_6h = 20.0;
        c.price_change_24h = 60.0;
        c.volume_24h = 400_000.0;
        c.liquidity_usd = 80_000.0;
        c.fdv_usd = 900_000.0;
        c.buys_24h = 300;
        c.sells_24h = 150;
        c.unique_buyers_24h = 120;
        c.unique_sellers_24h = 70;
        c.pair_created_at = Some(now - Duration::hours(5));
        c
    }

    #[test]
    fn test_discovery_profile_has_eight_ordered_rules() {
        let rules = discovery_rules();
        assert_eq!(rules.len(), 8);
        assert_eq!(rules[0].name, "accumulation_pattern");
        assert_eq!(rules[7].name, "overextension_guard");
        assert!(rules.iter().all(|r| !r.mandatory));
    }

    #[test]
    fn test_gem_profile_has_twelve_rules_two_mandatory() {
        let rules = gem_rules();
        assert_eq!(rules.len(), 12);
        let mandatory: Vec<_> = rules.iter().filter(|r| r.mandatory).map(|r| r.name).collect();
        assert_eq!(mandatory, vec!["ultra_freshness", "liquidity_floor"]);
    }

    #[test]
    fn test_strong_candidate_qualifies_for_discovery() {
        let now = Utc::now();
        let evaluator = ConditionEvaluator::new(ScoreProfile::Discovery);
        let summary = evaluator.evaluate(&strong_candidate(now), &policy(), now);
        assert!(summary.passed >= policy().discovery_min_conditions);
        assert!(summary.qualifies);
        assert_eq!(summary.total, 8);
    }

    #[test]
    fn test_blank_candidate_reports_unknown_not_fabricated() {
        let now = Utc::now();
        let evaluator = ConditionEvaluator::new(ScoreProfile::Discovery);
        let summary = evaluator.evaluate(&blank_candidate(), &policy(), now);
        assert!(!summary.qualifies);
        let accumulation = &summary.conditions[0];
        assert_eq!(accumulation.observed, "unknown");
        assert!(accumulation.evidence.contains("unknown"));
    }

    #[test]
    fn test_gem_mandatory_failure_blocks_qualification() {
        let now = Utc::now();
        let mut c = strong_candidate(now);
        // Passes plenty of rules but the pool is too old for the gem profile.
        c.pair_created_at = Some(now - Duration::hours(48));
        c.fdv_usd = 800_000.0;
        c.volume_24h = 300_000.0;
        let evaluator = ConditionEvaluator::new(ScoreProfile::Gem);
        let summary = evaluator.evaluate(&c, &policy(), now);
        assert!(!summary.qualifies, "stale pool must fail the mandatory rule");
    }

    #[test]
    fn test_gem_qualification_needs_both_mandatory_and_count() {
        let now = Utc::now();
        let mut c = strong_candidate(now);
        c.pair_created_at = Some(now - Duration::hours(2));
        c.fdv_usd = 900_000.0;
        c.liquidity_usd = 80_000.0;
        c.volume_24h = 400_000.0;
        let evaluator = ConditionEvaluator::new(ScoreProfile::Gem);
        let summary = evaluator.evaluate(&c, &policy(), now);
        assert!(summary.passed >= 8, "expected >=8 passed, got {}", summary.passed);
        assert!(summary.qualifies);
    }

    #[test]
    fn test_idempotent_for_fixed_now() {
        let now = Utc::now();
        let c = strong_candidate(now);
        let evaluator = ConditionEvaluator::new(ScoreProfile::Discovery);
        let a = evaluator.evaluate(&c, &policy(), now);
        let b = evaluator.evaluate(&c, &policy(), now);
        assert_eq!(a.passed, b.passed);
        for (x, y) in a.conditions.iter().zip(b.conditions.iter()) {
            assert_eq!(x.passed, y.passed);
            assert_eq!(x.observed, y.observed);
            assert_eq!(x.evidence, y.evidence);
        }
    }

    #[test]
    fn test_overextension_guard_fails_on_vertical_move() {
        let now = Utc::now();
        let mut c = strong_candidate(now);
        c.price_change_1h = 150.0;
        let outcome = overextension_guard(&c, &policy(), now);
        assert!(!outcome.passed);
    }
}
