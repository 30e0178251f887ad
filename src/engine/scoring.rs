//! Composite scoring: four banded sub-scores folded from independent rules.
//!
//! Every sub-score is an ordered list of rules, each returning a signed
//! delta plus an optional signal string, summed from a documented baseline
//! and clamped to [0, 100]. Banded rules rather than continuous curves keep
//! extreme outliers from buying unbounded score.
//!
//! Determinism contract: identical candidate fields (including attached
//! flags) always produce bit-identical scores. No wall-clock reads here.

use crate::engine::config::{PolicyConfig, ScoreProfile};
use crate::types::{Candidate, Scores};
use tracing::{debug, instrument};

/// Signed contribution of one rule, plus an optional human-readable signal.
pub struct RuleOutcome {
    pub delta: f64,
    pub signal: Option<String>,
}

impl RuleOutcome {
    fn flat(delta: f64) -> Self {
        Self {
            delta,
            signal: None,
        }
    }

    fn with_signal(delta: f64, signal: String) -> Self {
        Self {
            delta,
            signal: Some(signal),
        }
    }

    fn none() -> Self {
        Self::flat(0.0)
    }
}

type RuleFn = fn(&Candidate) -> RuleOutcome;

/// A named, independently testable scoring rule.
pub struct ScoreRule {
    pub name: &'static str,
    apply: RuleFn,
}

impl ScoreRule {
    const fn new(name: &'static str, apply: RuleFn) -> Self {
        Self { name, apply }
    }

    /// Run the rule in isolation (used by tests).
    pub fn evaluate(&self, candidate: &Candidate) -> RuleOutcome {
        (self.apply)(candidate)
    }
}

/// Profile-aware scoring engine. Stateless; cheap to rebuild on policy swap.
pub struct ScoringEngine {
    profile: ScoreProfile,
}

impl ScoringEngine {
    pub fn new(profile: ScoreProfile) -> Self {
        Self { profile }
    }

    /// Compute all sub-scores and the weighted composite.
    ///
    /// `passed`/`total` come from the condition evaluator and feed the
    /// confidence sub-score. Flags must already be attached to the
    /// candidate; risk folds their penalties.
    #[instrument(skip(self, candidate, policy), fields(key = %candidate.key()))]
    pub fn score(
        &self,
        candidate: &Candidate,
        passed: usize,
        total: usize,
        policy: &PolicyConfig,
    ) -> (Scores, Vec<String>) {
        let mut signals = Vec::new();

        let momentum = fold(MOMENTUM_BASELINE, momentum_rules(), candidate, &mut signals);
        let liquidity = fold(LIQUIDITY_BASELINE, liquidity_rules(), candidate, &mut signals);
        let risk = fold(RISK_BASELINE, risk_rules(), candidate, &mut signals);
        let confidence = confidence_score(candidate, passed, total);

        let weights = policy.weights(self.profile);
        let composite = clamp(
            momentum * weights.momentum
                + liquidity * weights.liquidity
                + risk * weights.risk
                + confidence * weights.confidence,
        );

        let scores = Scores {
            momentum,
            liquidity,
            risk,
            confidence,
            composite,
        };

        debug!(
            momentum,
            liquidity, risk, confidence, composite, "Scored candidate"
        );
        (scores, signals)
    }
}

const MOMENTUM_BASELINE: f64 = 40.0;
const LIQUIDITY_BASELINE: f64 = 20.0;
const RISK_BASELINE: f64 = 50.0;

fn fold(baseline: f64, rules: &[ScoreRule], candidate: &Candidate, signals: &mut Vec<String>) -> f64 {
    let mut score = baseline;
    for rule in rules {
        let outcome = rule.evaluate(candidate);
        score += outcome.delta;
        if let Some(signal) = outcome.signal {
            signals.push(signal);
        }
    }
    clamp(score)
}

fn clamp(value: f64) -> f64 {
    value.clamp(0.0, 100.0)
}

// --- Momentum rules (baseline 40) ---

/// Fixed evaluation order; deltas are summed.
static MOMENTUM_RULES: [ScoreRule; 5] = [
    ScoreRule::new("coiling", coiling_rule),
    ScoreRule::new("v_shape_recovery", v_shape_rule),
    ScoreRule::new("steady_climb", steady_climb_rule),
    ScoreRule::new("free_fall", free_fall_rule),
    ScoreRule::new("overextended", overextended_rule),
];

pub fn momentum_rules() -> &'static [ScoreRule] {
    &MOMENTUM_RULES
}

/// High turnover against valuation with a flat price and buy dominance:
/// volume arriving without price release.
fn coiling_rule(c: &Candidate) -> RuleOutcome {
    if c.fdv_usd <= 0.0 {
        return RuleOutcome::none();
    }
    let turnover = c.volume_24h / c.fdv_usd;
    let buy_ratio = c.buy_ratio().unwrap_or(0.0);
    if turnover >= 0.5 && c.price_change_1h.abs() < 10.0 && buy_ratio >= 0.60 {
        RuleOutcome::with_signal(
            30.0,
            format!(
                "Coiling: {:.1}x daily turnover vs FDV with flat price ({:+.1}%/1h) and {:.0}% buys",
                turnover,
                c.price_change_1h,
                buy_ratio * 100.0
            ),
        )
    } else if turnover >= 0.3 && c.price_change_1h.abs() < 15.0 && buy_ratio >= 0.55 {
        RuleOutcome::with_signal(
            15.0,
            format!(
                "Accumulation: {:.1}x daily turnover vs FDV, buys {:.0}%",
                turnover,
                buy_ratio * 100.0
            ),
        )
    } else {
        RuleOutcome::none()
    }
}

/// Bounded recovery from a deep short-term dip.
fn v_shape_rule(c: &Candidate) -> RuleOutcome {
    if c.price_change_6h <= -30.0 && c.price_change_1h >= 10.0 && c.price_change_1h <= 100.0 {
        RuleOutcome::with_signal(
            25.0,
            format!(
                "V-shape recovery: {:+.1}%/6h dip, {:+.1}%/1h bounce",
                c.price_change_6h, c.price_change_1h
            ),
        )
    } else {
        RuleOutcome::none()
    }
}

/// Gradual climb with a positive day.
fn steady_climb_rule(c: &Candidate) -> RuleOutcome {
    if c.price_change_1h > 5.0 && c.price_change_1h <= 50.0 && c.price_change_24h > 0.0 {
        RuleOutcome::flat(15.0)
    } else {
        RuleOutcome::none()
    }
}

/// Free-fall on both short windows.
fn free_fall_rule(c: &Candidate) -> RuleOutcome {
    if c.price_change_1h < -30.0 && c.price_change_6h < -50.0 {
        RuleOutcome::with_signal(
            -25.0,
            format!(
                "Free-fall: {:+.1}%/1h, {:+.1}%/6h",
                c.price_change_1h, c.price_change_6h
            ),
        )
    } else {
        RuleOutcome::none()
    }
}

/// Already extended past +100%/1h; chasing is penalized, not rewarded.
fn overextended_rule(c: &Candidate) -> RuleOutcome {
    if c.price_change_1h > 100.0 {
        RuleOutcome::with_signal(
            -30.0,
            format!("Overextended: {:+.1}%/1h already printed", c.price_change_1h),
        )
    } else {
        RuleOutcome::none()
    }
}

// --- Liquidity rules (baseline 20) ---
//
// Every rule here is monotone non-decreasing in liquidity_usd with all
// other fields held fixed, so raising liquidity alone can never lower the
// sub-score.

static LIQUIDITY_RULES: [ScoreRule; 3] = [
    ScoreRule::new("absolute_tier", absolute_liquidity_tier),
    ScoreRule::new("liquidity_to_fdv", liquidity_to_fdv_rule),
    ScoreRule::new("turnover_sanity", turnover_sanity_rule),
];

pub fn liquidity_rules() -> &'static [ScoreRule] {
    &LIQUIDITY_RULES
}

fn absolute_liquidity_tier(c: &Candidate) -> RuleOutcome {
    let delta = match c.liquidity_usd {
        l if l >= 250_000.0 => 30.0,
        l if l >= 100_000.0 => 25.0,
        l if l >= 50_000.0 => 20.0,
        l if l >= 25_000.0 => 12.0,
        l if l >= 10_000.0 => 5.0,
        _ => 0.0,
    };
    RuleOutcome::flat(delta)
}

fn liquidity_to_fdv_rule(c: &Candidate) -> RuleOutcome {
    if c.fdv_usd <= 0.0 {
        return RuleOutcome::none();
    }
    let ratio = c.liquidity_usd / c.fdv_usd;
    let delta = match ratio {
        r if r >= 0.15 => 25.0,
        r if r >= 0.08 => 18.0,
        r if r >= 0.04 => 10.0,
        r if r >= 0.02 => 4.0,
        _ => -10.0,
    };
    RuleOutcome::flat(delta)
}

/// Volume-to-liquidity turnover sanity band. Extreme turnover against a
/// thin pool reads as churn, not depth.
fn turnover_sanity_rule(c: &Candidate) -> RuleOutcome {
    if c.volume_24h <= 0.0 {
        return RuleOutcome::none();
    }
    if c.liquidity_usd <= 0.0 {
        // Positive volume against no pool is the worst turnover band.
        return RuleOutcome::flat(-15.0);
    }
    let turnover = c.volume_24h / c.liquidity_usd;
    let delta = match turnover {
        t if t > 30.0 => -15.0,
        t if t > 10.0 => 5.0,
        _ => 15.0,
    };
    RuleOutcome::flat(delta)
}

// --- Risk rules (baseline 50; higher = safer) ---

static RISK_RULES: [ScoreRule; 5] = [
    ScoreRule::new("liquidity_cushion", liquidity_cushion_rule),
    ScoreRule::new("buy_sell_balance", buy_sell_balance_rule),
    ScoreRule::new("sustained_activity", sustained_activity_rule),
    ScoreRule::new("wallet_population", wallet_population_rule),
    ScoreRule::new("flag_penalty", flag_penalty_rule),
];

pub fn risk_rules() -> &'static [ScoreRule] {
    &RISK_RULES
}

fn liquidity_cushion_rule(c: &Candidate) -> RuleOutcome {
    if c.liquidity_usd <= 0.0 {
        // Unknown liquidity degrades confidence, not risk.
        return RuleOutcome::none();
    }
    let delta = match c.liquidity_usd {
        l if l >= 100_000.0 => 15.0,
        l if l >= 50_000.0 => 10.0,
        l if l >= 10_000.0 => 5.0,
        l if l >= 5_000.0 => 0.0,
        _ => -15.0,
    };
    RuleOutcome::flat(delta)
}

fn buy_sell_balance_rule(c: &Candidate) -> RuleOutcome {
    let total = c.total_txns_24h();
    if total < 20 {
        return RuleOutcome::none();
    }
    let ratio = c.buys_24h as f64 / total as f64;
    let delta = if (0.45..=0.75).contains(&ratio) {
        10.0
    } else if ratio > 0.90 {
        -10.0
    } else if ratio < 0.30 {
        -15.0
    } else {
        0.0
    };
    RuleOutcome::flat(delta)
}

fn sustained_activity_rule(c: &Candidate) -> RuleOutcome {
    let total = c.total_txns_24h();
    let delta = match total {
        t if t >= 500 => 10.0,
        t if t >= 100 => 5.0,
        0 => 0.0,
        t if t < 10 => -10.0,
        _ => 0.0,
    };
    RuleOutcome::flat(delta)
}

/// Wallet-population statistics adjust risk only; they never gate
/// qualification.
fn wallet_population_rule(c: &Candidate) -> RuleOutcome {
    let Some(intel) = &c.wallet_intel else {
        return RuleOutcome::none();
    };
    if intel.wallets_analyzed == 0 {
        return RuleOutcome::none();
    }
    let delta = if intel.old_wallet_pct >= 50.0 {
        10.0
    } else if intel.old_wallet_pct >= 25.0 {
        5.0
    } else if intel.old_wallet_count == 0 && intel.wallets_analyzed >= 20 {
        -10.0
    } else {
        0.0
    };
    RuleOutcome::flat(delta)
}

fn flag_penalty_rule(c: &Candidate) -> RuleOutcome {
    let hard = c.flags.iter().filter(|f| f.kind.is_hard()).count() as f64;
    let soft = c.flags.len() as f64 - hard;
    RuleOutcome::flat(-20.0 * hard - 5.0 * soft)
}

// --- Confidence ---

/// (passed / total) × 50, plus 10 points per populated data field.
fn confidence_score(c: &Candidate, passed: usize, total: usize) -> f64 {
    let condition_share = if total == 0 {
        0.0
    } else {
        passed as f64 / total as f64 * 50.0
    };

    let mut completeness = 0.0;
    if c.liquidity_usd > 0.0 {
        completeness += 10.0;
    }
    if c.volume_24h > 0.0 {
        completeness += 10.0;
    }
    if c.fdv_usd > 0.0 {
        completeness += 10.0;
    }
    if c.pair_created_at.is_some() {
        completeness += 10.0;
    }
    if c.total_txns_24h() > 0 {
        completeness += 10.0;
    }

    clamp(condition_share + completeness)
}
