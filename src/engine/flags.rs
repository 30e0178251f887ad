//! Rug and manipulation flag detection.
//!
//! Pure rules over a candidate snapshot, an optional prior-liquidity
//! reading, and whatever social/wallet enrichment is attached. Hard flags
//! disqualify a candidate outright; soft flags only advise.
//!
//! Every flag carries an evidence map holding exactly the numeric inputs
//! that produced it. The explanation layer may only cite that evidence.

use crate::engine::config::PolicyConfig;
use crate::types::{Candidate, Evidence, EvidenceValue, Flag, FlagKind, Severity};
use chrono::{DateTime, Utc};
use tracing::{debug, instrument};

/// Stateless detector; rebuilt freely on policy swaps.
pub struct FlagDetector;

impl FlagDetector {
    /// Run every rule and collect the raised flags.
    ///
    /// `prior_liquidity` is the reference snapshot for rug detection — the
    /// tracker passes an earlier window sample; discovery passes `None`.
    #[instrument(skip(candidate, policy), fields(key = %candidate.key()))]
    pub fn detect(
        candidate: &Candidate,
        prior_liquidity: Option<f64>,
        policy: &PolicyConfig,
        now: DateTime<Utc>,
    ) -> Vec<Flag> {
        let mut flags = Vec::new();

        // Hard rules first, in fixed order.
        if let Some(f) = liquidity_removed(candidate, prior_liquidity, now) {
            flags.push(f);
        }
        if let Some(f) = honeypot_or_low_sell_ratio(candidate, now) {
            flags.push(f);
        }
        if let Some(f) = trading_disabled(candidate, now) {
            flags.push(f);
        }
        if let Some(f) = thin_liquidity_ratio(candidate, now) {
            flags.push(f);
        }

        // Soft rules.
        if let Some(f) = fee_on_transfer(candidate, now) {
            flags.push(f);
        }
        if let Some(f) = wash_trading(candidate, now) {
            flags.push(f);
        }
        if let Some(f) = rapid_pump(candidate, now) {
            flags.push(f);
        }
        if let Some(f) = hype_without_liquidity(candidate, policy, now) {
            flags.push(f);
        }
        if let Some(f) = bot_heavy_activity(candidate, now) {
            flags.push(f);
        }

        if !flags.is_empty() {
            debug!(
                count = flags.len(),
                hard = flags.iter().filter(|f| f.kind.is_hard()).count(),
                "Raised flags"
            );
        }
        flags
    }

    /// Flag used when upstream data for a tracked position vanishes. The
    /// tracker attaches it while transitioning the position to rugged.
    pub fn data_unavailable(key: &str, now: DateTime<Utc>) -> Flag {
        let mut evidence = Evidence::new();
        evidence.insert("position".into(), EvidenceValue::Text(key.to_string()));
        Flag {
            kind: FlagKind::DataUnavailable,
            severity: Severity::Critical,
            message: format!("No market data found for {}; pair no longer resolvable", key),
            evidence,
            detected_at: now,
        }
    }
}

fn num(v: f64) -> EvidenceValue {
    EvidenceValue::Num(v)
}

/// Hard: liquidity removed >= 80% against the prior snapshot.
fn liquidity_removed(
    c: &Candidate,
    prior_liquidity: Option<f64>,
    now: DateTime<Utc>,
) -> Option<Flag> {
    let prior = prior_liquidity.filter(|p| *p > 0.0)?;
    let drop_pct = (prior - c.liquidity_usd) / prior * 100.0;
    if drop_pct < 80.0 {
        return None;
    }
    let mut evidence = Evidence::new();
    evidence.insert("prior_liquidity_usd".into(), num(prior));
    evidence.insert("current_liquidity_usd".into(), num(c.liquidity_usd));
    evidence.insert("drop_pct".into(), num(drop_pct));
    Some(Flag {
        kind: FlagKind::LiquidityRemoved,
        severity: Severity::Critical,
        message: format!(
            "Liquidity dropped {:.0}% (${:.0} -> ${:.0})",
            drop_pct, prior, c.liquidity_usd
        ),
        evidence,
        detected_at: now,
    })
}

/// Hard below 5% sell share of >= 50 transactions; 5-15% demotes to soft.
fn honeypot_or_low_sell_ratio(c: &Candidate, now: DateTime<Utc>) -> Option<Flag> {
    let total = c.total_txns_24h();
    if total < 50 {
        return None;
    }
    let sell_pct = c.sells_24h as f64 / total as f64 * 100.0;
    if sell_pct >= 15.0 {
        return None;
    }
    let mut evidence = Evidence::new();
    evidence.insert("buys_24h".into(), num(c.buys_24h as f64));
    evidence.insert("sells_24h".into(), num(c.sells_24h as f64));
    evidence.insert("sell_pct".into(), num(sell_pct));
    if sell_pct < 5.0 {
        Some(Flag {
            kind: FlagKind::HoneypotSuspected,
            severity: Severity::Critical,
            message: format!(
                "Only {:.1}% of {} transactions are sells; holders may be unable to exit",
                sell_pct, total
            ),
            evidence,
            detected_at: now,
        })
    } else {
        Some(Flag {
            kind: FlagKind::LowSellRatio,
            severity: Severity::Warning,
            message: format!("Sells are {:.1}% of {} transactions", sell_pct, total),
            evidence,
            detected_at: now,
        })
    }
}

/// Hard: zero transactions while liquidity and valuation are both positive.
fn trading_disabled(c: &Candidate, now: DateTime<Utc>) -> Option<Flag> {
    if c.total_txns_24h() != 0 || c.liquidity_usd <= 0.0 || c.fdv_usd <= 0.0 {
        return None;
    }
    let mut evidence = Evidence::new();
    evidence.insert("liquidity_usd".into(), num(c.liquidity_usd));
    evidence.insert("fdv_usd".into(), num(c.fdv_usd));
    evidence.insert("txns_24h".into(), num(0.0));
    Some(Flag {
        kind: FlagKind::TradingDisabled,
        severity: Severity::Critical,
        message: format!(
            "Zero transactions despite ${:.0} liquidity and ${:.0} FDV",
            c.liquidity_usd, c.fdv_usd
        ),
        evidence,
        detected_at: now,
    })
}

/// Hard: liquidity under 2% of a >$100K valuation.
fn thin_liquidity_ratio(c: &Candidate, now: DateTime<Utc>) -> Option<Flag> {
    if c.fdv_usd <= 100_000.0 {
        return None;
    }
    let ratio_pct = c.liquidity_usd / c.fdv_usd * 100.0;
    if ratio_pct >= 2.0 {
        return None;
    }
    let mut evidence = Evidence::new();
    evidence.insert("liquidity_usd".into(), num(c.liquidity_usd));
    evidence.insert("fdv_usd".into(), num(c.fdv_usd));
    evidence.insert("liquidity_to_fdv_pct".into(), num(ratio_pct));
    Some(Flag {
        kind: FlagKind::ThinLiquidityRatio,
        severity: Severity::Critical,
        message: format!(
            "Liquidity is {:.2}% of ${:.0} FDV",
            ratio_pct, c.fdv_usd
        ),
        evidence,
        detected_at: now,
    })
}

/// Soft: heavy turnover while the daily price bleeds.
fn fee_on_transfer(c: &Candidate, now: DateTime<Utc>) -> Option<Flag> {
    if c.liquidity_usd <= 0.0 {
        return None;
    }
    let turnover = c.volume_24h / c.liquidity_usd;
    if turnover < 10.0 || c.price_change_24h > -20.0 {
        return None;
    }
    let mut evidence = Evidence::new();
    evidence.insert("volume_to_liquidity".into(), num(turnover));
    evidence.insert("price_change_24h".into(), num(c.price_change_24h));
    Some(Flag {
        kind: FlagKind::FeeOnTransferSuspected,
        severity: Severity::Warning,
        message: format!(
            "{:.1}x turnover while price fell {:.1}% in 24h",
            turnover,
            c.price_change_24h.abs()
        ),
        evidence,
        detected_at: now,
    })
}

/// Soft: near-perfect buy/sell symmetry on heavy churn.
fn wash_trading(c: &Candidate, now: DateTime<Utc>) -> Option<Flag> {
    let total = c.total_txns_24h();
    if total <= 100 || c.liquidity_usd <= 0.0 {
        return None;
    }
    let buy_pct = c.buys_24h as f64 / total as f64 * 100.0;
    let turnover = c.volume_24h / c.liquidity_usd;
    if !(48.0..=52.0).contains(&buy_pct) || turnover <= 20.0 {
        return None;
    }
    let mut evidence = Evidence::new();
    evidence.insert("buy_pct".into(), num(buy_pct));
    evidence.insert("txns_24h".into(), num(total as f64));
    evidence.insert("volume_to_liquidity".into(), num(turnover));
    Some(Flag {
        kind: FlagKind::WashTradingSuspected,
        severity: Severity::Warning,
        message: format!(
            "Buys are {:.1}% of {} transactions at {:.0}x turnover",
            buy_pct, total, turnover
        ),
        evidence,
        detected_at: now,
    })
}

/// Soft: parabolic hourly move; wording escalates past +500%.
fn rapid_pump(c: &Candidate, now: DateTime<Utc>) -> Option<Flag> {
    if c.price_change_1h <= 200.0 {
        return None;
    }
    let mut evidence = Evidence::new();
    evidence.insert("price_change_1h".into(), num(c.price_change_1h));
    let message = if c.price_change_1h > 500.0 {
        format!(
            "Vertical pump: {:+.0}% in one hour; exit liquidity risk is extreme",
            c.price_change_1h
        )
    } else {
        format!("Rapid pump: {:+.0}% in one hour", c.price_change_1h)
    };
    Some(Flag {
        kind: FlagKind::RapidPump,
        severity: Severity::Warning,
        message,
        evidence,
        detected_at: now,
    })
}

/// Soft: loud social signal with no pool behind it, or a spike that is
/// mostly spam.
fn hype_without_liquidity(
    c: &Candidate,
    policy: &PolicyConfig,
    now: DateTime<Utc>,
) -> Option<Flag> {
    let social = c.social.as_ref()?;
    let velocity_case =
        social.mention_velocity >= policy.social_velocity_high && c.liquidity_usd < 10_000.0;
    let spam_case = social.spike_detected && social.spam_score >= policy.social_spam_high;
    if !velocity_case && !spam_case {
        return None;
    }
    let mut evidence = Evidence::new();
    evidence.insert("mention_velocity".into(), num(social.mention_velocity));
    evidence.insert("spam_score".into(), num(social.spam_score));
    evidence.insert("liquidity_usd".into(), num(c.liquidity_usd));
    let message = if velocity_case {
        format!(
            "{:.0} mentions/hr against ${:.0} liquidity",
            social.mention_velocity, c.liquidity_usd
        )
    } else {
        format!(
            "Mention spike with spam score {:.2}",
            social.spam_score
        )
    };
    Some(Flag {
        kind: FlagKind::HypeWithoutLiquidity,
        severity: Severity::Warning,
        message,
        evidence,
        detected_at: now,
    })
}

/// Soft: a wide buyer set where sampled wallets show no history at all.
fn bot_heavy_activity(c: &Candidate, now: DateTime<Utc>) -> Option<Flag> {
    let intel = c.wallet_intel.as_ref()?;
    if c.unique_buyers_24h < 50
        || intel.wallets_analyzed == 0
        || intel.old_wallet_count > 0
        || intel.profitable_wallet_count > 0
        || c.volume_24h <= 50_000.0
    {
        return None;
    }
    let mut evidence = Evidence::new();
    evidence.insert("unique_buyers_24h".into(), num(c.unique_buyers_24h as f64));
    evidence.insert("wallets_analyzed".into(), num(intel.wallets_analyzed as f64));
    evidence.insert("old_wallet_count".into(), num(0.0));
    evidence.insert("profitable_wallet_count".into(), num(0.0));
    evidence.insert("volume_24h".into(), num(c.volume_24h));
    Some(Flag {
        kind: FlagKind::BotHeavyActivity,
        severity: Severity::Warning,
        message: format!(
            "{} unique buyers and ${:.0} volume, but none of {} sampled wallets have history",
            c.unique_buyers_24h, c.volume_24h, intel.wallets_analyzed
        ),
        evidence,
        detected_at: now,
    })
}
