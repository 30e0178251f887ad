//! Core types and data structures for the gemscout discovery engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A chain identifier (using string to stay chain-SDK agnostic).
pub type ChainId = String;

/// A token contract / pair address.
pub type TokenAddress = String;

/// A token snapshot evaluated for discovery and risk.
///
/// Scores, flags and signals are recomputed wholesale on every evaluation;
/// nothing on a candidate is patched incrementally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    /// Chain the token trades on (e.g. "solana", "ethereum")
    pub chain: ChainId,
    /// Token contract address
    pub address: TokenAddress,
    /// Ticker symbol
    pub symbol: String,
    /// Full token name
    pub name: String,

    // Market snapshot
    /// Last trade price in USD
    pub price_usd: f64,
    /// Price change over the last hour, percent
    pub price_change_1h: f64,
    /// Price change over the last six hours, percent
    pub price_change_6h: f64,
    /// Price change over the last day, percent
    pub price_change_24h: f64,
    /// Trade volume over the last day, USD
    pub volume_24h: f64,
    /// Pooled liquidity, USD
    pub liquidity_usd: f64,
    /// Fully-diluted valuation, USD
    pub fdv_usd: f64,

    // Transaction snapshot (24h)
    pub buys_24h: u32,
    pub sells_24h: u32,
    pub unique_buyers_24h: u32,
    pub unique_sellers_24h: u32,

    /// When the trading pair was created, if the source reports it
    pub pair_created_at: Option<DateTime<Utc>>,

    /// Computed sub-scores and composite
    pub scores: Scores,
    /// Ordered human-readable signal strings emitted by scoring rules
    pub signals: Vec<String>,
    /// Flags raised by the detector on the last evaluation
    pub flags: Vec<Flag>,
    /// Optional social enrichment
    pub social: Option<SocialSignals>,
    /// Optional wallet-population enrichment
    pub wallet_intel: Option<WalletIntelligence>,

    /// When the candidate was first discovered
    pub discovered_at: DateTime<Utc>,
    /// When the candidate was last refreshed
    pub last_updated: DateTime<Utc>,
}

impl Candidate {
    /// Position/dedup key: chain plus address.
    pub fn key(&self) -> String {
        position_key(&self.chain, &self.address)
    }

    /// Total buy + sell transactions over the last day.
    pub fn total_txns_24h(&self) -> u32 {
        self.buys_24h.saturating_add(self.sells_24h)
    }

    /// Buy share of total transactions, if any transactions exist.
    pub fn buy_ratio(&self) -> Option<f64> {
        let total = self.total_txns_24h();
        if total == 0 {
            None
        } else {
            Some(self.buys_24h as f64 / total as f64)
        }
    }

    /// Pair age relative to an explicit clock, if the creation time is known.
    pub fn pair_age(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        self.pair_created_at.map(|created| now - created)
    }

    /// True if any currently attached flag is hard (disqualifying).
    pub fn has_hard_flag(&self) -> bool {
        self.flags.iter().any(|f| f.kind.is_hard())
    }
}

/// Canonical `chain:address` key used by the position store and dedup.
pub fn position_key(chain: &str, address: &str) -> String {
    format!("{}:{}", chain.to_ascii_lowercase(), address)
}

/// Sub-scores and weighted composite, each clamped to [0, 100].
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Scores {
    pub momentum: f64,
    pub liquidity: f64,
    /// Higher = safer
    pub risk: f64,
    pub confidence: f64,
    pub composite: f64,
}

/// Result of a single named condition check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Condition {
    /// Stable rule name, e.g. "liquidity_ratio"
    pub name: String,
    /// Observed value rendered as text; "unknown" when the input is missing
    pub observed: String,
    /// Threshold the observation was compared against
    pub threshold: String,
    pub passed: bool,
    /// Evidence string describing exactly what was measured
    pub evidence: String,
}

/// Evaluated candidate plus its full condition trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryResult {
    pub candidate: Candidate,
    pub conditions: Vec<Condition>,
    pub passed: usize,
    pub total: usize,
    /// True when the passed count meets the profile minimum (and any
    /// mandatory conditions), before hard-flag filtering
    pub qualifies: bool,
}

/// A single numeric/text/list evidence value.
///
/// Evidence maps are the only material the explanation layer may cite, so
/// the payload is a small closed variant rather than arbitrary JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EvidenceValue {
    Num(f64),
    Text(String),
    List(Vec<String>),
}

impl EvidenceValue {
    /// Render for explanation output.
    pub fn render(&self) -> String {
        match self {
            EvidenceValue::Num(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    format!("{:.2}", n)
                }
            }
            EvidenceValue::Text(s) => s.clone(),
            EvidenceValue::List(items) => items.join(", "),
        }
    }
}

/// Ordered evidence map attached to a flag.
pub type Evidence = BTreeMap<String, EvidenceValue>;

/// Closed enumeration of flag types, split into hard and soft categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FlagKind {
    // Hard flags: any one disqualifies a candidate
    /// Liquidity removed versus a prior snapshot (rug pull)
    LiquidityRemoved,
    /// Sell ratio below the honeypot floor on a meaningful sample
    HoneypotSuspected,
    /// Zero transactions despite positive liquidity and valuation
    TradingDisabled,
    /// Liquidity/valuation ratio too thin for the claimed market cap
    ThinLiquidityRatio,
    /// Upstream data vanished for a tracked position
    DataUnavailable,

    // Soft flags: advisory only
    /// Sell ratio low but above the honeypot floor
    LowSellRatio,
    /// High turnover while the price bleeds (fee-on-transfer pattern)
    FeeOnTransferSuspected,
    /// Near-perfect buy/sell symmetry on heavy churn
    WashTradingSuspected,
    /// Parabolic short-term move
    RapidPump,
    /// Social attention without liquidity to absorb it
    HypeWithoutLiquidity,
    /// Many buyers, none with any wallet history
    BotHeavyActivity,
}

impl FlagKind {
    /// Hard flags disqualify; soft flags only advise.
    pub fn is_hard(&self) -> bool {
        matches!(
            self,
            FlagKind::LiquidityRemoved
                | FlagKind::HoneypotSuspected
                | FlagKind::TradingDisabled
                | FlagKind::ThinLiquidityRatio
                | FlagKind::DataUnavailable
        )
    }

    /// Stable string name for serialization and explanation output.
    pub fn as_str(&self) -> &'static str {
        match self {
            FlagKind::LiquidityRemoved => "liquidity_removed",
            FlagKind::HoneypotSuspected => "honeypot_suspected",
            FlagKind::TradingDisabled => "trading_disabled",
            FlagKind::ThinLiquidityRatio => "thin_liquidity_ratio",
            FlagKind::DataUnavailable => "data_unavailable",
            FlagKind::LowSellRatio => "low_sell_ratio",
            FlagKind::FeeOnTransferSuspected => "fee_on_transfer_suspected",
            FlagKind::WashTradingSuspected => "wash_trading_suspected",
            FlagKind::RapidPump => "rapid_pump",
            FlagKind::HypeWithoutLiquidity => "hype_without_liquidity",
            FlagKind::BotHeavyActivity => "bot_heavy_activity",
        }
    }
}

/// Severity attached to a flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Critical,
    Warning,
    Info,
}

/// A risk indicator produced by the flag detector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Flag {
    pub kind: FlagKind,
    pub severity: Severity,
    /// Human-readable message built only from the evidence fields
    pub message: String,
    /// The numeric/text inputs that actually produced this flag
    pub evidence: Evidence,
    pub detected_at: DateTime<Utc>,
}

/// Social enrichment signals for a token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SocialSignals {
    /// Total mentions seen in the sampling window
    pub mention_count: u32,
    /// Mentions per hour
    pub mention_velocity: f64,
    /// Whether a sudden mention spike was detected
    pub spike_detected: bool,
    /// Estimated spam share of mentions, 0.0-1.0
    pub spam_score: f64,
}

impl SocialSignals {
    /// Empty sentinel used when the social source is unavailable.
    pub fn empty() -> Self {
        Self {
            mention_count: 0,
            mention_velocity: 0.0,
            spike_detected: false,
            spam_score: 0.0,
        }
    }
}

/// Raw per-wallet activity as reported by a wallet-intelligence source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletActivity {
    /// First observed on-chain activity
    pub first_seen: Option<DateTime<Utc>>,
    /// Historical transaction count
    pub tx_count: u64,
    /// Distinct contracts the wallet has interacted with
    pub distinct_contracts: u32,
    /// Token-swap style interactions
    pub token_interactions: u32,
}

/// Heuristic classification of a single wallet.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WalletClassification {
    /// Wallet has real history (age, volume, or breadth of contracts)
    pub is_old: bool,
    /// Old wallet with enough token activity to plausibly be profitable.
    /// An explicit approximation, not ledger-accurate PnL.
    pub is_profitable: bool,
}

/// Aggregated wallet-population statistics over a sampled buyer set.
///
/// Adjusts risk/confidence only; never gates qualification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletIntelligence {
    pub wallets_analyzed: u32,
    pub old_wallet_count: u32,
    pub old_wallet_pct: f64,
    pub profitable_wallet_count: u32,
    pub profitable_wallet_pct: f64,
    /// Small audit samples, bounded
    pub sample_old_wallets: Vec<TokenAddress>,
    pub sample_profitable_wallets: Vec<TokenAddress>,
    pub analyzed_at: DateTime<Utc>,
}

/// What the exit engine recommends doing with a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitAction {
    /// Close the full position now
    Exit,
    /// Take partial profit / reduce exposure
    Trim,
    /// Informational, keep holding
    Hold,
}

impl ExitAction {
    /// Resolution priority: Exit beats Trim beats Hold.
    pub fn priority(&self) -> u8 {
        match self {
            ExitAction::Exit => 2,
            ExitAction::Trim => 1,
            ExitAction::Hold => 0,
        }
    }
}

/// Which trigger produced an exit signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    ProfitTarget10x,
    ProfitTarget5x,
    ProfitTarget2x,
    TrailingStop,
    LiquidityDrop,
    MomentumReversal,
    SmartMoneyExit,
    HardFlag,
}

impl ExitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitReason::ProfitTarget10x => "PROFIT_TARGET_10X",
            ExitReason::ProfitTarget5x => "PROFIT_TARGET_5X",
            ExitReason::ProfitTarget2x => "PROFIT_TARGET_2X",
            ExitReason::TrailingStop => "TRAILING_STOP",
            ExitReason::LiquidityDrop => "LIQUIDITY_DROP",
            ExitReason::MomentumReversal => "MOMENTUM_REVERSAL",
            ExitReason::SmartMoneyExit => "SMART_MONEY_EXIT",
            ExitReason::HardFlag => "HARD_FLAG",
        }
    }
}

/// How urgently the recommendation should be acted on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Urgency {
    High,
    Medium,
    Low,
}

/// An exit recommendation emitted by the position tracker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExitSignal {
    pub action: ExitAction,
    pub reason: ExitReason,
    pub urgency: Urgency,
    /// Human-readable message built from the trigger's own inputs
    pub message: String,
    /// Current multiple (current price / entry price) when the signal fired
    pub multiple: f64,
    pub triggered_at: DateTime<Utc>,
}

/// Lifecycle of a tracked position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionStatus {
    Active,
    Trimmed,
    Exited,
    /// Terminal: hard flag or total liquidity loss
    Rugged,
}

/// A position the user chose to track, keyed by chain + address.
///
/// Created only by an explicit `track` call, mutated only by `update`
/// calls with fresh market data, removed only by `stop_tracking`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedPosition {
    pub chain: ChainId,
    pub address: TokenAddress,
    pub symbol: String,

    pub entry_price: f64,
    pub entry_time: DateTime<Utc>,
    pub entry_liquidity: f64,

    pub current_price: f64,
    pub current_liquidity: f64,
    /// current price / entry price
    pub current_multiple: f64,

    /// Monotonically non-decreasing once set
    pub peak_price: f64,
    pub peak_multiple: f64,
    pub peak_time: DateTime<Utc>,

    /// Most recent signal, if any trigger has fired
    pub current_signal: Option<ExitSignal>,
    /// Append-only history of every signal ever emitted
    pub signal_history: Vec<ExitSignal>,

    pub status: PositionStatus,
}

impl TrackedPosition {
    pub fn key(&self) -> String {
        position_key(&self.chain, &self.address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_kind_hardness_split() {
        assert!(FlagKind::LiquidityRemoved.is_hard());
        assert!(FlagKind::HoneypotSuspected.is_hard());
        assert!(FlagKind::TradingDisabled.is_hard());
        assert!(FlagKind::ThinLiquidityRatio.is_hard());
        assert!(FlagKind::DataUnavailable.is_hard());

        assert!(!FlagKind::LowSellRatio.is_hard());
        assert!(!FlagKind::FeeOnTransferSuspected.is_hard());
        assert!(!FlagKind::WashTradingSuspected.is_hard());
        assert!(!FlagKind::RapidPump.is_hard());
        assert!(!FlagKind::HypeWithoutLiquidity.is_hard());
        assert!(!FlagKind::BotHeavyActivity.is_hard());
    }

    #[test]
    fn test_exit_action_priority() {
        assert!(ExitAction::Exit.priority() > ExitAction::Trim.priority());
        assert!(ExitAction::Trim.priority() > ExitAction::Hold.priority());
    }

    #[test]
    fn test_position_key_normalizes_chain_case() {
        assert_eq!(position_key("Solana", "Abc123"), "solana:Abc123");
    }

    #[test]
    fn test_evidence_value_render() {
        assert_eq!(EvidenceValue::Num(45.0).render(), "45");
        assert_eq!(EvidenceValue::Num(4.567).render(), "4.57");
        assert_eq!(EvidenceValue::Text("ok".into()).render(), "ok");
        assert_eq!(
            EvidenceValue::List(vec!["a".into(), "b".into()]).render(),
            "a, b"
        );
    }

    #[test]
    fn test_buy_ratio_with_no_transactions_is_unknown() {
        let mut c = crate::engine::normalizer::test_support::blank_candidate();
        c.buys_24h = 0;
        c.sells_24h = 0;
        assert!(c.buy_ratio().is_none());

        c.buys_24h = 3;
        c.sells_24h = 1;
        assert_eq!(c.buy_ratio(), Some(0.75));
    }
}
