//! Position tracking and exit-timing triggers.
//!
//! Positions enter only through an explicit `track` call and leave only
//! through `stop_tracking`. Every `update` folds a fresh market snapshot
//! into the position, maintains the liquidity and wallet history rings,
//! runs the six exit triggers in fixed order and resolves conflicts by
//! action priority (Exit > Trim > Hold), ties going to the earlier trigger.

use crate::engine::config::{PolicyConfig, SharedPolicy};
use crate::engine::error::EngineError;
use crate::engine::flags::FlagDetector;
use crate::types::{
    position_key, Candidate, ExitAction, ExitReason, ExitSignal, FlagKind, PositionStatus,
    TrackedPosition, Urgency, WalletIntelligence,
};
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, VecDeque};
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

/// A tracked position plus the rolling history its triggers consume.
#[derive(Debug, Clone)]
struct PositionEntry {
    position: TrackedPosition,
    /// Timestamped liquidity samples, pruned to the retention horizon
    liquidity_history: VecDeque<(DateTime<Utc>, f64)>,
    /// Recent wallet-population snapshots, bounded by policy
    wallet_history: VecDeque<WalletIntelligence>,
}

/// In-memory store of tracked positions and their exit evaluation.
pub struct PositionTracker {
    positions: Mutex<HashMap<String, PositionEntry>>,
    policy: SharedPolicy,
}

impl PositionTracker {
    pub fn new(policy: SharedPolicy) -> Self {
        Self {
            positions: Mutex::new(HashMap::new()),
            policy,
        }
    }

    /// Start tracking a candidate at its current price and liquidity.
    ///
    /// Tracking an already-tracked token returns the existing position
    /// unchanged; the original entry basis is never silently reset.
    #[instrument(skip(self, candidate), fields(key = %candidate.key()))]
    pub async fn track(
        &self,
        candidate: &Candidate,
        now: DateTime<Utc>,
    ) -> Result<TrackedPosition, EngineError> {
        let key = candidate.key();
        let mut positions = self.positions.lock().await;
        if let Some(existing) = positions.get(&key) {
            warn!(%key, "Already tracking, returning existing position");
            return Ok(existing.position.clone());
        }

        let position = TrackedPosition {
            chain: candidate.chain.clone(),
            address: candidate.address.clone(),
            symbol: candidate.symbol.clone(),
            entry_price: candidate.price_usd,
            entry_time: now,
            entry_liquidity: candidate.liquidity_usd,
            current_price: candidate.price_usd,
            current_liquidity: candidate.liquidity_usd,
            current_multiple: 1.0,
            peak_price: candidate.price_usd,
            peak_multiple: 1.0,
            peak_time: now,
            current_signal: None,
            signal_history: Vec::new(),
            status: PositionStatus::Active,
        };

        // The liquidity window starts empty: only `update` snapshots count
        // toward the two-sample minimum, so the first update after tracking
        // can never fire the liquidity-drop trigger.
        positions.insert(
            key.clone(),
            PositionEntry {
                position: position.clone(),
                liquidity_history: VecDeque::new(),
                wallet_history: VecDeque::new(),
            },
        );
        info!(%key, entry_price = candidate.price_usd, "Tracking new position");
        Ok(position)
    }

    /// Fold a fresh snapshot into a position and evaluate the exit triggers.
    ///
    /// `snapshot: None` means upstream data for the pair vanished entirely;
    /// the position is marked rugged and a critical exit signal is emitted.
    #[instrument(skip(self, snapshot, wallet_intel))]
    pub async fn update(
        &self,
        chain: &str,
        address: &str,
        snapshot: Option<&Candidate>,
        wallet_intel: Option<WalletIntelligence>,
        now: DateTime<Utc>,
    ) -> Result<Option<ExitSignal>, EngineError> {
        let key = position_key(chain, address);
        let mut positions = self.positions.lock().await;
        let entry = positions
            .get_mut(&key)
            .ok_or_else(|| EngineError::PositionNotFound(key.clone()))?;

        if matches!(
            entry.position.status,
            PositionStatus::Exited | PositionStatus::Rugged
        ) {
            return Ok(None);
        }

        let policy = {
            let runtime = self.policy.read().await;
            runtime.current().clone()
        };

        let Some(candidate) = snapshot else {
            let flag = FlagDetector::data_unavailable(&key, now);
            let signal = ExitSignal {
                action: ExitAction::Exit,
                reason: ExitReason::HardFlag,
                urgency: Urgency::High,
                message: flag.message.clone(),
                multiple: entry.position.current_multiple,
                triggered_at: now,
            };
            entry.position.status = PositionStatus::Rugged;
            record_signal(&mut entry.position, signal.clone());
            warn!(%key, "Market data vanished, position marked rugged");
            return Ok(Some(signal));
        };

        // Fold the snapshot into the position before any trigger runs.
        entry.position.current_price = candidate.price_usd;
        entry.position.current_liquidity = candidate.liquidity_usd;
        entry.position.current_multiple = if entry.position.entry_price > 0.0 {
            candidate.price_usd / entry.position.entry_price
        } else {
            0.0
        };
        if candidate.price_usd > entry.position.peak_price {
            entry.position.peak_price = candidate.price_usd;
            entry.position.peak_multiple = entry.position.current_multiple;
            entry.position.peak_time = now;
        }

        entry
            .liquidity_history
            .push_back((now, candidate.liquidity_usd));
        let horizon = now - Duration::seconds(policy.liquidity_history_retention_secs);
        while entry
            .liquidity_history
            .front()
            .map(|(t, _)| *t < horizon)
            .unwrap_or(false)
        {
            entry.liquidity_history.pop_front();
        }

        if let Some(intel) = wallet_intel {
            entry.wallet_history.push_back(intel);
            while entry.wallet_history.len() > policy.wallet_history_samples {
                entry.wallet_history.pop_front();
            }
        }

        // Detect flags once against the window reference; both the
        // hard-flag trigger and status resolution consume the result.
        let window_start = now - Duration::seconds(policy.liquidity_drop_window_secs);
        let prior_liquidity = entry
            .liquidity_history
            .iter()
            .find(|(t, _)| *t >= window_start)
            .map(|(_, liq)| *liq);
        let detected = FlagDetector::detect(candidate, prior_liquidity, &policy, now);

        let signal = evaluate_triggers(entry, candidate, &detected, &policy, now);
        if let Some(signal) = signal.clone() {
            apply_status(&mut entry.position, &signal, &detected);
            record_signal(&mut entry.position, signal);
            info!(
                %key,
                action = ?entry.position.current_signal.as_ref().map(|s| s.action),
                status = ?entry.position.status,
                "Exit trigger fired"
            );
        }
        Ok(signal)
    }

    /// Stop tracking and return the final position state.
    pub async fn stop_tracking(
        &self,
        chain: &str,
        address: &str,
    ) -> Result<TrackedPosition, EngineError> {
        let key = position_key(chain, address);
        let mut positions = self.positions.lock().await;
        positions
            .remove(&key)
            .map(|entry| entry.position)
            .ok_or(EngineError::PositionNotFound(key))
    }

    pub async fn get(&self, chain: &str, address: &str) -> Option<TrackedPosition> {
        let key = position_key(chain, address);
        self.positions
            .lock()
            .await
            .get(&key)
            .map(|entry| entry.position.clone())
    }

    /// All tracked positions, in no particular order.
    pub async fn positions(&self) -> Vec<TrackedPosition> {
        self.positions
            .lock()
            .await
            .values()
            .map(|entry| entry.position.clone())
            .collect()
    }
}

fn record_signal(position: &mut TrackedPosition, signal: ExitSignal) {
    position.current_signal = Some(signal.clone());
    position.signal_history.push(signal);
}

/// Status transitions: Exit/Trim move an Active position; Trimmed is sticky
/// and never auto-escalates to Exited; a rug (liquidity-removed flag, or a
/// hard flag with zero liquidity) is terminal from any live status.
fn apply_status(
    position: &mut TrackedPosition,
    signal: &ExitSignal,
    detected: &[crate::types::Flag],
) {
    let rugged = detected
        .iter()
        .any(|f| f.kind == FlagKind::LiquidityRemoved)
        || (detected.iter().any(|f| f.kind.is_hard()) && position.current_liquidity <= 0.0);
    if rugged {
        position.status = PositionStatus::Rugged;
        return;
    }
    if position.status == PositionStatus::Active {
        match signal.action {
            ExitAction::Exit => position.status = PositionStatus::Exited,
            ExitAction::Trim => position.status = PositionStatus::Trimmed,
            ExitAction::Hold => {}
        }
    }
}

/// Run the six triggers in fixed order and resolve by action priority,
/// earlier trigger winning ties.
fn evaluate_triggers(
    entry: &PositionEntry,
    candidate: &Candidate,
    detected: &[crate::types::Flag],
    policy: &PolicyConfig,
    now: DateTime<Utc>,
) -> Option<ExitSignal> {
    let mut fired: Vec<ExitSignal> = Vec::new();

    if let Some(s) = profit_targets(&entry.position, policy, now) {
        fired.push(s);
    }
    if let Some(s) = trailing_stop(&entry.position, policy, now) {
        fired.push(s);
    }
    if let Some(s) = liquidity_drop(entry, policy, now) {
        fired.push(s);
    }
    if let Some(s) = momentum_reversal(&entry.position, candidate, policy, now) {
        fired.push(s);
    }
    if let Some(s) = smart_money_exit(entry, policy, now) {
        fired.push(s);
    }
    if let Some(s) = hard_flag(&entry.position, detected, now) {
        fired.push(s);
    }

    let mut best: Option<ExitSignal> = None;
    for signal in fired {
        let better = match &best {
            None => true,
            Some(current) => signal.action.priority() > current.action.priority(),
        };
        if better {
            best = Some(signal);
        }
    }
    best
}

/// Profit milestones. Each milestone fires once per position; crossing the
/// same target again after a dip stays quiet.
fn profit_targets(
    position: &TrackedPosition,
    policy: &PolicyConfig,
    now: DateTime<Utc>,
) -> Option<ExitSignal> {
    let multiple = position.current_multiple;
    let already = |reason: ExitReason| {
        position
            .signal_history
            .iter()
            .any(|s| s.reason == reason)
    };

    let (action, reason, urgency, target) = if multiple >= policy.profit_target_exit {
        (
            ExitAction::Exit,
            ExitReason::ProfitTarget10x,
            Urgency::High,
            policy.profit_target_exit,
        )
    } else if multiple >= policy.profit_target_trim {
        (
            ExitAction::Trim,
            ExitReason::ProfitTarget5x,
            Urgency::High,
            policy.profit_target_trim,
        )
    } else if multiple >= policy.profit_target_notify {
        (
            ExitAction::Hold,
            ExitReason::ProfitTarget2x,
            Urgency::Low,
            policy.profit_target_notify,
        )
    } else {
        return None;
    };

    if already(reason) {
        return None;
    }
    Some(ExitSignal {
        action,
        reason,
        urgency,
        message: format!(
            "{} at {:.1}x entry, {:.0}x profit target reached",
            position.symbol, multiple, target
        ),
        multiple,
        triggered_at: now,
    })
}

/// Trailing stop, armed only after the peak multiple reaches the activation
/// threshold. A drawdown past 60% of the stop distance emits a trim warning.
fn trailing_stop(
    position: &TrackedPosition,
    policy: &PolicyConfig,
    now: DateTime<Utc>,
) -> Option<ExitSignal> {
    if position.peak_multiple < policy.trailing_stop_activation || position.peak_price <= 0.0 {
        return None;
    }
    let drawdown_pct =
        (position.peak_price - position.current_price) / position.peak_price * 100.0;
    if drawdown_pct >= policy.trailing_stop_pct {
        Some(ExitSignal {
            action: ExitAction::Exit,
            reason: ExitReason::TrailingStop,
            urgency: Urgency::High,
            message: format!(
                "{} down {:.1}% from {:.1}x peak, trailing stop hit",
                position.symbol, drawdown_pct, position.peak_multiple
            ),
            multiple: position.current_multiple,
            triggered_at: now,
        })
    } else if drawdown_pct >= policy.trailing_stop_pct * 0.6 {
        Some(ExitSignal {
            action: ExitAction::Trim,
            reason: ExitReason::TrailingStop,
            urgency: Urgency::Medium,
            message: format!(
                "{} down {:.1}% from {:.1}x peak, approaching trailing stop",
                position.symbol, drawdown_pct, position.peak_multiple
            ),
            multiple: position.current_multiple,
            triggered_at: now,
        })
    } else {
        None
    }
}

/// Liquidity drain inside the rolling window. The reference is the earliest
/// sample still inside the window; fewer than two window samples (cold
/// start) yields no judgment at all.
fn liquidity_drop(
    entry: &PositionEntry,
    policy: &PolicyConfig,
    now: DateTime<Utc>,
) -> Option<ExitSignal> {
    let window_start = now - Duration::seconds(policy.liquidity_drop_window_secs);
    let in_window: Vec<&(DateTime<Utc>, f64)> = entry
        .liquidity_history
        .iter()
        .filter(|(t, _)| *t >= window_start)
        .collect();
    if in_window.len() < 2 {
        return None;
    }
    let (_, reference) = *in_window[0];
    if reference <= 0.0 {
        return None;
    }
    let current = entry.position.current_liquidity;
    let drop_pct = (reference - current) / reference * 100.0;

    let (action, urgency) = if drop_pct >= policy.liquidity_drop_exit_pct {
        (ExitAction::Exit, Urgency::High)
    } else if drop_pct >= policy.liquidity_drop_trim_pct {
        (ExitAction::Trim, Urgency::Medium)
    } else {
        return None;
    };
    Some(ExitSignal {
        action,
        reason: ExitReason::LiquidityDrop,
        urgency,
        message: format!(
            "{} liquidity down {:.1}% inside {}s window (${:.0} -> ${:.0})",
            entry.position.symbol,
            drop_pct,
            policy.liquidity_drop_window_secs,
            reference,
            current
        ),
        multiple: entry.position.current_multiple,
        triggered_at: now,
    })
}

/// Momentum reversal on a meaningful transaction sample. Counts independent
/// bearish signals; two or more mean exit, exactly one means trim.
fn momentum_reversal(
    position: &TrackedPosition,
    candidate: &Candidate,
    policy: &PolicyConfig,
    now: DateTime<Utc>,
) -> Option<ExitSignal> {
    if candidate.total_txns_24h() < policy.reversal_min_txns {
        return None;
    }

    let mut bearish: Vec<String> = Vec::new();
    if let Some(ratio) = candidate.buy_ratio() {
        if ratio < 0.4 {
            bearish.push(format!("sellers dominate (buy ratio {:.2})", ratio));
        }
    }
    let turnover = if candidate.liquidity_usd > 0.0 {
        candidate.volume_24h / candidate.liquidity_usd
    } else {
        0.0
    };
    if candidate.price_change_1h < -10.0 && turnover > 1.0 {
        bearish.push(format!(
            "heavy selling into {:.1}% hourly drop",
            candidate.price_change_1h
        ));
    }
    if candidate.price_change_1h < -30.0 {
        bearish.push(format!(
            "sharp hourly decline {:.1}%",
            candidate.price_change_1h
        ));
    }

    let (action, urgency) = match bearish.len() {
        0 => return None,
        1 => (ExitAction::Trim, Urgency::Medium),
        _ => (ExitAction::Exit, Urgency::High),
    };
    Some(ExitSignal {
        action,
        reason: ExitReason::MomentumReversal,
        urgency,
        message: format!(
            "{} momentum reversing: {}",
            position.symbol,
            bearish.join("; ")
        ),
        multiple: position.current_multiple,
        triggered_at: now,
    })
}

/// Smart-money exit: experienced-wallet share collapsing between the two
/// most recent population samples. One sample is never enough.
fn smart_money_exit(
    entry: &PositionEntry,
    policy: &PolicyConfig,
    now: DateTime<Utc>,
) -> Option<ExitSignal> {
    if entry.wallet_history.len() < 2 {
        return None;
    }
    let prev = &entry.wallet_history[entry.wallet_history.len() - 2];
    let last = &entry.wallet_history[entry.wallet_history.len() - 1];

    let old_drop = prev.old_wallet_pct - last.old_wallet_pct;
    let profitable_drop = prev.profitable_wallet_pct - last.profitable_wallet_pct;
    if old_drop <= policy.smart_money_drop_pct && profitable_drop <= policy.smart_money_drop_pct {
        return None;
    }
    Some(ExitSignal {
        action: ExitAction::Trim,
        reason: ExitReason::SmartMoneyExit,
        urgency: Urgency::Medium,
        message: format!(
            "{} experienced wallets leaving: old {:.0}% -> {:.0}%, profitable {:.0}% -> {:.0}%",
            entry.position.symbol,
            prev.old_wallet_pct,
            last.old_wallet_pct,
            prev.profitable_wallet_pct,
            last.profitable_wallet_pct
        ),
        multiple: entry.position.current_multiple,
        triggered_at: now,
    })
}

/// Any hard flag on a held position is an immediate exit. Detection ran
/// once in `update` against the window reference liquidity.
fn hard_flag(
    position: &TrackedPosition,
    detected: &[crate::types::Flag],
    now: DateTime<Utc>,
) -> Option<ExitSignal> {
    let first = detected.iter().find(|f| f.kind.is_hard())?;
    Some(ExitSignal {
        action: ExitAction::Exit,
        reason: ExitReason::HardFlag,
        urgency: Urgency::High,
        message: format!("{}: {}", position.symbol, first.message),
        multiple: position.current_multiple,
        triggered_at: now,
    })
}
