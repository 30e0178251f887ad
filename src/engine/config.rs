//! Policy configuration: thresholds, weights, windows and cache/pacing
//! parameters, hot-swappable at runtime.
//!
//! A policy update is validated before it replaces the active policy; a
//! rejected update leaves the previous policy in force. Swapping a policy
//! re-instantiates stateless evaluators on the next use but never touches
//! tracked positions.

use crate::engine::error::EngineError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// Scoring/condition profile selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScoreProfile {
    /// Broad discovery scan: momentum-heavy weighting, 3-of-8 conditions
    Discovery,
    /// Stricter ultra-early profile: 8-of-12 plus two mandatory conditions
    Gem,
}

/// Composite weights for the four sub-scores.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CompositeWeights {
    pub momentum: f64,
    pub liquidity: f64,
    pub risk: f64,
    pub confidence: f64,
}

impl CompositeWeights {
    pub fn sum(&self) -> f64 {
        self.momentum + self.liquidity + self.risk + self.confidence
    }
}

/// Full engine policy. Every knob the evaluators, tracker and orchestrator
/// consult lives here so the whole surface hot-swaps as one unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Chains accepted by input validation
    pub supported_chains: Vec<String>,

    // Discovery qualification
    /// Liquidity floor used by conditions and the gem mandatory rule, USD
    pub min_liquidity_usd: f64,
    /// Conditions required to qualify under the discovery profile
    pub discovery_min_conditions: usize,
    /// Conditions required to qualify under the gem profile
    pub gem_min_conditions: usize,
    /// Maximum pair age for the gem ultra-freshness rule, hours
    pub gem_max_pair_age_hours: i64,

    // Composite weights per profile
    pub discovery_weights: CompositeWeights,
    pub gem_weights: CompositeWeights,

    // Exit policy
    /// Multiple at which the full-exit profit target fires
    pub profit_target_exit: f64,
    /// Multiple at which the trim profit target fires
    pub profit_target_trim: f64,
    /// Multiple for the one-shot informational milestone
    pub profit_target_notify: f64,
    /// Drop from peak (percent) that triggers the trailing-stop exit
    pub trailing_stop_pct: f64,
    /// Peak multiple required before the trailing stop arms
    pub trailing_stop_activation: f64,
    /// Liquidity drop (percent, inside the window) that triggers exit
    pub liquidity_drop_exit_pct: f64,
    /// Liquidity drop (percent) that triggers a trim
    pub liquidity_drop_trim_pct: f64,
    /// Rolling comparison window for the liquidity-drop trigger, seconds
    pub liquidity_drop_window_secs: i64,
    /// Retention for the liquidity history ring, seconds
    pub liquidity_history_retention_secs: i64,
    /// Retained wallet-intelligence samples per position
    pub wallet_history_samples: usize,
    /// Percentage-point drop between consecutive wallet samples that
    /// triggers the smart-money trim
    pub smart_money_drop_pct: f64,
    /// Minimum transactions before the momentum-reversal trigger engages
    pub reversal_min_txns: u32,

    // Wallet classification heuristics
    /// First activity at least this many days ago counts as "old"
    pub old_wallet_min_age_days: i64,
    pub old_wallet_min_txns: u64,
    pub old_wallet_min_contracts: u32,
    /// Token interactions above this mark an old wallet as "profitable"
    pub profitable_min_token_interactions: u32,
    /// Maximum buyer addresses sampled per analysis
    pub wallet_sample_limit: usize,

    // Social thresholds
    /// Mentions per hour considered "high velocity"
    pub social_velocity_high: f64,
    /// Spam score above which a spike is treated as manufactured
    pub social_spam_high: f64,

    // Caches and pacing
    pub scan_cache_ttl_secs: u64,
    pub wallet_cache_ttl_secs: u64,
    pub social_cache_ttl_secs: u64,
    /// Minimum interval between requests to one market source, milliseconds
    pub source_min_interval_ms: u64,
    /// Minimum interval between wallet-source requests, milliseconds
    pub wallet_min_interval_ms: u64,
    /// Minimum interval between social-source requests, milliseconds
    pub social_min_interval_ms: u64,
    pub max_concurrent_fetches: usize,
    pub fetch_timeout_secs: u64,
    pub fetch_retry_attempts: usize,
    /// Consecutive failures before a source enters cooldown
    pub source_failure_threshold: u32,
    pub source_cooldown_secs: u64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            supported_chains: vec![
                "solana".to_string(),
                "ethereum".to_string(),
                "base".to_string(),
                "bsc".to_string(),
            ],
            min_liquidity_usd: 10_000.0,
            discovery_min_conditions: 3,
            gem_min_conditions: 8,
            gem_max_pair_age_hours: 6,
            discovery_weights: CompositeWeights {
                momentum: 0.50,
                liquidity: 0.15,
                risk: 0.25,
                confidence: 0.10,
            },
            gem_weights: CompositeWeights {
                momentum: 0.35,
                liquidity: 0.20,
                risk: 0.25,
                confidence: 0.20,
            },
            profit_target_exit: 10.0,
            profit_target_trim: 5.0,
            profit_target_notify: 2.0,
            trailing_stop_pct: 25.0,
            trailing_stop_activation: 2.0,
            liquidity_drop_exit_pct: 40.0,
            liquidity_drop_trim_pct: 20.0,
            liquidity_drop_window_secs: 600,
            liquidity_history_retention_secs: 1800,
            wallet_history_samples: 10,
            smart_money_drop_pct: 20.0,
            reversal_min_txns: 50,
            old_wallet_min_age_days: 180,
            old_wallet_min_txns: 100,
            old_wallet_min_contracts: 20,
            profitable_min_token_interactions: 20,
            wallet_sample_limit: 50,
            social_velocity_high: 30.0,
            social_spam_high: 0.7,
            scan_cache_ttl_secs: 20,
            wallet_cache_ttl_secs: 3600,
            social_cache_ttl_secs: 30,
            source_min_interval_ms: 1000,
            wallet_min_interval_ms: 250,
            social_min_interval_ms: 250,
            max_concurrent_fetches: 4,
            fetch_timeout_secs: 10,
            fetch_retry_attempts: 2,
            source_failure_threshold: 5,
            source_cooldown_secs: 60,
        }
    }
}

impl PolicyConfig {
    /// Composite weights for a profile.
    pub fn weights(&self, profile: ScoreProfile) -> CompositeWeights {
        match profile {
            ScoreProfile::Discovery => self.discovery_weights,
            ScoreProfile::Gem => self.gem_weights,
        }
    }

    /// Minimum passed conditions for a profile to qualify.
    pub fn min_conditions(&self, profile: ScoreProfile) -> usize {
        match profile {
            ScoreProfile::Discovery => self.discovery_min_conditions,
            ScoreProfile::Gem => self.gem_min_conditions,
        }
    }

    /// Reject out-of-range configurations before they go live.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.supported_chains.is_empty() {
            return Err(EngineError::InvalidPolicy(
                "supported_chains must not be empty".into(),
            ));
        }
        for (label, w) in [
            ("discovery_weights", self.discovery_weights),
            ("gem_weights", self.gem_weights),
        ] {
            if (w.sum() - 1.0).abs() > 1e-6 {
                return Err(EngineError::InvalidPolicy(format!(
                    "{} must sum to 1.0, got {:.6}",
                    label,
                    w.sum()
                )));
            }
            for (name, v) in [
                ("momentum", w.momentum),
                ("liquidity", w.liquidity),
                ("risk", w.risk),
                ("confidence", w.confidence),
            ] {
                if !(0.0..=1.0).contains(&v) {
                    return Err(EngineError::InvalidPolicy(format!(
                        "{}.{} out of range: {}",
                        label, name, v
                    )));
                }
            }
        }
        if self.min_liquidity_usd < 0.0 {
            return Err(EngineError::InvalidPolicy(
                "min_liquidity_usd must be non-negative".into(),
            ));
        }
        if self.discovery_min_conditions == 0 || self.gem_min_conditions == 0 {
            return Err(EngineError::InvalidPolicy(
                "minimum condition counts must be positive".into(),
            ));
        }
        if self.profit_target_notify >= self.profit_target_trim
            || self.profit_target_trim >= self.profit_target_exit
        {
            return Err(EngineError::InvalidPolicy(
                "profit targets must satisfy notify < trim < exit".into(),
            ));
        }
        if !(0.0..=100.0).contains(&self.trailing_stop_pct) || self.trailing_stop_pct == 0.0 {
            return Err(EngineError::InvalidPolicy(format!(
                "trailing_stop_pct out of range: {}",
                self.trailing_stop_pct
            )));
        }
        if self.trailing_stop_activation < 1.0 {
            return Err(EngineError::InvalidPolicy(
                "trailing_stop_activation must be at least 1.0".into(),
            ));
        }
        if self.liquidity_drop_trim_pct >= self.liquidity_drop_exit_pct
            || self.liquidity_drop_exit_pct > 100.0
            || self.liquidity_drop_trim_pct <= 0.0
        {
            return Err(EngineError::InvalidPolicy(
                "liquidity drop thresholds must satisfy 0 < trim < exit <= 100".into(),
            ));
        }
        if self.liquidity_drop_window_secs <= 0
            || self.liquidity_history_retention_secs < self.liquidity_drop_window_secs
        {
            return Err(EngineError::InvalidPolicy(
                "liquidity window must be positive and within retention".into(),
            ));
        }
        if self.wallet_history_samples < 2 {
            return Err(EngineError::InvalidPolicy(
                "wallet_history_samples must be at least 2".into(),
            ));
        }
        if self.wallet_sample_limit == 0 {
            return Err(EngineError::InvalidPolicy(
                "wallet_sample_limit must be positive".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.social_spam_high) {
            return Err(EngineError::InvalidPolicy(format!(
                "social_spam_high out of range: {}",
                self.social_spam_high
            )));
        }
        if self.max_concurrent_fetches == 0 {
            return Err(EngineError::InvalidPolicy(
                "max_concurrent_fetches must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Runtime policy wrapper supporting validated hot swaps.
#[derive(Debug)]
pub struct RuntimePolicy {
    current: PolicyConfig,
    update_count: u64,
    last_updated: DateTime<Utc>,
}

impl RuntimePolicy {
    pub fn new(policy: PolicyConfig) -> Result<Self, EngineError> {
        policy.validate()?;
        Ok(Self {
            current: policy,
            update_count: 0,
            last_updated: Utc::now(),
        })
    }

    /// The active policy.
    pub fn current(&self) -> &PolicyConfig {
        &self.current
    }

    /// Swap in a new policy if it validates; otherwise the previous policy
    /// remains active and the error is returned.
    pub fn apply_update(&mut self, policy: PolicyConfig) -> Result<(), EngineError> {
        policy.validate()?;
        self.current = policy;
        self.update_count += 1;
        self.last_updated = Utc::now();
        info!(update_count = self.update_count, "Applied policy update");
        Ok(())
    }

    pub fn update_count(&self) -> u64 {
        self.update_count
    }

    pub fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }
}

/// Shared handle consulted by the orchestrator, tracker and classifiers.
pub type SharedPolicy = Arc<RwLock<RuntimePolicy>>;

/// Build a shared policy handle from a validated config.
pub fn shared_policy(policy: PolicyConfig) -> Result<SharedPolicy, EngineError> {
    Ok(Arc::new(RwLock::new(RuntimePolicy::new(policy)?)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_is_valid() {
        assert!(PolicyConfig::default().validate().is_ok());
    }

    #[test]
    fn test_profile_weights_differ() {
        let policy = PolicyConfig::default();
        let d = policy.weights(ScoreProfile::Discovery);
        let g = policy.weights(ScoreProfile::Gem);
        assert_eq!(d.momentum, 0.50);
        assert_eq!(g.momentum, 0.35);
        assert_eq!(policy.min_conditions(ScoreProfile::Discovery), 3);
        assert_eq!(policy.min_conditions(ScoreProfile::Gem), 8);
    }

    #[test]
    fn test_validate_rejects_bad_weights() {
        let mut policy = PolicyConfig::default();
        policy.discovery_weights.momentum = 0.9;
        assert!(policy.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_inverted_drop_thresholds() {
        let mut policy = PolicyConfig::default();
        policy.liquidity_drop_trim_pct = 50.0;
        policy.liquidity_drop_exit_pct = 40.0;
        assert!(policy.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unordered_profit_targets() {
        let mut policy = PolicyConfig::default();
        policy.profit_target_trim = 12.0;
        assert!(policy.validate().is_err());
    }

    #[test]
    fn test_rejected_update_keeps_previous_policy() {
        let mut runtime = RuntimePolicy::new(PolicyConfig::default()).unwrap();
        let old_min = runtime.current().min_liquidity_usd;

        let mut bad = PolicyConfig::default();
        bad.min_liquidity_usd = -5.0;
        assert!(runtime.apply_update(bad).is_err());

        assert_eq!(runtime.current().min_liquidity_usd, old_min);
        assert_eq!(runtime.update_count(), 0);
    }

    #[test]
    fn test_accepted_update_bumps_count() {
        let mut runtime = RuntimePolicy::new(PolicyConfig::default()).unwrap();
        let mut next = PolicyConfig::default();
        next.min_liquidity_usd = 25_000.0;
        runtime.apply_update(next).unwrap();
        assert_eq!(runtime.update_count(), 1);
        assert_eq!(runtime.current().min_liquidity_usd, 25_000.0);
    }
}
