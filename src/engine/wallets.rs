//! Wallet-population classification.
//!
//! Buyer wallets are sampled and classified with age/activity heuristics,
//! then aggregated into population statistics. The output adjusts risk and
//! confidence scoring only; it must never gate qualification. Per-wallet
//! results are cached with a bounded TTL and lookups are paced per source.

use crate::engine::config::SharedPolicy;
use crate::engine::rate_limit::SourcePacer;
use crate::types::{TokenAddress, WalletActivity, WalletClassification, WalletIntelligence};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use moka::future::Cache;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Upstream wallet-intelligence seam. Returns `None` when the source has
/// no data for a wallet (the unavailable sentinel).
#[async_trait]
pub trait WalletActivitySource: Send + Sync {
    fn name(&self) -> &str;

    async fn activity(&self, chain: &str, address: &str) -> Result<Option<WalletActivity>>;

    /// Recent buyer wallets of a token, most recent first. Sources without
    /// buyer-level data return an empty list and wallet analysis is skipped.
    async fn recent_buyers(&self, _chain: &str, _token: &str) -> Result<Vec<TokenAddress>> {
        Ok(Vec::new())
    }
}

/// Number of audit addresses retained per sample list.
const AUDIT_SAMPLE_LIMIT: usize = 5;

/// Classifies sampled buyer wallets and aggregates population statistics.
pub struct WalletClassifier {
    source: Arc<dyn WalletActivitySource>,
    policy: SharedPolicy,
    cache: Cache<String, WalletClassification>,
    pacer: SourcePacer,
}

impl WalletClassifier {
    pub async fn new(source: Arc<dyn WalletActivitySource>, policy: SharedPolicy) -> Self {
        let (ttl_secs, interval_ms) = {
            let runtime = policy.read().await;
            let p = runtime.current();
            (p.wallet_cache_ttl_secs, p.wallet_min_interval_ms)
        };
        let cache = Cache::builder()
            .max_capacity(10_000)
            .time_to_live(std::time::Duration::from_secs(ttl_secs))
            .build();
        Self {
            source,
            policy,
            cache,
            pacer: SourcePacer::from_millis(interval_ms),
        }
    }

    /// Classify one wallet, consulting the cache first. Early requests wait
    /// for the pacer rather than being dropped: enrichment is
    /// latency-tolerant and a skipped lookup would silently bias the sample.
    #[instrument(skip(self), fields(source = self.source.name()))]
    pub async fn classify(
        &self,
        chain: &str,
        address: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<WalletClassification>> {
        let key = format!("{}:{}", chain, address);
        if let Some(cached) = self.cache.get(&key).await {
            debug!(%key, "Wallet classification cache hit");
            return Ok(Some(cached));
        }

        self.pacer.wait_ready().await;
        let Some(activity) = self.source.activity(chain, address).await? else {
            return Ok(None);
        };

        let classification = {
            let runtime = self.policy.read().await;
            classify_activity(&activity, runtime.current(), now)
        };
        self.cache.insert(key, classification).await;
        Ok(Some(classification))
    }

    /// Sample up to the configured limit of buyer addresses and aggregate
    /// into population statistics. Individual lookup failures degrade to a
    /// smaller sample instead of failing the analysis.
    #[instrument(skip(self, buyers), fields(buyers = buyers.len()))]
    pub async fn analyze_buyers(
        &self,
        chain: &str,
        buyers: &[TokenAddress],
        now: DateTime<Utc>,
    ) -> WalletIntelligence {
        let sample_limit = {
            let runtime = self.policy.read().await;
            runtime.current().wallet_sample_limit
        };

        let mut analyzed = 0u32;
        let mut old_count = 0u32;
        let mut profitable_count = 0u32;
        let mut sample_old = Vec::new();
        let mut sample_profitable = Vec::new();

        for address in buyers.iter().take(sample_limit) {
            match self.classify(chain, address, now).await {
                Ok(Some(classification)) => {
                    analyzed += 1;
                    if classification.is_old {
                        old_count += 1;
                        if sample_old.len() < AUDIT_SAMPLE_LIMIT {
                            sample_old.push(address.clone());
                        }
                    }
                    if classification.is_profitable {
                        profitable_count += 1;
                        if sample_profitable.len() < AUDIT_SAMPLE_LIMIT {
                            sample_profitable.push(address.clone());
                        }
                    }
                }
                Ok(None) => {
                    // Source has no data for this wallet; shrink the sample.
                }
                Err(e) => {
                    warn!(address = %address, error = %e, "Wallet lookup failed, skipping");
                }
            }
        }

        let pct = |count: u32| {
            if analyzed == 0 {
                0.0
            } else {
                count as f64 / analyzed as f64 * 100.0
            }
        };

        WalletIntelligence {
            wallets_analyzed: analyzed,
            old_wallet_count: old_count,
            old_wallet_pct: pct(old_count),
            profitable_wallet_count: profitable_count,
            profitable_wallet_pct: pct(profitable_count),
            sample_old_wallets: sample_old,
            sample_profitable_wallets: sample_profitable,
            analyzed_at: now,
        }
    }

    /// Convenience entry point: pull the token's recent buyers from the
    /// source and analyze them. `None` when the source has no buyer-level
    /// data for this token.
    pub async fn analyze_token(
        &self,
        chain: &str,
        token: &str,
        now: DateTime<Utc>,
    ) -> Option<WalletIntelligence> {
        self.pacer.wait_ready().await;
        let buyers = match self.source.recent_buyers(chain, token).await {
            Ok(buyers) => buyers,
            Err(e) => {
                warn!(token, error = %e, "Buyer lookup failed, skipping wallet analysis");
                return None;
            }
        };
        if buyers.is_empty() {
            return None;
        }
        Some(self.analyze_buyers(chain, &buyers, now).await)
    }
}

/// Pure classification heuristic.
///
/// "Old": first activity at least the configured age ago, OR enough
/// historical transactions, OR enough distinct contract interactions.
/// "Profitable": old AND enough token interactions — an explicit
/// approximation, not ledger-accurate PnL.
pub fn classify_activity(
    activity: &WalletActivity,
    policy: &crate::engine::config::PolicyConfig,
    now: DateTime<Utc>,
) -> WalletClassification {
    let aged = activity
        .first_seen
        .map(|first| now - first >= Duration::days(policy.old_wallet_min_age_days))
        .unwrap_or(false);
    let is_old = aged
        || activity.tx_count >= policy.old_wallet_min_txns
        || activity.distinct_contracts >= policy.old_wallet_min_contracts;
    let is_profitable =
        is_old && activity.token_interactions > policy.profitable_min_token_interactions;
    WalletClassification {
        is_old,
        is_profitable,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::config::{shared_policy, PolicyConfig};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct MapSource {
        wallets: HashMap<String, WalletActivity>,
        lookups: AtomicU32,
    }

    #[async_trait]
    impl WalletActivitySource for MapSource {
        fn name(&self) -> &str {
            "map"
        }

        async fn activity(&self, _chain: &str, address: &str) -> Result<Option<WalletActivity>> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            Ok(self.wallets.get(address).cloned())
        }
    }

    fn fresh_wallet() -> WalletActivity {
        WalletActivity {
            first_seen: Some(Utc::now() - Duration::days(2)),
            tx_count: 3,
            distinct_contracts: 1,
            token_interactions: 1,
        }
    }

    fn veteran_wallet() -> WalletActivity {
        WalletActivity {
            first_seen: Some(Utc::now() - Duration::days(400)),
            tx_count: 800,
            distinct_contracts: 45,
            token_interactions: 60,
        }
    }

    fn fast_policy() -> PolicyConfig {
        let mut p = PolicyConfig::default();
        p.wallet_min_interval_ms = 0;
        p
    }

    #[test]
    fn test_classify_old_by_any_criterion() {
        let policy = PolicyConfig::default();
        let now = Utc::now();

        let by_age = WalletActivity {
            first_seen: Some(now - Duration::days(200)),
            tx_count: 1,
            distinct_contracts: 0,
            token_interactions: 0,
        };
        assert!(classify_activity(&by_age, &policy, now).is_old);

        let by_txns = WalletActivity {
            first_seen: Some(now - Duration::days(1)),
            tx_count: 150,
            distinct_contracts: 0,
            token_interactions: 0,
        };
        assert!(classify_activity(&by_txns, &policy, now).is_old);

        let by_contracts = WalletActivity {
            first_seen: None,
            tx_count: 1,
            distinct_contracts: 25,
            token_interactions: 0,
        };
        assert!(classify_activity(&by_contracts, &policy, now).is_old);

        assert!(!classify_activity(&fresh_wallet(), &policy, now).is_old);
    }

    #[test]
    fn test_profitable_requires_old_and_token_activity() {
        let policy = PolicyConfig::default();
        let now = Utc::now();

        assert!(classify_activity(&veteran_wallet(), &policy, now).is_profitable);

        // Token-active but brand new: not profitable by this heuristic.
        let new_degen = WalletActivity {
            first_seen: Some(now - Duration::days(3)),
            tx_count: 40,
            distinct_contracts: 5,
            token_interactions: 90,
        };
        let c = classify_activity(&new_degen, &policy, now);
        assert!(!c.is_old);
        assert!(!c.is_profitable);
    }

    #[tokio::test]
    async fn test_analyze_buyers_aggregates_percentages() {
        let mut wallets = HashMap::new();
        wallets.insert("wallet_aaaaaaaa".to_string(), veteran_wallet());
        wallets.insert("wallet_bbbbbbbb".to_string(), veteran_wallet());
        wallets.insert("wallet_cccccccc".to_string(), fresh_wallet());
        wallets.insert("wallet_dddddddd".to_string(), fresh_wallet());
        let source = Arc::new(MapSource {
            wallets,
            lookups: AtomicU32::new(0),
        });
        let policy = shared_policy(fast_policy()).unwrap();
        let classifier = WalletClassifier::new(source, policy).await;

        let buyers: Vec<String> = vec![
            "wallet_aaaaaaaa".into(),
            "wallet_bbbbbbbb".into(),
            "wallet_cccccccc".into(),
            "wallet_dddddddd".into(),
            "wallet_unknown0".into(), // unavailable sentinel, shrinks sample
        ];
        let intel = classifier.analyze_buyers("solana", &buyers, Utc::now()).await;

        assert_eq!(intel.wallets_analyzed, 4);
        assert_eq!(intel.old_wallet_count, 2);
        assert_eq!(intel.old_wallet_pct, 50.0);
        assert_eq!(intel.profitable_wallet_count, 2);
        assert_eq!(intel.sample_old_wallets.len(), 2);
    }

    #[tokio::test]
    async fn test_classification_cache_avoids_repeat_lookups() {
        let mut wallets = HashMap::new();
        wallets.insert("wallet_aaaaaaaa".to_string(), veteran_wallet());
        let source = Arc::new(MapSource {
            wallets,
            lookups: AtomicU32::new(0),
        });
        let policy = shared_policy(fast_policy()).unwrap();
        let classifier = WalletClassifier::new(source.clone(), policy).await;

        let now = Utc::now();
        classifier.classify("solana", "wallet_aaaaaaaa", now).await.unwrap();
        classifier.classify("solana", "wallet_aaaaaaaa", now).await.unwrap();

        assert_eq!(source.lookups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_sample_limit_bounds_lookups() {
        let source = Arc::new(MapSource {
            wallets: HashMap::new(),
            lookups: AtomicU32::new(0),
        });
        let mut p = fast_policy();
        p.wallet_sample_limit = 3;
        let policy = shared_policy(p).unwrap();
        let classifier = WalletClassifier::new(source.clone(), policy).await;

        let buyers: Vec<String> = (0..20).map(|i| format!("wallet_{:08}", i)).collect();
        let intel = classifier.analyze_buyers("solana", &buyers, Utc::now()).await;

        assert_eq!(intel.wallets_analyzed, 0);
        assert_eq!(source.lookups.load(Ordering::SeqCst), 3);
    }
}
