//! Scan orchestration: fan out to market sources, normalize, evaluate,
//! enrich, score, rank.
//!
//! Sources are injected behind the `MarketDataSource` trait. A scan
//! tolerates partial failure: a source that errors, times out or is inside
//! its pacing interval contributes nothing and the scan proceeds with the
//! rest. Results are cached briefly so bursts of scan calls do not hammer
//! upstreams.

use crate::engine::config::{PolicyConfig, ScoreProfile, SharedPolicy};
use crate::engine::conditions::ConditionEvaluator;
use crate::engine::error::{validate_chain, EngineError};
use crate::engine::flags::FlagDetector;
use crate::engine::metrics::EngineMetrics;
use crate::engine::normalizer::{CandidateNormalizer, RawPair};
use crate::engine::positions::PositionTracker;
use crate::engine::rate_limit::SourcePacer;
use crate::engine::scoring::ScoringEngine;
use crate::engine::social::SocialAnalyzer;
use crate::engine::sources::{fetch_with_retry, FetchCriteria, MarketDataSource, SourceHealth};
use crate::engine::wallets::WalletClassifier;
use crate::types::DiscoveryResult;
use chrono::{DateTime, Utc};
use moka::future::Cache;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

/// Coordinates sources, evaluators and enrichment into ranked scans.
pub struct DiscoveryOrchestrator {
    sources: Vec<Arc<dyn MarketDataSource>>,
    policy: SharedPolicy,
    wallets: Option<Arc<WalletClassifier>>,
    social: Option<Arc<SocialAnalyzer>>,
    metrics: EngineMetrics,
    scan_cache: Cache<String, Arc<Vec<DiscoveryResult>>>,
    health: Mutex<SourceHealth>,
    pacers: HashMap<String, Arc<SourcePacer>>,
    fetch_slots: Arc<Semaphore>,
}

impl DiscoveryOrchestrator {
    pub async fn new(
        sources: Vec<Arc<dyn MarketDataSource>>,
        policy: SharedPolicy,
        wallets: Option<Arc<WalletClassifier>>,
        social: Option<Arc<SocialAnalyzer>>,
        metrics: EngineMetrics,
    ) -> Self {
        let snapshot = {
            let runtime = policy.read().await;
            runtime.current().clone()
        };
        let scan_cache = Cache::builder()
            .max_capacity(64)
            .time_to_live(Duration::from_secs(snapshot.scan_cache_ttl_secs))
            .build();
        let pacers = sources
            .iter()
            .map(|s| {
                (
                    s.name().to_string(),
                    Arc::new(SourcePacer::from_millis(snapshot.source_min_interval_ms)),
                )
            })
            .collect();
        Self {
            sources,
            policy,
            wallets,
            social,
            metrics,
            scan_cache,
            health: Mutex::new(SourceHealth::new()),
            pacers,
            fetch_slots: Arc::new(Semaphore::new(snapshot.max_concurrent_fetches)),
        }
    }

    /// Broad discovery scan: trending and top-gainer feeds, discovery
    /// profile, ranked by composite.
    pub async fn scan(
        &self,
        chain: &str,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<DiscoveryResult>, EngineError> {
        self.scan_with_profile(chain, limit, ScoreProfile::Discovery, now)
            .await
    }

    /// Ultra-early gem scan: new-pool feeds under the strict gem profile.
    pub async fn scan_gems(
        &self,
        chain: &str,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<DiscoveryResult>, EngineError> {
        self.scan_with_profile(chain, limit, ScoreProfile::Gem, now)
            .await
    }

    #[instrument(skip(self), fields(profile = ?profile))]
    pub async fn scan_with_profile(
        &self,
        chain: &str,
        limit: usize,
        profile: ScoreProfile,
        now: DateTime<Utc>,
    ) -> Result<Vec<DiscoveryResult>, EngineError> {
        let policy = {
            let runtime = self.policy.read().await;
            runtime.current().clone()
        };
        let chain = chain.to_ascii_lowercase();
        validate_chain(&chain, &policy.supported_chains)?;
        self.metrics.increment_counter("scans_total").await;

        let cache_key = format!("{}:{:?}", chain, profile);
        if let Some(cached) = self.scan_cache.get(&cache_key).await {
            self.metrics.increment_counter("scan_cache_hits").await;
            debug!(%cache_key, "Serving scan from cache");
            return Ok(truncated(&cached, limit));
        }

        let wanted = match profile {
            ScoreProfile::Discovery => vec![FetchCriteria::Trending, FetchCriteria::TopGainers],
            ScoreProfile::Gem => vec![FetchCriteria::NewPools],
        };
        let pairs = self.gather(&chain, &wanted, &policy).await;
        let deduped = dedup_by_key(pairs);

        let evaluator = ConditionEvaluator::new(profile);
        let scorer = ScoringEngine::new(profile);
        let mut results = Vec::new();
        for raw in &deduped {
            self.metrics.increment_counter("candidates_evaluated").await;
            match self
                .evaluate_pair(raw, &evaluator, &scorer, &policy, now)
                .await
            {
                Ok(Some(result)) => results.push(result),
                Ok(None) => {}
                Err(e) => debug!(error = %e, "Skipping malformed pair"),
            }
        }
        self.metrics
            .add_to_counter("candidates_qualified", results.len() as u64)
            .await;

        rank(&mut results);
        self.scan_cache
            .insert(cache_key, Arc::new(results.clone()))
            .await;
        self.metrics
            .set_gauge("last_scan_results", results.len() as f64)
            .await;
        info!(
            chain = %chain,
            evaluated = deduped.len(),
            qualified = results.len(),
            "Scan complete"
        );
        Ok(truncated(&results, limit))
    }

    /// Evaluate one already-fetched pair under a profile. Exposed for
    /// callers that refresh a single token outside a full scan.
    pub async fn evaluate_raw(
        &self,
        raw: &RawPair,
        profile: ScoreProfile,
        now: DateTime<Utc>,
    ) -> Result<Option<DiscoveryResult>, EngineError> {
        let policy = {
            let runtime = self.policy.read().await;
            runtime.current().clone()
        };
        let evaluator = ConditionEvaluator::new(profile);
        let scorer = ScoringEngine::new(profile);
        self.evaluate_pair(raw, &evaluator, &scorer, &policy, now)
            .await
    }

    /// Fan out to every healthy, pacer-ready source that advertises one of
    /// the wanted criteria. Failures degrade to empty contributions.
    async fn gather(
        &self,
        chain: &str,
        wanted: &[FetchCriteria],
        policy: &PolicyConfig,
    ) -> Vec<RawPair> {
        let timeout = Duration::from_secs(policy.fetch_timeout_secs);
        let mut tasks: JoinSet<(String, Option<anyhow::Result<Vec<RawPair>>>)> = JoinSet::new();

        for source in &self.sources {
            let name = source.name().to_string();
            {
                let mut health = self.health.lock().await;
                if !health.is_available(&name) {
                    debug!(source = %name, "Source in cooldown, skipping");
                    continue;
                }
            }
            let served: Vec<FetchCriteria> = source
                .criteria()
                .into_iter()
                .filter(|c| wanted.contains(c))
                .collect();
            if served.is_empty() {
                continue;
            }
            for criteria in served {
                let source = Arc::clone(source);
                let chain = chain.to_string();
                let slots = Arc::clone(&self.fetch_slots);
                let pacer = self.pacers.get(&name).map(Arc::clone);
                let attempts = policy.fetch_retry_attempts;
                let name = name.clone();
                tasks.spawn(async move {
                    let _permit = slots.acquire().await;
                    // Every outbound request consumes its own permit. Scan
                    // refreshes skip a busy source instead of queuing behind
                    // it; the short scan cache covers the gap.
                    if let Some(pacer) = pacer {
                        if !pacer.try_acquire() {
                            return (name, None);
                        }
                    }
                    let result =
                        fetch_with_retry(source.as_ref(), &chain, criteria, attempts, timeout)
                            .await;
                    (name, Some(result))
                });
            }
        }

        let mut pairs = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            let Ok((name, result)) = joined else {
                warn!("Fetch task panicked");
                continue;
            };
            let Some(result) = result else {
                self.metrics.increment_counter("source_skipped_pacer").await;
                continue;
            };
            let mut health = self.health.lock().await;
            match result {
                Ok(mut fetched) => {
                    health.record_success(&name);
                    pairs.append(&mut fetched);
                }
                Err(e) => {
                    health.record_failure(
                        &name,
                        policy.source_failure_threshold,
                        Duration::from_secs(policy.source_cooldown_secs),
                    );
                    self.metrics.increment_counter("source_fetch_failures").await;
                    warn!(source = %name, error = %e, "Source fetch failed");
                }
            }
        }
        pairs
    }

    /// Normalize, evaluate conditions, detect flags, enrich qualifying
    /// candidates, score. Returns `None` for candidates that do not qualify
    /// or carry a hard flag.
    async fn evaluate_pair(
        &self,
        raw: &RawPair,
        evaluator: &ConditionEvaluator,
        scorer: &ScoringEngine,
        policy: &PolicyConfig,
        now: DateTime<Utc>,
    ) -> Result<Option<DiscoveryResult>, EngineError> {
        let mut candidate =
            CandidateNormalizer::normalize(raw, &policy.supported_chains, now)?;

        let summary = evaluator.evaluate(&candidate, policy, now);
        if !summary.qualifies {
            return Ok(None);
        }

        // Enrichment is spent on qualifying candidates only.
        if let Some(social) = &self.social {
            candidate.social = Some(
                social
                    .analyze(&candidate.chain, &candidate.address, &candidate.symbol)
                    .await,
            );
        }
        if let Some(wallets) = &self.wallets {
            candidate.wallet_intel = wallets
                .analyze_token(&candidate.chain, &candidate.address, now)
                .await;
        }

        candidate.flags = FlagDetector::detect(&candidate, None, policy, now);
        if candidate.has_hard_flag() {
            self.metrics.increment_counter("candidates_hard_flagged").await;
            debug!(key = %candidate.key(), "Hard flag, excluded from results");
            return Ok(None);
        }

        let (scores, signals) = scorer.score(&candidate, summary.passed, summary.total, policy);
        candidate.scores = scores;
        candidate.signals = signals;

        Ok(Some(DiscoveryResult {
            candidate,
            conditions: summary.conditions,
            passed: summary.passed,
            total: summary.total,
            qualifies: summary.qualifies,
        }))
    }

    pub fn metrics(&self) -> &EngineMetrics {
        &self.metrics
    }
}

/// Keep one pair per `chain:address`, preferring the higher 24h volume.
fn dedup_by_key(pairs: Vec<RawPair>) -> Vec<RawPair> {
    let mut best: HashMap<String, RawPair> = HashMap::new();
    for pair in pairs {
        let (Some(chain), Some(address)) = (&pair.chain, &pair.address) else {
            continue;
        };
        let key = crate::types::position_key(chain, address);
        match best.get(&key) {
            Some(existing)
                if existing.volume_24h.unwrap_or(0.0) >= pair.volume_24h.unwrap_or(0.0) => {}
            _ => {
                best.insert(key, pair);
            }
        }
    }
    best.into_values().collect()
}

/// Composite descending, volume descending, address ascending. The full
/// chain makes scan output deterministic for identical inputs.
fn rank(results: &mut [DiscoveryResult]) {
    results.sort_by(|a, b| {
        b.candidate
            .scores
            .composite
            .total_cmp(&a.candidate.scores.composite)
            .then(b.candidate.volume_24h.total_cmp(&a.candidate.volume_24h))
            .then(a.candidate.address.cmp(&b.candidate.address))
    });
}

fn truncated(results: &[DiscoveryResult], limit: usize) -> Vec<DiscoveryResult> {
    results.iter().take(limit).cloned().collect()
}

/// Periodic non-overlapping scan/exit-check loop.
///
/// Each tick runs a full discovery scan and then refreshes every tracked
/// position that appeared in the scan output. Ticks never overlap: the
/// next tick waits for the previous body to finish.
pub struct Scanner {
    orchestrator: Arc<DiscoveryOrchestrator>,
    tracker: Arc<PositionTracker>,
    chain: String,
    limit: usize,
    interval: Duration,
}

/// Cooperative stop handle for a spawned scanner.
pub struct ScannerHandle {
    stop: watch::Sender<bool>,
    task: tokio::task::JoinHandle<()>,
}

impl ScannerHandle {
    /// Signal the loop to stop and wait for the in-flight tick to finish.
    pub async fn shutdown(self) {
        let _ = self.stop.send(true);
        let _ = self.task.await;
    }
}

impl Scanner {
    pub fn new(
        orchestrator: Arc<DiscoveryOrchestrator>,
        tracker: Arc<PositionTracker>,
        chain: impl Into<String>,
        limit: usize,
        interval: Duration,
    ) -> Self {
        Self {
            orchestrator,
            tracker,
            chain: chain.into(),
            limit,
            interval,
        }
    }

    pub fn spawn(self) -> ScannerHandle {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = stop_rx.changed() => {
                        info!("Scanner stopping");
                        break;
                    }
                    _ = ticker.tick() => {
                        self.tick().await;
                    }
                }
            }
        });
        ScannerHandle {
            stop: stop_tx,
            task,
        }
    }

    async fn tick(&self) {
        let now = Utc::now();
        let results = match self.orchestrator.scan(&self.chain, self.limit, now).await {
            Ok(results) => results,
            Err(e) => {
                warn!(error = %e, "Scan tick failed");
                return;
            }
        };

        // Refresh tracked positions that showed up in this scan. Positions
        // outside the top results keep their last state; absence from a
        // ranked scan is not evidence the pair vanished.
        let by_key: HashMap<String, &DiscoveryResult> = results
            .iter()
            .map(|r| (r.candidate.key(), r))
            .collect();
        for position in self.tracker.positions().await {
            let Some(result) = by_key.get(&position.key()) else {
                continue;
            };
            let intel = result.candidate.wallet_intel.clone();
            match self
                .tracker
                .update(
                    &position.chain,
                    &position.address,
                    Some(&result.candidate),
                    intel,
                    now,
                )
                .await
            {
                Ok(Some(signal)) => {
                    info!(
                        key = %position.key(),
                        action = ?signal.action,
                        reason = signal.reason.as_str(),
                        "Exit signal"
                    );
                }
                Ok(None) => {}
                Err(e) => warn!(key = %position.key(), error = %e, "Position update failed"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::config::{shared_policy, PolicyConfig};
    use anyhow::anyhow;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct StaticSource {
        name: String,
        criteria: Vec<FetchCriteria>,
        pairs: Vec<RawPair>,
        calls: AtomicU32,
        fail: bool,
    }

    #[async_trait]
    impl MarketDataSource for StaticSource {
        fn name(&self) -> &str {
            &self.name
        }

        fn criteria(&self) -> Vec<FetchCriteria> {
            self.criteria.clone()
        }

        async fn fetch(&self, _chain: &str, _criteria: FetchCriteria) -> anyhow::Result<Vec<RawPair>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(anyhow!("upstream 503"))
            } else {
                Ok(self.pairs.clone())
            }
        }
    }

    fn strong_pair(address: &str, liquidity: f64, change_1h: f64) -> RawPair {
        RawPair {
            chain: Some("solana".into()),
            address: Some(address.into()),
            symbol: Some("TOK".into()),
            name: Some("Token".into()),
            price_usd: Some(0.5),
            price_change_1h: Some(change_1h),
            price_change_6h: Some(10.0),
            price_change_24h: Some(25.0),
            volume_24h: Some(liquidity * 2.0),
            liquidity_usd: Some(liquidity),
            fdv_usd: Some(liquidity * 8.0),
            buys_24h: Some(400),
            sells_24h: Some(250),
            unique_buyers_24h: Some(120),
            unique_sellers_24h: Some(80),
            pair_created_at: Some(Utc::now() - chrono::Duration::hours(10)),
        }
    }

    fn policy_without_pacing() -> PolicyConfig {
        let mut p = PolicyConfig::default();
        p.source_min_interval_ms = 0;
        p.scan_cache_ttl_secs = 300;
        p
    }

    async fn orchestrator_with(
        sources: Vec<Arc<dyn MarketDataSource>>,
        policy: PolicyConfig,
    ) -> DiscoveryOrchestrator {
        DiscoveryOrchestrator::new(
            sources,
            shared_policy(policy).unwrap(),
            None,
            None,
            EngineMetrics::new(),
        )
        .await
    }

    #[tokio::test]
    async fn test_scan_ranks_by_composite_and_truncates() {
        let source = Arc::new(StaticSource {
            name: "feed".into(),
            criteria: vec![FetchCriteria::Trending],
            pairs: vec![
                strong_pair("token_aaaaaaaa", 50_000.0, 8.0),
                strong_pair("token_bbbbbbbb", 250_000.0, 8.0),
                strong_pair("token_cccccccc", 120_000.0, 8.0),
            ],
            calls: AtomicU32::new(0),
            fail: false,
        });
        let orch =
            orchestrator_with(vec![source as Arc<dyn MarketDataSource>], policy_without_pacing())
                .await;

        let results = orch.scan("solana", 2, Utc::now()).await.unwrap();
        assert_eq!(results.len(), 2);
        for pair in results.windows(2) {
            assert!(
                pair[0].candidate.scores.composite >= pair[1].candidate.scores.composite,
                "results must be sorted by composite descending"
            );
        }
        assert!(results.iter().all(|r| r.qualifies));
    }

    #[tokio::test]
    async fn test_scan_excludes_hard_flagged_candidates() {
        // Thin liquidity ratio: big fdv, tiny pool, otherwise attractive.
        let mut trap = strong_pair("token_trap0000", 12_000.0, 8.0);
        trap.fdv_usd = Some(5_000_000.0);
        let source = Arc::new(StaticSource {
            name: "feed".into(),
            criteria: vec![FetchCriteria::Trending],
            pairs: vec![trap, strong_pair("token_clean000", 120_000.0, 8.0)],
            calls: AtomicU32::new(0),
            fail: false,
        });
        let orch =
            orchestrator_with(vec![source as Arc<dyn MarketDataSource>], policy_without_pacing())
                .await;

        let results = orch.scan("solana", 10, Utc::now()).await.unwrap();
        assert!(results
            .iter()
            .all(|r| r.candidate.address != "token_trap0000"));
        assert!(results
            .iter()
            .any(|r| r.candidate.address == "token_clean000"));
    }

    #[tokio::test]
    async fn test_duplicate_pairs_keep_highest_volume() {
        let mut low = strong_pair("token_dupe0000", 100_000.0, 8.0);
        low.volume_24h = Some(50_000.0);
        let mut high = strong_pair("token_dupe0000", 100_000.0, 8.0);
        high.volume_24h = Some(90_000.0);

        let a: Arc<dyn MarketDataSource> = Arc::new(StaticSource {
            name: "feed_a".into(),
            criteria: vec![FetchCriteria::Trending],
            pairs: vec![low],
            calls: AtomicU32::new(0),
            fail: false,
        });
        let b: Arc<dyn MarketDataSource> = Arc::new(StaticSource {
            name: "feed_b".into(),
            criteria: vec![FetchCriteria::TopGainers],
            pairs: vec![high],
            calls: AtomicU32::new(0),
            fail: false,
        });
        let orch = orchestrator_with(vec![a, b], policy_without_pacing()).await;

        let results = orch.scan("solana", 10, Utc::now()).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].candidate.volume_24h, 90_000.0);
    }

    #[tokio::test]
    async fn test_failing_source_degrades_to_partial_scan() {
        let ok: Arc<dyn MarketDataSource> = Arc::new(StaticSource {
            name: "healthy".into(),
            criteria: vec![FetchCriteria::Trending],
            pairs: vec![strong_pair("token_alive000", 120_000.0, 8.0)],
            calls: AtomicU32::new(0),
            fail: false,
        });
        let broken: Arc<dyn MarketDataSource> = Arc::new(StaticSource {
            name: "broken".into(),
            criteria: vec![FetchCriteria::TopGainers],
            pairs: vec![],
            calls: AtomicU32::new(0),
            fail: true,
        });
        let orch = orchestrator_with(vec![ok, broken], policy_without_pacing()).await;

        let results = orch.scan("solana", 10, Utc::now()).await.unwrap();
        assert_eq!(results.len(), 1);
        assert!(orch.metrics().counter("source_fetch_failures").await >= 1);
    }

    #[tokio::test]
    async fn test_scan_cache_serves_repeat_calls() {
        let source = Arc::new(StaticSource {
            name: "feed".into(),
            criteria: vec![FetchCriteria::Trending],
            pairs: vec![strong_pair("token_aaaaaaaa", 120_000.0, 8.0)],
            calls: AtomicU32::new(0),
            fail: false,
        });
        let orch = orchestrator_with(
            vec![source.clone() as Arc<dyn MarketDataSource>],
            policy_without_pacing(),
        )
        .await;

        let now = Utc::now();
        orch.scan("solana", 10, now).await.unwrap();
        orch.scan("solana", 10, now).await.unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert_eq!(orch.metrics().counter("scan_cache_hits").await, 1);
    }

    #[tokio::test]
    async fn test_pacer_charges_each_criteria_fetch() {
        // One source serving both discovery feeds with a long pacing
        // interval: the scan may place only one outbound request, the
        // second criteria is skipped rather than piggybacked on the
        // first permit.
        let source = Arc::new(StaticSource {
            name: "feed".into(),
            criteria: vec![FetchCriteria::Trending, FetchCriteria::TopGainers],
            pairs: vec![strong_pair("token_aaaaaaaa", 120_000.0, 8.0)],
            calls: AtomicU32::new(0),
            fail: false,
        });
        let mut policy = policy_without_pacing();
        policy.source_min_interval_ms = 60_000;
        let orch =
            orchestrator_with(vec![source.clone() as Arc<dyn MarketDataSource>], policy).await;

        let results = orch.scan("solana", 10, Utc::now()).await.unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert_eq!(orch.metrics().counter("source_skipped_pacer").await, 1);
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn test_unsupported_chain_rejected() {
        let orch = orchestrator_with(vec![], policy_without_pacing()).await;
        let result = orch.scan("dogechain", 10, Utc::now()).await;
        assert!(matches!(result, Err(EngineError::UnsupportedChain(_))));
    }

    #[tokio::test]
    async fn test_gem_scan_uses_new_pool_feeds_only() {
        let trending: Arc<dyn MarketDataSource> = Arc::new(StaticSource {
            name: "trending".into(),
            criteria: vec![FetchCriteria::Trending],
            pairs: vec![strong_pair("token_old00000", 120_000.0, 8.0)],
            calls: AtomicU32::new(0),
            fail: false,
        });
        let pools: Arc<dyn MarketDataSource> = Arc::new(StaticSource {
            name: "pools".into(),
            criteria: vec![FetchCriteria::NewPools],
            pairs: vec![],
            calls: AtomicU32::new(0),
            fail: false,
        });
        let orch = orchestrator_with(vec![trending, pools], policy_without_pacing()).await;

        let results = orch.scan_gems("solana", 10, Utc::now()).await.unwrap();
        // The trending source serves no wanted criteria for a gem scan.
        assert!(results.is_empty());
    }
}
