//! End-to-end discovery pipeline tests: injected sources through
//! normalization, qualification, enrichment, scoring and ranking.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use gemscout::engine::normalizer::RawPair;
use gemscout::engine::sources::{FetchCriteria, MarketDataSource};
use gemscout::engine::wallets::WalletActivitySource;
use gemscout::engine::social::SocialSignalSource;
use gemscout::engine::{EngineBuilder, PolicyConfig, Scanner};
use gemscout::types::{SocialSignals, TokenAddress, WalletActivity};
use std::sync::Arc;

/// Serves the same fixture pairs for any requested chain and criteria.
struct FixtureSource {
    pairs: Vec<RawPair>,
}

#[async_trait]
impl MarketDataSource for FixtureSource {
    fn name(&self) -> &str {
        "fixture"
    }

    fn criteria(&self) -> Vec<FetchCriteria> {
        vec![FetchCriteria::Trending, FetchCriteria::NewPools]
    }

    async fn fetch(&self, chain: &str, _criteria: FetchCriteria) -> Result<Vec<RawPair>> {
        Ok(self
            .pairs
            .iter()
            .cloned()
            .map(|mut p| {
                p.chain = Some(chain.to_string());
                p
            })
            .collect())
    }
}

struct FixtureWallets;

#[async_trait]
impl WalletActivitySource for FixtureWallets {
    fn name(&self) -> &str {
        "fixture_wallets"
    }

    async fn activity(&self, _chain: &str, _address: &str) -> Result<Option<WalletActivity>> {
        Ok(Some(WalletActivity {
            first_seen: Some(Utc::now() - Duration::days(365)),
            tx_count: 500,
            distinct_contracts: 40,
            token_interactions: 50,
        }))
    }

    async fn recent_buyers(&self, _chain: &str, _token: &str) -> Result<Vec<TokenAddress>> {
        Ok((0..10).map(|i| format!("fixture_buyer{:03}", i)).collect())
    }
}

struct FixtureSocial;

#[async_trait]
impl SocialSignalSource for FixtureSocial {
    fn name(&self) -> &str {
        "fixture_social"
    }

    async fn signals(
        &self,
        _chain: &str,
        _address: &str,
        _symbol: &str,
    ) -> Result<Option<SocialSignals>> {
        Ok(Some(SocialSignals {
            mention_count: 40,
            mention_velocity: 12.0,
            spike_detected: false,
            spam_score: 0.1,
        }))
    }
}

fn pair(address: &str, liquidity: f64, volume_mult: f64, change_1h: f64) -> RawPair {
    RawPair {
        chain: None, // filled by the fixture source
        address: Some(address.to_string()),
        symbol: Some("FIX".to_string()),
        name: Some("Fixture Token".to_string()),
        price_usd: Some(0.25),
        price_change_1h: Some(change_1h),
        price_change_6h: Some(15.0),
        price_change_24h: Some(40.0),
        volume_24h: Some(liquidity * volume_mult),
        liquidity_usd: Some(liquidity),
        fdv_usd: Some(liquidity * 10.0),
        buys_24h: Some(350),
        sells_24h: Some(220),
        unique_buyers_24h: Some(110),
        unique_sellers_24h: Some(70),
        pair_created_at: Some(Utc::now() - Duration::hours(12)),
    }
}

fn fast_policy() -> PolicyConfig {
    let mut p = PolicyConfig::default();
    p.source_min_interval_ms = 0;
    p.wallet_min_interval_ms = 0;
    p.social_min_interval_ms = 0;
    p.scan_cache_ttl_secs = 300;
    p
}

#[tokio::test]
async fn scan_produces_ranked_qualified_results_with_condition_traces() {
    let source = Arc::new(FixtureSource {
        pairs: vec![
            pair("fixture_token_01", 30_000.0, 2.0, 12.0),
            pair("fixture_token_02", 280_000.0, 2.0, 12.0),
            pair("fixture_token_03", 90_000.0, 2.0, 12.0),
            pair("fixture_token_04", 150_000.0, 2.0, 12.0),
            pair("fixture_token_05", 55_000.0, 2.0, 12.0),
        ],
    });
    let engine = EngineBuilder::new()
        .with_policy(fast_policy())
        .with_source(source)
        .build()
        .await
        .unwrap();

    let results = engine
        .orchestrator
        .scan("solana", 3, Utc::now())
        .await
        .unwrap();

    assert_eq!(results.len(), 3, "limit must truncate the ranked list");
    for window in results.windows(2) {
        assert!(
            window[0].candidate.scores.composite >= window[1].candidate.scores.composite
        );
    }
    for result in &results {
        assert!(result.qualifies);
        assert_eq!(result.total, 8, "discovery profile runs eight conditions");
        assert!(result.passed >= 3);
        assert!(!result.conditions.is_empty());
        for condition in &result.conditions {
            assert!(!condition.evidence.is_empty(), "every condition records evidence");
        }
        let s = &result.candidate.scores;
        for value in [s.momentum, s.liquidity, s.risk, s.confidence, s.composite] {
            assert!((0.0..=100.0).contains(&value));
        }
    }
}

#[tokio::test]
async fn hard_flagged_candidate_never_reaches_results() {
    // Attractive numbers but a pool far too thin for the claimed valuation.
    let mut trap = pair("fixture_trap_01", 15_000.0, 2.0, 12.0);
    trap.fdv_usd = Some(8_000_000.0);
    let source = Arc::new(FixtureSource {
        pairs: vec![trap, pair("fixture_clean_1", 120_000.0, 2.0, 12.0)],
    });
    let engine = EngineBuilder::new()
        .with_policy(fast_policy())
        .with_source(source)
        .build()
        .await
        .unwrap();

    let results = engine
        .orchestrator
        .scan("solana", 10, Utc::now())
        .await
        .unwrap();
    assert!(results
        .iter()
        .all(|r| r.candidate.address != "fixture_trap_01"));
    assert!(results
        .iter()
        .any(|r| r.candidate.address == "fixture_clean_1"));
}

#[tokio::test]
async fn enrichment_attaches_wallet_and_social_data() {
    let source = Arc::new(FixtureSource {
        pairs: vec![pair("fixture_token_01", 120_000.0, 2.0, 12.0)],
    });
    let engine = EngineBuilder::new()
        .with_policy(fast_policy())
        .with_source(source)
        .with_wallet_source(Arc::new(FixtureWallets))
        .with_social_source(Arc::new(FixtureSocial))
        .build()
        .await
        .unwrap();

    let results = engine
        .orchestrator
        .scan("solana", 5, Utc::now())
        .await
        .unwrap();
    let top = &results[0].candidate;

    let intel = top.wallet_intel.as_ref().expect("wallet intel attached");
    assert_eq!(intel.wallets_analyzed, 10);
    assert_eq!(intel.old_wallet_pct, 100.0);

    let social = top.social.as_ref().expect("social signals attached");
    assert_eq!(social.mention_count, 40);
}

#[tokio::test]
async fn policy_hot_swap_takes_effect_on_next_scan() {
    let source = Arc::new(FixtureSource {
        pairs: vec![pair("fixture_token_01", 120_000.0, 2.0, 12.0)],
    });
    let engine = EngineBuilder::new()
        .with_policy(fast_policy())
        .with_source(source)
        .build()
        .await
        .unwrap();

    let before = engine
        .orchestrator
        .scan("solana", 5, Utc::now())
        .await
        .unwrap();
    assert_eq!(before.len(), 1);

    // Demand every discovery condition; the fixture cannot pass all eight.
    {
        let mut runtime = engine.policy.write().await;
        let mut next = runtime.current().clone();
        next.discovery_min_conditions = 8;
        runtime.apply_update(next).unwrap();
    }

    // Different chain key so the scan cache does not mask the swap.
    let after = engine
        .orchestrator
        .scan("base", 5, Utc::now())
        .await
        .unwrap();
    assert!(after.is_empty());
}

#[tokio::test]
async fn gem_scan_rejects_pairs_older_than_the_freshness_window() {
    // 12h-old fixture pairs fail the mandatory gem ultra-freshness rule.
    let source = Arc::new(FixtureSource {
        pairs: vec![pair("fixture_token_01", 120_000.0, 2.0, 12.0)],
    });
    let engine = EngineBuilder::new()
        .with_policy(fast_policy())
        .with_source(source)
        .build()
        .await
        .unwrap();

    let gems = engine
        .orchestrator
        .scan_gems("solana", 5, Utc::now())
        .await
        .unwrap();
    assert!(gems.is_empty());
}

#[tokio::test]
async fn scanner_loop_spawns_and_shuts_down_cleanly() {
    let source = Arc::new(FixtureSource {
        pairs: vec![pair("fixture_token_01", 120_000.0, 2.0, 12.0)],
    });
    let engine = EngineBuilder::new()
        .with_policy(fast_policy())
        .with_source(source)
        .build()
        .await
        .unwrap();

    let scanner = Scanner::new(
        Arc::clone(&engine.orchestrator),
        Arc::clone(&engine.tracker),
        "solana",
        5,
        std::time::Duration::from_millis(20),
    );
    let handle = scanner.spawn();
    tokio::time::sleep(std::time::Duration::from_millis(60)).await;
    handle.shutdown().await;

    assert!(engine.metrics.counter("scans_total").await >= 1);
}
