//! gemscout demo: discovery scan, gem scan and exit tracking against
//! simulated market data.

use anyhow::Result;
use chrono::Utc;
use gemscout::engine::explain::{explain_discovery, explain_exit};
use gemscout::engine::normalizer::RawPair;
use gemscout::engine::sources::{FetchCriteria, MarketDataSource};
use gemscout::engine::wallets::WalletActivitySource;
use gemscout::engine::EngineBuilder;
use gemscout::types::{TokenAddress, WalletActivity};
use async_trait::async_trait;
use rand::Rng;
use std::sync::Arc;
use tracing::{info, Level};

/// Generates plausible trending pairs with randomized market numbers.
struct SimulatedFeed;

#[async_trait]
impl MarketDataSource for SimulatedFeed {
    fn name(&self) -> &str {
        "simulated_feed"
    }

    fn criteria(&self) -> Vec<FetchCriteria> {
        vec![
            FetchCriteria::Trending,
            FetchCriteria::TopGainers,
            FetchCriteria::NewPools,
        ]
    }

    async fn fetch(&self, chain: &str, _criteria: FetchCriteria) -> Result<Vec<RawPair>> {
        let mut rng = rand::thread_rng();
        let pairs = (0..12)
            .map(|i| {
                let liquidity = rng.gen_range(5_000.0..400_000.0);
                RawPair {
                    chain: Some(chain.to_string()),
                    address: Some(format!("SimToken{:02}Addr{:032}", i, i)),
                    symbol: Some(format!("SIM{}", i)),
                    name: Some(format!("Simulated Token {}", i)),
                    price_usd: Some(rng.gen_range(0.0001..2.0)),
                    price_change_1h: Some(rng.gen_range(-40.0..120.0)),
                    price_change_6h: Some(rng.gen_range(-60.0..200.0)),
                    price_change_24h: Some(rng.gen_range(-80.0..400.0)),
                    volume_24h: Some(liquidity * rng.gen_range(0.1..8.0)),
                    liquidity_usd: Some(liquidity),
                    fdv_usd: Some(liquidity * rng.gen_range(2.0..40.0)),
                    buys_24h: Some(rng.gen_range(10..800)),
                    sells_24h: Some(rng.gen_range(10..600)),
                    unique_buyers_24h: Some(rng.gen_range(5..300)),
                    unique_sellers_24h: Some(rng.gen_range(5..250)),
                    pair_created_at: Some(
                        Utc::now() - chrono::Duration::hours(rng.gen_range(1..48)),
                    ),
                }
            })
            .collect();
        Ok(pairs)
    }
}

/// Hands out randomized wallet histories for sampled buyers.
struct SimulatedWallets;

#[async_trait]
impl WalletActivitySource for SimulatedWallets {
    fn name(&self) -> &str {
        "simulated_wallets"
    }

    async fn activity(&self, _chain: &str, _address: &str) -> Result<Option<WalletActivity>> {
        let mut rng = rand::thread_rng();
        Ok(Some(WalletActivity {
            first_seen: Some(Utc::now() - chrono::Duration::days(rng.gen_range(1..700))),
            tx_count: rng.gen_range(1..2_000),
            distinct_contracts: rng.gen_range(0..80),
            token_interactions: rng.gen_range(0..120),
        }))
    }

    async fn recent_buyers(&self, _chain: &str, token: &str) -> Result<Vec<TokenAddress>> {
        let prefix = token.get(..8).unwrap_or(token);
        Ok((0..15).map(|i| format!("{}buyer{:03}", prefix, i)).collect())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .init();

    info!("Starting gemscout discovery demo");

    let engine = EngineBuilder::new()
        .with_source(Arc::new(SimulatedFeed))
        .with_wallet_source(Arc::new(SimulatedWallets))
        .build()
        .await?;

    let now = Utc::now();

    // Broad discovery scan
    let results = engine.orchestrator.scan("solana", 5, now).await?;
    info!(count = results.len(), "Discovery scan results");
    for result in &results {
        println!("{}\n", explain_discovery(result));
    }

    // Strict gem scan
    let gems = engine.orchestrator.scan_gems("solana", 3, now).await?;
    info!(count = gems.len(), "Gem scan results");

    // Track the top result and run a few update cycles
    if let Some(top) = results.first() {
        let position = engine.tracker.track(&top.candidate, now).await?;
        info!(key = %position.key(), entry = position.entry_price, "Tracking top candidate");

        for cycle in 1..=3u32 {
            let tick = now + chrono::Duration::seconds(cycle as i64 * 60);
            let mut snapshot = top.candidate.clone();
            // Simulate a runner: price drifting up, liquidity wobbling.
            snapshot.price_usd *= 1.0 + cycle as f64 * 0.8;
            snapshot.liquidity_usd *= 0.95;
            if let Some(signal) = engine
                .tracker
                .update(&snapshot.chain, &snapshot.address, Some(&snapshot), None, tick)
                .await?
            {
                println!("{}", explain_exit(&signal));
            }
        }
    }

    let snapshot = engine.metrics.snapshot().await;
    info!(counters = ?snapshot.counters, "Run complete");
    Ok(())
}
