//! Upstream market-data source seam.
//!
//! Transport and parsing live outside this crate; the engine consumes the
//! `MarketDataSource` trait only. This module adds the retry/timeout wrapper
//! and the per-source failure cooldown used by the orchestrator so one
//! misbehaving source cannot stall a scan.

use crate::engine::normalizer::RawPair;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio_retry::strategy::ExponentialBackoff;
use tokio_retry::Retry;
use tracing::{debug, warn};

/// What slice of the market a fetch should return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FetchCriteria {
    /// Tokens currently trending by activity
    Trending,
    /// Largest 24h gainers
    TopGainers,
    /// Recently created pools
    NewPools,
}

impl FetchCriteria {
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchCriteria::Trending => "trending",
            FetchCriteria::TopGainers => "top_gainers",
            FetchCriteria::NewPools => "new_pools",
        }
    }
}

/// An upstream feed of raw trading pairs.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Stable source name, used for pacing, health tracking and logs.
    fn name(&self) -> &str;

    /// Which criteria this source serves best; the orchestrator queries a
    /// source only with criteria it advertises.
    fn criteria(&self) -> Vec<FetchCriteria>;

    async fn fetch(&self, chain: &str, criteria: FetchCriteria) -> Result<Vec<RawPair>>;
}

/// Fetch with timeout and bounded exponential-backoff retries.
///
/// Timeouts and malformed responses surface as errors here; the caller
/// degrades them to an empty contribution rather than failing the scan.
pub async fn fetch_with_retry(
    source: &dyn MarketDataSource,
    chain: &str,
    criteria: FetchCriteria,
    attempts: usize,
    timeout: Duration,
) -> Result<Vec<RawPair>> {
    let strategy = ExponentialBackoff::from_millis(100)
        .max_delay(Duration::from_secs(2))
        .take(attempts);

    Retry::spawn(strategy, || async {
        match tokio::time::timeout(timeout, source.fetch(chain, criteria)).await {
            Ok(result) => result,
            Err(_) => Err(anyhow!(
                "source '{}' timed out after {:?} ({})",
                source.name(),
                timeout,
                criteria.as_str()
            )),
        }
    })
    .await
}

/// Per-source consecutive-failure tracking with cooldown quarantine.
#[derive(Debug, Default)]
pub struct SourceHealth {
    entries: HashMap<String, HealthEntry>,
}

#[derive(Debug, Default)]
struct HealthEntry {
    consecutive_failures: u32,
    cooldown_until: Option<Instant>,
}

impl SourceHealth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&mut self, source: &str) {
        let entry = self.entries.entry(source.to_string()).or_default();
        entry.consecutive_failures = 0;
        entry.cooldown_until = None;
    }

    /// Record a failure; after `failure_threshold` consecutive failures the
    /// source is quarantined for `cooldown`.
    pub fn record_failure(&mut self, source: &str, failure_threshold: u32, cooldown: Duration) {
        let entry = self.entries.entry(source.to_string()).or_default();
        entry.consecutive_failures += 1;
        if entry.consecutive_failures >= failure_threshold {
            entry.cooldown_until = Some(Instant::now() + cooldown);
            warn!(
                source,
                failures = entry.consecutive_failures,
                cooldown_secs = cooldown.as_secs(),
                "Source entering cooldown"
            );
        }
    }

    /// Whether the source may be queried right now. An expired cooldown
    /// re-admits the source with a reset failure count.
    pub fn is_available(&mut self, source: &str) -> bool {
        let entry = self.entries.entry(source.to_string()).or_default();
        match entry.cooldown_until {
            None => true,
            Some(until) if Instant::now() >= until => {
                entry.cooldown_until = None;
                entry.consecutive_failures = 0;
                debug!(source, "Source cooldown expired");
                true
            }
            Some(_) => false,
        }
    }
}
