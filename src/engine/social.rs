//! Social mention enrichment.
//!
//! A thin cached layer over an external mention feed. Social data is
//! advisory: it feeds the hype-without-liquidity flag and nothing else, and
//! an unavailable source degrades to the empty sentinel so candidates are
//! never dropped for missing mentions.

use crate::engine::config::SharedPolicy;
use crate::engine::rate_limit::SourcePacer;
use crate::types::SocialSignals;
use anyhow::Result;
use async_trait::async_trait;
use moka::future::Cache;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Upstream mention feed seam.
#[async_trait]
pub trait SocialSignalSource: Send + Sync {
    fn name(&self) -> &str;

    /// Mention statistics for a token symbol/address pair. `None` means the
    /// source has no data for this token.
    async fn signals(&self, chain: &str, address: &str, symbol: &str)
        -> Result<Option<SocialSignals>>;
}

/// Cached social-signal lookups with per-source pacing.
pub struct SocialAnalyzer {
    source: Arc<dyn SocialSignalSource>,
    cache: Cache<String, SocialSignals>,
    pacer: SourcePacer,
}

impl SocialAnalyzer {
    pub async fn new(source: Arc<dyn SocialSignalSource>, policy: SharedPolicy) -> Self {
        let (ttl_secs, interval_ms) = {
            let runtime = policy.read().await;
            let p = runtime.current();
            (p.social_cache_ttl_secs, p.social_min_interval_ms)
        };
        // Short TTL: mention velocity goes stale in seconds, not hours.
        let cache = Cache::builder()
            .max_capacity(5_000)
            .time_to_live(std::time::Duration::from_secs(ttl_secs))
            .build();
        Self {
            source,
            cache,
            pacer: SourcePacer::from_millis(interval_ms),
        }
    }

    /// Fetch (or reuse) signals for a token. Source errors and missing data
    /// both degrade to the empty sentinel; the error is logged, never
    /// propagated into the scan.
    #[instrument(skip(self), fields(source = self.source.name()))]
    pub async fn analyze(&self, chain: &str, address: &str, symbol: &str) -> SocialSignals {
        let key = format!("{}:{}", chain, address);
        if let Some(cached) = self.cache.get(&key).await {
            debug!(%key, "Social signal cache hit");
            return cached;
        }

        self.pacer.wait_ready().await;
        let signals = match self.source.signals(chain, address, symbol).await {
            Ok(Some(signals)) => signals,
            Ok(None) => SocialSignals::empty(),
            Err(e) => {
                warn!(%key, error = %e, "Social source failed, using empty signals");
                SocialSignals::empty()
            }
        };
        self.cache.insert(key, signals.clone()).await;
        signals
    }
}
