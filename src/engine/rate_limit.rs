//! Per-source request pacing built on governor.
//!
//! Each upstream source gets its own pacer enforcing a minimum interval
//! between requests. Two acquisition modes cover the two documented
//! policies: enrichment lookups (wallet, social) wait for a permit;
//! scan refreshes skip and serve the cached result instead.

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::debug;

/// Minimum-interval pacer for one upstream source.
pub struct SourcePacer {
    limiter: DefaultDirectRateLimiter,
    min_interval: Duration,
}

impl SourcePacer {
    /// A pacer permitting one request per `min_interval`. Zero intervals
    /// collapse to an effectively unlimited pacer.
    pub fn new(min_interval: Duration) -> Self {
        let quota = Quota::with_period(min_interval)
            .unwrap_or_else(|| Quota::per_second(NonZeroU32::new(1_000).unwrap()));
        Self {
            limiter: RateLimiter::direct(quota),
            min_interval,
        }
    }

    /// From a policy value in milliseconds.
    pub fn from_millis(min_interval_ms: u64) -> Self {
        Self::new(Duration::from_millis(min_interval_ms))
    }

    /// Wait until a permit is available (wallet/social policy).
    pub async fn wait_ready(&self) {
        self.limiter.until_ready().await;
    }

    /// Take a permit if one is available right now, otherwise report busy
    /// without blocking (market-scan refresh policy).
    pub fn try_acquire(&self) -> bool {
        let ok = self.limiter.check().is_ok();
        if !ok {
            debug!(interval_ms = self.min_interval.as_millis() as u64, "Pacer busy, skipping");
        }
        ok
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }
}
