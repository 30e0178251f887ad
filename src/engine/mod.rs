//! Discovery engine: normalization, qualification, scoring, manipulation
//! flags, wallet/social enrichment, position tracking and scan
//! orchestration.
//!
//! The engine consumes market data behind injected source traits and is
//! deterministic given the same inputs and clock. Evaluators are stateless
//! and rebuilt from the active policy on every use, so a hot-swapped policy
//! takes effect on the next scan without touching tracked positions.

pub mod conditions;
pub mod config;
pub mod error;
pub mod explain;
pub mod flags;
pub mod metrics;
pub mod normalizer;
pub mod orchestrator;
pub mod positions;
pub mod rate_limit;
pub mod scoring;
pub mod social;
pub mod sources;
pub mod wallets;

// Re-export the main public surface
pub use conditions::{ConditionEvaluator, EvaluationSummary};
pub use config::{
    shared_policy, CompositeWeights, PolicyConfig, RuntimePolicy, ScoreProfile, SharedPolicy,
};
pub use error::EngineError;
pub use flags::FlagDetector;
pub use metrics::{EngineMetrics, MetricsSnapshot};
pub use normalizer::{CandidateNormalizer, RawPair};
pub use orchestrator::{DiscoveryOrchestrator, Scanner, ScannerHandle};
pub use positions::PositionTracker;
pub use scoring::ScoringEngine;
pub use social::{SocialAnalyzer, SocialSignalSource};
pub use sources::{FetchCriteria, MarketDataSource};
pub use wallets::{WalletActivitySource, WalletClassifier};

use std::sync::Arc;

/// Builder wiring sources, policy and enrichment into an orchestrator and
/// tracker pair with sensible defaults.
pub struct EngineBuilder {
    policy: PolicyConfig,
    sources: Vec<Arc<dyn MarketDataSource>>,
    wallet_source: Option<Arc<dyn WalletActivitySource>>,
    social_source: Option<Arc<dyn SocialSignalSource>>,
}

/// A fully wired engine: scan orchestration plus position tracking over a
/// shared hot-swappable policy.
pub struct Engine {
    pub orchestrator: Arc<DiscoveryOrchestrator>,
    pub tracker: Arc<PositionTracker>,
    pub policy: SharedPolicy,
    pub metrics: EngineMetrics,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self {
            policy: PolicyConfig::default(),
            sources: Vec::new(),
            wallet_source: None,
            social_source: None,
        }
    }

    /// Replace the default policy wholesale.
    pub fn with_policy(mut self, policy: PolicyConfig) -> Self {
        self.policy = policy;
        self
    }

    /// Register a market-data source.
    pub fn with_source(mut self, source: Arc<dyn MarketDataSource>) -> Self {
        self.sources.push(source);
        self
    }

    /// Enable wallet-population enrichment.
    pub fn with_wallet_source(mut self, source: Arc<dyn WalletActivitySource>) -> Self {
        self.wallet_source = Some(source);
        self
    }

    /// Enable social-mention enrichment.
    pub fn with_social_source(mut self, source: Arc<dyn SocialSignalSource>) -> Self {
        self.social_source = Some(source);
        self
    }

    /// Restrict accepted chains.
    pub fn with_supported_chains(mut self, chains: Vec<String>) -> Self {
        self.policy.supported_chains = chains;
        self
    }

    /// Set the liquidity floor used by qualification.
    pub fn with_min_liquidity(mut self, min_liquidity_usd: f64) -> Self {
        self.policy.min_liquidity_usd = min_liquidity_usd;
        self
    }

    /// Validate the policy and wire everything together.
    pub async fn build(self) -> Result<Engine, EngineError> {
        let policy = shared_policy(self.policy)?;
        let metrics = EngineMetrics::new();

        let wallets = match self.wallet_source {
            Some(source) => Some(Arc::new(
                WalletClassifier::new(source, Arc::clone(&policy)).await,
            )),
            None => None,
        };
        let social = match self.social_source {
            Some(source) => Some(Arc::new(
                SocialAnalyzer::new(source, Arc::clone(&policy)).await,
            )),
            None => None,
        };

        let orchestrator = Arc::new(
            DiscoveryOrchestrator::new(
                self.sources,
                Arc::clone(&policy),
                wallets,
                social,
                metrics.clone(),
            )
            .await,
        );
        let tracker = Arc::new(PositionTracker::new(Arc::clone(&policy)));

        Ok(Engine {
            orchestrator,
            tracker,
            policy,
            metrics,
        })
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
