//! Candidate normalization: raw upstream pairs to evaluable candidates.
//!
//! Upstream aggregators routinely omit fields. Absent or partial data is
//! filled with zero/defaults here so downstream evaluators never crash on
//! missing inputs; missing data degrades confidence instead.

use crate::engine::error::{validate_address, validate_chain, EngineError};
use crate::types::{Candidate, Scores};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

/// A trading pair as reported by a market-data source, before defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawPair {
    pub chain: Option<String>,
    pub address: Option<String>,
    pub symbol: Option<String>,
    pub name: Option<String>,
    pub price_usd: Option<f64>,
    pub price_change_1h: Option<f64>,
    pub price_change_6h: Option<f64>,
    pub price_change_24h: Option<f64>,
    pub volume_24h: Option<f64>,
    pub liquidity_usd: Option<f64>,
    pub fdv_usd: Option<f64>,
    pub buys_24h: Option<u32>,
    pub sells_24h: Option<u32>,
    pub unique_buyers_24h: Option<u32>,
    pub unique_sellers_24h: Option<u32>,
    pub pair_created_at: Option<DateTime<Utc>>,
}

/// Fills defaults and stamps discovery/update times.
pub struct CandidateNormalizer;

impl CandidateNormalizer {
    /// Normalize one raw pair into a candidate.
    ///
    /// Identity fields are validated synchronously; everything else is
    /// defaulted. Negative market numbers from a confused upstream are
    /// clamped to zero rather than propagated.
    #[instrument(skip(raw), fields(address = raw.address.as_deref().unwrap_or("?")))]
    pub fn normalize(
        raw: &RawPair,
        supported_chains: &[String],
        now: DateTime<Utc>,
    ) -> Result<Candidate, EngineError> {
        let chain = raw
            .chain
            .as_deref()
            .unwrap_or("")
            .to_ascii_lowercase();
        validate_chain(&chain, supported_chains)?;

        let address = raw.address.clone().unwrap_or_default();
        validate_address(&address)?;

        let candidate = Candidate {
            chain,
            address,
            symbol: raw.symbol.clone().unwrap_or_else(|| "UNKNOWN".to_string()),
            name: raw.name.clone().unwrap_or_default(),
            price_usd: non_negative(raw.price_usd),
            price_change_1h: raw.price_change_1h.unwrap_or(0.0),
            price_change_6h: raw.price_change_6h.unwrap_or(0.0),
            price_change_24h: raw.price_change_24h.unwrap_or(0.0),
            volume_24h: non_negative(raw.volume_24h),
            liquidity_usd: non_negative(raw.liquidity_usd),
            fdv_usd: non_negative(raw.fdv_usd),
            buys_24h: raw.buys_24h.unwrap_or(0),
            sells_24h: raw.sells_24h.unwrap_or(0),
            unique_buyers_24h: raw.unique_buyers_24h.unwrap_or(0),
            unique_sellers_24h: raw.unique_sellers_24h.unwrap_or(0),
            pair_created_at: raw.pair_created_at,
            scores: Scores::default(),
            signals: Vec::new(),
            flags: Vec::new(),
            social: None,
            wallet_intel: None,
            discovered_at: now,
            last_updated: now,
        };

        debug!(
            key = %candidate.key(),
            liquidity = candidate.liquidity_usd,
            volume = candidate.volume_24h,
            "Normalized candidate"
        );
        Ok(candidate)
    }
}

fn non_negative(value: Option<f64>) -> f64 {
    value.filter(|v| v.is_finite()).unwrap_or(0.0).max(0.0)
}

/// Builders shared by unit and integration tests.
pub mod test_support {
    use super::*;

    /// A syntactically valid candidate with every market field zeroed.
    pub fn blank_candidate() -> Candidate {
        let raw = RawPair {
            chain: Some("solana".to_string()),
            address: Some("So11111111111111111111111111111111111111112".to_string()),
            symbol: Some("TEST".to_string()),
            name: Some("Test Token".to_string()),
            ..RawPair::default()
        };
        CandidateNormalizer::normalize(&raw, &["solana".to_string()], Utc::now()).unwrap()
    }
}
