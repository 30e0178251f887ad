//! Typed error taxonomy for synchronous validation failures.
//!
//! Upstream-unavailable and malformed-response conditions are degraded to
//! empty/partial results inside the orchestrator and never surface through
//! this enum; these variants cover the caller-facing rejections only.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Chain is not in the configured supported set.
    #[error("unsupported chain: {0}")]
    UnsupportedChain(String),

    /// Token address failed basic shape validation.
    #[error("malformed token address: {0}")]
    MalformedAddress(String),

    /// A policy update was rejected; the previous policy stays active.
    #[error("invalid policy: {0}")]
    InvalidPolicy(String),

    /// Operation referenced a position that is not tracked.
    #[error("position not tracked: {0}")]
    PositionNotFound(String),
}

/// Validate a chain identifier against the supported set.
pub fn validate_chain(chain: &str, supported: &[String]) -> Result<(), EngineError> {
    let normalized = chain.to_ascii_lowercase();
    if supported.iter().any(|c| c.eq_ignore_ascii_case(&normalized)) {
        Ok(())
    } else {
        Err(EngineError::UnsupportedChain(chain.to_string()))
    }
}

/// Basic shape validation for token addresses: non-empty, alphanumeric
/// base58/hex-style, bounded length. Exact per-chain formats belong to the
/// out-of-scope connectors.
pub fn validate_address(address: &str) -> Result<(), EngineError> {
    let ok = (8..=128).contains(&address.len())
        && address
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if ok {
        Ok(())
    } else {
        Err(EngineError::MalformedAddress(address.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn supported() -> Vec<String> {
        vec!["solana".to_string(), "ethereum".to_string()]
    }

    #[test]
    fn test_validate_chain_accepts_case_insensitive() {
        assert!(validate_chain("solana", &supported()).is_ok());
        assert!(validate_chain("Solana", &supported()).is_ok());
    }

    #[test]
    fn test_validate_chain_rejects_unknown() {
        let err = validate_chain("dogechain", &supported()).unwrap_err();
        assert!(matches!(err, EngineError::UnsupportedChain(_)));
    }

    #[test]
    fn test_validate_address_rejects_garbage() {
        assert!(validate_address("").is_err());
        assert!(validate_address("abc").is_err());
        assert!(validate_address("has spaces in it!").is_err());
        assert!(validate_address("So11111111111111111111111111111111111111112").is_ok());
    }
}
