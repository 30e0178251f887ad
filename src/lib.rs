//! gemscout - early token discovery and exit-timing engine
//!
//! This crate scans market-data feeds for newly launched tokens, qualifies
//! them against profile-specific condition sets, scores them across
//! momentum/liquidity/risk/confidence, flags manipulation patterns, and
//! tracks entered positions through a six-trigger exit state machine.

pub mod engine;
pub mod types;

// Re-export main types for convenience
pub use engine::{Engine, EngineBuilder};
pub use types::{Candidate, DiscoveryResult, ExitSignal, TrackedPosition};
