//! Two-tier in-memory frame cache.
//!
//! The second-indexed tier serves partial reuse across durations; the duration-indexed tier
//! serves exact repeats and donor extraction.

/// Cache tiers, coverage analysis and donor extraction.
pub mod frames;
