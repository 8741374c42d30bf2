//! Session-oriented generation API.
//!
//! A [`generate::StickerSession`] owns the frame cache for its lifetime and serves repeat
//! requests near-instantly from it.

/// The generation orchestrator.
pub mod generate;
